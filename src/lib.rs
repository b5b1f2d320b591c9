//! Driver for the FIMC-IS camera image signal processor found in Exynos5420
//! SoCs.
//!
//! The ISP is an ARM core running vendor firmware. The driver loads that
//! firmware, talks to it over a register mailbox, keeps the shared parameter
//! region in sync and moves frames between the sensor front end, the ISP and
//! the two scaler outputs (SCC and SCP).
//!
//! Register layouts are described with `tock-registers`; everything the
//! driver needs from the host kernel goes through the [`Osal`] trait and the
//! board callbacks through [`PlatformOps`]. The `sim` feature ships a
//! simulated board the test suite runs against.

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[macro_use]
extern crate log;

pub mod config;
mod device;
mod err;
pub mod firmware;
pub mod framemgr;
pub mod geometry;
pub mod interface;
pub mod ischain;
pub mod media;
mod osal;
mod platform;
pub mod region;
pub mod registers;
pub mod sensor;
pub mod shot;
pub mod video;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use config::{Board, FimcIsConfig, SensorSlot};
pub use device::FimcIsDevice;
pub use err::*;
pub use geometry::{Rect, Size};
pub use ischain::{CameraControl, ChainSizes, Feature, IschainState};
pub use media::Pad;
pub use osal::*;
pub use platform::*;
pub use sensor::SensorId;
pub use shot::{RequestFlags, ShotExt};
pub use video::{DoneBuffer, VideoBuffer, VideoKind};
