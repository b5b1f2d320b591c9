//! Memory-mapped register definitions for the FIMC-IS block.
//!
//! The register layout is described using [`tock_registers`], which provides a
//! safe and zero-cost abstraction over volatile MMIO access. Each functional
//! block is exposed through a dedicated sub-module so the code that drives the
//! hardware depends on typed accessors instead of raw offsets.

use core::ptr::NonNull;

pub mod consts;
pub mod csis;
pub mod flite;
pub mod mailbox;

pub use csis::CsisRegisters;
pub use flite::FliteRegisters;
pub use mailbox::MailboxRegisters;

/// Base addresses of the register windows the driver touches.
#[derive(Debug, Clone, Copy)]
pub struct RegisterBases {
    /// ISP core control + ISSR mailbox block.
    pub mailbox: NonNull<u8>,
    /// FIMC-LITE window of the capture channel in use.
    pub flite: NonNull<u8>,
    /// MIPI-CSIS window of the capture channel in use.
    pub csis: NonNull<u8>,
}
