//! Image sensors and the MIPI-CSIS / FIMC-LITE front end feeding bayer frames.

pub mod flite;
pub mod mipi;
pub mod settle;

use alloc::sync::Arc;

use crate::{
    config::{FimcIsConfig, SensorSlot},
    err::{FimcIsError, Result},
    framemgr::FrameManager,
    geometry::Size,
    osal::Osal,
    platform::PlatformOps,
    registers::{CsisRegisters, FliteRegisters},
};

use flite::{Flite, FliteTimeouts};
use settle::SettleEntry;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SensorId {
    Imx135,
    S5k6b2,
    S5k3l2,
}

/// Static description of a supported sensor.
#[derive(Debug)]
pub struct SensorInfo {
    pub id: SensorId,
    pub name: &'static str,
    /// Identifier the firmware uses in `HIC_OPEN_SENSOR`.
    pub fw_id: u32,
    pub max_size: Size,
    pub max_fps: u32,
    pub setfile: &'static str,
    pub settle: &'static [SettleEntry],
}

static SENSORS: [SensorInfo; 3] = [
    SensorInfo {
        id: SensorId::Imx135,
        name: "IMX135",
        fw_id: 101,
        max_size: Size::new(4128, 3096),
        max_fps: 120,
        setfile: "setfile_imx135.bin",
        settle: settle::IMX135_SETTLE,
    },
    SensorInfo {
        id: SensorId::S5k6b2,
        name: "S5K6B2",
        fw_id: 103,
        max_size: Size::new(1936, 1090),
        max_fps: 30,
        setfile: "setfile_6b2.bin",
        settle: settle::S5K6B2_SETTLE,
    },
    SensorInfo {
        id: SensorId::S5k3l2,
        name: "S5K3L2",
        fw_id: 14,
        max_size: Size::new(4144, 3106),
        max_fps: 60,
        setfile: "setfile_3l2.bin",
        settle: settle::S5K3L2_SETTLE,
    },
];

impl SensorId {
    pub fn info(self) -> &'static SensorInfo {
        match self {
            SensorId::Imx135 => &SENSORS[0],
            SensorId::S5k6b2 => &SENSORS[1],
            SensorId::S5k3l2 => &SENSORS[2],
        }
    }
}

/// One sensor wired to a CSIS + FIMC-LITE channel.
pub struct SensorDevice<O: Osal, P: PlatformOps> {
    slot: SensorSlot,
    info: &'static SensorInfo,
    platform: Arc<P>,
    csis: CsisRegisters,
    flite: Flite<O>,
    size: Size,
    fps: u32,
    powered: bool,
    streaming: bool,
}

impl<O: Osal, P: PlatformOps> SensorDevice<O, P> {
    pub fn new(
        osal: O,
        platform: Arc<P>,
        config: &FimcIsConfig,
        slot: SensorSlot,
        csis: CsisRegisters,
        flite_regs: FliteRegisters,
    ) -> Self {
        let info = slot.id.info();
        let timeouts = FliteTimeouts {
            last_capture_ms: config.timeouts.flite_last_capture_ms,
            force_stop_delay_ms: config.timeouts.flite_force_stop_delay_ms,
            poll_us: config.poll_interval_us.max(1),
        };
        Self {
            slot,
            info,
            platform,
            csis,
            flite: Flite::new(osal, flite_regs, slot.channel, timeouts),
            size: info.max_size,
            fps: 30,
            powered: false,
            streaming: false,
        }
    }

    pub fn info(&self) -> &'static SensorInfo {
        self.info
    }

    pub fn slot(&self) -> SensorSlot {
        self.slot
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn flite(&self) -> &Flite<O> {
        &self.flite
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn set_format(&mut self, size: Size, fps: u32) -> Result<()> {
        let max = self.info.max_size;
        if size.is_empty() || size.width > max.width || size.height > max.height {
            error!(
                "{}: {}x{} exceeds {}x{}",
                self.info.name, size.width, size.height, max.width, max.height
            );
            return Err(FimcIsError::InvalidArgument);
        }
        if fps == 0 || fps > self.info.max_fps {
            error!("{}: {}fps not supported", self.info.name, fps);
            return Err(FimcIsError::InvalidArgument);
        }
        self.size = size;
        self.fps = fps;
        Ok(())
    }

    pub fn power_on(&mut self) -> Result<()> {
        if self.powered {
            return Ok(());
        }
        self.platform.cfg_gpio(self.slot.channel, true)?;
        self.platform.sensor_power_on(self.slot.channel)?;
        self.powered = true;
        info!("{} powered on (ch {})", self.info.name, self.slot.channel);
        Ok(())
    }

    pub fn power_off(&mut self) -> Result<()> {
        if !self.powered {
            return Ok(());
        }
        self.platform.sensor_power_off(self.slot.channel)?;
        self.platform.cfg_gpio(self.slot.channel, false)?;
        self.powered = false;
        info!("{} powered off", self.info.name);
        Ok(())
    }

    /// Start bayer capture into the frames queued on `frames`.
    pub fn stream_on(&mut self, frames: &FrameManager) -> Result<()> {
        if self.streaming {
            return Ok(());
        }
        if !self.powered {
            return Err(FimcIsError::InvalidState);
        }
        let settle = settle::lookup(self.info.settle, self.size.width, self.size.height, self.fps);
        mipi::csis_enable(&self.csis, self.slot.csi_lanes, settle.value, self.size);
        if let Err(err) = self.flite.start(frames, self.size) {
            mipi::csis_disable(&self.csis);
            return Err(err);
        }
        self.streaming = true;
        Ok(())
    }

    pub fn stream_off(&mut self, frames: &FrameManager) -> Result<()> {
        if !self.streaming {
            return Ok(());
        }
        self.flite.stop(frames)?;
        mipi::csis_disable(&self.csis);
        self.streaming = false;
        Ok(())
    }

    /// FIMC-LITE interrupt.
    pub fn flite_irq(&mut self, frames: &FrameManager) {
        self.flite.irq(frames);
    }
}
