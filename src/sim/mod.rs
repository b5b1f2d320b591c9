//! Simulated board: OSAL, board callbacks, mailbox firmware and FIMC-LITE.
//!
//! Nothing runs on its own. Every `udelay`/`msleep` the driver issues moves
//! the virtual clock and ticks the registered devices, so a blocking command
//! gets its reply from inside its own polling loop, the way it would from
//! the interrupt on real hardware.

mod firmware;
mod flite;
mod osal;
mod platform;

use alloc::{
    alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error},
    sync::Arc,
    vec,
    vec::Vec,
};
use core::ptr::NonNull;

pub use firmware::{InFlight, SIM_SETFILE_OFFSET, SimFirmware};
pub use flite::SimFlite;
pub use osal::{SIM_DVA_BASE, SimEvent, SimOsal};
pub use platform::{PlatformCall, SimPlatform};

use crate::{
    FimcIsDevice,
    config::{Board, FimcIsConfig},
    err::Result,
    firmware::{FW_INFO_LEN, FW_VERSION_LEN},
    registers::{
        RegisterBases, csis::CSIS_REGS_SIZE, flite::FLITE_REGS_SIZE,
        mailbox::MAILBOX_REGS_SIZE,
    },
    sensor::SensorId,
};

/// Hardware block advanced by the virtual clock.
pub trait SimDevice: Send + Sync {
    fn tick(&self);
}

pub const SIM_FW_INFO: &str = "sim fimc-is firmware";
pub const SIM_FW_VERSION: &str = "S5420A";

/// Zeroed memory standing in for a register window.
pub struct SimRegisterFile {
    base: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for SimRegisterFile {}
unsafe impl Sync for SimRegisterFile {}

impl SimRegisterFile {
    pub fn new(size: usize) -> Self {
        let layout = match Layout::from_size_align(size.max(4), 8) {
            Ok(layout) => layout,
            Err(_) => Layout::new::<u64>(),
        };
        let Some(base) = NonNull::new(unsafe { alloc_zeroed(layout) }) else {
            handle_alloc_error(layout)
        };
        Self { base, layout }
    }

    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for SimRegisterFile {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}

/// Firmware image with the info/version trailer the loader reads back.
pub fn firmware_image(body: usize) -> Vec<u8> {
    let mut image = vec![0xE5u8; body];
    let mut info = [0u8; FW_INFO_LEN];
    info[..SIM_FW_INFO.len()].copy_from_slice(SIM_FW_INFO.as_bytes());
    let mut version = [0u8; FW_VERSION_LEN];
    version[..SIM_FW_VERSION.len()].copy_from_slice(SIM_FW_VERSION.as_bytes());
    image.extend_from_slice(&info);
    image.extend_from_slice(&version);
    image
}

/// Everything a test needs around one device.
pub struct SimBoard {
    pub config: FimcIsConfig,
    pub osal: SimOsal,
    pub platform: SimPlatform,
    pub firmware: Arc<SimFirmware>,
    pub flite: Arc<SimFlite>,
    mailbox: Arc<SimRegisterFile>,
    flite_regs: Arc<SimRegisterFile>,
    csis_regs: Arc<SimRegisterFile>,
}

impl SimBoard {
    pub fn new(board: Board) -> Self {
        let mut config = FimcIsConfig::new(board);
        config.memory.fw_area_size = 0x10_0000;
        config.memory.dis_buffer_size = 0x1000;
        config.memory.tdnr_buffer_size = 0x1000;
        config.timeouts.command_ms = 200;
        config.timeouts.sensor_command_ms = 200;
        config.timeouts.init_message_ms = 100;
        config.timeouts.isp_drain_ms = 50;

        let osal = SimOsal::new();
        osal.add_firmware(config.firmware_name, firmware_image(0x1000));
        for slot in core::iter::once(config.rear).chain(config.front) {
            let info = slot.id.info();
            osal.add_firmware(info.setfile, vec![0x5A; 0x800]);
        }

        let mailbox = Arc::new(SimRegisterFile::new(MAILBOX_REGS_SIZE));
        let flite_regs = Arc::new(SimRegisterFile::new(FLITE_REGS_SIZE));
        let csis_regs = Arc::new(SimRegisterFile::new(CSIS_REGS_SIZE));

        let firmware = Arc::new(SimFirmware::new(osal.clone(), mailbox.clone()));
        let flite = Arc::new(SimFlite::new(flite_regs.clone()));
        osal.register(firmware.clone());
        osal.register(flite.clone());

        Self {
            config,
            osal,
            platform: SimPlatform::new(),
            firmware,
            flite,
            mailbox,
            flite_regs,
            csis_regs,
        }
    }

    pub fn bases(&self) -> RegisterBases {
        RegisterBases {
            mailbox: self.mailbox.base(),
            flite: self.flite_regs.base(),
            csis: self.csis_regs.base(),
        }
    }

    /// Device for `sensor`, with the firmware wired to its interrupt handler.
    pub fn device(&self, sensor: SensorId) -> Result<FimcIsDevice<SimOsal, SimPlatform>> {
        // The register files live as long as the board, and the board
        // outlives every device a test creates from it.
        let device = unsafe {
            FimcIsDevice::new(
                self.config.clone(),
                self.osal.clone(),
                self.platform.clone(),
                self.bases(),
                sensor,
            )?
        };
        self.firmware.attach(Arc::downgrade(device.interface()));
        Ok(device)
    }

    pub fn rear_device(&self) -> Result<FimcIsDevice<SimOsal, SimPlatform>> {
        self.device(self.config.rear.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::FirmwareInfo;

    #[test]
    fn sim_image_carries_trailer_strings() {
        let info = FirmwareInfo::parse(&firmware_image(64)).unwrap();
        assert_eq!(info.info, SIM_FW_INFO);
        assert_eq!(info.version, SIM_FW_VERSION);
    }

    #[test]
    fn board_serves_firmware_and_setfiles() {
        use crate::osal::Osal;

        let board = SimBoard::new(Board::Universal5420);
        assert!(board.osal.request_firmware(board.config.firmware_name).is_ok());
        assert!(board.osal.request_firmware("setfile_imx135.bin").is_ok());
        assert!(board.osal.request_firmware("setfile_6b2.bin").is_ok());
        assert!(board.osal.request_firmware("setfile_3l2.bin").is_err());
    }
}
