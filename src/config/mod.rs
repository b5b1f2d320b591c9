//! Board and firmware configuration for the FIMC-IS driver.
//!
//! This replaces the per-board platform data the kernel build wires in at
//! compile time. Every number the driver depends on (timeouts, pool sizes,
//! memory layout, magic offsets into the shared region) lives here so the rest
//! of the crate never carries scattered literals.

use crate::sensor::SensorId;

/// Default mailbox timeout for blocking commands.
pub const FIMC_IS_SHUTDOWN_TIMEOUT_MS: u32 = 10_000;
/// Timeout for sensor related commands (open/close sensor, setfile).
pub const FIMC_IS_SENSOR_TIMEOUT_MS: u32 = 3_000;
/// Work items per IRQ class.
pub const MAX_WORK_COUNT: usize = 10;
/// Outstanding non-blocking commands per class.
pub const MAX_NBLK_COUNT: usize = 3;
/// Frame slots per frame manager.
pub const FRAMEMGR_MAX_REQUEST: usize = 8;

/// Supported Exynos5420 boards.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Board {
    Universal5420,
    Vienna,
    N1,
}

/// Firmware ABI revision. The shared-area offsets below are an agreement with
/// one specific firmware binary; nothing negotiates them at runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FirmwareAbi {
    /// Exynos5420 "mc2" firmware (A5 core, 62 parameter indexes).
    Exynos5420Mc2,
}

/// Word offsets into `IsRegion::shared` used as side channels for buffer
/// address tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SharedOffsets {
    pub dis_buffers: usize,
    pub tdnr_buffers: usize,
    pub scp_buffers: usize,
    pub scc_buffers: usize,
}

impl FirmwareAbi {
    pub const fn shared_offsets(self) -> SharedOffsets {
        match self {
            FirmwareAbi::Exynos5420Mc2 => SharedOffsets {
                dis_buffers: 300,
                tdnr_buffers: 350,
                scp_buffers: 400,
                scc_buffers: 447,
            },
        }
    }
}

/// Per-slot sensor wiring on a board.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SensorSlot {
    pub id: SensorId,
    /// FIMC-LITE / CSIS channel the sensor is wired to.
    pub channel: u32,
    pub csi_lanes: u32,
    pub i2c_addr: u8,
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Bytes reserved at the start of ISP memory for firmware and setfile.
    pub fw_area_size: usize,
    pub dis_buffer_size: usize,
    pub dis_buffer_count: usize,
    pub tdnr_buffer_size: usize,
    pub tdnr_buffer_count: usize,
}

#[derive(Debug, Clone)]
pub struct Timeouts {
    pub command_ms: u32,
    pub sensor_command_ms: u32,
    pub init_message_ms: u32,
    /// How long to wait for the mailbox to accept the next doorbell.
    pub mailbox_ready_us: u32,
    pub flite_last_capture_ms: u32,
    /// Fixed delay after a forced FIMC-LITE stop.
    pub flite_force_stop_delay_ms: u32,
    pub isp_drain_ms: u32,
}

#[derive(Debug, Clone)]
pub struct FimcIsConfig {
    pub board: Board,
    pub abi: FirmwareAbi,
    pub firmware_name: &'static str,
    pub rear: SensorSlot,
    pub front: Option<SensorSlot>,
    pub memory: MemoryConfig,
    pub timeouts: Timeouts,
    pub work_count: usize,
    pub nblk_count: usize,
    pub frame_count: usize,
    /// Frames whose SCC/SCP outputs are suppressed after a DIS reconfiguration.
    pub dis_skip_frames: u32,
    /// Polling granularity of blocking waits.
    pub poll_interval_us: u32,
}

impl FimcIsConfig {
    pub fn new(board: Board) -> Self {
        match board {
            Board::Universal5420 => Self::new_universal(),
            Board::Vienna => Self::new_vienna(),
            Board::N1 => Self::new_n1(),
        }
    }

    fn base(board: Board, rear: SensorSlot, front: Option<SensorSlot>) -> Self {
        Self {
            board,
            abi: FirmwareAbi::Exynos5420Mc2,
            firmware_name: "fimc_is_fw2.bin",
            rear,
            front,
            memory: MemoryConfig {
                fw_area_size: 0x00A0_0000,
                dis_buffer_size: 0x0030_0000,
                dis_buffer_count: 4,
                tdnr_buffer_size: 0x0030_0000,
                tdnr_buffer_count: 2,
            },
            timeouts: Timeouts {
                command_ms: FIMC_IS_SHUTDOWN_TIMEOUT_MS,
                sensor_command_ms: FIMC_IS_SENSOR_TIMEOUT_MS,
                init_message_ms: 3_000,
                mailbox_ready_us: 10_000,
                flite_last_capture_ms: 200,
                flite_force_stop_delay_ms: 10,
                isp_drain_ms: 3_000,
            },
            work_count: MAX_WORK_COUNT,
            nblk_count: MAX_NBLK_COUNT,
            frame_count: FRAMEMGR_MAX_REQUEST,
            dis_skip_frames: 2,
            poll_interval_us: 1_000,
        }
    }

    fn new_universal() -> Self {
        Self::base(
            Board::Universal5420,
            SensorSlot {
                id: SensorId::Imx135,
                channel: 0,
                csi_lanes: 4,
                i2c_addr: 0x10,
            },
            Some(SensorSlot {
                id: SensorId::S5k6b2,
                channel: 1,
                csi_lanes: 1,
                i2c_addr: 0x35,
            }),
        )
    }

    fn new_vienna() -> Self {
        let mut config = Self::base(
            Board::Vienna,
            SensorSlot {
                id: SensorId::S5k3l2,
                channel: 0,
                csi_lanes: 4,
                i2c_addr: 0x10,
            },
            Some(SensorSlot {
                id: SensorId::S5k6b2,
                channel: 1,
                csi_lanes: 1,
                i2c_addr: 0x35,
            }),
        );
        config.firmware_name = "fimc_is_fw2_vienna.bin";
        config
    }

    fn new_n1() -> Self {
        let mut config = Self::base(
            Board::N1,
            SensorSlot {
                id: SensorId::Imx135,
                channel: 0,
                csi_lanes: 4,
                i2c_addr: 0x10,
            },
            None,
        );
        config.dis_skip_frames = 3;
        config
    }

    pub fn shared_offsets(&self) -> SharedOffsets {
        self.abi.shared_offsets()
    }

    /// Slot for the requested sensor, if this board wires it.
    pub fn sensor_slot(&self, id: SensorId) -> Option<SensorSlot> {
        if self.rear.id == id {
            return Some(self.rear);
        }
        self.front.filter(|slot| slot.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_tables_do_not_overlap() {
        let off = FirmwareAbi::Exynos5420Mc2.shared_offsets();
        assert!(off.dis_buffers < off.tdnr_buffers);
        assert!(off.tdnr_buffers < off.scp_buffers);
        assert!(off.scp_buffers + FRAMEMGR_MAX_REQUEST <= off.scc_buffers);
        assert!(off.scc_buffers + FRAMEMGR_MAX_REQUEST <= crate::region::MAX_SHARED_COUNT);
    }

    #[test]
    fn boards_wire_rear_sensor_on_channel_zero() {
        for board in [Board::Universal5420, Board::Vienna, Board::N1] {
            let config = FimcIsConfig::new(board);
            assert_eq!(config.rear.channel, 0);
            assert_eq!(config.sensor_slot(config.rear.id), Some(config.rear));
        }
        assert!(FimcIsConfig::new(Board::N1).front.is_none());
    }
}
