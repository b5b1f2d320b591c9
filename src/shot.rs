//! Per-frame shot metadata exchanged with the ISP firmware.
//!
//! A shot is the control/dynamic-metadata record that travels with every
//! bayer frame submitted through `HIC_SHOT`. The driver keeps an AP-side copy
//! in each frame descriptor and mirrors it into a shot slot inside ISP memory
//! right before the command is sent.

use bitflags::bitflags;

bitflags! {
    /// Outputs that still owe a completion for a frame.
    ///
    /// This is the single definition shared by the frame manager, the
    /// interface work handlers and the ischain dispatcher.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RequestFlags: u32 {
        /// Dynamic metadata (meta-done interrupt).
        const MDT = 1 << 0;
        /// Scaler-capture DMA output.
        const SCC = 1 << 1;
        /// Scaler-preview DMA output.
        const SCP = 1 << 2;
    }
}

pub const SHOT_MAGIC: u32 = 0x2301_2002;

/// Number of target address slots per scaler output (one per plane).
pub const SCALER_TARGET_COUNT: usize = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCtl {
    pub frame_count: u32,
    pub id: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorCtl {
    /// Nanoseconds.
    pub exposure_time: u64,
    /// Nanoseconds.
    pub frame_duration: u64,
    pub sensitivity: u32,
    pub reserved: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AaCtl {
    pub mode: u32,
    pub ae_mode: u32,
    pub af_mode: u32,
    pub awb_mode: u32,
    pub ae_target_fps_min: u32,
    pub ae_target_fps_max: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShotCtl {
    pub request: RequestCtl,
    pub sensor: SensorCtl,
    pub aa: AaCtl,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorDm {
    pub exposure_time: u64,
    pub frame_duration: u64,
    /// Start-of-exposure timestamp in nanoseconds.
    pub timestamp: u64,
    pub sensitivity: u32,
    pub reserved: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShotDm {
    pub request: RequestCtl,
    pub sensor: SensorDm,
    pub aa_state: u32,
    pub face_count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScalerUd {
    pub scc_target_address: [u32; SCALER_TARGET_COUNT],
    pub scp_target_address: [u32; SCALER_TARGET_COUNT],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShotUctl {
    pub u_update_bitmap: u32,
    pub reserved: u32,
    pub scaler_ud: ScalerUd,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Camera2Shot {
    pub ctl: ShotCtl,
    pub dm: ShotDm,
    pub uctl: ShotUctl,
    pub magic_number: u32,
    pub reserved: u32,
}

/// Shot plus the driver-side routing fields the HAL fills in.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShotExt {
    request_flags: u32,
    /// Non-zero when DIS should be bypassed for this frame.
    pub dis_bypass: u32,
    /// Non-zero when 3DNR should be bypassed for this frame.
    pub dnr_bypass: u32,
    /// Non-zero when face detection should be bypassed for this frame.
    pub fd_bypass: u32,
    pub shot: Camera2Shot,
}

impl ShotExt {
    pub fn new(requests: RequestFlags) -> Self {
        let mut ext = Self {
            request_flags: requests.bits(),
            dis_bypass: 1,
            dnr_bypass: 1,
            fd_bypass: 1,
            ..Default::default()
        };
        ext.shot.magic_number = SHOT_MAGIC;
        ext
    }

    pub fn requests(&self) -> RequestFlags {
        RequestFlags::from_bits_truncate(self.request_flags)
    }

    pub fn set_requests(&mut self, requests: RequestFlags) {
        self.request_flags = requests.bits();
    }

    pub fn wants_dis(&self) -> bool {
        self.dis_bypass == 0
    }

    pub fn wants_dnr(&self) -> bool {
        self.dnr_bypass == 0
    }

    pub fn wants_fd(&self) -> bool {
        self.fd_bypass == 0
    }

    pub fn frame_count(&self) -> u32 {
        self.shot.ctl.request.frame_count
    }

    /// Take the dynamic metadata written back by the firmware.
    pub fn update_dm(&mut self, from: &ShotExt) {
        self.shot.dm = from.shot.dm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_shot_bypasses_optional_stages() {
        let ext = ShotExt::new(RequestFlags::MDT | RequestFlags::SCP);
        assert!(!ext.wants_dis());
        assert!(!ext.wants_dnr());
        assert!(!ext.wants_fd());
        assert_eq!(ext.requests(), RequestFlags::MDT | RequestFlags::SCP);
        assert_eq!(ext.shot.magic_number, SHOT_MAGIC);
    }

    #[test]
    fn unknown_request_bits_are_dropped() {
        let mut ext = ShotExt::new(RequestFlags::empty());
        ext.request_flags = 0xFF;
        assert_eq!(ext.requests(), RequestFlags::all());
    }
}
