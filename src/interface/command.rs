//! Mailbox command codes and the message envelope.

// Host to IS core.
pub const HIC_PREVIEW_STILL: u32 = 0x1;
pub const HIC_PREVIEW_VIDEO: u32 = 0x2;
pub const HIC_CAPTURE_STILL: u32 = 0x3;
pub const HIC_CAPTURE_VIDEO: u32 = 0x4;
pub const HIC_PROCESS_START: u32 = 0x5;
pub const HIC_PROCESS_STOP: u32 = 0x6;
pub const HIC_STREAM_ON: u32 = 0x7;
pub const HIC_STREAM_OFF: u32 = 0x8;
pub const HIC_SHOT: u32 = 0x9;
pub const HIC_GET_STATIC_METADATA: u32 = 0xA;
pub const HIC_SET_CAM_CONTROL: u32 = 0xB;
pub const HIC_GET_CAM_CONTROL: u32 = 0xC;
pub const HIC_SET_PARAMETER: u32 = 0xD;
pub const HIC_GET_PARAMETER: u32 = 0xE;
pub const HIC_SET_A5_MAP: u32 = 0xF;
pub const HIC_SET_A5_UNMAP: u32 = 0x10;
pub const HIC_GET_STATUS: u32 = 0x11;
pub const HIC_OPEN_SENSOR: u32 = 0x12;
pub const HIC_CLOSE_SENSOR: u32 = 0x13;
pub const HIC_SIMMIAN_INIT: u32 = 0x14;
pub const HIC_SIMMIAN_WRITE: u32 = 0x15;
pub const HIC_SIMMIAN_READ: u32 = 0x16;
pub const HIC_POWER_DOWN: u32 = 0x17;
pub const HIC_GET_SET_FILE_ADDR: u32 = 0x18;
pub const HIC_LOAD_SET_FILE: u32 = 0x19;
pub const HIC_MSG_CONFIG: u32 = 0x1A;
pub const HIC_MSG_TEST: u32 = 0x1B;
pub const HIC_ISP_I2C_CONTROL: u32 = 0x1C;
pub const HIC_CALIBRATE_ACTUATOR: u32 = 0x1D;
pub const HIC_GET_IP_STATUS: u32 = 0x1E;
pub const HIC_I2C_CONTROL_LOCK: u32 = 0x1F;
pub const HIC_SYSTEM_CONTROL: u32 = 0x20;
pub const HIC_SENSOR_MODE_CHANGE: u32 = 0x21;
pub const HIC_COMMAND_END: u32 = 0x22;

// IS core to host.
pub const IHC_GET_SENSOR_NUMBER: u32 = 0x1000;
pub const IHC_SET_SHOT_MARK: u32 = 0x1001;
pub const IHC_SET_FACE_MARK: u32 = 0x1002;
pub const IHC_FRAME_DONE: u32 = 0x1003;
pub const IHC_AA_DONE: u32 = 0x1004;
pub const IHC_NOT_READY: u32 = 0x1005;
pub const IHC_FLASH_READY: u32 = 0x1006;

// Replies; `param1` carries the command being answered.
pub const ISR_DONE: u32 = 0x2000;
pub const ISR_NDONE: u32 = 0x2001;

/// Printable name of a mailbox code.
pub fn command_name(code: u32) -> &'static str {
    match code {
        HIC_PREVIEW_STILL => "HIC_PREVIEW_STILL",
        HIC_PREVIEW_VIDEO => "HIC_PREVIEW_VIDEO",
        HIC_CAPTURE_STILL => "HIC_CAPTURE_STILL",
        HIC_CAPTURE_VIDEO => "HIC_CAPTURE_VIDEO",
        HIC_PROCESS_START => "HIC_PROCESS_START",
        HIC_PROCESS_STOP => "HIC_PROCESS_STOP",
        HIC_STREAM_ON => "HIC_STREAM_ON",
        HIC_STREAM_OFF => "HIC_STREAM_OFF",
        HIC_SHOT => "HIC_SHOT",
        HIC_GET_STATIC_METADATA => "HIC_GET_STATIC_METADATA",
        HIC_SET_CAM_CONTROL => "HIC_SET_CAM_CONTROL",
        HIC_GET_CAM_CONTROL => "HIC_GET_CAM_CONTROL",
        HIC_SET_PARAMETER => "HIC_SET_PARAMETER",
        HIC_GET_PARAMETER => "HIC_GET_PARAMETER",
        HIC_SET_A5_MAP => "HIC_SET_A5_MAP",
        HIC_SET_A5_UNMAP => "HIC_SET_A5_UNMAP",
        HIC_GET_STATUS => "HIC_GET_STATUS",
        HIC_OPEN_SENSOR => "HIC_OPEN_SENSOR",
        HIC_CLOSE_SENSOR => "HIC_CLOSE_SENSOR",
        HIC_SIMMIAN_INIT => "HIC_SIMMIAN_INIT",
        HIC_SIMMIAN_WRITE => "HIC_SIMMIAN_WRITE",
        HIC_SIMMIAN_READ => "HIC_SIMMIAN_READ",
        HIC_POWER_DOWN => "HIC_POWER_DOWN",
        HIC_GET_SET_FILE_ADDR => "HIC_GET_SET_FILE_ADDR",
        HIC_LOAD_SET_FILE => "HIC_LOAD_SET_FILE",
        HIC_MSG_CONFIG => "HIC_MSG_CONFIG",
        HIC_MSG_TEST => "HIC_MSG_TEST",
        HIC_ISP_I2C_CONTROL => "HIC_ISP_I2C_CONTROL",
        HIC_CALIBRATE_ACTUATOR => "HIC_CALIBRATE_ACTUATOR",
        HIC_GET_IP_STATUS => "HIC_GET_IP_STATUS",
        HIC_I2C_CONTROL_LOCK => "HIC_I2C_CONTROL_LOCK",
        HIC_SYSTEM_CONTROL => "HIC_SYSTEM_CONTROL",
        HIC_SENSOR_MODE_CHANGE => "HIC_SENSOR_MODE_CHANGE",
        IHC_GET_SENSOR_NUMBER => "IHC_GET_SENSOR_NUMBER",
        IHC_SET_SHOT_MARK => "IHC_SET_SHOT_MARK",
        IHC_SET_FACE_MARK => "IHC_SET_FACE_MARK",
        IHC_FRAME_DONE => "IHC_FRAME_DONE",
        IHC_AA_DONE => "IHC_AA_DONE",
        IHC_NOT_READY => "IHC_NOT_READY",
        IHC_FLASH_READY => "IHC_FLASH_READY",
        ISR_DONE => "ISR_DONE",
        ISR_NDONE => "ISR_NDONE",
        _ => "UNKNOWN",
    }
}

/// Commands sent on the non-blocking path. Their replies free a pool slot
/// instead of waking a waiter.
pub const fn is_nblk_command(code: u32) -> bool {
    matches!(code, HIC_SHOT | HIC_SET_CAM_CONTROL)
}

/// One command or reply: a code, the instance (sensor) it targets and four
/// parameter words, exactly as laid out in the mailbox registers.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsMessage {
    pub command: u32,
    pub instance: u32,
    pub param1: u32,
    pub param2: u32,
    pub param3: u32,
    pub param4: u32,
}

impl IsMessage {
    pub const fn new(command: u32, instance: u32) -> Self {
        Self {
            command,
            instance,
            param1: 0,
            param2: 0,
            param3: 0,
            param4: 0,
        }
    }

    pub const fn with_params(mut self, param1: u32, param2: u32, param3: u32, param4: u32) -> Self {
        self.param1 = param1;
        self.param2 = param2;
        self.param3 = param3;
        self.param4 = param4;
        self
    }

    pub const fn is_reply(&self) -> bool {
        self.command == ISR_DONE || self.command == ISR_NDONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_contiguous() {
        assert_eq!(HIC_COMMAND_END, HIC_SENSOR_MODE_CHANGE + 1);
        for code in HIC_PREVIEW_STILL..HIC_COMMAND_END {
            assert_ne!(command_name(code), "UNKNOWN", "code {:#x}", code);
        }
    }

    #[test]
    fn only_shot_and_cam_control_are_nblk() {
        let nblk: usize = (HIC_PREVIEW_STILL..HIC_COMMAND_END)
            .filter(|&code| is_nblk_command(code))
            .count();
        assert_eq!(nblk, 2);
        assert!(is_nblk_command(HIC_SHOT));
        assert!(!is_nblk_command(HIC_STREAM_ON));
    }
}
