//! Parameter blocks read by the ISP firmware.
//!
//! Every block is exactly [`PARAMETER_MAX_SIZE`] bytes and ends with an
//! error word the firmware fills in when it refuses a setting. The order of
//! blocks inside [`super::IsParamRegion`] defines their parameter index.

pub const PARAMETER_MAX_SIZE: usize = 64;

pub mod consts {
    pub const CONTROL_COMMAND_STOP: u32 = 0;
    pub const CONTROL_COMMAND_START: u32 = 1;
    pub const CONTROL_BYPASS_DISABLE: u32 = 0;
    pub const CONTROL_BYPASS_ENABLE: u32 = 1;

    pub const OTF_INPUT_COMMAND_DISABLE: u32 = 0;
    pub const OTF_INPUT_COMMAND_ENABLE: u32 = 1;
    pub const OTF_INPUT_FORMAT_BAYER: u32 = 0;
    pub const OTF_INPUT_FORMAT_YUV444: u32 = 1;
    pub const OTF_INPUT_BIT_WIDTH_10BIT: u32 = 10;
    pub const OTF_INPUT_BIT_WIDTH_12BIT: u32 = 12;

    pub const OTF_OUTPUT_COMMAND_DISABLE: u32 = 0;
    pub const OTF_OUTPUT_COMMAND_ENABLE: u32 = 1;
    pub const OTF_OUTPUT_FORMAT_YUV444: u32 = 1;
    pub const OTF_OUTPUT_FORMAT_YUV422: u32 = 2;
    pub const OTF_OUTPUT_BIT_WIDTH_8BIT: u32 = 8;
    pub const OTF_OUTPUT_BIT_WIDTH_12BIT: u32 = 12;

    pub const DMA_INPUT_COMMAND_DISABLE: u32 = 0;
    pub const DMA_INPUT_COMMAND_ENABLE: u32 = 1;
    pub const DMA_INPUT_FORMAT_BAYER: u32 = 0;
    pub const DMA_INPUT_FORMAT_YUV422: u32 = 2;

    pub const DMA_OUTPUT_COMMAND_DISABLE: u32 = 0;
    pub const DMA_OUTPUT_COMMAND_ENABLE: u32 = 1;
    pub const DMA_OUTPUT_FORMAT_YUV422: u32 = 2;
    pub const DMA_OUTPUT_FORMAT_YUV420: u32 = 3;
    pub const DMA_OUTPUT_BIT_WIDTH_8BIT: u32 = 8;
    pub const DMA_OUTPUT_NOTIFY_DMA_DONE_ENABLE: u32 = 1;

    pub const SCALER_CROP_COMMAND_DISABLE: u32 = 0;
    pub const SCALER_CROP_COMMAND_ENABLE: u32 = 1;

    pub const ISP_AA_COMMAND_START: u32 = 1;
    pub const ISP_AA_COMMAND_STOP: u32 = 0;
    pub const ISP_AA_TARGET_AF: u32 = 1 << 1;
    pub const ISP_AA_TARGET_AE: u32 = 1 << 2;
    pub const ISP_AA_TARGET_AWB: u32 = 1 << 3;

    pub const ISP_AF_MODE_MANUAL: u32 = 0;
    pub const ISP_AF_MODE_SINGLE: u32 = 1;
    pub const ISP_AF_MODE_CONTINUOUS: u32 = 2;
    pub const ISP_AF_MODE_TOUCH: u32 = 3;
    pub const ISP_AF_MODE_SLEEP: u32 = 4;

    pub const ISP_AWB_COMMAND_AUTO: u32 = 0;
    pub const ISP_AWB_COMMAND_ILLUMINATION: u32 = 1;
    pub const ISP_AWB_ILLUMINATION_DAYLIGHT: u32 = 0;
    pub const ISP_AWB_ILLUMINATION_CLOUDY: u32 = 1;
    pub const ISP_AWB_ILLUMINATION_TUNGSTEN: u32 = 2;
    pub const ISP_AWB_ILLUMINATION_FLUORESCENT: u32 = 3;

    pub const ISP_ISO_COMMAND_AUTO: u32 = 0;
    pub const ISP_ISO_COMMAND_MANUAL: u32 = 1;

    pub const ISP_IMAGE_EFFECT_DISABLE: u32 = 0;
    pub const ISP_IMAGE_EFFECT_MONOCHROME: u32 = 1;
    pub const ISP_IMAGE_EFFECT_NEGATIVE_MONO: u32 = 2;
    pub const ISP_IMAGE_EFFECT_SEPIA: u32 = 4;

    pub const ISP_METERING_COMMAND_AVERAGE: u32 = 0;
    pub const ISP_METERING_COMMAND_SPOT: u32 = 1;
    pub const ISP_METERING_COMMAND_MATRIX: u32 = 2;
    pub const ISP_METERING_COMMAND_CENTER: u32 = 3;

    pub const ISP_FLASH_COMMAND_DISABLE: u32 = 0;
    pub const ISP_FLASH_COMMAND_MANUALON: u32 = 1;
    pub const ISP_FLASH_COMMAND_AUTO: u32 = 2;
    pub const ISP_FLASH_COMMAND_TORCH: u32 = 3;

    pub const ISP_AFC_COMMAND_AUTO: u32 = 2;

    pub const GLOBAL_SHOTMODE_MODE_PREVIEW: u32 = 0;
    pub const TDNR_1ST_FRAME_COMMAND_NOPROCESSING: u32 = 0;
    pub const FD_CONFIG_COMMAND_MAXIMUM_NUMBER: u32 = 1;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamControl {
    pub cmd: u32,
    pub bypass: u32,
    pub buffer_address: u32,
    pub buffer_number: u32,
    pub run_mode: u32,
    reserved: [u32; 10],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamOtfInput {
    pub cmd: u32,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub bitwidth: u32,
    pub order: u32,
    pub crop_offset_x: u32,
    pub crop_offset_y: u32,
    pub crop_width: u32,
    pub crop_height: u32,
    pub frametime_min: u32,
    pub frametime_max: u32,
    reserved: [u32; 3],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamDmaInput {
    pub cmd: u32,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub bitwidth: u32,
    pub plane: u32,
    pub order: u32,
    pub buffer_number: u32,
    pub buffer_address: u32,
    reserved: [u32; 6],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamOtfOutput {
    pub cmd: u32,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub bitwidth: u32,
    pub order: u32,
    pub crop_offset_x: u32,
    pub crop_offset_y: u32,
    reserved: [u32; 7],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamDmaOutput {
    pub cmd: u32,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub bitwidth: u32,
    pub plane: u32,
    pub order: u32,
    pub buffer_number: u32,
    pub buffer_address: u32,
    pub notify_dma_done: u32,
    pub dma_out_mask: u32,
    reserved: [u32; 4],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamInputCrop {
    pub cmd: u32,
    pub pos_x: u32,
    pub pos_y: u32,
    pub crop_width: u32,
    pub crop_height: u32,
    pub in_width: u32,
    pub in_height: u32,
    pub out_width: u32,
    pub out_height: u32,
    reserved: [u32; 6],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamOutputCrop {
    pub cmd: u32,
    pub pos_x: u32,
    pub pos_y: u32,
    pub crop_width: u32,
    pub crop_height: u32,
    pub format: u32,
    reserved: [u32; 9],
    pub err: u32,
}

/// Blocks carrying a command and at most one value (flash, AWB, ISO,
/// effects, AFC, rotation, flip, 3DNR first frame).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamCmd {
    pub cmd: u32,
    pub value: u32,
    reserved: [u32; 13],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamGlobalShotMode {
    pub cmd: u32,
    pub skip_frames: u32,
    reserved: [u32; 13],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamSensorConfig {
    pub framerate: u32,
    pub min_target_fps: u32,
    pub max_target_fps: u32,
    pub scene_mode: u32,
    reserved: [u32; 11],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamIspAa {
    pub cmd: u32,
    pub target: u32,
    pub mode: u32,
    pub scene: u32,
    pub sleep: u32,
    pub face: u32,
    pub touch_x: u32,
    pub touch_y: u32,
    pub manual_af_setting: u32,
    reserved: [u32; 6],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamIspAdjust {
    pub cmd: u32,
    pub contrast: i32,
    pub saturation: i32,
    pub sharpness: i32,
    pub exposure: i32,
    pub brightness: i32,
    pub hue: i32,
    reserved: [u32; 8],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamIspMetering {
    pub cmd: u32,
    pub win_pos_x: u32,
    pub win_pos_y: u32,
    pub win_width: u32,
    pub win_height: u32,
    reserved: [u32; 10],
    pub err: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamFdConfig {
    pub cmd: u32,
    pub max_number: u32,
    pub roll_angle: u32,
    pub yaw_angle: u32,
    pub smile_mode: u32,
    pub blink_mode: u32,
    pub eye_detect: u32,
    pub mouth_detect: u32,
    pub orientation: u32,
    pub orientation_value: u32,
    reserved: [u32; 5],
    pub err: u32,
}

macro_rules! assert_param_size {
    ($($ty:ty),* $(,)?) => {
        $(const _: () = assert!(core::mem::size_of::<$ty>() == PARAMETER_MAX_SIZE);)*
    };
}

assert_param_size!(
    ParamControl,
    ParamOtfInput,
    ParamDmaInput,
    ParamOtfOutput,
    ParamDmaOutput,
    ParamInputCrop,
    ParamOutputCrop,
    ParamCmd,
    ParamGlobalShotMode,
    ParamSensorConfig,
    ParamIspAa,
    ParamIspAdjust,
    ParamIspMetering,
    ParamFdConfig,
);
