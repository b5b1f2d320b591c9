//! Camera controls from the video node control surface.

use crate::{
    err::{FimcIsError, Result},
    geometry::{Rect, center_crop, zoom_crop},
    osal::Osal,
    platform::PlatformOps,
    region::{ParamId, ParamSet, param::consts::*},
};

use super::{Feature, Ischain, IschainState, chain};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoMode {
    Auto,
    Manual(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteBalance {
    Auto,
    Daylight,
    Cloudy,
    Tungsten,
    Fluorescent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfMode {
    Manual,
    Single,
    Continuous,
    Touch { x: u32, y: u32 },
    Sleep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEffect {
    None,
    Mono,
    NegativeMono,
    Sepia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metering {
    Average,
    Spot,
    Matrix,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMode {
    Off,
    On,
    Auto,
    Torch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraControl {
    Iso(IsoMode),
    WhiteBalance(WhiteBalance),
    AfMode(AfMode),
    /// Zoom ratio in hundredths, 100 is no zoom.
    DigitalZoom(u32),
    ImageEffect(ImageEffect),
    Metering(Metering),
    Flash(FlashMode),
    FrameRate(u32),
    Odc(bool),
    Dis(bool),
    Tdnr(bool),
}

impl<O: Osal, P: PlatformOps> Ischain<O, P> {
    /// Apply one control: mutate the parameter blocks, set-param, apply.
    pub fn s_ctrl(&mut self, ctrl: CameraControl) -> Result<()> {
        if !self.state.contains(IschainState::OPEN) {
            return Err(FimcIsError::InvalidState);
        }
        let feature = match ctrl {
            CameraControl::Odc(on) => Some((Feature::Odc, on)),
            CameraControl::Dis(on) => Some((Feature::Dis, on)),
            CameraControl::Tdnr(on) => Some((Feature::Tdnr, on)),
            _ => None,
        };
        if let Some((feature, on)) = feature {
            return self.set_feature(feature, on);
        }

        let sizes = self.sizes;
        let mut set = ParamSet::new();
        let params = &mut self.region_mut()?.parameter;
        match ctrl {
            CameraControl::Iso(mode) => {
                let (cmd, value) = match mode {
                    IsoMode::Auto => (ISP_ISO_COMMAND_AUTO, 0),
                    IsoMode::Manual(value) => (ISP_ISO_COMMAND_MANUAL, value),
                };
                params.isp.iso.cmd = cmd;
                params.isp.iso.value = value;
                set.mark(ParamId::IspIso);
            }
            CameraControl::WhiteBalance(wb) => {
                let (cmd, value) = match wb {
                    WhiteBalance::Auto => (ISP_AWB_COMMAND_AUTO, 0),
                    WhiteBalance::Daylight => (ISP_AWB_COMMAND_ILLUMINATION, ISP_AWB_ILLUMINATION_DAYLIGHT),
                    WhiteBalance::Cloudy => (ISP_AWB_COMMAND_ILLUMINATION, ISP_AWB_ILLUMINATION_CLOUDY),
                    WhiteBalance::Tungsten => (ISP_AWB_COMMAND_ILLUMINATION, ISP_AWB_ILLUMINATION_TUNGSTEN),
                    WhiteBalance::Fluorescent => {
                        (ISP_AWB_COMMAND_ILLUMINATION, ISP_AWB_ILLUMINATION_FLUORESCENT)
                    }
                };
                params.isp.awb.cmd = cmd;
                params.isp.awb.value = value;
                set.mark(ParamId::IspAwb);
            }
            CameraControl::AfMode(mode) => {
                let aa = &mut params.isp.aa;
                aa.cmd = ISP_AA_COMMAND_START;
                aa.target = ISP_AA_TARGET_AF;
                aa.sleep = 0;
                aa.mode = match mode {
                    AfMode::Manual => ISP_AF_MODE_MANUAL,
                    AfMode::Single => ISP_AF_MODE_SINGLE,
                    AfMode::Continuous => ISP_AF_MODE_CONTINUOUS,
                    AfMode::Touch { x, y } => {
                        if x >= sizes.chain0.width || y >= sizes.chain0.height {
                            return Err(FimcIsError::InvalidArgument);
                        }
                        aa.touch_x = x;
                        aa.touch_y = y;
                        ISP_AF_MODE_TOUCH
                    }
                    AfMode::Sleep => {
                        aa.sleep = 1;
                        ISP_AF_MODE_SLEEP
                    }
                };
                set.mark(ParamId::IspAa);
            }
            CameraControl::DigitalZoom(ratio) => {
                let zoom = zoom_crop(sizes.chain0, ratio)?;
                let aspect = center_crop(zoom.size(), sizes.chain1);
                let crop = Rect {
                    x: zoom.x + aspect.x,
                    y: zoom.y + aspect.y,
                    ..aspect
                };
                chain::s_scalerc_crop(params, sizes.chain0, crop, sizes.chain1, &mut set);
            }
            CameraControl::ImageEffect(effect) => {
                params.isp.effect.cmd = match effect {
                    ImageEffect::None => ISP_IMAGE_EFFECT_DISABLE,
                    ImageEffect::Mono => ISP_IMAGE_EFFECT_MONOCHROME,
                    ImageEffect::NegativeMono => ISP_IMAGE_EFFECT_NEGATIVE_MONO,
                    ImageEffect::Sepia => ISP_IMAGE_EFFECT_SEPIA,
                };
                set.mark(ParamId::IspImageEffect);
            }
            CameraControl::Metering(metering) => {
                let win = sizes.chain0;
                let m = &mut params.isp.metering;
                m.cmd = match metering {
                    Metering::Average => ISP_METERING_COMMAND_AVERAGE,
                    Metering::Spot => ISP_METERING_COMMAND_SPOT,
                    Metering::Matrix => ISP_METERING_COMMAND_MATRIX,
                    Metering::Center => ISP_METERING_COMMAND_CENTER,
                };
                m.win_pos_x = 0;
                m.win_pos_y = 0;
                m.win_width = win.width;
                m.win_height = win.height;
                set.mark(ParamId::IspMetering);
            }
            CameraControl::Flash(mode) => {
                params.isp.flash.cmd = match mode {
                    FlashMode::Off => ISP_FLASH_COMMAND_DISABLE,
                    FlashMode::On => ISP_FLASH_COMMAND_MANUALON,
                    FlashMode::Auto => ISP_FLASH_COMMAND_AUTO,
                    FlashMode::Torch => ISP_FLASH_COMMAND_TORCH,
                };
                set.mark(ParamId::IspFlash);
            }
            CameraControl::FrameRate(fps) => {
                if fps == 0 {
                    return Err(FimcIsError::InvalidArgument);
                }
                let config = &mut params.sensor.config;
                config.framerate = fps;
                config.min_target_fps = fps;
                config.max_target_fps = fps;
                let frametime = 1_000_000 / fps;
                params.isp.otf_input.frametime_min = frametime;
                params.isp.otf_input.frametime_max = frametime;
                set.mark(ParamId::SensorConfig);
                set.mark(ParamId::IspOtfInput);
            }
            CameraControl::Odc(_) | CameraControl::Dis(_) | CameraControl::Tdnr(_) => {}
        }

        self.commit(&set)?;
        self.apply()?;
        debug!("[ISC:{}] {:?} applied", self.instance, ctrl);
        Ok(())
    }
}
