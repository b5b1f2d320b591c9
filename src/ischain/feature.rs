//! Optional stages that can be switched while the chain is open.

use alloc::vec::Vec;

use crate::{
    err::{FimcIsError, Result},
    osal::Osal,
    platform::PlatformOps,
    region::{MAX_SHARED_COUNT, ParamId, ParamSet, param::consts::*},
};

use super::{Ischain, IschainState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Optical distortion correction.
    Odc,
    /// Digital image stabilization.
    Dis,
    /// 3D noise reduction.
    Tdnr,
    /// Face detection.
    Fd,
}

impl<O: Osal, P: PlatformOps> Ischain<O, P> {
    pub fn feature_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Odc => self.stages.odc,
            Feature::Dis => self.stages.dis,
            Feature::Tdnr => self.stages.tdnr,
            Feature::Fd => self.stages.fd,
        }
    }

    fn set_stage_flag(&mut self, feature: Feature, on: bool) {
        match feature {
            Feature::Odc => self.stages.odc = on,
            Feature::Dis => self.stages.dis = on,
            Feature::Tdnr => self.stages.tdnr = on,
            Feature::Fd => self.stages.fd = on,
        }
    }

    /// Write the control block of `feature` and return what changed.
    fn write_feature(&mut self, feature: Feature, on: bool) -> Result<ParamSet> {
        let offsets = self.config.shared_offsets();
        let memory = self.memory.as_ref().ok_or(FimcIsError::InvalidState)?;
        let (table, buffers) = match feature {
            Feature::Dis => (offsets.dis_buffers, memory.dis_buffers()),
            Feature::Tdnr => (offsets.tdnr_buffers, memory.tdnr_buffers()),
            Feature::Odc | Feature::Fd => (0, Vec::new()),
        };
        let table_dva = memory.shared_dva(table);
        let bypass = if on {
            CONTROL_BYPASS_DISABLE
        } else {
            CONTROL_BYPASS_ENABLE
        };

        let region = self.region_mut()?;
        for (slot, dva) in region.shared[table..MAX_SHARED_COUNT].iter_mut().zip(&buffers) {
            *slot = *dva;
        }

        let mut set = ParamSet::new();
        let params = &mut region.parameter;
        match feature {
            Feature::Odc => {
                params.odc.control.cmd = CONTROL_COMMAND_START;
                params.odc.control.bypass = bypass;
                set.mark(ParamId::OdcControl);
            }
            Feature::Dis => {
                let control = &mut params.dis.control;
                control.cmd = CONTROL_COMMAND_START;
                control.bypass = bypass;
                control.buffer_number = buffers.len() as u32;
                control.buffer_address = table_dva;
                set.mark(ParamId::DisControl);
            }
            Feature::Tdnr => {
                let control = &mut params.tdnr.control;
                control.cmd = CONTROL_COMMAND_START;
                control.bypass = bypass;
                control.buffer_number = buffers.len() as u32;
                control.buffer_address = table_dva;
                params.tdnr.frame.cmd = TDNR_1ST_FRAME_COMMAND_NOPROCESSING;
                set.mark(ParamId::TdnrControl);
                set.mark(ParamId::Tdnr1stFrame);
            }
            Feature::Fd => {
                params.fd.control.cmd = if on {
                    CONTROL_COMMAND_START
                } else {
                    CONTROL_COMMAND_STOP
                };
                params.fd.control.bypass = bypass;
                set.mark(ParamId::FdControl);
            }
        }
        Ok(set)
    }

    /// Switch a stage between shots: process off, new parameters, process on.
    pub(crate) fn toggle_stage(&mut self, feature: Feature, on: bool) -> Result<()> {
        debug!(
            "[ISC:{}] {:?} {} (hot)",
            self.instance,
            feature,
            if on { "on" } else { "off" }
        );
        self.interface.process_stop(self.instance)?;
        let set = self.write_feature(feature, on)?;
        self.commit(&set)?;
        self.apply()?;
        self.set_stage_flag(feature, on);
        self.interface.process_start(self.instance)
    }

    /// Userspace on/off of a stage.
    ///
    /// The stream is stopped around the change if it was running. A failure
    /// part way leaves the firmware wherever it got to.
    pub fn set_feature(&mut self, feature: Feature, on: bool) -> Result<()> {
        if !self.state.contains(IschainState::OPEN) {
            return Err(FimcIsError::InvalidState);
        }
        let streaming = self.interface.is_streaming();
        if streaming {
            self.interface.stream_off(self.instance)?;
        }
        let set = self.write_feature(feature, on)?;
        self.commit(&set)?;
        self.apply()?;
        self.set_stage_flag(feature, on);
        if streaming {
            self.interface.stream_on(self.instance)?;
        }
        info!(
            "[ISC:{}] {:?} {}",
            self.instance,
            feature,
            if on { "on" } else { "off" }
        );
        Ok(())
    }
}
