//! The processing chain: power sequencing, parameter commits, per-frame
//! dispatch and completion handling for one sensor instance.
//!
//! All parameter writes funnel through [`Ischain::commit`], which flushes the
//! region before `HIC_SET_PARAMETER` goes out.

pub mod callback;
pub mod chain;
pub mod control;
pub mod feature;

use alloc::sync::Arc;

use bitflags::bitflags;

pub use chain::ChainSizes;
pub use control::*;
pub use feature::Feature;

use crate::{
    config::{FimcIsConfig, SensorSlot},
    err::{FimcIsError, Result},
    firmware::{self, FirmwareInfo, IsMemory},
    framemgr::FrameState,
    geometry::Size,
    interface::{HIC_PREVIEW_STILL, HIC_SHOT, Interface},
    media::MediaGraph,
    osal::Osal,
    platform::PlatformOps,
    region::{IsParamRegion, IsRegion, ParamSet, param::consts::*},
    sensor::SensorInfo,
    video::{VideoKind, VideoQueue},
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IschainState: u32 {
        /// Firmware image copied into ISP memory.
        const LOADED = 1 << 0;
        /// A5 released and the init message received.
        const POWER_ON = 1 << 1;
        /// Sensor opened, setfile and default parameters applied.
        const OPEN = 1 << 2;
        const RUN = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IschainStats {
    pub shots: u32,
    pub frames_done: u32,
    pub frames_failed: u32,
    pub scc_drops: u32,
    pub scp_drops: u32,
    pub skipped_frames: u32,
    pub rejected_shots: u32,
    pub aa_done: u32,
    pub face_marks: u32,
    pub not_ready: u32,
    pub unknown_messages: u32,
}

/// Optional stages currently running (not bypassed) in the firmware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stages {
    pub odc: bool,
    pub dis: bool,
    pub tdnr: bool,
    pub fd: bool,
}

pub struct Ischain<O: Osal, P: PlatformOps> {
    instance: u32,
    osal: O,
    platform: Arc<P>,
    config: FimcIsConfig,
    interface: Arc<Interface<O>>,
    memory: Option<IsMemory<O>>,
    fw_info: Option<FirmwareInfo>,
    state: IschainState,
    clocks_on: bool,
    sizes: ChainSizes,
    stages: Stages,
    scc_started: bool,
    scp_started: bool,
    /// Frames left whose SCC/SCP requests are suppressed.
    skip_frames: u32,
    fcount: u32,
    graph: MediaGraph,
    isp: VideoQueue,
    scc: VideoQueue,
    scp: VideoQueue,
    stats: IschainStats,
}

impl<O: Osal, P: PlatformOps> Ischain<O, P> {
    pub fn new(osal: O, platform: Arc<P>, interface: Arc<Interface<O>>, config: &FimcIsConfig) -> Self {
        let frames = config.frame_count;
        Self {
            instance: 0,
            osal,
            platform,
            config: config.clone(),
            interface,
            memory: None,
            fw_info: None,
            state: IschainState::empty(),
            clocks_on: false,
            sizes: ChainSizes::default(),
            stages: Stages::default(),
            scc_started: false,
            scp_started: false,
            skip_frames: 0,
            fcount: 0,
            graph: MediaGraph::default_pipeline(),
            isp: VideoQueue::new(VideoKind::Isp, frames),
            scc: VideoQueue::new(VideoKind::Scc, frames),
            scp: VideoQueue::new(VideoKind::Scp, frames),
            stats: IschainStats::default(),
        }
    }

    pub fn state(&self) -> IschainState {
        self.state
    }

    pub fn stats(&self) -> IschainStats {
        self.stats
    }

    pub fn stages(&self) -> Stages {
        self.stages
    }

    pub fn sizes(&self) -> ChainSizes {
        self.sizes
    }

    pub fn skip_frames(&self) -> u32 {
        self.skip_frames
    }

    pub fn interface(&self) -> &Arc<Interface<O>> {
        &self.interface
    }

    pub fn firmware_info(&self) -> Option<&FirmwareInfo> {
        self.fw_info.as_ref()
    }

    pub fn graph(&self) -> &MediaGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut MediaGraph {
        &mut self.graph
    }

    pub fn queue(&self, kind: VideoKind) -> Option<&VideoQueue> {
        match kind {
            VideoKind::Isp => Some(&self.isp),
            VideoKind::Scc => Some(&self.scc),
            VideoKind::Scp => Some(&self.scp),
            VideoKind::Sensor => None,
        }
    }

    pub fn queue_mut(&mut self, kind: VideoKind) -> Option<&mut VideoQueue> {
        match kind {
            VideoKind::Isp => Some(&mut self.isp),
            VideoKind::Scc => Some(&mut self.scc),
            VideoKind::Scp => Some(&mut self.scp),
            VideoKind::Sensor => None,
        }
    }

    /// Device address of the parameter region, once memory is allocated.
    pub fn region_dva(&self) -> Option<u32> {
        self.memory.as_ref().map(|memory| memory.region_dva())
    }

    pub fn memory(&self) -> Option<&IsMemory<O>> {
        self.memory.as_ref()
    }

    /// Copy of the parameter blocks as last written by the driver.
    pub fn params(&self) -> Option<IsParamRegion> {
        self.memory.as_ref().map(|memory| memory.region().parameter)
    }

    fn memory_mut(&mut self) -> Result<&mut IsMemory<O>> {
        self.memory.as_mut().ok_or(FimcIsError::InvalidState)
    }

    pub(crate) fn region_mut(&mut self) -> Result<&mut IsRegion> {
        Ok(self.memory_mut()?.region_mut())
    }

    /// Flush the region and tell the firmware to read the blocks in `set`.
    pub(crate) fn commit(&mut self, set: &ParamSet) -> Result<()> {
        if set.is_empty() {
            return Ok(());
        }
        let memory = self.memory.as_ref().ok_or(FimcIsError::InvalidState)?;
        memory.flush_region();
        self.interface.set_param(self.instance, set)
    }

    pub(crate) fn apply(&self) -> Result<()> {
        self.interface.apply_param(self.instance, HIC_PREVIEW_STILL)
    }

    fn default_params(region: &mut IsParamRegion, fps: u32) -> ParamSet {
        region.global.shotmode.cmd = GLOBAL_SHOTMODE_MODE_PREVIEW;
        region.global.shotmode.skip_frames = 0;

        region.sensor.control.cmd = CONTROL_COMMAND_START;
        region.sensor.config.framerate = fps;
        region.sensor.config.min_target_fps = fps;
        region.sensor.config.max_target_fps = fps;

        let isp = &mut region.isp;
        isp.control.cmd = CONTROL_COMMAND_START;
        isp.control.bypass = CONTROL_BYPASS_DISABLE;
        isp.aa.cmd = ISP_AA_COMMAND_START;
        isp.aa.target = ISP_AA_TARGET_AF | ISP_AA_TARGET_AE | ISP_AA_TARGET_AWB;
        isp.aa.mode = ISP_AF_MODE_CONTINUOUS;
        isp.flash.cmd = ISP_FLASH_COMMAND_DISABLE;
        isp.awb.cmd = ISP_AWB_COMMAND_AUTO;
        isp.effect.cmd = ISP_IMAGE_EFFECT_DISABLE;
        isp.iso.cmd = ISP_ISO_COMMAND_AUTO;
        isp.metering.cmd = ISP_METERING_COMMAND_CENTER;
        isp.afc.cmd = ISP_AFC_COMMAND_AUTO;

        region.drc.control.cmd = CONTROL_COMMAND_START;
        region.drc.control.bypass = CONTROL_BYPASS_ENABLE;
        region.scalerc.control.cmd = CONTROL_COMMAND_START;
        region.scalerc.dma_output.cmd = DMA_OUTPUT_COMMAND_DISABLE;

        for control in [
            &mut region.odc.control,
            &mut region.dis.control,
            &mut region.tdnr.control,
        ] {
            control.cmd = CONTROL_COMMAND_START;
            control.bypass = CONTROL_BYPASS_ENABLE;
        }
        region.tdnr.frame.cmd = TDNR_1ST_FRAME_COMMAND_NOPROCESSING;
        region.tdnr.dma_output.cmd = DMA_OUTPUT_COMMAND_DISABLE;

        region.scalerp.control.cmd = CONTROL_COMMAND_START;
        region.scalerp.dma_output.cmd = DMA_OUTPUT_COMMAND_DISABLE;

        region.fd.control.cmd = CONTROL_COMMAND_STOP;
        region.fd.control.bypass = CONTROL_BYPASS_ENABLE;
        region.fd.config.cmd = FD_CONFIG_COMMAND_MAXIMUM_NUMBER;
        region.fd.config.max_number = 5;

        ParamSet::all()
    }

    /// Power the ISP up and bring the sensor instance to OPEN.
    ///
    /// On failure everything acquired so far is released again.
    pub fn open(&mut self, slot: SensorSlot, size: Size, fps: u32) -> Result<()> {
        if !self.state.is_empty() {
            error!("[ISC:{}] open in {:?}", self.instance, self.state);
            return Err(FimcIsError::InvalidState);
        }
        let result = self.open_inner(slot, size, fps);
        if let Err(err) = &result {
            error!("[ISC:{}] open failed: {}", self.instance, err);
            // Best effort, the original error is what the caller needs.
            let _ = self.close();
        }
        result
    }

    fn open_inner(&mut self, slot: SensorSlot, size: Size, fps: u32) -> Result<()> {
        let info: &SensorInfo = slot.id.info();

        self.platform.clk_cfg()?;
        self.platform.clk_on()?;
        self.clocks_on = true;

        self.memory = Some(IsMemory::alloc(self.osal.clone(), &self.config)?);
        let fw_name = self.config.firmware_name;
        self.fw_info = Some(self.memory_mut()?.load_firmware(fw_name)?);
        self.state.insert(IschainState::LOADED);

        self.interface.reset();
        let (fw_dva, region_dva) = {
            let memory = self.memory_mut()?;
            memory.region_mut().reset();
            (memory.base_dva(), memory.region_dva())
        };
        firmware::boot_a5(self.interface.regs(), &*self.platform, fw_dva)?;
        self.state.insert(IschainState::POWER_ON);
        let sensors = self.interface.wait_init(self.config.timeouts.init_message_ms)?;
        debug!("[ISC:{}] firmware reports {} sensor(s)", self.instance, sensors);

        self.interface.open_sensor(
            self.instance,
            info.fw_id,
            slot.channel,
            slot.i2c_addr as u32,
            region_dva,
        )?;
        self.state.insert(IschainState::OPEN);

        let offset = self.interface.get_setfile_addr(self.instance)?;
        self.memory_mut()?.load_setfile(info.setfile, offset)?;
        self.interface.load_setfile(self.instance, offset)?;

        let sizes = ChainSizes::uniform(size);
        let set = {
            let region = &mut self.region_mut()?.parameter;
            let mut set = Self::default_params(region, fps);
            set.merge(&chain::s_chain_sizes(region, &sizes)?);
            set
        };
        self.commit(&set)?;
        self.apply()?;

        self.sizes = sizes;
        self.stages = Stages::default();
        self.scc_started = false;
        self.scp_started = false;
        self.skip_frames = 0;
        info!(
            "[ISC:{}] {} open, {}x{}@{}",
            self.instance, info.name, size.width, size.height, fps
        );
        Ok(())
    }

    /// Tear down whatever `open` reached. Keeps going past failures and
    /// returns the first one.
    pub fn close(&mut self) -> Result<()> {
        let mut result = Ok(());
        let mut keep = |r: Result<()>| {
            if let Err(err) = r {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        };

        if self.state.contains(IschainState::RUN) {
            keep(self.isp_stop());
        }
        if self.state.contains(IschainState::OPEN) {
            if let Err(err) = self.interface.close_sensor(self.instance) {
                warn!("[ISC:{}] close sensor failed: {}", self.instance, err);
                keep(Err(err));
            }
            self.state.remove(IschainState::OPEN);
        }
        if self.state.contains(IschainState::POWER_ON) {
            if let Err(err) = self.interface.power_down(self.instance) {
                error!(
                    "[ISC:{}] power down failed ({}), forcing A5 off",
                    self.instance, err
                );
                keep(Err(err));
            }
            keep(firmware::halt_a5(self.interface.regs(), &*self.platform));
            self.state.remove(IschainState::POWER_ON);
        }
        if self.clocks_on {
            keep(self.platform.clk_off().map_err(Into::into));
            self.clocks_on = false;
        }
        self.memory = None;
        self.state = IschainState::empty();
        self.interface.reset();
        info!("[ISC:{}] closed", self.instance);
        result
    }

    /// Change the chain geometry. Applied to the firmware right away when
    /// the chain is open.
    pub fn set_chain_sizes(&mut self, sizes: ChainSizes) -> Result<()> {
        sizes.validate()?;
        if self.state.contains(IschainState::OPEN) {
            let set = chain::s_chain_sizes(&mut self.region_mut()?.parameter, &sizes)?;
            self.commit(&set)?;
            self.apply()?;
        }
        self.sizes = sizes;
        Ok(())
    }

    /// Start the ISP on queued shots.
    pub fn isp_start(&mut self) -> Result<()> {
        if !self.state.contains(IschainState::OPEN) {
            return Err(FimcIsError::InvalidState);
        }
        if self.state.contains(IschainState::RUN) {
            return Ok(());
        }
        self.interface.process_start(self.instance)?;
        self.interface.stream_on(self.instance)?;
        self.state.insert(IschainState::RUN);
        self.isp.set_streaming(true);
        info!("[ISC:{}] stream on", self.instance);
        self.kick();
        Ok(())
    }

    /// Wait for shots in flight, then stop streaming.
    ///
    /// The wait is bounded by the drain timeout. Frames never sent to the
    /// firmware, and any still in flight after a timeout, complete with an
    /// error mark.
    pub fn isp_stop(&mut self) -> Result<()> {
        if !self.state.contains(IschainState::RUN) {
            return Ok(());
        }
        self.state.remove(IschainState::RUN);

        let interface = self.interface.clone();
        let timeout_us = self.config.timeouts.isp_drain_ms as u64 * 1000;
        let poll_us = self.config.poll_interval_us.max(1);
        let start = self.osal.get_time_us();
        let mut drained = true;
        loop {
            interface.run_pending(self);
            let in_flight = self.isp.frames().count(FrameState::Process);
            if in_flight == 0 {
                break;
            }
            if self.osal.timeout_check(start, timeout_us) {
                error!(
                    "[ISC:{}] {} shot(s) still in flight after {}ms",
                    self.instance, in_flight, self.config.timeouts.isp_drain_ms
                );
                drained = false;
                break;
            }
            self.osal.udelay(poll_us);
        }

        let stream = interface.stream_off(self.instance);
        let process = interface.process_stop(self.instance);
        self.cancel_frames();
        self.isp.set_streaming(false);
        info!("[ISC:{}] stream off", self.instance);

        stream?;
        process?;
        if !drained {
            return Err(FimcIsError::Timeout { command: HIC_SHOT });
        }
        Ok(())
    }

    /// Complete every ISP frame not yet done, and every SCC/SCP frame
    /// reserved for one, with an error mark.
    fn cancel_frames(&mut self) {
        let isp = self.isp.frames();
        while let Some(index) = isp.request_head() {
            if isp.trans_req_to_pro(index).is_err() {
                break;
            }
        }
        let mut cancelled = 0;
        for queue in [&self.isp, &self.scc, &self.scp] {
            let frames = queue.frames();
            for index in frames.indexes(FrameState::Process) {
                frames.with_frame(index, |frame| {
                    frame.error = true;
                    frame.req_flag = Default::default();
                });
                if frames.trans_pro_to_com(index).is_ok() && queue.kind() == VideoKind::Isp {
                    cancelled += 1;
                }
            }
        }
        if cancelled > 0 {
            warn!("[ISC:{}] {} frame(s) cancelled", self.instance, cancelled);
            self.stats.frames_failed += cancelled;
        }
    }
}
