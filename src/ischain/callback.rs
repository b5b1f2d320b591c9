//! Per-frame dispatch and the deferred completion handlers.
//!
//! A frame leaves the ISP REQUEST list only once its `HIC_SHOT` has been
//! written to the mailbox. From there the firmware owes one meta-done plus
//! one SCC/SCP done per requested output; the frame completes when the last
//! of them clears its request flags.

use crate::{
    framemgr::FrameState,
    interface::{
        HIC_SET_CAM_CONTROL, HIC_SHOT, IHC_AA_DONE, IHC_FLASH_READY, IHC_FRAME_DONE,
        IHC_NOT_READY, IHC_SET_FACE_MARK, IHC_SET_SHOT_MARK, ISR_DONE, ISR_NDONE, NblkClass, Work,
        WorkSink, command_name,
    },
    osal::Osal,
    platform::PlatformOps,
    region::{MAX_SHARED_COUNT, ParamId, ParamSet, param::consts::*},
    shot::{RequestFlags, SCALER_TARGET_COUNT, ScalerUd},
    video::VideoKind,
};

use super::{Feature, Ischain, IschainState};
use crate::err::{FimcIsError, Result};

/// SCC/SCP frames taken for a shot that has not been sent yet.
#[derive(Default)]
struct Reserved {
    scc: Option<usize>,
    scp: Option<usize>,
}

impl<O: Osal, P: PlatformOps> Ischain<O, P> {
    /// Send queued shots while streaming and while the firmware has room for
    /// more. Returns how many went out.
    pub fn kick(&mut self) -> usize {
        let mut sent = 0;
        while self.state.contains(IschainState::RUN) {
            if self.interface.nblk_list(NblkClass::Shot).free_count() == 0 {
                trace!("[ISC:{}] shot pool full", self.instance);
                break;
            }
            let Some(index) = self.isp.frames().request_head() else {
                break;
            };
            if let Err(err) = self.dispatch(index) {
                error!("[ISC:{}] frame {} not dispatched: {}", self.instance, index, err);
                break;
            }
            sent += 1;
        }
        sent
    }

    fn output_available(&self, kind: VideoKind) -> bool {
        let linked = match kind {
            VideoKind::Scc => self.graph.scc_enabled(),
            _ => self.graph.scp_enabled(),
        };
        let Some(queue) = self.queue(kind) else {
            return false;
        };
        linked && queue.is_streaming() && queue.frames().request_head().is_some()
    }

    /// Program a scaler DMA output with every buffer its queue knows.
    fn start_output(&mut self, kind: VideoKind) -> Result<()> {
        let offsets = self.config.shared_offsets();
        let (table, size, dvas) = match kind {
            VideoKind::Scc => (offsets.scc_buffers, self.sizes.chain1, self.scc.buffer_dvas()),
            VideoKind::Scp => (offsets.scp_buffers, self.sizes.chain3, self.scp.buffer_dvas()),
            _ => return Err(FimcIsError::InvalidArgument),
        };
        let table_dva = self
            .memory
            .as_ref()
            .map(|memory| memory.shared_dva(table))
            .ok_or(FimcIsError::InvalidState)?;

        let mut set = ParamSet::new();
        let region = self.region_mut()?;
        for (slot, dva) in region.shared[table..MAX_SHARED_COUNT].iter_mut().zip(&dvas) {
            *slot = *dva;
        }
        let (dma, id) = match kind {
            VideoKind::Scc => (&mut region.parameter.scalerc.dma_output, ParamId::ScalercDmaOutput),
            _ => (&mut region.parameter.scalerp.dma_output, ParamId::ScalerpDmaOutput),
        };
        dma.cmd = DMA_OUTPUT_COMMAND_ENABLE;
        dma.width = size.width;
        dma.height = size.height;
        dma.plane = 1;
        dma.buffer_number = dvas.len() as u32;
        dma.buffer_address = table_dva;
        dma.notify_dma_done = DMA_OUTPUT_NOTIFY_DMA_DONE_ENABLE;
        set.mark(id);

        self.commit(&set)?;
        match kind {
            VideoKind::Scc => self.scc_started = true,
            _ => self.scp_started = true,
        }
        debug!(
            "[ISC:{}] {} dma on, {} buffer(s)",
            self.instance,
            kind.name(),
            dvas.len()
        );
        Ok(())
    }

    fn stop_output(&mut self, kind: VideoKind) -> Result<()> {
        let mut set = ParamSet::new();
        let region = self.region_mut()?;
        match kind {
            VideoKind::Scc => {
                region.parameter.scalerc.dma_output.cmd = DMA_OUTPUT_COMMAND_DISABLE;
                set.mark(ParamId::ScalercDmaOutput);
            }
            _ => {
                region.parameter.scalerp.dma_output.cmd = DMA_OUTPUT_COMMAND_DISABLE;
                set.mark(ParamId::ScalerpDmaOutput);
            }
        }
        self.commit(&set)?;
        match kind {
            VideoKind::Scc => self.scc_started = false,
            _ => self.scp_started = false,
        }
        debug!("[ISC:{}] {} dma off", self.instance, kind.name());
        Ok(())
    }

    /// Decide whether `kind` takes part in this frame, starting or stopping
    /// its DMA as needed. Clears the request bit on a drop.
    fn route_output(&mut self, kind: VideoKind, req: &mut RequestFlags) -> Result<()> {
        let (bit, started) = match kind {
            VideoKind::Scc => (RequestFlags::SCC, self.scc_started),
            _ => (RequestFlags::SCP, self.scp_started),
        };
        if !req.contains(bit) {
            if started {
                self.stop_output(kind)?;
            }
            return Ok(());
        }
        if !self.output_available(kind) {
            error!(
                "[ISC:{}] no {} buffer for fcount {}, output dropped",
                self.instance,
                kind.name(),
                self.fcount.wrapping_add(1)
            );
            req.remove(bit);
            match kind {
                VideoKind::Scc => self.stats.scc_drops += 1,
                _ => self.stats.scp_drops += 1,
            }
            return Ok(());
        }
        if !started {
            self.start_output(kind)?;
        }
        Ok(())
    }

    /// Move the oldest consumer buffer to PROCESS for `fcount`.
    fn reserve_output(&self, kind: VideoKind, fcount: u32) -> Option<(usize, [u32; SCALER_TARGET_COUNT])> {
        let frames = self.queue(kind)?.frames();
        let index = frames.request_head()?;
        frames.trans_req_to_pro(index).ok()?;
        frames
            .with_frame(index, |frame| {
                frame.fcount = fcount;
                frame.error = false;
                let mut targets = [0; SCALER_TARGET_COUNT];
                for (target, dva) in targets.iter_mut().zip(&frame.dvaddr_buffer[..frame.planes]) {
                    *target = *dva;
                }
                targets
            })
            .map(|targets| (index, targets))
    }

    /// Hand reserved consumer buffers back with an error mark.
    fn release_outputs(&self, reserved: &Reserved) {
        for (kind, index) in [(VideoKind::Scc, reserved.scc), (VideoKind::Scp, reserved.scp)] {
            let (Some(index), Some(queue)) = (index, self.queue(kind)) else {
                continue;
            };
            let frames = queue.frames();
            frames.with_frame(index, |frame| frame.error = true);
            let _ = frames.trans_pro_to_com(index);
        }
    }

    fn dispatch(&mut self, index: usize) -> Result<()> {
        let frame = self
            .isp
            .frames()
            .frame(index)
            .ok_or(FimcIsError::InvalidArgument)?;
        let fcount = self.fcount.wrapping_add(1);
        let mut shot = frame.shot;
        let mut req = frame.req_flag | RequestFlags::MDT;

        if self.skip_frames > 0 {
            if req.intersects(RequestFlags::SCC | RequestFlags::SCP) {
                debug!(
                    "[ISC:{}] fcount {}: outputs skipped ({} left)",
                    self.instance, fcount, self.skip_frames
                );
            }
            req.remove(RequestFlags::SCC | RequestFlags::SCP);
            self.skip_frames -= 1;
            self.stats.skipped_frames += 1;
        }

        self.route_output(VideoKind::Scc, &mut req)?;
        self.route_output(VideoKind::Scp, &mut req)?;

        if shot.wants_dis() != self.stages.dis {
            self.toggle_stage(Feature::Dis, shot.wants_dis())?;
            self.skip_frames = self.config.dis_skip_frames;
        }
        if shot.wants_dnr() != self.stages.tdnr {
            self.toggle_stage(Feature::Tdnr, shot.wants_dnr())?;
        }
        if shot.wants_fd() != self.stages.fd {
            self.toggle_stage(Feature::Fd, shot.wants_fd())?;
        }

        let mut reserved = Reserved::default();
        shot.shot.uctl.scaler_ud = ScalerUd::default();
        if req.contains(RequestFlags::SCC) {
            match self.reserve_output(VideoKind::Scc, fcount) {
                Some((scc, targets)) => {
                    shot.shot.uctl.scaler_ud.scc_target_address = targets;
                    reserved.scc = Some(scc);
                }
                None => req.remove(RequestFlags::SCC),
            }
        }
        if req.contains(RequestFlags::SCP) {
            match self.reserve_output(VideoKind::Scp, fcount) {
                Some((scp, targets)) => {
                    shot.shot.uctl.scaler_ud.scp_target_address = targets;
                    reserved.scp = Some(scp);
                }
                None => req.remove(RequestFlags::SCP),
            }
        }

        shot.set_requests(req);
        shot.shot.ctl.request.frame_count = fcount;

        let sent = self
            .memory_mut()
            .and_then(|memory| memory.write_shot(index, &shot))
            .and_then(|shot_dva| {
                self.interface
                    .shot(self.instance, frame.dvaddr_buffer[0], shot_dva, fcount)
                    .map(|()| shot_dva)
            });
        let shot_dva = match sent {
            Ok(dva) => dva,
            Err(err) => {
                self.release_outputs(&reserved);
                return Err(err);
            }
        };

        self.isp.frames().with_frame(index, |frame| {
            frame.shot = shot;
            frame.req_flag = req;
            frame.fcount = fcount;
            frame.dvaddr_shot = shot_dva;
            frame.error = false;
        });
        self.isp.frames().trans_req_to_pro(index)?;
        self.fcount = fcount;
        self.stats.shots += 1;
        trace!(
            "[ISC:{}] shot frame {} fcount {} req {:?}",
            self.instance, index, fcount, req
        );
        Ok(())
    }

    /// Move an ISP frame to COMPLETE once nothing is owed for it.
    fn finish_if_done(&mut self, index: usize) {
        let frames = self.isp.frames();
        let Some((pending, error)) = frames.with_frame(index, |frame| (frame.req_flag, frame.error)) else {
            return;
        };
        if !pending.is_empty() {
            return;
        }
        if frames.trans_pro_to_com(index).is_err() {
            return;
        }
        if error {
            self.stats.frames_failed += 1;
        } else {
            self.stats.frames_done += 1;
        }
    }

    fn output_done(&mut self, kind: VideoKind, work: &Work) {
        let fcount = work.fcount;
        let failed = work.msg.param2 != 0;
        let bit = match kind {
            VideoKind::Scc => RequestFlags::SCC,
            _ => RequestFlags::SCP,
        };

        if let Some(queue) = self.queue(kind) {
            let frames = queue.frames();
            match frames.find(FrameState::Process, |frame| frame.fcount == fcount) {
                Some(index) => {
                    frames.with_frame(index, |frame| frame.error |= failed);
                    let _ = frames.trans_pro_to_com(index);
                }
                None => error!(
                    "[ISC:{}] {} done for fcount {} matches no buffer in process ({} waiting)",
                    self.instance,
                    kind.name(),
                    fcount,
                    frames.counts()[FrameState::Process as usize]
                ),
            }
        }

        let Some(index) = self
            .isp
            .frames()
            .find(FrameState::Process, |frame| frame.fcount == fcount)
        else {
            warn!(
                "[ISC:{}] {} done for unknown fcount {}",
                self.instance,
                kind.name(),
                fcount
            );
            return;
        };
        self.isp.frames().with_frame(index, |frame| frame.req_flag.remove(bit));
        self.finish_if_done(index);
    }

    fn shot_rejected(&mut self, fcount: u32, code: u32) {
        error!(
            "[ISC:{}] shot fcount {} rejected (code {:#x})",
            self.instance, fcount, code
        );
        self.stats.rejected_shots += 1;

        for queue in [&self.scc, &self.scp] {
            let frames = queue.frames();
            if let Some(index) = frames.find(FrameState::Process, |frame| frame.fcount == fcount) {
                frames.with_frame(index, |frame| frame.error = true);
                let _ = frames.trans_pro_to_com(index);
            }
        }

        let frames = self.isp.frames();
        let Some(index) = frames.find(FrameState::Process, |frame| frame.fcount == fcount) else {
            warn!("[ISC:{}] rejected fcount {} not in process", self.instance, fcount);
            return;
        };
        frames.with_frame(index, |frame| {
            frame.error = true;
            frame.req_flag = RequestFlags::empty();
        });
        self.finish_if_done(index);
    }
}

impl<O: Osal, P: PlatformOps> WorkSink for Ischain<O, P> {
    fn general(&mut self, work: &Work) {
        let msg = &work.msg;
        match msg.command {
            ISR_DONE => match msg.param1 {
                HIC_SHOT => trace!("[ISC:{}] shot fcount {} accepted", self.instance, msg.param3),
                HIC_SET_CAM_CONTROL => trace!("[ISC:{}] cam control applied", self.instance),
                other => debug!("[ISC:{}] {} done", self.instance, command_name(other)),
            },
            ISR_NDONE => match msg.param1 {
                HIC_SHOT => self.shot_rejected(msg.param3, msg.param2),
                other => error!(
                    "[ISC:{}] {} rejected (code {:#x})",
                    self.instance,
                    command_name(other),
                    msg.param2
                ),
            },
            IHC_FRAME_DONE => trace!("[ISC:{}] frame done, fcount {}", self.instance, msg.param1),
            IHC_SET_SHOT_MARK => trace!("[ISC:{}] shot mark {}", self.instance, msg.param1),
            IHC_AA_DONE => {
                self.stats.aa_done += 1;
                debug!("[ISC:{}] 3A done ({:#x})", self.instance, msg.param1);
            }
            IHC_SET_FACE_MARK => {
                self.stats.face_marks += 1;
                debug!(
                    "[ISC:{}] {} face(s) at fcount {}",
                    self.instance, msg.param1, msg.param2
                );
            }
            IHC_NOT_READY => {
                self.stats.not_ready += 1;
                error!("[ISC:{}] firmware not ready ({:#x})", self.instance, msg.param1);
            }
            IHC_FLASH_READY => debug!("[ISC:{}] flash ready", self.instance),
            other => {
                self.stats.unknown_messages += 1;
                warn!("[ISC:{}] unknown message {:#x}", self.instance, other);
            }
        }
    }

    fn scc_done(&mut self, work: &Work) {
        self.output_done(VideoKind::Scc, work);
    }

    fn scp_done(&mut self, work: &Work) {
        self.output_done(VideoKind::Scp, work);
    }

    fn meta_done(&mut self, work: &Work) {
        let fcount = work.fcount;
        let frames = self.isp.frames();
        let Some(index) = frames.find(FrameState::Process, |frame| frame.fcount == fcount) else {
            error!("[ISC:{}] meta done for unknown fcount {}", self.instance, fcount);
            frames.dump(FrameState::Process);
            return;
        };
        let dm = self.memory.as_ref().and_then(|memory| memory.read_shot(index).ok());
        frames.with_frame(index, |frame| {
            if let Some(dm) = &dm {
                frame.shot.update_dm(dm);
            }
            frame.req_flag.remove(RequestFlags::MDT);
        });
        self.finish_if_done(index);
    }
}
