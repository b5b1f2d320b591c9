//! FIMC-LITE bayer capture with two alternating DMA slots.
//!
//! Each slot holds the address of a frame in the PROCESS list while armed.
//! On frame end the slot the hardware just filled is completed and re-armed
//! with the next REQUEST frame, so each slot always has a frame in flight
//! as long as userspace keeps queueing.

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

use crate::{
    err::{FimcIsError, Result},
    framemgr::{FrameManager, FrameState},
    geometry::Size,
    osal::Osal,
    registers::{
        FliteRegisters,
        consts::FLITE_ODMA_BAYER10,
        flite::{CIGCTRL, CIIMGCPT, CISRCSIZE, CISTATUS, CISTATUS2, FLITE_BUF_SLOTS},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FliteState {
    Init,
    Start,
    LastCapture,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FliteStats {
    pub frames: u32,
    pub drops: u32,
    pub overflows: u32,
    pub forced_stops: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FliteTimeouts {
    pub last_capture_ms: u32,
    pub force_stop_delay_ms: u32,
    pub poll_us: u32,
}

pub struct Flite<O: Osal> {
    osal: O,
    regs: FliteRegisters,
    channel: u32,
    state: FliteState,
    /// Bit per slot currently holding a frame.
    armed: u32,
    timeouts: FliteTimeouts,
    stats: FliteStats,
}

impl<O: Osal> Flite<O> {
    pub fn new(osal: O, regs: FliteRegisters, channel: u32, timeouts: FliteTimeouts) -> Self {
        Self {
            osal,
            regs,
            channel,
            state: FliteState::Init,
            armed: 0,
            timeouts,
            stats: FliteStats::default(),
        }
    }

    pub fn state(&self) -> FliteState {
        self.state
    }

    pub fn armed(&self) -> u32 {
        self.armed
    }

    pub fn stats(&self) -> FliteStats {
        self.stats
    }

    /// Move the oldest request into PROCESS and point `slot` at it.
    fn arm(&mut self, slot: usize, frames: &FrameManager) -> bool {
        let Some(index) = frames.request_head() else {
            return false;
        };
        if frames.trans_req_to_pro(index).is_err() {
            return false;
        }
        let dva = frames
            .with_frame(index, |frame| frame.dvaddr_buffer[0])
            .unwrap_or(0);
        self.regs.ciosa[slot].set(dva);
        self.armed |= 1 << slot;
        self.regs.cifcntseq.set(self.armed);
        trace!("[FLT:{}] slot {} armed with frame {} ({:#x})", self.channel, slot, index, dva);
        true
    }

    fn disarm(&mut self, slot: usize) {
        self.armed &= !(1 << slot);
        self.regs.cifcntseq.set(self.armed);
        self.regs.ciosa[slot].set(0);
    }

    pub fn start(&mut self, frames: &FrameManager, size: Size) -> Result<()> {
        if self.state != FliteState::Init {
            error!("[FLT:{}] start in {:?}", self.channel, self.state);
            return Err(FimcIsError::InvalidState);
        }

        self.regs.cigctrl.write(CIGCTRL::SWRST::SET);
        self.regs.cigctrl.write(CIGCTRL::SWRST::CLEAR);
        self.regs.cistatus.set(0);
        self.regs.cisrcsize.write(
            CISRCSIZE::HSIZE.val(size.width) + CISRCSIZE::VSIZE.val(size.height),
        );
        self.regs.ciocan.write(
            CISRCSIZE::HSIZE.val(size.width) + CISRCSIZE::VSIZE.val(size.height),
        );
        self.regs.ciodmafmt.set(FLITE_ODMA_BAYER10);

        self.armed = 0;
        for slot in 0..FLITE_BUF_SLOTS {
            if !self.arm(slot, frames) {
                warn!("[FLT:{}] no frame for slot {} at start", self.channel, slot);
            }
        }

        self.regs.cigctrl.write(
            CIGCTRL::SELCAM_MIPI::SET
                + CIGCTRL::IRQ_END_EN::SET
                + CIGCTRL::IRQ_LASTCAP_EN::SET
                + CIGCTRL::IRQ_OVF_EN::SET,
        );
        self.regs.ciimgcpt.write(CIIMGCPT::IMGCPTEN::SET);
        self.state = FliteState::Start;
        info!(
            "[FLT:{}] capture on, {}x{}, armed {:#b}",
            self.channel, size.width, size.height, self.armed
        );
        Ok(())
    }

    /// Interrupt service: acknowledge the status and run the frame-end handoff.
    pub fn irq(&mut self, frames: &FrameManager) {
        let status = self.regs.cistatus.extract();

        if status.is_set(CISTATUS::OVERFLOW) {
            error!("[FLT:{}] output overflow", self.channel);
            self.stats.overflows += 1;
        }
        self.regs.cistatus.modify(
            CISTATUS::FRAME_END::CLEAR + CISTATUS::FRAME_START::CLEAR + CISTATUS::OVERFLOW::CLEAR,
        );

        if status.is_set(CISTATUS::FRAME_END) {
            self.frame_end(frames);
        }
    }

    fn frame_end(&mut self, frames: &FrameManager) {
        if self.state == FliteState::Init {
            return;
        }
        let slot = self.regs.cistatus2.read(CISTATUS2::PRESENT) as usize % FLITE_BUF_SLOTS;

        if self.armed & (1 << slot) != 0 {
            match frames.trans_head(FrameState::Process) {
                Ok(index) => {
                    self.stats.frames += 1;
                    trace!("[FLT:{}] frame {} done in slot {}", self.channel, index, slot);
                }
                Err(_) => error!("[FLT:{}] slot {} armed but nothing in process", self.channel, slot),
            }
            if self.state == FliteState::LastCapture || !self.arm(slot, frames) {
                if self.state != FliteState::LastCapture {
                    warn!("[FLT:{}] no request frame, slot {} left empty (frame drop)", self.channel, slot);
                    self.stats.drops += 1;
                }
                self.disarm(slot);
            }
        } else {
            // The hardware wrote into an empty slot; the frame is lost.
            self.stats.drops += 1;
            warn!("[FLT:{}] frame end on empty slot {}", self.channel, slot);
            if self.state == FliteState::Start {
                self.arm(slot, frames);
            }
        }
    }

    /// Stop capturing and wait for the last frame to land.
    ///
    /// If the hardware never reports the last capture, the block is reset
    /// and given a fixed delay to settle. Frames still armed complete with an
    /// error mark either way.
    pub fn stop(&mut self, frames: &FrameManager) -> Result<()> {
        if self.state != FliteState::Start {
            debug!("[FLT:{}] stop in {:?}, nothing to do", self.channel, self.state);
            return Ok(());
        }

        self.state = FliteState::LastCapture;
        self.regs.ciimgcpt.write(CIIMGCPT::IMGCPTEN::CLEAR);

        let timeout_us = self.timeouts.last_capture_ms as u64 * 1000;
        let start = self.osal.get_time_us();
        while !self.regs.cistatus.is_set(CISTATUS::LAST_CAPTURE_END) {
            if self.osal.timeout_check(start, timeout_us) {
                warn!(
                    "[FLT:{}] no last capture after {}ms, forcing stop",
                    self.channel, self.timeouts.last_capture_ms
                );
                self.stats.forced_stops += 1;
                self.regs.cigctrl.write(CIGCTRL::SWRST::SET);
                self.osal.msleep(self.timeouts.force_stop_delay_ms);
                self.regs.cigctrl.write(CIGCTRL::SWRST::CLEAR);
                break;
            }
            self.osal.udelay(self.timeouts.poll_us);
        }
        self.regs.cistatus.modify(CISTATUS::LAST_CAPTURE_END::CLEAR);
        self.regs.cigctrl.set(0);

        for slot in 0..FLITE_BUF_SLOTS {
            if self.armed & (1 << slot) == 0 {
                continue;
            }
            match frames.trans_head(FrameState::Process) {
                Ok(index) => {
                    frames.with_frame(index, |frame| frame.error = true);
                }
                Err(_) => error!("[FLT:{}] armed slot {} without a frame", self.channel, slot),
            }
            self.disarm(slot);
        }

        self.state = FliteState::Init;
        info!("[FLT:{}] capture off", self.channel);
        Ok(())
    }
}
