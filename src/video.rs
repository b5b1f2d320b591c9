//! Buffer queue adapters between the video nodes and the frame managers.
//!
//! A buffer index is a frame slot index: queueing buffer `i` moves slot `i`
//! from FREE to REQUEST, dequeueing takes the oldest COMPLETE slot back to
//! FREE.

use alloc::vec::Vec;

use crate::{
    err::{FimcIsError, Result},
    framemgr::{FrameManager, FrameState, MAX_PLANES},
    shot::{RequestFlags, ShotExt},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoKind {
    /// Bayer capture from FIMC-LITE.
    Sensor,
    /// Bayer input of the ISP, one shot per buffer.
    Isp,
    Scc,
    Scp,
}

impl VideoKind {
    pub const fn name(self) -> &'static str {
        match self {
            VideoKind::Sensor => "SS",
            VideoKind::Isp => "ISP",
            VideoKind::Scc => "SCC",
            VideoKind::Scp => "SCP",
        }
    }
}

/// Buffer handed in by userspace.
#[derive(Debug, Clone)]
pub struct VideoBuffer {
    pub index: usize,
    pub planes: usize,
    pub dva: [u32; MAX_PLANES],
    pub kva: [usize; MAX_PLANES],
    /// Shot metadata. Mandatory on the ISP node, ignored elsewhere.
    pub shot: Option<ShotExt>,
}

impl VideoBuffer {
    /// Single plane buffer.
    pub fn new(index: usize, dva: u32) -> Self {
        let mut buf = Self {
            index,
            planes: 1,
            dva: [0; MAX_PLANES],
            kva: [0; MAX_PLANES],
            shot: None,
        };
        buf.dva[0] = dva;
        buf
    }

    pub fn with_shot(mut self, shot: ShotExt) -> Self {
        self.shot = Some(shot);
        self
    }
}

/// What `dqbuf` hands back.
#[derive(Debug, Clone)]
pub struct DoneBuffer {
    pub index: usize,
    pub fcount: u32,
    pub error: bool,
    pub shot: ShotExt,
}

pub struct VideoQueue {
    kind: VideoKind,
    frames: FrameManager,
    streaming: bool,
}

impl VideoQueue {
    pub fn new(kind: VideoKind, count: usize) -> Self {
        Self {
            kind,
            frames: FrameManager::open(kind.name(), count),
            streaming: false,
        }
    }

    pub fn kind(&self) -> VideoKind {
        self.kind
    }

    pub fn frames(&self) -> &FrameManager {
        &self.frames
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn set_streaming(&mut self, on: bool) {
        self.streaming = on;
    }

    pub fn qbuf(&self, buf: &VideoBuffer) -> Result<()> {
        let name = self.kind.name();
        if buf.index >= self.frames.capacity()
            || buf.planes == 0
            || buf.planes > MAX_PLANES
            || buf.dva[0] == 0
        {
            error!("[{}] bad buffer {} ({} planes)", name, buf.index, buf.planes);
            return Err(FimcIsError::InvalidArgument);
        }
        if self.kind == VideoKind::Isp && buf.shot.is_none() {
            error!("[{}] buffer {} queued without shot", name, buf.index);
            return Err(FimcIsError::InvalidArgument);
        }
        match self.frames.frame(buf.index).map(|frame| frame.state()) {
            Some(FrameState::Free) => {}
            state => {
                error!("[{}] buffer {} is already queued ({:?})", name, buf.index, state);
                return Err(FimcIsError::InvalidState);
            }
        }

        self.frames.with_frame(buf.index, |frame| {
            frame.reset();
            frame.planes = buf.planes;
            frame.dvaddr_buffer = buf.dva;
            frame.kvaddr_buffer = buf.kva;
            if let Some(shot) = buf.shot {
                frame.shot = shot;
                frame.req_flag = shot.requests() | RequestFlags::MDT;
                frame.fcount = shot.frame_count();
            }
        });
        self.frames.trans_fre_to_req(buf.index)?;
        trace!("[{}] qbuf {}", name, buf.index);
        Ok(())
    }

    /// Oldest completed buffer, if any.
    pub fn dqbuf(&self) -> Option<DoneBuffer> {
        let index = self.frames.complete_head()?;
        let frame = self.frames.frame(index)?;
        self.frames.trans_com_to_fre(index).ok()?;
        trace!("[{}] dqbuf {} fcount {}", self.kind.name(), index, frame.fcount);
        Some(DoneBuffer {
            index,
            fcount: frame.fcount,
            error: frame.error,
            shot: frame.shot,
        })
    }

    /// First-plane addresses of every slot that has been queued at least once.
    pub fn buffer_dvas(&self) -> Vec<u32> {
        (0..self.frames.capacity())
            .filter_map(|index| self.frames.with_frame(index, |frame| frame.dvaddr_buffer[0]))
            .filter(|&dva| dva != 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isp_buffers_need_a_shot() {
        let queue = VideoQueue::new(VideoKind::Isp, 4);
        assert_eq!(
            queue.qbuf(&VideoBuffer::new(0, 0x1000)),
            Err(FimcIsError::InvalidArgument)
        );
        let shot = ShotExt::new(RequestFlags::SCP);
        queue.qbuf(&VideoBuffer::new(0, 0x1000).with_shot(shot)).unwrap();
        let frame = queue.frames().frame(0).unwrap();
        assert_eq!(frame.req_flag, RequestFlags::MDT | RequestFlags::SCP);
        assert_eq!(frame.state(), FrameState::Request);
    }

    #[test]
    fn double_queue_is_refused() {
        let queue = VideoQueue::new(VideoKind::Scc, 4);
        queue.qbuf(&VideoBuffer::new(2, 0x2000)).unwrap();
        assert_eq!(
            queue.qbuf(&VideoBuffer::new(2, 0x2000)),
            Err(FimcIsError::InvalidState)
        );
        assert!(queue.qbuf(&VideoBuffer::new(4, 0x2000)).is_err());
        assert_eq!(queue.frames().counts(), [3, 1, 0, 0]);
    }

    #[test]
    fn dqbuf_returns_completed_frames_in_order() {
        let queue = VideoQueue::new(VideoKind::Scp, 4);
        assert!(queue.dqbuf().is_none());
        for index in [1, 3] {
            queue.qbuf(&VideoBuffer::new(index, 0x1000 * (index as u32 + 1))).unwrap();
        }
        let frames = queue.frames();
        frames.trans_head(FrameState::Request).unwrap();
        frames.trans_head(FrameState::Request).unwrap();
        frames.with_frame(1, |frame| frame.error = true);
        frames.trans_head(FrameState::Process).unwrap();
        frames.trans_head(FrameState::Process).unwrap();

        let first = queue.dqbuf().unwrap();
        assert_eq!(first.index, 1);
        assert!(first.error);
        assert_eq!(queue.dqbuf().unwrap().index, 3);
        assert_eq!(frames.counts(), [4, 0, 0, 0]);
        assert_eq!(queue.buffer_dvas(), [0x2000, 0x4000]);
    }
}
