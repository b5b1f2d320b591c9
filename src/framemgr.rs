//! Four-state frame descriptor pools.
//!
//! Every capture pipeline (sensor, ISP, SCC, SCP) owns one [`FrameManager`].
//! A frame slot lives in exactly one of the free, request, process and
//! complete FIFOs and only moves forward around that cycle. The lists are
//! guarded by a lock the manager owns, so callers cannot forget to take it.

use alloc::{collections::VecDeque, vec::Vec};

use spin::Mutex;

use crate::{
    err::{FimcIsError, Result},
    shot::{RequestFlags, ShotExt},
};

pub const MAX_PLANES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameState {
    Free,
    Request,
    Process,
    Complete,
}

impl FrameState {
    pub const ALL: [FrameState; 4] = [
        FrameState::Free,
        FrameState::Request,
        FrameState::Process,
        FrameState::Complete,
    ];

    const fn index(self) -> usize {
        match self {
            FrameState::Free => 0,
            FrameState::Request => 1,
            FrameState::Process => 2,
            FrameState::Complete => 3,
        }
    }

    /// The only state a frame may move to from `self`.
    pub const fn next(self) -> FrameState {
        match self {
            FrameState::Free => FrameState::Request,
            FrameState::Request => FrameState::Process,
            FrameState::Process => FrameState::Complete,
            FrameState::Complete => FrameState::Free,
        }
    }

    /// Bit in the trace mask that enables dumps of this list.
    pub const fn trace_bit(self) -> u32 {
        1 << self.index()
    }
}

/// One in-flight capture.
#[derive(Debug, Clone)]
pub struct FrameShot {
    index: usize,
    state: FrameState,
    pub planes: usize,
    pub dvaddr_buffer: [u32; MAX_PLANES],
    pub kvaddr_buffer: [usize; MAX_PLANES],
    /// Device address of the shot slot the firmware reads, 0 if none.
    pub dvaddr_shot: u32,
    pub shot: ShotExt,
    /// Outputs still owing a completion.
    pub req_flag: RequestFlags,
    pub fcount: u32,
    /// Set when the frame finished without valid content.
    pub error: bool,
}

impl FrameShot {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: FrameState::Free,
            planes: 0,
            dvaddr_buffer: [0; MAX_PLANES],
            kvaddr_buffer: [0; MAX_PLANES],
            dvaddr_shot: 0,
            shot: ShotExt::default(),
            req_flag: RequestFlags::empty(),
            fcount: 0,
            error: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Forget everything a previous use of the slot left behind.
    pub fn reset(&mut self) {
        let index = self.index;
        let state = self.state;
        *self = Self::new(index);
        self.state = state;
    }
}

struct FrameLists {
    frames: Vec<FrameShot>,
    lists: [VecDeque<usize>; 4],
}

impl FrameLists {
    fn list(&self, state: FrameState) -> &VecDeque<usize> {
        &self.lists[state.index()]
    }

    fn list_mut(&mut self, state: FrameState) -> &mut VecDeque<usize> {
        &mut self.lists[state.index()]
    }
}

pub struct FrameManager {
    name: &'static str,
    capacity: usize,
    trace_mask: u32,
    inner: Mutex<FrameLists>,
}

impl FrameManager {
    /// Allocate `capacity` descriptors, all of them free.
    ///
    /// Holding the returned value is what "opened" means; dropping it closes
    /// the manager, so a second open of the same pool is not expressible.
    pub fn open(name: &'static str, capacity: usize) -> Self {
        let frames: Vec<FrameShot> = (0..capacity).map(FrameShot::new).collect();
        let mut lists: [VecDeque<usize>; 4] = Default::default();
        lists[FrameState::Free.index()] = (0..capacity).collect();

        debug!("[FRM:{}] open with {} frames", name, capacity);

        Self {
            name,
            capacity,
            trace_mask: 0,
            inner: Mutex::new(FrameLists { frames, lists }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enable list dumps; one bit per [`FrameState::trace_bit`].
    pub fn set_trace_mask(&mut self, mask: u32) {
        self.trace_mask = mask;
    }

    pub fn count(&self, state: FrameState) -> usize {
        self.inner.lock().list(state).len()
    }

    /// All four counts taken under a single lock acquisition.
    pub fn counts(&self) -> [usize; 4] {
        let inner = self.inner.lock();
        FrameState::ALL.map(|state| inner.list(state).len())
    }

    /// Oldest frame of a list, without removing it.
    pub fn head(&self, state: FrameState) -> Option<usize> {
        self.inner.lock().list(state).front().copied()
    }

    pub fn free_head(&self) -> Option<usize> {
        self.head(FrameState::Free)
    }

    pub fn request_head(&self) -> Option<usize> {
        self.head(FrameState::Request)
    }

    pub fn process_head(&self) -> Option<usize> {
        self.head(FrameState::Process)
    }

    pub fn complete_head(&self) -> Option<usize> {
        self.head(FrameState::Complete)
    }

    /// Snapshot of a descriptor.
    pub fn frame(&self, index: usize) -> Option<FrameShot> {
        self.inner.lock().frames.get(index).cloned()
    }

    /// Run `f` on a descriptor while holding the manager lock.
    pub fn with_frame<R>(&self, index: usize, f: impl FnOnce(&mut FrameShot) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        inner.frames.get_mut(index).map(f)
    }

    /// First frame in `state` (oldest first) matching `pred`.
    pub fn find(&self, state: FrameState, pred: impl Fn(&FrameShot) -> bool) -> Option<usize> {
        let inner = self.inner.lock();
        inner
            .list(state)
            .iter()
            .copied()
            .find(|&index| pred(&inner.frames[index]))
    }

    /// Frames currently in `state`, oldest first.
    pub fn indexes(&self, state: FrameState) -> Vec<usize> {
        self.inner.lock().list(state).iter().copied().collect()
    }

    /// Move frame `index` from `from` to the next state of the cycle.
    ///
    /// Fails without touching any list if `from` is empty, if the frame is not
    /// a member of `from`, or if `to` is not the successor of `from`.
    pub fn trans(&self, index: usize, from: FrameState, to: FrameState) -> Result<()> {
        let mut inner = self.inner.lock();
        let err = FimcIsError::FrameAccounting { from, to };

        if from.next() != to {
            error!("[FRM:{}] illegal transition {:?} -> {:?}", self.name, from, to);
            return Err(err);
        }
        if inner.list(from).is_empty() {
            error!(
                "[FRM:{}] {:?} list is empty, cannot move frame {} to {:?}",
                self.name, from, index, to
            );
            return Err(err);
        }
        let Some(pos) = inner.list(from).iter().position(|&i| i == index) else {
            error!(
                "[FRM:{}] frame {} is not in the {:?} list",
                self.name, index, from
            );
            return Err(err);
        };

        inner.list_mut(from).remove(pos);
        inner.list_mut(to).push_back(index);
        inner.frames[index].state = to;

        trace!("[FRM:{}] frame {}: {:?} -> {:?}", self.name, index, from, to);
        Ok(())
    }

    /// Move the head of `from` to the next state and return its index.
    pub fn trans_head(&self, from: FrameState) -> Result<usize> {
        let to = from.next();
        let Some(index) = self.head(from) else {
            error!("[FRM:{}] {:?} list is empty", self.name, from);
            return Err(FimcIsError::FrameAccounting { from, to });
        };
        self.trans(index, from, to)?;
        Ok(index)
    }

    pub fn trans_fre_to_req(&self, index: usize) -> Result<()> {
        self.trans(index, FrameState::Free, FrameState::Request)
    }

    pub fn trans_req_to_pro(&self, index: usize) -> Result<()> {
        self.trans(index, FrameState::Request, FrameState::Process)
    }

    pub fn trans_pro_to_com(&self, index: usize) -> Result<()> {
        self.trans(index, FrameState::Process, FrameState::Complete)
    }

    pub fn trans_com_to_fre(&self, index: usize) -> Result<()> {
        self.trans(index, FrameState::Complete, FrameState::Free)
    }

    /// Log the content of one list if its trace bit is set.
    pub fn dump(&self, state: FrameState) {
        if self.trace_mask & state.trace_bit() == 0 {
            return;
        }
        let inner = self.inner.lock();
        info!("[FRM:{}] {:?} list ({}):", self.name, state, inner.list(state).len());
        for &index in inner.list(state) {
            let frame = &inner.frames[index];
            info!(
                "[FRM:{}]   #{} fcount {} req {:?} dva {:#x}",
                self.name, index, frame.fcount, frame.req_flag, frame.dvaddr_buffer[0]
            );
        }
    }

    pub fn dump_all(&self) {
        for state in FrameState::ALL {
            self.dump(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(mgr: &FrameManager) -> usize {
        mgr.counts().iter().sum()
    }

    #[test]
    fn open_populates_free_list() {
        let mgr = FrameManager::open("test", 8);
        assert_eq!(mgr.counts(), [8, 0, 0, 0]);
        assert_eq!(mgr.free_head(), Some(0));
        assert_eq!(mgr.request_head(), None);
    }

    #[test]
    fn ninth_request_fails_cleanly() {
        let mgr = FrameManager::open("test", 8);
        for index in 0..8 {
            mgr.trans_fre_to_req(index).unwrap();
            assert_eq!(total(&mgr), 8);
        }
        assert_eq!(mgr.counts(), [0, 8, 0, 0]);

        let err = mgr.trans_head(FrameState::Free).unwrap_err();
        assert_eq!(
            err,
            FimcIsError::FrameAccounting {
                from: FrameState::Free,
                to: FrameState::Request
            }
        );
        assert_eq!(mgr.counts(), [0, 8, 0, 0]);
    }

    #[test]
    fn frames_cycle_in_order() {
        let mgr = FrameManager::open("test", 2);
        mgr.trans_fre_to_req(1).unwrap();
        mgr.trans_fre_to_req(0).unwrap();
        assert_eq!(mgr.request_head(), Some(1));

        assert_eq!(mgr.trans_head(FrameState::Request).unwrap(), 1);
        assert_eq!(mgr.trans_head(FrameState::Process).unwrap(), 1);
        assert_eq!(mgr.frame(1).unwrap().state(), FrameState::Complete);
        assert_eq!(mgr.counts(), [0, 1, 0, 1]);

        mgr.trans_com_to_fre(1).unwrap();
        assert_eq!(mgr.counts(), [1, 1, 0, 0]);
    }

    #[test]
    fn rejects_frames_outside_the_source_list() {
        let mgr = FrameManager::open("test", 4);
        mgr.trans_fre_to_req(0).unwrap();
        // Frame 1 is still free.
        assert!(mgr.trans_req_to_pro(1).is_err());
        // Skipping a state is not a transition.
        assert!(mgr.trans(1, FrameState::Free, FrameState::Process).is_err());
        // Empty source list.
        assert!(mgr.trans_pro_to_com(0).is_err());
        assert_eq!(mgr.counts(), [3, 1, 0, 0]);
        assert_eq!(mgr.frame(0).unwrap().state(), FrameState::Request);
    }

    #[test]
    fn heads_are_peeked_not_popped() {
        let mgr = FrameManager::open("test", 3);
        mgr.trans_fre_to_req(2).unwrap();
        assert_eq!(mgr.request_head(), Some(2));
        assert_eq!(mgr.request_head(), Some(2));
        assert_eq!(mgr.count(FrameState::Request), 1);
    }

    #[test]
    fn find_matches_by_frame_count() {
        let mgr = FrameManager::open("test", 4);
        for (index, fcount) in [(0, 10), (1, 11), (2, 12)] {
            mgr.with_frame(index, |frame| frame.fcount = fcount);
            mgr.trans_fre_to_req(index).unwrap();
            mgr.trans_req_to_pro(index).unwrap();
        }
        assert_eq!(mgr.find(FrameState::Process, |f| f.fcount == 11), Some(1));
        assert_eq!(mgr.find(FrameState::Process, |f| f.fcount == 13), None);
        assert_eq!(mgr.indexes(FrameState::Process), [0, 1, 2]);
    }

    #[test]
    fn reset_keeps_identity() {
        let mgr = FrameManager::open("test", 2);
        mgr.trans_fre_to_req(1).unwrap();
        mgr.with_frame(1, |frame| {
            frame.fcount = 7;
            frame.error = true;
            frame.reset();
        });
        let frame = mgr.frame(1).unwrap();
        assert_eq!(frame.index(), 1);
        assert_eq!(frame.state(), FrameState::Request);
        assert_eq!(frame.fcount, 0);
        assert!(!frame.error);
    }
}
