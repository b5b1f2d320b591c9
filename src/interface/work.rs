//! Fixed pools of command/reply envelopes.
//!
//! A pool is allocated once and its items only ever move between a free
//! FIFO and a request FIFO, under the pool's own lock. Nothing allocates
//! after construction, so taking an item from interrupt context is safe.

use alloc::{collections::VecDeque, vec::Vec};

use spin::Mutex;

use super::command::IsMessage;
use crate::err::WorkPool;

/// One envelope of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Work {
    pub msg: IsMessage,
    /// Frame count sampled from the `fcount` register, 0 when not relevant.
    pub fcount: u32,
}

struct WorkQueues {
    items: Vec<Work>,
    free: VecDeque<usize>,
    request: VecDeque<usize>,
}

pub struct WorkList {
    id: WorkPool,
    capacity: usize,
    inner: Mutex<WorkQueues>,
}

impl WorkList {
    pub fn new(id: WorkPool, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            inner: Mutex::new(WorkQueues {
                items: alloc::vec![Work::default(); capacity],
                free: (0..capacity).collect(),
                request: VecDeque::with_capacity(capacity),
            }),
        }
    }

    pub fn id(&self) -> WorkPool {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn request_count(&self) -> usize {
        self.inner.lock().request.len()
    }

    /// Take a free item, fill it and queue it as a request in one step.
    ///
    /// Returns the slot used, or `None` when the pool is exhausted.
    pub fn push(&self, work: Work) -> Option<usize> {
        let mut inner = self.inner.lock();
        let index = inner.free.pop_front()?;
        inner.items[index] = work;
        inner.request.push_back(index);
        Some(index)
    }

    /// Oldest request, returned to the free list.
    pub fn pop(&self) -> Option<Work> {
        let mut inner = self.inner.lock();
        let index = inner.request.pop_front()?;
        inner.free.push_back(index);
        Some(inner.items[index])
    }

    /// Drop a request that never reached the hardware.
    pub fn cancel(&self, index: usize) -> bool {
        let mut inner = self.inner.lock();
        let Some(pos) = inner.request.iter().position(|&i| i == index) else {
            return false;
        };
        inner.request.remove(pos);
        inner.free.push_back(index);
        true
    }

    /// Copies of every queued request, oldest first.
    pub fn requests(&self) -> Vec<Work> {
        let inner = self.inner.lock();
        inner.request.iter().map(|&index| inner.items[index]).collect()
    }

    /// Return every item to the free list.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let WorkQueues { free, request, .. } = &mut *inner;
        free.extend(request.drain(..));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::command::{HIC_SHOT, IsMessage};

    fn shot(fcount: u32) -> Work {
        Work {
            msg: IsMessage::new(HIC_SHOT, 0).with_params(0, 0, fcount, 0),
            fcount,
        }
    }

    #[test]
    fn exhausted_pool_refuses_push() {
        let list = WorkList::new(WorkPool::Shot, 3);
        for fcount in 1..=3 {
            assert!(list.push(shot(fcount)).is_some());
        }
        assert_eq!(list.push(shot(4)), None);
        assert_eq!(list.free_count(), 0);
        assert_eq!(list.request_count(), 3);
    }

    #[test]
    fn pop_is_fifo_and_recycles() {
        let list = WorkList::new(WorkPool::CamCtrl, 2);
        list.push(shot(1));
        list.push(shot(2));
        assert_eq!(list.pop().map(|w| w.fcount), Some(1));
        assert_eq!(list.free_count(), 1);
        list.push(shot(3));
        assert_eq!(
            list.requests().iter().map(|w| w.fcount).collect::<Vec<_>>(),
            [2, 3]
        );
    }

    #[test]
    fn cancel_only_touches_queued_items() {
        let list = WorkList::new(WorkPool::Shot, 3);
        let index = list.push(shot(1)).unwrap();
        assert!(list.cancel(index));
        assert!(!list.cancel(index));
        assert_eq!(list.free_count(), 3);
    }

    #[test]
    fn reset_frees_everything() {
        let list = WorkList::new(WorkPool::Shot, 3);
        list.push(shot(1));
        list.push(shot(2));
        list.reset();
        assert_eq!(list.free_count(), 3);
        assert_eq!(list.pop(), None);
    }
}
