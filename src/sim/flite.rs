use alloc::sync::Arc;

use spin::Mutex;
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

use crate::registers::{
    FliteRegisters,
    flite::{CIGCTRL, CIIMGCPT, CISTATUS, CISTATUS2, FLITE_BUF_SLOTS},
};

use super::{SimDevice, SimRegisterFile};

#[derive(Default)]
struct FliteSim {
    next_slot: usize,
    capturing: bool,
    stuck: bool,
}

/// FIMC-LITE DMA engine. Frames only end when a test says so.
pub struct SimFlite {
    _mem: Arc<SimRegisterFile>,
    regs: FliteRegisters,
    state: Mutex<FliteSim>,
}

impl SimFlite {
    pub fn new(mem: Arc<SimRegisterFile>) -> Self {
        let regs = unsafe { FliteRegisters::new(mem.base()) };
        Self {
            _mem: mem,
            regs,
            state: Mutex::new(FliteSim::default()),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.regs.ciimgcpt.is_set(CIIMGCPT::IMGCPTEN)
    }

    /// Slot addresses currently programmed.
    pub fn slots(&self) -> [u32; FLITE_BUF_SLOTS] {
        [self.regs.ciosa[0].get(), self.regs.ciosa[1].get()]
    }

    /// Never report the last capture after a stop request.
    pub fn set_stuck(&self, stuck: bool) {
        self.state.lock().stuck = stuck;
    }

    /// A fresh capture starts writing slot 0.
    fn sync(&self, state: &mut FliteSim) {
        let on = self.is_capturing();
        if on && !state.capturing {
            state.next_slot = 0;
        }
        state.capturing = on;
    }

    /// Finish the frame in the next slot. Returns false while capture is off.
    pub fn frame_end(&self) -> bool {
        let mut state = self.state.lock();
        self.sync(&mut state);
        if !state.capturing {
            return false;
        }
        let slot = state.next_slot;
        state.next_slot = (slot + 1) % FLITE_BUF_SLOTS;
        self.regs.cistatus2.write(CISTATUS2::PRESENT.val(slot as u32));
        self.regs.cistatus.modify(CISTATUS::FRAME_END::SET);
        true
    }

    pub fn overflow(&self) {
        self.regs.cistatus.modify(CISTATUS::OVERFLOW::SET);
    }
}

impl SimDevice for SimFlite {
    fn tick(&self) {
        let mut state = self.state.lock();
        self.sync(&mut state);
        let stopping = !state.capturing && self.regs.cigctrl.is_set(CIGCTRL::IRQ_LASTCAP_EN);
        if stopping && !state.stuck {
            self.regs.cistatus.modify(CISTATUS::LAST_CAPTURE_END::SET);
        }
    }
}
