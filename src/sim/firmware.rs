//! Mailbox side of the ISP core.
//!
//! Consumes every doorbell on the next tick, answers it the way the
//! production firmware does and raises the completion interrupts itself by
//! calling into the attached interface.

use alloc::{collections::VecDeque, sync::{Arc, Weak}, vec::Vec};
use core::mem::size_of;

use spin::Mutex;
use tock_registers::interfaces::{Readable, Writeable};

use crate::{
    interface::{
        HIC_GET_SET_FILE_ADDR, HIC_SHOT, IHC_FRAME_DONE,
        IHC_GET_SENSOR_NUMBER, ISR_DONE, ISR_NDONE, Interface, IrqClass, IsMessage,
    },
    osal::Osal,
    registers::{
        MailboxRegisters,
        mailbox::{INTGR0, MCUCTL},
    },
    shot::{RequestFlags, ShotExt},
};

use super::{SimDevice, SimEvent, SimOsal, SimRegisterFile};

/// Where the simulated firmware wants its setfile.
pub const SIM_SETFILE_OFFSET: u32 = 0x8_0000;

/// A shot the firmware has accepted and not finished yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub fcount: u32,
    pub bayer_dva: u32,
    pub shot_dva: u32,
}

struct FwState {
    booted: bool,
    boot_base: u32,
    sensor_count: u32,
    setfile_offset: u32,
    reject: Vec<(u32, u32)>,
    mute: Vec<u32>,
    late: Vec<u32>,
    overdue: VecDeque<IsMessage>,
    stall_doorbell: bool,
    hold_shots: bool,
    auto_complete: bool,
    held: VecDeque<IsMessage>,
    outbox: VecDeque<(IrqClass, IsMessage)>,
    inflight: VecDeque<InFlight>,
    commands: Vec<IsMessage>,
}

pub struct SimFirmware {
    osal: SimOsal,
    _mem: Arc<SimRegisterFile>,
    regs: MailboxRegisters,
    interface: Mutex<Weak<Interface<SimOsal>>>,
    state: Mutex<FwState>,
}

impl SimFirmware {
    pub fn new(osal: SimOsal, mem: Arc<SimRegisterFile>) -> Self {
        let regs = unsafe { MailboxRegisters::new(mem.base()) };
        Self {
            osal,
            _mem: mem,
            regs,
            interface: Mutex::new(Weak::new()),
            state: Mutex::new(FwState {
                booted: false,
                boot_base: 0,
                sensor_count: 1,
                setfile_offset: SIM_SETFILE_OFFSET,
                reject: Vec::new(),
                mute: Vec::new(),
                late: Vec::new(),
                overdue: VecDeque::new(),
                stall_doorbell: false,
                hold_shots: false,
                auto_complete: false,
                held: VecDeque::new(),
                outbox: VecDeque::new(),
                inflight: VecDeque::new(),
                commands: Vec::new(),
            }),
        }
    }

    /// Interface whose interrupt handler gets called on every event.
    pub fn attach(&self, interface: Weak<Interface<SimOsal>>) {
        *self.interface.lock() = interface;
    }

    pub fn is_booted(&self) -> bool {
        self.state.lock().booted
    }

    /// Every command consumed so far, oldest first.
    pub fn commands(&self) -> Vec<IsMessage> {
        self.state.lock().commands.clone()
    }

    pub fn command_codes(&self) -> Vec<u32> {
        self.state.lock().commands.iter().map(|msg| msg.command).collect()
    }

    pub fn count(&self, command: u32) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|msg| msg.command == command)
            .count()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Answer `command` with `ISR_NDONE` and `code`.
    pub fn reject(&self, command: u32, code: u32) {
        self.state.lock().reject.push((command, code));
    }

    /// Consume `command` and never answer it.
    pub fn mute(&self, command: u32) {
        self.state.lock().mute.push(command);
    }

    /// Answer `command` only right before the reply to the next command.
    pub fn answer_late(&self, command: u32) {
        self.state.lock().late.push(command);
    }

    /// Leave the doorbell rung without consuming it.
    pub fn stall_doorbell(&self, stall: bool) {
        self.state.lock().stall_doorbell = stall;
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.reject.clear();
        state.mute.clear();
        state.late.clear();
        state.overdue.clear();
        state.stall_doorbell = false;
    }

    pub fn set_setfile_offset(&self, offset: u32) {
        self.state.lock().setfile_offset = offset;
    }

    pub fn set_sensor_count(&self, count: u32) {
        self.state.lock().sensor_count = count;
    }

    /// Keep shot acknowledgements back until [`SimFirmware::release_shots`].
    pub fn hold_shots(&self, hold: bool) {
        self.state.lock().hold_shots = hold;
    }

    /// Send the held shot acknowledgements.
    pub fn release_shots(&self) -> usize {
        let released = {
            let mut state = self.state.lock();
            let held: Vec<_> = state.held.drain(..).collect();
            for msg in held.iter() {
                state.outbox.push_back((IrqClass::General, *msg));
            }
            held.len()
        };
        self.deliver();
        released
    }

    /// Finish every accepted shot on each tick.
    pub fn set_auto_complete(&self, on: bool) {
        self.state.lock().auto_complete = on;
    }

    pub fn inflight(&self) -> Vec<InFlight> {
        self.state.lock().inflight.iter().copied().collect()
    }

    /// Push an unsolicited firmware message.
    pub fn send(&self, msg: IsMessage) {
        self.send_on(IrqClass::General, msg);
    }

    pub fn send_on(&self, class: IrqClass, msg: IsMessage) {
        self.state.lock().outbox.push_back((class, msg));
        self.deliver();
    }

    /// Finish every accepted shot: scaler done for each requested output,
    /// dynamic metadata written back, then meta done. Returns the number of
    /// frames finished.
    pub fn complete_frames(&self) -> usize {
        let inflight: Vec<_> = self.state.lock().inflight.drain(..).collect();
        for shot in inflight.iter() {
            self.finish(shot, 0);
        }
        self.deliver();
        inflight.len()
    }

    /// Finish the oldest accepted shot with its scaler outputs marked failed.
    pub fn fail_frame(&self) -> bool {
        let Some(shot) = self.state.lock().inflight.pop_front() else {
            return false;
        };
        self.finish(&shot, 1);
        self.deliver();
        true
    }

    fn finish(&self, inflight: &InFlight, status: u32) {
        let mut done = Vec::new();
        let ptr = self.osal.translate(inflight.shot_dva, size_of::<ShotExt>());
        if let Some(ptr) = ptr {
            let shot_ptr = ptr.cast::<ShotExt>();
            let mut shot = unsafe { shot_ptr.as_ptr().read_unaligned() };
            let requests = shot.requests();
            let targets = shot.shot.uctl.scaler_ud;
            if requests.contains(RequestFlags::SCC) && targets.scc_target_address[0] != 0 {
                done.push(IrqClass::SccDone);
            }
            if requests.contains(RequestFlags::SCP) && targets.scp_target_address[0] != 0 {
                done.push(IrqClass::ScpDone);
            }
            let dm = &mut shot.shot.dm;
            dm.request.frame_count = inflight.fcount;
            dm.sensor.exposure_time = shot.shot.ctl.sensor.exposure_time;
            dm.sensor.frame_duration = shot.shot.ctl.sensor.frame_duration;
            dm.sensor.timestamp = self.osal.get_time_us() * 1000;
            dm.aa_state = 1;
            unsafe { shot_ptr.as_ptr().write_unaligned(shot) };
        }
        done.push(IrqClass::MetaDone);

        let mut state = self.state.lock();
        for class in done {
            let status = if class == IrqClass::MetaDone { 0 } else { status };
            let msg = IsMessage::new(IHC_FRAME_DONE, 0).with_params(inflight.fcount, status, 0, 0);
            state.outbox.push_back((class, msg));
        }
    }

    fn consume_doorbell(&self) {
        if !self.regs.intgr0.is_set(INTGR0::INTGD0) || self.state.lock().stall_doorbell {
            return;
        }
        let msg = IsMessage {
            command: self.regs.hicmd.get(),
            instance: self.regs.hic_sensorid.get(),
            param1: self.regs.hic_param1.get(),
            param2: self.regs.hic_param2.get(),
            param3: self.regs.hic_param3.get(),
            param4: self.regs.hic_param4.get(),
        };
        self.regs.intgr0.set(0);
        self.osal.record(SimEvent::Command(msg.command));

        let mut state = self.state.lock();
        state.commands.push(msg);
        while let Some(overdue) = state.overdue.pop_front() {
            state.outbox.push_back((IrqClass::General, overdue));
        }
        if state.mute.contains(&msg.command) {
            return;
        }
        let reply = |command, param2| {
            IsMessage::new(command, msg.instance).with_params(msg.command, param2, msg.param3, 0)
        };
        if let Some(&(_, code)) = state.reject.iter().find(|(cmd, _)| *cmd == msg.command) {
            state.outbox.push_back((IrqClass::General, reply(ISR_NDONE, code)));
            return;
        }
        match msg.command {
            HIC_GET_SET_FILE_ADDR => {
                let offset = state.setfile_offset;
                state.outbox.push_back((IrqClass::General, reply(ISR_DONE, offset)));
            }
            HIC_SHOT => {
                state.inflight.push_back(InFlight {
                    fcount: msg.param3,
                    bayer_dva: msg.param1,
                    shot_dva: msg.param2,
                });
                if state.hold_shots {
                    state.held.push_back(reply(ISR_DONE, 0));
                } else {
                    state.outbox.push_back((IrqClass::General, reply(ISR_DONE, 0)));
                }
            }
            command if state.late.contains(&command) => {
                state.overdue.push_back(reply(ISR_DONE, 0));
            }
            _ => state.outbox.push_back((IrqClass::General, reply(ISR_DONE, 0))),
        }
    }

    /// Raise one interrupt per queued event.
    fn deliver(&self) {
        let Some(interface) = self.interface.lock().upgrade() else {
            return;
        };
        loop {
            let Some((class, msg)) = self.state.lock().outbox.pop_front() else {
                break;
            };
            let regs = &self.regs;
            match class {
                IrqClass::General => {
                    regs.ihcmd.set(msg.command);
                    regs.ihc_sensorid.set(msg.instance);
                    regs.ihc_param1.set(msg.param1);
                    regs.ihc_param2.set(msg.param2);
                    regs.ihc_param3.set(msg.param3);
                    regs.ihc_param4.set(msg.param4);
                }
                IrqClass::SccDone => {
                    regs.scc_sensorid.set(msg.instance);
                    regs.scc_param1.set(msg.param1);
                    regs.scc_param2.set(msg.param2);
                    regs.scc_param3.set(msg.param3);
                }
                IrqClass::ScpDone => {
                    regs.scp_sensorid.set(msg.instance);
                    regs.scp_param1.set(msg.param1);
                    regs.scp_param2.set(msg.param2);
                    regs.scp_param3.set(msg.param3);
                }
                IrqClass::MetaDone => {
                    regs.meta_sensorid.set(msg.instance);
                    regs.meta_param1.set(msg.param1);
                    regs.meta_param2.set(msg.param2);
                    regs.meta_param3.set(msg.param3);
                    regs.fcount.set(msg.param1);
                }
            }
            regs.intsr1.set(class.bit());
            interface.irq_handler();
            regs.intsr1.set(0);
        }
    }
}

impl SimDevice for SimFirmware {
    fn tick(&self) {
        let running = self.regs.mcuctl.is_set(MCUCTL::RUN);
        let base = self.regs.bboar.get();
        {
            let mut state = self.state.lock();
            // A new boot base means the core went through reset since the
            // last boot, even if no tick saw it stopped.
            if state.booted && (!running || base != state.boot_base) {
                state.booted = false;
                state.outbox.clear();
                state.held.clear();
                state.overdue.clear();
                state.inflight.clear();
            }
            if !running {
                return;
            }
            if !state.booted {
                state.booted = true;
                state.boot_base = base;
                let count = state.sensor_count;
                state.outbox.push_back((
                    IrqClass::General,
                    IsMessage::new(IHC_GET_SENSOR_NUMBER, 0).with_params(count, 0, 0, 0),
                ));
            }
        }
        self.consume_doorbell();
        let auto_complete = self.state.lock().auto_complete;
        if auto_complete {
            let inflight: Vec<_> = self.state.lock().inflight.drain(..).collect();
            for shot in inflight.iter() {
                self.finish(shot, 0);
            }
        }
        self.deliver();
    }
}
