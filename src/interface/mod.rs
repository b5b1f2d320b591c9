//! Command channel between the AP and the firmware running on the ISP core.
//!
//! Two paths share the same hardware command registers:
//!
//! * blocking commands ([`Interface::set_cmd`]) are serialized by the request
//!   barrier; the caller polls until the interrupt handler stores the reply
//!   and flips the interface back to idle, or the timeout expires;
//! * per-frame commands (`HIC_SHOT`, `HIC_SET_CAM_CONTROL`) go through
//!   [`Interface::set_cmd_nblk`], which only reserves an item from a small
//!   pool and returns. The reply frees the item from interrupt context.
//!
//! Completions are demultiplexed by [`Interface::irq_handler`] into four work
//! lists and drained later by [`Interface::run_work`].

pub mod command;
pub mod work;

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use spin::Mutex;
use tock_registers::interfaces::{Readable, Writeable};

pub use command::*;
pub use work::{Work, WorkList};

use crate::{
    config::FimcIsConfig,
    err::{FimcIsError, Result, WorkPool},
    osal::Osal,
    region::ParamSet,
    registers::{
        MailboxRegisters,
        consts::INTSR1_ALL,
        mailbox::{INTGR0, INTSR1},
    },
};

/// Completion classes, one per `INTSR1` bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrqClass {
    General = 0,
    SccDone = 1,
    ScpDone = 2,
    MetaDone = 3,
}

impl IrqClass {
    pub const ALL: [IrqClass; 4] = [
        IrqClass::General,
        IrqClass::SccDone,
        IrqClass::ScpDone,
        IrqClass::MetaDone,
    ];

    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Pools of the non-blocking path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NblkClass {
    Shot,
    CamCtrl,
}

/// Consumer of deferred completions, run in process context.
pub trait WorkSink {
    /// Firmware messages and replies to non-blocking commands.
    fn general(&mut self, work: &Work);
    fn scc_done(&mut self, work: &Work);
    fn scp_done(&mut self, work: &Work);
    fn meta_done(&mut self, work: &Work);
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    Idle = 0,
    BlockIo = 1,
}

/// Microsecond bounds used by the command paths.
#[derive(Debug, Clone, Copy)]
pub struct CommandTimeouts {
    pub command_us: u64,
    pub sensor_us: u64,
    pub ready_us: u64,
    pub poll_us: u32,
}

impl CommandTimeouts {
    pub fn from_config(config: &FimcIsConfig) -> Self {
        Self {
            command_us: config.timeouts.command_ms as u64 * 1000,
            sensor_us: config.timeouts.sensor_command_ms as u64 * 1000,
            ready_us: config.timeouts.mailbox_ready_us as u64,
            poll_us: config.poll_interval_us.max(1),
        }
    }
}

/// Counters kept by the interrupt path.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    pub late_replies: AtomicU32,
    pub dropped_events: AtomicU32,
    pub shot_done: AtomicU32,
    pub shot_ndone: AtomicU32,
}

pub struct Interface<O: Osal> {
    osal: O,
    regs: MailboxRegisters,
    timeouts: CommandTimeouts,
    /// Serializes the blocking path.
    request_barrier: Mutex<()>,
    /// Serializes writes to the command registers, from either path.
    process_barrier: Mutex<()>,
    state: AtomicU8,
    /// Command the blocking path is waiting on.
    waiting_for: AtomicU32,
    reply: Mutex<IsMessage>,
    streaming: AtomicBool,
    fw_ready: AtomicBool,
    sensor_count: AtomicU32,
    work_lists: [WorkList; 4],
    pending: [AtomicBool; 4],
    nblk_shot: WorkList,
    nblk_cam_ctrl: WorkList,
    stats: InterfaceStats,
}

impl<O: Osal> Interface<O> {
    pub fn new(osal: O, regs: MailboxRegisters, config: &FimcIsConfig) -> Self {
        let work_list = |class| WorkList::new(WorkPool::Irq(class), config.work_count);
        Self {
            osal,
            regs,
            timeouts: CommandTimeouts::from_config(config),
            request_barrier: Mutex::new(()),
            process_barrier: Mutex::new(()),
            state: AtomicU8::new(InterfaceState::Idle as u8),
            waiting_for: AtomicU32::new(0),
            reply: Mutex::new(IsMessage::default()),
            streaming: AtomicBool::new(false),
            fw_ready: AtomicBool::new(false),
            sensor_count: AtomicU32::new(0),
            work_lists: IrqClass::ALL.map(work_list),
            pending: Default::default(),
            nblk_shot: WorkList::new(WorkPool::Shot, config.nblk_count),
            nblk_cam_ctrl: WorkList::new(WorkPool::CamCtrl, config.nblk_count),
            stats: InterfaceStats::default(),
        }
    }

    pub fn state(&self) -> InterfaceState {
        if self.state.load(Ordering::Acquire) == InterfaceState::BlockIo as u8 {
            InterfaceState::BlockIo
        } else {
            InterfaceState::Idle
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn is_fw_ready(&self) -> bool {
        self.fw_ready.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &InterfaceStats {
        &self.stats
    }

    /// Register file shared with the boot and power sequencing.
    pub fn regs(&self) -> &MailboxRegisters {
        &self.regs
    }

    pub fn timeouts(&self) -> CommandTimeouts {
        self.timeouts
    }

    pub fn work_list(&self, class: IrqClass) -> &WorkList {
        &self.work_lists[class.index()]
    }

    pub fn nblk_list(&self, class: NblkClass) -> &WorkList {
        match class {
            NblkClass::Shot => &self.nblk_shot,
            NblkClass::CamCtrl => &self.nblk_cam_ctrl,
        }
    }

    /// Forget everything a previous firmware session left behind.
    pub fn reset(&self) {
        self.state.store(InterfaceState::Idle as u8, Ordering::Release);
        self.streaming.store(false, Ordering::Release);
        self.fw_ready.store(false, Ordering::Release);
        for list in self.work_lists.iter() {
            list.reset();
        }
        for pending in self.pending.iter() {
            pending.store(false, Ordering::Release);
        }
        self.nblk_shot.reset();
        self.nblk_cam_ctrl.reset();
    }

    /// Wait until the core has consumed the previous doorbell.
    fn wait_ready(&self) -> Result<()> {
        let start = self.osal.get_time_us();
        while self.regs.intgr0.is_set(INTGR0::INTGD0) {
            if self.osal.timeout_check(start, self.timeouts.ready_us) {
                error!("mailbox still busy after {}us", self.timeouts.ready_us);
                return Err(FimcIsError::Busy);
            }
            self.osal.udelay(self.timeouts.poll_us);
        }
        Ok(())
    }

    /// Ring the doorbell once the core is ready. The ready check and the
    /// register writes happen under one lock, whichever path sends.
    fn write_msg(&self, msg: &IsMessage) -> Result<()> {
        let _process = self.process_barrier.lock();
        self.wait_ready()?;
        self.regs.hicmd.set(msg.command);
        self.regs.hic_sensorid.set(msg.instance);
        self.regs.hic_param1.set(msg.param1);
        self.regs.hic_param2.set(msg.param2);
        self.regs.hic_param3.set(msg.param3);
        self.regs.hic_param4.set(msg.param4);
        self.regs.intgr0.write(INTGR0::INTGD0::SET);
        Ok(())
    }

    /// Send a blocking command and wait for its reply.
    pub fn set_cmd(&self, msg: IsMessage, timeout_us: u64) -> Result<IsMessage> {
        let _request = self.request_barrier.lock();

        let already = match msg.command {
            HIC_STREAM_ON => self.is_streaming(),
            HIC_STREAM_OFF => !self.is_streaming(),
            _ => false,
        };
        if already {
            debug!("{} skipped, stream state unchanged", command_name(msg.command));
            return Ok(IsMessage::new(ISR_DONE, msg.instance).with_params(msg.command, 0, 0, 0));
        }

        *self.reply.lock() = IsMessage::default();
        self.waiting_for.store(msg.command, Ordering::Release);
        self.state
            .store(InterfaceState::BlockIo as u8, Ordering::Release);

        debug!(
            "[ITF:{}] {} ({:#x}, {:#x}, {:#x}, {:#x})",
            msg.instance,
            command_name(msg.command),
            msg.param1,
            msg.param2,
            msg.param3,
            msg.param4
        );
        if let Err(err) = self.write_msg(&msg) {
            self.state.store(InterfaceState::Idle as u8, Ordering::Release);
            return Err(err);
        }

        let start = self.osal.get_time_us();
        while self.state() == InterfaceState::BlockIo {
            if self.osal.timeout_check(start, timeout_us) {
                self.state.store(InterfaceState::Idle as u8, Ordering::Release);
                error!(
                    "[ITF:{}] {} timed out after {}us",
                    msg.instance,
                    command_name(msg.command),
                    timeout_us
                );
                return Err(FimcIsError::Timeout {
                    command: msg.command,
                });
            }
            self.osal.udelay(self.timeouts.poll_us);
        }

        let reply = *self.reply.lock();
        match reply.command {
            ISR_DONE if reply.param1 == msg.command => {
                match msg.command {
                    HIC_STREAM_ON => self.streaming.store(true, Ordering::Release),
                    HIC_STREAM_OFF => self.streaming.store(false, Ordering::Release),
                    _ => {}
                }
                Ok(reply)
            }
            ISR_NDONE if reply.param1 == msg.command => {
                error!(
                    "[ITF:{}] {} rejected (code {:#x})",
                    msg.instance,
                    command_name(msg.command),
                    reply.param2
                );
                Err(FimcIsError::Rejected {
                    command: msg.command,
                    code: reply.param2,
                })
            }
            _ => {
                let got = if reply.is_reply() {
                    reply.param1
                } else {
                    reply.command
                };
                error!(
                    "[ITF:{}] reply for {:#x} while waiting for {}",
                    msg.instance,
                    got,
                    command_name(msg.command)
                );
                Err(FimcIsError::UnexpectedReply {
                    expected: msg.command,
                    got,
                })
            }
        }
    }

    /// Send a per-frame command without waiting.
    ///
    /// Fails immediately with `NoFreeWork` when `class` already has as many
    /// commands outstanding as its pool holds.
    pub fn set_cmd_nblk(&self, class: NblkClass, msg: IsMessage) -> Result<()> {
        let list = self.nblk_list(class);
        let work = Work {
            msg,
            fcount: msg.param3,
        };
        let Some(index) = list.push(work) else {
            warn!(
                "[ITF:{}] {} refused, {} outstanding",
                msg.instance,
                command_name(msg.command),
                list.capacity()
            );
            return Err(FimcIsError::NoFreeWork(list.id()));
        };

        trace!(
            "[ITF:{}] {} fcount {}",
            msg.instance,
            command_name(msg.command),
            msg.param3
        );
        if let Err(err) = self.write_msg(&msg) {
            list.cancel(index);
            return Err(err);
        }
        Ok(())
    }

    fn read_msg(&self, class: IrqClass) -> Work {
        let regs = &self.regs;
        match class {
            IrqClass::General => {
                let msg = IsMessage {
                    command: regs.ihcmd.get(),
                    instance: regs.ihc_sensorid.get(),
                    param1: regs.ihc_param1.get(),
                    param2: regs.ihc_param2.get(),
                    param3: regs.ihc_param3.get(),
                    param4: regs.ihc_param4.get(),
                };
                Work {
                    msg,
                    fcount: msg.param3,
                }
            }
            IrqClass::SccDone | IrqClass::ScpDone | IrqClass::MetaDone => {
                let (command, instance, param1, param2, param3) = match class {
                    IrqClass::SccDone => (
                        IHC_FRAME_DONE,
                        regs.scc_sensorid.get(),
                        regs.scc_param1.get(),
                        regs.scc_param2.get(),
                        regs.scc_param3.get(),
                    ),
                    IrqClass::ScpDone => (
                        IHC_FRAME_DONE,
                        regs.scp_sensorid.get(),
                        regs.scp_param1.get(),
                        regs.scp_param2.get(),
                        regs.scp_param3.get(),
                    ),
                    _ => (
                        IHC_FRAME_DONE,
                        regs.meta_sensorid.get(),
                        regs.meta_param1.get(),
                        regs.meta_param2.get(),
                        regs.meta_param3.get(),
                    ),
                };
                Work {
                    msg: IsMessage::new(command, instance).with_params(param1, param2, param3, 0),
                    fcount: param1,
                }
            }
        }
    }

    /// Decide what a general message means before it is queued. Returns
    /// whether deferred work must see it.
    fn handle_general(&self, work: &Work) -> bool {
        let msg = &work.msg;
        match msg.command {
            IHC_GET_SENSOR_NUMBER => {
                info!("firmware ready, {} sensor(s)", msg.param1);
                self.sensor_count.store(msg.param1, Ordering::Release);
                self.fw_ready.store(true, Ordering::Release);
                false
            }
            ISR_DONE | ISR_NDONE if is_nblk_command(msg.param1) => {
                let list = if msg.param1 == HIC_SHOT {
                    if msg.command == ISR_DONE {
                        self.stats.shot_done.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.stats.shot_ndone.fetch_add(1, Ordering::Relaxed);
                    }
                    &self.nblk_shot
                } else {
                    &self.nblk_cam_ctrl
                };
                if list.pop().is_none() {
                    warn!("{} reply without outstanding request", command_name(msg.param1));
                }
                true
            }
            ISR_DONE | ISR_NDONE => {
                if self.state() == InterfaceState::BlockIo
                    && self.waiting_for.load(Ordering::Acquire) == msg.param1
                {
                    *self.reply.lock() = *msg;
                    self.state.store(InterfaceState::Idle as u8, Ordering::Release);
                } else {
                    warn!(
                        "late {} for {}, nobody waiting for it",
                        command_name(msg.command),
                        command_name(msg.param1)
                    );
                    self.stats.late_replies.fetch_add(1, Ordering::Relaxed);
                }
                false
            }
            _ => true,
        }
    }

    /// Interrupt entry point. Never blocks.
    ///
    /// Returns the `INTSR1` bits of the classes whose deferred work was
    /// scheduled by this call; a class that already had work pending is not
    /// reported again.
    pub fn irq_handler(&self) -> u32 {
        let status = self.regs.intsr1.get() & INTSR1_ALL;
        let mut scheduled = 0;

        for class in IrqClass::ALL {
            if status & class.bit() == 0 {
                continue;
            }
            let work = self.read_msg(class);
            self.regs.intcr1.set(class.bit());

            if class == IrqClass::General && !self.handle_general(&work) {
                continue;
            }

            if self.work_list(class).push(work).is_none() {
                error!("no free work for {:?}, event {:#x} dropped", class, work.msg.command);
                self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if self.pending[class.index()]
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                scheduled |= class.bit();
            }
        }

        trace!("irq status {:#x} scheduled {:#x}", status, scheduled);
        scheduled
    }

    /// Classes with deferred work scheduled and not yet run.
    pub fn pending_mask(&self) -> u32 {
        IrqClass::ALL
            .iter()
            .filter(|class| self.pending[class.index()].load(Ordering::Acquire))
            .fold(0, |mask, class| mask | class.bit())
    }

    /// Deferred work of one class: drain its request list into `sink`.
    pub fn run_work(&self, class: IrqClass, sink: &mut impl WorkSink) -> usize {
        self.pending[class.index()].store(false, Ordering::Release);
        let list = self.work_list(class);
        let mut count = 0;
        while let Some(work) = list.pop() {
            match class {
                IrqClass::General => sink.general(&work),
                IrqClass::SccDone => sink.scc_done(&work),
                IrqClass::ScpDone => sink.scp_done(&work),
                IrqClass::MetaDone => sink.meta_done(&work),
            }
            count += 1;
        }
        count
    }

    /// Run every scheduled class once.
    pub fn run_pending(&self, sink: &mut impl WorkSink) -> usize {
        let mask = self.pending_mask();
        IrqClass::ALL
            .iter()
            .filter(|class| mask & class.bit() != 0)
            .map(|&class| self.run_work(class, sink))
            .sum()
    }

    /// Wait for the init message the firmware sends once booted.
    pub fn wait_init(&self, timeout_ms: u32) -> Result<u32> {
        let start = self.osal.get_time_us();
        while !self.is_fw_ready() {
            if self.osal.timeout_check(start, timeout_ms as u64 * 1000) {
                error!("no init message from firmware within {}ms", timeout_ms);
                return Err(crate::err::FirmwareError::NoInitMessage.into());
            }
            self.osal.udelay(self.timeouts.poll_us);
        }
        Ok(self.sensor_count.load(Ordering::Acquire))
    }

    pub fn open_sensor(
        &self,
        instance: u32,
        sensor_id: u32,
        channel: u32,
        i2c_addr: u32,
        region_dva: u32,
    ) -> Result<()> {
        let msg = IsMessage::new(HIC_OPEN_SENSOR, instance).with_params(
            sensor_id,
            channel,
            i2c_addr,
            region_dva,
        );
        self.set_cmd(msg, self.timeouts.sensor_us).map(|_| ())
    }

    pub fn close_sensor(&self, instance: u32) -> Result<()> {
        self.set_cmd(IsMessage::new(HIC_CLOSE_SENSOR, instance), self.timeouts.sensor_us)
            .map(|_| ())
    }

    /// Offset of the setfile inside the firmware area.
    pub fn get_setfile_addr(&self, instance: u32) -> Result<u32> {
        let reply = self.set_cmd(
            IsMessage::new(HIC_GET_SET_FILE_ADDR, instance),
            self.timeouts.sensor_us,
        )?;
        Ok(reply.param2)
    }

    pub fn load_setfile(&self, instance: u32, offset: u32) -> Result<()> {
        let msg = IsMessage::new(HIC_LOAD_SET_FILE, instance).with_params(offset, 0, 0, 0);
        self.set_cmd(msg, self.timeouts.sensor_us).map(|_| ())
    }

    /// Ask the firmware to read the parameter blocks in `set`.
    ///
    /// The region must have been flushed by the caller.
    pub fn set_param(&self, instance: u32, set: &ParamSet) -> Result<()> {
        if set.is_empty() {
            return Ok(());
        }
        let msg = IsMessage::new(HIC_SET_PARAMETER, instance).with_params(
            set.indexes,
            set.lindex,
            set.hindex,
            0,
        );
        self.set_cmd(msg, self.timeouts.command_us).map(|_| ())
    }

    /// Apply the parameters read so far in the given mode.
    pub fn apply_param(&self, instance: u32, mode: u32) -> Result<()> {
        self.set_cmd(IsMessage::new(mode, instance), self.timeouts.command_us)
            .map(|_| ())
    }

    pub fn process_start(&self, instance: u32) -> Result<()> {
        self.set_cmd(IsMessage::new(HIC_PROCESS_START, instance), self.timeouts.command_us)
            .map(|_| ())
    }

    pub fn process_stop(&self, instance: u32) -> Result<()> {
        self.set_cmd(IsMessage::new(HIC_PROCESS_STOP, instance), self.timeouts.command_us)
            .map(|_| ())
    }

    pub fn stream_on(&self, instance: u32) -> Result<()> {
        self.set_cmd(IsMessage::new(HIC_STREAM_ON, instance), self.timeouts.command_us)
            .map(|_| ())
    }

    pub fn stream_off(&self, instance: u32) -> Result<()> {
        self.set_cmd(IsMessage::new(HIC_STREAM_OFF, instance), self.timeouts.command_us)
            .map(|_| ())
    }

    pub fn power_down(&self, instance: u32) -> Result<()> {
        self.set_cmd(IsMessage::new(HIC_POWER_DOWN, instance), self.timeouts.command_us)
            .map(|_| ())
    }

    /// Queue one frame for processing.
    pub fn shot(&self, instance: u32, bayer_dva: u32, shot_dva: u32, fcount: u32) -> Result<()> {
        let msg = IsMessage::new(HIC_SHOT, instance).with_params(bayer_dva, shot_dva, fcount, 0);
        self.set_cmd_nblk(NblkClass::Shot, msg)
    }

    /// Push new per-frame controls without a frame.
    pub fn cam_ctrl(&self, instance: u32, shot_dva: u32, fcount: u32) -> Result<()> {
        let msg = IsMessage::new(HIC_SET_CAM_CONTROL, instance).with_params(0, shot_dva, fcount, 0);
        self.set_cmd_nblk(NblkClass::CamCtrl, msg)
    }

    /// Raw view of the interrupt status, for diagnostics.
    pub fn irq_status(&self) -> u32 {
        self.regs.intsr1.get() & INTSR1_ALL
    }

    /// Whether the doorbell is still waiting to be consumed.
    pub fn doorbell_pending(&self) -> bool {
        self.regs.intgr0.is_set(INTGR0::INTGD0)
    }

    /// Mask every completion class at the interrupt controller.
    pub fn mask_irqs(&self, mask: bool) {
        let value = if mask {
            INTSR1::GENERAL::SET + INTSR1::SCC_DONE::SET + INTSR1::SCP_DONE::SET + INTSR1::META_DONE::SET
        } else {
            INTSR1::GENERAL::CLEAR
                + INTSR1::SCC_DONE::CLEAR
                + INTSR1::SCP_DONE::CLEAR
                + INTSR1::META_DONE::CLEAR
        };
        self.regs.intmr1.write(value);
    }
}
