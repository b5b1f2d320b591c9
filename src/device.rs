//! Top-level FIMC-IS device.
//!
//! Owns the mailbox interface, the processing chain, the sensor front end and
//! the bayer capture queue, and routes the video-node operations to them.
//! The exclusive borrow taken by every mutating call is what serializes the
//! chain; only [`FimcIsDevice::irq`] works through a shared reference.

use alloc::sync::Arc;

use crate::{
    config::FimcIsConfig,
    err::{FimcIsError, Result},
    geometry::Size,
    interface::Interface,
    ischain::{CameraControl, Ischain},
    media::Pad,
    osal::Osal,
    platform::PlatformOps,
    registers::{CsisRegisters, FliteRegisters, MailboxRegisters, RegisterBases},
    sensor::{SensorDevice, SensorId},
    video::{DoneBuffer, VideoBuffer, VideoKind, VideoQueue},
};

pub struct FimcIsDevice<O: Osal, P: PlatformOps> {
    config: FimcIsConfig,
    interface: Arc<Interface<O>>,
    ischain: Ischain<O, P>,
    sensor: SensorDevice<O, P>,
    sensor_queue: VideoQueue,
    opened: bool,
}

impl<O: Osal, P: PlatformOps> FimcIsDevice<O, P> {
    /// Bind the driver to the register windows in `bases` for `sensor`.
    ///
    /// # Safety
    ///
    /// Every base in `bases` must map the matching register block (or memory
    /// standing in for it) for the lifetime of the returned device.
    pub unsafe fn new(
        config: FimcIsConfig,
        osal: O,
        platform: P,
        bases: RegisterBases,
        sensor: SensorId,
    ) -> Result<Self> {
        let Some(slot) = config.sensor_slot(sensor) else {
            error!("{:?} is not wired on {:?}", sensor, config.board);
            return Err(FimcIsError::InvalidArgument);
        };
        let platform = Arc::new(platform);
        let (mailbox, csis, flite) = unsafe {
            (
                MailboxRegisters::new(bases.mailbox),
                CsisRegisters::new(bases.csis),
                FliteRegisters::new(bases.flite),
            )
        };
        let interface = Arc::new(Interface::new(osal.clone(), mailbox, &config));
        let sensor = SensorDevice::new(osal.clone(), platform.clone(), &config, slot, csis, flite);
        let ischain = Ischain::new(osal, platform, interface.clone(), &config);
        Ok(Self {
            sensor_queue: VideoQueue::new(VideoKind::Sensor, config.frame_count),
            config,
            interface,
            ischain,
            sensor,
            opened: false,
        })
    }

    pub fn config(&self) -> &FimcIsConfig {
        &self.config
    }

    pub fn interface(&self) -> &Arc<Interface<O>> {
        &self.interface
    }

    pub fn ischain(&self) -> &Ischain<O, P> {
        &self.ischain
    }

    pub fn ischain_mut(&mut self) -> &mut Ischain<O, P> {
        &mut self.ischain
    }

    pub fn sensor(&self) -> &SensorDevice<O, P> {
        &self.sensor
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    fn queue(&self, kind: VideoKind) -> Result<&VideoQueue> {
        match kind {
            VideoKind::Sensor => Ok(&self.sensor_queue),
            _ => self.ischain.queue(kind).ok_or(FimcIsError::InvalidArgument),
        }
    }

    /// Power the sensor, boot the firmware and open the chain.
    pub fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.sensor.power_on()?;
        let slot = self.sensor.slot();
        if let Err(err) = self
            .ischain
            .open(slot, self.sensor.size(), self.sensor.fps())
        {
            let _ = self.sensor.power_off();
            return Err(err);
        }
        self.opened = true;
        Ok(())
    }

    /// Stop everything and power down. Returns the first failure.
    pub fn close(&mut self) -> Result<()> {
        if !self.opened {
            return Ok(());
        }
        let flite = self.sensor.stream_off(self.sensor_queue.frames());
        self.sensor_queue.set_streaming(false);
        let chain = self.ischain.close();
        let power = self.sensor.power_off();
        self.opened = false;
        flite.and(chain).and(power)
    }

    /// Output size of a node. The sensor and ISP nodes set chain0, SCC
    /// chain1 and chain2, SCP chain3.
    pub fn set_format(&mut self, kind: VideoKind, size: Size) -> Result<()> {
        let mut sizes = self.ischain.sizes();
        match kind {
            VideoKind::Sensor | VideoKind::Isp => sizes.chain0 = size,
            VideoKind::Scc => {
                sizes.chain1 = size;
                sizes.chain2 = size;
            }
            VideoKind::Scp => sizes.chain3 = size,
        }
        if self.opened {
            sizes.validate()?;
        }

        let (previous, fps) = (self.sensor.size(), self.sensor.fps());
        if kind == VideoKind::Sensor {
            self.sensor.set_format(size, fps)?;
        }
        if !self.opened {
            // Open starts from the sensor size; only the sensor format matters yet.
            return Ok(());
        }
        if let Err(err) = self.ischain.set_chain_sizes(sizes) {
            if kind == VideoKind::Sensor {
                warn!(
                    "chain rejected {}x{}, sensor back to {}x{}",
                    size.width, size.height, previous.width, previous.height
                );
                self.sensor.set_format(previous, fps)?;
            }
            return Err(err);
        }
        Ok(())
    }

    pub fn qbuf(&mut self, kind: VideoKind, buf: &VideoBuffer) -> Result<()> {
        self.queue(kind)?.qbuf(buf)?;
        if kind == VideoKind::Isp {
            self.ischain.kick();
        }
        Ok(())
    }

    pub fn dqbuf(&mut self, kind: VideoKind) -> Option<DoneBuffer> {
        self.queue(kind).ok()?.dqbuf()
    }

    pub fn stream_on(&mut self, kind: VideoKind) -> Result<()> {
        if !self.opened {
            return Err(FimcIsError::InvalidState);
        }
        match kind {
            VideoKind::Sensor => {
                self.sensor.stream_on(self.sensor_queue.frames())?;
                self.sensor_queue.set_streaming(true);
            }
            VideoKind::Isp => self.ischain.isp_start()?,
            VideoKind::Scc | VideoKind::Scp => {
                if let Some(queue) = self.ischain.queue_mut(kind) {
                    queue.set_streaming(true);
                }
            }
        }
        Ok(())
    }

    pub fn stream_off(&mut self, kind: VideoKind) -> Result<()> {
        match kind {
            VideoKind::Sensor => {
                self.sensor.stream_off(self.sensor_queue.frames())?;
                self.sensor_queue.set_streaming(false);
            }
            VideoKind::Isp => self.ischain.isp_stop()?,
            VideoKind::Scc | VideoKind::Scp => {
                if let Some(queue) = self.ischain.queue_mut(kind) {
                    queue.set_streaming(false);
                }
            }
        }
        Ok(())
    }

    pub fn s_ctrl(&mut self, ctrl: CameraControl) -> Result<()> {
        if let CameraControl::FrameRate(fps) = ctrl {
            self.sensor.set_format(self.sensor.size(), fps)?;
        }
        self.ischain.s_ctrl(ctrl)
    }

    pub fn link_setup(&mut self, local: Pad, remote: Option<Pad>, enable: bool) -> Result<()> {
        self.ischain.graph_mut().link_setup(local, remote, enable)
    }

    /// ISP mailbox interrupt.
    pub fn irq(&self) -> u32 {
        self.interface.irq_handler()
    }

    /// FIMC-LITE interrupt of the capture channel.
    pub fn flite_irq(&mut self) {
        self.sensor.flite_irq(self.sensor_queue.frames());
    }

    /// Run the completion work scheduled by the interrupt handler, then send
    /// whatever shots fit.
    pub fn run_deferred_work(&mut self) -> usize {
        let interface = self.interface.clone();
        let done = interface.run_pending(&mut self.ischain);
        self.ischain.kick();
        done
    }
}
