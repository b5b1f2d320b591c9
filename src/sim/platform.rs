use alloc::{sync::Arc, vec::Vec};

use spin::Mutex;

use crate::platform::{PlatformError, PlatformOps};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformCall {
    CfgGpio { channel: u32, on: bool },
    ClkCfg,
    ClkOn,
    ClkOff,
    SensorPowerOn(u32),
    SensorPowerOff(u32),
    A5Power(bool),
}

#[derive(Default)]
struct State {
    calls: Vec<PlatformCall>,
    fail: Option<PlatformCall>,
}

/// Board callbacks that only record what they were asked to do.
#[derive(Clone, Default)]
pub struct SimPlatform {
    state: Arc<Mutex<State>>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    /// Make the next matching call (and every one after it) fail.
    pub fn fail_on(&self, call: Option<PlatformCall>) {
        self.state.lock().fail = call;
    }

    fn call(&self, call: PlatformCall) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.fail == Some(call) {
            return Err(PlatformError);
        }
        Ok(())
    }
}

impl PlatformOps for SimPlatform {
    fn cfg_gpio(&self, channel: u32, on: bool) -> Result<(), PlatformError> {
        self.call(PlatformCall::CfgGpio { channel, on })
    }

    fn clk_cfg(&self) -> Result<(), PlatformError> {
        self.call(PlatformCall::ClkCfg)
    }

    fn clk_on(&self) -> Result<(), PlatformError> {
        self.call(PlatformCall::ClkOn)
    }

    fn clk_off(&self) -> Result<(), PlatformError> {
        self.call(PlatformCall::ClkOff)
    }

    fn sensor_power_on(&self, channel: u32) -> Result<(), PlatformError> {
        self.call(PlatformCall::SensorPowerOn(channel))
    }

    fn sensor_power_off(&self, channel: u32) -> Result<(), PlatformError> {
        self.call(PlatformCall::SensorPowerOff(channel))
    }

    fn a5_power(&self, on: bool) -> Result<(), PlatformError> {
        self.call(PlatformCall::A5Power(on))
    }
}
