//! Board callbacks consumed by the driver.
//!
//! On the kernel side these are function pointers in the camera platform
//! data (`clk_cfg`, `clk_on`, `sensor_power_on`, ...). Here they form one
//! trait; a board provides the real implementation and the `sim` module a
//! recording one for tests.

/// Clock, GPIO, regulator and power-domain control for one board.
pub trait PlatformOps {
    /// Configure the sensor GPIOs (reset, standby, I2C mux) for `channel`.
    fn cfg_gpio(&self, channel: u32, on: bool) -> Result<(), PlatformError>;

    /// Set clock parents and rates for the ISP block.
    fn clk_cfg(&self) -> Result<(), PlatformError>;

    fn clk_on(&self) -> Result<(), PlatformError>;

    fn clk_off(&self) -> Result<(), PlatformError>;

    /// Power up the sensor wired to `channel` (regulators, MCLK).
    fn sensor_power_on(&self, channel: u32) -> Result<(), PlatformError>;

    fn sensor_power_off(&self, channel: u32) -> Result<(), PlatformError>;

    /// Switch the ISP ARM core power domain.
    fn a5_power(&self, on: bool) -> Result<(), PlatformError>;
}

/// Opaque failure from a board callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformError;

impl From<PlatformError> for crate::FimcIsError {
    fn from(_: PlatformError) -> Self {
        crate::FimcIsError::Platform
    }
}
