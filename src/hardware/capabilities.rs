//! Hardware Capabilities
//!
//! The sampler core talks to hardware only through two narrow, synchronous seams:
//!
//! - [`VoltageSource`]: one blocking "read the current voltage" call per sampler tick
//! - [`FrequencyOutput`]: set the flash frequency of the indicator light
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is synchronous (the sampler owns a dedicated OS thread; blocking is expected)
//! - Is `Send` so it can move onto that thread
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! struct ConstantSource(f64);
//!
//! impl VoltageSource for ConstantSource {
//!     fn read_voltage(&mut self) -> Result<f64> {
//!         Ok(self.0)
//!     }
//! }
//! ```

use anyhow::Result;

/// Capability: Voltage Acquisition
///
/// Devices that produce one analog reading per call (ADC channels, simulated sensors).
///
/// # Contract
/// - Returns volts
/// - May block, but for a bounded time
/// - An `Err` is a transient failure: the caller skips the tick and tries again
/// - Dropping the source releases the underlying handle
pub trait VoltageSource: Send {
    /// Read the current voltage
    fn read_voltage(&mut self) -> Result<f64>;

    /// Short description for logs
    fn describe(&self) -> String {
        "voltage source".to_string()
    }
}

impl<T: VoltageSource + ?Sized> VoltageSource for Box<T> {
    fn read_voltage(&mut self) -> Result<f64> {
        (**self).read_voltage()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Capability: Frequency Output
///
/// Devices whose output toggles at a settable frequency (PWM-driven indicator light).
///
/// # Contract
/// - `hz == 0` disables the output
/// - Implementations may skip writes when the value is unchanged
pub trait FrequencyOutput: Send {
    /// Apply a new output frequency in Hz
    fn set_output_frequency(&mut self, hz: u32) -> Result<()>;
}

impl<T: FrequencyOutput + ?Sized> FrequencyOutput for Box<T> {
    fn set_output_frequency(&mut self, hz: u32) -> Result<()> {
        (**self).set_output_frequency(hz)
    }
}
