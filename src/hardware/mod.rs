//! Hardware seams and their implementations.
//!
//! - `capabilities`: the [`VoltageSource`] and [`FrequencyOutput`] traits
//! - `mock`: simulated and scripted devices for running without hardware and for tests
//! - `sysfs`: Linux IIO ADC input and sysfs PWM output

pub mod capabilities;
pub mod mock;
pub mod sysfs;

pub use capabilities::{FrequencyOutput, VoltageSource};
pub use mock::{MockLightSensor, MockPwm, RecordingOutput, ScriptedSource};
pub use sysfs::{IioVoltageSource, SysfsPwm};
