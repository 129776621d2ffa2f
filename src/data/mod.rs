//! Data containers shared by the sampling pipeline.
pub mod interval_buffer;

pub use interval_buffer::{IntervalBuffer, Pushed};
