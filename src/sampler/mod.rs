//! Light sampling: the shared stream model and the acquisition thread that feeds it.

pub mod engine;
pub mod state;

pub use engine::{SamplerEngine, SamplerHandle, SamplerStats, Ticker};
pub use state::{
    IntervalSnapshot, SampleStream, SharedStream, StreamSettings, StreamView, TickOutcome,
};
