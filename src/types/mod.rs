pub mod api;
pub mod core;
pub mod events;

pub use core::*;
pub use events::{CandleEvent, EngineChannels, IngestChannels, LoggingChannels, SignalEvent, SkipEvent};
