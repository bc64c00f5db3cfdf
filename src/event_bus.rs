use crate::types::{CandleEvent, EngineChannels, IngestChannels, LoggingChannels, SignalEvent, SkipEvent};
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

/// Star topology around the engine: ingestion publishes candle events on a
/// single mpsc channel (preserving per-key close ordering), the engine
/// broadcasts emitted signals and skip records for observers.
pub struct EventBus {
    candle_tx: mpsc::Sender<CandleEvent>,
    candle_rx: Mutex<Option<mpsc::Receiver<CandleEvent>>>,
    signal_tx: broadcast::Sender<SignalEvent>,
    skip_tx: broadcast::Sender<SkipEvent>,
}

impl EventBus {
    pub fn new(candle_buffer: usize, event_buffer: usize) -> Self {
        let (candle_tx, candle_rx) = mpsc::channel(candle_buffer);
        let (signal_tx, _) = broadcast::channel(event_buffer);
        let (skip_tx, _) = broadcast::channel(event_buffer);
        Self {
            candle_tx,
            candle_rx: Mutex::new(Some(candle_rx)),
            signal_tx,
            skip_tx,
        }
    }

    pub fn ingest_channels(&self) -> IngestChannels {
        IngestChannels {
            candle_tx: self.candle_tx.clone(),
        }
    }

    /// The engine's receiver can only be taken once; the engine is the
    /// single consumer of candle events.
    pub fn engine_channels(&self) -> EngineChannels {
        EngineChannels {
            candle_rx: self
                .candle_rx
                .lock()
                .expect("candle receiver mutex poisoned")
                .take()
                .expect("CandleEvent receiver already taken"),
            signal_tx: self.signal_tx.clone(),
            skip_tx: self.skip_tx.clone(),
        }
    }

    pub fn logging_channels(&self) -> LoggingChannels {
        LoggingChannels {
            signal_rx: self.signal_tx.subscribe(),
            skip_rx: self.skip_tx.subscribe(),
        }
    }
}
