use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::core::{Candle, Signal, SkipReason, Timeframe};
use tokio::sync::broadcast::{Receiver as BReceiver, Sender as BSender};
use tokio::sync::mpsc::{Receiver as MReceiver, Sender as MSender};

/// A candle update delivered by the ingestion adapter. Closed and forming
/// updates share the channel; `candle.is_closed` separates them.
#[derive(Debug, Clone)]
pub struct CandleEvent {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candle: Candle,
}

/// An emitted signal, broadcast for the logging task after sink delivery.
#[derive(Debug, Clone)]
pub struct SignalEvent {
    pub signal: Signal,
    pub delivered: bool,
}

/// A structured gate-miss record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipEvent {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub reason: SkipReason,
    pub details: String,
    pub ts: DateTime<Utc>,
}

pub struct IngestChannels {
    pub candle_tx: MSender<CandleEvent>,
}

pub struct EngineChannels {
    pub candle_rx: MReceiver<CandleEvent>,
    pub signal_tx: BSender<SignalEvent>,
    pub skip_tx: BSender<SkipEvent>,
}

pub struct LoggingChannels {
    pub signal_rx: BReceiver<SignalEvent>,
    pub skip_rx: BReceiver<SkipEvent>,
}
