// Per-(symbol, timeframe) candle series: a capped ring of closed candles
// plus at most one forming candle. The engine/ingestion pair is the only
// writer; all reads return owned snapshots.

use crate::types::{Candle, Timeframe};
use log::warn;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Closed-candle retention per series. Internal constant; analysis lookbacks
/// are all far below it.
const RETENTION: usize = 1000;

#[derive(Default)]
struct CandleSeries {
    closed: VecDeque<Candle>,
    forming: Option<Candle>,
}

#[derive(Clone, Default)]
pub struct CandleStore {
    series: Arc<RwLock<HashMap<(String, Timeframe), CandleSeries>>>,
}

impl CandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a series from backfill. Input must be ascending by open_time;
    /// invalid or out-of-order candles are dropped with a warning.
    pub async fn init(&self, symbol: &str, tf: Timeframe, initial: Vec<Candle>) {
        let mut series = CandleSeries::default();
        for candle in initial {
            if !candle.is_valid() {
                warn!("STORE: dropping invalid backfill candle for {symbol} {tf}");
                continue;
            }
            match series.closed.back() {
                Some(tail) if candle.open_time <= tail.open_time => {
                    warn!(
                        "STORE: dropping out-of-order backfill candle for {symbol} {tf} at {}",
                        candle.open_time
                    );
                }
                _ => series.closed.push_back(Candle {
                    is_closed: true,
                    ..candle
                }),
            }
        }
        while series.closed.len() > RETENTION {
            series.closed.pop_front();
        }
        let mut map = self.series.write().await;
        map.insert((symbol.to_string(), tf), series);
    }

    /// Upsert a closed candle: replace the tail when open_time matches,
    /// append when newer, ignore when older. Clears the forming slot when
    /// the update is final. Returns false when the candle was rejected.
    pub async fn upsert_closed(&self, symbol: &str, tf: Timeframe, candle: Candle) -> bool {
        if !candle.is_valid() {
            warn!("STORE: rejecting invalid candle for {symbol} {tf}");
            return false;
        }
        let mut map = self.series.write().await;
        let series = map.entry((symbol.to_string(), tf)).or_default();
        let candle = Candle {
            is_closed: true,
            ..candle
        };

        match series.closed.back() {
            Some(tail) if tail.open_time == candle.open_time => {
                *series.closed.back_mut().unwrap() = candle;
            }
            Some(tail) if candle.open_time < tail.open_time => {
                warn!(
                    "STORE: ignoring stale candle for {symbol} {tf} at {}",
                    candle.open_time
                );
                return false;
            }
            _ => {
                series.closed.push_back(candle);
                while series.closed.len() > RETENTION {
                    series.closed.pop_front();
                }
            }
        }
        series.forming = None;
        true
    }

    /// Replace the single forming candle. A forming update older than the
    /// last closed candle is ignored.
    pub async fn set_forming(&self, symbol: &str, tf: Timeframe, candle: Candle) -> bool {
        if !candle.is_valid() {
            warn!("STORE: rejecting invalid forming candle for {symbol} {tf}");
            return false;
        }
        let mut map = self.series.write().await;
        let series = map.entry((symbol.to_string(), tf)).or_default();
        if let Some(tail) = series.closed.back() {
            if candle.open_time <= tail.open_time {
                return false;
            }
        }
        series.forming = Some(Candle {
            is_closed: false,
            ..candle
        });
        true
    }

    /// Snapshot of closed candles, ascending by open_time.
    pub async fn closed(&self, symbol: &str, tf: Timeframe) -> Vec<Candle> {
        let map = self.series.read().await;
        map.get(&(symbol.to_string(), tf))
            .map(|s| s.closed.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Closed candles with the forming candle appended, when present.
    pub async fn closed_with_forming(&self, symbol: &str, tf: Timeframe) -> Vec<Candle> {
        let map = self.series.read().await;
        match map.get(&(symbol.to_string(), tf)) {
            Some(s) => {
                let mut out: Vec<Candle> = s.closed.iter().cloned().collect();
                if let Some(forming) = &s.forming {
                    out.push(forming.clone());
                }
                out
            }
            None => Vec::new(),
        }
    }

    /// The most recent `n` closed candles, ascending.
    pub async fn last_n(&self, symbol: &str, tf: Timeframe, n: usize) -> Vec<Candle> {
        let map = self.series.read().await;
        map.get(&(symbol.to_string(), tf))
            .map(|s| {
                let skip = s.closed.len().saturating_sub(n);
                s.closed.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub async fn len(&self, symbol: &str, tf: Timeframe) -> usize {
        let map = self.series.read().await;
        map.get(&(symbol.to_string(), tf))
            .map(|s| s.closed.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(idx: i64, close: f64, is_closed: bool) -> Candle {
        let open_time = Utc.timestamp_opt(1_700_000_000 + idx * 3600, 0).unwrap();
        Candle {
            open_time,
            close_time: open_time + Duration::hours(1),
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 100.0,
            is_closed,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_matching_tail_and_appends_otherwise() {
        let store = CandleStore::new();
        assert!(store.upsert_closed("BTCUSDT", Timeframe::H1, candle(0, 100.0, true)).await);
        assert!(store.upsert_closed("BTCUSDT", Timeframe::H1, candle(1, 101.0, true)).await);
        // same open_time replaces the tail
        assert!(store.upsert_closed("BTCUSDT", Timeframe::H1, candle(1, 105.0, true)).await);

        let closed = store.closed("BTCUSDT", Timeframe::H1).await;
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[1].close, 105.0);
    }

    #[tokio::test]
    async fn stale_and_invalid_candles_are_rejected() {
        let store = CandleStore::new();
        store.upsert_closed("BTCUSDT", Timeframe::H1, candle(5, 100.0, true)).await;
        assert!(!store.upsert_closed("BTCUSDT", Timeframe::H1, candle(2, 90.0, true)).await);

        let mut bad = candle(6, 100.0, true);
        bad.high = bad.low - 1.0;
        assert!(!store.upsert_closed("BTCUSDT", Timeframe::H1, bad).await);

        let mut nan = candle(6, 100.0, true);
        nan.close = f64::NAN;
        assert!(!store.upsert_closed("BTCUSDT", Timeframe::H1, nan).await);

        assert_eq!(store.len("BTCUSDT", Timeframe::H1).await, 1);
    }

    #[tokio::test]
    async fn closed_candle_clears_forming_slot() {
        let store = CandleStore::new();
        store.upsert_closed("BTCUSDT", Timeframe::H1, candle(0, 100.0, true)).await;
        assert!(store.set_forming("BTCUSDT", Timeframe::H1, candle(1, 101.0, false)).await);
        assert_eq!(store.closed_with_forming("BTCUSDT", Timeframe::H1).await.len(), 2);

        store.upsert_closed("BTCUSDT", Timeframe::H1, candle(1, 102.0, true)).await;
        let with_forming = store.closed_with_forming("BTCUSDT", Timeframe::H1).await;
        assert_eq!(with_forming.len(), 2);
        assert!(with_forming.iter().all(|c| c.is_closed));
    }

    #[tokio::test]
    async fn retention_drops_from_the_head() {
        let store = CandleStore::new();
        let initial: Vec<Candle> = (0..1100).map(|i| candle(i, 100.0 + i as f64, true)).collect();
        store.init("BTCUSDT", Timeframe::H1, initial).await;

        let closed = store.closed("BTCUSDT", Timeframe::H1).await;
        assert_eq!(closed.len(), 1000);
        // oldest 100 dropped
        assert_eq!(closed[0].close, 200.0);
        assert!(closed.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }

    #[tokio::test]
    async fn last_n_returns_tail_ascending() {
        let store = CandleStore::new();
        for i in 0..10 {
            store.upsert_closed("BTCUSDT", Timeframe::H1, candle(i, 100.0 + i as f64, true)).await;
        }
        let tail = store.last_n("BTCUSDT", Timeframe::H1, 3).await;
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].close, 107.0);
        assert_eq!(tail[2].close, 109.0);
    }
}
