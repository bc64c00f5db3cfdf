// Synthetic market builders shared by the integration tests.
#![allow(dead_code)]
//
// Pivot detection uses strict extremes, so the flat filler alternates two
// values: every candidate has an equal neighbour inside its window and the
// filler contributes no pivots at all. Swings are 5-candle hills/valleys
// whose centers become the only pivots (window 2).

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

use signal_bot::config::{AnalysisCfg, Config, GateCfg, IngestCfg, NotifyCfg, SignalMode, StageCfg};
use signal_bot::engine::SignalEngine;
use signal_bot::notify::{LogSink, Sink};
use signal_bot::storage::SignalStorage;
use signal_bot::store::CandleStore;
use signal_bot::types::{Candle, SignalEvent, SkipEvent, Timeframe};

pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

pub fn candle_at(i: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    let open_time = base_time() + Duration::hours(i as i64);
    Candle {
        open_time,
        close_time: open_time + Duration::hours(1),
        open,
        high,
        low,
        close,
        volume,
        is_closed: true,
    }
}

/// `n` candles around `price` with alternating tie extremes; produces no
/// pivots under strict comparison.
pub fn flat_base(start: usize, n: usize, price: f64, volume: f64) -> Vec<Candle> {
    (0..n)
        .map(|k| {
            let i = start + k;
            let (high, low) = if i % 2 == 0 {
                (price + 0.5, price - 0.5)
            } else {
                (price + 0.45, price - 0.55)
            };
            candle_at(i, price - 0.05, high, low, price + 0.05, volume)
        })
        .collect()
}

/// 5-candle hill peaking at `peak`: the center candle is a pivot high for
/// window 2. `step` controls the slope.
pub fn hill(start: usize, peak: f64, step: f64, volume: f64) -> Vec<Candle> {
    let offsets = [2.0, 1.0, 0.0, 1.0, 2.0];
    offsets
        .iter()
        .enumerate()
        .map(|(k, &o)| {
            let px = peak - o * step;
            candle_at(start + k, px - 0.1, px, px - 0.8, px - 0.1, volume)
        })
        .collect()
}

/// 5-candle valley bottoming at `trough`: the center candle is a pivot low
/// for window 2.
pub fn valley(start: usize, trough: f64, step: f64, volume: f64) -> Vec<Candle> {
    let offsets = [2.0, 1.0, 0.0, 1.0, 2.0];
    offsets
        .iter()
        .enumerate()
        .map(|(k, &o)| {
            let px = trough + o * step;
            candle_at(start + k, px + 0.1, px + 0.8, px, px + 0.1, volume)
        })
        .collect()
}

/// Alternating peak/trough swing series: each level becomes one 5-candle
/// swing, peaks at even indices.
pub fn zigzag(levels: &[f64]) -> Vec<Candle> {
    zigzag_at(0, levels)
}

pub fn zigzag_at(start: usize, levels: &[f64]) -> Vec<Candle> {
    let mut candles = Vec::new();
    let mut i = start;
    for (seg, &level) in levels.iter().enumerate() {
        let is_peak = seg % 2 == 0;
        for step in 0..5 {
            let dist = 2.0 - (step as i64 - 2).abs() as f64; // 0,1,2,1,0
            let px = if is_peak {
                level - (2.0 - dist)
            } else {
                level + (2.0 - dist)
            };
            candles.push(candle_at(i, px, px + 0.4, px - 0.4, px, 100.0));
            i += 1;
        }
    }
    candles
}

pub fn test_config() -> Config {
    Config {
        symbols: vec!["BTCUSDT".into()],
        timeframes: vec![Timeframe::D1, Timeframe::H4, Timeframe::H1],
        entry_timeframes: vec![Timeframe::H1],
        htf_timeframes: vec![Timeframe::D1, Timeframe::H4],
        mode: SignalMode::Pro,
        stages: StageCfg {
            setup_enabled: true,
            entry_enabled: true,
        },
        gates: GateCfg {
            min_signal_score: 55.0,
            setup_score_threshold: 0.0,
            entry_score_threshold: 0.0,
            cooldown_minutes: 240,
            min_zones_required: 2,
            min_rr: 1.4,
            require_volume_confirmation: false,
            volume_spike_threshold: 1.5,
        },
        analysis: AnalysisCfg {
            pivot_window: 2,
            zone_lookback: 200,
            zone_tolerance_pct: 0.5,
            zone_sl_buffer_pct: 0.25,
            atr_period: 14,
            sweep_lookback: 10,
            structure_lookback: 3,
            anti_chase_max_atr: 2.0,
            anti_chase_max_pct: 1.5,
            rsi_divergence_bonus: 10.0,
            htf_weight_1d: 0.6,
            htf_weight_4h: 0.4,
        },
        ingest: IngestCfg {
            rest_base_url: String::new(),
            ws_base_url: String::new(),
            backfill_limit: 500,
            intrabar_enabled: false,
            ping_interval_secs: 180,
        },
        notify: NotifyCfg {
            dry_run: true,
            telegram_bot_token: None,
            telegram_chat_id: None,
        },
        database_path: ":memory:".into(),
    }
}

pub struct Harness {
    pub engine: SignalEngine,
    pub store: CandleStore,
    pub storage: Arc<SignalStorage>,
    pub signal_rx: broadcast::Receiver<SignalEvent>,
    pub skip_rx: broadcast::Receiver<SkipEvent>,
}

/// Engine wired to a dry-run sink and an in-memory store.
pub fn harness(config: Config) -> Harness {
    let store = CandleStore::new();
    let storage = Arc::new(SignalStorage::open(":memory:").unwrap());
    let (signal_tx, signal_rx) = broadcast::channel(64);
    let (skip_tx, skip_rx) = broadcast::channel(256);
    let engine = SignalEngine::new(
        Arc::new(config),
        store.clone(),
        storage.clone(),
        Sink::Log(LogSink),
        signal_tx,
        skip_tx,
    );
    Harness {
        engine,
        store,
        storage,
        signal_rx,
        skip_rx,
    }
}

/// Ascending-structure swing series for bullish HTF seeding.
pub fn bullish_htf_series() -> Vec<Candle> {
    zigzag(&[44_000.0, 42_000.0, 45_000.0, 43_000.0, 46_000.0, 44_000.0])
}

/// Descending-structure swing series for bearish HTF seeding.
pub fn bearish_htf_series() -> Vec<Candle> {
    zigzag(&[104.0, 101.0, 103.0, 100.0, 102.0, 99.0])
}
