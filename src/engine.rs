// ENGINE: turns closed-candle events into at-most-one signal per setup
// instance. Analysis runs synchronously after the triggering store write,
// so every gate sees the same snapshot.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::analysis::chase::evaluate_chase_risk;
use crate::analysis::events::detect_structure_events;
use crate::analysis::indicators::detect_rsi_divergence;
use crate::analysis::levels::calculate_levels;
use crate::analysis::liquidity::detect_sweep;
use crate::analysis::patterns::candle_strength;
use crate::analysis::pivots::{pivot_highs, pivot_lows};
use crate::analysis::regime::detect_market_regime;
use crate::analysis::scoring::calculate_score;
use crate::analysis::setups::{detect_setup, volume_ratio, SetupDetection};
use crate::analysis::structure::{analyze_market_structure, check_htf_alignment, determine_htf_bias};
use crate::config::Config;
use crate::notify::Sink;
use crate::store::CandleStore;
use crate::storage::SignalStorage;
use crate::types::{
    Candle, CandleEvent, ChaseDecision, EngineChannels, HtfBias, Setup, Signal, SignalEvent,
    SignalStage, SkipEvent, SkipReason, Timeframe, TrendDirection,
};

/// Closed candles required before any evaluation.
const MIN_CANDLES: usize = 100;

/// Minimum gap between forming-candle evaluations per (symbol, timeframe).
const INTRABAR_MIN_INTERVAL_SECS: i64 = 10;

/// Candles required before a timeframe contributes to HTF bias.
const MIN_STRUCTURE_CANDLES: usize = 30;

pub struct SignalEngine {
    config: Arc<Config>,
    store: CandleStore,
    storage: Arc<SignalStorage>,
    sink: Sink,
    signal_tx: broadcast::Sender<SignalEvent>,
    skip_tx: broadcast::Sender<SkipEvent>,
    /// In-flight SETUP alerts keyed symbol|tf|side|zoneKey -> expiry.
    setup_dedup: HashMap<String, DateTime<Utc>>,
    /// Last forming-candle evaluation per symbol|tf.
    last_intrabar: HashMap<String, DateTime<Utc>>,
}

impl SignalEngine {
    pub fn new(
        config: Arc<Config>,
        store: CandleStore,
        storage: Arc<SignalStorage>,
        sink: Sink,
        signal_tx: broadcast::Sender<SignalEvent>,
        skip_tx: broadcast::Sender<SkipEvent>,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            sink,
            signal_tx,
            skip_tx,
            setup_dedup: HashMap::new(),
            last_intrabar: HashMap::new(),
        }
    }

    /// Consume candle events until the channel closes. The hourly tick
    /// sweeps expired dedup entries and cooldown rows.
    pub async fn run(mut self, channels: EngineChannels) {
        let mut candle_rx = channels.candle_rx;
        let mut maintenance = tokio::time::interval(Duration::from_secs(3600));
        maintenance.tick().await; // the first tick fires immediately

        info!(
            "ENGINE: started for {} symbols, entry on {:?}",
            self.config.symbols.len(),
            self.config.entry_timeframes
        );

        loop {
            tokio::select! {
                maybe = candle_rx.recv() => match maybe {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        info!("ENGINE: candle channel closed, stopping");
                        break;
                    }
                },
                _ = maintenance.tick() => self.run_maintenance().await,
            }
        }
    }

    pub async fn handle_event(&mut self, event: CandleEvent) {
        let CandleEvent {
            symbol,
            timeframe,
            candle,
        } = event;

        if candle.is_closed {
            if !self.store.upsert_closed(&symbol, timeframe, candle).await {
                return;
            }
            if self.config.entry_timeframes.contains(&timeframe) && self.config.stages.entry_enabled
            {
                self.evaluate_closed(&symbol, timeframe).await;
            }
        } else {
            if !self.store.set_forming(&symbol, timeframe, candle).await {
                return;
            }
            if self.config.entry_timeframes.contains(&timeframe) {
                self.evaluate_forming(&symbol, timeframe).await;
            }
        }
    }

    /// The full ENTRY pipeline on a closed candle.
    pub async fn evaluate_closed(&mut self, symbol: &str, tf: Timeframe) {
        let candles = self.store.closed(symbol, tf).await;
        if candles.len() < MIN_CANDLES {
            self.skip(
                symbol,
                tf,
                SkipReason::InsufficientData,
                format!("{} of {MIN_CANDLES} candles", candles.len()),
            );
            return;
        }

        let setup = match detect_setup(&candles, &self.config) {
            SetupDetection::Setup(setup) => *setup,
            SetupDetection::NoZones { total, required } => {
                self.skip(
                    symbol,
                    tf,
                    SkipReason::NoZones,
                    format!("{total} zones, {required} required"),
                );
                return;
            }
            SetupDetection::NoSetup => {
                self.skip(symbol, tf, SkipReason::NoSetup, String::new());
                return;
            }
        };

        let window = self.config.analysis.pivot_window;
        let highs = pivot_highs(&candles, window);
        let lows = pivot_lows(&candles, window);
        let structure = analyze_market_structure(&candles, window);
        let regime = detect_market_regime(&candles, structure, self.config.analysis.atr_period);

        let htf_bias = self.htf_bias(symbol).await;
        let alignment = check_htf_alignment(setup.side, &htf_bias);
        if !alignment.aligned {
            self.skip(
                symbol,
                tf,
                SkipReason::HtfNotAligned,
                format!("{:?} vs bias {:?}", setup.side, htf_bias.bias),
            );
            return;
        }

        let structure_event = detect_structure_events(
            &candles,
            &highs,
            &lows,
            structure,
            self.config.analysis.structure_lookback,
        );
        let sweep = detect_sweep(
            &candles,
            &highs,
            &lows,
            &setup.zones,
            self.config.analysis.sweep_lookback,
        );
        let divergence = detect_rsi_divergence(&candles, &highs, &lows);
        let vol_ratio = volume_ratio(&candles);

        if self.config.gates.require_volume_confirmation
            && vol_ratio < self.config.gates.volume_spike_threshold
        {
            self.skip(
                symbol,
                tf,
                SkipReason::LowVolume,
                format!(
                    "ratio {vol_ratio:.2} below {:.2}",
                    self.config.gates.volume_spike_threshold
                ),
            );
            return;
        }

        let strength = candle_strength(candles.last().expect("non-empty candles"));
        let breakdown = calculate_score(
            &setup,
            &alignment,
            &strength,
            vol_ratio,
            divergence.as_ref(),
            self.config.analysis.rsi_divergence_bonus,
        );
        let threshold = self.config.gates.entry_threshold();
        if threshold > 0.0 && breakdown.total < threshold {
            self.skip(
                symbol,
                tf,
                SkipReason::ScoreTooLow,
                format!("{:.1} below {threshold:.1}", breakdown.total),
            );
            return;
        }

        let levels = match calculate_levels(&setup, self.config.analysis.sl_buffer()) {
            Some(levels) => levels,
            None => {
                self.skip(symbol, tf, SkipReason::InvalidLevels, String::new());
                return;
            }
        };
        if levels.risk_reward1 < self.config.gates.min_rr {
            self.skip(
                symbol,
                tf,
                SkipReason::RrTooLow,
                format!(
                    "rr {:.2} below {:.2}",
                    levels.risk_reward1, self.config.gates.min_rr
                ),
            );
            return;
        }

        let chase = evaluate_chase_risk(&candles, &setup, &self.config);
        if chase.decision == ChaseDecision::ChaseNo {
            self.skip(
                symbol,
                tf,
                SkipReason::ChaseNo,
                format!("score {:.0}: {}", chase.score, chase.reason),
            );
            return;
        }

        let zone_key = setup.zone_key();
        if self.config.gates.cooldown_minutes > 0 {
            match self
                .storage
                .is_on_cooldown(symbol, tf, setup.side, &zone_key)
                .await
            {
                Ok(true) => {
                    self.skip(symbol, tf, SkipReason::CooldownActive, zone_key);
                    return;
                }
                Ok(false) => {}
                Err(err) => error!("ENGINE: cooldown lookup failed: {err:?}"),
            }
        }

        let signal = self.build_signal(
            SignalStage::Entry,
            symbol,
            tf,
            setup,
            htf_bias,
            breakdown,
            levels,
            regime,
            structure_event,
            sweep,
            divergence,
            vol_ratio,
            Some(chase),
        );

        let delivered = self.sink.send_signal(&signal).await;
        if delivered {
            if let Err(err) = self.storage.insert_signal(&signal).await {
                error!("ENGINE: failed to persist signal {}: {err:?}", signal.id);
            }
            if self.config.gates.cooldown_minutes > 0 {
                if let Err(err) = self
                    .storage
                    .add_cooldown(
                        symbol,
                        tf,
                        signal.side,
                        &signal.setup.zone_key(),
                        self.config.gates.cooldown_minutes,
                    )
                    .await
                {
                    error!("ENGINE: failed to arm cooldown for {}: {err:?}", signal.id);
                }
            }
            info!(
                "ENGINE: ENTRY signal {} {} {} score {:.1}",
                signal.symbol,
                signal.timeframe,
                signal.side.as_str(),
                signal.score
            );
        } else {
            // sink failure: no persistence, no cooldown, so a retry can fire
            warn!(
                "ENGINE: sink rejected signal {} for {}; cooldown not armed",
                signal.id, signal.symbol
            );
        }
        let _ = self.signal_tx.send(SignalEvent { signal, delivered });
    }

    /// The throttled SETUP pipeline on a forming candle: softer thresholds,
    /// no HTF or volume gate, no cooldown write, at most one alert per
    /// forming setup instance.
    pub async fn evaluate_forming(&mut self, symbol: &str, tf: Timeframe) {
        if !self.config.stages.setup_enabled || !self.config.ingest.intrabar_enabled {
            return;
        }

        let now = Utc::now();
        let throttle_key = format!("{symbol}|{tf}");
        if let Some(last) = self.last_intrabar.get(&throttle_key) {
            if now - *last < ChronoDuration::seconds(INTRABAR_MIN_INTERVAL_SECS) {
                return;
            }
        }
        self.last_intrabar.insert(throttle_key, now);

        let candles = self.store.closed_with_forming(symbol, tf).await;
        if candles.len() < MIN_CANDLES {
            return;
        }

        let setup = match detect_setup(&candles, &self.config) {
            SetupDetection::Setup(setup) => *setup,
            _ => return,
        };

        let window = self.config.analysis.pivot_window;
        let highs = pivot_highs(&candles, window);
        let lows = pivot_lows(&candles, window);
        let structure = analyze_market_structure(&candles, window);
        let regime = detect_market_regime(&candles, structure, self.config.analysis.atr_period);
        let htf_bias = self.htf_bias(symbol).await;
        let alignment = check_htf_alignment(setup.side, &htf_bias);

        let structure_event = detect_structure_events(
            &candles,
            &highs,
            &lows,
            structure,
            self.config.analysis.structure_lookback,
        );
        let sweep = detect_sweep(
            &candles,
            &highs,
            &lows,
            &setup.zones,
            self.config.analysis.sweep_lookback,
        );
        let divergence = detect_rsi_divergence(&candles, &highs, &lows);
        let vol_ratio = volume_ratio(&candles);

        let strength = candle_strength(candles.last().expect("non-empty candles"));
        let breakdown = calculate_score(
            &setup,
            &alignment,
            &strength,
            vol_ratio,
            divergence.as_ref(),
            self.config.analysis.rsi_divergence_bonus,
        );
        let threshold = self.config.gates.setup_threshold();
        if threshold > 0.0 && breakdown.total < threshold {
            return;
        }

        let levels = match calculate_levels(&setup, self.config.analysis.sl_buffer()) {
            Some(levels) => levels,
            None => return,
        };
        if levels.risk_reward1 < self.config.gates.min_rr {
            return;
        }

        let chase = evaluate_chase_risk(&candles, &setup, &self.config);
        if chase.decision == ChaseDecision::ChaseNo {
            return;
        }

        // one SETUP alert per forming setup instance
        self.setup_dedup.retain(|_, expiry| *expiry > now);
        let dedup_key = format!("{symbol}|{tf}|{}|{}", setup.side.as_str(), setup.zone_key());
        if self.setup_dedup.contains_key(&dedup_key) {
            debug!("ENGINE: SETUP alert already in flight for {dedup_key}");
            return;
        }
        self.setup_dedup.insert(
            dedup_key,
            now + ChronoDuration::minutes(self.config.gates.cooldown_minutes),
        );

        let signal = self.build_signal(
            SignalStage::Setup,
            symbol,
            tf,
            setup,
            htf_bias,
            breakdown,
            levels,
            regime,
            structure_event,
            sweep,
            divergence,
            vol_ratio,
            Some(chase),
        );

        let delivered = self.sink.send_signal(&signal).await;
        let _ = self.signal_tx.send(SignalEvent { signal, delivered });
    }

    #[allow(clippy::too_many_arguments)]
    fn build_signal(
        &self,
        stage: SignalStage,
        symbol: &str,
        tf: Timeframe,
        setup: Setup,
        htf_bias: HtfBias,
        breakdown: crate::types::ScoreBreakdown,
        levels: crate::types::Levels,
        regime: crate::types::RegimeAssessment,
        structure_event: Option<crate::types::StructureEvent>,
        sweep: Option<crate::types::SweepEvent>,
        divergence: Option<crate::types::Divergence>,
        vol_ratio: f64,
        chase: Option<crate::types::ChaseEvaluation>,
    ) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            stage,
            symbol: symbol.to_string(),
            timeframe: tf,
            side: setup.side,
            score: breakdown.total,
            breakdown,
            setup,
            htf_bias,
            regime: Some(regime),
            structure_event,
            sweep,
            divergence,
            volume_ratio: vol_ratio,
            levels,
            chase,
            timestamp: Utc::now(),
        }
    }

    /// Aggregate structure over the configured higher timeframes. A
    /// timeframe contributes only once it has enough candles.
    async fn htf_bias(&self, symbol: &str) -> HtfBias {
        let mut structures: HashMap<Timeframe, TrendDirection> = HashMap::new();
        for tf in &self.config.htf_timeframes {
            let candles: Vec<Candle> = self.store.closed(symbol, *tf).await;
            if candles.len() >= MIN_STRUCTURE_CANDLES {
                structures.insert(
                    *tf,
                    analyze_market_structure(&candles, self.config.analysis.pivot_window),
                );
            }
        }
        determine_htf_bias(structures, &self.config.analysis)
    }

    fn skip(&self, symbol: &str, tf: Timeframe, reason: SkipReason, details: String) {
        match reason {
            SkipReason::NoSetup => {
                debug!("ENGINE: skip {symbol} {tf}: {}", reason.as_str())
            }
            _ => info!(
                "ENGINE: skip {symbol} {tf}: {} ({details})",
                reason.as_str()
            ),
        }
        let _ = self.skip_tx.send(SkipEvent {
            symbol: symbol.to_string(),
            timeframe: tf,
            reason,
            details,
            ts: Utc::now(),
        });
    }

    async fn run_maintenance(&mut self) {
        let now = Utc::now();
        self.setup_dedup.retain(|_, expiry| *expiry > now);
        self.last_intrabar
            .retain(|_, last| now - *last < ChronoDuration::hours(6));
        if let Err(err) = self.storage.cleanup_expired().await {
            error!("ENGINE: cooldown cleanup failed: {err:?}");
        }
    }
}
