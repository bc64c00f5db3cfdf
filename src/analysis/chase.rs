// Anti-chase policy: scores how far price has already travelled from the
// setup origin and how stretched the move is. Higher score = riskier entry.

use crate::analysis::events::detect_structure_events;
use crate::analysis::pivots::{pivot_highs, pivot_lows};
use crate::analysis::regime::atr;
use crate::analysis::setups::volume_ratio;
use crate::analysis::structure::analyze_market_structure;
use crate::config::Config;
use crate::types::{
    Candle, ChaseDecision, ChaseEvaluation, ChaseMetrics, MomentumState, PatternDirection, Setup,
    Side, StructureEventKind,
};

const CLIMAX_RATIO: f64 = 2.5;
const CLIMAX_WINDOW: usize = 20;

pub fn evaluate_chase_risk(candles: &[Candle], setup: &Setup, cfg: &Config) -> ChaseEvaluation {
    let metrics = compute_metrics(candles, setup, cfg);
    let highs = pivot_highs(candles, cfg.analysis.pivot_window);
    let lows = pivot_lows(candles, cfg.analysis.pivot_window);
    let trend = analyze_market_structure(candles, cfg.analysis.pivot_window);
    let structure_event =
        detect_structure_events(candles, &highs, &lows, trend, cfg.analysis.structure_lookback);

    let mut score = 0.0;
    let mut reasons: Vec<String> = Vec::new();

    // extension past the setup origin
    let max_atr = cfg.analysis.anti_chase_max_atr;
    let max_pct = cfg.analysis.anti_chase_max_pct;
    if metrics.atr_move > max_atr || metrics.pct_move > max_pct {
        score += 40.0;
        reasons.push(format!(
            "extended {:.1}xATR / {:.2}%",
            metrics.atr_move, metrics.pct_move
        ));
    } else {
        let linear = (metrics.atr_move / max_atr).max(metrics.pct_move / max_pct);
        score += 40.0 * linear.clamp(0.0, 1.0);
    }

    match metrics.consecutive_trend {
        n if n >= 5 => {
            score += 20.0;
            reasons.push(format!("{n} consecutive trend candles"));
        }
        n if n >= 3 => score += 15.0,
        n if n >= 2 => score += 10.0,
        _ => {}
    }

    let body_aligned = match setup.side {
        Side::Long => candles.last().map(|c| c.is_bullish()).unwrap_or(false),
        Side::Short => candles.last().map(|c| c.is_bearish()).unwrap_or(false),
    };
    if metrics.body_to_range > 0.7 && body_aligned {
        score += 15.0;
    } else if metrics.body_to_range > 0.5 {
        score += 8.0;
    }

    if metrics.volume_climax {
        score -= 15.0;
        reasons.push("volume climax".to_string());
    } else if metrics.volume_ratio >= cfg.gates.volume_spike_threshold {
        score += 10.0;
    }

    match metrics.momentum {
        MomentumState::Slowing => {
            score -= 20.0;
            reasons.push("momentum slowdown".to_string());
        }
        MomentumState::Accelerating => score += 10.0,
        MomentumState::Steady => {}
    }

    let aligned_choch = structure_event.as_ref().is_some_and(|e| {
        e.kind == StructureEventKind::Choch
            && matches!(
                (setup.side, e.direction),
                (Side::Long, PatternDirection::Bullish) | (Side::Short, PatternDirection::Bearish)
            )
    });
    let counter_choch = structure_event.as_ref().is_some_and(|e| {
        e.kind == StructureEventKind::Choch
            && matches!(
                (setup.side, e.direction),
                (Side::Long, PatternDirection::Bearish) | (Side::Short, PatternDirection::Bullish)
            )
    });
    if aligned_choch {
        score -= 25.0;
        reasons.push("aligned CHoCH".to_string());
    }

    let decision = if score >= 50.0 {
        ChaseDecision::ChaseNo
    } else if score >= 25.0 {
        ChaseDecision::ChaseOkCaution
    } else {
        let exhaustion = metrics.volume_climax
            || (metrics.consecutive_trend >= 5 && metrics.momentum == MomentumState::Slowing)
            || counter_choch;
        if exhaustion {
            if counter_choch {
                reasons.push("counter-side CHoCH".to_string());
            }
            ChaseDecision::ReversalWatch
        } else {
            ChaseDecision::ChaseOk
        }
    };

    let reason = if reasons.is_empty() {
        format!("chase score {score:.0}")
    } else {
        reasons.join(", ")
    };

    ChaseEvaluation {
        decision,
        reason,
        score,
        metrics,
    }
}

fn compute_metrics(candles: &[Candle], setup: &Setup, cfg: &Config) -> ChaseMetrics {
    let current_atr = atr(candles, cfg.analysis.atr_period);
    let close = candles.last().map(|c| c.close).unwrap_or(0.0);
    // the setup origin is its zone when present, else the trigger price
    let origin = setup
        .zone
        .as_ref()
        .map(|z| z.center)
        .unwrap_or(setup.price);

    let distance = (close - origin).abs();
    let atr_move = if current_atr > 0.0 { distance / current_atr } else { 0.0 };
    let pct_move = if origin > 0.0 { distance / origin * 100.0 } else { 0.0 };

    let body_to_range = candles
        .last()
        .map(|c| {
            let range = c.range();
            if range > 0.0 {
                c.body() / range
            } else {
                0.0
            }
        })
        .unwrap_or(0.0);

    let ratio = volume_ratio(candles);
    let climax_start = candles.len().saturating_sub(CLIMAX_WINDOW);
    let max_recent_volume = candles[climax_start..]
        .iter()
        .map(|c| c.volume)
        .fold(0.0_f64, f64::max);
    let current_volume = candles.last().map(|c| c.volume).unwrap_or(0.0);
    let volume_climax = ratio >= CLIMAX_RATIO && current_volume >= max_recent_volume;

    let (consecutive_trend, momentum) = momentum_state(candles, setup.side);

    ChaseMetrics {
        atr: current_atr,
        atr_move,
        pct_move,
        body_to_range,
        volume_ratio: ratio,
        volume_climax,
        consecutive_trend,
        momentum,
    }
}

/// Length of the tail streak of candles coloured with the trade direction,
/// and whether their bodies are growing or shrinking.
fn momentum_state(candles: &[Candle], side: Side) -> (usize, MomentumState) {
    let matches_side = |c: &Candle| match side {
        Side::Long => c.is_bullish(),
        Side::Short => c.is_bearish(),
    };

    let mut streak = 0usize;
    for candle in candles.iter().rev() {
        if matches_side(candle) {
            streak += 1;
        } else {
            break;
        }
    }

    if streak < 2 {
        return (streak, MomentumState::Steady);
    }

    let tail = &candles[candles.len() - streak..];
    let last_body = tail[tail.len() - 1].body();
    let prev_body = tail[tail.len() - 2].body();
    let momentum = if prev_body <= 0.0 {
        MomentumState::Steady
    } else if last_body > prev_body * 1.2 {
        MomentumState::Accelerating
    } else if last_body < prev_body * 0.8 {
        MomentumState::Slowing
    } else {
        MomentumState::Steady
    };
    (streak, momentum)
}
