// Per-timeframe trend classification from swing sequences, and the weighted
// higher-timeframe bias the entry gate checks against.

use std::collections::HashMap;

use crate::analysis::pivots::{recent_pivot_highs, recent_pivot_lows};
use crate::config::AnalysisCfg;
use crate::types::{BiasDirection, Candle, HtfAlignment, HtfBias, Side, Timeframe, TrendDirection};

/// Classify trend from the last 3 pivot highs and 3 pivot lows: both
/// strictly ascending is up, both strictly descending is down, anything
/// else (including fewer than 3 swings per side) is neutral.
pub fn analyze_market_structure(candles: &[Candle], window: usize) -> TrendDirection {
    let highs = recent_pivot_highs(candles, window, 3);
    let lows = recent_pivot_lows(candles, window, 3);
    if highs.len() < 3 || lows.len() < 3 {
        return TrendDirection::Neutral;
    }

    let high_vals: Vec<f64> = highs.iter().map(|&i| candles[i].high).collect();
    let low_vals: Vec<f64> = lows.iter().map(|&i| candles[i].low).collect();

    let ascending = |vals: &[f64]| vals.windows(2).all(|w| w[1] > w[0]);
    let descending = |vals: &[f64]| vals.windows(2).all(|w| w[1] < w[0]);

    if ascending(&high_vals) && ascending(&low_vals) {
        TrendDirection::Up
    } else if descending(&high_vals) && descending(&low_vals) {
        TrendDirection::Down
    } else {
        TrendDirection::Neutral
    }
}

/// Weighted aggregate of higher-timeframe structures. The signed weighted
/// sum decides the direction (>= +0.5 bullish, <= -0.5 bearish); the stored
/// score is its magnitude in [0, 1]. Alignment requires every present
/// timeframe to agree.
pub fn determine_htf_bias(
    structures: HashMap<Timeframe, TrendDirection>,
    cfg: &AnalysisCfg,
) -> HtfBias {
    // deterministic summation order so identical snapshots score identically
    let mut entries: Vec<(&Timeframe, &TrendDirection)> = structures.iter().collect();
    entries.sort_by_key(|(tf, _)| **tf);
    let mut weighted = 0.0;
    for (tf, structure) in entries {
        weighted += cfg.htf_weight(*tf) * structure.sign();
    }

    let bias = if weighted >= 0.5 {
        BiasDirection::Bullish
    } else if weighted <= -0.5 {
        BiasDirection::Bearish
    } else {
        BiasDirection::Neutral
    };

    let alignment = !structures.is_empty()
        && structures
            .values()
            .all(|s| *s == *structures.values().next().unwrap());

    HtfBias {
        bias,
        alignment,
        structures,
        score: weighted.abs().min(1.0),
    }
}

/// Does `side` trade with the higher-timeframe bias?
pub fn check_htf_alignment(side: Side, bias: &HtfBias) -> HtfAlignment {
    let aligned = matches!(
        (side, bias.bias),
        (Side::Long, BiasDirection::Bullish) | (Side::Short, BiasDirection::Bearish)
    );
    HtfAlignment {
        aligned,
        score: bias.score.clamp(0.0, 1.0),
    }
}
