// Break-of-structure (continuation) and change-of-character (reversal)
// detection against the most recent swing extremes.

use crate::types::{Candle, PatternDirection, StructureEvent, StructureEventKind, TrendDirection};

fn last_values(candles: &[Candle], indices: &[usize], k: usize, high: bool) -> Vec<f64> {
    let skip = indices.len().saturating_sub(k);
    indices[skip..]
        .iter()
        .filter(|&&i| i < candles.len())
        .map(|&i| if high { candles[i].high } else { candles[i].low })
        .collect()
}

fn prior_values(candles: &[Candle], indices: &[usize], k: usize, high: bool) -> Vec<f64> {
    let end = indices.len().saturating_sub(k);
    let start = end.saturating_sub(k);
    indices[start..end]
        .iter()
        .filter(|&&i| i < candles.len())
        .map(|&i| if high { candles[i].high } else { candles[i].low })
        .collect()
}

fn max_of(values: &[f64]) -> Option<f64> {
    values.iter().cloned().fold(None, |acc, v| match acc {
        Some(m) if m >= v => Some(m),
        _ => Some(v),
    })
}

fn min_of(values: &[f64]) -> Option<f64> {
    values.iter().cloned().fold(None, |acc, v| match acc {
        Some(m) if m <= v => Some(m),
        _ => Some(v),
    })
}

/// Trend continuation: the close takes out the recent swing extreme, and
/// that extreme itself improved on the prior one.
pub fn detect_bos(
    candles: &[Candle],
    pivot_highs: &[usize],
    pivot_lows: &[usize],
    lookback: usize,
) -> Option<StructureEvent> {
    let close = candles.last()?.close;

    let recent_highs = last_values(candles, pivot_highs, lookback, true);
    if let Some(recent_max) = max_of(&recent_highs) {
        let prior_max = max_of(&prior_values(candles, pivot_highs, lookback, true));
        if close > recent_max && prior_max.map_or(true, |p| recent_max > p) {
            return Some(StructureEvent {
                kind: StructureEventKind::Bos,
                direction: PatternDirection::Bullish,
                level: recent_max,
            });
        }
    }

    let recent_lows = last_values(candles, pivot_lows, lookback, false);
    if let Some(recent_min) = min_of(&recent_lows) {
        let prior_min = min_of(&prior_values(candles, pivot_lows, lookback, false));
        if close < recent_min && prior_min.map_or(true, |p| recent_min < p) {
            return Some(StructureEvent {
                kind: StructureEventKind::Bos,
                direction: PatternDirection::Bearish,
                level: recent_min,
            });
        }
    }

    None
}

/// Trend reversal: in an uptrend the close loses the recent swing lows; in
/// a downtrend it reclaims the recent swing highs.
pub fn detect_choch(
    candles: &[Candle],
    pivot_highs: &[usize],
    pivot_lows: &[usize],
    current_trend: TrendDirection,
    lookback: usize,
) -> Option<StructureEvent> {
    let close = candles.last()?.close;

    match current_trend {
        TrendDirection::Up => {
            let recent_lows = last_values(candles, pivot_lows, lookback, false);
            let floor = min_of(&recent_lows)?;
            if close < floor {
                return Some(StructureEvent {
                    kind: StructureEventKind::Choch,
                    direction: PatternDirection::Bearish,
                    level: floor,
                });
            }
        }
        TrendDirection::Down => {
            let recent_highs = last_values(candles, pivot_highs, lookback, true);
            let ceiling = max_of(&recent_highs)?;
            if close > ceiling {
                return Some(StructureEvent {
                    kind: StructureEventKind::Choch,
                    direction: PatternDirection::Bullish,
                    level: ceiling,
                });
            }
        }
        TrendDirection::Neutral => {}
    }
    None
}

/// CHoCH outranks BOS when both trigger on the same candle.
pub fn detect_structure_events(
    candles: &[Candle],
    pivot_highs: &[usize],
    pivot_lows: &[usize],
    current_trend: TrendDirection,
    lookback: usize,
) -> Option<StructureEvent> {
    detect_choch(candles, pivot_highs, pivot_lows, current_trend, lookback)
        .or_else(|| detect_bos(candles, pivot_highs, pivot_lows, lookback))
}
