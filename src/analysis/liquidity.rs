// Liquidity sweeps: a wick through a swing extreme or zone boundary that
// closes back on the original side, read as a stop hunt.

use crate::types::{Candle, PatternDirection, SweepEvent, SweepSource, ZoneSet};

/// Check the current candle against recent swing extremes and zone
/// boundaries, newest reference first.
pub fn detect_sweep(
    candles: &[Candle],
    pivot_highs: &[usize],
    pivot_lows: &[usize],
    zones: &ZoneSet,
    lookback: usize,
) -> Option<SweepEvent> {
    let current = candles.last()?;
    let range = current.range();
    if range <= 0.0 {
        return None;
    }

    // bullish: wick under the reference, close back above it
    let bullish_strength = (current.close - current.low) / range;
    let low_refs = swing_refs(candles, pivot_lows, lookback, false);
    for reference in low_refs {
        if current.low < reference && current.close > reference {
            return Some(SweepEvent {
                direction: PatternDirection::Bullish,
                source: SweepSource::SwingLow,
                reference,
                strength: bullish_strength,
            });
        }
    }
    for zone in newest_first(&zones.support, lookback) {
        if current.low < zone.lower && current.close > zone.lower {
            return Some(SweepEvent {
                direction: PatternDirection::Bullish,
                source: SweepSource::ZoneBoundary,
                reference: zone.lower,
                strength: bullish_strength,
            });
        }
    }

    // bearish: wick over the reference, close back below it
    let bearish_strength = (current.high - current.close) / range;
    let high_refs = swing_refs(candles, pivot_highs, lookback, true);
    for reference in high_refs {
        if current.high > reference && current.close < reference {
            return Some(SweepEvent {
                direction: PatternDirection::Bearish,
                source: SweepSource::SwingHigh,
                reference,
                strength: bearish_strength,
            });
        }
    }
    for zone in newest_first(&zones.resistance, lookback) {
        if current.high > zone.upper && current.close < zone.upper {
            return Some(SweepEvent {
                direction: PatternDirection::Bearish,
                source: SweepSource::ZoneBoundary,
                reference: zone.upper,
                strength: bearish_strength,
            });
        }
    }

    None
}

/// Swing reference levels, newest first, excluding the current candle.
fn swing_refs(candles: &[Candle], pivots: &[usize], lookback: usize, high: bool) -> Vec<f64> {
    let last_index = candles.len() - 1;
    pivots
        .iter()
        .rev()
        .filter(|&&i| i < last_index)
        .take(lookback)
        .map(|&i| if high { candles[i].high } else { candles[i].low })
        .collect()
}

fn newest_first(zones: &[crate::types::Zone], lookback: usize) -> Vec<&crate::types::Zone> {
    let mut sorted: Vec<&crate::types::Zone> = zones.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted.truncate(lookback);
    sorted
}
