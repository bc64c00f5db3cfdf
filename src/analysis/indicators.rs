// RSI (Wilder smoothing via the `ta` crate) and pivot-anchored divergence.

use ta::indicators::RelativeStrengthIndex;
use ta::Next;

use crate::types::{Candle, Divergence, DivergenceKind};

pub const RSI_PERIOD: usize = 14;

/// Rolling RSI over closes, one value per input candle. Early values are
/// still warming up; divergence only reads values at pivot indices, which
/// sit well past the warm-up in practice.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    let mut rsi = match RelativeStrengthIndex::new(period) {
        Ok(r) => r,
        Err(_) => return vec![50.0; closes.len()],
    };
    closes.iter().map(|&c| rsi.next(c)).collect()
}

/// Divergence between price and RSI at the last two pivots: a lower low in
/// price with a higher low in RSI is bullish; a higher high in price with a
/// lower high in RSI is bearish.
pub fn detect_rsi_divergence(
    candles: &[Candle],
    pivot_highs: &[usize],
    pivot_lows: &[usize],
) -> Option<Divergence> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let rsi = rsi_series(&closes, RSI_PERIOD);

    if pivot_lows.len() >= 2 {
        let prev = pivot_lows[pivot_lows.len() - 2];
        let last = pivot_lows[pivot_lows.len() - 1];
        if last < candles.len() && candles[last].low < candles[prev].low && rsi[last] > rsi[prev] {
            return Some(Divergence {
                kind: DivergenceKind::Bullish,
                price_delta: candles[last].low - candles[prev].low,
                rsi_delta: rsi[last] - rsi[prev],
            });
        }
    }

    if pivot_highs.len() >= 2 {
        let prev = pivot_highs[pivot_highs.len() - 2];
        let last = pivot_highs[pivot_highs.len() - 1];
        if last < candles.len() && candles[last].high > candles[prev].high && rsi[last] < rsi[prev]
        {
            return Some(Divergence {
                kind: DivergenceKind::Bearish,
                price_delta: candles[last].high - candles[prev].high,
                rsi_delta: rsi[last] - rsi[prev],
            });
        }
    }

    None
}
