// Coarse market-state classification from volatility (ATR ratio), drift
// (normalised OLS slope), and swing structure.

use crate::types::{Candle, MarketRegime, RegimeAssessment, TrendDirection};

/// Candles between the current ATR window and the historical reference
/// window used for the expansion/contraction ratio.
const ATR_SHIFT: usize = 25;

const SLOPE_PERIOD: usize = 20;

/// Simple average of the last `period` true ranges. The first candle's true
/// range falls back to high-low.
pub fn atr(candles: &[Candle], period: usize) -> f64 {
    if candles.is_empty() || period == 0 {
        return 0.0;
    }
    let start = candles.len().saturating_sub(period);
    let mut sum = 0.0;
    let mut count = 0usize;
    for i in start..candles.len() {
        let tr = if i == 0 {
            candles[i].range()
        } else {
            let prev_close = candles[i - 1].close;
            candles[i]
                .range()
                .max((candles[i].high - prev_close).abs())
                .max((candles[i].low - prev_close).abs())
        };
        sum += tr;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// OLS slope of close over the last `period` candles, normalised to percent
/// of the average close.
pub fn slope(candles: &[Candle], period: usize) -> f64 {
    let start = candles.len().saturating_sub(period);
    let window = &candles[start..];
    let n = window.len();
    if n < 2 {
        return 0.0;
    }

    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = window.iter().map(|c| c.close).sum::<f64>() / nf;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, c) in window.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (c.close - mean_y);
        den += dx * dx;
    }
    if den == 0.0 || mean_y == 0.0 {
        return 0.0;
    }
    (num / den) / mean_y * 100.0
}

/// Classification order: volatility expansion first, then directional
/// drift confirmed by structure, then quiet range, then the structure
/// fallback at reduced confidence.
pub fn detect_market_regime(
    candles: &[Candle],
    structure: TrendDirection,
    atr_period: usize,
) -> RegimeAssessment {
    let current_atr = atr(candles, atr_period);
    let historical_atr = if candles.len() > ATR_SHIFT {
        atr(&candles[..candles.len() - ATR_SHIFT], atr_period)
    } else {
        current_atr
    };
    let atr_ratio = if historical_atr > 0.0 {
        current_atr / historical_atr
    } else {
        1.0
    };
    let slope_pct = slope(candles, SLOPE_PERIOD);

    let (regime, confidence) = if atr_ratio > 1.5 {
        (MarketRegime::Expansion, (atr_ratio / 2.0).clamp(0.75, 1.0))
    } else if slope_pct.abs() > 0.3 && structure != TrendDirection::Neutral {
        let regime = if slope_pct > 0.0 {
            MarketRegime::TrendUp
        } else {
            MarketRegime::TrendDown
        };
        (regime, (0.5 + slope_pct.abs() / 2.0).clamp(0.5, 1.0))
    } else if atr_ratio < 0.8 && slope_pct.abs() < 0.2 {
        (MarketRegime::Range, 0.7)
    } else {
        // structure fallback at lower confidence
        match structure {
            TrendDirection::Up => (MarketRegime::TrendUp, 0.4),
            TrendDirection::Down => (MarketRegime::TrendDown, 0.4),
            TrendDirection::Neutral => (MarketRegime::Range, 0.3),
        }
    };

    RegimeAssessment {
        regime,
        confidence,
        atr: current_atr,
        atr_ratio,
        slope: slope_pct,
    }
}
