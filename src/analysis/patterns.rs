// Candlestick pattern recognition. Detectors are plain functions returning
// Option<PatternMatch>, tried in priority order: 3-bar formations first,
// then 2-bar, then single-candle shapes.

use crate::types::{
    Candle, CandleStrength, PatternDirection, PatternMatch, Rejection, RejectionKind,
    TrendDirection,
};

const DOJI_BODY_MAX: f64 = 0.05;
const PIN_BODY_MAX: f64 = 0.30;
const PIN_WICK_MIN: f64 = 0.60;
const PIN_OPPOSITE_WICK_MAX: f64 = 0.20;
const TWEEZER_TOLERANCE: f64 = 0.002;
const STAR_BODY_MAX: f64 = 0.30;
const LARGE_BODY_MIN: f64 = 0.60;

/// First match in priority order over the tail of `candles`:
/// star formations, 2-bar reversal, tweezers, engulfing, inside bar,
/// pin bar, doji.
pub fn detect_reversal_pattern(candles: &[Candle]) -> Option<PatternMatch> {
    let n = candles.len();
    if n == 0 {
        return None;
    }
    let current = &candles[n - 1];
    let prev = if n >= 2 { Some(&candles[n - 2]) } else { None };
    let before = if n >= 3 { Some(&candles[n - 3]) } else { None };

    if let (Some(first), Some(star)) = (before, prev) {
        if let Some(m) = detect_star(first, star, current) {
            return Some(m);
        }
    }
    if let Some(prev) = prev {
        if let Some(m) = detect_two_bar_reversal(prev, current) {
            return Some(m);
        }
        if let Some(m) = detect_tweezer(prev, current) {
            return Some(m);
        }
        if let Some(m) = detect_engulfing(prev, current) {
            return Some(m);
        }
        if let Some(m) = detect_inside_bar(prev, current) {
            return Some(m);
        }
    }
    if let Some(m) = detect_pin_bar(current) {
        return Some(m);
    }
    detect_doji(current)
}

/// Morning / evening star: large directional candle, small-body star,
/// opposite-direction confirmation closing past the midpoint of the first
/// candle's body.
pub fn detect_star(first: &Candle, star: &Candle, confirm: &Candle) -> Option<PatternMatch> {
    let first_range = first.range();
    let star_range = star.range();
    if first_range <= 0.0 || star_range <= 0.0 || confirm.range() <= 0.0 {
        return None;
    }
    if first.body() / first_range < LARGE_BODY_MIN {
        return None;
    }
    if star.body() / star_range >= STAR_BODY_MAX {
        return None;
    }
    let midpoint = (first.open + first.close) / 2.0;

    if first.is_bearish() && confirm.is_bullish() && confirm.close > midpoint {
        return Some(PatternMatch::new("Morning Star", PatternDirection::Bullish, 0.9));
    }
    if first.is_bullish() && confirm.is_bearish() && confirm.close < midpoint {
        return Some(PatternMatch::new("Evening Star", PatternDirection::Bearish, 0.9));
    }
    None
}

/// New extreme followed by a strong close past the previous candle's
/// opposite extreme.
pub fn detect_two_bar_reversal(prev: &Candle, current: &Candle) -> Option<PatternMatch> {
    if current.low < prev.low && current.close > prev.high {
        return Some(PatternMatch::new(
            "Two-Bar Bullish Reversal",
            PatternDirection::Bullish,
            0.85,
        ));
    }
    if current.high > prev.high && current.close < prev.low {
        return Some(PatternMatch::new(
            "Two-Bar Bearish Reversal",
            PatternDirection::Bearish,
            0.85,
        ));
    }
    None
}

/// Equal extremes within 0.2% on opposite-coloured candles.
pub fn detect_tweezer(prev: &Candle, current: &Candle) -> Option<PatternMatch> {
    if prev.high <= 0.0 || prev.low <= 0.0 {
        return None;
    }
    let high_match = (current.high - prev.high).abs() / prev.high < TWEEZER_TOLERANCE;
    let low_match = (current.low - prev.low).abs() / prev.low < TWEEZER_TOLERANCE;

    if high_match && prev.is_bullish() && current.is_bearish() {
        return Some(PatternMatch::new("Tweezer Top", PatternDirection::Bearish, 0.7));
    }
    if low_match && prev.is_bearish() && current.is_bullish() {
        return Some(PatternMatch::new("Tweezer Bottom", PatternDirection::Bullish, 0.7));
    }
    None
}

/// Opposite-coloured candle whose body engulfs and exceeds the previous body.
pub fn detect_engulfing(prev: &Candle, current: &Candle) -> Option<PatternMatch> {
    if current.body() <= prev.body() || prev.body() <= 0.0 {
        return None;
    }
    let engulfs = current.open.min(current.close) <= prev.open.min(prev.close)
        && current.open.max(current.close) >= prev.open.max(prev.close);
    if !engulfs {
        return None;
    }
    let strength = (0.6 + 0.2 * (current.body() / prev.body() - 1.0)).min(0.9);

    if prev.is_bearish() && current.is_bullish() {
        return Some(PatternMatch::new("Bullish Engulfing", PatternDirection::Bullish, strength));
    }
    if prev.is_bullish() && current.is_bearish() {
        return Some(PatternMatch::new("Bearish Engulfing", PatternDirection::Bearish, strength));
    }
    None
}

/// Current range strictly inside the previous range. Directionless on its
/// own; contributes through pattern scoring only.
pub fn detect_inside_bar(prev: &Candle, current: &Candle) -> Option<PatternMatch> {
    if current.high < prev.high && current.low > prev.low {
        return Some(PatternMatch::new("Inside Bar", PatternDirection::Neutral, 0.4));
    }
    None
}

/// Hammer / shooting star: small body, one dominant wick.
pub fn detect_pin_bar(candle: &Candle) -> Option<PatternMatch> {
    let range = candle.range();
    if range <= 0.0 {
        return None;
    }
    let body_pct = candle.body() / range;
    let upper_pct = candle.upper_wick() / range;
    let lower_pct = candle.lower_wick() / range;
    if body_pct >= PIN_BODY_MAX {
        return None;
    }

    if lower_pct > PIN_WICK_MIN && upper_pct < PIN_OPPOSITE_WICK_MAX {
        let strength = (0.55 + lower_pct * 0.4).min(0.9);
        return Some(PatternMatch::new("Hammer", PatternDirection::Bullish, strength));
    }
    if upper_pct > PIN_WICK_MIN && lower_pct < PIN_OPPOSITE_WICK_MAX {
        let strength = (0.55 + upper_pct * 0.4).min(0.9);
        return Some(PatternMatch::new("Shooting Star", PatternDirection::Bearish, strength));
    }
    None
}

/// Body under 5% of range. Neutral: a doji alone never triggers a
/// directional setup.
pub fn detect_doji(candle: &Candle) -> Option<PatternMatch> {
    let range = candle.range();
    if range <= 0.0 {
        return None;
    }
    if candle.body() / range < DOJI_BODY_MAX {
        return Some(PatternMatch::new("Doji", PatternDirection::Neutral, 0.3));
    }
    None
}

/// Per-candle anatomy: body share, close location, wick shares, and a
/// rejection flag when one wick dominates half the range.
pub fn candle_strength(candle: &Candle) -> CandleStrength {
    let range = candle.range();
    if range <= 0.0 {
        return CandleStrength {
            body_percent: 0.0,
            close_location: 0.5,
            upper_wick_percent: 0.0,
            lower_wick_percent: 0.0,
            rejection: None,
            direction: TrendDirection::Neutral,
        };
    }

    let body_percent = candle.body() / range;
    let close_location = (candle.close - candle.low) / range;
    let upper_wick_percent = candle.upper_wick() / range;
    let lower_wick_percent = candle.lower_wick() / range;

    let rejection = if lower_wick_percent > 0.5 {
        Some(Rejection {
            kind: RejectionKind::Downside,
            strength: lower_wick_percent.min(1.0),
        })
    } else if upper_wick_percent > 0.5 {
        Some(Rejection {
            kind: RejectionKind::Upside,
            strength: upper_wick_percent.min(1.0),
        })
    } else {
        None
    };

    let direction = if candle.is_bullish() {
        TrendDirection::Up
    } else if candle.is_bearish() {
        TrendDirection::Down
    } else {
        TrendDirection::Neutral
    };

    CandleStrength {
        body_percent,
        close_location,
        upper_wick_percent,
        lower_wick_percent,
        rejection,
        direction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        let open_time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Candle {
            open_time,
            close_time: open_time + Duration::hours(1),
            open,
            high,
            low,
            close,
            volume: 1.0,
            is_closed: true,
        }
    }

    #[test]
    fn hammer_and_shooting_star() {
        // range 10, body 1 (10%), lower wick 8 (80%), upper wick 1 (10%)
        let hammer = bar(99.0, 100.0, 90.0, 99.9);
        assert!(hammer.lower_wick() > 7.0);
        let m = detect_pin_bar(&hammer).unwrap();
        assert_eq!(m.name, "Hammer");
        assert_eq!(m.direction, PatternDirection::Bullish);

        let star = bar(91.0, 100.0, 90.0, 90.1);
        let m = detect_pin_bar(&star).unwrap();
        assert_eq!(m.name, "Shooting Star");
        assert_eq!(m.direction, PatternDirection::Bearish);
    }

    #[test]
    fn doji_is_neutral() {
        let doji = bar(100.0, 101.0, 99.0, 100.05);
        let m = detect_doji(&doji).unwrap();
        assert_eq!(m.direction, PatternDirection::Neutral);
    }

    #[test]
    fn engulfing_requires_opposite_colours_and_larger_body() {
        let prev = bar(100.0, 101.0, 98.5, 99.0); // bearish, body 1
        let current = bar(98.8, 102.5, 98.4, 101.5); // bullish, engulfs
        let m = detect_engulfing(&prev, &current).unwrap();
        assert_eq!(m.name, "Bullish Engulfing");

        let same_colour = bar(99.1, 102.5, 98.4, 101.5);
        assert!(detect_engulfing(&current, &same_colour).is_none());
    }

    #[test]
    fn tweezer_bottom_on_equal_lows() {
        let prev = bar(101.0, 101.5, 99.0, 99.5); // bearish onto the low
        let current = bar(99.5, 101.2, 99.01, 100.9); // bullish off the same low
        let m = detect_tweezer(&prev, &current).unwrap();
        assert_eq!(m.name, "Tweezer Bottom");
        assert_eq!(m.direction, PatternDirection::Bullish);
    }

    #[test]
    fn two_bar_reversal_needs_new_extreme_and_strong_close() {
        let prev = bar(100.0, 101.0, 99.0, 99.5);
        let current = bar(99.4, 102.0, 98.5, 101.5); // new low then close above prev high
        let m = detect_two_bar_reversal(&prev, &current).unwrap();
        assert_eq!(m.direction, PatternDirection::Bullish);

        let weak = bar(99.4, 100.5, 98.5, 100.2); // close inside prev range
        assert!(detect_two_bar_reversal(&prev, &weak).is_none());
    }

    #[test]
    fn morning_star_sequence() {
        let first = bar(105.0, 105.5, 99.5, 100.0); // large bearish
        let star = bar(99.8, 100.4, 99.2, 100.0); // small body
        let confirm = bar(100.2, 104.5, 100.0, 104.0); // closes past midpoint 102.5
        let m = detect_star(&first, &star, &confirm).unwrap();
        assert_eq!(m.name, "Morning Star");
        assert_eq!(m.direction, PatternDirection::Bullish);
    }

    #[test]
    fn priority_prefers_three_bar_over_pin() {
        let first = bar(105.0, 105.5, 99.5, 100.0);
        let star = bar(99.8, 100.4, 99.2, 100.0);
        // confirmation candle is also hammer-shaped; the star must win
        let confirm = bar(103.6, 104.0, 100.0, 103.9);
        let m = detect_reversal_pattern(&[first, star, confirm]).unwrap();
        assert_eq!(m.name, "Morning Star");
    }

    #[test]
    fn inside_bar_is_neutral_and_low_priority() {
        let prev = bar(100.0, 105.0, 95.0, 101.0);
        let inside = bar(100.5, 103.0, 98.0, 99.5);
        let m = detect_inside_bar(&prev, &inside).unwrap();
        assert_eq!(m.direction, PatternDirection::Neutral);
    }

    #[test]
    fn candle_strength_anatomy() {
        let c = bar(99.0, 100.0, 90.0, 99.9);
        let s = candle_strength(&c);
        assert!(s.body_percent < 0.1 + 1e-9);
        assert!(s.close_location > 0.95);
        let rej = s.rejection.unwrap();
        assert_eq!(rej.kind, RejectionKind::Downside);
        assert_eq!(s.direction, TrendDirection::Up);
    }

    #[test]
    fn zero_range_candle_is_degenerate() {
        let c = bar(100.0, 100.0, 100.0, 100.0);
        let s = candle_strength(&c);
        assert_eq!(s.direction, TrendDirection::Neutral);
        assert!(s.rejection.is_none());
        assert_eq!(s.body_percent, 0.0);
    }
}
