// Swing detection: a pivot is a strict local extreme over a symmetric window.

use crate::types::Candle;

/// Indices i in [w, n-w-1] whose high is the strict maximum over [i-w, i+w].
/// Ties reject the candidate.
pub fn pivot_highs(candles: &[Candle], window: usize) -> Vec<usize> {
    let n = candles.len();
    if window == 0 || n < 2 * window + 1 {
        return Vec::new();
    }
    let mut out = Vec::new();
    for i in window..n - window {
        let h = candles[i].high;
        let is_pivot = (i - window..=i + window)
            .filter(|&j| j != i)
            .all(|j| candles[j].high < h);
        if is_pivot {
            out.push(i);
        }
    }
    out
}

/// Symmetric to [`pivot_highs`] on lows.
pub fn pivot_lows(candles: &[Candle], window: usize) -> Vec<usize> {
    let n = candles.len();
    if window == 0 || n < 2 * window + 1 {
        return Vec::new();
    }
    let mut out = Vec::new();
    for i in window..n - window {
        let l = candles[i].low;
        let is_pivot = (i - window..=i + window)
            .filter(|&j| j != i)
            .all(|j| candles[j].low > l);
        if is_pivot {
            out.push(i);
        }
    }
    out
}

/// The most recent `k` pivot-high indices, ascending.
pub fn recent_pivot_highs(candles: &[Candle], window: usize, k: usize) -> Vec<usize> {
    let all = pivot_highs(candles, window);
    let skip = all.len().saturating_sub(k);
    all[skip..].to_vec()
}

/// The most recent `k` pivot-low indices, ascending.
pub fn recent_pivot_lows(candles: &[Candle], window: usize, k: usize) -> Vec<usize> {
    let all = pivot_lows(candles, window);
    let skip = all.len().saturating_sub(k);
    all[skip..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles_from_highs_lows(points: &[(f64, f64)]) -> Vec<Candle> {
        points
            .iter()
            .enumerate()
            .map(|(i, &(high, low))| {
                let open_time = Utc.timestamp_opt(1_700_000_000 + i as i64 * 3600, 0).unwrap();
                Candle {
                    open_time,
                    close_time: open_time + Duration::hours(1),
                    open: (high + low) / 2.0,
                    high,
                    low,
                    close: (high + low) / 2.0,
                    volume: 1.0,
                    is_closed: true,
                }
            })
            .collect()
    }

    #[test]
    fn finds_strict_local_extremes() {
        // highs peak at index 3, lows trough at index 3
        let candles = candles_from_highs_lows(&[
            (10.0, 9.0),
            (11.0, 9.5),
            (12.0, 10.0),
            (15.0, 8.0),
            (12.5, 10.0),
            (11.5, 9.5),
            (10.5, 9.0),
        ]);
        assert_eq!(pivot_highs(&candles, 2), vec![3]);
        assert_eq!(pivot_lows(&candles, 2), vec![3]);
    }

    #[test]
    fn ties_are_rejected() {
        let candles = candles_from_highs_lows(&[
            (10.0, 9.0),
            (15.0, 9.5),
            (12.0, 10.0),
            (15.0, 8.0),
            (12.5, 10.0),
            (11.5, 9.5),
            (10.5, 9.0),
        ]);
        // index 3 high equals index 1 high inside the window
        assert!(pivot_highs(&candles, 2).is_empty());
    }

    #[test]
    fn window_edges_are_excluded() {
        let candles = candles_from_highs_lows(&[
            (20.0, 9.0),
            (11.0, 9.5),
            (12.0, 10.0),
            (13.0, 8.0),
            (19.0, 10.0),
        ]);
        // extreme at index 0 and 4 cannot be pivots with w=2
        assert!(pivot_highs(&candles, 2).is_empty());
    }

    #[test]
    fn recent_pivots_keep_the_tail() {
        let mut points = Vec::new();
        for cycle in 0..5 {
            let peak = 20.0 + cycle as f64;
            points.extend_from_slice(&[
                (10.0, 9.0),
                (12.0, 10.0),
                (peak, 11.0),
                (12.0, 10.0),
                (10.0, 9.0),
            ]);
        }
        let candles = candles_from_highs_lows(&points);
        let all = pivot_highs(&candles, 2);
        assert!(all.len() >= 3);
        let recent = recent_pivot_highs(&candles, 2, 2);
        assert_eq!(recent, all[all.len() - 2..].to_vec());
    }
}
