// Support/resistance banding: zones are seeded from recent pivots, expanded
// by the configured tolerance, and merged when their centers crowd together.

use crate::analysis::pivots::{recent_pivot_highs, recent_pivot_lows};
use crate::types::{Candle, Side, Zone, ZoneKind, ZoneSet};

/// Max pivot seeds taken per side before merging.
const MAX_SEEDS: usize = 20;

/// Build the support/resistance zone set from the last `lookback` candles.
/// `tolerance` is a fraction (0.005 == 0.5%).
pub fn build_zones(candles: &[Candle], lookback: usize, window: usize, tolerance: f64) -> ZoneSet {
    let start = candles.len().saturating_sub(lookback);
    let recent = &candles[start..];

    let resistance_seeds: Vec<Zone> = recent_pivot_highs(recent, window, MAX_SEEDS)
        .into_iter()
        .map(|i| Zone::new(ZoneKind::Resistance, recent[i].high, tolerance, recent[i].open_time))
        .collect();
    let support_seeds: Vec<Zone> = recent_pivot_lows(recent, window, MAX_SEEDS)
        .into_iter()
        .map(|i| Zone::new(ZoneKind::Support, recent[i].low, tolerance, recent[i].open_time))
        .collect();

    ZoneSet {
        support: merge_zones(support_seeds, tolerance),
        resistance: merge_zones(resistance_seeds, tolerance),
    }
}

/// Left-to-right sweep over center-sorted zones, merging neighbours whose
/// centers sit within 2x tolerance of each other: centers average, bounds
/// union, touches sum. Idempotent.
pub fn merge_zones(mut zones: Vec<Zone>, tolerance: f64) -> Vec<Zone> {
    if zones.len() < 2 {
        return zones;
    }
    zones.sort_by(|a, b| a.center.partial_cmp(&b.center).unwrap());

    let mut merged: Vec<Zone> = Vec::with_capacity(zones.len());
    for zone in zones {
        match merged.last_mut() {
            Some(last) if (zone.center - last.center) / last.center < 2.0 * tolerance => {
                last.center = (last.center + zone.center) / 2.0;
                last.lower = last.lower.min(zone.lower);
                last.upper = last.upper.max(zone.upper);
                last.touches += zone.touches;
                if zone.timestamp > last.timestamp {
                    last.timestamp = zone.timestamp;
                }
            }
            _ => merged.push(zone),
        }
    }
    merged
}

pub fn is_touching(price: f64, zone: &Zone) -> bool {
    zone.contains(price)
}

/// The zone whose center is closest to `price`, within `max_pct` percent.
pub fn nearest_zone<'a>(price: f64, zones: &'a [Zone], max_pct: f64) -> Option<&'a Zone> {
    zones
        .iter()
        .map(|z| (z, (z.center - price).abs() / price * 100.0))
        .filter(|(_, dist)| *dist <= max_pct)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
        .map(|(z, _)| z)
}

/// Up to `k` zones strictly on the profit side of `entry`, nearest first.
/// LONG profits into resistance above; SHORT into support below.
pub fn find_next_opposing_zones(entry: f64, zones: &ZoneSet, side: Side, k: usize) -> Vec<Zone> {
    let mut candidates: Vec<Zone> = match side {
        Side::Long => zones
            .resistance
            .iter()
            .filter(|z| z.center > entry)
            .cloned()
            .collect(),
        Side::Short => zones
            .support
            .iter()
            .filter(|z| z.center < entry)
            .cloned()
            .collect(),
    };
    candidates.sort_by(|a, b| {
        let da = (a.center - entry).abs();
        let db = (b.center - entry).abs();
        da.partial_cmp(&db).unwrap()
    });
    candidates.truncate(k);
    candidates
}

/// The nearest zone strictly on the loss side of `entry`.
pub fn find_stop_loss_zone(entry: f64, zones: &ZoneSet, side: Side) -> Option<Zone> {
    let candidates: Vec<&Zone> = match side {
        Side::Long => zones.support.iter().filter(|z| z.center < entry).collect(),
        Side::Short => zones.resistance.iter().filter(|z| z.center > entry).collect(),
    };
    candidates
        .into_iter()
        .min_by(|a, b| {
            let da = (a.center - entry).abs();
            let db = (b.center - entry).abs();
            da.partial_cmp(&db).unwrap()
        })
        .cloned()
}
