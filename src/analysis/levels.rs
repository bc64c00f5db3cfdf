// Zone-anchored stop loss and take profits. The stop sits past the nearest
// loss-side zone edge with a buffer; targets walk the opposing zones and
// fall back to R-multiples when the map runs out.

use crate::analysis::zones::{find_next_opposing_zones, find_stop_loss_zone};
use crate::types::{Levels, Setup, Side};

const MAX_TP_ZONES: usize = 3;
const FALLBACK_R1: f64 = 1.5;
const FALLBACK_R2: f64 = 3.0;

/// `sl_buffer` is a fraction of price (0.0025 == 0.25%). Returns None when
/// the resulting geometry is invalid; the caller records `invalid_levels`.
pub fn calculate_levels(setup: &Setup, sl_buffer: f64) -> Option<Levels> {
    let entry = setup.price;
    if !entry.is_finite() || entry <= 0.0 {
        return None;
    }

    let sl_zone = find_stop_loss_zone(entry, &setup.zones, setup.side);
    let stop_loss = match (&sl_zone, &setup.zone) {
        (Some(zone), _) => buffered_stop(zone.lower, zone.upper, setup.side, sl_buffer),
        (None, Some(zone)) => buffered_stop(zone.lower, zone.upper, setup.side, sl_buffer),
        (None, None) => match setup.side {
            Side::Long => entry * 0.99,
            Side::Short => entry * 1.01,
        },
    };

    let risk = (entry - stop_loss).abs();
    if !risk.is_finite() || risk <= 0.0 {
        return None;
    }

    let tp_zones = find_next_opposing_zones(entry, &setup.zones, setup.side, MAX_TP_ZONES);
    let r_multiple = |mult: f64| match setup.side {
        Side::Long => entry + risk * mult,
        Side::Short => entry - risk * mult,
    };

    let take_profit1 = tp_zones.first().map(|z| z.center).unwrap_or_else(|| r_multiple(FALLBACK_R1));
    let mut take_profit2 = tp_zones.get(1).map(|z| z.center).or_else(|| Some(r_multiple(FALLBACK_R2)));

    // second target must extend strictly past the first
    if let Some(tp2) = take_profit2 {
        let extends = match setup.side {
            Side::Long => tp2 > take_profit1,
            Side::Short => tp2 < take_profit1,
        };
        if !extends {
            take_profit2 = None;
        }
    }

    let risk_reward1 = (take_profit1 - entry).abs() / risk;
    let risk_reward2 = take_profit2.map(|tp2| (tp2 - entry).abs() / risk);

    let levels = Levels {
        entry,
        stop_loss,
        take_profit1,
        take_profit2,
        risk_reward1,
        risk_reward2,
        sl_zone,
        tp_zones,
    };

    if !levels.is_finite() || !directionally_valid(&levels, setup.side) {
        return None;
    }
    Some(levels)
}

fn buffered_stop(lower: f64, upper: f64, side: Side, buffer: f64) -> f64 {
    match side {
        Side::Long => lower * (1.0 - buffer),
        Side::Short => upper * (1.0 + buffer),
    }
}

/// LONG: stop < entry < TP1 (< TP2); SHORT mirrored.
fn directionally_valid(levels: &Levels, side: Side) -> bool {
    match side {
        Side::Long => {
            levels.stop_loss < levels.entry
                && levels.entry < levels.take_profit1
                && levels.take_profit2.map_or(true, |tp2| tp2 > levels.take_profit1)
        }
        Side::Short => {
            levels.stop_loss > levels.entry
                && levels.entry > levels.take_profit1
                && levels.take_profit2.map_or(true, |tp2| tp2 < levels.take_profit1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SetupKind, Zone, ZoneKind, ZoneSet};
    use chrono::{TimeZone, Utc};

    fn zone(kind: ZoneKind, center: f64) -> Zone {
        Zone::new(kind, center, 0.005, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    fn setup_with_zones(side: Side, price: f64, zones: ZoneSet) -> Setup {
        Setup {
            kind: SetupKind::Reversal,
            side,
            name: "test".to_string(),
            price,
            zone: None,
            zones,
            pattern: None,
            confirmed: None,
            volume_spike: None,
            volume_ratio: None,
        }
    }

    #[test]
    fn long_levels_anchor_on_zones() {
        let zones = ZoneSet {
            support: vec![zone(ZoneKind::Support, 98.0), zone(ZoneKind::Support, 95.0)],
            resistance: vec![
                zone(ZoneKind::Resistance, 103.0),
                zone(ZoneKind::Resistance, 106.0),
                zone(ZoneKind::Resistance, 109.0),
            ],
        };
        let setup = setup_with_zones(Side::Long, 100.0, zones);
        let levels = calculate_levels(&setup, 0.0025).unwrap();

        let expected_stop = 98.0 * (1.0 - 0.005) * (1.0 - 0.0025);
        assert!((levels.stop_loss - expected_stop).abs() < 1e-9);
        assert_eq!(levels.take_profit1, 103.0);
        assert_eq!(levels.take_profit2, Some(106.0));
        assert_eq!(levels.tp_zones.len(), 3);

        let risk = levels.entry - levels.stop_loss;
        let rr = (levels.take_profit1 - levels.entry) / risk;
        assert!((levels.risk_reward1 - rr).abs() < 1e-6);
        assert!(levels.stop_loss < levels.entry && levels.entry < levels.take_profit1);
    }

    #[test]
    fn short_levels_mirror() {
        let zones = ZoneSet {
            support: vec![zone(ZoneKind::Support, 95.0), zone(ZoneKind::Support, 92.0)],
            resistance: vec![zone(ZoneKind::Resistance, 102.0)],
        };
        let setup = setup_with_zones(Side::Short, 100.0, zones);
        let levels = calculate_levels(&setup, 0.0025).unwrap();

        let expected_stop = 102.0 * (1.0 + 0.005) * (1.0 + 0.0025);
        assert!((levels.stop_loss - expected_stop).abs() < 1e-9);
        assert_eq!(levels.take_profit1, 95.0);
        assert_eq!(levels.take_profit2, Some(92.0));
        assert!(levels.stop_loss > levels.entry && levels.entry > levels.take_profit1);
    }

    #[test]
    fn missing_zones_fall_back_to_r_multiples() {
        let setup = setup_with_zones(Side::Long, 100.0, ZoneSet::default());
        let levels = calculate_levels(&setup, 0.0025).unwrap();

        // last-resort stop at entry * 0.99 -> risk 1.0
        assert!((levels.stop_loss - 99.0).abs() < 1e-9);
        assert!((levels.take_profit1 - 101.5).abs() < 1e-9);
        assert_eq!(levels.take_profit2, Some(103.0));
        assert!((levels.risk_reward1 - 1.5).abs() < 1e-6);
        assert!((levels.risk_reward2.unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn single_tp_zone_extends_with_r_multiple() {
        let zones = ZoneSet {
            support: vec![zone(ZoneKind::Support, 98.0)],
            resistance: vec![zone(ZoneKind::Resistance, 101.0)],
        };
        let setup = setup_with_zones(Side::Long, 100.0, zones);
        let levels = calculate_levels(&setup, 0.0025).unwrap();
        assert_eq!(levels.take_profit1, 101.0);
        // tp2 from 3R extension past tp1
        let risk = levels.entry - levels.stop_loss;
        assert!((levels.take_profit2.unwrap() - (100.0 + 3.0 * risk)).abs() < 1e-9);
    }

    #[test]
    fn non_extending_second_target_is_dropped() {
        // tp zones so close together that the second does not extend
        let zones = ZoneSet {
            support: vec![zone(ZoneKind::Support, 90.0)],
            resistance: vec![
                zone(ZoneKind::Resistance, 108.0),
                zone(ZoneKind::Resistance, 108.0),
            ],
        };
        let setup = setup_with_zones(Side::Long, 100.0, zones);
        let levels = calculate_levels(&setup, 0.0025).unwrap();
        assert_eq!(levels.take_profit1, 108.0);
        assert_eq!(levels.take_profit2, None);
    }

    #[test]
    fn degenerate_entry_is_rejected() {
        let setup = setup_with_zones(Side::Long, f64::NAN, ZoneSet::default());
        assert!(calculate_levels(&setup, 0.0025).is_none());
    }
}
