// Setup classification at zones: reversal, breakout/breakdown (true or
// faded), rejection wicks, and breakout retests. Detectors run in priority
// order and the first match wins.

use crate::analysis::patterns::detect_reversal_pattern;
use crate::analysis::zones::{build_zones, is_touching};
use crate::config::Config;
use crate::types::{Candle, PatternDirection, Setup, SetupKind, Side, Zone, ZoneSet};

/// How far back the retest detector looks for the originating breakout.
const RETEST_WINDOW: usize = 20;

/// Candles fed to the pattern detector for confirmation.
const PATTERN_TAIL: usize = 3;

const VOLUME_AVG_PERIOD: usize = 20;

#[derive(Debug)]
pub enum SetupDetection {
    Setup(Box<Setup>),
    NoZones { total: usize, required: usize },
    NoSetup,
}

/// Volume of the current candle against the average of the previous 20.
pub fn volume_ratio(candles: &[Candle]) -> f64 {
    let n = candles.len();
    if n < 2 {
        return 1.0;
    }
    let start = (n - 1).saturating_sub(VOLUME_AVG_PERIOD);
    let window = &candles[start..n - 1];
    let avg: f64 = window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64;
    if avg <= 0.0 {
        return 1.0;
    }
    candles[n - 1].volume / avg
}

pub fn detect_setup(candles: &[Candle], cfg: &Config) -> SetupDetection {
    if candles.len() < 2 {
        return SetupDetection::NoSetup;
    }

    let zones = build_zones(
        candles,
        cfg.analysis.zone_lookback,
        cfg.analysis.pivot_window,
        cfg.analysis.zone_tolerance(),
    );

    let required = cfg.gates.min_zones_required;
    if required > 0 && zones.total() < required {
        return SetupDetection::NoZones {
            total: zones.total(),
            required,
        };
    }

    let ratio = volume_ratio(candles);
    let spike = ratio >= cfg.gates.volume_spike_threshold;

    // a wick that pierced the zone is a rejection, not a plain reversal,
    // so the rejection detector runs first
    let detectors: [fn(&[Candle], &ZoneSet, f64, bool) -> Option<Setup>; 4] = [
        detect_breakout_breakdown,
        detect_rejection,
        detect_reversal,
        detect_retest,
    ];
    for detector in detectors {
        if let Some(setup) = detector(candles, &zones, ratio, spike) {
            return SetupDetection::Setup(Box::new(setup));
        }
    }
    SetupDetection::NoSetup
}

fn pattern_tail(candles: &[Candle]) -> &[Candle] {
    let start = candles.len().saturating_sub(PATTERN_TAIL);
    &candles[start..]
}

fn base_setup(
    kind: SetupKind,
    side: Side,
    name: String,
    price: f64,
    zone: &Zone,
    zones: &ZoneSet,
    ratio: f64,
    spike: bool,
) -> Setup {
    Setup {
        kind,
        side,
        name,
        price,
        zone: Some(zone.clone()),
        zones: zones.clone(),
        pattern: None,
        confirmed: None,
        volume_spike: Some(spike),
        volume_ratio: Some(ratio),
    }
}

/// Close inside a zone with a directional pattern away from it. Neutral
/// patterns never qualify.
fn detect_reversal(candles: &[Candle], zones: &ZoneSet, ratio: f64, spike: bool) -> Option<Setup> {
    let close = candles.last()?.close;
    let pattern = detect_reversal_pattern(pattern_tail(candles))?;

    if pattern.direction == PatternDirection::Bullish {
        if let Some(zone) = zones.support.iter().find(|z| is_touching(close, z)) {
            let mut setup = base_setup(
                SetupKind::Reversal,
                Side::Long,
                format!("{} at support", pattern.name),
                close,
                zone,
                zones,
                ratio,
                spike,
            );
            setup.pattern = Some(pattern);
            return Some(setup);
        }
    } else if pattern.direction == PatternDirection::Bearish {
        if let Some(zone) = zones.resistance.iter().find(|z| is_touching(close, z)) {
            let mut setup = base_setup(
                SetupKind::Reversal,
                Side::Short,
                format!("{} at resistance", pattern.name),
                close,
                zone,
                zones,
                ratio,
                spike,
            );
            setup.pattern = Some(pattern);
            return Some(setup);
        }
    }
    None
}

/// Previous close on the original side, current close beyond the far edge.
/// With a volume spike it is a true break in the break direction; without,
/// the break is faded from the opposite side.
fn detect_breakout_breakdown(
    candles: &[Candle],
    zones: &ZoneSet,
    ratio: f64,
    spike: bool,
) -> Option<Setup> {
    let n = candles.len();
    let prev = &candles[n - 2];
    let current = &candles[n - 1];

    for zone in &zones.resistance {
        if prev.close <= zone.upper && current.close > zone.upper {
            let setup = if spike {
                let mut s = base_setup(
                    SetupKind::Breakout,
                    Side::Long,
                    "Resistance breakout".to_string(),
                    current.close,
                    zone,
                    zones,
                    ratio,
                    spike,
                );
                s.confirmed = Some(true);
                s
            } else {
                let mut s = base_setup(
                    SetupKind::FalseBreakout,
                    Side::Short,
                    "Unconfirmed breakout fade".to_string(),
                    current.close,
                    zone,
                    zones,
                    ratio,
                    spike,
                );
                s.confirmed = Some(false);
                s
            };
            return Some(setup);
        }
    }

    for zone in &zones.support {
        if prev.close >= zone.lower && current.close < zone.lower {
            let setup = if spike {
                let mut s = base_setup(
                    SetupKind::Breakdown,
                    Side::Short,
                    "Support breakdown".to_string(),
                    current.close,
                    zone,
                    zones,
                    ratio,
                    spike,
                );
                s.confirmed = Some(true);
                s
            } else {
                let mut s = base_setup(
                    SetupKind::FalseBreakdown,
                    Side::Long,
                    "Unconfirmed breakdown fade".to_string(),
                    current.close,
                    zone,
                    zones,
                    ratio,
                    spike,
                );
                s.confirmed = Some(false);
                s
            };
            return Some(setup);
        }
    }

    None
}

/// Wick pierces the zone but the close returns inside without volume:
/// fade the pierce direction.
fn detect_rejection(candles: &[Candle], zones: &ZoneSet, ratio: f64, spike: bool) -> Option<Setup> {
    if spike {
        return None;
    }
    let current = candles.last()?;

    for zone in &zones.resistance {
        if current.high > zone.upper && current.close <= zone.upper && current.close >= zone.lower {
            let mut setup = base_setup(
                SetupKind::FalseBreakout,
                Side::Short,
                "Resistance rejection".to_string(),
                current.close,
                zone,
                zones,
                ratio,
                spike,
            );
            setup.confirmed = Some(false);
            return Some(setup);
        }
    }
    for zone in &zones.support {
        if current.low < zone.lower && current.close >= zone.lower && current.close <= zone.upper {
            let mut setup = base_setup(
                SetupKind::FalseBreakdown,
                Side::Long,
                "Support rejection".to_string(),
                current.close,
                zone,
                zones,
                ratio,
                spike,
            );
            setup.confirmed = Some(false);
            return Some(setup);
        }
    }
    None
}

/// A recent breakout through a zone, price back touching the zone from the
/// breakout side, and a confirming pattern in the breakout direction.
fn detect_retest(candles: &[Candle], zones: &ZoneSet, ratio: f64, spike: bool) -> Option<Setup> {
    let n = candles.len();
    if n < 3 {
        return None;
    }
    let current = &candles[n - 1];
    let pattern = detect_reversal_pattern(pattern_tail(candles))?;
    let window_start = (n - 1).saturating_sub(RETEST_WINDOW);

    if pattern.direction == PatternDirection::Bullish {
        for zone in &zones.resistance {
            let broke_out = (window_start.max(1)..n - 1)
                .any(|j| candles[j - 1].close <= zone.upper && candles[j].close > zone.upper);
            if broke_out && is_touching(current.close, zone) {
                let mut setup = base_setup(
                    SetupKind::Retest,
                    Side::Long,
                    "Breakout retest".to_string(),
                    current.close,
                    zone,
                    zones,
                    ratio,
                    spike,
                );
                setup.pattern = Some(pattern);
                return Some(setup);
            }
        }
    } else if pattern.direction == PatternDirection::Bearish {
        for zone in &zones.support {
            let broke_down = (window_start.max(1)..n - 1)
                .any(|j| candles[j - 1].close >= zone.lower && candles[j].close < zone.lower);
            if broke_down && is_touching(current.close, zone) {
                let mut setup = base_setup(
                    SetupKind::Retest,
                    Side::Short,
                    "Breakdown retest".to_string(),
                    current.close,
                    zone,
                    zones,
                    ratio,
                    spike,
                );
                setup.pattern = Some(pattern);
                return Some(setup);
            }
        }
    }
    None
}
