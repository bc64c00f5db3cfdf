// Weighted confluence score. Component caps: HTF 30, setup quality 30,
// candle anatomy 25, volume 15, plus the optional RSI-divergence bonus.

use crate::types::{
    CandleStrength, Divergence, DivergenceKind, HtfAlignment, RejectionKind, ScoreBreakdown,
    Setup, SetupKind, Side, TrendDirection,
};

pub fn calculate_score(
    setup: &Setup,
    htf: &HtfAlignment,
    strength: &CandleStrength,
    volume_ratio: f64,
    divergence: Option<&Divergence>,
    rsi_divergence_bonus: f64,
) -> ScoreBreakdown {
    let htf_component = if htf.aligned {
        25.0 + 5.0 * htf.score
    } else {
        5.0 + 15.0 * htf.score
    }
    .clamp(0.0, 30.0);

    let setup_component = setup_quality(setup).clamp(0.0, 30.0);
    let candle_component = candle_component(setup.side, strength).clamp(0.0, 25.0);
    let volume_component = volume_component(setup, volume_ratio).clamp(0.0, 15.0);

    let divergence_component = match divergence {
        Some(d)
            if matches!(
                (setup.side, d.kind),
                (Side::Long, DivergenceKind::Bullish) | (Side::Short, DivergenceKind::Bearish)
            ) =>
        {
            rsi_divergence_bonus
        }
        _ => 0.0,
    };

    let total = (htf_component + setup_component + candle_component + volume_component
        + divergence_component)
        .clamp(0.0, 100.0 + rsi_divergence_bonus);

    ScoreBreakdown {
        htf: htf_component,
        setup_quality: setup_component,
        candle: candle_component,
        volume: volume_component,
        rsi_divergence: divergence_component,
        total,
    }
}

fn setup_quality(setup: &Setup) -> f64 {
    let base = 10.0;
    match setup.kind {
        SetupKind::Reversal => {
            let pattern_bonus = setup.pattern.as_ref().map(|p| p.strength * 8.0).unwrap_or(0.0);
            base + 12.0 + pattern_bonus
        }
        SetupKind::Breakout | SetupKind::Breakdown if setup.confirmed == Some(true) => base + 15.0,
        SetupKind::Retest => {
            let pattern_bonus = if setup.pattern.is_some() { 5.0 } else { 0.0 };
            base + 12.0 + pattern_bonus
        }
        SetupKind::FalseBreakout | SetupKind::FalseBreakdown => base + 10.0,
        _ => base + 5.0,
    }
}

fn candle_component(side: Side, strength: &CandleStrength) -> f64 {
    let mut score = 12.0;

    let aligned = matches!(
        (side, strength.direction),
        (Side::Long, TrendDirection::Up) | (Side::Short, TrendDirection::Down)
    );
    let misaligned = matches!(
        (side, strength.direction),
        (Side::Long, TrendDirection::Down) | (Side::Short, TrendDirection::Up)
    );

    if aligned {
        score += 10.0 * strength.body_percent.clamp(0.0, 1.0);
    }
    let close_in_aligned_half = match side {
        Side::Long => strength.close_location > 0.5,
        Side::Short => strength.close_location < 0.5,
    };
    if close_in_aligned_half {
        score += 3.0;
    }
    // a wick rejecting the far side of the trade supports it
    if let Some(rejection) = &strength.rejection {
        let favours_trade = matches!(
            (side, rejection.kind),
            (Side::Long, RejectionKind::Downside) | (Side::Short, RejectionKind::Upside)
        );
        if favours_trade {
            score += 4.0 * rejection.strength.clamp(0.0, 1.0);
        }
    }
    if misaligned {
        score -= 6.0;
    }
    score
}

fn volume_component(setup: &Setup, ratio: f64) -> f64 {
    let mut score = 5.0;
    if ratio >= 2.0 {
        score += 10.0;
    } else if ratio >= 1.5 {
        score += 7.0;
    } else if ratio >= 1.2 {
        score += 5.0;
    } else if ratio < 0.8 {
        score -= 3.0;
    }
    if setup.volume_spike == Some(true) {
        score += 3.0;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PatternDirection, PatternMatch, Rejection, ZoneSet};

    fn reversal_setup(side: Side, pattern_strength: f64) -> Setup {
        Setup {
            kind: SetupKind::Reversal,
            side,
            name: "test".to_string(),
            price: 100.0,
            zone: None,
            zones: ZoneSet::default(),
            pattern: Some(PatternMatch::new(
                "Hammer",
                match side {
                    Side::Long => PatternDirection::Bullish,
                    Side::Short => PatternDirection::Bearish,
                },
                pattern_strength,
            )),
            confirmed: None,
            volume_spike: Some(true),
            volume_ratio: Some(1.85),
        }
    }

    fn hammer_strength() -> CandleStrength {
        CandleStrength {
            body_percent: 0.1,
            close_location: 0.82,
            upper_wick_percent: 0.08,
            lower_wick_percent: 0.82,
            rejection: Some(Rejection {
                kind: RejectionKind::Downside,
                strength: 0.82,
            }),
            direction: TrendDirection::Up,
        }
    }

    #[test]
    fn aligned_confluence_scores_high() {
        let setup = reversal_setup(Side::Long, 0.9);
        let htf = HtfAlignment {
            aligned: true,
            score: 1.0,
        };
        let breakdown = calculate_score(&setup, &htf, &hammer_strength(), 1.85, None, 10.0);
        assert!(breakdown.total >= 75.0);
        assert!((breakdown.htf - 30.0).abs() < 1e-9);
        assert!(breakdown.setup_quality <= 30.0);
        assert!(breakdown.candle <= 25.0);
        assert!(breakdown.volume <= 15.0);
    }

    #[test]
    fn misaligned_htf_caps_the_component() {
        let setup = reversal_setup(Side::Short, 0.5);
        let htf = HtfAlignment {
            aligned: false,
            score: 1.0,
        };
        let breakdown = calculate_score(&setup, &htf, &hammer_strength(), 1.0, None, 10.0);
        assert!((breakdown.htf - 20.0).abs() < 1e-9);
    }

    #[test]
    fn divergence_bonus_requires_matching_side() {
        let setup = reversal_setup(Side::Long, 0.5);
        let htf = HtfAlignment {
            aligned: true,
            score: 0.5,
        };
        let bullish = Divergence {
            kind: DivergenceKind::Bullish,
            price_delta: -1.0,
            rsi_delta: 2.0,
        };
        let bearish = Divergence {
            kind: DivergenceKind::Bearish,
            price_delta: 1.0,
            rsi_delta: -2.0,
        };
        let with = calculate_score(&setup, &htf, &hammer_strength(), 1.0, Some(&bullish), 10.0);
        let without = calculate_score(&setup, &htf, &hammer_strength(), 1.0, Some(&bearish), 10.0);
        assert!((with.total - without.total - 10.0).abs() < 1e-9);
        assert_eq!(with.rsi_divergence, 10.0);
        assert_eq!(without.rsi_divergence, 0.0);
    }

    #[test]
    fn score_stays_within_bounds() {
        let setup = reversal_setup(Side::Long, 1.0);
        let htf = HtfAlignment {
            aligned: true,
            score: 1.0,
        };
        let mut strength = hammer_strength();
        strength.body_percent = 1.0;
        let breakdown = calculate_score(&setup, &htf, &strength, 5.0, None, 10.0);
        assert!(breakdown.total <= 110.0);
        assert!(breakdown.total >= 0.0);
    }

    #[test]
    fn misaligned_candle_is_penalised() {
        let setup = reversal_setup(Side::Short, 0.5);
        let htf = HtfAlignment {
            aligned: false,
            score: 0.0,
        };
        // bullish candle against a short
        let strength = hammer_strength();
        let breakdown = calculate_score(&setup, &htf, &strength, 1.0, None, 10.0);
        // base 12 - 6 misalignment, no aligned-half close (0.82 > 0.5)
        assert!((breakdown.candle - 6.0).abs() < 1e-9);
    }
}
