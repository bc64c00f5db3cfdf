use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

/// One OHLCV bar. `is_closed=false` marks the forming candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub is_closed: bool,
}

impl Candle {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    /// Boundary validation for ingested candles. Rejects non-finite numerics,
    /// inverted OHLC ordering, negative volume, and non-increasing times.
    pub fn is_valid(&self) -> bool {
        let nums = [self.open, self.high, self.low, self.close, self.volume];
        if nums.iter().any(|v| !v.is_finite()) {
            return false;
        }
        if self.volume < 0.0 {
            return false;
        }
        if self.low > self.open.min(self.close) || self.high < self.open.max(self.close) {
            return false;
        }
        self.open_time < self.close_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
}

impl TrendDirection {
    /// Signed contribution to weighted bias scores
    pub fn sign(&self) -> f64 {
        match self {
            TrendDirection::Up => 1.0,
            TrendDirection::Down => -1.0,
            TrendDirection::Neutral => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ZoneKind {
    Support,
    Resistance,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Support => "support",
            ZoneKind::Resistance => "resistance",
        }
    }
}

/// A price band anchored on a pivot and expanded by the configured tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub kind: ZoneKind,
    pub center: f64,
    pub lower: f64,
    pub upper: f64,
    pub timestamp: DateTime<Utc>,
    pub touches: u32,
}

impl Zone {
    pub fn new(kind: ZoneKind, center: f64, tolerance: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            center,
            lower: center * (1.0 - tolerance),
            upper: center * (1.0 + tolerance),
            timestamp,
            touches: 1,
        }
    }

    /// Stable under equal (kind, center); used as the cooldown key component
    pub fn key(&self) -> String {
        format!("{}_{:.2}", self.kind.as_str(), self.center)
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower && price <= self.upper
    }
}

/// Support and resistance bands built from recent pivots, always carried
/// together so level calculation can see both sides of the entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneSet {
    pub support: Vec<Zone>,
    pub resistance: Vec<Zone>,
}

impl ZoneSet {
    pub fn total(&self) -> usize {
        self.support.len() + self.resistance.len()
    }

    pub fn all(&self) -> impl Iterator<Item = &Zone> {
        self.support.iter().chain(self.resistance.iter())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatternDirection {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub name: String,
    pub direction: PatternDirection,
    pub strength: f64,
}

impl PatternMatch {
    pub fn new(name: &str, direction: PatternDirection, strength: f64) -> Self {
        Self {
            name: name.to_string(),
            direction,
            strength,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RejectionKind {
    Upside,
    Downside,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub strength: f64,
}

/// Per-candle anatomy used by scoring and the anti-chase policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleStrength {
    pub body_percent: f64,
    pub close_location: f64,
    pub upper_wick_percent: f64,
    pub lower_wick_percent: f64,
    pub rejection: Option<Rejection>,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SetupKind {
    Reversal,
    Breakout,
    Breakdown,
    Retest,
    FalseBreakout,
    FalseBreakdown,
}

impl SetupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupKind::Reversal => "reversal",
            SetupKind::Breakout => "breakout",
            SetupKind::Breakdown => "breakdown",
            SetupKind::Retest => "retest",
            SetupKind::FalseBreakout => "false_breakout",
            SetupKind::FalseBreakdown => "false_breakdown",
        }
    }
}

/// A named price-action configuration with a direction and a zone.
/// Carries the full zone set for downstream level calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setup {
    pub kind: SetupKind,
    pub side: Side,
    pub name: String,
    pub price: f64,
    pub zone: Option<Zone>,
    pub zones: ZoneSet,
    pub pattern: Option<PatternMatch>,
    /// Breakout with volume confirmation (true) vs. suspected trap (false)
    pub confirmed: Option<bool>,
    pub volume_spike: Option<bool>,
    pub volume_ratio: Option<f64>,
}

impl Setup {
    /// Identity of this setup instance for cooldown / dedup keying
    pub fn zone_key(&self) -> String {
        self.zone
            .as_ref()
            .map(|z| z.key())
            .unwrap_or_else(|| format!("price_{:.2}", self.price))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BiasDirection {
    Bullish,
    Bearish,
    Neutral,
}

/// Weighted aggregate structure of the higher timeframes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtfBias {
    pub bias: BiasDirection,
    pub alignment: bool,
    pub structures: HashMap<Timeframe, TrendDirection>,
    pub score: f64,
}

impl Default for HtfBias {
    fn default() -> Self {
        Self {
            bias: BiasDirection::Neutral,
            alignment: false,
            structures: HashMap::new(),
            score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtfAlignment {
    pub aligned: bool,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MarketRegime {
    TrendUp,
    TrendDown,
    Range,
    Expansion,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::TrendUp => "trend_up",
            MarketRegime::TrendDown => "trend_down",
            MarketRegime::Range => "range",
            MarketRegime::Expansion => "expansion",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeAssessment {
    pub regime: MarketRegime,
    pub confidence: f64,
    pub atr: f64,
    pub atr_ratio: f64,
    pub slope: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StructureEventKind {
    Bos,
    Choch,
}

impl StructureEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureEventKind::Bos => "BOS",
            StructureEventKind::Choch => "CHoCH",
        }
    }
}

/// Break of structure (continuation) or change of character (reversal)
/// against the most recent swing extremes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureEvent {
    pub kind: StructureEventKind,
    pub direction: PatternDirection,
    pub level: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SweepSource {
    SwingHigh,
    SwingLow,
    ZoneBoundary,
}

/// A wick through a reference level that closed back inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepEvent {
    pub direction: PatternDirection,
    pub source: SweepSource,
    pub reference: f64,
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DivergenceKind {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Divergence {
    pub kind: DivergenceKind,
    pub price_delta: f64,
    pub rsi_delta: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChaseDecision {
    ChaseOk,
    ChaseOkCaution,
    ChaseNo,
    ReversalWatch,
}

impl ChaseDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChaseDecision::ChaseOk => "CHASE_OK",
            ChaseDecision::ChaseOkCaution => "CHASE_OK_CAUTION",
            ChaseDecision::ChaseNo => "CHASE_NO",
            ChaseDecision::ReversalWatch => "REVERSAL_WATCH",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MomentumState {
    Accelerating,
    Steady,
    Slowing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaseMetrics {
    pub atr: f64,
    pub atr_move: f64,
    pub pct_move: f64,
    pub body_to_range: f64,
    pub volume_ratio: f64,
    pub volume_climax: bool,
    pub consecutive_trend: usize,
    pub momentum: MomentumState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaseEvaluation {
    pub decision: ChaseDecision,
    pub reason: String,
    pub score: f64,
    pub metrics: ChaseMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub htf: f64,
    pub setup_quality: f64,
    pub candle: f64,
    pub volume: f64,
    pub rsi_divergence: f64,
    pub total: f64,
}

/// Zone-anchored stop loss and take profits with reward-to-risk ratios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Levels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit1: f64,
    pub take_profit2: Option<f64>,
    pub risk_reward1: f64,
    pub risk_reward2: Option<f64>,
    pub sl_zone: Option<Zone>,
    pub tp_zones: Vec<Zone>,
}

impl Levels {
    pub fn is_finite(&self) -> bool {
        let mut vals = vec![self.entry, self.stop_loss, self.take_profit1, self.risk_reward1];
        if let Some(tp2) = self.take_profit2 {
            vals.push(tp2);
        }
        if let Some(rr2) = self.risk_reward2 {
            vals.push(rr2);
        }
        vals.iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SignalStage {
    Setup,
    Entry,
}

impl SignalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStage::Setup => "SETUP",
            SignalStage::Entry => "ENTRY",
        }
    }
}

/// A fully-resolved signal handed to the notification sink and the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub stage: SignalStage,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub side: Side,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub setup: Setup,
    pub htf_bias: HtfBias,
    pub regime: Option<RegimeAssessment>,
    pub structure_event: Option<StructureEvent>,
    pub sweep: Option<SweepEvent>,
    pub divergence: Option<Divergence>,
    pub volume_ratio: f64,
    pub levels: Levels,
    pub chase: Option<ChaseEvaluation>,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn cooldown_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.symbol,
            self.timeframe,
            self.side.as_str(),
            self.setup.zone_key()
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SkipReason {
    InsufficientData,
    NoSetup,
    NoZones,
    HtfNotAligned,
    LowVolume,
    ScoreTooLow,
    InvalidLevels,
    RrTooLow,
    ChaseNo,
    CooldownActive,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InsufficientData => "insufficient_data",
            SkipReason::NoSetup => "no_setup",
            SkipReason::NoZones => "no_zones",
            SkipReason::HtfNotAligned => "htf_not_aligned",
            SkipReason::LowVolume => "low_volume",
            SkipReason::ScoreTooLow => "score_too_low",
            SkipReason::InvalidLevels => "invalid_levels",
            SkipReason::RrTooLow => "rr_too_low",
            SkipReason::ChaseNo => "chase_no",
            SkipReason::CooldownActive => "cooldown_active",
        }
    }
}
