// Configuration structures and loading logic
// Env-first: defaults -> optional config.yaml overlay -> explicit env keys

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::str::FromStr;

use crate::types::Timeframe;
use crate::utils::{env_bool, env_opt, env_parse, parse_symbols, parse_timeframes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMode {
    Pro,
    Aggressive,
}

impl FromStr for SignalMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pro" => Ok(SignalMode::Pro),
            "aggressive" => Ok(SignalMode::Aggressive),
            other => bail!("unsupported SIGNAL_MODE: {other}"),
        }
    }
}

/// Preset bundle applied by SIGNAL_MODE; explicit env values override members
struct ModePreset {
    min_score: f64,
    min_zones_required: usize,
    cooldown_minutes: i64,
}

impl SignalMode {
    fn preset(&self) -> ModePreset {
        match self {
            SignalMode::Pro => ModePreset {
                min_score: 72.0,
                min_zones_required: 2,
                cooldown_minutes: 240,
            },
            SignalMode::Aggressive => ModePreset {
                min_score: 60.0,
                min_zones_required: 1,
                cooldown_minutes: 90,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageCfg {
    pub setup_enabled: bool,
    pub entry_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct GateCfg {
    /// Legacy catch-all score gate; stage-specific thresholds win when set
    pub min_signal_score: f64,
    pub setup_score_threshold: f64,
    pub entry_score_threshold: f64,
    /// 0 disables the cooldown gate
    pub cooldown_minutes: i64,
    /// 0 disables the zone-count gate
    pub min_zones_required: usize,
    pub min_rr: f64,
    pub require_volume_confirmation: bool,
    pub volume_spike_threshold: f64,
}

impl GateCfg {
    pub fn entry_threshold(&self) -> f64 {
        if self.entry_score_threshold > 0.0 {
            self.entry_score_threshold
        } else {
            self.min_signal_score
        }
    }

    pub fn setup_threshold(&self) -> f64 {
        if self.setup_score_threshold > 0.0 {
            self.setup_score_threshold
        } else {
            self.min_signal_score
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisCfg {
    pub pivot_window: usize,
    pub zone_lookback: usize,
    pub zone_tolerance_pct: f64,
    pub zone_sl_buffer_pct: f64,
    pub atr_period: usize,
    pub sweep_lookback: usize,
    pub structure_lookback: usize,
    pub anti_chase_max_atr: f64,
    pub anti_chase_max_pct: f64,
    pub rsi_divergence_bonus: f64,
    pub htf_weight_1d: f64,
    pub htf_weight_4h: f64,
}

impl AnalysisCfg {
    /// Zone tolerance as a fraction (ZONE_TOLERANCE_PCT is a percentage)
    pub fn zone_tolerance(&self) -> f64 {
        self.zone_tolerance_pct / 100.0
    }

    pub fn sl_buffer(&self) -> f64 {
        self.zone_sl_buffer_pct / 100.0
    }

    pub fn htf_weight(&self, tf: Timeframe) -> f64 {
        match tf {
            Timeframe::D1 => self.htf_weight_1d,
            Timeframe::H4 => self.htf_weight_4h,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestCfg {
    pub rest_base_url: String,
    pub ws_base_url: String,
    pub backfill_limit: u32,
    pub intrabar_enabled: bool,
    pub ping_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct NotifyCfg {
    pub dry_run: bool,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub entry_timeframes: Vec<Timeframe>,
    pub htf_timeframes: Vec<Timeframe>,
    pub mode: SignalMode,
    pub stages: StageCfg,
    pub gates: GateCfg,
    pub analysis: AnalysisCfg,
    pub ingest: IngestCfg,
    pub notify: NotifyCfg,
    pub database_path: String,
}

/// Optional file overlay (config.yaml). Every field is optional; env keys
/// always win over the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub symbols: Option<String>,
    pub timeframes: Option<String>,
    pub entry_timeframes: Option<String>,
    pub htf_timeframes: Option<String>,
    pub signal_mode: Option<String>,
    pub min_signal_score: Option<f64>,
    pub cooldown_minutes: Option<i64>,
    pub min_zones_required: Option<usize>,
    pub min_rr: Option<f64>,
    pub database_path: Option<String>,
}

impl FileConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        serde_yaml::from_str(&content).with_context(|| format!("invalid yaml in {path}"))
    }
}

fn env_or_file<T: FromStr + Copy>(key: &str, file: Option<T>, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .or(file)
        .unwrap_or(default)
}

impl Config {
    /// Load the full configuration. Missing or invalid required values are
    /// fatal at startup.
    pub fn load() -> Result<Self> {
        let file = FileConfig::load("config.yaml").unwrap_or_default();
        Self::from_sources(&file)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_sources(&FileConfig::default())
    }

    fn from_sources(file: &FileConfig) -> Result<Self> {
        let symbols_raw = env_opt("SYMBOLS")
            .or_else(|| file.symbols.clone())
            .unwrap_or_else(|| "BTCUSDT".to_string());
        let symbols = parse_symbols(&symbols_raw);

        let timeframes_raw = env_opt("TIMEFRAMES")
            .or_else(|| file.timeframes.clone())
            .unwrap_or_else(|| "1d,4h,1h".to_string());
        let timeframes = parse_timeframes(&timeframes_raw).context("TIMEFRAMES")?;

        let entry_raw = env_opt("ENTRY_TIMEFRAMES")
            .or_else(|| file.entry_timeframes.clone())
            .unwrap_or_else(|| "1h".to_string());
        let entry_timeframes = parse_timeframes(&entry_raw).context("ENTRY_TIMEFRAMES")?;

        let htf_raw = env_opt("HTF_TIMEFRAMES")
            .or_else(|| file.htf_timeframes.clone())
            .unwrap_or_else(|| "1d,4h".to_string());
        let htf_timeframes = parse_timeframes(&htf_raw).context("HTF_TIMEFRAMES")?;

        let mode_raw = env_opt("SIGNAL_MODE")
            .or_else(|| file.signal_mode.clone())
            .unwrap_or_else(|| "pro".to_string());
        let mode = SignalMode::from_str(&mode_raw)?;
        let preset = mode.preset();

        let stages_raw = env_opt("SIGNAL_STAGE_ENABLED").unwrap_or_else(|| "setup,entry".to_string());
        let stages_lower = stages_raw.to_lowercase();
        let stages = StageCfg {
            setup_enabled: stages_lower.contains("setup"),
            entry_enabled: stages_lower.contains("entry"),
        };

        let gates = GateCfg {
            min_signal_score: env_or_file("MIN_SIGNAL_SCORE", file.min_signal_score, preset.min_score),
            setup_score_threshold: env_parse("SETUP_SCORE_THRESHOLD", 0.0),
            entry_score_threshold: env_parse("ENTRY_SCORE_THRESHOLD", 0.0),
            cooldown_minutes: env_or_file("SIGNAL_COOLDOWN_MINUTES", file.cooldown_minutes, preset.cooldown_minutes),
            min_zones_required: env_or_file("MIN_ZONES_REQUIRED", file.min_zones_required, preset.min_zones_required),
            min_rr: env_or_file("MIN_RR", file.min_rr, 1.5),
            require_volume_confirmation: env_bool("REQUIRE_VOLUME_CONFIRMATION", false),
            volume_spike_threshold: env_parse("VOLUME_SPIKE_THRESHOLD", 1.5),
        };

        let analysis = AnalysisCfg {
            pivot_window: env_parse("PIVOT_WINDOW", 5),
            zone_lookback: env_parse("ZONE_LOOKBACK", 200),
            zone_tolerance_pct: env_parse("ZONE_TOLERANCE_PCT", 0.5),
            zone_sl_buffer_pct: env_parse("ZONE_SL_BUFFER_PCT", 0.25),
            atr_period: env_parse("ATR_PERIOD", 14),
            sweep_lookback: env_parse("SWEEP_LOOKBACK", 10),
            structure_lookback: env_parse("STRUCTURE_LOOKBACK", 3),
            anti_chase_max_atr: env_parse("ANTI_CHASE_MAX_ATR", 2.0),
            anti_chase_max_pct: env_parse("ANTI_CHASE_MAX_PCT", 1.5),
            rsi_divergence_bonus: env_parse("RSI_DIVERGENCE_BONUS", 10.0),
            htf_weight_1d: env_parse("HTF_WEIGHT_1D", 0.6),
            htf_weight_4h: env_parse("HTF_WEIGHT_4H", 0.4),
        };

        let ingest = IngestCfg {
            rest_base_url: env_opt("REST_BASE_URL")
                .unwrap_or_else(|| "https://fapi.binance.com".to_string()),
            ws_base_url: env_opt("WS_BASE_URL")
                .unwrap_or_else(|| "wss://fstream.binance.com".to_string()),
            backfill_limit: env_parse("BACKFILL_LIMIT", 500),
            intrabar_enabled: env_bool("INTRABAR_ENABLED", false),
            ping_interval_secs: env_parse("WS_PING_INTERVAL_SECS", 180),
        };

        let notify = NotifyCfg {
            dry_run: env_bool("DRY_RUN", false),
            telegram_bot_token: env_opt("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: env_opt("TELEGRAM_CHAT_ID"),
        };

        let database_path = env_opt("DATABASE_PATH")
            .or_else(|| file.database_path.clone())
            .unwrap_or_else(|| "./signal_bot.db".to_string());

        let cfg = Self {
            symbols,
            timeframes,
            entry_timeframes,
            htf_timeframes,
            mode,
            stages,
            gates,
            analysis,
            ingest,
            notify,
            database_path,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("SYMBOLS must name at least one instrument");
        }
        if self.timeframes.is_empty() {
            bail!("TIMEFRAMES must name at least one timeframe");
        }
        for tf in &self.entry_timeframes {
            if !self.timeframes.contains(tf) {
                bail!("ENTRY_TIMEFRAMES contains {tf} which is not in TIMEFRAMES");
            }
        }
        for tf in &self.htf_timeframes {
            if !self.timeframes.contains(tf) {
                bail!("HTF_TIMEFRAMES contains {tf} which is not in TIMEFRAMES");
            }
        }
        if !self.stages.setup_enabled && !self.stages.entry_enabled {
            bail!("SIGNAL_STAGE_ENABLED disables both stages; nothing to do");
        }
        if self.analysis.zone_tolerance_pct <= 0.0 {
            bail!("ZONE_TOLERANCE_PCT must be positive");
        }
        if self.analysis.pivot_window == 0 {
            bail!("PIVOT_WINDOW must be at least 1");
        }
        if self.gates.min_rr < 0.0 {
            bail!("MIN_RR must be non-negative");
        }
        if self.gates.cooldown_minutes < 0 {
            bail!("SIGNAL_COOLDOWN_MINUTES must be non-negative");
        }
        if self.analysis.htf_weight_1d < 0.0 || self.analysis.htf_weight_4h < 0.0 {
            bail!("HTF weights must be non-negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-dependent loading is covered in integration tests where the
    // process environment can be controlled; here we exercise presets and
    // validation directly.

    fn base_config() -> Config {
        Config {
            symbols: vec!["BTCUSDT".into()],
            timeframes: vec![Timeframe::D1, Timeframe::H4, Timeframe::H1],
            entry_timeframes: vec![Timeframe::H1],
            htf_timeframes: vec![Timeframe::D1, Timeframe::H4],
            mode: SignalMode::Pro,
            stages: StageCfg {
                setup_enabled: true,
                entry_enabled: true,
            },
            gates: GateCfg {
                min_signal_score: 72.0,
                setup_score_threshold: 0.0,
                entry_score_threshold: 0.0,
                cooldown_minutes: 240,
                min_zones_required: 2,
                min_rr: 1.5,
                require_volume_confirmation: false,
                volume_spike_threshold: 1.5,
            },
            analysis: AnalysisCfg {
                pivot_window: 5,
                zone_lookback: 200,
                zone_tolerance_pct: 0.5,
                zone_sl_buffer_pct: 0.25,
                atr_period: 14,
                sweep_lookback: 10,
                structure_lookback: 3,
                anti_chase_max_atr: 2.0,
                anti_chase_max_pct: 1.5,
                rsi_divergence_bonus: 10.0,
                htf_weight_1d: 0.6,
                htf_weight_4h: 0.4,
            },
            ingest: IngestCfg {
                rest_base_url: "https://fapi.binance.com".into(),
                ws_base_url: "wss://fstream.binance.com".into(),
                backfill_limit: 500,
                intrabar_enabled: false,
                ping_interval_secs: 180,
            },
            notify: NotifyCfg {
                dry_run: true,
                telegram_bot_token: None,
                telegram_chat_id: None,
            },
            database_path: ":memory:".into(),
        }
    }

    #[test]
    fn entry_threshold_prefers_stage_specific_value() {
        let mut cfg = base_config();
        assert_eq!(cfg.gates.entry_threshold(), 72.0);
        cfg.gates.entry_score_threshold = 80.0;
        assert_eq!(cfg.gates.entry_threshold(), 80.0);
    }

    #[test]
    fn validation_rejects_entry_tf_outside_ingested_set() {
        let mut cfg = base_config();
        cfg.entry_timeframes = vec![Timeframe::M15];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_tolerance() {
        let mut cfg = base_config();
        cfg.analysis.zone_tolerance_pct = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zone_tolerance_is_a_fraction() {
        let cfg = base_config();
        assert!((cfg.analysis.zone_tolerance() - 0.005).abs() < 1e-12);
    }
}
