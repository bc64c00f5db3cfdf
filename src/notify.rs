// Notification delivery. The engine only sees `Sink::send_signal`; message
// formatting lives here. Delivery failure must leave the signal unpersisted
// and the cooldown unarmed so a retry remains possible.

use log::{error, info, warn};
use reqwest::Client;
use std::time::Duration;

use crate::config::NotifyCfg;
use crate::types::Signal;

pub enum Sink {
    Telegram(TelegramSink),
    Log(LogSink),
}

impl Sink {
    /// Telegram when credentials are configured and DRY_RUN is off,
    /// otherwise the log sink.
    pub fn from_config(cfg: &NotifyCfg) -> Self {
        match (&cfg.telegram_bot_token, &cfg.telegram_chat_id) {
            (Some(token), Some(chat_id)) if !cfg.dry_run => {
                Sink::Telegram(TelegramSink::new(token.clone(), chat_id.clone()))
            }
            (Some(_), Some(_)) => {
                info!("NOTIFY: DRY_RUN enabled, signals go to the log only");
                Sink::Log(LogSink)
            }
            _ => {
                warn!("NOTIFY: telegram credentials missing, signals go to the log only");
                Sink::Log(LogSink)
            }
        }
    }

    pub async fn send_signal(&self, signal: &Signal) -> bool {
        match self {
            Sink::Telegram(sink) => sink.send(signal).await,
            Sink::Log(sink) => sink.send(signal),
        }
    }
}

pub struct TelegramSink {
    http: Client,
    token: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(token: String, chat_id: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build http client");
        Self {
            http,
            token,
            chat_id,
        }
    }

    async fn send(&self, signal: &Signal) -> bool {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": format_message(signal),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(res) if res.status().is_success() => true,
            Ok(res) => {
                error!(
                    "NOTIFY: telegram rejected signal {}: {}",
                    signal.id,
                    res.status()
                );
                false
            }
            Err(err) => {
                error!("NOTIFY: telegram send failed for {}: {err:?}", signal.id);
                false
            }
        }
    }
}

pub struct LogSink;

impl LogSink {
    fn send(&self, signal: &Signal) -> bool {
        info!(
            "NOTIFY: [{}] {} {} {} score={:.1} entry={:.2} sl={:.2} tp1={:.2} rr={:.2} ({})",
            signal.stage.as_str(),
            signal.symbol,
            signal.timeframe,
            signal.side.as_str(),
            signal.score,
            signal.levels.entry,
            signal.levels.stop_loss,
            signal.levels.take_profit1,
            signal.levels.risk_reward1,
            signal.setup.name,
        );
        true
    }
}

fn format_message(signal: &Signal) -> String {
    let mut lines = vec![
        format!(
            "<b>{} {} {}</b> [{}]",
            signal.symbol,
            signal.side.as_str(),
            signal.timeframe,
            signal.stage.as_str(),
        ),
        format!("Setup: {}", signal.setup.name),
        format!("Score: {:.0} (htf {:.0} / setup {:.0} / candle {:.0} / vol {:.0})",
            signal.score,
            signal.breakdown.htf,
            signal.breakdown.setup_quality,
            signal.breakdown.candle,
            signal.breakdown.volume,
        ),
        format!("Entry: {:.4}", signal.levels.entry),
        format!("SL: {:.4}", signal.levels.stop_loss),
        format!("TP1: {:.4} (R:R {:.2})", signal.levels.take_profit1, signal.levels.risk_reward1),
    ];
    if let (Some(tp2), Some(rr2)) = (signal.levels.take_profit2, signal.levels.risk_reward2) {
        lines.push(format!("TP2: {tp2:.4} (R:R {rr2:.2})"));
    }
    if let Some(event) = &signal.structure_event {
        lines.push(format!("Structure: {} at {:.4}", event.kind.as_str(), event.level));
    }
    if let Some(sweep) = &signal.sweep {
        lines.push(format!("Sweep of {:.4} (strength {:.2})", sweep.reference, sweep.strength));
    }
    if let Some(chase) = &signal.chase {
        lines.push(format!("Chase: {} ({})", chase.decision.as_str(), chase.reason));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_signal() -> Signal {
        Signal {
            id: Uuid::new_v4(),
            stage: SignalStage::Entry,
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::H1,
            side: Side::Long,
            score: 82.5,
            breakdown: ScoreBreakdown {
                htf: 30.0,
                setup_quality: 28.0,
                candle: 14.5,
                volume: 10.0,
                rsi_divergence: 0.0,
                total: 82.5,
            },
            setup: Setup {
                kind: SetupKind::Reversal,
                side: Side::Long,
                name: "Hammer at support".to_string(),
                price: 43200.0,
                zone: None,
                zones: ZoneSet::default(),
                pattern: None,
                confirmed: None,
                volume_spike: Some(true),
                volume_ratio: Some(1.85),
            },
            htf_bias: HtfBias::default(),
            regime: None,
            structure_event: None,
            sweep: None,
            divergence: None,
            volume_ratio: 1.85,
            levels: Levels {
                entry: 43200.0,
                stop_loss: 42950.0,
                take_profit1: 43900.0,
                take_profit2: Some(44500.0),
                risk_reward1: 2.8,
                risk_reward2: Some(5.2),
                sl_zone: None,
                tp_zones: vec![],
            },
            chase: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn message_carries_levels_and_stage() {
        let msg = format_message(&sample_signal());
        assert!(msg.contains("BTCUSDT LONG"));
        assert!(msg.contains("[ENTRY]"));
        assert!(msg.contains("TP2"));
        assert!(msg.contains("Hammer at support"));
    }

    #[tokio::test]
    async fn log_sink_always_succeeds() {
        let sink = Sink::Log(LogSink);
        assert!(sink.send_signal(&sample_signal()).await);
    }
}
