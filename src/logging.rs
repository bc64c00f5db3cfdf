use crate::types::LoggingChannels;
use log::info;
use tokio::sync::broadcast;

/// Observer loop over emitted signals and gate-miss records. Purely
/// informational; delivery already happened in the engine.
pub async fn run_logging(ch: LoggingChannels) {
    let mut signal_rx = ch.signal_rx;
    let mut skip_rx = ch.skip_rx;

    loop {
        tokio::select! {
            res = signal_rx.recv() => match res {
                Ok(event) => {
                    let signal = &event.signal;
                    info!(
                        "LOG Signal [{}] {} {} {} score={:.1} rr={:.2} delivered={} zone={}",
                        signal.stage.as_str(),
                        signal.symbol,
                        signal.timeframe,
                        signal.side.as_str(),
                        signal.score,
                        signal.levels.risk_reward1,
                        event.delivered,
                        signal.setup.zone_key(),
                    );
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            res = skip_rx.recv() => match res {
                Ok(skip) => info!(
                    "LOG Skip {} {} reason={} details={}",
                    skip.symbol,
                    skip.timeframe,
                    skip.reason.as_str(),
                    if skip.details.is_empty() { "-" } else { skip.details.as_str() },
                ),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
