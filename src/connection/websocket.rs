// Combined kline stream with exponential reconnect, liveness pings, and
// gap backfill after reconnects. Closed candles are forwarded at most once
// per (symbol, timeframe, open_time).

use anyhow::{anyhow, bail, Result};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{interval, sleep, Duration},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{rest, Connection};
use crate::types::api::CombinedStreamEvent;
use crate::types::{CandleEvent, IngestChannels, Timeframe};

/// Consecutive failed connection attempts before the stream escalates.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Candles refetched per (symbol, timeframe) after a reconnect.
const GAP_BACKFILL_LIMIT: u32 = 100;

/// Run the combined kline stream until the engine goes away or reconnection
/// attempts are exhausted (escalated to the caller as an error).
pub async fn run_kline_stream(
    conn: Arc<Connection>,
    symbols: Vec<String>,
    timeframes: Vec<Timeframe>,
    ch: IngestChannels,
) -> Result<()> {
    let url = combined_stream_url(&conn, &symbols, &timeframes);
    let mut retry_delay = Duration::from_secs(1);
    let mut failed_attempts: u32 = 0;
    let mut connected_before = false;
    // last forwarded closed open_time per (symbol, timeframe)
    let mut last_closed: HashMap<(String, Timeframe), i64> = HashMap::new();

    loop {
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("CONNECTION: kline stream connected ({url})");
                retry_delay = Duration::from_secs(1);
                failed_attempts = 0;

                if connected_before {
                    backfill_gap(&conn, &symbols, &timeframes, &ch).await;
                }
                connected_before = true;

                let (mut write, mut read) = ws_stream.split();
                let mut ping = interval(Duration::from_secs(conn.cfg.ping_interval_secs.max(1)));
                ping.tick().await; // the first tick fires immediately

                loop {
                    tokio::select! {
                        message = read.next() => {
                            let message = match message {
                                Some(m) => m,
                                None => {
                                    warn!("CONNECTION: kline stream ended");
                                    break;
                                }
                            };
                            match extract_text(&mut write, message).await {
                                Ok(Some(txt)) => {
                                    if let Err(err) =
                                        forward_kline(&txt, &ch.candle_tx, &mut last_closed).await
                                    {
                                        warn!("CONNECTION: {err:?}");
                                        return Err(err);
                                    }
                                }
                                Ok(None) => {}
                                Err(err) => {
                                    warn!("CONNECTION: kline stream error: {err:?}");
                                    break;
                                }
                            }
                        }
                        _ = ping.tick() => {
                            if write.send(Message::Ping(Vec::new())).await.is_err() {
                                warn!("CONNECTION: ping failed, reconnecting");
                                break;
                            }
                        }
                    }
                }
            }
            Err(err) => {
                warn!("CONNECTION: kline connect error: {err:?}");
                failed_attempts += 1;
                if failed_attempts >= MAX_RECONNECT_ATTEMPTS {
                    bail!("kline stream failed {failed_attempts} consecutive connection attempts");
                }
            }
        }

        info!(
            "CONNECTION: kline stream reconnecting in {}s",
            retry_delay.as_secs()
        );
        sleep(retry_delay).await;
        retry_delay = (retry_delay * 2).min(Duration::from_secs(60));
    }
}

/// `wss://.../stream?streams=btcusdt@kline_1h/btcusdt@kline_4h/...`
fn combined_stream_url(conn: &Connection, symbols: &[String], timeframes: &[Timeframe]) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .flat_map(|symbol| {
            let symbol = symbol.to_lowercase();
            timeframes
                .iter()
                .map(move |tf| format!("{symbol}@kline_{tf}"))
                .collect::<Vec<_>>()
        })
        .collect();
    format!("{}/stream?streams={}", conn.ws_base(), streams.join("/"))
}

/// Parse and forward a kline event. Closed candles are deduplicated per
/// open_time so one close produces exactly one event downstream. An error
/// here means the engine receiver is gone.
async fn forward_kline(
    txt: &str,
    candle_tx: &mpsc::Sender<CandleEvent>,
    last_closed: &mut HashMap<(String, Timeframe), i64>,
) -> Result<()> {
    let event: CombinedStreamEvent = match serde_json::from_str(txt) {
        Ok(event) => event,
        Err(_) => {
            debug!("CONNECTION: ignoring non-kline payload");
            return Ok(());
        }
    };
    let kline = &event.data.kline;
    let timeframe = match Timeframe::from_str(&kline.interval) {
        Ok(tf) => tf,
        Err(_) => return Ok(()),
    };
    let candle = match kline.to_candle() {
        Ok(candle) => candle,
        Err(err) => {
            warn!("CONNECTION: dropping malformed kline: {err:?}");
            return Ok(());
        }
    };

    if candle.is_closed {
        let key = (event.data.symbol.clone(), timeframe);
        if last_closed.get(&key) == Some(&kline.open_time) {
            return Ok(());
        }
        last_closed.insert(key, kline.open_time);
    }

    candle_tx
        .send(CandleEvent {
            symbol: event.data.symbol,
            timeframe,
            candle,
        })
        .await
        .map_err(|_| anyhow!("candle receiver dropped"))
}

/// Refill whatever closed candles were missed while disconnected. The
/// engine's upsert ignores anything it already has.
async fn backfill_gap(
    conn: &Connection,
    symbols: &[String],
    timeframes: &[Timeframe],
    ch: &IngestChannels,
) {
    for symbol in symbols {
        for tf in timeframes {
            match rest::backfill_closed(conn, symbol, *tf, GAP_BACKFILL_LIMIT).await {
                Ok(candles) => {
                    debug!(
                        "CONNECTION: gap backfill {symbol} {tf}: {} candles",
                        candles.len()
                    );
                    for candle in candles {
                        if ch
                            .candle_tx
                            .send(CandleEvent {
                                symbol: symbol.clone(),
                                timeframe: *tf,
                                candle,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                Err(err) => warn!("CONNECTION: gap backfill failed for {symbol} {tf}: {err:?}"),
            }
        }
    }
}

type WsWriter = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Text payloads pass through; server pings are answered inline; close
/// frames and transport errors end the session.
async fn extract_text(
    write: &mut WsWriter,
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Result<Option<String>> {
    match message {
        Ok(Message::Text(txt)) => Ok(Some(txt)),
        Ok(Message::Ping(payload)) => {
            if let Err(err) = write.send(Message::Pong(payload)).await {
                return Err(anyhow!("failed to answer ping: {err:?}"));
            }
            Ok(None)
        }
        Ok(Message::Close(frame)) => Err(anyhow!("server closed the stream: {frame:?}")),
        Ok(_) => Ok(None),
        Err(err) => Err(anyhow!("websocket error: {err:?}")),
    }
}
