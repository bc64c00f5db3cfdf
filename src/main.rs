use anyhow::{Context, Result};
use log::{error, info, warn};
use std::sync::Arc;
use signal_bot::config::Config;
use signal_bot::connection::{rest, websocket, Connection};
use signal_bot::engine::SignalEngine;
use signal_bot::event_bus::EventBus;
use signal_bot::notify::Sink;
use signal_bot::storage::SignalStorage;
use signal_bot::store::CandleStore;
use signal_bot::logging;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Arc::new(Config::load().context("configuration failed")?);
    info!(
        "Starting signal bot: symbols={:?} timeframes={:?} mode={:?}",
        config.symbols, config.timeframes, config.mode
    );

    let storage = Arc::new(SignalStorage::open(&config.database_path)?);
    let store = CandleStore::new();
    let connection = Arc::new(Connection::new(config.ingest.clone()));
    let sink = Sink::from_config(&config.notify);

    // seed every (symbol, timeframe) series before streaming starts
    for symbol in &config.symbols {
        for tf in &config.timeframes {
            let candles = rest::backfill(
                &connection,
                symbol,
                *tf,
                config.ingest.backfill_limit,
                None,
                None,
            )
            .await
            .with_context(|| format!("backfill failed for {symbol} {tf}"))?;

            let (closed, forming): (Vec<_>, Vec<_>) =
                candles.into_iter().partition(|c| c.is_closed);
            info!("BACKFILL: {symbol} {tf}: {} closed candles", closed.len());
            store.init(symbol, *tf, closed).await;
            if let Some(candle) = forming.into_iter().last() {
                store.set_forming(symbol, *tf, candle).await;
            }
        }
    }

    let bus = EventBus::new(2048, 256);
    let ingest_ch = bus.ingest_channels();
    let engine_ch = bus.engine_channels();
    let logging_ch = bus.logging_channels();
    drop(bus); // the stream task holds the only candle sender

    let engine = SignalEngine::new(
        config.clone(),
        store.clone(),
        storage.clone(),
        sink,
        engine_ch.signal_tx.clone(),
        engine_ch.skip_tx.clone(),
    );

    let engine_handle = tokio::spawn(engine.run(engine_ch));
    let logging_handle = tokio::spawn(logging::run_logging(logging_ch));

    let mut stream_handle = {
        let conn = connection.clone();
        let symbols = config.symbols.clone();
        let timeframes = config.timeframes.clone();
        tokio::spawn(async move {
            websocket::run_kline_stream(conn, symbols, timeframes, ingest_ch).await
        })
    };

    let stream_failure = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, stopping ingestion");
            stream_handle.abort();
            None
        }
        res = &mut stream_handle => match res {
            Ok(Err(err)) => {
                error!("Ingestion escalated: {err:?}");
                Some(err)
            }
            Ok(Ok(())) => None,
            Err(join_err) => {
                warn!("Ingestion task ended abnormally: {join_err:?}");
                None
            }
        },
    };

    // ingestion is gone; the engine drains its channel and stops, then the
    // observers see their senders close
    if let Err(err) = engine_handle.await {
        warn!("Engine task ended abnormally: {err:?}");
    }
    if let Err(err) = logging_handle.await {
        warn!("Logging task ended abnormally: {err:?}");
    }

    match stream_failure {
        Some(err) => Err(err),
        None => {
            info!("Shutdown complete");
            Ok(())
        }
    }
}
