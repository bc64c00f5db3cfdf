// REST backfill of historical klines. Rows arrive as positional arrays in
// ascending open_time; malformed rows are skipped rather than failing the
// whole batch.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use reqwest::Url;

use super::Connection;
use crate::types::api::candle_from_kline_row;
use crate::types::{Candle, Timeframe};

/// Fetch up to `limit` candles for a symbol/timeframe, optionally bounded
/// by a time range. The exchange includes the still-forming candle as the
/// last row; it is returned with `is_closed=false` so the store can keep it
/// out of the closed sequence.
pub async fn backfill(
    conn: &Connection,
    symbol: &str,
    tf: Timeframe,
    limit: u32,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
) -> Result<Vec<Candle>> {
    let mut url = Url::parse(&format!("{}/fapi/v1/klines", conn.rest_base()))?;
    url.query_pairs_mut()
        .append_pair("symbol", symbol)
        .append_pair("interval", tf.as_str())
        .append_pair("limit", &limit.to_string());
    if let Some(start) = start_time {
        url.query_pairs_mut()
            .append_pair("startTime", &start.timestamp_millis().to_string());
    }
    if let Some(end) = end_time {
        url.query_pairs_mut()
            .append_pair("endTime", &end.timestamp_millis().to_string());
    }

    let res = conn.http.get(url).send().await?;
    if !res.status().is_success() {
        bail!("klines error for {symbol} {tf}: {}", res.text().await?);
    }

    let raw: Vec<serde_json::Value> = res.json().await?;
    let now = Utc::now();
    let candles = raw
        .iter()
        .filter_map(candle_from_kline_row)
        .map(|mut candle| {
            // the final row is still forming until its close_time passes
            if candle.close_time > now {
                candle.is_closed = false;
            }
            candle
        })
        .collect();

    Ok(candles)
}

/// Closed candles only, for store seeding.
pub async fn backfill_closed(
    conn: &Connection,
    symbol: &str,
    tf: Timeframe,
    limit: u32,
) -> Result<Vec<Candle>> {
    let candles = backfill(conn, symbol, tf, limit, None, None).await?;
    Ok(candles.into_iter().filter(|c| c.is_closed).collect())
}
