// Exchange wire types (Binance USDS-M futures market streams and REST)

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::core::Candle;

pub(crate) fn ts_ms_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap())
}

#[derive(Debug, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: KlineData,
}

/// Combined-stream envelope: `{"stream":"btcusdt@kline_1h","data":{...}}`
#[derive(Debug, Deserialize)]
pub struct CombinedStreamEvent {
    pub stream: String,
    pub data: KlineEvent,
}

#[derive(Debug, Deserialize)]
pub struct KlineData {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "x")]
    pub is_closed: bool,
}

impl KlineData {
    pub fn to_candle(&self) -> Result<Candle> {
        let parse = |label: &str, raw: &str| -> Result<f64> {
            raw.parse::<f64>()
                .map_err(|e| anyhow!("failed to parse kline {label}: {e}"))
        };
        Ok(Candle {
            open_time: ts_ms_to_utc(self.open_time),
            close_time: ts_ms_to_utc(self.close_time),
            open: parse("open", &self.open)?,
            high: parse("high", &self.high)?,
            low: parse("low", &self.low)?,
            close: parse("close", &self.close)?,
            volume: parse("volume", &self.volume)?,
            is_closed: self.is_closed,
        })
    }
}

/// REST `/fapi/v1/klines` rows are positional arrays; parsed leniently the
/// same way the stream parser treats malformed rows (skip, don't fail).
pub(crate) fn candle_from_kline_row(row: &serde_json::Value) -> Option<Candle> {
    let arr = row.as_array()?;
    if arr.len() < 7 {
        return None;
    }
    Some(Candle {
        open_time: ts_ms_to_utc(arr[0].as_i64()?),
        close_time: ts_ms_to_utc(arr[6].as_i64()?),
        open: arr[1].as_str()?.parse().ok()?,
        high: arr[2].as_str()?.parse().ok()?,
        low: arr[3].as_str()?.parse().ok()?,
        close: arr[4].as_str()?.parse().ok()?,
        volume: arr[5].as_str()?.parse().ok()?,
        is_closed: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_combined_stream_kline() {
        let raw = r#"{
            "stream": "btcusdt@kline_1h",
            "data": {
                "e": "kline", "E": 1700003600123, "s": "BTCUSDT",
                "k": {
                    "t": 1700000000000, "T": 1700003599999,
                    "s": "BTCUSDT", "i": "1h",
                    "o": "35000.1", "c": "35250.0", "h": "35300.0", "l": "34900.5",
                    "v": "1234.5", "x": true
                }
            }
        }"#;
        let event: CombinedStreamEvent = serde_json::from_str(raw).unwrap();
        let candle = event.data.kline.to_candle().unwrap();
        assert_eq!(event.data.symbol, "BTCUSDT");
        assert!(candle.is_closed);
        assert_eq!(candle.close, 35250.0);
        assert!(candle.is_valid());
    }

    #[test]
    fn kline_row_parsing_skips_malformed_rows() {
        let good = json!([1700000000000i64, "1.0", "2.0", "0.5", "1.5", "100.0", 1700003599999i64, "0", 0, "0", "0", "0"]);
        let short = json!([1700000000000i64, "1.0"]);
        assert!(candle_from_kline_row(&good).is_some());
        assert!(candle_from_kline_row(&short).is_none());
    }
}
