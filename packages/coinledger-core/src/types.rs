//! Core data types for the coinledger system.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quote assets stripped from a pair symbol when showing the traded coin.
const QUOTE_ASSETS: [&str; 4] = ["BUSD", "USDT", "USDC", "USD"];

/// Identity of an open position.
///
/// Assigned by the ledger when a position is opened and never reused, including
/// for the residual position left behind by a partial close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for PositionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Market snapshot of a trading pair.
///
/// Field names follow the exchange 24h ticker payload, so a cached ticker
/// response deserializes directly. Numeric fields arrive as strings and are
/// parsed into exact decimals. A snapshot is never mutated after it is
/// fetched; newer data replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Coin {
    /// Pair symbol (uppercase), e.g. `BTCUSDT`
    pub symbol: String,
    /// Human-readable coin name, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Last traded price
    pub last_price: Decimal,
    /// Absolute 24h price change
    #[serde(default)]
    pub price_change: Decimal,
    /// 24h price change in percent
    #[serde(default)]
    pub price_change_percent: Decimal,
    /// 24h high
    #[serde(default)]
    pub high_price: Decimal,
    /// 24h low
    #[serde(default)]
    pub low_price: Decimal,
    /// 24h traded volume in the base asset
    #[serde(default)]
    pub volume: Decimal,
    /// 24h traded volume in the quote asset
    #[serde(default)]
    pub quote_volume: Decimal,
    /// End of the 24h statistics window, milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_time: Option<i64>,
}

impl Coin {
    /// Create a snapshot carrying only a symbol and last price.
    pub fn new(symbol: &str, last_price: Decimal) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            name: None,
            last_price,
            price_change: Decimal::ZERO,
            price_change_percent: Decimal::ZERO,
            high_price: last_price,
            low_price: last_price,
            volume: Decimal::ZERO,
            quote_volume: Decimal::ZERO,
            close_time: None,
        }
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// The traded coin without its quote asset (`BTCUSDT` -> `BTC`).
    pub fn base_asset(&self) -> &str {
        QUOTE_ASSETS
            .iter()
            .find_map(|quote| {
                self.symbol
                    .strip_suffix(quote)
                    .filter(|base| !base.is_empty())
            })
            .unwrap_or(&self.symbol)
    }

    /// When the exchange produced this snapshot, if it said so.
    pub fn quoted_at(&self) -> Option<DateTime<Utc>> {
        self.close_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Whether a free-text query names this coin.
    ///
    /// Matches case-insensitively against the pair symbol and the display name.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_uppercase();
        if query.is_empty() {
            return false;
        }
        self.symbol.contains(&query)
            || self
                .name
                .as_deref()
                .is_some_and(|name| name.to_uppercase().contains(&query))
    }
}

/// API response wrapper used for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl<T> From<crate::Result<T>> for ApiResponse<T> {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_new() {
        let coin = Coin::new("btcusdt", Decimal::from(30000));
        assert_eq!(coin.symbol, "BTCUSDT");
        assert_eq!(coin.last_price, Decimal::from(30000));
        assert!(coin.name.is_none());
    }

    #[test]
    fn test_coin_from_ticker_json() {
        let json = r#"{
            "symbol": "ETHBUSD",
            "priceChange": "-12.50000000",
            "priceChangePercent": "-0.712",
            "weightedAvgPrice": "1750.10",
            "lastPrice": "1742.31000000",
            "highPrice": "1790.00000000",
            "lowPrice": "1730.02000000",
            "volume": "12345.6789",
            "quoteVolume": "21500000.12",
            "openTime": 1672444800000,
            "closeTime": 1672531199999,
            "count": 52100
        }"#;

        let coin: Coin = serde_json::from_str(json).unwrap();
        assert_eq!(coin.symbol, "ETHBUSD");
        assert_eq!(coin.last_price, "1742.31".parse::<Decimal>().unwrap());
        assert_eq!(coin.price_change, "-12.5".parse::<Decimal>().unwrap());
        assert_eq!(coin.base_asset(), "ETH");
        assert!(coin.quoted_at().is_some());
    }

    #[test]
    fn test_base_asset() {
        assert_eq!(Coin::new("BTCUSDT", Decimal::ONE).base_asset(), "BTC");
        assert_eq!(Coin::new("SOLBUSD", Decimal::ONE).base_asset(), "SOL");
        assert_eq!(Coin::new("ETHBTC", Decimal::ONE).base_asset(), "ETHBTC");
        assert_eq!(Coin::new("USDT", Decimal::ONE).base_asset(), "USDT");
    }

    #[test]
    fn test_coin_matches() {
        let coin = Coin::new("ADAUSDT", Decimal::ONE).with_name("Cardano");
        assert!(coin.matches("ada"));
        assert!(coin.matches("cardano"));
        assert!(coin.matches(" ADAUSDT "));
        assert!(!coin.matches("btc"));
        assert!(!coin.matches(""));
    }

    #[test]
    fn test_position_id_display() {
        assert_eq!(PositionId(7).to_string(), "#7");
    }

    #[test]
    fn test_api_response() {
        let response: ApiResponse<String> = ApiResponse::ok("test".to_string());
        assert!(response.ok);
        assert_eq!(response.data, Some("test".to_string()));

        let err_response: ApiResponse<String> = ApiResponse::err("error");
        assert!(!err_response.ok);
        assert_eq!(err_response.error, Some("error".to_string()));
    }

    #[test]
    fn test_api_response_from_result() {
        let failed: crate::Result<u32> = Err(crate::Error::CoinNotFound("XYZ".to_string()));
        let response = ApiResponse::from(failed);
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("Coin not found: XYZ"));
    }
}
