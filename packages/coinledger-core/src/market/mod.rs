//! Market data: the price feed seam and its implementations.

mod snapshot;

pub use snapshot::MarketSnapshot;

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Latest traded price for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Source of current prices.
///
/// Called once per open position per refresh cycle. A failure is reported
/// for that position only; the ledger keeps going with the others.
pub trait PriceFeed {
    fn latest_price(&self, symbol: &str) -> Result<PriceQuote>;
}

impl<T: PriceFeed + ?Sized> PriceFeed for &T {
    fn latest_price(&self, symbol: &str) -> Result<PriceQuote> {
        (**self).latest_price(symbol)
    }
}

/// In-memory price table with per-symbol outage switches.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceFeed {
    prices: HashMap<String, Decimal>,
    unavailable: HashSet<String>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn set_price(&mut self, symbol: &str, price: Decimal) {
        self.prices.insert(symbol.to_uppercase(), price);
    }

    /// Make every lookup of `symbol` fail until [`restore`](Self::restore).
    pub fn fail(&mut self, symbol: &str) {
        self.unavailable.insert(symbol.to_uppercase());
    }

    pub fn restore(&mut self, symbol: &str) {
        self.unavailable.remove(&symbol.to_uppercase());
    }
}

impl PriceFeed for StaticPriceFeed {
    fn latest_price(&self, symbol: &str) -> Result<PriceQuote> {
        let symbol = symbol.to_uppercase();
        if self.unavailable.contains(&symbol) {
            return Err(Error::PriceFeedUnavailable {
                symbol,
                reason: "feed offline".to_string(),
            });
        }

        match self.prices.get(&symbol) {
            Some(price) => Ok(PriceQuote {
                symbol,
                price: *price,
                timestamp: Utc::now(),
            }),
            None => Err(Error::PriceFeedUnavailable {
                symbol,
                reason: "no price".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_feed_lookup() {
        let feed = StaticPriceFeed::new().with_price("btcusdt", Decimal::from(30000));
        let quote = feed.latest_price("BTCUSDT").unwrap();
        assert_eq!(quote.symbol, "BTCUSDT");
        assert_eq!(quote.price, Decimal::from(30000));
    }

    #[test]
    fn test_static_feed_missing_symbol() {
        let feed = StaticPriceFeed::new();
        let result = feed.latest_price("ETHUSDT");
        assert!(matches!(
            result,
            Err(Error::PriceFeedUnavailable { ref symbol, .. }) if symbol == "ETHUSDT"
        ));
    }

    #[test]
    fn test_static_feed_outage() {
        let mut feed = StaticPriceFeed::new().with_price("ETHUSDT", Decimal::ONE);
        feed.fail("ethusdt");
        assert!(feed.latest_price("ETHUSDT").is_err());

        feed.restore("ETHUSDT");
        assert!(feed.latest_price("ETHUSDT").is_ok());
    }

    #[test]
    fn test_feed_through_reference() {
        fn price_of(feed: impl PriceFeed, symbol: &str) -> Decimal {
            feed.latest_price(symbol).unwrap().price
        }

        let feed = StaticPriceFeed::new().with_price("SOLUSDT", Decimal::from(21));
        assert_eq!(price_of(&feed, "SOLUSDT"), Decimal::from(21));
    }
}
