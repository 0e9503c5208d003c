//! File-backed market snapshot built from the exchange 24h ticker list.

use super::{PriceFeed, PriceQuote};
use crate::types::Coin;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Set of coin snapshots keyed by pair symbol.
///
/// Loaded from a cached ticker response (a JSON array of 24h ticker records).
/// Also acts as the price feed and as the resolver that turns a free-text
/// query into a coin.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    coins: BTreeMap<String, Coin>,
    loaded_at: DateTime<Utc>,
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self::from_coins(Vec::new())
    }
}

impl MarketSnapshot {
    /// Build a snapshot from coins. Later duplicates replace earlier ones.
    pub fn from_coins(coins: impl IntoIterator<Item = Coin>) -> Self {
        Self {
            coins: coins
                .into_iter()
                .map(|coin| (coin.symbol.to_uppercase(), coin))
                .collect(),
            loaded_at: Utc::now(),
        }
    }

    /// Get the default market file path.
    ///
    /// Default path: `<home>/market.json`
    /// Can be overridden with `COINLEDGER_MARKET_FILE` environment variable.
    pub fn default_path(home: &Path) -> PathBuf {
        if let Ok(path) = env::var("COINLEDGER_MARKET_FILE") {
            return PathBuf::from(path);
        }
        home.join("market.json")
    }

    /// Load a snapshot from disk. A missing file gives an empty snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No market file, starting empty");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let coins: Vec<Coin> = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), coins = coins.len(), "Loaded market snapshot");
        Ok(Self::from_coins(coins))
    }

    /// Write the snapshot back as a ticker list.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let coins: Vec<&Coin> = self.coins.values().collect();
        let content = serde_json::to_string_pretty(&coins)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    /// All coins, ordered by symbol.
    pub fn coins(&self) -> impl Iterator<Item = &Coin> {
        self.coins.values()
    }

    /// Find a coin by exact pair symbol (case-insensitive).
    pub fn get(&self, symbol: &str) -> Option<&Coin> {
        self.coins.get(&symbol.trim().to_uppercase())
    }

    /// Coins matching a free-text query, best match first.
    ///
    /// Ranking: exact pair symbol, then exact base asset (`btc` -> `BTCUSDT`),
    /// then any symbol or name containing the query. Ties keep symbol order.
    pub fn search(&self, query: &str) -> Vec<&Coin> {
        let needle = query.trim().to_uppercase();
        let mut found: Vec<(u8, &Coin)> = self
            .coins
            .values()
            .filter(|coin| coin.matches(&needle))
            .map(|coin| {
                let rank = if coin.symbol == needle {
                    0
                } else if coin.base_asset() == needle {
                    1
                } else {
                    2
                };
                (rank, coin)
            })
            .collect();
        found.sort_by_key(|(rank, _)| *rank);
        found.into_iter().map(|(_, coin)| coin).collect()
    }

    /// Resolve a query to its best-matching coin.
    pub fn resolve(&self, query: &str) -> Result<&Coin> {
        self.search(query)
            .into_iter()
            .next()
            .ok_or_else(|| Error::CoinNotFound(query.trim().to_string()))
    }

    /// Replace a coin's snapshot with one at a new last price.
    ///
    /// Unknown symbols are added. Other statistics carry over from the
    /// previous snapshot; the 24h high/low widen to include the new price.
    pub fn set_price(&mut self, symbol: &str, price: Decimal) -> Result<&Coin> {
        if price <= Decimal::ZERO {
            return Err(Error::InvalidPrice(price));
        }

        let symbol = symbol.trim().to_uppercase();
        let coin = match self.coins.get(&symbol) {
            Some(previous) => Coin {
                last_price: price,
                price_change: price - previous.last_price + previous.price_change,
                high_price: previous.high_price.max(price),
                low_price: previous.low_price.min(price),
                close_time: Some(Utc::now().timestamp_millis()),
                ..previous.clone()
            },
            None => Coin {
                close_time: Some(Utc::now().timestamp_millis()),
                ..Coin::new(&symbol, price)
            },
        };

        self.coins.insert(symbol.clone(), coin);
        Ok(&self.coins[&symbol])
    }
}

impl PriceFeed for MarketSnapshot {
    fn latest_price(&self, symbol: &str) -> Result<PriceQuote> {
        let coin = self.get(symbol).ok_or_else(|| Error::PriceFeedUnavailable {
            symbol: symbol.to_uppercase(),
            reason: "not in market snapshot".to_string(),
        })?;

        Ok(PriceQuote {
            symbol: coin.symbol.clone(),
            price: coin.last_price,
            timestamp: coin.quoted_at().unwrap_or(self.loaded_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn d(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn market() -> MarketSnapshot {
        MarketSnapshot::from_coins(vec![
            Coin::new("BTCUSDT", d("30000")).with_name("Bitcoin"),
            Coin::new("BTCBUSD", d("30010")).with_name("Bitcoin"),
            Coin::new("WBTCUSDT", d("29990")).with_name("Wrapped Bitcoin"),
            Coin::new("ETHUSDT", d("2000")).with_name("Ethereum"),
        ])
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let market = market();
        assert!(market.get("ethusdt").is_some());
        assert!(market.get("DOGEUSDT").is_none());
    }

    #[test]
    fn test_search_ranks_exact_matches_first() {
        let market = market();

        let hits: Vec<_> = market.search("btc").iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(hits, vec!["BTCBUSD", "BTCUSDT", "WBTCUSDT"]);

        let hits: Vec<_> = market
            .search("btcusdt")
            .iter()
            .map(|c| c.symbol.as_str())
            .collect();
        assert_eq!(hits[0], "BTCUSDT");
    }

    #[test]
    fn test_search_by_name() {
        let market = market();
        let hits = market.search("ethereum");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "ETHUSDT");
    }

    #[test]
    fn test_resolve_not_found() {
        let market = market();
        assert!(matches!(
            market.resolve("doge"),
            Err(Error::CoinNotFound(ref q)) if q == "doge"
        ));
    }

    #[test]
    fn test_price_feed_lookup() {
        let market = market();
        let quote = market.latest_price("ethusdt").unwrap();
        assert_eq!(quote.price, d("2000"));
        assert!(market.latest_price("DOGEUSDT").is_err());
    }

    #[test]
    fn test_set_price_replaces_snapshot() {
        let mut market = market();
        let before = market.get("ETHUSDT").unwrap().clone();

        let after = market.set_price("ethusdt", d("2100")).unwrap().clone();

        assert_eq!(after.last_price, d("2100"));
        assert_eq!(after.high_price, d("2100"));
        assert_eq!(after.name, before.name);
        assert_eq!(before.last_price, d("2000"));
        assert!(market.set_price("ETHUSDT", Decimal::ZERO).is_err());
    }

    #[test]
    fn test_set_price_adds_unknown_symbol() {
        let mut market = market();
        market.set_price("dogeusdt", d("0.07")).unwrap();
        assert_eq!(market.len(), 5);
        assert_eq!(market.get("DOGEUSDT").unwrap().last_price, d("0.07"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let market = MarketSnapshot::load(&dir.path().join("market.json")).unwrap();
        assert!(market.is_empty());
    }

    #[test]
    fn test_load_ticker_response() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("market.json");
        fs::write(
            &path,
            r#"[
                {"symbol": "BNBBUSD", "lastPrice": "245.30000000", "highPrice": "250.1",
                 "lowPrice": "240.0", "volume": "1000", "closeTime": 1672531199999},
                {"symbol": "ADABUSD", "lastPrice": "0.24560000"}
            ]"#,
        )
        .unwrap();

        let market = MarketSnapshot::load(&path).unwrap();
        assert_eq!(market.len(), 2);
        assert_eq!(market.get("BNBBUSD").unwrap().last_price, d("245.3"));
        assert_eq!(market.resolve("ada").unwrap().symbol, "ADABUSD");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/market.json");

        let mut market = market();
        market.set_price("ETHUSDT", d("1999.5")).unwrap();
        market.save(&path).unwrap();

        let reloaded = MarketSnapshot::load(&path).unwrap();
        assert_eq!(reloaded.len(), 4);
        assert_eq!(reloaded.get("ETHUSDT").unwrap().last_price, d("1999.5"));
        assert_eq!(
            reloaded.get("BTCUSDT").unwrap().name.as_deref(),
            Some("Bitcoin")
        );
    }
}
