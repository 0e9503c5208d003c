//! Wallet persistence as JSON records keyed by wallet id.

use crate::ledger::LedgerState;
use crate::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads and saves wallet records under a data directory.
///
/// Each wallet lives in `<root>/wallets/<wallet_id>.json`. Saves overwrite;
/// the last write wins.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    root: PathBuf,
}

impl LedgerStore {
    /// Create a store at the default data directory.
    ///
    /// Default path: `~/.coinledger`
    /// Can be overridden with `COINLEDGER_HOME` environment variable.
    pub fn new() -> Self {
        Self::with_root(Self::default_root())
    }

    /// Create a store rooted at a custom directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the default data directory.
    pub fn default_root() -> PathBuf {
        if let Ok(path) = env::var("COINLEDGER_HOME") {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".coinledger"))
            .unwrap_or_else(|| PathBuf::from(".coinledger"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a wallet's record.
    pub fn path_for(&self, wallet_id: &str) -> Result<PathBuf> {
        validate_wallet_id(wallet_id)?;
        Ok(self
            .root
            .join("wallets")
            .join(format!("{wallet_id}.json")))
    }

    /// Load a wallet, falling back to an empty one.
    ///
    /// A missing record gives a fresh wallet. An unreadable or corrupt record
    /// is logged, moved aside to `<wallet_id>.json.corrupt`, and also gives a
    /// fresh wallet, so a later save cannot overwrite it. An invalid wallet id
    /// or a record that cannot be moved aside is an error.
    pub fn load(&self, wallet_id: &str) -> Result<LedgerState> {
        let path = self.path_for(wallet_id)?;
        match Self::read(&path, wallet_id) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(
                    wallet = wallet_id,
                    path = %path.display(),
                    error = %e,
                    "Wallet record unreadable, starting with an empty ledger"
                );
                Self::quarantine(&path)?;
                Ok(LedgerState::new(wallet_id))
            }
        }
    }

    /// Path a corrupt record is moved to.
    pub fn corrupt_path_for(&self, wallet_id: &str) -> Result<PathBuf> {
        Ok(self.path_for(wallet_id)?.with_extension("json.corrupt"))
    }

    fn quarantine(path: &Path) -> Result<()> {
        let target = path.with_extension("json.corrupt");
        fs::rename(path, &target)?;
        tracing::warn!(path = %target.display(), "Corrupt wallet record kept");
        Ok(())
    }

    /// Load a wallet, propagating read and parse errors.
    pub fn try_load(&self, wallet_id: &str) -> Result<LedgerState> {
        let path = self.path_for(wallet_id)?;
        Self::read(&path, wallet_id)
    }

    fn read(path: &Path, wallet_id: &str) -> Result<LedgerState> {
        if !path.exists() {
            return Ok(LedgerState::new(wallet_id));
        }

        let content = fs::read_to_string(path)?;
        let mut state: LedgerState = serde_json::from_str(&content)?;
        if state.wallet_id() != wallet_id {
            tracing::warn!(
                wallet = wallet_id,
                recorded = state.wallet_id(),
                "Wallet record carries a different id, keeping the file name"
            );
            state.set_wallet_id(wallet_id);
        }
        Ok(state)
    }

    /// Save a wallet, stamping its timestamps. Returns the record path.
    pub fn save(&self, state: &mut LedgerState) -> Result<PathBuf> {
        let path = self.path_for(state.wallet_id())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        state.touch();
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content)?;
        tracing::debug!(wallet = state.wallet_id(), path = %path.display(), "Wallet saved");
        Ok(path)
    }

    /// Ids of all stored wallets, sorted.
    pub fn wallets(&self) -> Result<Vec<String>> {
        let dir = self.root.join("wallets");
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<String> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .filter(|id| validate_wallet_id(id).is_ok())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Wallet ids become file names: ASCII letters, digits, `-` and `_` only.
fn validate_wallet_id(wallet_id: &str) -> Result<()> {
    let valid = !wallet_id.is_empty()
        && wallet_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidWalletId(wallet_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ExitPlan, Ledger, MemorySink};
    use crate::market::StaticPriceFeed;
    use crate::types::Coin;
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    fn d(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn test_load_missing_wallet_is_empty() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::with_root(dir.path().to_path_buf());

        let state = store.load("fresh").unwrap();
        assert_eq!(state.wallet_id(), "fresh");
        assert_eq!(state.positions().count(), 0);
        assert!(state.created_at().is_none());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::with_root(dir.path().to_path_buf());
        let feed = StaticPriceFeed::new().with_price("BTCUSDT", d("60"));

        // Create and save
        {
            let mut ledger =
                Ledger::with_sink(store.load("main").unwrap(), &feed, MemorySink::new());
            ledger.deposit(d("1000"));
            let plan = ExitPlan::new().stop_loss(d("40"));
            let id = ledger
                .open_with(&Coin::new("BTCUSDT", d("50")), d("10"), plan)
                .unwrap();
            ledger.close(id, d("4")).unwrap();

            let mut state = ledger.into_state();
            let path = store.save(&mut state).unwrap();
            assert!(path.ends_with("wallets/main.json"));
            assert!(state.updated_at().is_some());
        }

        // Reload and verify
        {
            let state = store.try_load("main").unwrap();
            let positions: Vec<_> = state.positions().collect();
            assert_eq!(positions.len(), 1);
            assert_eq!(positions[0].volume(), d("6"));
            assert!(positions[0].stop_loss().enabled);
            assert_eq!(state.history().count(), 1);
            assert_eq!(state.payment_calc(), d("1000"));

            // a reloaded ledger keeps allocating fresh ids
            let mut ledger = Ledger::with_sink(state, &feed, MemorySink::new());
            let id = ledger.open(&Coin::new("BTCUSDT", d("60")), d("1")).unwrap();
            assert_eq!(id.0, 3);
        }
    }

    #[test]
    fn test_corrupt_record_yields_empty_ledger() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::with_root(dir.path().to_path_buf());
        let path = store.path_for("broken").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(store.try_load("broken"), Err(Error::Json(_))));

        let state = store.load("broken").unwrap();
        assert_eq!(state.wallet_id(), "broken");
        assert_eq!(state.history().count(), 0);
    }

    #[test]
    fn test_corrupt_record_survives_save() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::with_root(dir.path().to_path_buf());
        let path = store.path_for("broken").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let mut state = store.load("broken").unwrap();
        store.save(&mut state).unwrap();

        let kept = store.corrupt_path_for("broken").unwrap();
        assert!(kept.ends_with("wallets/broken.json.corrupt"));
        assert_eq!(fs::read_to_string(kept).unwrap(), "{ not json");
        assert!(store.try_load("broken").is_ok());
        assert_eq!(store.wallets().unwrap(), vec!["broken"]);
    }

    #[test]
    fn test_invalid_wallet_ids() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::with_root(dir.path().to_path_buf());

        for id in ["", "../escape", "a/b", "with space"] {
            assert!(matches!(store.load(id), Err(Error::InvalidWalletId(_))));
        }
        assert!(store.path_for("trading-2024_main").is_ok());
    }

    #[test]
    fn test_record_keyed_by_file_name() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::with_root(dir.path().to_path_buf());

        let mut state = LedgerState::new("alpha");
        let alpha = store.save(&mut state).unwrap();
        fs::copy(&alpha, store.path_for("beta").unwrap()).unwrap();

        assert_eq!(store.load("beta").unwrap().wallet_id(), "beta");
    }

    #[test]
    fn test_list_wallets() {
        let dir = tempdir().unwrap();
        let store = LedgerStore::with_root(dir.path().to_path_buf());
        assert!(store.wallets().unwrap().is_empty());

        store.save(&mut LedgerState::new("zeta")).unwrap();
        store.save(&mut LedgerState::new("alpha")).unwrap();

        assert_eq!(store.wallets().unwrap(), vec!["alpha", "zeta"]);
    }
}
