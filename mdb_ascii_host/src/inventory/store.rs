use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Point-in-time copy of the cash inventory.
///
/// Keys are denominations in minor currency units, values are piece
/// counts. `coins` covers the payable tubes; `coins_in_cashbox` the
/// non-payable overflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub banknotes: BTreeMap<u32, u32>,
    pub coins: BTreeMap<u32, u32>,
    pub coins_in_cashbox: BTreeMap<u32, u32>,
    pub last_updated_utc: DateTime<Utc>,
}

impl InventorySnapshot {
    fn empty() -> Self {
        Self {
            banknotes: BTreeMap::new(),
            coins: BTreeMap::new(),
            coins_in_cashbox: BTreeMap::new(),
            last_updated_utc: Utc::now(),
        }
    }

    /// Total value held, in minor units.
    #[must_use]
    pub fn total_value(&self) -> u64 {
        [&self.banknotes, &self.coins, &self.coins_in_cashbox]
            .iter()
            .flat_map(|table| table.iter())
            .map(|(&denomination, &count)| u64::from(denomination) * u64::from(count))
            .sum()
    }
}

/// Persistent cash inventory.
///
/// Every mutation is serialised under one mutex and written through to
/// disk as pretty JSON using write-to-temp + atomic rename, so a crash
/// leaves either the previous or the new document, never a torn one.
/// Counts never go negative: a dispense with no recorded stock is
/// ignored.
#[derive(Debug)]
pub struct InventoryStore {
    path: Option<PathBuf>,
    state: Mutex<InventorySnapshot>,
}

impl InventoryStore {
    /// Opens the store backed by `path`.
    ///
    /// A missing or unreadable document logs a warning and starts empty;
    /// the store never refuses to open.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match load(&path) {
            Some(snapshot) => {
                info!(path = %path.display(), "inventory loaded");
                snapshot
            }
            None => InventorySnapshot::empty(),
        };

        Self {
            path: Some(path),
            state: Mutex::new(state),
        }
    }

    /// An in-memory store without persistence.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            state: Mutex::new(InventorySnapshot::empty()),
        }
    }

    pub fn register_banknote_accepted(&self, denomination: u32) {
        self.mutate(|state| {
            *state.banknotes.entry(denomination).or_insert(0) += 1;
        });
    }

    pub fn register_coin_accepted(&self, denomination: u32) {
        self.mutate(|state| {
            *state.coins.entry(denomination).or_insert(0) += 1;
        });
    }

    pub fn register_coin_to_cashbox_accepted(&self, denomination: u32) {
        self.mutate(|state| {
            *state.coins_in_cashbox.entry(denomination).or_insert(0) += 1;
        });
    }

    /// Decrements the tube count for `denomination`; the entry is removed
    /// when it reaches zero. A dispense with no recorded stock is logged
    /// and ignored.
    pub fn register_coin_dispensed(&self, denomination: u32) {
        self.mutate(|state| match state.coins.get_mut(&denomination) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                state.coins.remove(&denomination);
            }
            None => {
                debug!(denomination, "dispense without recorded tube stock");
            }
        });
    }

    pub fn reset_banknotes(&self) {
        self.mutate(|state| state.banknotes.clear());
    }

    pub fn reset_coins(&self) {
        self.mutate(|state| state.coins.clear());
    }

    pub fn reset_coins_in_cashbox(&self) {
        self.mutate(|state| state.coins_in_cashbox.clear());
    }

    /// Deep copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> InventorySnapshot {
        self.state.lock().expect("inventory not poisoned").clone()
    }

    /// Re-persists the current state.
    ///
    /// # Errors
    ///
    /// Propagates the underlying filesystem error.
    pub fn flush(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = self.snapshot();
        persist(path, &snapshot)
    }

    fn mutate(&self, apply: impl FnOnce(&mut InventorySnapshot)) {
        let mut state = self.state.lock().expect("inventory not poisoned");
        apply(&mut state);
        state.last_updated_utc = Utc::now();

        if let Some(path) = &self.path
            && let Err(error) = persist(path, &state)
        {
            error!(path = %path.display(), %error, "inventory write-through failed");
        }
    }
}

fn load(path: &Path) -> Option<InventorySnapshot> {
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(document) => match serde_json::from_str(&document) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                warn!(path = %path.display(), %error, "inventory document unreadable, starting empty");
                None
            }
        },
        Err(error) => {
            warn!(path = %path.display(), %error, "inventory document unreadable, starting empty");
            None
        }
    }
}

fn persist(path: &Path, snapshot: &InventorySnapshot) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let document = serde_json::to_string_pretty(snapshot)?;
    let temp = path.with_extension("tmp");
    fs::write(&temp, document)?;
    fs::rename(&temp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> (InventoryStore, PathBuf) {
        let path = dir.path().join("inventory.json");
        (InventoryStore::open(&path), path)
    }

    #[test]
    fn accept_and_dispense_round_trip() {
        let store = InventoryStore::ephemeral();

        store.register_banknote_accepted(1000);
        store.register_coin_accepted(20);
        store.register_coin_accepted(20);
        store.register_coin_to_cashbox_accepted(50);
        store.register_coin_dispensed(20);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.banknotes, BTreeMap::from([(1000, 1)]));
        assert_eq!(snapshot.coins, BTreeMap::from([(20, 1)]));
        assert_eq!(snapshot.coins_in_cashbox, BTreeMap::from([(50, 1)]));
        assert_eq!(snapshot.total_value(), 1000 + 20 + 50);
    }

    #[test]
    fn dispense_never_goes_negative() {
        let store = InventoryStore::ephemeral();

        store.register_coin_dispensed(20);
        assert!(store.snapshot().coins.is_empty());

        store.register_coin_accepted(20);
        store.register_coin_dispensed(20);
        store.register_coin_dispensed(20);
        assert!(store.snapshot().coins.is_empty());
    }

    #[test]
    fn write_through_matches_in_memory_state() {
        let dir = TempDir::new().expect("temp dir");
        let (store, path) = store_in(&dir);

        store.register_banknote_accepted(5000);
        store.register_coin_accepted(100);

        let document = fs::read_to_string(&path).expect("document exists");
        let persisted: InventorySnapshot = serde_json::from_str(&document).expect("valid json");
        assert_eq!(persisted, store.snapshot());
    }

    #[test]
    fn reopen_restores_persisted_state() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("inventory.json");

        {
            let store = InventoryStore::open(&path);
            store.register_coin_accepted(50);
            store.register_coin_accepted(50);
        }

        let reopened = InventoryStore::open(&path);
        assert_eq!(reopened.snapshot().coins, BTreeMap::from([(50, 2)]));
    }

    #[test]
    fn corrupt_document_starts_empty() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("inventory.json");
        fs::write(&path, "not json at all").expect("write garbage");

        let store = InventoryStore::open(&path);
        assert!(store.snapshot().coins.is_empty());

        // the next mutation replaces the corrupt document
        store.register_coin_accepted(10);
        let document = fs::read_to_string(&path).expect("document exists");
        assert!(serde_json::from_str::<InventorySnapshot>(&document).is_ok());
    }

    #[test]
    fn resets_clear_single_tables() {
        let store = InventoryStore::ephemeral();
        store.register_banknote_accepted(1000);
        store.register_coin_accepted(20);
        store.register_coin_to_cashbox_accepted(50);

        store.reset_coins();
        let snapshot = store.snapshot();
        assert!(snapshot.coins.is_empty());
        assert_eq!(snapshot.banknotes.len(), 1);
        assert_eq!(snapshot.coins_in_cashbox.len(), 1);
    }

    #[test]
    fn flush_persists_without_mutation() {
        let dir = TempDir::new().expect("temp dir");
        let (store, path) = store_in(&dir);

        store.register_coin_accepted(10);
        fs::remove_file(&path).expect("remove document");
        store.flush().expect("flush succeeds");
        assert!(path.exists());
    }
}
