//! Persistence: latest-snapshot artifacts plus bounded per-key price history.
//!
//! The pipeline talks to a narrow [`Storage`] trait so the same logic can
//! target a filesystem today and an object store or database later. The
//! shipped implementation, [`JsonStore`], writes pretty-printed JSON files
//! under a single data directory:
//!
//! ```text
//! data/
//!   raw/latest.json          offers exactly as collected
//!   normalized/latest.json   canonical snapshot
//!   store/prices.json        latest snapshot for the read API
//!   store/history.json       per-key bounded history
//!   store/merged.json        reconciled multi-region dataset
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::merge::MergedDataset;
use crate::model::{history_key, History, HistoryEntry, PricesDataset, RawDataset, Snapshot};

/// Maximum history entries kept per `game_id:store:region` key.
/// Oldest entries are evicted first (plain FIFO, not time-based).
pub const HISTORY_CAP: usize = 50;

/// Narrow persistence interface for the pipeline and the read API.
///
/// Load methods recover from malformed state: a corrupt or missing artifact
/// yields the empty/default value, never an error. Save methods are fatal on
/// failure: the caller aborts the run and the previous artifact stays the
/// last-known-good state for readers.
pub trait Storage: Send + Sync {
    fn save_raw(&self, raw: &RawDataset) -> Result<()>;
    fn save_normalized(&self, snapshot: &Snapshot) -> Result<()>;
    fn load_snapshot(&self) -> PricesDataset;
    fn save_snapshot(&self, prices: &PricesDataset) -> Result<()>;
    fn load_history(&self) -> History;
    fn save_history(&self, history: &History) -> Result<()>;
    fn load_merged(&self) -> MergedDataset;
    fn save_merged(&self, merged: &MergedDataset) -> Result<()>;
}

/// Filesystem-backed [`Storage`] writing JSON artifacts under one root.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn raw_path(&self) -> PathBuf {
        self.root.join("raw").join("latest.json")
    }

    fn normalized_path(&self) -> PathBuf {
        self.root.join("normalized").join("latest.json")
    }

    fn prices_path(&self) -> PathBuf {
        self.root.join("store").join("prices.json")
    }

    fn history_path(&self) -> PathBuf {
        self.root.join("store").join("history.json")
    }

    fn merged_path(&self) -> PathBuf {
        self.root.join("store").join("merged.json")
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(value).context("serializing artifact")?;
        fs::write(path, body).with_context(|| format!("writing {}", path.display()))
    }

    /// Read an artifact, treating missing or unparsable data as the default.
    fn read_json_or_default<T: DeserializeOwned + Default>(&self, path: &Path) -> T {
        let body = match fs::read_to_string(path) {
            Ok(body) => body,
            Err(_) => return T::default(),
        };
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "corrupt artifact; treating as empty");
                T::default()
            }
        }
    }
}

impl Storage for JsonStore {
    fn save_raw(&self, raw: &RawDataset) -> Result<()> {
        self.write_json(&self.raw_path(), raw)
    }

    fn save_normalized(&self, snapshot: &Snapshot) -> Result<()> {
        self.write_json(&self.normalized_path(), snapshot)
    }

    fn load_snapshot(&self) -> PricesDataset {
        self.read_json_or_default(&self.prices_path())
    }

    fn save_snapshot(&self, prices: &PricesDataset) -> Result<()> {
        self.write_json(&self.prices_path(), prices)
    }

    fn load_history(&self) -> History {
        self.read_json_or_default(&self.history_path())
    }

    fn save_history(&self, history: &History) -> Result<()> {
        self.write_json(&self.history_path(), history)
    }

    fn load_merged(&self) -> MergedDataset {
        self.read_json_or_default(&self.merged_path())
    }

    fn save_merged(&self, merged: &MergedDataset) -> Result<()> {
        self.write_json(&self.merged_path(), merged)
    }
}

/// Store stage: overwrite the latest snapshot, then append one history entry
/// per item and trim each key to the last [`HISTORY_CAP`] entries.
///
/// History is read-modify-write and assumes a single writer; pipeline runs
/// are serialized by the scheduler.
pub fn persist(store: &dyn Storage, snapshot: &Snapshot) -> Result<()> {
    let prices = PricesDataset {
        updated_at: Some(snapshot.normalized_at),
        items: snapshot.items.clone(),
    };
    store.save_snapshot(&prices)?;

    let mut history = store.load_history();
    for item in &snapshot.items {
        let key = history_key(&item.game_id, &item.store, &item.region);
        let entries = history.entry(key).or_default();
        entries.push(HistoryEntry {
            seen_at: snapshot.normalized_at,
            price: item.price,
            currency: item.currency.clone(),
            discount_percent: item.discount_percent,
        });
        if entries.len() > HISTORY_CAP {
            let excess = entries.len() - HISTORY_CAP;
            entries.drain(..excess);
        }
    }
    store.save_history(&history)
}
