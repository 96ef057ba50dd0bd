//! Canonical record types shared by the pipeline stages and the API layer.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One raw price observation from a provider for one game/store/region.
///
/// Providers are heterogeneous, so every field a source may omit is optional
/// here; the normalizer is responsible for filling defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Offer {
    #[serde(default)]
    pub title: Option<String>,
    /// Stable Nintendo store id, when the source exposes one.
    #[serde(default)]
    pub nsuid: Option<String>,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    /// List price (MSRP) in the region's native currency.
    #[serde(default)]
    pub msrp: Option<f64>,
    /// Current/sale price; `None` when the game is not discounted.
    #[serde(default)]
    pub sale_price: Option<f64>,
    /// Discount percent as reported by the source. Zero/absent means
    /// "derive it", anything else is preserved verbatim downstream.
    #[serde(default)]
    pub discount_percent: i32,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
}

/// Canonical projection of an [`Offer`]. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedItem {
    /// Slugified title; stable per title across runs.
    pub game_id: String,
    pub title: String,
    pub store: String,
    pub platform: String,
    pub region: String,
    pub currency: String,
    /// Effective price: sale price when present, else MSRP.
    pub price: Option<f64>,
    pub msrp: Option<f64>,
    pub discount_percent: i32,
    pub url: Option<String>,
    pub cover_url: Option<String>,
}

/// The `raw/latest.json` artifact: offers exactly as collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDataset {
    pub collected_at: DateTime<Utc>,
    pub items: Vec<Offer>,
}

/// The world as last observed: one normalization pass over one collection run.
/// Replaced wholesale on every pipeline run, never merged in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub normalized_at: DateTime<Utc>,
    pub items: Vec<NormalizedItem>,
}

/// The `store/prices.json` artifact served by the read API.
///
/// `updated_at` is `None` only when no pipeline run has completed yet
/// (missing or unreadable artifact).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricesDataset {
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<NormalizedItem>,
}

/// One per-run price observation kept in the bounded history list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seen_at: DateTime<Utc>,
    pub price: Option<f64>,
    pub currency: String,
    pub discount_percent: i32,
}

/// Per-key price history, keyed `"<game_id>:<store>:<region>"`.
///
/// IndexMap keeps artifact key order stable across read-modify-write cycles.
pub type History = IndexMap<String, Vec<HistoryEntry>>;

/// Build the history key for one normalized item.
pub fn history_key(game_id: &str, store: &str, region: &str) -> String {
    format!("{game_id}:{store}:{region}")
}

/// Split a history key back into (game_id, store, region).
///
/// Keys always carry exactly two separators because the components are
/// slugs/codes that never contain `:`.
pub fn split_history_key(key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = key.splitn(3, ':');
    Some((parts.next()?, parts.next()?, parts.next()?))
}
