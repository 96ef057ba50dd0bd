// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::NormalizedItem;

/// Structured error payload for 4xx responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn not_found() -> Self {
        Self {
            error: "not_found".to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Conjunctive filters shared by /api/offers and /api/games.
#[derive(Debug, Default, Deserialize)]
pub struct OfferFilters {
    pub store: Option<String>,
    pub region: Option<String>,
    pub platform: Option<String>,
    /// Truthy values: "1" or "true".
    pub on_sale: Option<String>,
}

impl OfferFilters {
    pub fn matches(&self, item: &NormalizedItem) -> bool {
        if self.store.as_deref().is_some_and(|s| s != item.store) {
            return false;
        }
        if self.region.as_deref().is_some_and(|r| r != item.region) {
            return false;
        }
        if self.platform.as_deref().is_some_and(|p| p != item.platform) {
            return false;
        }
        if matches!(self.on_sale.as_deref(), Some("1") | Some("true")) && item.discount_percent <= 0
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OffersResponse {
    pub updated_at: Option<DateTime<Utc>>,
    pub items: Vec<NormalizedItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GameSummary {
    pub game_id: String,
    pub title: String,
    pub platform: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GamesResponse {
    pub items: Vec<GameSummary>,
}

#[derive(Debug, Deserialize)]
pub struct PricesQuery {
    pub game_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PricesResponse {
    pub game_id: String,
    pub items: Vec<NormalizedItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub slug: String,
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub region: Option<String>,
}

/// One history observation enriched with its key's store/region.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub seen_at: DateTime<Utc>,
    pub store: String,
    pub region: String,
    pub price: Option<f64>,
    pub currency: String,
    pub discount_percent: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub slug: String,
    pub items: Vec<HistoryPoint>,
}

/// Per-region aggregates over a game's history, in the reference currency.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegionStats {
    pub region: String,
    pub currency: String,
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
    pub records: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub slug: String,
    pub reference_currency: String,
    pub regions: Vec<RegionStats>,
}
