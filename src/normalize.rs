//! Normalizer: maps heterogeneous provider offers into the canonical schema.
//!
//! `normalize` is a pure, total function: it always produces an item, even
//! from a mostly-empty offer, by falling back to defaults.

use chrono::Utc;

use crate::model::{NormalizedItem, Offer, Snapshot};

/// Derive a stable, URL-safe id from a title.
///
/// Lowercases, collapses every run of non-alphanumeric characters into a
/// single `-`, trims leading/trailing dashes. An empty result becomes
/// `"unknown"` so the id is never blank.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

/// Discount derivation rule shared by the normalizer and the merger.
///
/// When the incoming discount is zero/absent AND both msrp and sale price
/// are present and nonzero, recompute as `round((1 - sale/msrp) * 100)`
/// (half away from zero). Any explicit nonzero discount is preserved
/// verbatim, including negative or >100 values; sources occasionally
/// report those and we do not clamp.
pub fn derive_discount(msrp: Option<f64>, sale_price: Option<f64>, incoming: i32) -> i32 {
    if incoming == 0 {
        if let (Some(msrp), Some(sale)) = (msrp, sale_price) {
            if msrp != 0.0 && sale != 0.0 {
                return ((1.0 - sale / msrp) * 100.0).round() as i32;
            }
        }
    }
    incoming
}

/// Project one offer into the canonical schema.
pub fn normalize(offer: &Offer) -> NormalizedItem {
    let game_id = slugify(offer.title.as_deref().unwrap_or(""));
    let price = offer.sale_price.or(offer.msrp);
    let discount = derive_discount(offer.msrp, offer.sale_price, offer.discount_percent);

    NormalizedItem {
        game_id,
        title: offer.title.clone().unwrap_or_else(|| "Unknown".to_string()),
        store: offer.store.clone().unwrap_or_else(|| "unknown".to_string()),
        platform: offer
            .platform
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        region: offer.region.clone().unwrap_or_else(|| "unknown".to_string()),
        currency: offer.currency.clone().unwrap_or_else(|| "USD".to_string()),
        price,
        msrp: offer.msrp,
        discount_percent: discount,
        url: offer.url.clone(),
        cover_url: offer.cover_url.clone(),
    }
}

/// Normalize a whole collection run into a timestamped snapshot.
pub fn normalize_all(offers: &[Offer]) -> Snapshot {
    Snapshot {
        normalized_at: Utc::now(),
        items: offers.iter().map(normalize).collect(),
    }
}
