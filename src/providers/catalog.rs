//! Static catalog provider: a compiled-in table of first-party titles with
//! per-region storefront prices. Serves as the offline data source when no
//! upstream API is reachable, and seeds the nsuid list for the live
//! collector.

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::model::Offer;
use crate::providers::{region_info, Provider};

/// One first-party title tracked by the catalog.
pub struct CatalogTitle {
    pub title: &'static str,
    pub nsuid: &'static str,
    pub cover_url: Option<&'static str>,
}

pub const TITLES: &[CatalogTitle] = &[
    CatalogTitle {
        title: "The Legend of Zelda: Tears of the Kingdom",
        nsuid: "70010000063714",
        cover_url: Some("https://assets.nintendo.com/image/upload/c_fill,w_600/ncom/software/switch/70010000063714/cover"),
    },
    CatalogTitle {
        title: "Super Mario Bros. Wonder",
        nsuid: "70010000068675",
        cover_url: Some("https://assets.nintendo.com/image/upload/c_fill,w_600/ncom/software/switch/70010000068675/cover"),
    },
    CatalogTitle {
        title: "Pokémon Scarlet",
        nsuid: "70010000055478",
        cover_url: None,
    },
    CatalogTitle {
        title: "Mario Kart 8 Deluxe",
        nsuid: "70010000000153",
        cover_url: None,
    },
    CatalogTitle {
        title: "Animal Crossing: New Horizons",
        nsuid: "70010000027619",
        cover_url: None,
    },
    CatalogTitle {
        title: "Splatoon 3",
        nsuid: "70010000048950",
        cover_url: None,
    },
    CatalogTitle {
        title: "Metroid Prime Remastered",
        nsuid: "70010000064444",
        cover_url: None,
    },
    CatalogTitle {
        title: "Pikmin 4",
        nsuid: "70010000065511",
        cover_url: None,
    },
];

pub fn title_for_nsuid(nsuid: &str) -> Option<&'static CatalogTitle> {
    TITLES.iter().find(|t| t.nsuid == nsuid)
}

/// Per-region price row: (nsuid, msrp, sale_price, discount_percent).
/// Discount 0 with a sale price present is intentional; derivation is the
/// normalizer's job.
type PriceRow = (&'static str, f64, Option<f64>, i32);

const PRICES_US: &[PriceRow] = &[
    ("70010000063714", 69.99, None, 0),
    ("70010000068675", 59.99, Some(49.99), 17),
    ("70010000055478", 59.99, None, 0),
    ("70010000000153", 59.99, Some(41.99), 30),
    ("70010000027619", 59.99, None, 0),
    ("70010000048950", 59.99, Some(44.99), 25),
    ("70010000064444", 39.99, None, 0),
    ("70010000065511", 59.99, Some(47.99), 0),
];

const PRICES_BR: &[PriceRow] = &[
    ("70010000063714", 399.00, None, 0),
    ("70010000068675", 349.00, Some(296.65), 15),
    ("70010000055478", 349.00, None, 0),
    ("70010000000153", 349.00, Some(244.30), 30),
    ("70010000027619", 349.00, None, 0),
    ("70010000048950", 349.00, Some(261.75), 0),
];

const PRICES_GB: &[PriceRow] = &[
    ("70010000063714", 59.99, None, 0),
    ("70010000068675", 49.99, Some(41.99), 16),
    ("70010000055478", 49.99, None, 0),
    ("70010000000153", 49.99, Some(33.29), 0),
    ("70010000027619", 49.99, None, 0),
];

const PRICES_DE: &[PriceRow] = &[
    ("70010000063714", 69.99, None, 0),
    ("70010000068675", 59.99, Some(49.79), 17),
    ("70010000055478", 59.99, None, 0),
    ("70010000000153", 59.99, Some(41.99), 30),
    ("70010000027619", 59.99, None, 0),
];

const PRICES_JP: &[PriceRow] = &[
    ("70010000063714", 7900.0, None, 0),
    ("70010000068675", 6578.0, Some(5590.0), 15),
    ("70010000055478", 6578.0, None, 0),
    ("70010000000153", 6578.0, Some(4604.0), 30),
];

fn price_rows(region: &str) -> Option<&'static [PriceRow]> {
    match region {
        "US" => Some(PRICES_US),
        "BR" => Some(PRICES_BR),
        "GB" => Some(PRICES_GB),
        "DE" => Some(PRICES_DE),
        "JP" => Some(PRICES_JP),
        _ => None,
    }
}

/// Offline provider backed by the static tables above.
pub struct CatalogProvider {
    regions: Vec<String>,
}

impl CatalogProvider {
    pub fn new(regions: Vec<String>) -> Self {
        Self { regions }
    }
}

#[async_trait]
impl Provider for CatalogProvider {
    fn name(&self) -> &str {
        "catalog"
    }

    async fn fetch(&self) -> Result<Vec<Offer>> {
        let mut offers = Vec::new();
        for region in &self.regions {
            let Some(info) = region_info(region) else {
                warn!(region = %region, "catalog: unsupported region, skipping");
                continue;
            };
            let Some(rows) = price_rows(info.code) else {
                warn!(region = %region, "catalog: no price table for region, skipping");
                continue;
            };
            for (nsuid, msrp, sale_price, discount) in rows {
                let Some(entry) = title_for_nsuid(nsuid) else {
                    continue;
                };
                offers.push(Offer {
                    title: Some(entry.title.to_string()),
                    nsuid: Some(nsuid.to_string()),
                    store: Some("nintendo".to_string()),
                    platform: Some("Nintendo Switch".to_string()),
                    region: Some(info.code.to_string()),
                    currency: Some(info.currency.to_string()),
                    msrp: Some(*msrp),
                    sale_price: *sale_price,
                    discount_percent: *discount,
                    url: None,
                    cover_url: entry.cover_url.map(str::to_string),
                });
            }
        }
        Ok(offers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_offers_for_known_regions_only() {
        let provider =
            CatalogProvider::new(vec!["US".to_string(), "BR".to_string(), "XX".to_string()]);
        let offers = provider.fetch().await.unwrap();
        assert_eq!(offers.len(), PRICES_US.len() + PRICES_BR.len());
        assert!(offers.iter().all(|o| o.store.as_deref() == Some("nintendo")));
        assert!(offers
            .iter()
            .filter(|o| o.region.as_deref() == Some("BR"))
            .all(|o| o.currency.as_deref() == Some("BRL")));
    }

    #[tokio::test]
    async fn unknown_regions_alone_yield_empty_not_error() {
        let provider = CatalogProvider::new(vec!["XX".to_string()]);
        assert!(provider.fetch().await.unwrap().is_empty());
    }

    #[test]
    fn every_price_row_references_a_catalog_title() {
        for region in ["US", "BR", "GB", "DE", "JP"] {
            for (nsuid, ..) in price_rows(region).unwrap() {
                assert!(title_for_nsuid(nsuid).is_some(), "orphan nsuid {nsuid}");
            }
        }
    }
}
