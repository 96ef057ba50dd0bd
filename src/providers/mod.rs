//! Offer providers: each one fetches raw price records from one external
//! source and returns a flat list of [`Offer`]s.
//!
//! A provider must not fail the whole run for a partial problem: one bad
//! region is logged and skipped. Only a total failure (nothing fetched at
//! all) surfaces as an error, which the pipeline downgrades to "zero offers
//! from this source".

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::model::Offer;
use crate::util::env::{env_opt, env_parse};

pub mod catalog;
pub mod eshop;

pub use catalog::CatalogProvider;
pub use eshop::EshopProvider;

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<Vec<Offer>>;
}

/// Static description of one eShop region.
#[derive(Debug, Clone, Copy)]
pub struct RegionInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub currency: &'static str,
    pub lang: &'static str,
}

/// Regions the collectors know how to query, with their storefront currency.
pub const REGIONS: &[RegionInfo] = &[
    // Americas
    RegionInfo { code: "US", name: "United States", currency: "USD", lang: "en" },
    RegionInfo { code: "CA", name: "Canada", currency: "CAD", lang: "en" },
    RegionInfo { code: "MX", name: "Mexico", currency: "MXN", lang: "es" },
    RegionInfo { code: "BR", name: "Brazil", currency: "BRL", lang: "pt" },
    RegionInfo { code: "AR", name: "Argentina", currency: "ARS", lang: "es" },
    // Europe
    RegionInfo { code: "GB", name: "United Kingdom", currency: "GBP", lang: "en" },
    RegionInfo { code: "DE", name: "Germany", currency: "EUR", lang: "de" },
    RegionInfo { code: "FR", name: "France", currency: "EUR", lang: "fr" },
    RegionInfo { code: "ES", name: "Spain", currency: "EUR", lang: "es" },
    RegionInfo { code: "IT", name: "Italy", currency: "EUR", lang: "it" },
    RegionInfo { code: "PT", name: "Portugal", currency: "EUR", lang: "pt" },
    RegionInfo { code: "PL", name: "Poland", currency: "PLN", lang: "pl" },
    RegionInfo { code: "NO", name: "Norway", currency: "NOK", lang: "no" },
    // Asia & Oceania
    RegionInfo { code: "JP", name: "Japan", currency: "JPY", lang: "ja" },
    RegionInfo { code: "AU", name: "Australia", currency: "AUD", lang: "en" },
    RegionInfo { code: "NZ", name: "New Zealand", currency: "NZD", lang: "en" },
    RegionInfo { code: "HK", name: "Hong Kong", currency: "HKD", lang: "zh" },
    RegionInfo { code: "KR", name: "South Korea", currency: "KRW", lang: "ko" },
    RegionInfo { code: "ZA", name: "South Africa", currency: "ZAR", lang: "en" },
];

pub fn region_info(code: &str) -> Option<&'static RegionInfo> {
    REGIONS.iter().find(|r| r.code.eq_ignore_ascii_case(code))
}

/// Parse a comma/space separated region list into uppercase codes.
pub fn parse_region_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.trim().to_ascii_uppercase())
        .collect()
}

/// Build the provider set from the environment.
///
/// `PROVIDERS` is a comma-separated list of `catalog` and/or `eshop`
/// (default `catalog`); `ESHOP_REGIONS` selects the regions to query
/// (default `US BR GB DE JP`).
pub fn from_env() -> Result<Vec<Box<dyn Provider>>> {
    let regions = parse_region_list(
        &env_opt("ESHOP_REGIONS").unwrap_or_else(|| "US BR GB DE JP".to_string()),
    );
    let selected = env_opt("PROVIDERS").unwrap_or_else(|| "catalog".to_string());

    let mut providers: Vec<Box<dyn Provider>> = Vec::new();
    for name in selected.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name {
            "catalog" => providers.push(Box::new(CatalogProvider::new(regions.clone()))),
            "eshop" => {
                let timeout_secs: u64 = env_parse("ESHOP_TIMEOUT_SECS", 30u64);
                let rate_limit_ms: u64 = env_parse("ESHOP_RATE_LIMIT_MS", 500u64);
                providers.push(Box::new(EshopProvider::new(
                    regions.clone(),
                    timeout_secs,
                    rate_limit_ms,
                )?));
            }
            other => bail!("unknown provider {other:?} in PROVIDERS"),
        }
    }
    Ok(providers)
}
