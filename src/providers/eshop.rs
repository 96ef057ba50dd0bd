//! Live Nintendo eShop collector.
//!
//! Queries the public price API (`api.ec.nintendo.com/v1/price`) once per
//! configured region for every nsuid in the catalog. Requests carry a
//! timeout and a fixed delay runs between regions to respect upstream
//! throttling. One failed region contributes nothing; only a fully failed
//! sweep returns an error.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::model::Offer;
use crate::providers::{catalog, region_info, Provider, RegionInfo};

const PRICE_API_BASE: &str = "https://api.ec.nintendo.com/v1/price";

pub struct EshopProvider {
    regions: Vec<String>,
    rate_limit: Duration,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    prices: Vec<PriceRecord>,
}

#[derive(Debug, Deserialize)]
struct PriceRecord {
    title_id: i64,
    regular_price: Option<PriceAmount>,
    discount_price: Option<PriceAmount>,
}

#[derive(Debug, Deserialize)]
struct PriceAmount {
    // The API reports amounts as decimal strings, e.g. "69.99".
    raw_value: String,
}

impl PriceAmount {
    fn value(&self) -> Option<f64> {
        self.raw_value.parse().ok()
    }
}

impl EshopProvider {
    pub fn new(regions: Vec<String>, timeout_secs: u64, rate_limit_ms: u64) -> Result<Self> {
        let http = Client::builder()
            .user_agent("eshop-pulse/0.1")
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            regions,
            rate_limit: Duration::from_millis(rate_limit_ms),
            http,
        })
    }

    async fn fetch_region(&self, info: &RegionInfo) -> Result<Vec<Offer>> {
        let ids: Vec<&str> = catalog::TITLES.iter().map(|t| t.nsuid).collect();
        let url = format!(
            "{PRICE_API_BASE}?country={}&lang={}&ids={}",
            info.code,
            info.lang,
            ids.join(",")
        );

        let response: PriceResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut offers = Vec::with_capacity(response.prices.len());
        for record in response.prices {
            let nsuid = record.title_id.to_string();
            let Some(entry) = catalog::title_for_nsuid(&nsuid) else {
                debug!(nsuid = %nsuid, "eshop: price for unknown title, skipping");
                continue;
            };
            let msrp = record.regular_price.as_ref().and_then(PriceAmount::value);
            let sale_price = record.discount_price.as_ref().and_then(PriceAmount::value);
            if msrp.is_none() && sale_price.is_none() {
                continue;
            }
            offers.push(Offer {
                title: Some(entry.title.to_string()),
                nsuid: Some(nsuid),
                store: Some("nintendo".to_string()),
                platform: Some("Nintendo Switch".to_string()),
                region: Some(info.code.to_string()),
                currency: Some(info.currency.to_string()),
                msrp,
                sale_price,
                // left at zero so the normalizer derives it from the prices
                discount_percent: 0,
                url: None,
                cover_url: entry.cover_url.map(str::to_string),
            });
        }
        Ok(offers)
    }
}

#[async_trait]
impl Provider for EshopProvider {
    fn name(&self) -> &str {
        "eshop"
    }

    async fn fetch(&self) -> Result<Vec<Offer>> {
        let mut offers = Vec::new();
        let mut attempted = 0usize;
        let mut failed = 0usize;

        for (i, region) in self.regions.iter().enumerate() {
            let Some(info) = region_info(region) else {
                warn!(region = %region, "eshop: unsupported region, skipping");
                continue;
            };
            if i > 0 && !self.rate_limit.is_zero() {
                sleep(self.rate_limit).await;
            }
            attempted += 1;
            match self.fetch_region(info).await {
                Ok(batch) => {
                    debug!(region = info.code, count = batch.len(), "eshop: region fetched");
                    offers.extend(batch);
                }
                Err(err) => {
                    failed += 1;
                    warn!(region = info.code, error = %err, "eshop: region fetch failed, excluded from run");
                }
            }
        }

        if attempted > 0 && failed == attempted {
            bail!("eshop: all {attempted} region(s) failed");
        }
        Ok(offers)
    }
}
