//! Pipeline: collect → normalize → store, plus the merge post-process.
//!
//! One run is one pass end to end. Provider failures degrade to zero offers
//! for that source; a persistence failure aborts the run so the previous
//! artifacts stay the last-known-good state.

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::merge::{merge, CorrectionSet, MergedDataset, Observation, RateTable};
use crate::model::RawDataset;
use crate::normalize::normalize_all;
use crate::providers::Provider;
use crate::store::{persist, Storage};

/// Per-run summary, logged after each cycle.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub offers_collected: usize,
    pub items_normalized: usize,
    pub merged_games: usize,
    pub provider_failures: usize,
}

/// Execute one full pipeline cycle.
pub async fn run_once(
    providers: &[Box<dyn Provider>],
    store: &dyn Storage,
    rates: &RateTable,
    corrections: &CorrectionSet,
) -> Result<RunReport> {
    let run_id = Uuid::new_v4().to_string();
    let mut report = RunReport {
        run_id: run_id.clone(),
        ..RunReport::default()
    };

    // Collect. Providers are independent, side-effect-free reads, so they
    // run concurrently; each failure only costs that source's offers.
    let fetches = join_all(providers.iter().map(|p| p.fetch())).await;
    let mut offers = Vec::new();
    for (provider, result) in providers.iter().zip(fetches) {
        match result {
            Ok(batch) => {
                info!(run_id = %run_id, provider = provider.name(), count = batch.len(), "provider fetched");
                offers.extend(batch);
            }
            Err(err) => {
                report.provider_failures += 1;
                warn!(run_id = %run_id, provider = provider.name(), error = %err, "provider failed; contributing zero offers");
            }
        }
    }
    report.offers_collected = offers.len();

    let raw = RawDataset {
        collected_at: Utc::now(),
        items: offers,
    };
    store.save_raw(&raw)?;

    // Normalize.
    let snapshot = normalize_all(&raw.items);
    report.items_normalized = snapshot.items.len();
    store.save_normalized(&snapshot)?;

    // Store: latest snapshot + bounded history.
    persist(store, &snapshot)?;

    // Merge post-process: fold this run's per-region observations into the
    // reconciled multi-region dataset, recomputed wholesale.
    let observations: Vec<Observation> = raw
        .items
        .iter()
        .filter_map(Observation::from_offer)
        .collect();
    let games = merge(&observations, rates, corrections);
    report.merged_games = games.len();
    store.save_merged(&MergedDataset {
        merged_at: Some(Utc::now()),
        games,
    })?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Offer;
    use crate::providers::CatalogProvider;
    use crate::store::JsonStore;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        async fn fetch(&self) -> Result<Vec<Offer>> {
            Err(anyhow!("network unreachable"))
        }
    }

    #[tokio::test]
    async fn run_produces_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let providers: Vec<Box<dyn Provider>> = vec![Box::new(CatalogProvider::new(vec![
            "US".to_string(),
            "BR".to_string(),
        ]))];

        let report = run_once(
            &providers,
            &store,
            &RateTable::default_brl(),
            &CorrectionSet::default(),
        )
        .await
        .unwrap();

        assert!(report.offers_collected > 0);
        assert_eq!(report.offers_collected, report.items_normalized);
        assert!(report.merged_games > 0);
        assert_eq!(report.provider_failures, 0);

        for artifact in [
            "raw/latest.json",
            "normalized/latest.json",
            "store/prices.json",
            "store/history.json",
            "store/merged.json",
        ] {
            assert!(dir.path().join(artifact).exists(), "missing {artifact}");
        }

        // US and BR observations for the same title must land on one game.
        let merged = store.load_merged();
        let zelda = merged
            .games
            .iter()
            .find(|g| g.slug == "the-legend-of-zelda-tears-of-the-kingdom")
            .unwrap();
        assert_eq!(zelda.num_regions(), 2);
    }

    #[tokio::test]
    async fn failed_provider_degrades_to_zero_offers() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let providers: Vec<Box<dyn Provider>> = vec![
            Box::new(FailingProvider),
            Box::new(CatalogProvider::new(vec!["US".to_string()])),
        ];

        let report = run_once(
            &providers,
            &store,
            &RateTable::default_brl(),
            &CorrectionSet::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.provider_failures, 1);
        assert!(report.offers_collected > 0);
    }

    #[tokio::test]
    async fn all_providers_failing_still_persists_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let providers: Vec<Box<dyn Provider>> = vec![Box::new(FailingProvider)];

        let report = run_once(
            &providers,
            &store,
            &RateTable::default_brl(),
            &CorrectionSet::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.offers_collected, 0);
        let prices = store.load_snapshot();
        assert!(prices.updated_at.is_some());
        assert!(prices.items.is_empty());
    }
}
