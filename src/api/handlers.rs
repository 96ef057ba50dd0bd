// HTTP request handlers for API endpoints

use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use indexmap::IndexMap;

use crate::api::models::*;
use crate::api::AppState;
use crate::merge::round2;
use crate::model::{split_history_key, HistoryEntry};
use crate::store::Storage;

/// Health check: reports the snapshot's last update time (null until the
/// first pipeline run lands).
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let prices = state.store.load_snapshot();
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        updated_at: prices.updated_at,
    })
}

/// List snapshot items matching the conjunctive filters.
pub async fn list_offers(
    state: web::Data<AppState>,
    query: web::Query<OfferFilters>,
) -> HttpResponse {
    let prices = state.store.load_snapshot();
    let items = prices
        .items
        .into_iter()
        .filter(|item| query.matches(item))
        .collect();
    HttpResponse::Ok().json(OffersResponse {
        updated_at: prices.updated_at,
        items,
    })
}

/// Distinct games in the snapshot, deduplicated by game_id (first occurrence
/// wins) and sorted by title ascending.
pub async fn list_games(
    state: web::Data<AppState>,
    query: web::Query<OfferFilters>,
) -> HttpResponse {
    let prices = state.store.load_snapshot();
    let mut games: IndexMap<String, GameSummary> = IndexMap::new();
    for item in prices.items.iter().filter(|item| query.matches(item)) {
        games.entry(item.game_id.clone()).or_insert_with(|| GameSummary {
            game_id: item.game_id.clone(),
            title: item.title.clone(),
            platform: item.platform.clone(),
        });
    }
    let mut items: Vec<GameSummary> = games.into_values().collect();
    items.sort_by(|a, b| a.title.cmp(&b.title));
    HttpResponse::Ok().json(GamesResponse { items })
}

/// All snapshot items for one game. `game_id` is required.
pub async fn get_prices(
    state: web::Data<AppState>,
    query: web::Query<PricesQuery>,
) -> HttpResponse {
    let Some(game_id) = query.game_id.clone().filter(|id| !id.is_empty()) else {
        return HttpResponse::BadRequest().json(ErrorBody::bad_request("game_id is required"));
    };
    let prices = state.store.load_snapshot();
    let items = prices
        .items
        .into_iter()
        .filter(|item| item.game_id == game_id)
        .collect();
    HttpResponse::Ok().json(PricesResponse { game_id, items })
}

/// Cover image for one game, from the merged dataset with the snapshot as
/// fallback.
pub async fn game_image(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let slug = path.into_inner();

    let merged = state.store.load_merged();
    let from_merged = merged
        .games
        .iter()
        .find(|g| g.slug == slug)
        .and_then(|g| g.cover_url.clone());

    let image_url = from_merged.or_else(|| {
        state
            .store
            .load_snapshot()
            .items
            .iter()
            .find(|item| item.game_id == slug)
            .and_then(|item| item.cover_url.clone())
    });

    match image_url {
        Some(image_url) => HttpResponse::Ok().json(ImageResponse { slug, image_url }),
        None => HttpResponse::NotFound().json(ErrorBody::not_found()),
    }
}

fn history_points_for(state: &AppState, slug: &str, region: Option<&str>) -> Vec<HistoryPoint> {
    let history = state.store.load_history();
    let mut points = Vec::new();
    for (key, entries) in &history {
        let Some((game_id, store, key_region)) = split_history_key(key) else {
            continue;
        };
        if game_id != slug {
            continue;
        }
        if region.is_some_and(|r| r != key_region) {
            continue;
        }
        for HistoryEntry {
            seen_at,
            price,
            currency,
            discount_percent,
        } in entries
        {
            points.push(HistoryPoint {
                seen_at: *seen_at,
                store: store.to_string(),
                region: key_region.to_string(),
                price: *price,
                currency: currency.clone(),
                discount_percent: *discount_percent,
            });
        }
    }
    points
}

/// Price history for one game, ordered by observed time ascending. Without a
/// region filter, price ascending breaks time ties so output stays
/// deterministic across regions.
pub async fn game_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> HttpResponse {
    let slug = path.into_inner();
    let region = query.region.as_deref();
    let mut points = history_points_for(&state, &slug, region);

    if region.is_some() {
        points.sort_by(|a, b| a.seen_at.cmp(&b.seen_at));
    } else {
        points.sort_by(|a, b| {
            a.seen_at.cmp(&b.seen_at).then_with(|| {
                a.price
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.price.unwrap_or(f64::INFINITY))
            })
        });
    }

    HttpResponse::Ok().json(HistoryResponse { slug, items: points })
}

/// Per-region price statistics over a game's history, in the reference
/// currency, ordered by min price ascending.
pub async fn game_stats(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let slug = path.into_inner();
    let points = history_points_for(&state, &slug, None);

    struct Acc {
        currency: String,
        prices: Vec<f64>,
        first_seen: chrono::DateTime<chrono::Utc>,
        last_seen: chrono::DateTime<chrono::Utc>,
        records: usize,
    }

    let mut by_region: BTreeMap<String, Acc> = BTreeMap::new();
    for point in &points {
        let acc = by_region.entry(point.region.clone()).or_insert_with(|| Acc {
            currency: point.currency.clone(),
            prices: Vec::new(),
            first_seen: point.seen_at,
            last_seen: point.seen_at,
            records: 0,
        });
        acc.records += 1;
        acc.first_seen = acc.first_seen.min(point.seen_at);
        acc.last_seen = acc.last_seen.max(point.seen_at);
        if let Some(price) = point.price {
            acc.prices.push(state.rates.to_reference(&point.currency, price));
        }
    }

    let mut regions: Vec<RegionStats> = by_region
        .into_iter()
        .filter(|(_, acc)| !acc.prices.is_empty())
        .map(|(region, acc)| {
            let min = acc.prices.iter().copied().fold(f64::INFINITY, f64::min);
            let max = acc.prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = acc.prices.iter().sum::<f64>() / acc.prices.len() as f64;
            RegionStats {
                region,
                currency: acc.currency,
                min_price: min,
                max_price: max,
                avg_price: round2(avg),
                records: acc.records,
                first_seen: acc.first_seen,
                last_seen: acc.last_seen,
            }
        })
        .collect();

    if regions.is_empty() {
        return HttpResponse::NotFound().json(ErrorBody::not_found());
    }

    regions.sort_by(|a, b| a.min_price.total_cmp(&b.min_price));
    HttpResponse::Ok().json(StatsResponse {
        slug,
        reference_currency: state.rates.reference.clone(),
        regions,
    })
}

/// Fallback for every unmatched route.
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorBody::not_found())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::configure_routes;
    use crate::merge::RateTable;
    use crate::model::{NormalizedItem, Snapshot};
    use crate::store::{persist, JsonStore, Storage};
    use actix_web::{test, App};
    use chrono::{Duration, Utc};

    fn item(game_id: &str, title: &str, region: &str, currency: &str, price: f64, discount: i32) -> NormalizedItem {
        NormalizedItem {
            game_id: game_id.to_string(),
            title: title.to_string(),
            store: "nintendo".to_string(),
            platform: "Nintendo Switch".to_string(),
            region: region.to_string(),
            currency: currency.to_string(),
            price: Some(price),
            msrp: Some(price),
            discount_percent: discount,
            url: None,
            cover_url: None,
        }
    }

    fn seeded_state(dir: &tempfile::TempDir) -> AppState {
        let store = JsonStore::new(dir.path());
        let base = Utc::now();
        // two runs so history has depth
        persist(
            &store,
            &Snapshot {
                normalized_at: base,
                items: vec![
                    item("zelda", "Zelda", "US", "USD", 69.99, 0),
                    item("zelda", "Zelda", "BR", "BRL", 399.0, 0),
                    item("mario", "Mario", "US", "USD", 59.99, 17),
                ],
            },
        )
        .unwrap();
        persist(
            &store,
            &Snapshot {
                normalized_at: base + Duration::hours(1),
                items: vec![
                    item("zelda", "Zelda", "US", "USD", 49.99, 29),
                    item("zelda", "Zelda", "BR", "BRL", 399.0, 0),
                ],
            },
        )
        .unwrap();
        AppState {
            store,
            rates: RateTable::default_brl(),
        }
    }

    macro_rules! test_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn health_reports_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app!(seeded_state(&dir));

        let resp: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/health").to_request())
                .await;
        assert_eq!(resp["status"], "ok");
        assert!(resp["updated_at"].is_string());
    }

    #[actix_web::test]
    async fn health_with_no_artifacts_is_ok_with_null_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState {
            store: JsonStore::new(dir.path()),
            rates: RateTable::default_brl(),
        };
        let app = test_app!(state);

        let resp: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/health").to_request())
                .await;
        assert_eq!(resp["status"], "ok");
        assert!(resp["updated_at"].is_null());
    }

    #[actix_web::test]
    async fn offers_filters_are_conjunctive() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app!(seeded_state(&dir));

        let resp: OffersResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/offers?region=US&on_sale=1")
                .to_request(),
        )
        .await;
        assert_eq!(resp.items.len(), 1);
        assert_eq!(resp.items[0].game_id, "zelda");
        assert_eq!(resp.items[0].discount_percent, 29);
    }

    #[actix_web::test]
    async fn games_are_deduplicated_and_sorted_by_title() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        persist(
            &store,
            &Snapshot {
                normalized_at: Utc::now(),
                items: vec![
                    item("zelda", "Zelda", "US", "USD", 69.99, 0),
                    item("zelda", "Zelda", "BR", "BRL", 399.0, 0),
                    item("animal-crossing", "Animal Crossing", "US", "USD", 59.99, 0),
                ],
            },
        )
        .unwrap();
        let app = test_app!(AppState {
            store,
            rates: RateTable::default_brl(),
        });

        let resp: GamesResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/api/games").to_request(),
        )
        .await;
        let ids: Vec<&str> = resp.items.iter().map(|g| g.game_id.as_str()).collect();
        assert_eq!(ids, vec!["animal-crossing", "zelda"]);
    }

    #[actix_web::test]
    async fn prices_requires_game_id() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app!(seeded_state(&dir));

        let req = test::TestRequest::get().uri("/api/prices").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: ErrorBody = test::read_body_json(resp).await;
        assert_eq!(body.error, "game_id is required");
    }

    #[actix_web::test]
    async fn prices_returns_items_for_game() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app!(seeded_state(&dir));

        let resp: PricesResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/prices?game_id=zelda")
                .to_request(),
        )
        .await;
        assert_eq!(resp.game_id, "zelda");
        assert_eq!(resp.items.len(), 2);
    }

    #[actix_web::test]
    async fn unknown_route_is_structured_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app!(seeded_state(&dir));

        let req = test::TestRequest::get().uri("/api/nonexistent").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
        let body: ErrorBody = test::read_body_json(resp).await;
        assert_eq!(body.error, "not_found");
    }

    #[actix_web::test]
    async fn history_is_time_then_price_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app!(seeded_state(&dir));

        let resp: HistoryResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/games/history/zelda")
                .to_request(),
        )
        .await;
        // 2 runs x 2 regions
        assert_eq!(resp.items.len(), 4);
        for pair in resp.items.windows(2) {
            assert!(pair[0].seen_at <= pair[1].seen_at);
            if pair[0].seen_at == pair[1].seen_at {
                assert!(
                    pair[0].price.unwrap_or(f64::INFINITY)
                        <= pair[1].price.unwrap_or(f64::INFINITY)
                );
            }
        }
    }

    #[actix_web::test]
    async fn history_region_filter_limits_rows() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app!(seeded_state(&dir));

        let resp: HistoryResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/games/history/zelda?region=BR")
                .to_request(),
        )
        .await;
        assert_eq!(resp.items.len(), 2);
        assert!(resp.items.iter().all(|p| p.region == "BR"));
    }

    #[actix_web::test]
    async fn stats_aggregates_per_region_in_reference_currency() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app!(seeded_state(&dir));

        let resp: StatsResponse = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/games/stats/zelda").to_request(),
        )
        .await;
        assert_eq!(resp.reference_currency, "BRL");
        assert_eq!(resp.regions.len(), 2);
        // sorted by min asc: US min = 49.99*5.8 = 289.94 < BR 399.0
        assert_eq!(resp.regions[0].region, "US");
        assert_eq!(resp.regions[0].min_price, 289.94);
        assert_eq!(resp.regions[0].max_price, 405.94);
        assert_eq!(resp.regions[0].records, 2);
        assert_eq!(resp.regions[1].region, "BR");
        assert_eq!(resp.regions[1].avg_price, 399.0);
    }

    #[actix_web::test]
    async fn stats_for_unknown_slug_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app!(seeded_state(&dir));

        let req = test::TestRequest::get().uri("/games/stats/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }
}
