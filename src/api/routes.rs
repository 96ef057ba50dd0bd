// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Snapshot-backed endpoints
        .route("/api/health", web::get().to(handlers::health))
        .route("/api/offers", web::get().to(handlers::list_offers))
        .route("/api/games", web::get().to(handlers::list_games))
        .route("/api/prices", web::get().to(handlers::get_prices))
        // Merged/history-backed endpoints
        .route("/games/image/{slug}", web::get().to(handlers::game_image))
        .route(
            "/games/history/{slug}",
            web::get().to(handlers::game_history),
        )
        .route("/games/stats/{slug}", web::get().to(handlers::game_stats))
        // Everything else is a structured 404
        .default_service(web::route().to(handlers::not_found));
}
