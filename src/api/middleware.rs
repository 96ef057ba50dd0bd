// Additional middleware for logging, CORS, etc.

use actix_web::middleware::{Compress, Logger};

pub fn setup_middleware() -> (Logger, Compress) {
    let logger = Logger::default();
    let compress = Compress::default();
    (logger, compress)
}

// CORS configuration
use actix_cors::Cors;
use actix_web::http::header;

/// The API is read-only and public, so `*` (the default) opens CORS to any
/// origin; a comma-separated list restricts it.
pub fn setup_cors(allowed_origins: &str) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET"])
        .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600);

    if allowed_origins.trim() == "*" {
        cors = cors.allow_any_origin().send_wildcard();
    } else {
        for origin in allowed_origins.split(',') {
            cors = cors.allowed_origin(origin.trim());
        }
    }

    cors
}
