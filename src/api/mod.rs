// Read-only HTTP API over the pipeline artifacts

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

use crate::merge::RateTable;
use crate::store::JsonStore;

pub use server::ApiServer;

/// Shared per-worker state: the artifact store plus the rate table used for
/// reference-currency aggregates. Requests are served statelessly against
/// whatever artifacts are currently on disk.
#[derive(Clone)]
pub struct AppState {
    pub store: JsonStore,
    pub rates: RateTable,
}
