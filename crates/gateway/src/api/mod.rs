pub mod encounters;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router. Everything is token-authorized per request at
/// the store boundary; there is no route-level auth middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        // Health probe (used by the desktop launcher)
        .route("/api/health", get(encounters::health))
        // Encounter lifecycle + commands
        .route("/api/encounters", post(encounters::create_encounter))
        .route("/api/encounters/:id", get(encounters::get_encounter))
        .route("/api/encounters/:id/actions", post(encounters::apply_action))
        .route("/api/encounters/:id/rolls", post(encounters::append_roll))
        .route("/api/encounters/:id/chat", post(encounters::append_chat))
        // Push channel
        .route("/ws/encounters/:id", get(ws::encounter_ws))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
