//! Encounter command endpoints.
//!
//! - `POST /api/encounters`              - create, returns both tokens
//! - `GET  /api/encounters/:id?token=…`  - read current state
//! - `POST /api/encounters/:id/actions`  - host action through the reducer
//! - `POST /api/encounters/:id/rolls`    - append a roll (any role)
//! - `POST /api/encounters/:id/chat`     - append a chat line (any role)
//!
//! Refusals from the store surface as 404 on reads (indistinguishable from
//! a missing encounter, so ids cannot be probed) and 403 on mutations.
//! Every committed mutation is broadcast to the encounter's subscribers
//! before the HTTP reply goes out, inside the encounter's write permit.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dt_engine::EncounterState;
use dt_store::{security, StoreError};

use crate::state::AppState;

const NAME_MAX_CHARS: usize = 200;
const MESSAGE_MAX_CHARS: usize = 1000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateEncounterRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateEncounterResponse {
    pub encounter_id: String,
    pub host_token: String,
    pub player_token: String,
}

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub token: String,
    pub action: Value,
}

#[derive(Debug, Deserialize)]
pub struct RollRequest {
    pub token: String,
    pub roll: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub token: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: EncounterState,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn create_encounter(
    State(state): State<AppState>,
    Json(body): Json<CreateEncounterRequest>,
) -> Response {
    if !char_length_in(&body.name, 1, NAME_MAX_CHARS) {
        return validation_error("name must be 1-200 characters");
    }

    let host_token = security::generate_token();
    let player_token = security::generate_token();
    match state
        .store
        .create_encounter(&body.name, &host_token, &player_token)
    {
        Ok(created) => Json(CreateEncounterResponse {
            encounter_id: created.encounter_id,
            host_token: created.host_token,
            player_token: created.player_token,
        })
        .into_response(),
        Err(err) => store_failure(err),
    }
}

pub async fn get_encounter(
    State(state): State<AppState>,
    Path(encounter_id): Path<String>,
    Query(query): Query<StateQuery>,
) -> Response {
    match state.store.get_state(&encounter_id, &query.token) {
        Ok(Some(doc)) => Json(StateResponse { state: doc }).into_response(),
        Ok(None) => refusal(
            StatusCode::NOT_FOUND,
            "encounter not found or token invalid",
        ),
        Err(err) => store_failure(err),
    }
}

pub async fn apply_action(
    State(state): State<AppState>,
    Path(encounter_id): Path<String>,
    Json(body): Json<ActionRequest>,
) -> Response {
    let _permit = state.encounter_locks.acquire(&encounter_id).await;
    match state
        .store
        .apply_action(&encounter_id, &body.token, &body.action)
    {
        Ok(Some(committed)) => committed_response(&state, &encounter_id, committed),
        Ok(None) => refusal(StatusCode::FORBIDDEN, "host token required"),
        Err(err) => store_failure(err),
    }
}

pub async fn append_roll(
    State(state): State<AppState>,
    Path(encounter_id): Path<String>,
    Json(body): Json<RollRequest>,
) -> Response {
    let _permit = state.encounter_locks.acquire(&encounter_id).await;
    match state.store.append_roll(&encounter_id, &body.token, &body.roll) {
        Ok(Some(committed)) => committed_response(&state, &encounter_id, committed),
        Ok(None) => refusal(StatusCode::FORBIDDEN, "token invalid"),
        Err(err) => store_failure(err),
    }
}

pub async fn append_chat(
    State(state): State<AppState>,
    Path(encounter_id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> Response {
    if !char_length_in(&body.message, 1, MESSAGE_MAX_CHARS) {
        return validation_error("message must be 1-1000 characters");
    }

    let _permit = state.encounter_locks.acquire(&encounter_id).await;
    match state
        .store
        .append_chat(&encounter_id, &body.token, &body.message)
    {
        Ok(Some(committed)) => committed_response(&state, &encounter_id, committed),
        Ok(None) => refusal(StatusCode::FORBIDDEN, "token invalid"),
        Err(err) => store_failure(err),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fan the committed state out to subscribers, then reply with it. Runs
/// while the caller still holds the encounter permit, so broadcasts leave
/// in commit order.
fn committed_response(
    state: &AppState,
    encounter_id: &str,
    committed: EncounterState,
) -> Response {
    state.hub.broadcast(encounter_id, &committed);
    Json(StateResponse { state: committed }).into_response()
}

fn char_length_in(value: &str, min: usize, max: usize) -> bool {
    let chars = value.chars().count();
    (min..=max).contains(&chars)
}

fn validation_error(message: &str) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn refusal(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn store_failure(err: StoreError) -> Response {
    tracing::error!(error = %err, "store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "store failure" })),
    )
        .into_response()
}
