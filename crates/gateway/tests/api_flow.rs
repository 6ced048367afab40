//! HTTP command-surface scenarios against the in-process router.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use dt_gateway::api;
use dt_gateway::config::Config;
use dt_gateway::encounter_lock::EncounterLockMap;
use dt_gateway::hub::EncounterHub;
use dt_gateway::state::AppState;

fn test_app() -> Router {
    let config = Arc::new(Config::from_lookup(|_| None));
    let store = dt_store::create_store(None, &config.server_salt).unwrap();
    let state = AppState {
        config,
        store,
        hub: Arc::new(EncounterHub::new()),
        encounter_locks: Arc::new(EncounterLockMap::new()),
    };
    api::router().with_state(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create(app: &Router, name: &str) -> Value {
    let (status, body) = send(app, "POST", "/api/encounters", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn create_and_fetch() {
    let app = test_app();

    let created = create(&app, "Goblin Cave").await;
    let encounter_id = created["encounter_id"].as_str().unwrap();
    let host_token = created["host_token"].as_str().unwrap();
    let player_token = created["player_token"].as_str().unwrap();
    assert!(!encounter_id.is_empty());
    assert_ne!(host_token, player_token);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/encounters/{encounter_id}?token={player_token}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let state = &body["state"];
    assert_eq!(state["id"], encounter_id);
    assert_eq!(state["version"], 1);
    assert_eq!(state["status"], "setup");
    assert_eq!(state["meta"]["name"], "Goblin Cave");
}

#[tokio::test]
async fn host_action_promotes_status() {
    let app = test_app();
    let created = create(&app, "Session").await;
    let encounter_id = created["encounter_id"].as_str().unwrap();
    let host_token = created["host_token"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/encounters/{encounter_id}/actions"),
        Some(json!({ "token": host_token, "action": { "type": "NEXT_TURN" } })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let state = &body["state"];
    assert_eq!(state["version"], 2);
    assert_eq!(state["status"], "running");
    let last = state["log"].as_array().unwrap().last().unwrap();
    assert_eq!(last["kind"], "timing");
    assert_eq!(last["timing"], "turn_end");
    assert!(last["actorId"].is_null());
}

#[tokio::test]
async fn player_cannot_mutate() {
    let app = test_app();
    let created = create(&app, "Session").await;
    let encounter_id = created["encounter_id"].as_str().unwrap();
    let player_token = created["player_token"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/encounters/{encounter_id}/actions"),
        Some(json!({ "token": player_token, "action": { "type": "NEXT_TURN" } })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The refused action must not have committed a version.
    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/encounters/{encounter_id}?token={player_token}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["version"], 1);
}

#[tokio::test]
async fn roll_then_chat_by_player() {
    let app = test_app();
    let created = create(&app, "Session").await;
    let encounter_id = created["encounter_id"].as_str().unwrap();
    let player_token = created["player_token"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/encounters/{encounter_id}/rolls"),
        Some(json!({ "token": player_token, "roll": { "kind": "d20", "value": 12 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["version"], 2);
    let last = body["state"]["log"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["kind"], "roll");
    assert_eq!(last["roll"]["value"], 12);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/encounters/{encounter_id}/chat"),
        Some(json!({ "token": player_token, "message": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["version"], 3);
    let entry = body["state"]["chat"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(
        entry,
        json!({
            "role": "PLAYER",
            "text": "hello",
            "whoLabel": "Player",
            "actorId": null,
        })
    );
}

#[tokio::test]
async fn invalid_tokens_and_unknown_ids_are_refused() {
    let app = test_app();
    let created = create(&app, "Session").await;
    let encounter_id = created["encounter_id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/encounters/{encounter_id}?token=invalid"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/encounters/no-such?token=x", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/encounters/{encounter_id}/chat"),
        Some(json!({ "token": "invalid", "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn validation_failures_are_unprocessable() {
    let app = test_app();

    let (status, _) = send(&app, "POST", "/api/encounters", Some(json!({ "name": "" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let long_name = "x".repeat(201);
    let (status, _) = send(
        &app,
        "POST",
        "/api/encounters",
        Some(json!({ "name": long_name })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let created = create(&app, "Session").await;
    let encounter_id = created["encounter_id"].as_str().unwrap();
    let player_token = created["player_token"].as_str().unwrap();
    let long_message = "y".repeat(1001);
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/encounters/{encounter_id}/chat"),
        Some(json!({ "token": player_token, "message": long_message })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn health_probe_responds() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
