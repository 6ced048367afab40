//! WebSocket push channel.
//!
//! Flow:
//! 1. Client connects to `/ws/encounters/:id?token=<raw-token>`
//! 2. Token resolves through the store; failure closes with 1008
//! 3. The current state goes out as the first `state.full` frame
//! 4. Every committed mutation arrives as another `state.full` frame;
//!    inbound frames are liveness only and are discarded

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::hub::{PushMessage, SUBSCRIBER_BUFFER};
use crate::state::AppState;

/// WebSocket close code for authorization failure (policy violation).
const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /ws/encounters/:id, upgraded to the push channel.
pub async fn encounter_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(encounter_id): Path<String>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, encounter_id, query.token))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    encounter_id: String,
    token: Option<String>,
) {
    let Some(token) = token.filter(|token| !token.is_empty()) else {
        refuse(socket, "missing token").await;
        return;
    };

    // Register under the encounter's write permit: nothing can commit (and
    // broadcast) between the access check and the initial snapshot, so the
    // subscriber's version stream starts exactly at the current version.
    let (session_id, mut rx) = {
        let _permit = state.encounter_locks.acquire(&encounter_id).await;
        let access = match state.store.get_access(&encounter_id, &token) {
            Ok(Some(access)) => access,
            Ok(None) => {
                drop(_permit);
                refuse(socket, "encounter not found or token invalid").await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, encounter_id = %encounter_id, "access check failed");
                drop(_permit);
                refuse(socket, "store failure").await;
                return;
            }
        };
        let (sink, rx) = mpsc::channel::<PushMessage>(SUBSCRIBER_BUFFER);
        let session_id = state
            .hub
            .connect(&encounter_id, access.role, &access.state, sink);
        (session_id, rx)
    };

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Writer task: drain hub frames into the socket. When the hub drops the
    // session (disconnect or backpressure sweep) the channel closes and the
    // socket is shut down.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode push frame");
                    break;
                }
            };
            if ws_sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: clients are silent; inbound frames only signal liveness
    // or disconnection.
    while let Some(Ok(message)) = ws_stream.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }

    state.hub.disconnect(&encounter_id, session_id);
    writer.abort();
    tracing::debug!(encounter_id = %encounter_id, session_id, "push session ended");
}

async fn refuse(mut socket: WebSocket, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_POLICY_VIOLATION,
            reason: reason.to_owned().into(),
        })))
        .await;
}
