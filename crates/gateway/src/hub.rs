//! Push fan-out hub.
//!
//! Tracks the live subscriber sessions of every encounter and delivers a
//! full-state message to each of them after every committed mutation.
//! Delivery is best-effort and non-blocking: a session whose channel is
//! closed or full is swept out after the broadcast instead of ever buffering
//! unboundedly. Callers serialize broadcasts per encounter by invoking the
//! hub inside the encounter's write critical section.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use dt_engine::{EncounterState, Role};

/// Per-session queue depth. A subscriber this far behind is considered dead.
pub const SUBSCRIBER_BUFFER: usize = 32;

/// Server → client push frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    /// The complete state document; sent on connect and after every commit.
    #[serde(rename = "state.full")]
    StateFull { state: EncounterState },
}

/// Channel into a subscriber's socket writer task.
pub type SubscriberSink = mpsc::Sender<PushMessage>;

struct Subscriber {
    role: Role,
    connected_at: DateTime<Utc>,
    sink: SubscriberSink,
}

/// Registry of live subscriber sessions, keyed by encounter.
pub struct EncounterHub {
    session_counter: AtomicU64,
    subscribers: RwLock<HashMap<String, HashMap<u64, Subscriber>>>,
}

impl Default for EncounterHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EncounterHub {
    pub fn new() -> Self {
        Self {
            session_counter: AtomicU64::new(0),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an authorized session and queue the current state as its
    /// first message. Returns the session id for later `disconnect`.
    ///
    /// The initial snapshot is enqueued before the session becomes visible
    /// to `broadcast`, so no later state can overtake it.
    pub fn connect(
        &self,
        encounter_id: &str,
        role: Role,
        state: &EncounterState,
        sink: SubscriberSink,
    ) -> u64 {
        let session_id = self.session_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = sink.try_send(PushMessage::StateFull {
            state: state.clone(),
        });

        let mut subscribers = self.subscribers.write();
        subscribers.entry(encounter_id.to_owned()).or_default().insert(
            session_id,
            Subscriber {
                role,
                connected_at: Utc::now(),
                sink,
            },
        );
        tracing::info!(
            encounter_id = %encounter_id,
            session_id,
            role = %role.as_str(),
            "subscriber connected"
        );
        session_id
    }

    /// Remove a session; the encounter's entry disappears with its last
    /// subscriber.
    pub fn disconnect(&self, encounter_id: &str, session_id: u64) {
        let mut subscribers = self.subscribers.write();
        let Some(sessions) = subscribers.get_mut(encounter_id) else {
            return;
        };
        if let Some(session) = sessions.remove(&session_id) {
            tracing::info!(
                encounter_id = %encounter_id,
                session_id,
                role = %session.role.as_str(),
                connected_secs = Utc::now()
                    .signed_duration_since(session.connected_at)
                    .num_seconds(),
                "subscriber disconnected"
            );
        }
        if sessions.is_empty() {
            subscribers.remove(encounter_id);
        }
    }

    /// Deliver the committed state to every subscriber of the encounter.
    /// Sessions that fail to accept the frame are disconnected afterwards;
    /// a failed delivery never affects the commit.
    pub fn broadcast(&self, encounter_id: &str, state: &EncounterState) {
        let stale: Vec<u64> = {
            let subscribers = self.subscribers.read();
            let Some(sessions) = subscribers.get(encounter_id) else {
                return;
            };

            let mut stale = Vec::new();
            for (session_id, session) in sessions {
                let frame = PushMessage::StateFull {
                    state: state.clone(),
                };
                match session.sink.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            encounter_id = %encounter_id,
                            session_id,
                            "subscriber cannot keep up, dropping session"
                        );
                        stale.push(*session_id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        stale.push(*session_id);
                    }
                }
            }
            stale
        };

        for session_id in stale {
            self.disconnect(encounter_id, session_id);
        }
    }

    pub fn subscriber_count(&self, encounter_id: &str) -> usize {
        self.subscribers
            .read()
            .get(encounter_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}
