//! Event-log vocabulary.
//!
//! `log` entries are heterogeneous; the `kind` tag selects the shape. The
//! store appends the incoming mutation as one entry (`action`, `roll`,
//! `chat`) and the reducer appends the rest.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{Effect, Role};

/// Phase marker carried by `timing` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingPhase {
    TurnStart,
    TurnEnd,
    RoundStart,
    RoundEnd,
}

/// One entry in an encounter's append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEvent {
    /// The host command as received, before reduction.
    #[serde(rename_all = "camelCase")]
    Action { role: Role, action: Value },
    /// A dice roll, opaque apart from the optional attribution fields.
    #[serde(rename_all = "camelCase")]
    Roll {
        role: Role,
        roll: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        who_label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actor_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        role: Role,
        message: String,
        who_label: String,
        actor_id: Option<String>,
    },
    /// Turn/round boundary. `actor_id` is null at round boundaries and when
    /// the turn order is empty.
    #[serde(rename_all = "camelCase")]
    Timing {
        timing: TimingPhase,
        actor_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ConcentrationCheckNeeded { actor_id: String, dc: i64 },
    #[serde(rename_all = "camelCase")]
    ConcentrationResolved { actor_id: String, success: bool },
    #[serde(rename_all = "camelCase")]
    EffectAdded { effect: Effect },
    #[serde(rename_all = "camelCase")]
    EffectRemoved { effect_id: String },
    #[serde(rename_all = "camelCase")]
    SaveApplied { effect_id: String, success: bool },
}
