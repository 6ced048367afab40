//! The encounter state document.
//!
//! One document per encounter, camelCase on the wire. The reducer reads a
//! small set of typed fields; everything else (actor records, effect extras,
//! concentration extras) passes through untouched so clients can attach
//! fields the server has never heard of.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Roles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Caller role attached to every token and log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// May mutate game state via actions, roll, and chat.
    Host,
    /// May roll and chat only.
    Player,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Host => "HOST",
            Role::Player => "PLAYER",
        }
    }

    /// Display label used in chat entries and roll rows.
    pub fn who_label(self) -> &'static str {
        match self {
            Role::Host => "Host",
            Role::Player => "Player",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Document pieces
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncounterStatus {
    Setup,
    Running,
}

impl EncounterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EncounterStatus::Setup => "setup",
            EncounterStatus::Running => "running",
        }
    }
}

/// A transient modifier attached to an actor.
///
/// The reducer only interprets the four optional fields below; any other
/// keys ride along in `extra` and survive every copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effect {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds_remaining: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentration_actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_concentration: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-actor concentration slot. A `None` value in the map means the actor
/// lost concentration (the slot is kept, nulled, on the wire).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcentrationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_needed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_damage_taken: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub role: Role,
    pub text: String,
    pub who_label: String,
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterMeta {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The full encounter document at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterState {
    pub id: String,
    pub version: u64,
    pub status: EncounterStatus,
    pub round: u64,
    pub turn_index: usize,
    pub turn_order: Vec<String>,
    /// Actor records, opaque to the reducer.
    pub actors: Map<String, Value>,
    pub effects: Vec<Effect>,
    pub concentration: BTreeMap<String, Option<ConcentrationEntry>>,
    pub chat: Vec<ChatEntry>,
    pub log: Vec<crate::event::LogEvent>,
    pub meta: EncounterMeta,
}

/// Build the canonical initial state for a fresh encounter.
pub fn build_initial_state(encounter_id: &str, name: &str) -> EncounterState {
    let now = Utc::now();
    EncounterState {
        id: encounter_id.to_owned(),
        version: 1,
        status: EncounterStatus::Setup,
        round: 1,
        turn_index: 0,
        turn_order: Vec::new(),
        actors: Map::new(),
        effects: Vec::new(),
        concentration: BTreeMap::new(),
        chat: Vec::new(),
        log: Vec::new(),
        meta: EncounterMeta {
            name: name.to_owned(),
            created_at: now,
            updated_at: now,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_starts_at_version_one_in_setup() {
        let state = build_initial_state("enc-1", "Goblin Cave");

        assert_eq!(state.id, "enc-1");
        assert_eq!(state.version, 1);
        assert_eq!(state.status, EncounterStatus::Setup);
        assert_eq!(state.round, 1);
        assert_eq!(state.turn_index, 0);
        assert!(state.turn_order.is_empty());
        assert!(state.actors.is_empty());
        assert!(state.effects.is_empty());
        assert!(state.concentration.is_empty());
        assert!(state.chat.is_empty());
        assert!(state.log.is_empty());
        assert_eq!(state.meta.name, "Goblin Cave");
        assert_eq!(state.meta.created_at, state.meta.updated_at);
    }

    #[test]
    fn state_serializes_camel_case() {
        let state = build_initial_state("enc-2", "Session");
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["status"], "setup");
        assert_eq!(json["turnIndex"], 0);
        assert!(json["turnOrder"].as_array().unwrap().is_empty());
        assert_eq!(json["meta"]["name"], "Session");
        assert!(json["meta"]["createdAt"].is_string());
    }

    #[test]
    fn effect_round_trips_unknown_fields() {
        let raw = serde_json::json!({
            "id": "e1",
            "name": "Bless",
            "roundsRemaining": 3,
            "icon": "sparkles",
        });
        let effect: Effect = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(effect.rounds_remaining, Some(3));
        assert_eq!(effect.extra["name"], "Bless");
        assert_eq!(serde_json::to_value(&effect).unwrap(), raw);
    }

    #[test]
    fn concentration_slot_serializes_null_when_lost() {
        let mut state = build_initial_state("enc-3", "Session");
        state.concentration.insert("caster".into(), None);

        let json = serde_json::to_value(&state).unwrap();
        assert!(json["concentration"]["caster"].is_null());
    }

    #[test]
    fn role_labels() {
        assert_eq!(Role::Host.as_str(), "HOST");
        assert_eq!(Role::Player.who_label(), "Player");
        assert_eq!(serde_json::to_value(Role::Player).unwrap(), "PLAYER");
    }
}
