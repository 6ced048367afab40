//! Volatile store variant.
//!
//! Encounters live in a process-wide map; each encounter slot carries its
//! state and token records behind its own mutex, which is the per-encounter
//! critical section: readers of different encounters never contend, and
//! two writers of the same encounter serialize on the slot lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use uuid::Uuid;

use dt_engine::{build_initial_state, EncounterState, Role};

use crate::commit::{commit, Mutation};
use crate::{
    match_role, security, CreatedEncounter, EncounterAccess, EncounterStore, Result, TokenRecord,
};

struct EncounterSlot {
    state: EncounterState,
    tokens: Vec<TokenRecord>,
}

/// In-memory [`EncounterStore`].
pub struct InMemoryEncounterStore {
    server_salt: String,
    encounters: RwLock<HashMap<String, Arc<Mutex<EncounterSlot>>>>,
}

impl InMemoryEncounterStore {
    pub fn new(server_salt: impl Into<String>) -> Self {
        Self {
            server_salt: server_salt.into(),
            encounters: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, encounter_id: &str) -> Option<Arc<Mutex<EncounterSlot>>> {
        self.encounters.read().get(encounter_id).cloned()
    }

    /// Verify the caller and commit one mutation under the slot lock.
    fn mutate(
        &self,
        encounter_id: &str,
        raw_token: &str,
        host_only: bool,
        mutation: impl FnOnce(Role, &EncounterState) -> EncounterState,
    ) -> Result<Option<EncounterState>> {
        let Some(slot) = self.slot(encounter_id) else {
            return Ok(None);
        };
        let mut slot = slot.lock();
        let Some(role) = match_role(&slot.tokens, raw_token, &self.server_salt) else {
            return Ok(None);
        };
        if host_only && role != Role::Host {
            return Ok(None);
        }

        let next = mutation(role, &slot.state);
        slot.state = next.clone();
        Ok(Some(next))
    }
}

impl EncounterStore for InMemoryEncounterStore {
    fn create_encounter(
        &self,
        name: &str,
        host_token: &str,
        player_token: &str,
    ) -> Result<CreatedEncounter> {
        let encounter_id = Uuid::new_v4().to_string();
        let state = build_initial_state(&encounter_id, name);
        let now = Utc::now();
        let tokens = vec![
            TokenRecord {
                role: Role::Host,
                token_hash: security::hash_token(host_token, &self.server_salt),
                created_at: now,
                revoked_at: None,
            },
            TokenRecord {
                role: Role::Player,
                token_hash: security::hash_token(player_token, &self.server_salt),
                created_at: now,
                revoked_at: None,
            },
        ];

        self.encounters.write().insert(
            encounter_id.clone(),
            Arc::new(Mutex::new(EncounterSlot { state, tokens })),
        );
        tracing::info!(encounter_id = %encounter_id, name = %name, "encounter created");

        Ok(CreatedEncounter {
            encounter_id,
            host_token: host_token.to_owned(),
            player_token: player_token.to_owned(),
        })
    }

    fn get_access(&self, encounter_id: &str, raw_token: &str) -> Result<Option<EncounterAccess>> {
        let Some(slot) = self.slot(encounter_id) else {
            return Ok(None);
        };
        let slot = slot.lock();
        let Some(role) = match_role(&slot.tokens, raw_token, &self.server_salt) else {
            return Ok(None);
        };
        Ok(Some(EncounterAccess {
            encounter_id: encounter_id.to_owned(),
            role,
            state: slot.state.clone(),
        }))
    }

    fn apply_action(
        &self,
        encounter_id: &str,
        raw_token: &str,
        action: &Value,
    ) -> Result<Option<EncounterState>> {
        self.mutate(encounter_id, raw_token, true, |role, state| {
            commit(state, Mutation::Action { role, action })
        })
    }

    fn append_roll(
        &self,
        encounter_id: &str,
        raw_token: &str,
        roll: &Value,
    ) -> Result<Option<EncounterState>> {
        self.mutate(encounter_id, raw_token, false, |role, state| {
            commit(state, Mutation::Roll { role, roll })
        })
    }

    fn append_chat(
        &self,
        encounter_id: &str,
        raw_token: &str,
        message: &str,
    ) -> Result<Option<EncounterState>> {
        self.mutate(encounter_id, raw_token, false, |role, state| {
            commit(state, Mutation::Chat { role, message })
        })
    }
}
