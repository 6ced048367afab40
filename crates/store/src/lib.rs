//! Encounter persistence and the authorization boundary.
//!
//! The store is the only writer of encounter state. It verifies the caller's
//! token, runs the commit discipline (see [`commit`]), and persists the
//! resulting snapshot. Two behaviorally identical variants exist: the
//! volatile [`InMemoryEncounterStore`] and the SQLite-backed
//! [`SqliteEncounterStore`]; selection is purely on whether a database URL
//! is configured.

mod commit;
pub mod memory;
pub mod security;
pub mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use dt_engine::{EncounterState, Role};

pub use memory::InMemoryEncounterStore;
pub use sqlite::SqliteEncounterStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Store failure: the durable backend rejected a read or write. Callers
/// translate this to a 500; authorization refusals are `Ok(None)` instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Returned by `create_encounter`: the id plus the two raw tokens, which are
/// never stored and never shown again.
#[derive(Debug, Clone)]
pub struct CreatedEncounter {
    pub encounter_id: String,
    pub host_token: String,
    pub player_token: String,
}

/// A verified caller: which encounter, as which role, and the state at the
/// moment of verification.
#[derive(Debug, Clone)]
pub struct EncounterAccess {
    pub encounter_id: String,
    pub role: Role,
    pub state: EncounterState,
}

/// One token row for an encounter. The raw token is never stored.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub role: Role,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Scan an encounter's token records for a constant-time digest match.
/// Revoked records never match; the whole set is scanned regardless of
/// where a match occurs.
pub(crate) fn match_role(
    tokens: &[TokenRecord],
    raw_token: &str,
    server_salt: &str,
) -> Option<Role> {
    let mut matched = None;
    for record in tokens {
        if record.revoked_at.is_some() {
            continue;
        }
        if security::verify_token(raw_token, &record.token_hash, server_salt) {
            matched = matched.or(Some(record.role));
        }
    }
    matched
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persistence and authorization capability for encounters.
///
/// Every operation that takes a token returns `Ok(None)` when the encounter
/// does not exist, the token does not match an unrevoked record, or (for
/// `apply_action`) the matched role is not `HOST`. Mutating operations
/// return the committed state.
pub trait EncounterStore: Send + Sync {
    /// Create an encounter at version 1 and persist both token digests.
    fn create_encounter(
        &self,
        name: &str,
        host_token: &str,
        player_token: &str,
    ) -> Result<CreatedEncounter>;

    /// Resolve a token to its role and the current state.
    fn get_access(&self, encounter_id: &str, raw_token: &str) -> Result<Option<EncounterAccess>>;

    /// Current state for any valid role.
    fn get_state(&self, encounter_id: &str, raw_token: &str) -> Result<Option<EncounterState>> {
        Ok(self
            .get_access(encounter_id, raw_token)?
            .map(|access| access.state))
    }

    /// Run a host action through the reducer and commit. HOST only.
    fn apply_action(
        &self,
        encounter_id: &str,
        raw_token: &str,
        action: &Value,
    ) -> Result<Option<EncounterState>>;

    /// Append an opaque roll record to the log and commit.
    fn append_roll(
        &self,
        encounter_id: &str,
        raw_token: &str,
        roll: &Value,
    ) -> Result<Option<EncounterState>>;

    /// Append a chat message to the log and the chat transcript and commit.
    fn append_chat(
        &self,
        encounter_id: &str,
        raw_token: &str,
        message: &str,
    ) -> Result<Option<EncounterState>>;
}

/// Pick the store variant: a configured database URL selects the durable
/// SQLite store, otherwise encounters live in process memory.
pub fn create_store(
    database_url: Option<&str>,
    server_salt: &str,
) -> Result<Arc<dyn EncounterStore>> {
    match database_url {
        Some(url) => Ok(Arc::new(SqliteEncounterStore::open(url, server_salt)?)),
        None => Ok(Arc::new(InMemoryEncounterStore::new(server_salt))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_role_skips_revoked_records() {
        let salt = "salt";
        let tokens = vec![
            TokenRecord {
                role: Role::Host,
                token_hash: security::hash_token("host-1", salt),
                created_at: Utc::now(),
                revoked_at: Some(Utc::now()),
            },
            TokenRecord {
                role: Role::Player,
                token_hash: security::hash_token("player-1", salt),
                created_at: Utc::now(),
                revoked_at: None,
            },
        ];

        assert!(match_role(&tokens, "host-1", salt).is_none());
        assert_eq!(match_role(&tokens, "player-1", salt), Some(Role::Player));
        assert!(match_role(&tokens, "stranger", salt).is_none());
    }
}
