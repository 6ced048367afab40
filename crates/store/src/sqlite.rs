//! Durable store variant on SQLite.
//!
//! One connection behind a mutex: commits are serialized process-wide, which
//! trivially satisfies the single-writer-per-encounter requirement. Every
//! commit runs in one transaction: secondary log row (rolls/chat), snapshot
//! row, and the `encounters` pointer advance together or not at all.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::Value;
use uuid::Uuid;

use dt_engine::{build_initial_state, EncounterState, Role};

use crate::commit::{commit, string_field, Mutation};
use crate::{security, CreatedEncounter, EncounterAccess, EncounterStore, Result, StoreError};

pub const SCHEMA_VERSION: i64 = 1;

/// SQLite-backed [`EncounterStore`].
pub struct SqliteEncounterStore {
    server_salt: String,
    conn: Mutex<Connection>,
}

impl SqliteEncounterStore {
    /// Open (or create) the database behind `database_url`. Accepts a bare
    /// filesystem path or a `sqlite://` URL; `:memory:` works for tests.
    pub fn open(database_url: &str, server_salt: impl Into<String>) -> Result<Self> {
        let path = database_url
            .strip_prefix("sqlite://")
            .unwrap_or(database_url);
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        let store = Self {
            server_salt: server_salt.into(),
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        tracing::info!(database = %path, "sqlite encounter store ready");
        Ok(store)
    }

    pub fn open_in_memory(server_salt: impl Into<String>) -> Result<Self> {
        Self::open(":memory:", server_salt)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if current > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchemaVersion {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }
        if current < 1 {
            conn.execute_batch(include_str!("../migrations/0001_encounters.sql"))?;
            conn.execute("PRAGMA user_version = 1", []).map(|_| ())?;
        }
        Ok(())
    }

    /// Latest snapshot via the `current_version` pointer.
    fn load_state(conn: &Connection, encounter_id: &str) -> Result<Option<EncounterState>> {
        let state_json: Option<String> = conn
            .query_row(
                "
                SELECT s.state_json
                FROM encounters e
                JOIN encounter_snapshots s
                  ON s.encounter_id = e.id AND s.version = e.current_version
                WHERE e.id = ?1
                ",
                params![encounter_id],
                |row| row.get(0),
            )
            .optional()?;
        match state_json {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Scan the encounter's unrevoked token rows for a constant-time match.
    fn verify_role(&self, conn: &Connection, encounter_id: &str, raw_token: &str) -> Result<Option<Role>> {
        let mut stmt = conn.prepare(
            "
            SELECT role, token_hash
            FROM encounter_tokens
            WHERE encounter_id = ?1 AND revoked_at IS NULL
            ",
        )?;
        let rows = stmt.query_map(params![encounter_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut matched = None;
        for row in rows {
            let (role, token_hash) = row?;
            if security::verify_token(raw_token, &token_hash, &self.server_salt) {
                matched = matched.or_else(|| parse_role(&role));
            }
        }
        Ok(matched)
    }

    /// Insert the new snapshot and advance the encounter pointer.
    fn persist_snapshot(tx: &Transaction<'_>, state: &EncounterState) -> Result<()> {
        let state_json = serde_json::to_string(state)?;
        let stamp = state.meta.updated_at.to_rfc3339();
        tx.execute(
            "
            INSERT INTO encounter_snapshots (encounter_id, version, created_at, state_json)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![state.id, state.version as i64, stamp, state_json],
        )?;
        tx.execute(
            "
            UPDATE encounters
            SET current_version = ?2, status = ?3, updated_at = ?4
            WHERE id = ?1
            ",
            params![state.id, state.version as i64, state.status.as_str(), stamp],
        )?;
        Ok(())
    }
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "HOST" => Some(Role::Host),
        "PLAYER" => Some(Role::Player),
        other => {
            tracing::warn!(role = %other, "ignoring token row with unknown role");
            None
        }
    }
}

impl EncounterStore for SqliteEncounterStore {
    fn create_encounter(
        &self,
        name: &str,
        host_token: &str,
        player_token: &str,
    ) -> Result<CreatedEncounter> {
        let encounter_id = Uuid::new_v4().to_string();
        let state = build_initial_state(&encounter_id, name);
        let now = Utc::now().to_rfc3339();
        let state_json = serde_json::to_string(&state)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "
            INSERT INTO encounters (id, name, status, current_version, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            ",
            params![encounter_id, name, state.status.as_str(), now],
        )?;
        for (role, raw_token) in [(Role::Host, host_token), (Role::Player, player_token)] {
            tx.execute(
                "
                INSERT INTO encounter_tokens (encounter_id, role, token_hash, created_at)
                VALUES (?1, ?2, ?3, ?4)
                ",
                params![
                    encounter_id,
                    role.as_str(),
                    security::hash_token(raw_token, &self.server_salt),
                    now
                ],
            )?;
        }
        tx.execute(
            "
            INSERT INTO encounter_snapshots (encounter_id, version, created_at, state_json)
            VALUES (?1, 1, ?2, ?3)
            ",
            params![encounter_id, now, state_json],
        )?;
        tx.commit()?;
        tracing::info!(encounter_id = %encounter_id, name = %name, "encounter created");

        Ok(CreatedEncounter {
            encounter_id,
            host_token: host_token.to_owned(),
            player_token: player_token.to_owned(),
        })
    }

    fn get_access(&self, encounter_id: &str, raw_token: &str) -> Result<Option<EncounterAccess>> {
        let conn = self.conn.lock();
        let Some(state) = Self::load_state(&conn, encounter_id)? else {
            return Ok(None);
        };
        let Some(role) = self.verify_role(&conn, encounter_id, raw_token)? else {
            return Ok(None);
        };
        Ok(Some(EncounterAccess {
            encounter_id: encounter_id.to_owned(),
            role,
            state,
        }))
    }

    fn apply_action(
        &self,
        encounter_id: &str,
        raw_token: &str,
        action: &Value,
    ) -> Result<Option<EncounterState>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let Some(state) = Self::load_state(&tx, encounter_id)? else {
            return Ok(None);
        };
        let Some(role) = self.verify_role(&tx, encounter_id, raw_token)? else {
            return Ok(None);
        };
        if role != Role::Host {
            return Ok(None);
        }

        let next = commit(&state, Mutation::Action { role, action });
        Self::persist_snapshot(&tx, &next)?;
        tx.commit()?;
        Ok(Some(next))
    }

    fn append_roll(
        &self,
        encounter_id: &str,
        raw_token: &str,
        roll: &Value,
    ) -> Result<Option<EncounterState>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let Some(state) = Self::load_state(&tx, encounter_id)? else {
            return Ok(None);
        };
        let Some(role) = self.verify_role(&tx, encounter_id, raw_token)? else {
            return Ok(None);
        };

        let next = commit(&state, Mutation::Roll { role, roll });
        tx.execute(
            "
            INSERT INTO encounter_rolls (encounter_id, created_at, actor_id, who_label, roll_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                encounter_id,
                next.meta.updated_at.to_rfc3339(),
                string_field(roll, "actorId"),
                string_field(roll, "whoLabel"),
                serde_json::to_string(roll)?
            ],
        )?;
        Self::persist_snapshot(&tx, &next)?;
        tx.commit()?;
        Ok(Some(next))
    }

    fn append_chat(
        &self,
        encounter_id: &str,
        raw_token: &str,
        message: &str,
    ) -> Result<Option<EncounterState>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let Some(state) = Self::load_state(&tx, encounter_id)? else {
            return Ok(None);
        };
        let Some(role) = self.verify_role(&tx, encounter_id, raw_token)? else {
            return Ok(None);
        };

        let next = commit(&state, Mutation::Chat { role, message });
        tx.execute(
            "
            INSERT INTO encounter_chat (encounter_id, created_at, who_label, actor_id, text)
            VALUES (?1, ?2, ?3, NULL, ?4)
            ",
            params![
                encounter_id,
                next.meta.updated_at.to_rfc3339(),
                role.who_label(),
                message
            ],
        )?;
        Self::persist_snapshot(&tx, &next)?;
        tx.commit()?;
        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn migrate_sets_user_version() {
        let store = SqliteEncounterStore::open_in_memory("salt").unwrap();
        let version: i64 = store
            .conn
            .lock()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn roll_commit_writes_secondary_row_snapshot_and_pointer() {
        let store = SqliteEncounterStore::open_in_memory("salt").unwrap();
        let created = store
            .create_encounter("Issue5", "host-1", "player-1")
            .unwrap();

        let state = store
            .append_roll(
                &created.encounter_id,
                "player-1",
                &json!({"kind": "d20", "value": 18}),
            )
            .unwrap()
            .unwrap();
        assert_eq!(state.version, 2);

        let conn = store.conn.lock();
        let rolls: i64 = conn
            .query_row("SELECT COUNT(*) FROM encounter_rolls", [], |r| r.get(0))
            .unwrap();
        let snapshots: i64 = conn
            .query_row("SELECT COUNT(*) FROM encounter_snapshots", [], |r| r.get(0))
            .unwrap();
        let pointer: i64 = conn
            .query_row(
                "SELECT current_version FROM encounters WHERE id = ?1",
                params![created.encounter_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(rolls, 1);
        assert_eq!(snapshots, 2);
        assert_eq!(pointer, 2);
    }

    #[test]
    fn chat_commit_writes_secondary_row() {
        let store = SqliteEncounterStore::open_in_memory("salt").unwrap();
        let created = store
            .create_encounter("Issue5", "host-1", "player-1")
            .unwrap();

        let state = store
            .append_chat(&created.encounter_id, "host-1", "Ping")
            .unwrap()
            .unwrap();
        assert_eq!(state.version, 2);
        assert_eq!(state.chat.last().unwrap().who_label, "Host");

        let conn = store.conn.lock();
        let (who_label, text): (String, String) = conn
            .query_row(
                "SELECT who_label, text FROM encounter_chat",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(who_label, "Host");
        assert_eq!(text, "Ping");
    }

    #[test]
    fn reopening_a_file_store_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encounters.db");
        let url = path.to_string_lossy().to_string();

        let encounter_id = {
            let store = SqliteEncounterStore::open(&url, "salt").unwrap();
            let created = store
                .create_encounter("Persistent", "host-1", "player-1")
                .unwrap();
            store
                .apply_action(
                    &created.encounter_id,
                    "host-1",
                    &json!({"type": "NEXT_TURN"}),
                )
                .unwrap()
                .unwrap();
            created.encounter_id
        };

        let reopened = SqliteEncounterStore::open(&url, "salt").unwrap();
        let access = reopened
            .get_access(&encounter_id, "player-1")
            .unwrap()
            .unwrap();
        assert_eq!(access.role, Role::Player);
        assert_eq!(access.state.version, 2);
        assert_eq!(access.state.meta.name, "Persistent");
    }
}
