//! SQLite-backed sync state: cursors, task<->event mappings, run log.
//!
//! No business logic lives here; the orchestrator is the only caller. The
//! mapping uniqueness invariants are enforced by the schema itself so an
//! orchestrator bug surfaces as [`SyncDbError::MappingIntegrity`] instead
//! of silently duplicating remote events.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

use crate::sync::types::{SyncCursor, SyncError, SyncMapping, SyncRunResult};

use super::data_dir;

/// Sync state store error.
#[derive(Debug, Error)]
pub enum SyncDbError {
    /// A mapping uniqueness invariant was violated. Never auto-repaired.
    #[error("mapping integrity violation: {0}")]
    MappingIntegrity(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SyncDbError> for SyncError {
    fn from(err: SyncDbError) -> Self {
        match err {
            SyncDbError::MappingIntegrity(msg) => SyncError::MappingIntegrity(msg),
            other => SyncError::Storage(other.to_string()),
        }
    }
}

/// SQLite database holding all durable sync state beyond the task store.
pub struct SyncStateDb {
    conn: Connection,
}

impl SyncStateDb {
    /// Open the database at `~/.config/taskshoot/sync.db`.
    ///
    /// Creates the file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("sync.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, SyncDbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (tests, dry runs).
    pub fn open_memory() -> Result<Self, SyncDbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sync_cursors (
                owner_id          TEXT NOT NULL,
                calendar_id       TEXT NOT NULL,
                sync_token        TEXT,
                last_full_sync_at TEXT,
                last_pushed_at    TEXT,
                PRIMARY KEY (owner_id, calendar_id)
            );

            CREATE TABLE IF NOT EXISTS sync_mappings (
                owner_id       TEXT NOT NULL,
                calendar_id    TEXT NOT NULL,
                task_id        TEXT NOT NULL,
                event_id       TEXT NOT NULL,
                content_hash   TEXT NOT NULL,
                last_synced_at TEXT NOT NULL,
                PRIMARY KEY (owner_id, calendar_id, task_id)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_mappings_event
                ON sync_mappings(owner_id, calendar_id, event_id);

            CREATE TABLE IF NOT EXISTS sync_runs (
                run_id       TEXT PRIMARY KEY,
                owner_id     TEXT NOT NULL,
                started_at   TEXT NOT NULL,
                status       TEXT NOT NULL,
                payload      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_owner
                ON sync_runs(owner_id, started_at);

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    // -- cursors ---------------------------------------------------------

    /// Cursor for (owner, calendar); an empty cursor when none is stored.
    pub fn get_cursor(&self, owner: &str, calendar: &str) -> Result<SyncCursor, SyncDbError> {
        let mut stmt = self.conn.prepare(
            "SELECT sync_token, last_full_sync_at, last_pushed_at
             FROM sync_cursors WHERE owner_id = ?1 AND calendar_id = ?2",
        )?;
        let row = stmt
            .query_row(params![owner, calendar], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .optional()?;

        match row {
            Some((sync_token, full, pushed)) => Ok(SyncCursor {
                owner_id: owner.to_string(),
                calendar_id: calendar.to_string(),
                sync_token,
                last_full_sync_at: parse_opt_ts(full)?,
                last_pushed_at: parse_opt_ts(pushed)?,
            }),
            None => Ok(SyncCursor::empty(owner, calendar)),
        }
    }

    pub fn set_cursor(&self, cursor: &SyncCursor) -> Result<(), SyncDbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_cursors
             (owner_id, calendar_id, sync_token, last_full_sync_at, last_pushed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                cursor.owner_id,
                cursor.calendar_id,
                cursor.sync_token,
                cursor.last_full_sync_at.map(|t| t.to_rfc3339()),
                cursor.last_pushed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Null out the sync token so the next run performs a full resync.
    pub fn clear_sync_token(&self, owner: &str, calendar: &str) -> Result<(), SyncDbError> {
        self.conn.execute(
            "UPDATE sync_cursors SET sync_token = NULL
             WHERE owner_id = ?1 AND calendar_id = ?2",
            params![owner, calendar],
        )?;
        Ok(())
    }

    // -- mappings --------------------------------------------------------

    pub fn get_mapping_by_task(
        &self,
        owner: &str,
        calendar: &str,
        task_id: &str,
    ) -> Result<Option<SyncMapping>, SyncDbError> {
        self.query_mapping(
            "SELECT owner_id, calendar_id, task_id, event_id, content_hash, last_synced_at
             FROM sync_mappings
             WHERE owner_id = ?1 AND calendar_id = ?2 AND task_id = ?3",
            owner,
            calendar,
            task_id,
        )
    }

    pub fn get_mapping_by_event(
        &self,
        owner: &str,
        calendar: &str,
        event_id: &str,
    ) -> Result<Option<SyncMapping>, SyncDbError> {
        self.query_mapping(
            "SELECT owner_id, calendar_id, task_id, event_id, content_hash, last_synced_at
             FROM sync_mappings
             WHERE owner_id = ?1 AND calendar_id = ?2 AND event_id = ?3",
            owner,
            calendar,
            event_id,
        )
    }

    fn query_mapping(
        &self,
        sql: &str,
        owner: &str,
        calendar: &str,
        key: &str,
    ) -> Result<Option<SyncMapping>, SyncDbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let row = stmt
            .query_row(params![owner, calendar, key], mapping_from_row)
            .optional()?;
        row.map(finish_mapping).transpose()
    }

    /// Insert a brand-new mapping. A second live mapping for the same task
    /// or event violates the schema and surfaces as `MappingIntegrity`.
    pub fn insert_mapping(&self, mapping: &SyncMapping) -> Result<(), SyncDbError> {
        let result = self.conn.execute(
            "INSERT INTO sync_mappings
             (owner_id, calendar_id, task_id, event_id, content_hash, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                mapping.owner_id,
                mapping.calendar_id,
                mapping.task_id,
                mapping.event_id,
                mapping.content_hash,
                mapping.last_synced_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, msg))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(SyncDbError::MappingIntegrity(format!(
                    "duplicate mapping for task {} / event {}: {}",
                    mapping.task_id,
                    mapping.event_id,
                    msg.unwrap_or_default()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refresh hash and timestamp of an existing mapping.
    pub fn update_mapping(&self, mapping: &SyncMapping) -> Result<(), SyncDbError> {
        let changed = self.conn.execute(
            "UPDATE sync_mappings SET event_id = ?4, content_hash = ?5, last_synced_at = ?6
             WHERE owner_id = ?1 AND calendar_id = ?2 AND task_id = ?3",
            params![
                mapping.owner_id,
                mapping.calendar_id,
                mapping.task_id,
                mapping.event_id,
                mapping.content_hash,
                mapping.last_synced_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(SyncDbError::Corrupt(format!(
                "no mapping to update for task {}",
                mapping.task_id
            )));
        }
        Ok(())
    }

    pub fn delete_mapping(
        &self,
        owner: &str,
        calendar: &str,
        task_id: &str,
    ) -> Result<(), SyncDbError> {
        self.conn.execute(
            "DELETE FROM sync_mappings
             WHERE owner_id = ?1 AND calendar_id = ?2 AND task_id = ?3",
            params![owner, calendar, task_id],
        )?;
        Ok(())
    }

    pub fn list_mappings(
        &self,
        owner: &str,
        calendar: &str,
    ) -> Result<Vec<SyncMapping>, SyncDbError> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_id, calendar_id, task_id, event_id, content_hash, last_synced_at
             FROM sync_mappings
             WHERE owner_id = ?1 AND calendar_id = ?2
             ORDER BY task_id",
        )?;
        let rows = stmt.query_map(params![owner, calendar], mapping_from_row)?;
        let mut mappings = Vec::new();
        for row in rows {
            mappings.push(finish_mapping(row?)?);
        }
        Ok(mappings)
    }

    // -- run log ---------------------------------------------------------

    /// Append a run outcome. Keyed by run id, so a replayed commit does not
    /// duplicate the record.
    pub fn append_run_result(&self, result: &SyncRunResult) -> Result<(), SyncDbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_runs (run_id, owner_id, started_at, status, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                result.run_id,
                result.owner_id,
                result.started_at.to_rfc3339(),
                result.status.as_str(),
                serde_json::to_string(result)?,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs for an owner, newest first.
    pub fn recent_runs(&self, owner: &str, limit: u32) -> Result<Vec<SyncRunResult>, SyncDbError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM sync_runs
             WHERE owner_id = ?1 ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![owner, limit], |row| row.get::<_, String>(0))?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(serde_json::from_str(&row?)?);
        }
        Ok(runs)
    }

    /// Persist the run outcome and the surviving cursors as one commit.
    /// Cursors go last so a torn commit is always safe to retry.
    pub fn commit_run(
        &mut self,
        result: &SyncRunResult,
        cursors: &[SyncCursor],
    ) -> Result<(), SyncDbError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO sync_runs (run_id, owner_id, started_at, status, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                result.run_id,
                result.owner_id,
                result.started_at.to_rfc3339(),
                result.status.as_str(),
                serde_json::to_string(result)?,
            ],
        )?;
        for cursor in cursors {
            tx.execute(
                "INSERT OR REPLACE INTO sync_cursors
                 (owner_id, calendar_id, sync_token, last_full_sync_at, last_pushed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    cursor.owner_id,
                    cursor.calendar_id,
                    cursor.sync_token,
                    cursor.last_full_sync_at.map(|t| t.to_rfc3339()),
                    cursor.last_pushed_at.map(|t| t.to_rfc3339()),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // -- kv flags --------------------------------------------------------

    /// Record that the owner's refresh grant was rejected; auto-sync stays
    /// off until re-authorization clears the flag.
    pub fn set_reconnect_required(&self, owner: &str, required: bool) -> Result<(), SyncDbError> {
        let key = reconnect_key(owner);
        if required {
            self.conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, '1')",
                params![key],
            )?;
        } else {
            self.conn
                .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        }
        Ok(())
    }

    pub fn reconnect_required(&self, owner: &str) -> Result<bool, SyncDbError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let value = stmt
            .query_row(params![reconnect_key(owner)], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value.is_some())
    }
}

fn reconnect_key(owner: &str) -> String {
    format!("reconnect_required:{owner}")
}

type MappingRow = (String, String, String, String, String, String);

fn mapping_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MappingRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn finish_mapping(row: MappingRow) -> Result<SyncMapping, SyncDbError> {
    let (owner_id, calendar_id, task_id, event_id, content_hash, last_synced_at) = row;
    Ok(SyncMapping {
        owner_id,
        calendar_id,
        task_id,
        event_id,
        content_hash,
        last_synced_at: parse_ts(&last_synced_at)?,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, SyncDbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncDbError::Corrupt(format!("bad timestamp '{s}': {e}")))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, SyncDbError> {
    s.map(|s| parse_ts(&s)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::{RunStatus, SyncDirection};

    fn mapping(task: &str, event: &str) -> SyncMapping {
        SyncMapping {
            owner_id: "alice".to_string(),
            calendar_id: "cal-1".to_string(),
            task_id: task.to_string(),
            event_id: event.to_string(),
            content_hash: "hash-1".to_string(),
            last_synced_at: Utc::now(),
        }
    }

    #[test]
    fn cursor_roundtrip_and_clear() {
        let db = SyncStateDb::open_memory().unwrap();

        let empty = db.get_cursor("alice", "cal-1").unwrap();
        assert_eq!(empty.sync_token, None);

        let cursor = SyncCursor {
            owner_id: "alice".to_string(),
            calendar_id: "cal-1".to_string(),
            sync_token: Some("tok-1".to_string()),
            last_full_sync_at: Some(Utc::now()),
            last_pushed_at: None,
        };
        db.set_cursor(&cursor).unwrap();

        let loaded = db.get_cursor("alice", "cal-1").unwrap();
        assert_eq!(loaded.sync_token.as_deref(), Some("tok-1"));
        assert!(loaded.last_full_sync_at.is_some());

        db.clear_sync_token("alice", "cal-1").unwrap();
        let cleared = db.get_cursor("alice", "cal-1").unwrap();
        assert_eq!(cleared.sync_token, None);
        // Clearing the token must not lose the full-sync timestamp.
        assert!(cleared.last_full_sync_at.is_some());
    }

    #[test]
    fn mapping_lookup_by_task_and_event() {
        let db = SyncStateDb::open_memory().unwrap();
        db.insert_mapping(&mapping("task-1", "evt-1")).unwrap();

        let by_task = db
            .get_mapping_by_task("alice", "cal-1", "task-1")
            .unwrap()
            .unwrap();
        assert_eq!(by_task.event_id, "evt-1");

        let by_event = db
            .get_mapping_by_event("alice", "cal-1", "evt-1")
            .unwrap()
            .unwrap();
        assert_eq!(by_event.task_id, "task-1");

        assert!(db
            .get_mapping_by_task("alice", "cal-1", "task-2")
            .unwrap()
            .is_none());
    }

    #[test]
    fn duplicate_task_mapping_is_an_integrity_violation() {
        let db = SyncStateDb::open_memory().unwrap();
        db.insert_mapping(&mapping("task-1", "evt-1")).unwrap();

        let err = db.insert_mapping(&mapping("task-1", "evt-2")).unwrap_err();
        assert!(matches!(err, SyncDbError::MappingIntegrity(_)));

        // The original row is still the only live mapping.
        let rows = db.list_mappings("alice", "cal-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_id, "evt-1");
    }

    #[test]
    fn duplicate_event_mapping_is_an_integrity_violation() {
        let db = SyncStateDb::open_memory().unwrap();
        db.insert_mapping(&mapping("task-1", "evt-1")).unwrap();

        let err = db.insert_mapping(&mapping("task-2", "evt-1")).unwrap_err();
        assert!(matches!(err, SyncDbError::MappingIntegrity(_)));
    }

    #[test]
    fn update_and_delete_mapping() {
        let db = SyncStateDb::open_memory().unwrap();
        db.insert_mapping(&mapping("task-1", "evt-1")).unwrap();

        let mut updated = mapping("task-1", "evt-1");
        updated.content_hash = "hash-2".to_string();
        db.update_mapping(&updated).unwrap();
        let loaded = db
            .get_mapping_by_task("alice", "cal-1", "task-1")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.content_hash, "hash-2");

        db.delete_mapping("alice", "cal-1", "task-1").unwrap();
        assert!(db
            .get_mapping_by_task("alice", "cal-1", "task-1")
            .unwrap()
            .is_none());

        // Updating a vanished mapping is an error, not a silent insert.
        assert!(db.update_mapping(&updated).is_err());
    }

    #[test]
    fn run_log_appends_and_replays_idempotently() {
        let db = SyncStateDb::open_memory().unwrap();
        let result = SyncRunResult {
            run_id: "run-1".to_string(),
            owner_id: "alice".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            direction: SyncDirection::Both,
            events_processed: 5,
            events_created: 2,
            events_updated: 1,
            events_deleted: 0,
            errors: vec![],
            conflicts: vec![],
            status: RunStatus::Success,
        };

        db.append_run_result(&result).unwrap();
        db.append_run_result(&result).unwrap();

        let runs = db.recent_runs("alice", 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].events_processed, 5);
    }

    #[test]
    fn commit_run_writes_result_and_cursor_together() {
        let mut db = SyncStateDb::open_memory().unwrap();
        let result = SyncRunResult {
            run_id: "run-1".to_string(),
            owner_id: "alice".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            direction: SyncDirection::GcalToTaskshoot,
            events_processed: 1,
            events_created: 1,
            events_updated: 0,
            events_deleted: 0,
            errors: vec![],
            conflicts: vec![],
            status: RunStatus::Success,
        };
        let cursor = SyncCursor {
            owner_id: "alice".to_string(),
            calendar_id: "cal-1".to_string(),
            sync_token: Some("tok-9".to_string()),
            last_full_sync_at: Some(Utc::now()),
            last_pushed_at: None,
        };

        db.commit_run(&result, std::slice::from_ref(&cursor)).unwrap();

        assert_eq!(db.recent_runs("alice", 1).unwrap().len(), 1);
        let loaded = db.get_cursor("alice", "cal-1").unwrap();
        assert_eq!(loaded.sync_token.as_deref(), Some("tok-9"));
    }

    #[test]
    fn reconnect_flag_roundtrip() {
        let db = SyncStateDb::open_memory().unwrap();
        assert!(!db.reconnect_required("alice").unwrap());

        db.set_reconnect_required("alice", true).unwrap();
        assert!(db.reconnect_required("alice").unwrap());
        assert!(!db.reconnect_required("bob").unwrap());

        db.set_reconnect_required("alice", false).unwrap();
        assert!(!db.reconnect_required("alice").unwrap());
    }

    #[test]
    fn opens_on_disk_and_persists() {
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.db");

        {
            let db = SyncStateDb::open_at(&path).unwrap();
            db.insert_mapping(&mapping("task-1", "evt-1")).unwrap();
        }

        let reopened = SyncStateDb::open_at(&path).unwrap();
        assert!(reopened
            .get_mapping_by_task("alice", "cal-1", "task-1")
            .unwrap()
            .is_some());
    }
}
