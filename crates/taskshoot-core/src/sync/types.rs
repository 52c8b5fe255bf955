//! Core types for calendar synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskStoreError;

/// Which way changes flow during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Import remote events into local tasks only.
    GcalToTaskshoot,
    /// Export local tasks to remote events only.
    TaskshootToGcal,
    /// Import first, then export; timestamp tiebreak on conflicts.
    Both,
}

impl SyncDirection {
    pub fn pulls(&self) -> bool {
        matches!(self, SyncDirection::GcalToTaskshoot | SyncDirection::Both)
    }

    pub fn pushes(&self) -> bool {
        matches!(self, SyncDirection::TaskshootToGcal | SyncDirection::Both)
    }

    /// Parse the wire name (`gcal_to_taskshoot`, `taskshoot_to_gcal`, `both`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gcal_to_taskshoot" => Some(SyncDirection::GcalToTaskshoot),
            "taskshoot_to_gcal" => Some(SyncDirection::TaskshootToGcal),
            "both" => Some(SyncDirection::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::GcalToTaskshoot => "gcal_to_taskshoot",
            SyncDirection::TaskshootToGcal => "taskshoot_to_gcal",
            SyncDirection::Both => "both",
        }
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every item applied cleanly.
    Success,
    /// Some items failed or the deadline cut the run short; the rest applied.
    Partial,
    /// The run could not make progress at all.
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Error => "error",
        }
    }
}

/// A single item that failed during reconciliation. The run continues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemError {
    /// Calendar the item belongs to.
    pub calendar_id: String,
    /// Task id or external event id, whichever identifies the item.
    pub item: String,
    pub message: String,
}

/// Which side won a `both`-direction conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictWinner {
    Local,
    Remote,
}

/// Audit record of one resolved conflict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedConflict {
    pub calendar_id: String,
    pub task_id: String,
    pub event_id: String,
    pub winner: ConflictWinner,
}

/// Invocation of the engine. Caller-agnostic: scheduled job, manual
/// "sync now" or anything else builds the same request.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub owner_id: String,
    pub calendar_ids: Vec<String>,
    pub direction: SyncDirection,
    /// Discard the stored sync token and re-walk the whole window.
    pub force_full_sync: bool,
    /// Stop issuing new network calls past this instant; finish as partial.
    pub deadline: Option<DateTime<Utc>>,
}

impl SyncRequest {
    pub fn new(owner_id: impl Into<String>, calendar_ids: Vec<String>, direction: SyncDirection) -> Self {
        Self {
            owner_id: owner_id.into(),
            calendar_ids,
            direction,
            force_full_sync: false,
            deadline: None,
        }
    }
}

/// Append-only record of one run's outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRunResult {
    pub run_id: String,
    pub owner_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub direction: SyncDirection,
    pub events_processed: u64,
    pub events_created: u64,
    pub events_updated: u64,
    pub events_deleted: u64,
    /// Per-item failures, in processing order.
    pub errors: Vec<ItemError>,
    /// Conflict resolutions, in processing order.
    pub conflicts: Vec<ResolvedConflict>,
    pub status: RunStatus,
}

/// Durable incremental-sync position for one (owner, calendar).
///
/// A `None` token forces a full resync on the next run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncCursor {
    pub owner_id: String,
    pub calendar_id: String,
    pub sync_token: Option<String>,
    pub last_full_sync_at: Option<DateTime<Utc>>,
    /// Watermark for the push side: tasks modified after this are exported.
    pub last_pushed_at: Option<DateTime<Utc>>,
}

impl SyncCursor {
    pub fn empty(owner_id: &str, calendar_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            calendar_id: calendar_id.to_string(),
            ..Default::default()
        }
    }
}

/// Durable association between a local task and its remote event.
///
/// At most one live mapping per (owner, calendar, task) and per
/// (owner, calendar, event); the state store enforces both.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncMapping {
    pub owner_id: String,
    pub calendar_id: String,
    pub task_id: String,
    pub event_id: String,
    pub content_hash: String,
    pub last_synced_at: DateTime<Utc>,
}

/// Sync error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The provider rejected the refresh token; the owner must re-authorize.
    #[error("authentication expired; reconnect required")]
    AuthExpired,

    /// 429 budget exhausted even after backoff.
    #[error("rate limited by the calendar API")]
    RateLimited,

    /// The provider invalidated the incremental sync token (HTTP 410).
    #[error("sync token invalidated by the provider")]
    SyncTokenInvalid,

    /// A conflicting item could not be resolved; recorded per-item.
    #[error("conflict resolution failed for {item}: {message}")]
    ConflictResolution { item: String, message: String },

    /// A uniqueness invariant on the mapping table was violated.
    #[error("mapping integrity violation: {0}")]
    MappingIntegrity(String),

    /// Transient transport failure, retried inside the client.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A run for this (owner, calendar) is already executing.
    #[error("sync already in progress for {owner}/{calendar}")]
    SyncInProgress { owner: String, calendar: String },

    /// Non-retryable API failure (unexpected status or malformed body).
    #[error("calendar API error: {0}")]
    Api(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("task store error: {0}")]
    TaskStore(#[from] TaskStoreError),
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_wire_names_roundtrip() {
        for d in [
            SyncDirection::GcalToTaskshoot,
            SyncDirection::TaskshootToGcal,
            SyncDirection::Both,
        ] {
            assert_eq!(SyncDirection::parse(d.as_str()), Some(d));
        }
        assert_eq!(SyncDirection::parse("sideways"), None);
    }

    #[test]
    fn direction_flow_flags() {
        assert!(SyncDirection::GcalToTaskshoot.pulls());
        assert!(!SyncDirection::GcalToTaskshoot.pushes());
        assert!(!SyncDirection::TaskshootToGcal.pulls());
        assert!(SyncDirection::TaskshootToGcal.pushes());
        assert!(SyncDirection::Both.pulls());
        assert!(SyncDirection::Both.pushes());
    }

    #[test]
    fn run_result_serializes_with_snake_case_status() {
        let result = SyncRunResult {
            run_id: "run-1".to_string(),
            owner_id: "alice".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            direction: SyncDirection::Both,
            events_processed: 3,
            events_created: 1,
            events_updated: 1,
            events_deleted: 0,
            errors: vec![],
            conflicts: vec![],
            status: RunStatus::Partial,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "partial");
        assert_eq!(json["direction"], "both");
    }
}
