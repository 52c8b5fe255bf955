//! Google Calendar synchronization layer.
//!
//! Bidirectional sync between the local task store and Google Calendar.
//! The orchestrator ([`SyncEngine`]) drives full and incremental runs,
//! the mapper converts both ways, and all durable sync state lives in
//! [`crate::storage::SyncStateDb`].

pub mod credentials;
pub mod engine;
pub mod gcal;
pub mod mapper;
pub mod oauth;
pub mod types;

#[cfg(test)]
mod mapper_tests;

pub use credentials::{CredentialStore, KeyringTokenStore, MemoryTokenStore, TokenStore};
pub use engine::{SharedStateDb, SyncEngine, MAX_CONCURRENT_CALENDARS};
pub use gcal::{
    CalendarApi, CalendarListEntry, EventSnapshot, EventsPage, GcalClient, GcalEvent, GcalTime,
    RetryPolicy, TimeWindow,
};
pub use mapper::{content_hash, event_to_task, should_exclude_from_sync, task_to_event, SourceMarker};
pub use oauth::{OAuthConfig, OAuthTokens};
pub use types::{
    ConflictWinner, ItemError, ResolvedConflict, RunStatus, SyncCursor, SyncDirection, SyncError,
    SyncMapping, SyncRequest, SyncRunResult,
};
