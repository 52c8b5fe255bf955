//! # TaskShoot Core Library
//!
//! Core business logic for TaskShoot's calendar synchronization engine.
//! The CLI binary is a thin layer over this crate; anything that talks to
//! Google Calendar, converts between tasks and events, or persists sync
//! state lives here.
//!
//! ## Architecture
//!
//! - **Sync Engine**: a per-run state machine driving full and incremental
//!   synchronization with conflict handling ([`SyncEngine`])
//! - **Calendar Client**: retrying HTTP wrapper over the Google Calendar
//!   REST surface ([`sync::GcalClient`])
//! - **Event Mapper**: pure Task <-> event conversion with an embedded
//!   source marker ([`sync::mapper`])
//! - **Storage**: SQLite-based sync state (cursors, mappings, run log) and
//!   TOML configuration
//! - **Task Store**: CRUD trait the local application implements; the
//!   engine has no persistence of its own for tasks

pub mod error;
pub mod storage;
pub mod sync;
pub mod task;

pub use error::{ConfigError, CoreError, DatabaseError, OAuthError, ValidationError};
pub use storage::{Config, SyncStateDb};
pub use sync::{SyncDirection, SyncEngine, SyncError, SyncRequest, SyncRunResult};
pub use task::{MemoryTaskStore, Task, TaskDraft, TaskPatch, TaskPriority, TaskStatus, TaskStore};
