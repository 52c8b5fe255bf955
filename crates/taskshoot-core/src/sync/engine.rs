//! Sync orchestrator: drives one synchronization run as a state machine.
//!
//! `Idle -> Authenticating -> (FullSync | IncrementalSync) -> Reconciling
//! -> Committing -> Idle`, with `Failed` reachable from any step. Within a
//! run each calendar is reconciled sequentially, item by item, in the order
//! the API returned; calendars of one request (and runs for other owners)
//! proceed concurrently under a bounded worker pool.
//!
//! The engine is the only writer of mappings and cursors. Mapping rows are
//! written in the same logical unit as the remote call they record; the
//! cursor is committed last, so a crash anywhere leaves state that the next
//! run re-derives idempotently via content hashes and source markers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::storage::SyncStateDb;
use crate::sync::credentials::CredentialStore;
use crate::sync::gcal::{CalendarApi, EventSnapshot, GcalEvent, TimeWindow};
use crate::sync::mapper::{self, SourceMarker};
use crate::sync::types::{
    ConflictWinner, ItemError, ResolvedConflict, RunStatus, SyncCursor, SyncError, SyncMapping,
    SyncRequest, SyncRunResult,
};
use crate::task::{TaskDraft, TaskPatch, TaskStore};

/// Worker limit for concurrent calendar runs (mirrors the client's batch
/// fetch concurrency).
pub const MAX_CONCURRENT_CALENDARS: usize = 5;

/// Shared handle to the sync state database.
pub type SharedStateDb = Arc<StdMutex<SyncStateDb>>;

/// Steps of the run state machine, traced on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Authenticating,
    FullSync,
    IncrementalSync,
    Reconciling,
    Committing,
    Failed,
}

impl RunPhase {
    fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Authenticating => "authenticating",
            RunPhase::FullSync => "full_sync",
            RunPhase::IncrementalSync => "incremental_sync",
            RunPhase::Reconciling => "reconciling",
            RunPhase::Committing => "committing",
            RunPhase::Failed => "failed",
        }
    }
}

fn trace_phase(run_id: &str, calendar: &str, phase: RunPhase) {
    debug!(run_id, calendar, phase = phase.as_str(), "phase transition");
}

/// Accumulated outcome of one calendar's reconciliation.
#[derive(Default)]
struct CalendarOutcome {
    processed: u64,
    created: u64,
    updated: u64,
    deleted: u64,
    errors: Vec<ItemError>,
    conflicts: Vec<ResolvedConflict>,
    /// Cursor to commit; `None` when a deadline cut the run short, so the
    /// next run resumes from the last committed point.
    cursor: Option<SyncCursor>,
    deadline_hit: bool,
}

/// Releases the (owner, calendar) keys when the run finishes.
struct ActiveKeyGuard {
    active: Arc<StdMutex<HashSet<(String, String)>>>,
    keys: Vec<(String, String)>,
}

impl Drop for ActiveKeyGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap();
        for key in &self.keys {
            active.remove(key);
        }
    }
}

/// The calendar synchronization engine.
///
/// All collaborators are constructor-injected; the engine owns no global
/// state and can be cloned cheaply (everything behind `Arc`).
#[derive(Clone)]
pub struct SyncEngine {
    api: Arc<dyn CalendarApi>,
    credentials: Arc<CredentialStore>,
    state: SharedStateDb,
    tasks: Arc<dyn TaskStore>,
    window: TimeWindow,
    active: Arc<StdMutex<HashSet<(String, String)>>>,
    permits: Arc<Semaphore>,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn CalendarApi>,
        credentials: Arc<CredentialStore>,
        state: SharedStateDb,
        tasks: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            api,
            credentials,
            state,
            tasks,
            window: TimeWindow::default(),
            active: Arc::new(StdMutex::new(HashSet::new())),
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_CALENDARS)),
        }
    }

    /// Bound full syncs to a fetch window.
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Execute one synchronization run and return its committed result.
    ///
    /// Fatal conditions (`AuthExpired`, a second token invalidation,
    /// `MappingIntegrity`) abort the run with an `error` result and a typed
    /// error; per-item failures only downgrade the status to `partial`.
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncRunResult, SyncError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            %run_id,
            owner = %request.owner_id,
            direction = request.direction.as_str(),
            calendars = request.calendar_ids.len(),
            "sync run starting"
        );

        let _guard = self.acquire_keys(&request.owner_id, &request.calendar_ids)?;

        trace_phase(&run_id, "*", RunPhase::Authenticating);
        let token = match self.credentials.get_valid_token(&request.owner_id).await {
            Ok(token) => token,
            Err(SyncError::AuthExpired) => {
                trace_phase(&run_id, "*", RunPhase::Failed);
                warn!(%run_id, owner = %request.owner_id, "reconnect required; auto-sync disabled");
                let result = failed_result(&run_id, &request, started_at);
                {
                    let db = self.state.lock().unwrap();
                    db.set_reconnect_required(&request.owner_id, true)?;
                    db.append_run_result(&result)?;
                }
                return Err(SyncError::AuthExpired);
            }
            Err(e) => {
                trace_phase(&run_id, "*", RunPhase::Failed);
                return Err(e);
            }
        };

        let mut join_set = JoinSet::new();
        for (index, calendar_id) in request.calendar_ids.iter().enumerate() {
            let engine = self.clone();
            let run_id = run_id.clone();
            let request = request.clone();
            let calendar_id = calendar_id.clone();
            let token = token.clone();
            join_set.spawn(async move {
                let _permit = engine.permits.clone().acquire_owned().await;
                let outcome = engine
                    .sync_calendar(&run_id, &request, &calendar_id, &token)
                    .await;
                (index, calendar_id, outcome)
            });
        }

        let mut slots: Vec<Option<(String, Result<CalendarOutcome, SyncError>)>> =
            (0..request.calendar_ids.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, calendar_id, outcome)) => slots[index] = Some((calendar_id, outcome)),
                Err(join_err) => error!(%run_id, error = %join_err, "calendar task panicked"),
            }
        }

        trace_phase(&run_id, "*", RunPhase::Committing);
        let mut result = SyncRunResult {
            run_id: run_id.clone(),
            owner_id: request.owner_id.clone(),
            started_at,
            completed_at: Utc::now(),
            direction: request.direction,
            events_processed: 0,
            events_created: 0,
            events_updated: 0,
            events_deleted: 0,
            errors: vec![],
            conflicts: vec![],
            status: RunStatus::Success,
        };
        let mut staged_cursors = Vec::new();
        let mut fatal: Option<SyncError> = None;
        let mut fatal_calendars = 0usize;
        let mut deadline_hit = false;

        for slot in slots.into_iter().flatten() {
            let (calendar_id, outcome) = slot;
            match outcome {
                Ok(outcome) => {
                    result.events_processed += outcome.processed;
                    result.events_created += outcome.created;
                    result.events_updated += outcome.updated;
                    result.events_deleted += outcome.deleted;
                    result.errors.extend(outcome.errors);
                    result.conflicts.extend(outcome.conflicts);
                    deadline_hit |= outcome.deadline_hit;
                    if let Some(cursor) = outcome.cursor {
                        staged_cursors.push(cursor);
                    }
                }
                Err(err) => {
                    fatal_calendars += 1;
                    result.errors.push(ItemError {
                        calendar_id: calendar_id.clone(),
                        item: "*".to_string(),
                        message: err.to_string(),
                    });
                    if fatal.is_none() {
                        fatal = Some(err);
                    }
                }
            }
        }

        let made_progress = result.events_processed > 0
            || result.events_created > 0
            || result.events_updated > 0
            || result.events_deleted > 0;
        let all_failed = fatal_calendars == request.calendar_ids.len();
        result.status = if all_failed && !made_progress {
            RunStatus::Error
        } else if fatal.is_some() || !result.errors.is_empty() || deadline_hit {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
        result.completed_at = Utc::now();

        {
            let mut db = self.state.lock().unwrap();
            db.commit_run(&result, &staged_cursors)?;
        }

        if result.status == RunStatus::Error {
            trace_phase(&run_id, "*", RunPhase::Failed);
            if let Some(err) = fatal {
                return Err(err);
            }
        }

        info!(
            %run_id,
            status = result.status.as_str(),
            processed = result.events_processed,
            created = result.events_created,
            updated = result.events_updated,
            deleted = result.events_deleted,
            errors = result.errors.len(),
            "sync run finished"
        );
        Ok(result)
    }

    fn acquire_keys(
        &self,
        owner: &str,
        calendar_ids: &[String],
    ) -> Result<ActiveKeyGuard, SyncError> {
        let mut active = self.active.lock().unwrap();
        for calendar_id in calendar_ids {
            if active.contains(&(owner.to_string(), calendar_id.clone())) {
                return Err(SyncError::SyncInProgress {
                    owner: owner.to_string(),
                    calendar: calendar_id.clone(),
                });
            }
        }
        let keys: Vec<(String, String)> = calendar_ids
            .iter()
            .map(|calendar_id| (owner.to_string(), calendar_id.clone()))
            .collect();
        for key in &keys {
            active.insert(key.clone());
        }
        Ok(ActiveKeyGuard {
            active: self.active.clone(),
            keys,
        })
    }

    /// Run the state machine for one calendar.
    async fn sync_calendar(
        &self,
        run_id: &str,
        request: &SyncRequest,
        calendar_id: &str,
        token: &str,
    ) -> Result<CalendarOutcome, SyncError> {
        let owner = &request.owner_id;
        let stored_cursor = {
            let db = self.state.lock().unwrap();
            db.get_cursor(owner, calendar_id)?
        };
        let mut cursor = stored_cursor.clone();
        let mut outcome = CalendarOutcome::default();

        // Strategy selection + fetch. Push-only runs skip the listing.
        let snapshot = if request.direction.pulls() {
            Some(
                self.fetch_events(run_id, request, calendar_id, token, &mut cursor)
                    .await?,
            )
        } else {
            None
        };
        if let Some(snapshot) = &snapshot {
            if snapshot.next_sync_token.is_some() {
                cursor.sync_token = snapshot.next_sync_token.clone();
            }
        }

        trace_phase(run_id, calendar_id, RunPhase::Reconciling);

        if let Some(snapshot) = &snapshot {
            self.reconcile_pull(request, calendar_id, snapshot, &mut outcome)
                .await?;
        }

        if request.direction.pushes() && !outcome.deadline_hit {
            self.reconcile_push(request, calendar_id, token, &mut cursor, &mut outcome)
                .await?;
        }

        // A deadline-cut run leaves the cursor untouched: the next run
        // resumes from the last committed point instead of trusting a
        // half-processed page.
        if !outcome.deadline_hit {
            outcome.cursor = Some(cursor);
        }
        Ok(outcome)
    }

    /// Full or incremental listing, with at most one automatic escalation
    /// from an invalidated sync token to a full resync.
    async fn fetch_events(
        &self,
        run_id: &str,
        request: &SyncRequest,
        calendar_id: &str,
        token: &str,
        cursor: &mut SyncCursor,
    ) -> Result<EventSnapshot, SyncError> {
        let owner = &request.owner_id;

        if !request.force_full_sync {
            if let Some(sync_token) = cursor.sync_token.clone() {
                trace_phase(run_id, calendar_id, RunPhase::IncrementalSync);
                match self.api.list_changes(token, calendar_id, &sync_token).await {
                    Ok(snapshot) => return Ok(snapshot),
                    Err(SyncError::SyncTokenInvalid) => {
                        warn!(
                            run_id,
                            calendar_id, "sync token invalidated; escalating to full sync"
                        );
                        {
                            let db = self.state.lock().unwrap();
                            db.clear_sync_token(owner, calendar_id)?;
                        }
                        cursor.sync_token = None;
                        // fall through to the single full-sync escalation
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        trace_phase(run_id, calendar_id, RunPhase::FullSync);
        match self.api.list_all_events(token, calendar_id, &self.window).await {
            Ok(snapshot) => {
                cursor.last_full_sync_at = Some(Utc::now());
                Ok(snapshot)
            }
            // A second invalidation in the same run is fatal, never retried.
            Err(SyncError::SyncTokenInvalid) => {
                error!(run_id, calendar_id, "full sync rejected after escalation");
                Err(SyncError::SyncTokenInvalid)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply fetched events to the local task store, in API order.
    async fn reconcile_pull(
        &self,
        request: &SyncRequest,
        calendar_id: &str,
        snapshot: &EventSnapshot,
        outcome: &mut CalendarOutcome,
    ) -> Result<(), SyncError> {
        for event in &snapshot.events {
            if deadline_passed(request.deadline) {
                outcome.deadline_hit = true;
                warn!(calendar_id, "deadline reached; finishing run as partial");
                break;
            }
            // Excluded events are invisible to the run: not imported, not
            // counted.
            if mapper::should_exclude_from_sync(event) {
                debug!(
                    calendar_id,
                    event = event.summary_or_untitled(),
                    "event excluded from sync"
                );
                continue;
            }
            let item_ref = event.id.clone().unwrap_or_default();
            match self.pull_event(request, calendar_id, event, outcome).await {
                Ok(()) => {}
                // Uniqueness violations are a duplicate-creation bug;
                // surface them instead of continuing.
                Err(SyncError::MappingIntegrity(msg)) => {
                    return Err(SyncError::MappingIntegrity(msg));
                }
                Err(err) => {
                    warn!(calendar_id, item = %item_ref, error = %err, "pull item failed");
                    outcome.errors.push(ItemError {
                        calendar_id: calendar_id.to_string(),
                        item: item_ref,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn pull_event(
        &self,
        request: &SyncRequest,
        calendar_id: &str,
        event: &GcalEvent,
        outcome: &mut CalendarOutcome,
    ) -> Result<(), SyncError> {
        let owner = &request.owner_id;
        let Some(event_id) = event.id.as_deref() else {
            return Ok(());
        };
        outcome.processed += 1;

        let hash = mapper::content_hash(event);
        let mapping = {
            let db = self.state.lock().unwrap();
            db.get_mapping_by_event(owner, calendar_id, event_id)?
        };

        match mapping {
            Some(mapping) => {
                if mapping.content_hash == hash {
                    return Ok(());
                }
                match self.tasks.get(owner, &mapping.task_id)? {
                    Some(local_task) => {
                        // Both sides changed: later modification wins, the
                        // remote event wins exact ties (it is the calendar
                        // of record). Always audited.
                        if request.direction.pushes()
                            && local_task.updated_at > mapping.last_synced_at
                        {
                            // Without a remote timestamp there is nothing
                            // to tiebreak on; skip the item, keep the run.
                            let remote_updated = event.updated.ok_or_else(|| {
                                SyncError::ConflictResolution {
                                    item: event_id.to_string(),
                                    message: "remote event has no updated timestamp".to_string(),
                                }
                            })?;
                            let winner = if remote_updated >= local_task.updated_at {
                                ConflictWinner::Remote
                            } else {
                                ConflictWinner::Local
                            };
                            outcome.conflicts.push(ResolvedConflict {
                                calendar_id: calendar_id.to_string(),
                                task_id: mapping.task_id.clone(),
                                event_id: event_id.to_string(),
                                winner,
                            });
                            if winner == ConflictWinner::Local {
                                debug!(
                                    calendar_id,
                                    task_id = %mapping.task_id,
                                    "local task newer; keeping local state"
                                );
                                return Ok(());
                            }
                        }
                        let draft = mapper::event_to_task(event);
                        self.tasks
                            .update(owner, &mapping.task_id, patch_from_draft(&draft))?;
                        self.record_mapping_update(&mapping, &hash)?;
                        outcome.updated += 1;
                    }
                    None if request.direction.pushes() => {
                        // Local deletion propagates on the push side.
                    }
                    None => {
                        // Pull-only: the local task vanished; re-create it
                        // and re-point the mapping.
                        let draft = mapper::event_to_task(event);
                        let created = self.tasks.create(owner, draft)?;
                        {
                            let db = self.state.lock().unwrap();
                            db.delete_mapping(owner, calendar_id, &mapping.task_id)?;
                            db.insert_mapping(&SyncMapping {
                                owner_id: owner.clone(),
                                calendar_id: calendar_id.to_string(),
                                task_id: created.id.clone(),
                                event_id: event_id.to_string(),
                                content_hash: hash,
                                last_synced_at: Utc::now(),
                            })?;
                        }
                        outcome.created += 1;
                    }
                }
            }
            None => {
                // Crash recovery: an event we created whose mapping write
                // was lost. The marker declares the association; adopt it
                // instead of creating a duplicate task.
                if let Some(marker) = SourceMarker::from_event(event) {
                    if self.tasks.get(owner, &marker.task_id)?.is_some() {
                        let draft = mapper::event_to_task(event);
                        self.tasks
                            .update(owner, &marker.task_id, patch_from_draft(&draft))?;
                        {
                            let db = self.state.lock().unwrap();
                            db.insert_mapping(&SyncMapping {
                                owner_id: owner.clone(),
                                calendar_id: calendar_id.to_string(),
                                task_id: marker.task_id.clone(),
                                event_id: event_id.to_string(),
                                content_hash: hash,
                                last_synced_at: Utc::now(),
                            })?;
                        }
                        info!(
                            calendar_id,
                            task_id = %marker.task_id,
                            "re-adopted orphaned event mapping"
                        );
                        outcome.updated += 1;
                        return Ok(());
                    }
                }
                let draft = mapper::event_to_task(event);
                let created = self.tasks.create(owner, draft)?;
                {
                    let db = self.state.lock().unwrap();
                    db.insert_mapping(&SyncMapping {
                        owner_id: owner.clone(),
                        calendar_id: calendar_id.to_string(),
                        task_id: created.id.clone(),
                        event_id: event_id.to_string(),
                        content_hash: hash,
                        last_synced_at: Utc::now(),
                    })?;
                }
                outcome.created += 1;
            }
        }
        Ok(())
    }

    /// Export local changes: deletions first, then tasks modified past the
    /// push watermark.
    async fn reconcile_push(
        &self,
        request: &SyncRequest,
        calendar_id: &str,
        token: &str,
        cursor: &mut SyncCursor,
        outcome: &mut CalendarOutcome,
    ) -> Result<(), SyncError> {
        let owner = &request.owner_id;
        let push_started = Utc::now();

        let mappings = {
            let db = self.state.lock().unwrap();
            db.list_mappings(owner, calendar_id)?
        };
        for mapping in &mappings {
            if deadline_passed(request.deadline) {
                outcome.deadline_hit = true;
                return Ok(());
            }
            if self.tasks.get(owner, &mapping.task_id)?.is_some() {
                continue;
            }
            outcome.processed += 1;
            match self
                .api
                .delete_event(token, calendar_id, &mapping.event_id)
                .await
            {
                Ok(()) => {
                    let db = self.state.lock().unwrap();
                    db.delete_mapping(owner, calendar_id, &mapping.task_id)?;
                    outcome.deleted += 1;
                }
                Err(err) => {
                    warn!(calendar_id, event_id = %mapping.event_id, error = %err, "remote delete failed");
                    outcome.errors.push(ItemError {
                        calendar_id: calendar_id.to_string(),
                        item: mapping.event_id.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let watermark = cursor.last_pushed_at.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let changed = self.tasks.list_changed_since(owner, watermark)?;
        for task in changed {
            if deadline_passed(request.deadline) {
                outcome.deadline_hit = true;
                return Ok(());
            }
            let task_ref = task.id.clone();
            match self.push_task(request, calendar_id, &task, token, outcome).await {
                Ok(()) => {}
                Err(SyncError::MappingIntegrity(msg)) => {
                    return Err(SyncError::MappingIntegrity(msg));
                }
                Err(err) => {
                    warn!(calendar_id, item = %task_ref, error = %err, "push item failed");
                    outcome.errors.push(ItemError {
                        calendar_id: calendar_id.to_string(),
                        item: task_ref,
                        message: err.to_string(),
                    });
                }
            }
        }

        if !outcome.deadline_hit {
            cursor.last_pushed_at = Some(push_started);
        }
        Ok(())
    }

    async fn push_task(
        &self,
        request: &SyncRequest,
        calendar_id: &str,
        task: &crate::task::Task,
        token: &str,
        outcome: &mut CalendarOutcome,
    ) -> Result<(), SyncError> {
        let owner = &request.owner_id;
        outcome.processed += 1;

        let candidate = mapper::task_to_event(task, Utc::now());
        let hash = mapper::content_hash(&candidate);
        let mapping = {
            let db = self.state.lock().unwrap();
            db.get_mapping_by_task(owner, calendar_id, &task.id)?
        };

        match mapping {
            Some(mapping) => {
                // Already synced at or after this modification (e.g. the
                // pull side applied the winning remote state this run).
                if task.updated_at <= mapping.last_synced_at {
                    return Ok(());
                }
                if mapping.content_hash == hash {
                    self.record_mapping_update(&mapping, &hash)?;
                    return Ok(());
                }
                match self
                    .api
                    .update_event(token, calendar_id, &mapping.event_id, &candidate)
                    .await
                {
                    Ok(updated) => {
                        self.record_mapping_update(&mapping, &mapper::content_hash(&updated))?;
                        outcome.updated += 1;
                    }
                    // The remote event vanished; re-create it.
                    Err(err) if is_not_found(&err) => {
                        let created = self
                            .api
                            .create_event(token, calendar_id, &candidate)
                            .await?;
                        let event_id = created
                            .id
                            .clone()
                            .ok_or_else(|| SyncError::Api("create returned no id".to_string()))?;
                        let db = self.state.lock().unwrap();
                        db.update_mapping(&SyncMapping {
                            event_id,
                            content_hash: mapper::content_hash(&created),
                            last_synced_at: Utc::now(),
                            ..mapping.clone()
                        })?;
                        outcome.updated += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
            None => {
                let created = self
                    .api
                    .create_event(token, calendar_id, &candidate)
                    .await?;
                let event_id = created
                    .id
                    .clone()
                    .ok_or_else(|| SyncError::Api("create returned no id".to_string()))?;
                let db = self.state.lock().unwrap();
                db.insert_mapping(&SyncMapping {
                    owner_id: owner.clone(),
                    calendar_id: calendar_id.to_string(),
                    task_id: task.id.clone(),
                    event_id,
                    content_hash: mapper::content_hash(&created),
                    last_synced_at: Utc::now(),
                })?;
                outcome.created += 1;
            }
        }
        Ok(())
    }

    fn record_mapping_update(&self, mapping: &SyncMapping, hash: &str) -> Result<(), SyncError> {
        let db = self.state.lock().unwrap();
        db.update_mapping(&SyncMapping {
            content_hash: hash.to_string(),
            last_synced_at: Utc::now(),
            ..mapping.clone()
        })?;
        Ok(())
    }
}

fn deadline_passed(deadline: Option<DateTime<Utc>>) -> bool {
    deadline.map(|d| Utc::now() >= d).unwrap_or(false)
}

fn is_not_found(err: &SyncError) -> bool {
    matches!(err, SyncError::Api(msg) if msg.contains("HTTP 404"))
}

fn patch_from_draft(draft: &TaskDraft) -> TaskPatch {
    TaskPatch {
        title: Some(draft.title.clone()),
        description: Some(draft.description.clone()),
        status: Some(draft.status),
        priority: Some(draft.priority),
        start_at: Some(draft.start_at),
        due_at: Some(draft.due_at),
        estimated_minutes: Some(draft.estimated_minutes),
        category_id: Some(draft.category_id.clone()),
    }
}

fn failed_result(run_id: &str, request: &SyncRequest, started_at: DateTime<Utc>) -> SyncRunResult {
    SyncRunResult {
        run_id: run_id.to_string(),
        owner_id: request.owner_id.clone(),
        started_at,
        completed_at: Utc::now(),
        direction: request.direction,
        events_processed: 0,
        events_created: 0,
        events_updated: 0,
        events_deleted: 0,
        errors: vec![],
        conflicts: vec![],
        status: RunStatus::Error,
    }
}
