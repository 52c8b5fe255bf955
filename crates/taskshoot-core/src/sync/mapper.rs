//! Pure Task <-> calendar event conversion.
//!
//! No I/O and no clocks: "now" is an explicit argument, so every function
//! here is deterministic given its inputs. Events created by this system
//! carry a [`SourceMarker`] in the private extended-property bag; on the
//! way back the marker is authoritative, anything else is inference.

use chrono::{DateTime, Duration, Timelike, Utc};
use sha2::{Digest, Sha256};

use crate::sync::gcal::{ExtendedProperties, GcalEvent, GcalTime};
use crate::task::{Task, TaskDraft, TaskPriority, TaskStatus};

/// Private extended-property keys.
pub const PROP_SOURCE: &str = "taskshoot_source";
pub const PROP_TASK_ID: &str = "taskshoot_task_id";
pub const PROP_PRIORITY: &str = "taskshoot_priority";
pub const PROP_STATUS: &str = "taskshoot_status";
pub const PROP_CATEGORY: &str = "taskshoot_category";
pub const PROP_ESTIMATE: &str = "taskshoot_estimate";
pub const PROP_VERSION: &str = "taskshoot_version";

/// Value of [`PROP_SOURCE`] on events this system created.
pub const SOURCE_VALUE: &str = "taskshoot";
const MARKER_VERSION: &str = "1";

/// Separates the human description from the appended metadata block.
pub const DESCRIPTION_DELIMITER: &str = "--- taskshoot ---";

/// Imported estimates are clamped to this range of minutes.
pub const MIN_ESTIMATE_MINUTES: u32 = 15;
pub const MAX_ESTIMATE_MINUTES: u32 = 1440;

/// Default event span when a task has no due time.
const DEFAULT_SPAN_MINUTES: i64 = 120;

/// Lowercased title fragments that are never imported (birthdays, holidays,
/// recurring-meeting noise).
const EXCLUDED_TITLE_PATTERNS: &[&str] = &[
    "birthday",
    "holiday",
    "(recurring)",
    "誕生日",
    "祝日",
];

/// Identity marker embedded in events created by this system.
///
/// Marker present means the event <-> task association is declared, not
/// inferred; `priority`/`status` round-trip losslessly through it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMarker {
    pub task_id: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub category_id: Option<String>,
    pub estimated_minutes: Option<u32>,
}

impl SourceMarker {
    pub fn for_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            priority: task.priority,
            status: task.status,
            category_id: task.category_id.clone(),
            estimated_minutes: task.estimated_minutes,
        }
    }

    /// Parse the marker out of an event's private property bag. Returns
    /// `None` unless the source key is ours and a task id is present.
    pub fn from_event(event: &GcalEvent) -> Option<Self> {
        if event.private_prop(PROP_SOURCE) != Some(SOURCE_VALUE) {
            return None;
        }
        let task_id = event.private_prop(PROP_TASK_ID)?.to_string();
        let priority = event
            .private_prop(PROP_PRIORITY)
            .and_then(TaskPriority::parse)
            .unwrap_or_default();
        let status = event
            .private_prop(PROP_STATUS)
            .and_then(TaskStatus::parse)
            .unwrap_or_default();
        Some(Self {
            task_id,
            priority,
            status,
            category_id: event.private_prop(PROP_CATEGORY).map(String::from),
            estimated_minutes: event
                .private_prop(PROP_ESTIMATE)
                .and_then(|v| v.parse().ok()),
        })
    }

    fn to_properties(&self) -> ExtendedProperties {
        let mut props = ExtendedProperties::default();
        props
            .private
            .insert(PROP_SOURCE.to_string(), SOURCE_VALUE.to_string());
        props
            .private
            .insert(PROP_VERSION.to_string(), MARKER_VERSION.to_string());
        props
            .private
            .insert(PROP_TASK_ID.to_string(), self.task_id.clone());
        props.private.insert(
            PROP_PRIORITY.to_string(),
            self.priority.as_str().to_string(),
        );
        props
            .private
            .insert(PROP_STATUS.to_string(), self.status.as_str().to_string());
        if let Some(category_id) = &self.category_id {
            props
                .private
                .insert(PROP_CATEGORY.to_string(), category_id.clone());
        }
        if let Some(estimate) = self.estimated_minutes {
            props
                .private
                .insert(PROP_ESTIMATE.to_string(), estimate.to_string());
        }
        props
    }
}

/// Event color for a task priority (Google color ids).
pub fn color_for_priority(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::Low => "2",
        TaskPriority::Medium => "7",
        TaskPriority::High => "6",
        TaskPriority::Urgent => "11",
    }
}

/// Reverse of [`color_for_priority`].
pub fn priority_from_color(color_id: &str) -> Option<TaskPriority> {
    match color_id {
        "2" => Some(TaskPriority::Low),
        "7" => Some(TaskPriority::Medium),
        "6" => Some(TaskPriority::High),
        "11" => Some(TaskPriority::Urgent),
        _ => None,
    }
}

fn is_utc_midnight(instant: DateTime<Utc>) -> bool {
    instant.hour() == 0 && instant.minute() == 0 && instant.second() == 0
}

/// Convert a task to the event that represents it.
///
/// Start falls back to `now`, end to start + 2 h. A span that is a whole
/// number of days aligned to UTC midnight becomes an all-day event.
pub fn task_to_event(task: &Task, now: DateTime<Utc>) -> GcalEvent {
    let start = task.start_at.unwrap_or(now);
    let mut end = task
        .due_at
        .unwrap_or_else(|| start + Duration::minutes(DEFAULT_SPAN_MINUTES));
    if end < start {
        // Due time predates the fallback start; keep the event well-formed.
        end = start + Duration::minutes(DEFAULT_SPAN_MINUTES);
    }

    let all_day = is_utc_midnight(start) && is_utc_midnight(end) && end > start;
    let (event_start, event_end) = if all_day {
        (
            GcalTime::all_day(start.date_naive()),
            GcalTime::all_day(end.date_naive()),
        )
    } else {
        (GcalTime::at(start), GcalTime::at(end))
    };

    GcalEvent {
        id: None,
        summary: Some(task.title.clone()),
        description: Some(compose_description(task)),
        location: None,
        status: None,
        visibility: None,
        color_id: Some(color_for_priority(task.priority).to_string()),
        start: Some(event_start),
        end: Some(event_end),
        updated: None,
        extended_properties: Some(SourceMarker::for_task(task).to_properties()),
    }
}

/// Convert an event into a task draft.
///
/// When the event carries our marker its properties are authoritative;
/// otherwise priority, status and estimate are inferred from what the
/// provider exposes.
pub fn event_to_task(event: &GcalEvent) -> TaskDraft {
    let start_at = event.start.as_ref().and_then(GcalTime::to_instant);
    let due_at = event.end.as_ref().and_then(GcalTime::to_instant);
    let duration_minutes = match (start_at, due_at) {
        (Some(start), Some(end)) if end > start => {
            Some((end - start).num_minutes().max(0) as u32)
        }
        _ => None,
    };

    let description = event
        .description
        .as_deref()
        .and_then(strip_metadata_block);

    match SourceMarker::from_event(event) {
        Some(marker) => TaskDraft {
            title: event.summary_or_untitled().to_string(),
            description,
            status: marker.status,
            priority: marker.priority,
            start_at,
            due_at,
            estimated_minutes: marker.estimated_minutes,
            category_id: marker.category_id,
            notes: String::new(),
            tags: vec![],
        },
        None => TaskDraft {
            title: event.summary_or_untitled().to_string(),
            description,
            status: TaskStatus::Pending,
            priority: infer_priority(event),
            start_at,
            due_at,
            estimated_minutes: duration_minutes
                .map(|m| m.clamp(MIN_ESTIMATE_MINUTES, MAX_ESTIMATE_MINUTES)),
            category_id: None,
            notes: String::new(),
            tags: vec![],
        },
    }
}

/// Whether an event must never be imported: provider-cancelled, private,
/// or matching the exclusion list. Total and side-effect free.
pub fn should_exclude_from_sync(event: &GcalEvent) -> bool {
    if event.status.as_deref() == Some("cancelled") {
        return true;
    }
    if event.visibility.as_deref() == Some("private") {
        return true;
    }
    let title = event.summary_or_untitled().to_lowercase();
    EXCLUDED_TITLE_PATTERNS
        .iter()
        .any(|pattern| title.contains(pattern))
}

/// Deterministic fingerprint over the user-visible fields (title, start,
/// end, location). Fixed field order, so representation reordering cannot
/// change the result.
pub fn content_hash(event: &GcalEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.summary.as_deref().unwrap_or_default());
    hasher.update(b"\n");
    hasher.update(
        event
            .start
            .as_ref()
            .map(GcalTime::canonical)
            .unwrap_or_default(),
    );
    hasher.update(b"\n");
    hasher.update(
        event
            .end
            .as_ref()
            .map(GcalTime::canonical)
            .unwrap_or_default(),
    );
    hasher.update(b"\n");
    hasher.update(event.location.as_deref().unwrap_or_default());
    hex::encode(hasher.finalize())
}

fn infer_priority(event: &GcalEvent) -> TaskPriority {
    if let Some(priority) = event.color_id.as_deref().and_then(priority_from_color) {
        return priority;
    }
    let title = event.summary_or_untitled().to_lowercase();
    if title.contains("urgent") || title.contains("緊急") {
        return TaskPriority::Urgent;
    }
    TaskPriority::default()
}

/// Task description plus a delimiter-marked metadata block, so information
/// injected by this system stays recoverable (and strippable) on the way
/// back.
fn compose_description(task: &Task) -> String {
    let mut block = format!(
        "{DESCRIPTION_DELIMITER}\npriority: {}\nstatus: {}",
        task.priority.as_str(),
        task.status.as_str()
    );
    if let Some(estimate) = task.estimated_minutes {
        block.push_str(&format!("\nestimate: {estimate}"));
    }
    if let Some(category_id) = &task.category_id {
        block.push_str(&format!("\ncategory: {category_id}"));
    }

    match task.description.as_deref() {
        Some(description) if !description.is_empty() => {
            format!("{description}\n\n{block}")
        }
        _ => block,
    }
}

/// Strip the metadata block; returns `None` when nothing human remains.
fn strip_metadata_block(description: &str) -> Option<String> {
    let human = match description.find(DESCRIPTION_DELIMITER) {
        Some(idx) => &description[..idx],
        None => description,
    };
    let trimmed = human.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
