//! Task model and the local task store collaborator.
//!
//! The sync engine never owns task persistence; it talks to a [`TaskStore`]
//! that exposes plain CRUD with no sync awareness. An in-memory
//! implementation ships for tests and for the CLI's file-backed demo store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::error::ValidationError;

/// Maximum number of tags per task.
pub const MAX_TAGS: usize = 10;
/// Maximum length of a single tag.
pub const MAX_TAG_LEN: usize = 50;

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has not been started yet (initial state)
    Pending,
    /// Task is being worked on
    InProgress,
    /// Task is finished (terminal)
    Completed,
    /// Task was abandoned (terminal)
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl TaskStatus {
    /// Stable wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the wire name back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

impl TaskPriority {
    /// Stable wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    /// Parse the wire name back into a priority.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            "urgent" => Some(TaskPriority::Urgent),
            _ => None,
        }
    }
}

/// A task owned by the local application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Opaque, stable identifier
    pub id: String,
    /// Owner (already-authenticated user) identifier
    pub owner_id: String,
    /// Task title
    pub title: String,
    /// Optional description
    pub description: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: TaskStatus,
    /// Priority
    #[serde(default)]
    pub priority: TaskPriority,
    /// Optional scheduled start
    pub start_at: Option<DateTime<Utc>>,
    /// Optional due time; never precedes `start_at` when both are set
    pub due_at: Option<DateTime<Utc>>,
    /// Estimated duration in minutes
    pub estimated_minutes: Option<u32>,
    /// Optional category
    pub category_id: Option<String>,
    /// Free-form notes
    #[serde(default)]
    pub notes: String,
    /// Ordered tag set, at most [`MAX_TAGS`] entries of [`MAX_TAG_LEN`] chars
    #[serde(default)]
    pub tags: Vec<String>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a task; the store assigns `id` and `updated_at`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub start_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub estimated_minutes: Option<u32>,
    pub category_id: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaskDraft {
    /// Validate the draft invariants: time ordering and tag limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let (Some(start), Some(due)) = (self.start_at, self.due_at) {
            if due < start {
                return Err(ValidationError::InvalidTimeRange { start, due });
            }
        }
        if self.tags.len() > MAX_TAGS {
            return Err(ValidationError::TooManyTags {
                count: self.tags.len(),
                max: MAX_TAGS,
            });
        }
        let mut seen = std::collections::HashSet::new();
        for tag in &self.tags {
            if tag.chars().count() > MAX_TAG_LEN {
                return Err(ValidationError::TagTooLong {
                    tag: tag.clone(),
                    max: MAX_TAG_LEN,
                });
            }
            if !seen.insert(tag.as_str()) {
                return Err(ValidationError::DuplicateTag(tag.clone()));
            }
        }
        Ok(())
    }
}

/// Partial update applied by `TaskStore::update`; `None` leaves a field as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub start_at: Option<Option<DateTime<Utc>>>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub estimated_minutes: Option<Option<u32>>,
    pub category_id: Option<Option<String>>,
}

impl TaskPatch {
    /// Apply the patch to a task, bumping `updated_at`.
    pub fn apply(&self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(start_at) = self.start_at {
            task.start_at = start_at;
        }
        if let Some(due_at) = self.due_at {
            task.due_at = due_at;
        }
        if let Some(estimated_minutes) = self.estimated_minutes {
            task.estimated_minutes = estimated_minutes;
        }
        if let Some(category_id) = &self.category_id {
            task.category_id = category_id.clone();
        }
        task.updated_at = now;
    }
}

/// Task store error.
#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("task store backend error: {0}")]
    Backend(String),
}

/// CRUD surface of the local task store. No sync awareness.
pub trait TaskStore: Send + Sync {
    /// Tasks of `owner` modified strictly after `since`, ordered by `updated_at`.
    fn list_changed_since(
        &self,
        owner: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskStoreError>;

    fn get(&self, owner: &str, id: &str) -> Result<Option<Task>, TaskStoreError>;

    fn create(&self, owner: &str, draft: TaskDraft) -> Result<Task, TaskStoreError>;

    fn update(&self, owner: &str, id: &str, patch: TaskPatch) -> Result<Task, TaskStoreError>;

    fn delete(&self, owner: &str, id: &str) -> Result<(), TaskStoreError>;

    /// Ids of all live tasks of `owner` (deletion detection on the push side).
    fn list_ids(&self, owner: &str) -> Result<Vec<String>, TaskStoreError>;
}

/// In-memory task store used by tests and the CLI's file-backed demo store.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<String, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(owner: &str, id: &str) -> String {
        format!("{owner}/{id}")
    }

    /// Insert a fully-formed task, bypassing draft validation. Test helper.
    pub fn insert(&self, task: Task) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.insert(Self::key(&task.owner_id, &task.id), task);
    }

    /// Persist all tasks to a JSON file.
    pub fn persist(&self, path: &Path) -> Result<(), std::io::Error> {
        let tasks = self.tasks.lock().unwrap();
        let all: Vec<&Task> = tasks.values().collect();
        let data = serde_json::to_string_pretty(&all)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Load tasks from a JSON file, replacing the current contents.
    pub fn load(&self, path: &Path) -> Result<(), std::io::Error> {
        if !path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(path)?;
        let loaded: Vec<Task> = serde_json::from_str(&content)?;
        let mut tasks = self.tasks.lock().unwrap();
        tasks.clear();
        for task in loaded {
            tasks.insert(Self::key(&task.owner_id, &task.id), task);
        }
        Ok(())
    }
}

impl TaskStore for MemoryTaskStore {
    fn list_changed_since(
        &self,
        owner: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskStoreError> {
        let tasks = self.tasks.lock().unwrap();
        let mut changed: Vec<Task> = tasks
            .values()
            .filter(|t| t.owner_id == owner && t.updated_at > since)
            .cloned()
            .collect();
        changed.sort_by_key(|t| t.updated_at);
        Ok(changed)
    }

    fn get(&self, owner: &str, id: &str) -> Result<Option<Task>, TaskStoreError> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.get(&Self::key(owner, id)).cloned())
    }

    fn create(&self, owner: &str, draft: TaskDraft) -> Result<Task, TaskStoreError> {
        draft.validate()?;
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner.to_string(),
            title: draft.title,
            description: draft.description,
            status: draft.status,
            priority: draft.priority,
            start_at: draft.start_at,
            due_at: draft.due_at,
            estimated_minutes: draft.estimated_minutes,
            category_id: draft.category_id,
            notes: draft.notes,
            tags: draft.tags,
            updated_at: Utc::now(),
        };
        let mut tasks = self.tasks.lock().unwrap();
        tasks.insert(Self::key(owner, &task.id), task.clone());
        Ok(task)
    }

    fn update(&self, owner: &str, id: &str, patch: TaskPatch) -> Result<Task, TaskStoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&Self::key(owner, id))
            .ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;
        patch.apply(task, Utc::now());
        Ok(task.clone())
    }

    fn delete(&self, owner: &str, id: &str) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        tasks
            .remove(&Self::key(owner, id))
            .ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;
        Ok(())
    }

    fn list_ids(&self, owner: &str) -> Result<Vec<String>, TaskStoreError> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .values()
            .filter(|t| t.owner_id == owner)
            .map(|t| t.id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn draft_validation_rejects_inverted_range() {
        let now = Utc::now();
        let bad = TaskDraft {
            start_at: Some(now),
            due_at: Some(now - Duration::hours(1)),
            ..draft("backwards")
        };
        assert!(matches!(
            bad.validate(),
            Err(ValidationError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn draft_validation_enforces_tag_limits() {
        let too_many = TaskDraft {
            tags: (0..11).map(|i| format!("tag-{i}")).collect(),
            ..draft("tags")
        };
        assert!(matches!(
            too_many.validate(),
            Err(ValidationError::TooManyTags { count: 11, .. })
        ));

        let too_long = TaskDraft {
            tags: vec!["x".repeat(51)],
            ..draft("tags")
        };
        assert!(matches!(
            too_long.validate(),
            Err(ValidationError::TagTooLong { .. })
        ));

        let duplicate = TaskDraft {
            tags: vec!["a".to_string(), "a".to_string()],
            ..draft("tags")
        };
        assert!(matches!(
            duplicate.validate(),
            Err(ValidationError::DuplicateTag(_))
        ));
    }

    #[test]
    fn memory_store_crud_roundtrip() {
        let store = MemoryTaskStore::new();
        let created = store.create("alice", draft("write tests")).unwrap();
        assert_eq!(created.owner_id, "alice");

        let fetched = store.get("alice", &created.id).unwrap().unwrap();
        assert_eq!(fetched.title, "write tests");

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let updated = store.update("alice", &created.id, patch).unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert!(updated.updated_at >= created.updated_at);

        store.delete("alice", &created.id).unwrap();
        assert!(store.get("alice", &created.id).unwrap().is_none());
    }

    #[test]
    fn list_changed_since_filters_by_owner_and_time() {
        let store = MemoryTaskStore::new();
        let t0 = Utc::now() - Duration::hours(2);
        store.insert(Task {
            id: "old".to_string(),
            owner_id: "alice".to_string(),
            title: "old".to_string(),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            start_at: None,
            due_at: None,
            estimated_minutes: None,
            category_id: None,
            notes: String::new(),
            tags: vec![],
            updated_at: t0,
        });
        let fresh = store.create("alice", draft("fresh")).unwrap();
        store.create("bob", draft("other owner")).unwrap();

        let changed = store
            .list_changed_since("alice", Utc::now() - Duration::hours(1))
            .unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, fresh.id);
    }

    #[test]
    fn persist_and_load_roundtrip() {
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");

        let store = MemoryTaskStore::new();
        let created = store.create("alice", draft("persisted")).unwrap();
        store.persist(&path).unwrap();

        let reloaded = MemoryTaskStore::new();
        reloaded.load(&path).unwrap();
        let fetched = reloaded.get("alice", &created.id).unwrap().unwrap();
        assert_eq!(fetched.title, "persisted");
    }
}
