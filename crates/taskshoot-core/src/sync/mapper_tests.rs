use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use crate::sync::gcal::{ExtendedProperties, GcalEvent, GcalTime};
use crate::sync::mapper::*;
use crate::task::{Task, TaskPriority, TaskStatus};

fn sample_task() -> Task {
    Task {
        id: "task-1".to_string(),
        owner_id: "alice".to_string(),
        title: "Write quarterly report".to_string(),
        description: Some("Numbers from finance first".to_string()),
        status: TaskStatus::InProgress,
        priority: TaskPriority::High,
        start_at: Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()),
        due_at: Some(Utc.with_ymd_and_hms(2026, 3, 2, 11, 30, 0).unwrap()),
        estimated_minutes: Some(90),
        category_id: Some("cat-work".to_string()),
        notes: String::new(),
        tags: vec!["report".to_string()],
        updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    }
}

fn timed_event(summary: &str, start_h: u32, end_h: u32) -> GcalEvent {
    GcalEvent {
        id: Some("evt-1".to_string()),
        summary: Some(summary.to_string()),
        start: Some(GcalTime::at(
            Utc.with_ymd_and_hms(2026, 3, 2, start_h, 0, 0).unwrap(),
        )),
        end: Some(GcalTime::at(
            Utc.with_ymd_and_hms(2026, 3, 2, end_h, 0, 0).unwrap(),
        )),
        ..Default::default()
    }
}

#[test]
fn marked_round_trip_is_lossless() {
    let task = sample_task();
    let event = task_to_event(&task, Utc::now());
    let draft = event_to_task(&event);

    assert_eq!(draft.title, task.title);
    assert_eq!(draft.priority, task.priority);
    assert_eq!(draft.status, task.status);
    assert_eq!(draft.estimated_minutes, task.estimated_minutes);
    assert_eq!(draft.category_id, task.category_id);
    assert_eq!(draft.description, task.description);
    assert_eq!(draft.start_at, task.start_at);
    assert_eq!(draft.due_at, task.due_at);
}

#[test]
fn round_trip_without_optional_fields() {
    let task = Task {
        description: None,
        estimated_minutes: None,
        category_id: None,
        ..sample_task()
    };
    let event = task_to_event(&task, Utc::now());
    let draft = event_to_task(&event);

    assert_eq!(draft.description, None);
    assert_eq!(draft.estimated_minutes, None);
    assert_eq!(draft.category_id, None);
    assert_eq!(draft.priority, task.priority);
}

#[test]
fn event_carries_source_marker_and_color() {
    let task = sample_task();
    let event = task_to_event(&task, Utc::now());

    assert_eq!(event.private_prop(PROP_SOURCE), Some(SOURCE_VALUE));
    assert_eq!(event.private_prop(PROP_TASK_ID), Some("task-1"));
    assert_eq!(event.private_prop(PROP_PRIORITY), Some("high"));
    assert_eq!(event.private_prop(PROP_STATUS), Some("in_progress"));
    assert_eq!(event.private_prop(PROP_ESTIMATE), Some("90"));
    assert_eq!(event.color_id.as_deref(), Some("6"));
}

#[test]
fn start_and_end_fall_back_to_now_plus_default_span() {
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
    let task = Task {
        start_at: None,
        due_at: None,
        ..sample_task()
    };
    let event = task_to_event(&task, now);
    assert_eq!(event.start.as_ref().unwrap().date_time, Some(now));
    assert_eq!(
        event.end.as_ref().unwrap().date_time,
        Some(now + chrono::Duration::hours(2))
    );
}

#[test]
fn all_day_round_trip_is_unchanged() {
    let start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let task = Task {
        start_at: Some(start),
        due_at: Some(start + chrono::Duration::hours(24)),
        ..sample_task()
    };

    let event = task_to_event(&task, Utc::now());
    let event_start = event.start.as_ref().unwrap();
    assert_eq!(event_start.date_time, None);
    assert_eq!(event_start.date.map(|d| d.to_string()), Some("2026-03-02".to_string()));
    assert_eq!(
        event.end.as_ref().unwrap().date.map(|d| d.to_string()),
        Some("2026-03-03".to_string())
    );

    // Back to a task: midnight instants, no time-of-day component.
    let draft = event_to_task(&event);
    assert_eq!(draft.start_at, Some(start));
    assert_eq!(draft.due_at, Some(start + chrono::Duration::hours(24)));

    // And forward again: still all-day, same dates.
    let task2 = Task {
        start_at: draft.start_at,
        due_at: draft.due_at,
        ..sample_task()
    };
    let event2 = task_to_event(&task2, Utc::now());
    assert_eq!(event2.start, event.start);
    assert_eq!(event2.end, event.end);
}

#[test]
fn partial_day_span_stays_timed() {
    let start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let task = Task {
        start_at: Some(start),
        // 25 hours: midnight-aligned start but not a whole number of days.
        due_at: Some(start + chrono::Duration::hours(25)),
        ..sample_task()
    };
    let event = task_to_event(&task, Utc::now());
    assert!(event.start.as_ref().unwrap().date_time.is_some());
}

#[test]
fn unmarked_event_infers_priority_from_color() {
    let event = GcalEvent {
        color_id: Some("11".to_string()),
        ..timed_event("Pick up parcel", 9, 10)
    };
    let draft = event_to_task(&event);
    assert_eq!(draft.priority, TaskPriority::Urgent);
    assert_eq!(draft.status, TaskStatus::Pending);
}

#[test]
fn unmarked_event_infers_priority_from_title_keywords() {
    let urgent_en = event_to_task(&timed_event("URGENT: server down", 9, 10));
    assert_eq!(urgent_en.priority, TaskPriority::Urgent);

    let urgent_ja = event_to_task(&timed_event("緊急対応", 9, 10));
    assert_eq!(urgent_ja.priority, TaskPriority::Urgent);

    let plain = event_to_task(&timed_event("Lunch with Kim", 12, 13));
    assert_eq!(plain.priority, TaskPriority::Medium);
}

#[test]
fn unmarked_event_estimate_comes_from_duration_clamped() {
    // 5 minutes clamps up to 15.
    let short = GcalEvent {
        end: Some(GcalTime::at(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 5, 0).unwrap(),
        )),
        ..timed_event("Quick call", 9, 10)
    };
    assert_eq!(event_to_task(&short).estimated_minutes, Some(15));

    // A three-day span clamps down to one day.
    let long = GcalEvent {
        end: Some(GcalTime::at(
            Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap(),
        )),
        ..timed_event("Offsite", 9, 10)
    };
    assert_eq!(event_to_task(&long).estimated_minutes, Some(1440));

    // In range passes through: 9..11 is 120 minutes.
    assert_eq!(
        event_to_task(&timed_event("Workshop", 9, 11)).estimated_minutes,
        Some(120)
    );
}

#[test]
fn marker_requires_our_source_value() {
    let mut props = ExtendedProperties::default();
    props
        .private
        .insert(PROP_TASK_ID.to_string(), "task-9".to_string());
    let foreign = GcalEvent {
        extended_properties: Some(props),
        ..timed_event("Some other app", 9, 10)
    };
    assert!(SourceMarker::from_event(&foreign).is_none());

    let ours = task_to_event(&sample_task(), Utc::now());
    let marker = SourceMarker::from_event(&ours).unwrap();
    assert_eq!(marker.task_id, "task-1");
    assert_eq!(marker.priority, TaskPriority::High);
}

#[test]
fn exclusion_rules() {
    let cancelled = GcalEvent {
        status: Some("cancelled".to_string()),
        ..timed_event("Anything", 9, 10)
    };
    assert!(should_exclude_from_sync(&cancelled));

    let private = GcalEvent {
        visibility: Some("private".to_string()),
        ..timed_event("Dentist", 9, 10)
    };
    assert!(should_exclude_from_sync(&private));

    assert!(should_exclude_from_sync(&timed_event(
        "Team Standup (recurring)",
        9,
        10
    )));
    assert!(should_exclude_from_sync(&timed_event("Mom's Birthday", 0, 1)));
    assert!(should_exclude_from_sync(&timed_event("National Holiday", 0, 1)));

    assert!(!should_exclude_from_sync(&timed_event("Design review", 9, 10)));
}

#[test]
fn content_hash_detects_user_visible_changes_only() {
    let base = timed_event("Design review", 9, 10);
    let same = base.clone();
    assert_eq!(content_hash(&base), content_hash(&same));

    let retitled = GcalEvent {
        summary: Some("Design review v2".to_string()),
        ..base.clone()
    };
    assert_ne!(content_hash(&base), content_hash(&retitled));

    let moved = GcalEvent {
        start: Some(GcalTime::at(
            Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
        )),
        ..base.clone()
    };
    assert_ne!(content_hash(&base), content_hash(&moved));

    let relocated = GcalEvent {
        location: Some("Room 4".to_string()),
        ..base.clone()
    };
    assert_ne!(content_hash(&base), content_hash(&relocated));

    // Invisible-to-hash fields leave it unchanged.
    let recolored = GcalEvent {
        color_id: Some("11".to_string()),
        description: Some("notes".to_string()),
        ..base.clone()
    };
    assert_eq!(content_hash(&base), content_hash(&recolored));
}

#[test]
fn description_block_is_stripped_on_the_way_back() {
    let task = sample_task();
    let event = task_to_event(&task, Utc::now());
    let description = event.description.as_deref().unwrap();
    assert!(description.contains(DESCRIPTION_DELIMITER));
    assert!(description.starts_with("Numbers from finance first"));

    let draft = event_to_task(&event);
    assert_eq!(draft.description.as_deref(), Some("Numbers from finance first"));
}

proptest! {
    // The hash reads exactly (title, start, end, location): anything else
    // may vary freely without changing it.
    #[test]
    fn hash_ignores_non_visible_fields(
        description in proptest::option::of(".{0,40}"),
        color in proptest::option::of("[0-9]{1,2}"),
        status in proptest::option::of("(confirmed|tentative)"),
    ) {
        let base = timed_event("Fixed title", 9, 10);
        let decorated = GcalEvent {
            description,
            color_id: color,
            status,
            ..base.clone()
        };
        prop_assert_eq!(content_hash(&base), content_hash(&decorated));
    }

    #[test]
    fn priority_color_table_round_trips(priority in prop_oneof![
        Just(TaskPriority::Low),
        Just(TaskPriority::Medium),
        Just(TaskPriority::High),
        Just(TaskPriority::Urgent),
    ]) {
        prop_assert_eq!(priority_from_color(color_for_priority(priority)), Some(priority));
    }
}
