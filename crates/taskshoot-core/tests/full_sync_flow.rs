//! End-to-end sync flow: real HTTP client against a mock calendar API.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use mockito::Matcher;
use serde_json::json;

use taskshoot_core::storage::SyncStateDb;
use taskshoot_core::sync::{
    CredentialStore, GcalClient, MemoryTokenStore, OAuthConfig, RetryPolicy, SyncDirection,
    SyncEngine, SyncRequest,
};
use taskshoot_core::task::{MemoryTaskStore, TaskStore};

fn engine_against(
    server: &mockito::ServerGuard,
) -> (SyncEngine, Arc<MemoryTaskStore>, Arc<StdMutex<SyncStateDb>>) {
    let client = GcalClient::with_base_url(server.url()).with_retry_policy(RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
    });
    let credentials = Arc::new(CredentialStore::new(
        OAuthConfig::google("id", "secret"),
        Arc::new(MemoryTokenStore::with_static_token("alice", "token-1")),
    ));
    let state = Arc::new(StdMutex::new(SyncStateDb::open_memory().unwrap()));
    let tasks = Arc::new(MemoryTaskStore::new());
    let engine = SyncEngine::new(
        Arc::new(client),
        credentials,
        state.clone(),
        tasks.clone(),
    );
    (engine, tasks, state)
}

#[tokio::test]
async fn full_sync_imports_remote_events_over_http() {
    let mut server = mockito::Server::new_async().await;
    let _events = server
        .mock("GET", "/calendars/primary/events")
        .match_query(Matcher::Exact("maxResults=250&singleEvents=true".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [
                    {
                        "id": "evt-1",
                        "summary": "Design review",
                        "start": {"dateTime": "2026-03-02T09:00:00Z"},
                        "end": {"dateTime": "2026-03-02T10:00:00Z"},
                        "updated": "2026-03-01T08:00:00Z"
                    },
                    {
                        "id": "evt-2",
                        "summary": "Company Holiday",
                        "start": {"date": "2026-03-03"},
                        "end": {"date": "2026-03-04"}
                    }
                ],
                "nextSyncToken": "sync-tok-1"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let (engine, tasks, state) = engine_against(&server);
    let result = engine
        .sync(SyncRequest::new(
            "alice",
            vec!["primary".to_string()],
            SyncDirection::GcalToTaskshoot,
        ))
        .await
        .unwrap();

    // The holiday matches the exclusion list: one import, one skip.
    assert_eq!(result.events_processed, 1);
    assert_eq!(result.events_created, 1);

    let ids = tasks.list_ids("alice").unwrap();
    assert_eq!(ids.len(), 1);
    let imported = tasks.get("alice", &ids[0]).unwrap().unwrap();
    assert_eq!(imported.title, "Design review");
    assert_eq!(imported.estimated_minutes, Some(60));

    let db = state.lock().unwrap();
    let cursor = db.get_cursor("alice", "primary").unwrap();
    assert_eq!(cursor.sync_token.as_deref(), Some("sync-tok-1"));
    assert!(db
        .get_mapping_by_event("alice", "primary", "evt-1")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn push_then_incremental_pull_round_trip() {
    let mut server = mockito::Server::new_async().await;

    // Push: the engine creates a remote event for the local task.
    let create = server
        .mock("POST", "/calendars/primary/events")
        .match_body(Matcher::PartialJson(json!({
            "summary": "Ship release notes",
            "extendedProperties": {"private": {"taskshoot_source": "taskshoot"}}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "evt-10",
                "summary": "Ship release notes",
                "start": {"dateTime": "2026-03-02T09:00:00Z"},
                "end": {"dateTime": "2026-03-02T11:00:00Z"}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let (engine, tasks, state) = engine_against(&server);
    tasks
        .create(
            "alice",
            taskshoot_core::task::TaskDraft {
                title: "Ship release notes".to_string(),
                ..Default::default()
            },
        )
        .unwrap();

    let push = engine
        .sync(SyncRequest::new(
            "alice",
            vec!["primary".to_string()],
            SyncDirection::TaskshootToGcal,
        ))
        .await
        .unwrap();
    create.assert_async().await;
    assert_eq!(push.events_created, 1);

    // Seed an incremental cursor, then pull changes since it.
    {
        let db = state.lock().unwrap();
        let mut cursor = db.get_cursor("alice", "primary").unwrap();
        cursor.sync_token = Some("sync-tok-1".to_string());
        db.set_cursor(&cursor).unwrap();
    }

    let _changes = server
        .mock("GET", "/calendars/primary/events")
        .match_query(Matcher::Exact("maxResults=250&syncToken=sync-tok-1".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [],
                "nextSyncToken": "sync-tok-2"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let pull = engine
        .sync(SyncRequest::new(
            "alice",
            vec!["primary".to_string()],
            SyncDirection::GcalToTaskshoot,
        ))
        .await
        .unwrap();
    assert_eq!(pull.events_processed, 0);

    let db = state.lock().unwrap();
    let cursor = db.get_cursor("alice", "primary").unwrap();
    assert_eq!(cursor.sync_token.as_deref(), Some("sync-tok-2"));
}
