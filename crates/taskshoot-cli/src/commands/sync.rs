//! Sync subcommand: run synchronization and inspect recent runs.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use clap::Subcommand;
use taskshoot_core::storage::{data_dir, Config, SyncStateDb};
use taskshoot_core::sync::credentials::{
    load_client_credentials, CredentialStore, KeyringTokenStore,
};
use taskshoot_core::sync::{
    GcalClient, OAuthConfig, SyncDirection, SyncEngine, SyncRequest, SyncRunResult, TimeWindow,
};
use taskshoot_core::task::MemoryTaskStore;

use super::owner_or_default;

#[derive(Subcommand)]
pub enum SyncAction {
    /// Run a synchronization for an owner
    Run {
        /// Owner to sync (defaults to "default")
        #[arg(long)]
        owner: Option<String>,
        /// Calendar to sync; may repeat. Defaults to the configured list.
        #[arg(long = "calendar")]
        calendars: Vec<String>,
        /// gcal_to_taskshoot, taskshoot_to_gcal or both
        #[arg(long)]
        direction: Option<String>,
        /// Discard the sync token and re-walk the whole window
        #[arg(long)]
        full: bool,
        /// Stop issuing new API calls after this many seconds
        #[arg(long)]
        timeout_secs: Option<i64>,
        /// JSON file holding the local tasks (defaults to tasks.json in the
        /// data directory)
        #[arg(long)]
        tasks_file: Option<PathBuf>,
    },
    /// Show recent runs for an owner
    Status {
        #[arg(long)]
        owner: Option<String>,
        /// How many runs to show
        #[arg(long, default_value_t = 5)]
        limit: u32,
        /// Emit the raw run records as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: SyncAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SyncAction::Run {
            owner,
            calendars,
            direction,
            full,
            timeout_secs,
            tasks_file,
        } => run_sync(
            owner_or_default(owner),
            calendars,
            direction,
            full,
            timeout_secs,
            tasks_file,
        ),
        SyncAction::Status { owner, limit, json } => {
            show_status(owner_or_default(owner), limit, json)
        }
    }
}

fn run_sync(
    owner: String,
    calendars: Vec<String>,
    direction: Option<String>,
    full: bool,
    timeout_secs: Option<i64>,
    tasks_file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let direction = match direction {
        Some(name) => SyncDirection::parse(&name)
            .ok_or_else(|| format!("unknown direction '{name}'"))?,
        None => config.sync.direction,
    };
    let calendar_ids = if calendars.is_empty() {
        config.sync.calendar_ids.clone()
    } else {
        calendars
    };

    let db = SyncStateDb::open()?;
    if db.reconnect_required(&owner)? {
        return Err(format!(
            "reconnect required for {owner}; run `taskshoot-cli auth google login`"
        )
        .into());
    }

    let tasks_path = match tasks_file {
        Some(path) => path,
        None => data_dir()?.join("tasks.json"),
    };
    let tasks = Arc::new(MemoryTaskStore::new());
    tasks.load(&tasks_path)?;

    let window = match config.sync.window_days {
        Some(days) => TimeWindow {
            time_min: Some(Utc::now() - Duration::days(days)),
            time_max: None,
        },
        None => TimeWindow::default(),
    };

    let (client_id, client_secret) = load_client_credentials()?.unwrap_or_default();
    let credentials = Arc::new(CredentialStore::new(
        OAuthConfig::google(client_id, client_secret),
        Arc::new(KeyringTokenStore),
    ));
    let engine = SyncEngine::new(
        Arc::new(GcalClient::new()),
        credentials,
        Arc::new(Mutex::new(db)),
        tasks.clone(),
    )
    .with_window(window);

    let mut request = SyncRequest::new(owner, calendar_ids, direction);
    request.force_full_sync = full;
    request.deadline = timeout_secs.map(|secs| Utc::now() + Duration::seconds(secs));

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(engine.sync(request))?;

    tasks.persist(&tasks_path)?;
    print_result(&result);
    Ok(())
}

fn print_result(result: &SyncRunResult) {
    println!(
        "{}: processed {}, created {}, updated {}, deleted {}",
        result.status.as_str(),
        result.events_processed,
        result.events_created,
        result.events_updated,
        result.events_deleted,
    );
    for conflict in &result.conflicts {
        println!(
            "  conflict {}/{}: {:?} won",
            conflict.task_id, conflict.event_id, conflict.winner
        );
    }
    for error in &result.errors {
        println!("  failed [{}] {}: {}", error.calendar_id, error.item, error.message);
    }
}

fn show_status(owner: String, limit: u32, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let db = SyncStateDb::open()?;
    let runs = db.recent_runs(&owner, limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("No sync runs recorded for {owner}.");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {}  {}  processed {} (+{} ~{} -{}) errors {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.direction.as_str(),
            run.status.as_str(),
            run.events_processed,
            run.events_created,
            run.events_updated,
            run.events_deleted,
            run.errors.len(),
        );
    }
    Ok(())
}
