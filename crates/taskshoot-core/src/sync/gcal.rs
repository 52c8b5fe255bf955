//! Google Calendar REST client for sync operations.
//!
//! A thin, retrying wrapper over the events API: transient failures (429,
//! 5xx, connection errors) are retried with exponential backoff and never
//! escape unless the budget is exhausted; HTTP 410 on an incremental fetch
//! is surfaced as [`SyncError::SyncTokenInvalid`] without retrying so the
//! orchestrator can fall back to a full sync.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::sync::types::SyncError;

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Page size requested from the events API.
const PAGE_SIZE: u32 = 250;

/// Worker limit for multi-calendar batch fetches.
pub const MAX_BATCH_CONCURRENCY: usize = 5;

/// Retry budget for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff is `base_delay * 2^attempt`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Optional fetch window for full syncs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeWindow {
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
}

/// Event start/end: either a timed instant or an all-day date, never both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcalTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl GcalTime {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            date_time: Some(instant),
            date: None,
        }
    }

    pub fn all_day(date: NaiveDate) -> Self {
        Self {
            date_time: None,
            date: Some(date),
        }
    }

    /// Resolve to an instant; all-day dates resolve to UTC midnight.
    pub fn to_instant(&self) -> Option<DateTime<Utc>> {
        self.date_time.or_else(|| {
            self.date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|midnight| midnight.and_utc())
        })
    }

    /// Canonical string used by the content hash.
    pub fn canonical(&self) -> String {
        match (&self.date_time, &self.date) {
            (Some(dt), _) => dt.to_rfc3339(),
            (None, Some(d)) => d.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Private extended-property bag; carries the sync source marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedProperties {
    #[serde(default)]
    pub private: BTreeMap<String, String>,
}

/// A calendar event as the provider represents it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GcalEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<GcalTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<GcalTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_properties: Option<ExtendedProperties>,
}

impl GcalEvent {
    /// Look up a private extended property.
    pub fn private_prop(&self, key: &str) -> Option<&str> {
        self.extended_properties
            .as_ref()
            .and_then(|p| p.private.get(key))
            .map(String::as_str)
    }

    pub fn summary_or_untitled(&self) -> &str {
        self.summary.as_deref().unwrap_or("(No title)")
    }
}

/// One page of events plus the provider's continuation/sync tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventsPage {
    pub events: Vec<GcalEvent>,
    /// More pages remain; pass this back to continue.
    pub next_page_token: Option<String>,
    /// Present on the final page; enables incremental fetches.
    pub next_sync_token: Option<String>,
}

/// Fully materialized event listing (pagination exhausted internally).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSnapshot {
    pub events: Vec<GcalEvent>,
    pub next_sync_token: Option<String>,
}

/// An entry from the owner's calendar list.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarListEntry {
    pub id: String,
    pub summary: String,
    pub primary: bool,
}

impl Default for CalendarListEntry {
    fn default() -> Self {
        Self {
            id: String::new(),
            summary: String::new(),
            primary: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EventsResponse {
    items: Vec<GcalEvent>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CalendarListResponse {
    items: Vec<CalendarListEntry>,
    next_page_token: Option<String>,
}

/// Calendar operations the orchestrator depends on. `GcalClient` is the
/// production implementation; tests substitute a scripted fake.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_calendars(&self, token: &str) -> Result<Vec<CalendarListEntry>, SyncError>;

    /// Full listing over `window`, pagination exhausted internally.
    async fn list_all_events(
        &self,
        token: &str,
        calendar_id: &str,
        window: &TimeWindow,
    ) -> Result<EventSnapshot, SyncError>;

    /// Incremental listing since `sync_token`. HTTP 410 maps to
    /// [`SyncError::SyncTokenInvalid`] and is never retried.
    async fn list_changes(
        &self,
        token: &str,
        calendar_id: &str,
        sync_token: &str,
    ) -> Result<EventSnapshot, SyncError>;

    async fn get_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<GcalEvent, SyncError>;

    async fn create_event(
        &self,
        token: &str,
        calendar_id: &str,
        event: &GcalEvent,
    ) -> Result<GcalEvent, SyncError>;

    async fn update_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &GcalEvent,
    ) -> Result<GcalEvent, SyncError>;

    async fn delete_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), SyncError>;
}

/// Google Calendar API client.
#[derive(Clone)]
pub struct GcalClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GcalClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client at a different API root (tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    /// Send with retries on 429/5xx/connection errors. Returns the final
    /// response; non-retryable statuses are the caller's to classify.
    async fn send_with_retry(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SyncError> {
        let mut attempt: u32 = 0;
        loop {
            let cloned = req
                .try_clone()
                .ok_or_else(|| SyncError::Api("request body not cloneable".to_string()))?;
            match cloned.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt >= self.retry.max_retries {
                        return Ok(resp);
                    }
                    warn!(%status, attempt, "transient API failure, backing off");
                }
                Err(err) => {
                    let retryable = err.is_connect() || err.is_timeout();
                    if !retryable || attempt >= self.retry.max_retries {
                        return Err(SyncError::Network(err));
                    }
                    warn!(error = %err, attempt, "network failure, backing off");
                }
            }
            let delay = self.retry.base_delay * 2u32.saturating_pow(attempt);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Map a non-success response to the sync error taxonomy.
    async fn classify_error(resp: reqwest::Response) -> SyncError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        match status.as_u16() {
            401 => SyncError::AuthExpired,
            403 if body.contains("rateLimitExceeded") => SyncError::RateLimited,
            410 => SyncError::SyncTokenInvalid,
            429 => SyncError::RateLimited,
            _ => SyncError::Api(format!("HTTP {status}: {body}")),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SyncError> {
        let req = self.http.get(url).bearer_auth(token).query(query);
        let resp = self.send_with_retry(req).await?;
        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    fn base_events_query(page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![("maxResults", PAGE_SIZE.to_string())];
        if let Some(page_token) = page_token {
            query.push(("pageToken", page_token.to_string()));
        }
        query
    }

    /// One page of events in `window`.
    pub async fn list_events(
        &self,
        token: &str,
        calendar_id: &str,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> Result<EventsPage, SyncError> {
        let mut query = vec![
            ("maxResults", PAGE_SIZE.to_string()),
            ("singleEvents", "true".to_string()),
        ];
        if let Some(time_min) = window.time_min {
            query.push(("timeMin", time_min.to_rfc3339()));
        }
        if let Some(time_max) = window.time_max {
            query.push(("timeMax", time_max.to_rfc3339()));
        }
        if let Some(page_token) = page_token {
            query.push(("pageToken", page_token.to_string()));
        }

        let resp: EventsResponse = self
            .get_json(token, &self.events_url(calendar_id), &query)
            .await?;
        Ok(EventsPage {
            events: resp.items,
            next_page_token: resp.next_page_token,
            next_sync_token: resp.next_sync_token,
        })
    }

    /// One page of changes since `sync_token`.
    pub async fn list_events_since(
        &self,
        token: &str,
        calendar_id: &str,
        sync_token: &str,
        page_token: Option<&str>,
    ) -> Result<EventsPage, SyncError> {
        let mut query = Self::base_events_query(page_token);
        query.push(("syncToken", sync_token.to_string()));

        let resp: EventsResponse = self
            .get_json(token, &self.events_url(calendar_id), &query)
            .await?;
        Ok(EventsPage {
            events: resp.items,
            next_page_token: resp.next_page_token,
            next_sync_token: resp.next_sync_token,
        })
    }

    /// Fetch events for several calendars with bounded concurrency. A
    /// failing calendar contributes an empty result and a logged error
    /// instead of aborting the batch.
    pub async fn fetch_calendars_batch(
        &self,
        token: &str,
        calendar_ids: &[String],
        window: &TimeWindow,
    ) -> HashMap<String, Vec<GcalEvent>> {
        let semaphore = Arc::new(Semaphore::new(MAX_BATCH_CONCURRENCY));
        let mut join_set = JoinSet::new();

        for calendar_id in calendar_ids {
            let client = self.clone();
            let token = token.to_string();
            let calendar_id = calendar_id.clone();
            let window = *window;
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = client.list_all_events(&token, &calendar_id, &window).await;
                (calendar_id, result)
            });
        }

        let mut results = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            let Ok((calendar_id, result)) = joined else {
                continue;
            };
            match result {
                Ok(snapshot) => {
                    results.insert(calendar_id, snapshot.events);
                }
                Err(err) => {
                    warn!(%calendar_id, error = %err, "batch fetch failed for calendar");
                    results.insert(calendar_id, Vec::new());
                }
            }
        }
        results
    }
}

impl Default for GcalClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CalendarApi for GcalClient {
    async fn list_calendars(&self, token: &str) -> Result<Vec<CalendarListEntry>, SyncError> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let query = Self::base_events_query(page_token.as_deref());
            let resp: CalendarListResponse = self.get_json(token, &url, &query).await?;
            calendars.extend(resp.items.into_iter().filter(|c| !c.id.is_empty()));
            match resp.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(calendars)
    }

    async fn list_all_events(
        &self,
        token: &str,
        calendar_id: &str,
        window: &TimeWindow,
    ) -> Result<EventSnapshot, SyncError> {
        let mut snapshot = EventSnapshot::default();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events(token, calendar_id, window, page_token.as_deref())
                .await?;
            snapshot.events.extend(page.events);
            if page.next_sync_token.is_some() {
                snapshot.next_sync_token = page.next_sync_token;
            }
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        debug!(
            calendar_id,
            events = snapshot.events.len(),
            "full event listing complete"
        );
        Ok(snapshot)
    }

    async fn list_changes(
        &self,
        token: &str,
        calendar_id: &str,
        sync_token: &str,
    ) -> Result<EventSnapshot, SyncError> {
        let mut snapshot = EventSnapshot::default();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events_since(token, calendar_id, sync_token, page_token.as_deref())
                .await?;
            snapshot.events.extend(page.events);
            if page.next_sync_token.is_some() {
                snapshot.next_sync_token = page.next_sync_token;
            }
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        debug!(
            calendar_id,
            changes = snapshot.events.len(),
            "incremental listing complete"
        );
        Ok(snapshot)
    }

    async fn get_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<GcalEvent, SyncError> {
        self.get_json(token, &self.event_url(calendar_id, event_id), &[])
            .await
    }

    async fn create_event(
        &self,
        token: &str,
        calendar_id: &str,
        event: &GcalEvent,
    ) -> Result<GcalEvent, SyncError> {
        let req = self
            .http
            .post(self.events_url(calendar_id))
            .bearer_auth(token)
            .json(event);
        let resp = self.send_with_retry(req).await?;
        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn update_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &GcalEvent,
    ) -> Result<GcalEvent, SyncError> {
        let req = self
            .http
            .put(self.event_url(calendar_id, event_id))
            .bearer_auth(token)
            .json(event);
        let resp = self.send_with_retry(req).await?;
        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn delete_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), SyncError> {
        let req = self
            .http
            .delete(self.event_url(calendar_id, event_id))
            .bearer_auth(token);
        let resp = self.send_with_retry(req).await?;
        // Already gone on the provider side counts as deleted.
        if matches!(resp.status().as_u16(), 404 | 410) {
            return Ok(());
        }
        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        Ok(())
    }
}
