//! Calendar sync engine

use std::collections::HashSet;
use std::sync::Arc;

use calbot_core::error::{Error, Result};
use calbot_core::model::sort_events;
use calbot_core::store::UserRepo;
use calbot_core::{CalendarInfo, CalendarSource, Credentials, Event};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, info};

use crate::convert;

/// Events that changed since the previous sync
#[derive(Debug, Default, Clone)]
pub struct SyncDelta {
    /// Events not present in the previous snapshot
    pub added: Vec<Event>,
    /// Events already known but modified since the last sync
    pub updated: Vec<Event>,
}

impl SyncDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty()
    }
}

/// Fetches events through the calendar source and maintains the per-user
/// snapshot
pub struct CalendarService {
    repo: UserRepo,
    source: Arc<dyn CalendarSource>,
}

impl CalendarService {
    pub fn new(repo: UserRepo, source: Arc<dyn CalendarSource>) -> Self {
        Self { repo, source }
    }

    fn credentials(&self, user_id: &str) -> Result<Credentials> {
        self.repo
            .credentials(user_id)?
            .ok_or_else(|| Error::CredentialsMissing(user_id.to_string()))
    }

    /// Resolve the calendar home set for the user's account
    pub async fn fetch_calendar_home_set(&self, user_id: &str) -> Result<String> {
        let credentials = self.credentials(user_id)?;
        self.source.find_calendar_home_set(&credentials).await
    }

    /// List the calendars under the user's stored home set
    pub async fn find_calendars(&self, user_id: &str) -> Result<Vec<CalendarInfo>> {
        let credentials = self.credentials(user_id)?;
        let home_set = self
            .repo
            .calendar_home_set(user_id)?
            .ok_or_else(|| Error::Client(format!("No calendar home set stored for {user_id}")))?;
        self.source.list_calendars(&home_set, &credentials).await
    }

    /// Fetch, deduplicate and sort the user's events in `[start, end]`
    pub async fn load_events(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let settings = self.repo.settings_required(user_id)?;
        if settings.calendar.is_empty() {
            return Err(Error::Client(format!("No calendar selected for {user_id}")));
        }
        let credentials = self.credentials(user_id)?;
        let raw_events = self
            .source
            .query_events(&settings.calendar, &credentials, start, end)
            .await?;

        let mut events = convert::raw_events_to_events(&raw_events)?;
        sort_events(&mut events);
        debug!(user = user_id, "Loaded {} events", events.len());
        Ok(events)
    }

    /// Fetch today's events (user-local midnight to 23:59:59)
    pub async fn load_today(&self, user_id: &str) -> Result<Vec<Event>> {
        let (start, end) = self.today_window(user_id)?;
        self.load_events(user_id, start, end).await
    }

    /// Fetch today's events and persist them as the snapshot baseline.
    ///
    /// Used when a user (re)submits settings: the following sync starts
    /// from this state and reports nothing retroactively.
    pub async fn seed(&self, user_id: &str) -> Result<Vec<Event>> {
        let events = self.load_today(user_id).await?;
        self.repo.save_events(user_id, &events)?;
        self.repo.save_last_update(user_id, Utc::now())?;
        info!(user = user_id, "Seeded snapshot with {} events", events.len());
        Ok(events)
    }

    /// Refresh the snapshot and report which events were added or updated
    /// since the previous sync.
    ///
    /// The fresh set replaces the snapshot unconditionally, and the sync
    /// marker only ever moves forward to the fetch time.
    pub async fn sync(&self, user_id: &str) -> Result<SyncDelta> {
        let now = Utc::now();
        // First sync: treat "now" as the baseline and only seed the snapshot
        let last_update = self.repo.last_update(user_id)?.unwrap_or(now);

        let settings = self.repo.settings_required(user_id)?;
        let user_now = settings.user_now();

        let fresh = self.load_today(user_id).await?;
        let previous = self.repo.events(user_id)?;

        let delta = classify(&fresh, &previous, last_update, user_now);

        self.repo.save_events(user_id, &fresh)?;
        self.repo.save_last_update(user_id, now)?;

        if !delta.is_empty() {
            info!(
                user = user_id,
                added = delta.added.len(),
                updated = delta.updated.len(),
                "Sync found changes"
            );
        }
        Ok(delta)
    }

    fn today_window(&self, user_id: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let settings = self.repo.settings_required(user_id)?;
        let tz = settings.user_timezone();
        let today = Utc::now().with_timezone(&tz).date_naive();

        let start = today
            .and_hms_opt(0, 0, 0)
            .and_then(|dt| tz.from_local_datetime(&dt).earliest());
        let end = today
            .and_hms_opt(23, 59, 59)
            .and_then(|dt| tz.from_local_datetime(&dt).latest());
        match (start, end) {
            (Some(start), Some(end)) => {
                Ok((start.with_timezone(&Utc), end.with_timezone(&Utc)))
            }
            _ => Err(Error::Client(format!(
                "Could not compute today's window in zone {}",
                tz.name()
            ))),
        }
    }
}

/// Classify freshly fetched events against the previous snapshot.
///
/// An event is surfaced only if it was modified after `last_update` and its
/// start is still ahead of `user_now`; already-started or past-modified
/// events are never announced. Known ids go to `updated`, new ids to
/// `added`.
fn classify(
    fresh: &[Event],
    previous: &[Event],
    last_update: DateTime<Utc>,
    user_now: NaiveDateTime,
) -> SyncDelta {
    let previous_ids: HashSet<&str> = previous.iter().map(|e| e.id.as_str()).collect();

    let mut delta = SyncDelta::default();
    for event in fresh {
        if event.last_modified_time > last_update && event.starts_after(user_now) {
            if previous_ids.contains(event.id.as_str()) {
                delta.updated.push(event.clone());
            } else {
                delta.added.push(event.clone());
            }
        }
    }
    delta
}
