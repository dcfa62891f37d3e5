//! Capability traits implemented by the adapter crates
//!
//! The sync engine, reminder evaluator and scheduler only ever see these
//! contracts; concrete CalDAV/chat/host implementations are injected at
//! construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Credentials, Event};

/// A calendar event as returned by the calendar source, fields still in
/// their iCalendar text form. Conversion (and parse failure) happens in the
/// sync engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    /// iCalendar UID
    pub uid: String,
    /// SUMMARY property
    pub summary: String,
    /// DESCRIPTION property
    #[serde(default)]
    pub description: String,
    /// URL property
    #[serde(default)]
    pub url: String,
    /// DTSTART value, e.g. `20240514T100000` or `20240514T070000Z`
    pub dtstart: Option<String>,
    /// DTEND value
    pub dtend: Option<String>,
    /// LAST-MODIFIED value
    pub last_modified: Option<String>,
    /// TZID of the enclosing VTIMEZONE, when present
    pub tzid: Option<String>,
}

/// A calendar available on the user's account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarInfo {
    /// Display name
    pub name: String,
    /// Server path used for queries
    pub path: String,
}

/// Semantic operations the core needs from a CalDAV-like calendar service
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Resolve the calendar home set for the account
    async fn find_calendar_home_set(&self, credentials: &Credentials) -> Result<String>;

    /// List the calendars under a home set
    async fn list_calendars(
        &self,
        home_set: &str,
        credentials: &Credentials,
    ) -> Result<Vec<CalendarInfo>>;

    /// Query events within `[start, end]` (UTC instants) on one calendar
    async fn query_events(
        &self,
        calendar_path: &str,
        credentials: &Credentials,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>>;
}

/// Outbound chat notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a titled rollup of events (digest, added/updated lists)
    async fn send_digest(&self, user_id: &str, title: &str, events: &[Event]) -> Result<()>;

    /// Send a single-event notification
    async fn send_single(&self, user_id: &str, title: &str, event: &Event) -> Result<()>;

    /// Send a plain text message (welcome, user-visible failures)
    async fn send_plain(&self, user_id: &str, text: &str) -> Result<()>;

    /// Apply an "in meeting" status expiring at the event's end
    async fn set_meeting_status(&self, user_id: &str, until: chrono::NaiveDateTime) -> Result<()>;
}

/// Staleness oracle: whether the chat host still knows the user
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: &str) -> bool;
}

/// Per-user work dispatched by the scheduler.
///
/// An error means "skip this tick"; the next scheduled tick is the retry.
#[async_trait]
pub trait TickHandler: Send + Sync {
    /// Frequent tick: evaluate reminders against the stored snapshot
    async fn reminder_tick(&self, user_id: &str) -> Result<()>;

    /// Infrequent tick: refresh the snapshot and announce the delta
    async fn sync_tick(&self, user_id: &str) -> Result<()>;
}
