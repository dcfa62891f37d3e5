//! Shared test doubles for the sync and reminder tests

use std::sync::Mutex;

use async_trait::async_trait;
use calbot_core::error::Result;
use calbot_core::{CalendarInfo, CalendarSource, Credentials, Event, Notifier, RawEvent};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Scripted calendar source returning a fixed raw-event batch
pub struct MockSource {
    events: Mutex<Vec<RawEvent>>,
}

impl MockSource {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self {
            events: Mutex::new(events),
        }
    }

    pub fn set_events(&self, events: Vec<RawEvent>) {
        *self.events.lock().unwrap() = events;
    }
}

#[async_trait]
impl CalendarSource for MockSource {
    async fn find_calendar_home_set(&self, _credentials: &Credentials) -> Result<String> {
        Ok("/calendars/alice/".to_string())
    }

    async fn list_calendars(
        &self,
        _home_set: &str,
        _credentials: &Credentials,
    ) -> Result<Vec<CalendarInfo>> {
        Ok(vec![CalendarInfo {
            name: "Personal".to_string(),
            path: "personal".to_string(),
        }])
    }

    async fn query_events(
        &self,
        _calendar_path: &str,
        _credentials: &Credentials,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>> {
        Ok(self.events.lock().unwrap().clone())
    }
}

/// Everything a notifier was asked to send
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Digest { title: String, count: usize },
    Single { title: String, event: String },
    Plain(String),
    Status(NaiveDateTime),
}

/// Notifier double recording every call
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_digest(&self, _user_id: &str, title: &str, events: &[Event]) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Digest {
            title: title.to_string(),
            count: events.len(),
        });
        Ok(())
    }

    async fn send_single(&self, _user_id: &str, title: &str, event: &Event) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Single {
            title: title.to_string(),
            event: event.name.clone(),
        });
        Ok(())
    }

    async fn send_plain(&self, _user_id: &str, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Plain(text.to_string()));
        Ok(())
    }

    async fn set_meeting_status(&self, _user_id: &str, until: NaiveDateTime) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Status(until));
        Ok(())
    }
}

/// Model event with a fixed timezone, id derived from the name
pub fn event(name: &str, start: NaiveDateTime, end: NaiveDateTime, modified: DateTime<Utc>) -> Event {
    Event::new(
        format!("uid-{name}"),
        name,
        "",
        "",
        "Europe/Moscow",
        start,
        end,
        modified,
    )
    .unwrap()
}

/// Raw event with valid timestamps and a last-modified far in the past
pub fn raw_event(uid: &str, summary: &str) -> RawEvent {
    RawEvent {
        uid: uid.to_string(),
        summary: summary.to_string(),
        dtstart: Some("20240514T100000".to_string()),
        dtend: Some("20240514T110000".to_string()),
        last_modified: Some("20240513T070000Z".to_string()),
        tzid: Some("Europe/Moscow".to_string()),
        ..Default::default()
    }
}
