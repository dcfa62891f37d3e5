//! Calendar event entity and its time comparators

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const TIME_FORMAT: &str = "%H:%M";

/// A single calendar event, immutable once constructed.
///
/// Start/end are civil timestamps in the event's own timezone. All start/end
/// comparators operate at minute granularity on the time-of-day only (the
/// date component is ignored): reminder ticks fire on minute boundaries and
/// only ever compare against events from the same day's snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Stable external identifier (iCalendar UID)
    pub id: String,
    /// Event summary/title
    pub name: String,
    /// Event description
    #[serde(default)]
    pub description: String,
    /// Event URL
    #[serde(default)]
    pub url: String,
    /// IANA timezone the civil timestamps are expressed in
    pub time_zone: String,
    /// Event start, civil time
    pub start_time: NaiveDateTime,
    /// Event end, civil time
    pub end_time: NaiveDateTime,
    /// Source-provided last modification instant
    pub last_modified_time: DateTime<Utc>,
}

impl Event {
    /// Create a new event, enforcing `start_time <= end_time`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
        time_zone: impl Into<String>,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        last_modified_time: DateTime<Utc>,
    ) -> Result<Self> {
        let name = name.into();
        if end_time < start_time {
            return Err(Error::Parse(format!(
                "Event '{}' ends before it starts",
                name
            )));
        }
        Ok(Self {
            id: id.into(),
            name,
            description: description.into(),
            url: url.into(),
            time_zone: time_zone.into(),
            start_time,
            end_time,
            last_modified_time,
        })
    }

    /// True if the event starts strictly before `t` (minute granularity)
    pub fn starts_before(&self, t: NaiveDateTime) -> bool {
        hour_minute(self.start_time) < hour_minute(t)
    }

    /// True if the event starts at or before `t` (minute granularity)
    pub fn starts_at_or_before(&self, t: NaiveDateTime) -> bool {
        hour_minute(self.start_time) <= hour_minute(t)
    }

    /// True if the event starts strictly after `t` (minute granularity)
    pub fn starts_after(&self, t: NaiveDateTime) -> bool {
        hour_minute(self.start_time) > hour_minute(t)
    }

    /// True if the event starts exactly at `t`'s hour and minute
    pub fn starts_at(&self, t: NaiveDateTime) -> bool {
        hour_minute(self.start_time) == hour_minute(t)
    }

    /// True if the event ends at or after `t` (minute granularity)
    pub fn ends_at_or_after(&self, t: NaiveDateTime) -> bool {
        hour_minute(self.end_time) >= hour_minute(t)
    }

    /// True if `t` falls within `[start, end]` (minute granularity)
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.starts_at_or_before(t) && self.ends_at_or_after(t)
    }

    /// Start time formatted as `HH:MM`
    pub fn start_time_formatted(&self) -> String {
        self.start_time.format(TIME_FORMAT).to_string()
    }

    /// End time formatted as `HH:MM`
    pub fn end_time_formatted(&self) -> String {
        self.end_time.format(TIME_FORMAT).to_string()
    }

    /// Description with iCalendar `\n` escapes expanded
    pub fn description_formatted(&self) -> String {
        self.description.replace("\\n", "\n")
    }
}

fn hour_minute(dt: NaiveDateTime) -> (u32, u32) {
    (dt.hour(), dt.minute())
}

/// Sort events by start hour, start minute, then name.
///
/// Applied to every snapshot before persisting so digests and diffs render
/// in a stable order.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        hour_minute(a.start_time)
            .cmp(&hour_minute(b.start_time))
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Drop seconds and sub-second precision from a civil timestamp.
pub fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}
