//! Per-user notification settings

use chrono::{NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::event::truncate_to_minute;

/// Per-user configuration, overwritten wholesale on every settings
/// submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Send a reminder 10 minutes before an event starts
    pub ten_minutes_notify: bool,
    /// Send a reminder 1 minute before an event starts
    pub one_minutes_notify: bool,
    /// Apply an "in meeting" status while an event is running
    #[serde(default)]
    pub change_status_on_meet: bool,
    /// Selected calendar path on the CalDAV server
    pub calendar: String,
    /// IANA timezone name for the user
    pub time_zone: String,
    /// Time of day for the daily digest; `None` disables it
    pub daily_notify_time: Option<NaiveTime>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ten_minutes_notify: true,
            one_minutes_notify: true,
            change_status_on_meet: false,
            calendar: String::new(),
            time_zone: String::new(),
            daily_notify_time: NaiveTime::from_hms_opt(7, 0, 0),
        }
    }
}

impl Settings {
    /// Resolve the user's timezone, falling back to UTC when the stored
    /// name is empty or unknown.
    pub fn user_timezone(&self) -> Tz {
        self.time_zone.parse().unwrap_or(Tz::UTC)
    }

    /// Current civil time in the user's zone, truncated to the minute
    pub fn user_now(&self) -> NaiveDateTime {
        truncate_to_minute(Utc::now().with_timezone(&self.user_timezone()).naive_local())
    }
}
