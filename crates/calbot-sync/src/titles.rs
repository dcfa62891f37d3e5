//! Notification titles

use chrono::{Datelike, NaiveDate};

pub const ADDED_EVENTS_TITLE: &str = "##### :new: Added events";
pub const UPDATED_EVENTS_TITLE: &str = "##### :arrows_counterclockwise: Updated events";
pub const TEN_MINUTES_EVENT_TITLE: &str = "##### :clock10: 10 minutes until event";
pub const ONE_MINUTE_EVENT_TITLE: &str = "##### :alarm_clock: 1 minute until event";

/// Title for the daily digest, e.g. `##### :calendar: Today - Tuesday, May 14`
pub fn today_events_title(date: NaiveDate) -> String {
    format!(
        "##### :calendar: Today - {}, {} {}",
        date.weekday_name(),
        date.month_name(),
        date.day()
    )
}

trait DateNames {
    fn weekday_name(&self) -> &'static str;
    fn month_name(&self) -> &'static str;
}

impl DateNames for NaiveDate {
    fn weekday_name(&self) -> &'static str {
        match self.weekday() {
            chrono::Weekday::Mon => "Monday",
            chrono::Weekday::Tue => "Tuesday",
            chrono::Weekday::Wed => "Wednesday",
            chrono::Weekday::Thu => "Thursday",
            chrono::Weekday::Fri => "Friday",
            chrono::Weekday::Sat => "Saturday",
            chrono::Weekday::Sun => "Sunday",
        }
    }

    fn month_name(&self) -> &'static str {
        match self.month() {
            1 => "January",
            2 => "February",
            3 => "March",
            4 => "April",
            5 => "May",
            6 => "June",
            7 => "July",
            8 => "August",
            9 => "September",
            10 => "October",
            11 => "November",
            _ => "December",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_today_title() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
        assert_eq!(
            today_events_title(date),
            "##### :calendar: Today - Tuesday, May 14"
        );
    }
}
