//! Raw event conversion
//!
//! Turns the calendar source's raw events into the core `Event` model:
//! timestamps parsed into the event's timezone, duplicates by UID dropped
//! (first occurrence wins). Any event with a missing or unparsable
//! DTSTART/DTEND/LAST-MODIFIED fails the whole batch: a partial result
//! would make the snapshot diff misreport the skipped events as gone.

use std::collections::HashSet;

use calbot_core::error::{Error, Result};
use calbot_core::{Event, RawEvent};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const FALLBACK_TIMEZONE: &str = "Etc/UTC";

/// Convert a fetched batch of raw events into model events
pub fn raw_events_to_events(raw_events: &[RawEvent]) -> Result<Vec<Event>> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut events = Vec::with_capacity(raw_events.len());

    for raw in raw_events {
        if !seen.insert(raw.uid.as_str()) {
            continue;
        }
        events.push(raw_to_event(raw)?);
    }
    Ok(events)
}

fn raw_to_event(raw: &RawEvent) -> Result<Event> {
    let tz_name = raw.tzid.as_deref().unwrap_or(FALLBACK_TIMEZONE);
    let tz: Tz = tz_name
        .parse()
        .map_err(|_| Error::Parse(format!("Unknown timezone '{tz_name}' for event {}", raw.summary)))?;

    let start_time = parse_civil(raw.dtstart.as_deref(), &tz, "DTSTART", &raw.summary)?;
    let end_time = parse_civil(raw.dtend.as_deref(), &tz, "DTEND", &raw.summary)?;
    let last_modified_time =
        parse_instant(raw.last_modified.as_deref(), &tz, "LAST-MODIFIED", &raw.summary)?;

    Event::new(
        raw.uid.clone(),
        raw.summary.clone(),
        raw.description.clone(),
        raw.url.clone(),
        tz_name,
        start_time,
        end_time,
        last_modified_time,
    )
}

/// Parse an iCalendar date-time value as civil time in `tz`
fn parse_civil(value: Option<&str>, tz: &Tz, field: &str, name: &str) -> Result<NaiveDateTime> {
    let value = value.ok_or_else(|| missing(field, name))?;

    if let Some(utc_value) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc_value, "%Y%m%dT%H%M%S")
            .map_err(|_| unparsable(field, name))?;
        return Ok(naive.and_utc().with_timezone(tz).naive_local());
    }
    if value.contains('T') {
        return NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
            .map_err(|_| unparsable(field, name));
    }
    // Date-only values (all-day events) start at local midnight
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|_| unparsable(field, name))
        .and_then(|d| d.and_hms_opt(0, 0, 0).ok_or_else(|| unparsable(field, name)))
}

/// Parse an iCalendar date-time value as a UTC instant
fn parse_instant(
    value: Option<&str>,
    tz: &Tz,
    field: &str,
    name: &str,
) -> Result<DateTime<Utc>> {
    let value = value.ok_or_else(|| missing(field, name))?;

    if let Some(utc_value) = value.strip_suffix('Z') {
        return NaiveDateTime::parse_from_str(utc_value, "%Y%m%dT%H%M%S")
            .map(|naive| naive.and_utc())
            .map_err(|_| unparsable(field, name));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .map_err(|_| unparsable(field, name))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| unparsable(field, name))
}

fn missing(field: &str, name: &str) -> Error {
    Error::Parse(format!("Missing {field} for event '{name}'"))
}

fn unparsable(field: &str, name: &str) -> Error {
    Error::Parse(format!("Can't parse {field} for event '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(uid: &str, summary: &str) -> RawEvent {
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

    #[test]
    fn test_duplicate_uid_first_wins() {
        let mut second = raw("uid-1", "Second");
        second.dtstart = Some("20240514T120000".to_string());
        second.dtend = Some("20240514T130000".to_string());
        let raws = vec![raw("uid-1", "First"), second, raw("uid-2", "Other")];

        let events = raw_events_to_events(&raws).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "First");
        assert_eq!(events[0].start_time.format("%H:%M").to_string(), "10:00");
    }

    #[test]
    fn test_utc_values_converted_to_event_timezone() {
        let mut r = raw("uid-1", "Call");
        r.dtstart = Some("20240514T070000Z".to_string()); // 10:00 in Moscow
        let events = raw_events_to_events(&[r]).unwrap();
        assert_eq!(events[0].start_time.format("%H:%M").to_string(), "10:00");
    }

    #[test]
    fn test_date_only_value_is_local_midnight() {
        let mut r = raw("uid-1", "All day");
        r.dtstart = Some("20240514".to_string());
        let events = raw_events_to_events(&[r]).unwrap();
        assert_eq!(
            events[0].start_time.format("%H:%M").to_string(),
            "00:00"
        );
    }

    #[test]
    fn test_missing_field_fails_whole_batch() {
        let mut broken = raw("uid-2", "Broken");
        broken.last_modified = None;
        let raws = vec![raw("uid-1", "Fine"), broken];

        let result = raw_events_to_events(&raws);
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_missing_timezone_falls_back_to_utc() {
        let mut r = raw("uid-1", "Floating");
        r.tzid = None;
        let events = raw_events_to_events(&[r]).unwrap();
        assert_eq!(events[0].time_zone, "Etc/UTC");
    }
}
