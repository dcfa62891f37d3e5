//! Line-oriented iCalendar parsing
//!
//! Extracts VEVENT properties and the VTIMEZONE identifier from the
//! calendar-data payloads returned by REPORT queries. Values are kept in
//! their text form; interpreting them is the sync engine's job.

use calbot_core::RawEvent;

/// Result of parsing one calendar-data payload
#[derive(Debug, Default)]
pub struct ParsedCalendarData {
    pub events: Vec<RawEvent>,
    /// TZID of the first VTIMEZONE component, when present
    pub tzid: Option<String>,
}

/// Parse one iCalendar payload into raw events
pub fn parse_calendar_data(ical: &str) -> ParsedCalendarData {
    let mut parsed = ParsedCalendarData::default();
    let mut current: Option<RawEvent> = None;
    let mut in_timezone = false;

    for line in unfold_lines(ical) {
        let line = line.trim_end();
        match line {
            "BEGIN:VEVENT" => current = Some(RawEvent::default()),
            "END:VEVENT" => {
                if let Some(event) = current.take() {
                    parsed.events.push(event);
                }
            }
            "BEGIN:VTIMEZONE" => in_timezone = true,
            "END:VTIMEZONE" => in_timezone = false,
            _ => {
                let Some((name, params, value)) = split_property(line) else {
                    continue;
                };
                if in_timezone {
                    if name == "TZID" && parsed.tzid.is_none() {
                        parsed.tzid = Some(value.to_string());
                    }
                    continue;
                }
                let Some(event) = current.as_mut() else {
                    continue;
                };
                match name {
                    "UID" => event.uid = value.to_string(),
                    "SUMMARY" => event.summary = value.to_string(),
                    "DESCRIPTION" => event.description = value.to_string(),
                    "URL" => event.url = value.to_string(),
                    "DTSTART" => {
                        event.dtstart = Some(value.to_string());
                        if event.tzid.is_none() {
                            event.tzid = tzid_param(&params);
                        }
                    }
                    "DTEND" => {
                        event.dtend = Some(value.to_string());
                        if event.tzid.is_none() {
                            event.tzid = tzid_param(&params);
                        }
                    }
                    "LAST-MODIFIED" => event.last_modified = Some(value.to_string()),
                    _ => {}
                }
            }
        }
    }
    parsed
}

/// Join folded continuation lines (RFC 5545 §3.1)
fn unfold_lines(ical: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in ical.lines() {
        if (raw.starts_with(' ') || raw.starts_with('\t')) && !lines.is_empty() {
            let tail = &raw[1..];
            if let Some(last) = lines.last_mut() {
                last.push_str(tail);
            }
        } else {
            lines.push(raw.to_string());
        }
    }
    lines
}

/// Split `NAME;PARAM=V;PARAM=V:value` into its parts
fn split_property(line: &str) -> Option<(&str, Vec<&str>, &str)> {
    let (head, value) = line.split_once(':')?;
    let mut parts = head.split(';');
    let name = parts.next()?;
    Some((name, parts.collect(), value))
}

fn tzid_param(params: &[&str]) -> Option<String> {
    params
        .iter()
        .find_map(|p| p.strip_prefix("TZID="))
        .map(|tz| tz.trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VTIMEZONE\r\n\
TZID:Europe/Moscow\r\n\
END:VTIMEZONE\r\n\
BEGIN:VEVENT\r\n\
UID:uid-1\r\n\
SUMMARY:Weekly sync\r\n\
DESCRIPTION:Agenda\\nNotes\r\n\
URL:https://calendar.example.com/event/1\r\n\
DTSTART;TZID=Europe/Moscow:20240514T100000\r\n\
DTEND;TZID=Europe/Moscow:20240514T110000\r\n\
LAST-MODIFIED:20240513T070000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_parse_event_properties() {
        let parsed = parse_calendar_data(SAMPLE);
        assert_eq!(parsed.tzid.as_deref(), Some("Europe/Moscow"));
        assert_eq!(parsed.events.len(), 1);

        let event = &parsed.events[0];
        assert_eq!(event.uid, "uid-1");
        assert_eq!(event.summary, "Weekly sync");
        assert_eq!(event.dtstart.as_deref(), Some("20240514T100000"));
        assert_eq!(event.dtend.as_deref(), Some("20240514T110000"));
        assert_eq!(event.last_modified.as_deref(), Some("20240513T070000Z"));
        assert_eq!(event.tzid.as_deref(), Some("Europe/Moscow"));
    }

    #[test]
    fn test_timezone_properties_do_not_leak_into_events() {
        // The VTIMEZONE block carries DTSTART lines of its own
        let ical = "BEGIN:VCALENDAR\r\n\
BEGIN:VTIMEZONE\r\n\
TZID:Europe/Berlin\r\n\
BEGIN:STANDARD\r\n\
DTSTART:19701025T030000\r\n\
END:STANDARD\r\n\
END:VTIMEZONE\r\n\
BEGIN:VEVENT\r\n\
UID:uid-2\r\n\
SUMMARY:Call\r\n\
DTSTART:20240514T100000Z\r\n\
DTEND:20240514T103000Z\r\n\
LAST-MODIFIED:20240513T070000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        let parsed = parse_calendar_data(ical);
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].dtstart.as_deref(), Some("20240514T100000Z"));
    }

    #[test]
    fn test_unfolds_continuation_lines() {
        let ical = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:uid-3\r\n\
SUMMARY:A meeting with a very\r\n\
\x20\x20long title\r\n\
DTSTART:20240514T100000Z\r\n\
DTEND:20240514T110000Z\r\n\
LAST-MODIFIED:20240513T070000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        let parsed = parse_calendar_data(ical);
        assert_eq!(parsed.events[0].summary, "A meeting with a very long title");
    }
}
