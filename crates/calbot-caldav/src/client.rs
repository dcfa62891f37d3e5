//! CalDAV client implementation

use async_trait::async_trait;
use calbot_core::error::{Error, Result};
use calbot_core::{CalendarInfo, CalendarSource, Credentials, RawEvent};
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;
use reqwest::Client;
use tracing::{debug, error, info};

use crate::ics;

const CALDAV_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// CalDAV client for calendar operations.
///
/// Credentials are supplied per call; one client serves every user against
/// the same CalDAV endpoint.
pub struct CaldavClient {
    client: Client,
    base_url: String,
}

impl CaldavClient {
    /// Create a new CalDAV client for the given server URL
    pub fn new(server_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;

        let base_url = server_url.trim_end_matches('/').to_string();
        info!("CalDAV client initialized for: {}", base_url);

        Ok(Self { client, base_url })
    }

    /// Resolve a server-absolute href against the base URL
    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    async fn propfind(
        &self,
        url: &str,
        credentials: &Credentials,
        depth: &str,
        body: &'static str,
    ) -> Result<String> {
        let response = self
            .client
            .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), url)
            .basic_auth(&credentials.login, Some(&credentials.token))
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", depth)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Client(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("PROPFIND failed: {} - {}", status, error_text);
            return Err(Error::Client(format!("PROPFIND failed: {status}")));
        }
        response.text().await.map_err(|e| Error::Client(e.to_string()))
    }

    /// Find the current-user-principal path for the account
    async fn find_principal(&self, credentials: &Credentials) -> Result<String> {
        let body = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:">
    <D:prop>
        <D:current-user-principal/>
    </D:prop>
</D:propfind>"#;

        let url = format!("{}/", self.base_url);
        let text = self.propfind(&url, credentials, "0", body).await?;
        href_inside(&text, b"current-user-principal")?
            .ok_or_else(|| Error::Client("No current-user-principal in response".to_string()))
    }
}

#[async_trait]
impl CalendarSource for CaldavClient {
    async fn find_calendar_home_set(&self, credentials: &Credentials) -> Result<String> {
        let principal = self.find_principal(credentials).await?;
        debug!("Resolved principal: {}", principal);

        let body = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <D:prop>
        <C:calendar-home-set/>
    </D:prop>
</D:propfind>"#;

        let url = self.resolve_url(&principal);
        let text = self.propfind(&url, credentials, "0", body).await?;
        href_inside(&text, b"calendar-home-set")?
            .ok_or_else(|| Error::Client("No calendar-home-set in response".to_string()))
    }

    async fn list_calendars(
        &self,
        home_set: &str,
        credentials: &Credentials,
    ) -> Result<Vec<CalendarInfo>> {
        let body = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:">
    <D:prop>
        <D:displayname/>
        <D:resourcetype/>
    </D:prop>
</D:propfind>"#;

        let url = self.resolve_url(home_set);
        let text = self.propfind(&url, credentials, "1", body).await?;
        let calendars = parse_calendar_list(&text)?;

        info!("Found {} calendars under {}", calendars.len(), home_set);
        Ok(calendars)
    }

    async fn query_events(
        &self,
        calendar_path: &str,
        credentials: &Credentials,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>> {
        let start_str = start.format(CALDAV_TIME_FORMAT).to_string();
        let end_str = end.format(CALDAV_TIME_FORMAT).to_string();

        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <D:prop>
        <D:getetag/>
        <C:calendar-data/>
    </D:prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
                <C:time-range start="{start_str}" end="{end_str}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#
        );

        let url = self.resolve_url(calendar_path);
        debug!("Querying events from: {}", url);

        let response = self
            .client
            .request(reqwest::Method::from_bytes(b"REPORT").unwrap(), &url)
            .basic_auth(&credentials.login, Some(&credentials.token))
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", "1")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Client(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("CalDAV query failed: {} - {}", status, error_text);
            return Err(Error::Client(format!("Calendar query failed: {status}")));
        }

        let text = response.text().await.map_err(|e| Error::Client(e.to_string()))?;
        let events = parse_query_response(&text)?;

        info!("Fetched {} raw events", events.len());
        Ok(events)
    }
}

/// Extract the href nested inside the first element with the given local
/// name
fn href_inside(response: &str, element: &[u8]) -> Result<Option<String>> {
    let mut reader = Reader::from_str(response);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut depth_inside = 0usize;
    let mut in_href = false;
    let mut href = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(ref e)) if e.local_name().as_ref() == element => {
                depth_inside += 1;
            }
            Ok(XmlEvent::End(ref e)) if e.local_name().as_ref() == element => {
                depth_inside = depth_inside.saturating_sub(1);
            }
            Ok(XmlEvent::Start(ref e))
                if depth_inside > 0 && e.local_name().as_ref() == b"href" =>
            {
                in_href = true;
                href.clear();
            }
            Ok(XmlEvent::End(ref e)) if e.local_name().as_ref() == b"href" && in_href => {
                return Ok(Some(href.trim().to_string()));
            }
            Ok(XmlEvent::Text(ref e)) if in_href => {
                href.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(Error::Client(format!("XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(None)
}

/// Parse a PROPFIND multistatus into the calendars it describes
fn parse_calendar_list(response: &str) -> Result<Vec<CalendarInfo>> {
    let mut calendars = Vec::new();
    let mut reader = Reader::from_str(response);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut in_href = false;
    let mut in_displayname = false;
    let mut href = String::new();
    let mut displayname = String::new();
    let mut is_calendar = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(ref e)) => match e.local_name().as_ref() {
                b"response" => {
                    href.clear();
                    displayname.clear();
                    is_calendar = false;
                }
                b"href" => in_href = true,
                b"displayname" => in_displayname = true,
                b"calendar" => is_calendar = true,
                _ => {}
            },
            Ok(XmlEvent::Empty(ref e)) if e.local_name().as_ref() == b"calendar" => {
                is_calendar = true;
            }
            Ok(XmlEvent::End(ref e)) => match e.local_name().as_ref() {
                b"href" => in_href = false,
                b"displayname" => in_displayname = false,
                b"response" => {
                    if is_calendar && !href.is_empty() {
                        let name = if displayname.is_empty() {
                            last_path_segment(&href)
                        } else {
                            displayname.clone()
                        };
                        calendars.push(CalendarInfo {
                            name,
                            path: href.trim().to_string(),
                        });
                    }
                }
                _ => {}
            },
            Ok(XmlEvent::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                if in_href {
                    href.push_str(&text);
                } else if in_displayname {
                    displayname.push_str(&text);
                }
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(Error::Client(format!("XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(calendars)
}

/// Parse a REPORT multistatus, collecting raw events from every
/// calendar-data payload. The batch timezone (first VTIMEZONE seen) fills
/// in events that carry no TZID of their own.
fn parse_query_response(response: &str) -> Result<Vec<RawEvent>> {
    let mut events = Vec::new();
    let mut batch_tzid: Option<String> = None;

    let mut reader = Reader::from_str(response);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut in_calendar_data = false;
    let mut calendar_data = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(ref e)) if e.local_name().as_ref() == b"calendar-data" => {
                in_calendar_data = true;
                calendar_data.clear();
            }
            Ok(XmlEvent::End(ref e)) if e.local_name().as_ref() == b"calendar-data" => {
                in_calendar_data = false;
                let parsed = ics::parse_calendar_data(&calendar_data);
                if batch_tzid.is_none() {
                    batch_tzid = parsed.tzid;
                }
                events.extend(parsed.events);
            }
            Ok(XmlEvent::Text(ref e)) if in_calendar_data => {
                calendar_data.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(Error::Client(format!("XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    if let Some(tzid) = batch_tzid {
        for event in &mut events {
            if event.tzid.is_none() {
                event.tzid = Some(tzid.clone());
            }
        }
    }
    Ok(events)
}

fn last_path_segment(href: &str) -> String {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(href)
        .to_string()
}
