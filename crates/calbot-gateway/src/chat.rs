//! Chat host API client
//!
//! Delivers notifications as direct messages and answers the user-liveness
//! checks the scheduler relies on.

use async_trait::async_trait;
use calbot_core::config::ChatConfig;
use calbot_core::error::{Error, Result};
use calbot_core::{Event, Notifier, UserDirectory};
use chrono::NaiveDateTime;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, warn};

/// Chat host API client
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    bot_token: String,
    base_url: String,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Notify(e.to_string()))?;

        Ok(Self {
            client,
            bot_token: config.bot_token.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn add_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.bot_token)
    }

    /// Post a direct message to the user
    async fn post_message(&self, user_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/messages", self.base_url);
        debug!(user = user_id, "Posting message");

        let body = serde_json::json!({
            "user_id": user_id,
            "message": text,
        });
        let response = self
            .add_auth(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(user = user_id, "Post message failed: {} - {}", status, error_text);
            return Err(Error::Notify(format!("{status}: {error_text}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for ChatClient {
    async fn send_digest(&self, user_id: &str, title: &str, events: &[Event]) -> Result<()> {
        self.post_message(user_id, &format_digest(title, events)).await
    }

    async fn send_single(&self, user_id: &str, title: &str, event: &Event) -> Result<()> {
        let text = format!("{}\n{}", title, format_event_line(event));
        self.post_message(user_id, &text).await
    }

    async fn send_plain(&self, user_id: &str, text: &str) -> Result<()> {
        self.post_message(user_id, text).await
    }

    async fn set_meeting_status(&self, user_id: &str, until: NaiveDateTime) -> Result<()> {
        let url = format!("{}/users/{}/status", self.base_url, user_id);
        debug!(user = user_id, until = %until, "Setting meeting status");

        let body = serde_json::json!({
            "status": "dnd",
            "text": "In a meeting",
            "until": until.format("%Y-%m-%dT%H:%M:%S").to_string(),
        });
        let response = self
            .add_auth(self.client.put(&url).json(&body))
            .send()
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Notify(format!(
                "Status update failed: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for ChatClient {
    async fn user_exists(&self, user_id: &str) -> bool {
        let url = format!("{}/users/{}", self.base_url, user_id);
        match self.add_auth(self.client.get(&url)).send().await {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => false,
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                // Transient server trouble must not get the user deleted
                warn!(user = user_id, "User lookup returned {}", response.status());
                true
            }
            Err(e) => {
                warn!(user = user_id, "User lookup failed: {}", e);
                true
            }
        }
    }
}

/// Render a titled event rollup, one line per event
fn format_digest(title: &str, events: &[Event]) -> String {
    let mut text = title.to_string();
    if events.is_empty() {
        text.push_str("\nNo events");
        return text;
    }
    for event in events {
        text.push('\n');
        text.push_str(&format_event_line(event));
    }
    text
}

/// `HH:MM - HH:MM [Name](url)` plus the description when present
fn format_event_line(event: &Event) -> String {
    let link = if event.url.is_empty() {
        event.name.clone()
    } else {
        format!("[{}]({})", event.name, event.url)
    };
    let mut line = format!(
        "{} - {} {}",
        event.start_time_formatted(),
        event.end_time_formatted(),
        link
    );
    if !event.description.is_empty() {
        line.push('\n');
        line.push_str(&event.description_formatted());
    }
    line
}
