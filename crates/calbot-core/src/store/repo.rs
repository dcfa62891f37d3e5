//! Typed repositories over the key-value store
//!
//! Every per-user blob lives under `userId + suffix`; the workspace
//! membership set lives under one well-known key.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::{Credentials, Event, MeetingState, Settings};
use crate::store::KvStore;

const CREDENTIALS_KEY: &str = ".credentials";
const HOME_SET_KEY: &str = ".calendarHomeSet";
const EVENTS_KEY: &str = ".events";
const LAST_UPDATE_KEY: &str = ".lastUpdate";
const SETTINGS_KEY: &str = ".settings";
const STATE_KEY: &str = ".state";
const REMINDER_JOB_KEY: &str = ".reminderJobId";
const SYNC_JOB_KEY: &str = ".syncJobId";
const USERS_KEY: &str = "users";

/// Typed accessors for per-user persisted state
#[derive(Clone)]
pub struct UserRepo {
    store: Arc<dyn KvStore>,
}

impl UserRepo {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn credentials(&self, user_id: &str) -> Result<Option<Credentials>> {
        self.get_json(&format!("{user_id}{CREDENTIALS_KEY}"))
    }

    pub fn save_credentials(&self, user_id: &str, credentials: &Credentials) -> Result<()> {
        self.set_json(&format!("{user_id}{CREDENTIALS_KEY}"), credentials)
    }

    pub fn calendar_home_set(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .get(&format!("{user_id}{HOME_SET_KEY}"))?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn save_calendar_home_set(&self, user_id: &str, home_set: &str) -> Result<()> {
        self.store
            .set(&format!("{user_id}{HOME_SET_KEY}"), home_set.as_bytes())
    }

    /// The snapshot from the last successful sync; empty if never synced
    pub fn events(&self, user_id: &str) -> Result<Vec<Event>> {
        Ok(self
            .get_json::<Vec<Event>>(&format!("{user_id}{EVENTS_KEY}"))?
            .unwrap_or_default())
    }

    /// Replace the snapshot as a whole set
    pub fn save_events(&self, user_id: &str, events: &[Event]) -> Result<()> {
        self.set_json(&format!("{user_id}{EVENTS_KEY}"), &events)
    }

    pub fn last_update(&self, user_id: &str) -> Result<Option<DateTime<Utc>>> {
        let key = format!("{user_id}{LAST_UPDATE_KEY}");
        let Some(bytes) = self.store.get(&key)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();
        match DateTime::parse_from_rfc3339(&text) {
            Ok(dt) => Ok(Some(dt.with_timezone(&Utc))),
            Err(e) => {
                warn!(user = user_id, "Unparsable lastUpdate in storage: {}", e);
                Ok(None)
            }
        }
    }

    pub fn save_last_update(&self, user_id: &str, last_update: DateTime<Utc>) -> Result<()> {
        self.store.set(
            &format!("{user_id}{LAST_UPDATE_KEY}"),
            last_update.to_rfc3339().as_bytes(),
        )
    }

    pub fn settings(&self, user_id: &str) -> Result<Option<Settings>> {
        self.get_json(&format!("{user_id}{SETTINGS_KEY}"))
    }

    /// Settings required; missing settings mean the user never finished setup
    pub fn settings_required(&self, user_id: &str) -> Result<Settings> {
        self.settings(user_id)?
            .ok_or_else(|| Error::Persistence(format!("No settings stored for user {user_id}")))
    }

    pub fn save_settings(&self, user_id: &str, settings: &Settings) -> Result<()> {
        self.set_json(&format!("{user_id}{SETTINGS_KEY}"), settings)
    }

    pub fn meeting_state(&self, user_id: &str) -> Result<MeetingState> {
        Ok(self
            .get_json::<MeetingState>(&format!("{user_id}{STATE_KEY}"))?
            .unwrap_or_default())
    }

    pub fn save_meeting_state(&self, user_id: &str, state: &MeetingState) -> Result<()> {
        self.set_json(&format!("{user_id}{STATE_KEY}"), state)
    }

    /// Persisted job handle ids: (reminder job, sync job).
    ///
    /// Handles are only meaningful to the scheduler instance that created
    /// them; callers must re-validate them against the live job registry.
    pub fn job_handles(&self, user_id: &str) -> Result<(Option<u64>, Option<u64>)> {
        Ok((
            self.get_job_id(&format!("{user_id}{REMINDER_JOB_KEY}"))?,
            self.get_job_id(&format!("{user_id}{SYNC_JOB_KEY}"))?,
        ))
    }

    pub fn save_reminder_job(&self, user_id: &str, job_id: u64) -> Result<()> {
        self.store.set(
            &format!("{user_id}{REMINDER_JOB_KEY}"),
            job_id.to_string().as_bytes(),
        )
    }

    pub fn save_sync_job(&self, user_id: &str, job_id: u64) -> Result<()> {
        self.store.set(
            &format!("{user_id}{SYNC_JOB_KEY}"),
            job_id.to_string().as_bytes(),
        )
    }

    pub fn delete_job_handles(&self, user_id: &str) -> Result<()> {
        self.store.delete(&format!("{user_id}{REMINDER_JOB_KEY}"))?;
        self.store.delete(&format!("{user_id}{SYNC_JOB_KEY}"))
    }

    /// Remove every key belonging to this user
    pub fn delete_user_keys(&self, user_id: &str) -> Result<()> {
        for suffix in [
            CREDENTIALS_KEY,
            HOME_SET_KEY,
            EVENTS_KEY,
            LAST_UPDATE_KEY,
            SETTINGS_KEY,
            STATE_KEY,
            REMINDER_JOB_KEY,
            SYNC_JOB_KEY,
        ] {
            self.store.delete(&format!("{user_id}{suffix}"))?;
        }
        Ok(())
    }

    /// The workspace membership set
    pub fn user_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .get_json::<HashSet<String>>(USERS_KEY)?
            .unwrap_or_default())
    }

    pub fn save_user_ids(&self, user_ids: &HashSet<String>) -> Result<()> {
        self.set_json(USERS_KEY, user_ids)
    }

    fn get_job_id(&self, key: &str) -> Result<Option<u64>> {
        let Some(bytes) = self.store.get(key)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();
        match text.parse::<u64>() {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                warn!("Unparsable job id in storage under {}", key);
                Ok(None)
            }
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.store.get(key)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set(key, &bytes)
    }
}
