//! Data model for the calendar bot

mod event;
mod settings;
mod state;

pub use event::{Event, sort_events, truncate_to_minute};
pub use settings::Settings;
pub use state::MeetingState;

use serde::{Deserialize, Serialize};

/// CalDAV account credentials for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account login
    pub login: String,
    /// Application token/password
    pub token: String,
}
