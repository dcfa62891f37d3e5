//! Per-user meeting state

use serde::{Deserialize, Serialize};

use super::event::Event;

/// The event the reminder evaluator believes the user is currently inside.
///
/// Tracked so consecutive ticks falling inside the same event do not
/// re-issue the status change. Cleared when no event contains "now".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeetingState {
    /// Event currently covering the user, if any
    pub current_event: Option<Event>,
}

impl MeetingState {
    /// True if the recorded event already covers `t`
    pub fn covers(&self, t: chrono::NaiveDateTime) -> bool {
        self.current_event.as_ref().is_some_and(|e| e.contains(t))
    }
}
