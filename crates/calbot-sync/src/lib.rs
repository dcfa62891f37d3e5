//! calbot-sync: calendar synchronization and reminder evaluation
//!
//! The sync engine fetches a user's events for the current day, diffs them
//! against the stored snapshot and persists the fresh set; the reminder
//! evaluator turns the snapshot into daily digests, pre-event warnings and
//! the "in meeting" status.

mod calendar;
mod convert;
#[cfg(test)]
mod testutil;
pub mod titles;
mod user;

pub use calendar::{CalendarService, SyncDelta};
pub use user::UserService;
