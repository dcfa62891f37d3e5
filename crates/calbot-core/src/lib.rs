//! calbot-core: Calendar Bot Core Library
//!
//! Shared building blocks for the calendar-notification bot: the event
//! model and its time comparators, per-user settings and state, the
//! key-value persistence contract, typed per-user repositories, workspace
//! membership, and the capability traits the other crates implement.

pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod traits;
pub mod workspace;

pub use config::{CaldavConfig, ChatConfig, Config, StorageConfig};
pub use error::{Error, Result};
pub use model::{Credentials, Event, MeetingState, Settings};
pub use store::{KvStore, SqliteStore, UserRepo};
pub use traits::{CalendarInfo, CalendarSource, Notifier, RawEvent, TickHandler, UserDirectory};
pub use workspace::Workspace;
