//! calbot-caldav: CalDAV access for the calendar bot
//!
//! Implements the `CalendarSource` capability: principal/home-set
//! discovery, calendar listing, and time-range event queries against a
//! CalDAV server.

mod client;
mod ics;

pub use client::CaldavClient;
