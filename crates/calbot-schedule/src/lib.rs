//! calbot-schedule: per-user cron jobs
//!
//! Each connected user gets two cron-driven jobs: a per-minute reminder
//! tick and a ten-minute sync tick. The scheduler keeps a liveness
//! registry of running jobs so restarts and re-registrations never leave
//! a user with zero or duplicate jobs.

mod scheduler;

pub use scheduler::Scheduler;
