//! Workspace membership service
//!
//! The membership set is the source of truth for which users the scheduler
//! services. The underlying store only offers key-level atomicity, so every
//! mutation is a read-modify-write of the whole set under one lock;
//! concurrent add/delete must never lose each other's writes.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Error, Result};
use crate::store::UserRepo;

/// Membership of connected users, guarded by a single exclusive lock
pub struct Workspace {
    repo: UserRepo,
    lock: Mutex<()>,
}

impl Workspace {
    pub fn new(repo: UserRepo) -> Self {
        Self {
            repo,
            lock: Mutex::new(()),
        }
    }

    /// Add a user to the membership set; idempotent
    pub fn add_user(&self, user_id: &str) -> Result<()> {
        let _guard = self.guard()?;
        let mut user_ids = self.repo.user_ids()?;
        if user_ids.insert(user_id.to_string()) {
            self.repo.save_user_ids(&user_ids)?;
            debug!(user = user_id, "Added user to workspace");
        }
        Ok(())
    }

    /// Remove a user from the membership set and drop all their state
    pub fn delete_user(&self, user_id: &str) -> Result<()> {
        let _guard = self.guard()?;
        let mut user_ids = self.repo.user_ids()?;
        if user_ids.remove(user_id) {
            self.repo.save_user_ids(&user_ids)?;
            debug!(user = user_id, "Removed user from workspace");
        }
        self.repo.delete_user_keys(user_id)
    }

    /// All currently connected users
    pub fn user_ids(&self) -> Result<HashSet<String>> {
        self.repo.user_ids()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| Error::Persistence("workspace lock poisoned".to_string()))
    }
}
