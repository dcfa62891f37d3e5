//! Per-user job scheduler
//!
//! Runs the cron-driven ticks for each connected user and tracks job
//! liveness so registration is safe to repeat.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use calbot_core::error::{Error, Result};
use calbot_core::store::UserRepo;
use calbot_core::workspace::Workspace;
use calbot_core::{TickHandler, UserDirectory};
use chrono::Utc;
use cron::Schedule as CronSchedule;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Reminder evaluation runs every minute, on the minute
const REMINDER_CRON: &str = "0 * * * * *";
/// Calendar sync runs every ten minutes
const SYNC_CRON: &str = "0 */10 * * * *";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Reminder,
    Sync,
}

impl JobKind {
    fn cron(self) -> &'static str {
        match self {
            JobKind::Reminder => REMINDER_CRON,
            JobKind::Sync => SYNC_CRON,
        }
    }

    fn label(self) -> &'static str {
        match self {
            JobKind::Reminder => "reminder",
            JobKind::Sync => "sync",
        }
    }
}

/// Schedules the reminder and sync jobs for every connected user
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    repo: UserRepo,
    workspace: Arc<Workspace>,
    directory: Arc<dyn UserDirectory>,
    handler: Arc<dyn TickHandler>,
    /// Liveness registry: job id to its running task
    jobs: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_id: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(
        repo: UserRepo,
        workspace: Arc<Workspace>,
        directory: Arc<dyn UserDirectory>,
        handler: Arc<dyn TickHandler>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(SchedulerInner {
                repo,
                workspace,
                directory,
                handler,
                jobs: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                shutdown_tx,
            }),
        }
    }

    /// Start the reminder and sync jobs for a user.
    ///
    /// Safe to call repeatedly: if both stored jobs are still running this
    /// is a no-op, otherwise any leftovers are replaced by a fresh pair.
    pub async fn register_user(&self, user_id: &str) -> Result<()> {
        if !self.inner.directory.user_exists(user_id).await {
            warn!(user = user_id, "Not scheduling jobs for unknown user");
            return Ok(());
        }

        let (reminder, sync) = self.inner.repo.job_handles(user_id)?;
        if self.inner.is_live(reminder) && self.inner.is_live(sync) {
            debug!(user = user_id, "Jobs already running");
            return Ok(());
        }
        self.inner.abort(reminder);
        self.inner.abort(sync);

        let reminder_id = self.inner.spawn_job(user_id, JobKind::Reminder)?;
        let sync_id = self.inner.spawn_job(user_id, JobKind::Sync)?;
        self.inner.repo.save_reminder_job(user_id, reminder_id)?;
        self.inner.repo.save_sync_job(user_id, sync_id)?;
        info!(
            user = user_id,
            reminder = reminder_id,
            sync = sync_id,
            "Scheduled user jobs"
        );
        Ok(())
    }

    /// Stop a user's jobs and forget their stored handles; idempotent
    pub fn unregister_user(&self, user_id: &str) -> Result<()> {
        let (reminder, sync) = self.inner.repo.job_handles(user_id)?;
        self.inner.abort(reminder);
        self.inner.abort(sync);
        self.inner.repo.delete_job_handles(user_id)?;
        debug!(user = user_id, "Unscheduled user jobs");
        Ok(())
    }

    /// Schedule jobs for every workspace member, discarding job handles
    /// left over from a previous process.
    pub async fn initialize_all(&self) -> Result<()> {
        let user_ids = self.inner.workspace.user_ids()?;
        info!("Scheduling jobs for {} users", user_ids.len());
        for user_id in user_ids {
            self.inner.repo.delete_job_handles(&user_id)?;
            if let Err(e) = self.register_user(&user_id).await {
                error!(user = %user_id, "Could not schedule jobs: {}", e);
            }
        }
        Ok(())
    }

    /// Whether both of the user's stored jobs are currently running
    pub fn jobs_alive(&self, user_id: &str) -> Result<bool> {
        let (reminder, sync) = self.inner.repo.job_handles(user_id)?;
        Ok(self.inner.is_live(reminder) && self.inner.is_live(sync))
    }

    /// Stop every job and wait for the tasks to finish
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(());
        let handles: Vec<JoinHandle<()>> = match self.inner.jobs() {
            Ok(mut jobs) => jobs.drain().map(|(_, handle)| handle).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("Scheduler stopped");
    }
}

impl SchedulerInner {
    fn jobs(&self) -> Result<MutexGuard<'_, HashMap<u64, JoinHandle<()>>>> {
        self.jobs
            .lock()
            .map_err(|_| Error::Schedule("job registry lock poisoned".to_string()))
    }

    fn is_live(&self, job_id: Option<u64>) -> bool {
        let Some(job_id) = job_id else { return false };
        match self.jobs() {
            Ok(jobs) => jobs.get(&job_id).is_some_and(|h| !h.is_finished()),
            Err(_) => false,
        }
    }

    fn abort(&self, job_id: Option<u64>) {
        let Some(job_id) = job_id else { return };
        if let Ok(mut jobs) = self.jobs() {
            if let Some(handle) = jobs.remove(&job_id) {
                handle.abort();
            }
        }
    }

    fn forget(&self, job_id: u64) {
        if let Ok(mut jobs) = self.jobs() {
            jobs.remove(&job_id);
        }
    }

    fn spawn_job(self: &Arc<Self>, user_id: &str, kind: JobKind) -> Result<u64> {
        let schedule = kind
            .cron()
            .parse::<CronSchedule>()
            .map_err(|e| Error::Schedule(e.to_string()))?;
        let job_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        let inner = Arc::downgrade(self);
        let user = user_id.to_string();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(run_job(inner, user, kind, job_id, schedule, shutdown_rx));
        self.jobs()?.insert(job_id, handle);
        Ok(job_id)
    }

    /// One scheduled firing. Returns false when the job should stop.
    async fn tick(&self, user_id: &str, kind: JobKind, job_id: u64) -> bool {
        let stored = match self.repo.job_handles(user_id) {
            Ok((reminder, sync)) => match kind {
                JobKind::Reminder => reminder,
                JobKind::Sync => sync,
            },
            Err(e) => {
                error!(user = user_id, "Could not read job handles: {}", e);
                return true;
            }
        };
        if stored != Some(job_id) {
            // A newer registration replaced this job
            debug!(user = user_id, job = kind.label(), "Job superseded, stopping");
            self.forget(job_id);
            return false;
        }

        if !self.directory.user_exists(user_id).await {
            warn!(
                user = user_id,
                "User no longer exists on the chat host, dropping their data"
            );
            if let Err(e) = self.workspace.delete_user(user_id) {
                error!(user = user_id, "Cleanup failed: {}", e);
            }
            self.forget(job_id);
            return false;
        }

        let result = match kind {
            JobKind::Reminder => self.handler.reminder_tick(user_id).await,
            JobKind::Sync => self.handler.sync_tick(user_id).await,
        };
        if let Err(e) = result {
            // Skip this tick; the next firing is the retry
            warn!(user = user_id, job = kind.label(), "Tick failed: {}", e);
        }
        true
    }
}

async fn run_job(
    inner: Weak<SchedulerInner>,
    user_id: String,
    kind: JobKind,
    job_id: u64,
    schedule: CronSchedule,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!(user = %user_id, job = kind.label(), cron = kind.cron(), "Job started");
    loop {
        let now = Utc::now();
        let next = match schedule.upcoming(Utc).next() {
            Some(t) => t,
            None => {
                warn!(user = %user_id, job = kind.label(), "No upcoming firing time");
                break;
            }
        };
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let Some(inner) = inner.upgrade() else { break };
                if !inner.tick(&user_id, kind, job_id).await {
                    break;
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(user = %user_id, job = kind.label(), "Shutdown requested");
                break;
            }
        }
    }
}
