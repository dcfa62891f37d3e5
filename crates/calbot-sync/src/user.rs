//! Per-user reminder evaluation and account flows

use std::sync::Arc;

use async_trait::async_trait;
use calbot_core::error::Result;
use calbot_core::model::{MeetingState, Settings};
use calbot_core::store::UserRepo;
use calbot_core::workspace::Workspace;
use calbot_core::{Credentials, Event, Notifier, TickHandler};
use chrono::{Duration, NaiveDateTime, Timelike};
use tracing::{debug, info, warn};

use crate::calendar::CalendarService;
use crate::titles;

const WELCOME_MESSAGE: &str = "#### Welcome to the calendar bot!\n\
Your calendar account is connected. Pick a calendar in the settings to start receiving reminders.";

/// Runs the reminder evaluator on the frequent tick and announces sync
/// deltas on the infrequent one.
pub struct UserService {
    repo: UserRepo,
    workspace: Arc<Workspace>,
    calendar: Arc<CalendarService>,
    notifier: Arc<dyn Notifier>,
}

impl UserService {
    pub fn new(
        repo: UserRepo,
        workspace: Arc<Workspace>,
        calendar: Arc<CalendarService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repo,
            workspace,
            calendar,
            notifier,
        }
    }

    /// Connect a user's calendar account: store credentials, resolve the
    /// calendar home set and greet the user. Failures are reported to the
    /// user as a chat message, never as an error trace.
    pub async fn connect(&self, user_id: &str, credentials: Credentials) -> Result<()> {
        self.repo.save_credentials(user_id, &credentials)?;
        match self.calendar.fetch_calendar_home_set(user_id).await {
            Ok(home_set) => {
                self.repo.save_calendar_home_set(user_id, &home_set)?;
                self.notifier.send_plain(user_id, WELCOME_MESSAGE).await
            }
            Err(e) => {
                warn!(user = user_id, "Could not resolve calendar home set: {}", e);
                self.notifier
                    .send_plain(
                        user_id,
                        &format!("Could not reach your calendar account: {e}"),
                    )
                    .await
            }
        }
    }

    /// Apply a full settings submission: overwrite the stored settings,
    /// seed today's snapshot, enroll the user and send the "Today" digest.
    ///
    /// The caller still owns job registration; the scheduler picks the
    /// user up from the membership set.
    pub async fn apply_settings(&self, user_id: &str, settings: Settings) -> Result<()> {
        self.repo.save_settings(user_id, &settings)?;
        let events = self.calendar.seed(user_id).await?;
        self.workspace.add_user(user_id)?;
        let today = settings.user_now().date();
        self.notifier
            .send_digest(user_id, &titles::today_events_title(today), &events)
            .await
    }

    /// Disconnect a user: remove them from the membership set and delete
    /// every piece of their stored state. Their jobs stop on the next tick
    /// once the stored handles are gone.
    pub fn disconnect(&self, user_id: &str) -> Result<()> {
        self.workspace.delete_user(user_id)?;
        info!(user = user_id, "Disconnected user");
        Ok(())
    }

    /// Frequent tick: evaluate reminders against the stored snapshot.
    /// Reminders never trigger a live fetch.
    pub async fn handle_reminder_tick(&self, user_id: &str) -> Result<()> {
        let settings = self.repo.settings_required(user_id)?;
        let events = self.repo.events(user_id)?;
        let now = settings.user_now();

        self.remind(user_id, now, &settings, &events).await?;
        if settings.change_status_on_meet {
            self.update_meeting_status(user_id, now, &events).await?;
        }
        Ok(())
    }

    /// Infrequent tick: refresh the snapshot and announce what changed
    pub async fn handle_sync_tick(&self, user_id: &str) -> Result<()> {
        let delta = self.calendar.sync(user_id).await?;
        if !delta.added.is_empty() {
            self.notifier
                .send_digest(user_id, titles::ADDED_EVENTS_TITLE, &delta.added)
                .await?;
        }
        if !delta.updated.is_empty() {
            self.notifier
                .send_digest(user_id, titles::UPDATED_EVENTS_TITLE, &delta.updated)
                .await?;
        }
        Ok(())
    }

    async fn remind(
        &self,
        user_id: &str,
        now: NaiveDateTime,
        settings: &Settings,
        events: &[Event],
    ) -> Result<()> {
        if let Some(daily) = settings.daily_notify_time {
            // Exactly one firing minute per day; a missed tick skips the
            // digest rather than catching up.
            if now.hour() == daily.hour() && now.minute() == daily.minute() {
                self.notifier
                    .send_digest(user_id, &titles::today_events_title(now.date()), events)
                    .await?;
            }
        }

        let ten_minutes_later = now + Duration::minutes(10);
        let one_minute_later = now + Duration::minutes(1);
        for event in events {
            if event.starts_after(ten_minutes_later) {
                // Outside the 10-minute lookahead, nothing can fire
                continue;
            }
            if settings.ten_minutes_notify && event.starts_at(ten_minutes_later) {
                self.notifier
                    .send_single(user_id, titles::TEN_MINUTES_EVENT_TITLE, event)
                    .await?;
            }
            if settings.one_minutes_notify && event.starts_at(one_minute_later) {
                self.notifier
                    .send_single(user_id, titles::ONE_MINUTE_EVENT_TITLE, event)
                    .await?;
            }
        }
        Ok(())
    }

    async fn update_meeting_status(
        &self,
        user_id: &str,
        now: NaiveDateTime,
        events: &[Event],
    ) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let state = self.repo.meeting_state(user_id)?;
        if state.covers(now) {
            // Already marked for this meeting; don't re-issue the status
            return Ok(());
        }

        let current = events.iter().find(|e| e.contains(now)).cloned();
        if let Some(event) = &current {
            debug!(user = user_id, event = %event.name, "Entering meeting");
            self.notifier
                .set_meeting_status(user_id, event.end_time)
                .await?;
        }
        self.repo.save_meeting_state(
            user_id,
            &MeetingState {
                current_event: current,
            },
        )
    }
}

#[async_trait]
impl TickHandler for UserService {
    async fn reminder_tick(&self, user_id: &str) -> Result<()> {
        self.handle_reminder_tick(user_id).await
    }

    async fn sync_tick(&self, user_id: &str) -> Result<()> {
        info!(user = user_id, "Running calendar sync");
        self.handle_sync_tick(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockSource, RecordingNotifier, Sent, event, raw_event};
    use calbot_core::error::Error;
    use calbot_core::store::SqliteStore;
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    struct Fixture {
        service: UserService,
        repo: UserRepo,
        workspace: Arc<Workspace>,
        notifier: Arc<RecordingNotifier>,
        source: Arc<MockSource>,
    }

    fn fixture() -> Fixture {
        let repo = UserRepo::new(Arc::new(SqliteStore::in_memory().unwrap()));
        let workspace = Arc::new(Workspace::new(repo.clone()));
        let source = Arc::new(MockSource::new(vec![]));
        let notifier = Arc::new(RecordingNotifier::default());
        let calendar = Arc::new(CalendarService::new(repo.clone(), source.clone()));
        let service = UserService::new(
            repo.clone(),
            workspace.clone(),
            calendar,
            notifier.clone(),
        );
        Fixture {
            service,
            repo,
            workspace,
            notifier,
            source,
        }
    }

    fn settings() -> Settings {
        Settings {
            calendar: "personal".to_string(),
            time_zone: "Europe/Moscow".to_string(),
            ..Default::default()
        }
    }

    /// A zone whose local clock currently reads close to midday, so tests
    /// that build "future" events from the real clock never cross midnight.
    fn midday_zone() -> String {
        let hour = chrono::Timelike::hour(&Utc::now()) as i32;
        let offset = 12 - hour; // UTC+offset puts local time near 12:00
        if offset >= 0 {
            format!("Etc/GMT-{offset}")
        } else {
            format!("Etc/GMT+{}", -offset)
        }
    }

    #[tokio::test]
    async fn test_digest_fires_only_at_configured_minute() {
        let f = fixture();
        let mut s = settings();
        s.daily_notify_time = NaiveTime::from_hms_opt(7, 0, 0);
        let events = vec![event("A", dt(10, 0), dt(11, 0), Utc::now())];

        f.service.remind("u1", dt(6, 59), &s, &events).await.unwrap();
        f.service.remind("u1", dt(7, 1), &s, &events).await.unwrap();
        assert!(f.notifier.sent().is_empty());

        f.service.remind("u1", dt(7, 0), &s, &events).await.unwrap();
        assert_eq!(
            f.notifier.sent(),
            vec![Sent::Digest {
                title: "##### :calendar: Today - Tuesday, May 14".to_string(),
                count: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_digest_disabled_when_unset() {
        let f = fixture();
        let mut s = settings();
        s.daily_notify_time = None;

        f.service.remind("u1", dt(7, 0), &s, &[]).await.unwrap();
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_ten_minute_reminder_fires_exactly_once() {
        let f = fixture();
        let mut s = settings();
        s.daily_notify_time = None;
        let events = vec![event("Standup", dt(10, 0), dt(10, 15), Utc::now())];

        // Adjacent ticks: nothing
        f.service.remind("u1", dt(9, 49), &s, &events).await.unwrap();
        f.service.remind("u1", dt(9, 51), &s, &events).await.unwrap();
        assert!(f.notifier.sent().is_empty());

        // now + 10m == start
        f.service.remind("u1", dt(9, 50), &s, &events).await.unwrap();
        assert_eq!(
            f.notifier.sent(),
            vec![Sent::Single {
                title: titles::TEN_MINUTES_EVENT_TITLE.to_string(),
                event: "Standup".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_one_minute_reminder() {
        let f = fixture();
        let mut s = settings();
        s.daily_notify_time = None;
        let events = vec![event("Standup", dt(10, 0), dt(10, 15), Utc::now())];

        f.service.remind("u1", dt(9, 59), &s, &events).await.unwrap();
        assert_eq!(
            f.notifier.sent(),
            vec![Sent::Single {
                title: titles::ONE_MINUTE_EVENT_TITLE.to_string(),
                event: "Standup".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_reminders_respect_settings_flags() {
        let f = fixture();
        let mut s = settings();
        s.daily_notify_time = None;
        s.ten_minutes_notify = false;
        s.one_minutes_notify = false;
        let events = vec![event("Standup", dt(10, 0), dt(10, 15), Utc::now())];

        f.service.remind("u1", dt(9, 50), &s, &events).await.unwrap();
        f.service.remind("u1", dt(9, 59), &s, &events).await.unwrap();
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reminders_can_fire_for_different_events_in_one_tick() {
        let f = fixture();
        let mut s = settings();
        s.daily_notify_time = None;
        let events = vec![
            event("Later", dt(10, 0), dt(10, 30), Utc::now()),
            event("Soon", dt(9, 51), dt(10, 0), Utc::now()),
        ];

        f.service.remind("u1", dt(9, 50), &s, &events).await.unwrap();
        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.contains(&Sent::Single {
            title: titles::TEN_MINUTES_EVENT_TITLE.to_string(),
            event: "Later".to_string()
        }));
        assert!(sent.contains(&Sent::Single {
            title: titles::ONE_MINUTE_EVENT_TITLE.to_string(),
            event: "Soon".to_string()
        }));
    }

    #[tokio::test]
    async fn test_meeting_status_set_once_for_consecutive_ticks() {
        let f = fixture();
        let events = vec![event("Standup", dt(10, 0), dt(10, 30), Utc::now())];

        f.service
            .update_meeting_status("u1", dt(10, 5), &events)
            .await
            .unwrap();
        f.service
            .update_meeting_status("u1", dt(10, 6), &events)
            .await
            .unwrap();

        assert_eq!(f.notifier.sent(), vec![Sent::Status(dt(10, 30))]);
        let state = f.repo.meeting_state("u1").unwrap();
        assert_eq!(
            state.current_event.as_ref().map(|e| e.name.as_str()),
            Some("Standup")
        );
    }

    #[tokio::test]
    async fn test_meeting_state_cleared_outside_events() {
        let f = fixture();
        let events = vec![event("Standup", dt(10, 0), dt(10, 30), Utc::now())];

        f.service
            .update_meeting_status("u1", dt(10, 5), &events)
            .await
            .unwrap();
        f.service
            .update_meeting_status("u1", dt(10, 31), &events)
            .await
            .unwrap();

        let state = f.repo.meeting_state("u1").unwrap();
        assert!(state.current_event.is_none());
        // Only the one status call from entering the meeting
        assert_eq!(f.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_meetings_first_in_order_wins() {
        let f = fixture();
        let events = vec![
            event("First", dt(10, 0), dt(11, 0), Utc::now()),
            event("Second", dt(10, 15), dt(10, 45), Utc::now()),
        ];

        f.service
            .update_meeting_status("u1", dt(10, 20), &events)
            .await
            .unwrap();
        assert_eq!(f.notifier.sent(), vec![Sent::Status(dt(11, 0))]);
    }

    #[tokio::test]
    async fn test_reminder_tick_fails_without_settings() {
        let f = fixture();
        let result = f.service.handle_reminder_tick("u1").await;
        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[tokio::test]
    async fn test_connect_saves_home_set_and_greets() {
        let f = fixture();
        f.service
            .connect(
                "u1",
                Credentials {
                    login: "alice".to_string(),
                    token: "tok".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            f.repo.calendar_home_set("u1").unwrap().as_deref(),
            Some("/calendars/alice/")
        );
        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], Sent::Plain(text) if text.starts_with("#### Welcome")));
    }

    #[tokio::test]
    async fn test_connect_scenario_first_sync_silent_then_addition_announced() {
        let f = fixture();
        let zone = midday_zone();

        f.service
            .connect(
                "u1",
                Credentials {
                    login: "alice".to_string(),
                    token: "tok".to_string(),
                },
            )
            .await
            .unwrap();

        let s = Settings {
            calendar: "personal".to_string(),
            time_zone: zone.clone(),
            daily_notify_time: None,
            ..Default::default()
        };
        f.service.apply_settings("u1", s.clone()).await.unwrap();
        // Settings application enrolls the user and announces the (empty) day
        assert!(f.workspace.user_ids().unwrap().contains("u1"));
        assert!(f.notifier.sent().iter().any(|s| matches!(s, Sent::Digest { count: 0, .. })));

        // First sync after seeding announces nothing
        f.service.handle_sync_tick("u1").await.unwrap();
        assert_eq!(f.notifier.sent().len(), 2); // welcome + today digest only

        // A future event appears, freshly modified
        let local_now = s.user_now();
        let start = local_now + Duration::minutes(30);
        let mut added = raw_event("uid-new", "Planning");
        added.tzid = Some(zone);
        added.dtstart = Some(start.format("%Y%m%dT%H%M%S").to_string());
        added.dtend = Some((start + Duration::hours(1)).format("%Y%m%dT%H%M%S").to_string());
        // Clearly after the first sync's marker, even at second precision
        let modified = Utc::now() + Duration::minutes(1);
        added.last_modified = Some(modified.format("%Y%m%dT%H%M%SZ").to_string());
        f.source.set_events(vec![added]);

        f.service.handle_sync_tick("u1").await.unwrap();
        let sent = f.notifier.sent();
        assert_eq!(
            sent.last(),
            Some(&Sent::Digest {
                title: titles::ADDED_EVENTS_TITLE.to_string(),
                count: 1
            })
        );
    }

    #[tokio::test]
    async fn test_disconnect_drops_membership_and_state() {
        let f = fixture();
        f.workspace.add_user("u1").unwrap();
        f.repo.save_settings("u1", &settings()).unwrap();
        f.repo.save_reminder_job("u1", 7).unwrap();

        f.service.disconnect("u1").unwrap();
        assert!(!f.workspace.user_ids().unwrap().contains("u1"));
        assert!(f.repo.settings("u1").unwrap().is_none());
        assert_eq!(f.repo.job_handles("u1").unwrap(), (None, None));
    }
}
