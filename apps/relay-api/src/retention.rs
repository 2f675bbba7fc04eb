//! Background retention: message sweeps and the session reaper.
//!
//! Permanent rooms ("1".."10") lose messages past an age threshold once a day
//! at 03:00 local time. Temporary rooms with nobody in them lose all of their
//! messages at the top of every hour. Connection logs are never touched here.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Local, TimeDelta, TimeZone, Timelike};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use utoipa::ToSchema;

use crate::config::Config;
use crate::error::StoreError;
use crate::gateway::directory::{is_permanent_room, PERMANENT_ROOMS};
use crate::gateway::RoomCoordinator;
use crate::store::{now_ms, ChatStore, PurgeScope};

/// Local hour at which the permanent-room sweep runs.
pub const PERMANENT_SWEEP_HOUR: u32 = 3;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Rooms that lost at least one message.
    pub rooms: Vec<String>,
    pub deleted_messages: u64,
    /// Rooms whose purge failed; the sweep carried on without them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_rooms: Vec<String>,
}

impl SweepReport {
    fn record(&mut self, room: &str, purged: Result<u64, StoreError>) {
        match purged {
            Ok(0) => {}
            Ok(deleted) => {
                self.rooms.push(room.to_string());
                self.deleted_messages += deleted;
            }
            Err(err) => {
                tracing::error!(room = %room, error = %err, "failed to purge room messages");
                self.failed_rooms.push(room.to_string());
            }
        }
    }
}

pub struct RetentionScheduler {
    store: Arc<dyn ChatStore>,
    coordinator: Arc<RoomCoordinator>,
    permanent_retention: Duration,
    reaper_interval: Duration,
}

impl RetentionScheduler {
    pub fn new(store: Arc<dyn ChatStore>, coordinator: Arc<RoomCoordinator>, config: &Config) -> Self {
        Self {
            store,
            coordinator,
            permanent_retention: config.permanent_retention,
            reaper_interval: config.reaper_interval,
        }
    }

    pub fn permanent_retention(&self) -> Duration {
        self.permanent_retention
    }

    /// Start the two sweeps and the reaper. Dropping the handles does not stop them; abort them.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let permanent = {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                let first = next_daily_run(&Local::now(), PERMANENT_SWEEP_HOUR);
                tracing::info!(first_run = %first, "permanent-room sweep scheduled");
                let mut interval = time::interval_at(start_at(first), DAY);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    this.sweep_permanent_rooms(this.permanent_retention).await;
                }
            })
        };

        let temporary = {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                let first = next_hourly_run(&Local::now());
                tracing::info!(first_run = %first, "temporary-room sweep scheduled");
                let mut interval = time::interval_at(start_at(first), HOUR);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    if let Err(err) = this.sweep_temporary_rooms().await {
                        tracing::error!(error = %err, "temporary-room sweep failed");
                    }
                }
            })
        };

        let reaper = {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                let period = this.reaper_interval;
                let mut interval = time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    let evicted = this.coordinator.reap_orphans();
                    if evicted > 0 {
                        tracing::info!(evicted, "reaped orphaned sessions");
                    } else {
                        tracing::debug!("reaper found no orphaned sessions");
                    }
                }
            })
        };

        vec![permanent, temporary, reaper]
    }

    /// Delete messages older than `max_age` from every permanent room.
    ///
    /// A room whose purge fails is reported in `failed_rooms`; the rest are
    /// still swept.
    pub async fn sweep_permanent_rooms(&self, max_age: Duration) -> SweepReport {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_ms().saturating_sub(max_age_ms);

        let mut report = SweepReport::default();
        for room in PERMANENT_ROOMS {
            let purged = self
                .store
                .purge_older_than(PurgeScope::Room(room), cutoff)
                .await;
            report.record(room, purged);
        }

        tracing::info!(
            deleted = report.deleted_messages,
            rooms = report.rooms.len(),
            failed = report.failed_rooms.len(),
            cutoff,
            "permanent-room sweep finished"
        );
        report
    }

    /// Delete every message of temporary rooms that currently have no members.
    ///
    /// The active set is a snapshot taken before any delete is issued. A room
    /// that fills up between the snapshot and its delete still gets purged.
    pub async fn sweep_temporary_rooms(&self) -> Result<SweepReport, StoreError> {
        let active: HashSet<String> = self.coordinator.active_rooms().into_iter().collect();
        let stored = self.store.list_rooms_with_message_counts().await?;

        let mut report = SweepReport::default();
        for entry in stored {
            if is_permanent_room(&entry.room) || active.contains(&entry.room) {
                continue;
            }
            let purged = self.store.purge_all_messages(&entry.room).await;
            report.record(&entry.room, purged);
        }

        tracing::info!(
            deleted = report.deleted_messages,
            rooms = report.rooms.len(),
            failed = report.failed_rooms.len(),
            active = active.len(),
            "temporary-room sweep finished"
        );
        Ok(report)
    }
}

/// Next occurrence of `hour`:00 in `now`'s timezone, strictly after `now`.
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    (0..=2)
        .filter_map(|offset| {
            let date = now.date_naive().checked_add_days(Days::new(offset))?;
            let naive = date.and_hms_opt(hour, 0, 0)?;
            tz.from_local_datetime(&naive).earliest()
        })
        .find(|candidate| candidate > now)
        .unwrap_or_else(|| now.clone() + TimeDelta::days(1))
}

/// Next top of the hour strictly after `now`.
pub fn next_hourly_run<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    now.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .map(|top| top + TimeDelta::hours(1))
        .unwrap_or_else(|| now.clone() + TimeDelta::hours(1))
}

fn start_at<Tz: TimeZone>(when: DateTime<Tz>) -> Instant {
    let delay = (when.with_timezone(&chrono::Utc) - chrono::Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO);
    Instant::now() + delay
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{FixedOffset, Utc};

    use super::*;
    use crate::gateway::ConnectionHub;
    use crate::store::{
        ConnectionAction, ConnectionLogEntry, HistoryEntry, MemoryStore, NewChatMessage,
        NewConnectionEvent, RoomMessageCount, Statistics, UserMessage,
    };

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn daily_run_before_and_after_the_hour() {
        assert_eq!(
            next_daily_run(&at(2025, 3, 10, 1, 30, 0), 3),
            at(2025, 3, 10, 3, 0, 0)
        );
        assert_eq!(
            next_daily_run(&at(2025, 3, 10, 3, 0, 0), 3),
            at(2025, 3, 11, 3, 0, 0)
        );
        assert_eq!(
            next_daily_run(&at(2025, 12, 31, 22, 0, 0), 3),
            at(2026, 1, 1, 3, 0, 0)
        );
    }

    #[test]
    fn daily_run_uses_local_wall_clock() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2025, 3, 10, 2, 59, 59).unwrap();
        let next = next_daily_run(&now, 3);
        assert_eq!(next, tz.with_ymd_and_hms(2025, 3, 10, 3, 0, 0).unwrap());
        assert_eq!(next.with_timezone(&Utc), at(2025, 3, 9, 19, 0, 0));
    }

    #[test]
    fn hourly_run_is_next_top_of_hour() {
        assert_eq!(next_hourly_run(&at(2025, 3, 10, 14, 25, 7)), at(2025, 3, 10, 15, 0, 0));
        assert_eq!(next_hourly_run(&at(2025, 3, 10, 14, 0, 0)), at(2025, 3, 10, 15, 0, 0));
        assert_eq!(next_hourly_run(&at(2025, 3, 10, 23, 59, 59)), at(2025, 3, 11, 0, 0, 0));
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        hub: Arc<ConnectionHub>,
        coordinator: Arc<RoomCoordinator>,
        scheduler: RetentionScheduler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(ConnectionHub::new());
        let coordinator = Arc::new(RoomCoordinator::new(store.clone(), hub.clone(), 100));
        let scheduler = RetentionScheduler::new(store.clone(), coordinator.clone(), &Config::default());
        Fixture {
            store,
            hub,
            coordinator,
            scheduler,
        }
    }

    async fn message(store: &MemoryStore, room: &str, timestamp_ms: i64) {
        store
            .record_message(NewChatMessage {
                connection_id: "conn_test",
                username: "alice",
                room,
                text: "hello",
                timestamp_ms,
            })
            .await
            .unwrap();
    }

    async fn room_counts(store: &MemoryStore) -> Vec<(String, i64)> {
        store
            .list_rooms_with_message_counts()
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.room, r.count))
            .collect()
    }

    #[tokio::test]
    async fn temporary_sweep_keeps_active_and_permanent_rooms() {
        let f = fixture();
        let _a = f.hub.register("c1", None);
        let _b = f.hub.register("c2", None);
        f.coordinator.join("c1", "alice", "A").await.unwrap();
        f.coordinator.join("c2", "bob", "B").await.unwrap();

        let now = now_ms();
        for room in ["A", "B", "C", "5"] {
            message(&f.store, room, now).await;
        }

        let report = f.scheduler.sweep_temporary_rooms().await.unwrap();

        assert_eq!(report.rooms, vec!["C"]);
        assert_eq!(report.deleted_messages, 1);
        assert_eq!(
            room_counts(&f.store).await,
            vec![("5".to_string(), 1), ("A".to_string(), 1), ("B".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn permanent_sweep_only_removes_old_messages() {
        let f = fixture();
        let now = now_ms();
        let day_ms = 24 * 60 * 60 * 1000;

        message(&f.store, "5", now - 31 * day_ms).await;
        message(&f.store, "5", now - day_ms).await;
        message(&f.store, "lobby", now - 31 * day_ms).await;
        f.store
            .record_connection_event(NewConnectionEvent {
                connection_id: "conn_test",
                username: "alice",
                room: "5",
                action: ConnectionAction::Join,
                timestamp_ms: now - 31 * day_ms,
                source_address: None,
            })
            .await
            .unwrap();

        let report = f
            .scheduler
            .sweep_permanent_rooms(f.scheduler.permanent_retention())
            .await;

        assert_eq!(report.rooms, vec!["5"]);
        assert_eq!(report.deleted_messages, 1);

        let remaining = f.store.fetch_room_history("5", 100).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp, now - day_ms);
        assert_eq!(f.store.fetch_room_history("lobby", 100).await.unwrap().len(), 1);
        assert_eq!(f.store.fetch_connection_logs("5", 100).await.unwrap().len(), 1);
    }

    /// Memory store whose purges fail for one room.
    struct BrokenRoomStore {
        inner: MemoryStore,
        broken: &'static str,
    }

    impl BrokenRoomStore {
        fn check(&self, room: &str) -> Result<(), StoreError> {
            if room == self.broken {
                Err(StoreError::Failure(format!("cannot purge {room}")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ChatStore for BrokenRoomStore {
        async fn record_connection_event(
            &self,
            event: NewConnectionEvent<'_>,
        ) -> Result<i64, StoreError> {
            self.inner.record_connection_event(event).await
        }

        async fn record_message(&self, message: NewChatMessage<'_>) -> Result<i64, StoreError> {
            self.inner.record_message(message).await
        }

        async fn fetch_room_history(
            &self,
            room: &str,
            limit: i64,
        ) -> Result<Vec<HistoryEntry>, StoreError> {
            self.inner.fetch_room_history(room, limit).await
        }

        async fn fetch_connection_logs(
            &self,
            room: &str,
            limit: i64,
        ) -> Result<Vec<ConnectionLogEntry>, StoreError> {
            self.inner.fetch_connection_logs(room, limit).await
        }

        async fn fetch_user_messages(
            &self,
            username: &str,
            room: &str,
            limit: i64,
        ) -> Result<Vec<UserMessage>, StoreError> {
            self.inner.fetch_user_messages(username, room, limit).await
        }

        async fn fetch_statistics(&self) -> Result<Statistics, StoreError> {
            self.inner.fetch_statistics().await
        }

        async fn purge_older_than(
            &self,
            scope: PurgeScope<'_>,
            cutoff_ms: i64,
        ) -> Result<u64, StoreError> {
            if let PurgeScope::Room(room) = scope {
                self.check(room)?;
            }
            self.inner.purge_older_than(scope, cutoff_ms).await
        }

        async fn purge_all_messages(&self, room: &str) -> Result<u64, StoreError> {
            self.check(room)?;
            self.inner.purge_all_messages(room).await
        }

        async fn list_rooms_with_message_counts(
            &self,
        ) -> Result<Vec<RoomMessageCount>, StoreError> {
            self.inner.list_rooms_with_message_counts().await
        }

        async fn close(&self) {}
    }

    fn broken_room_scheduler(broken: &'static str) -> (Arc<BrokenRoomStore>, RetentionScheduler) {
        let store = Arc::new(BrokenRoomStore {
            inner: MemoryStore::new(),
            broken,
        });
        let hub = Arc::new(ConnectionHub::new());
        let coordinator = Arc::new(RoomCoordinator::new(store.clone(), hub, 100));
        let scheduler = RetentionScheduler::new(store.clone(), coordinator, &Config::default());
        (store, scheduler)
    }

    #[tokio::test]
    async fn permanent_sweep_continues_past_a_failing_room() {
        let (store, scheduler) = broken_room_scheduler("3");
        let old = now_ms() - 31 * 24 * 60 * 60 * 1000;
        for room in ["2", "3", "7"] {
            message(&store.inner, room, old).await;
        }

        let report = scheduler
            .sweep_permanent_rooms(scheduler.permanent_retention())
            .await;

        assert_eq!(report.rooms, vec!["2", "7"]);
        assert_eq!(report.deleted_messages, 2);
        assert_eq!(report.failed_rooms, vec!["3"]);
        assert_eq!(room_counts(&store.inner).await, vec![("3".to_string(), 1)]);
    }

    #[tokio::test]
    async fn temporary_sweep_continues_past_a_failing_room() {
        let (store, scheduler) = broken_room_scheduler("b");
        for room in ["a", "b", "c"] {
            message(&store.inner, room, now_ms()).await;
        }

        let report = scheduler.sweep_temporary_rooms().await.unwrap();

        assert_eq!(report.rooms, vec!["a", "c"]);
        assert_eq!(report.failed_rooms, vec!["b"]);
        assert_eq!(room_counts(&store.inner).await, vec![("b".to_string(), 1)]);
    }
}
