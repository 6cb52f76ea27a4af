//! 周期任务调度（beat）
//!
//! 每个 tick 先获取或续期 Broker 上的单例锁，只有持锁者才会入队到期任务。
//! 不持锁的实例同样推进调度时间，接管时不会补发积压的任务。

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::config::SchedulerConfig;
use crate::error::Result;
use crate::jobs::tasks::{CLEANUP_FAILED_TASKS, PROCESS_PENDING_PAPERS, UPDATE_PAPER_METRICS};
use crate::jobs::tracker::TaskDispatcher;

/// 单例锁名称
pub const BEAT_LOCK: &str = "beat:leader";

/// 调度规则（UTC）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Every(Duration),
    DailyAt { hour: u32, minute: u32 },
}

impl Schedule {
    /// `t` 之后的下一次触发时间
    pub fn next_after(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::Every(interval) => {
                let step = ChronoDuration::from_std(interval).unwrap_or_else(|_| ChronoDuration::days(1));
                t + step.max(ChronoDuration::seconds(1))
            }
            Schedule::DailyAt { hour, minute } => {
                let today = t
                    .date_naive()
                    .and_hms_opt(hour, minute, 0)
                    .map(|naive| Utc.from_utc_datetime(&naive));
                match today {
                    Some(candidate) if candidate > t => candidate,
                    Some(candidate) => candidate + ChronoDuration::days(1),
                    None => t + ChronoDuration::days(1),
                }
            }
        }
    }
}

/// 调度条目
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub name: String,
    pub task: String,
    pub schedule: Schedule,
    pub payload: Value,
}

impl ScheduleEntry {
    pub fn new(name: &str, task: &str, schedule: Schedule) -> Self {
        Self {
            name: name.to_string(),
            task: task.to_string(),
            schedule,
            payload: json!({}),
        }
    }
}

/// 默认周期任务
pub fn default_entries() -> Vec<ScheduleEntry> {
    vec![
        ScheduleEntry::new(
            "process-pending-papers",
            PROCESS_PENDING_PAPERS,
            Schedule::Every(Duration::from_secs(300)),
        ),
        ScheduleEntry::new(
            "cleanup-failed-tasks",
            CLEANUP_FAILED_TASKS,
            Schedule::DailyAt { hour: 2, minute: 0 },
        ),
        ScheduleEntry::new(
            "update-paper-metrics",
            UPDATE_PAPER_METRICS,
            Schedule::DailyAt { hour: 3, minute: 0 },
        ),
    ]
}

pub struct Beat {
    entries: Vec<(ScheduleEntry, DateTime<Utc>)>,
    dispatcher: TaskDispatcher,
    config: SchedulerConfig,
    holder: String,
}

impl Beat {
    pub fn new(
        entries: Vec<ScheduleEntry>,
        dispatcher: TaskDispatcher,
        config: SchedulerConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| {
                let next = entry.schedule.next_after(now);
                (entry, next)
            })
            .collect();
        Self {
            entries,
            dispatcher,
            config,
            holder: format!("beat-{}", Uuid::new_v4()),
        }
    }

    /// 下一次触发时间（按条目名称）
    pub fn next_run(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry.name == name)
            .map(|(_, next)| *next)
    }

    /// 处理一个 tick，返回本次入队的任务名称
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let leader = self
            .dispatcher
            .broker()
            .try_acquire_lock(BEAT_LOCK, &self.holder, Duration::from_secs(self.config.lock_ttl))
            .await?;

        let mut due = Vec::new();
        for (entry, next) in self.entries.iter_mut() {
            if *next <= now {
                due.push(entry.clone());
                *next = entry.schedule.next_after(now);
            }
        }
        if !leader {
            if !due.is_empty() {
                debug!(holder = %self.holder, "Not the beat leader, skipping due entries");
            }
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let mut enqueued = Vec::new();
        for entry in due {
            if !seen.insert((entry.task.clone(), entry.payload.to_string())) {
                continue;
            }
            match self.dispatcher.submit(&entry.task, entry.payload.clone()).await {
                Ok(job) => {
                    info!(entry = %entry.name, task = %entry.task, task_id = %job.id, "Scheduled task enqueued");
                    enqueued.push(entry.task);
                }
                Err(e) => warn!(entry = %entry.name, error = %e, "Failed to enqueue scheduled task"),
            }
        }
        Ok(enqueued)
    }

    /// 运行直到收到停机信号，退出时释放单例锁
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms.max(10)));
        info!(holder = %self.holder, entries = self.entries.len(), "Beat scheduler started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        warn!(error = %e, "Beat tick failed");
                    }
                }
            }
        }

        if let Err(e) = self
            .dispatcher
            .broker()
            .release_lock(BEAT_LOCK, &self.holder)
            .await
        {
            warn!(error = %e, "Failed to release beat lock");
        }
        info!("Beat scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::broker::JobBroker;
    use crate::jobs::memory_broker::MemoryBroker;
    use crate::jobs::tracker::TaskTracker;
    use crate::observability::AppMetrics;
    use crate::storage::MemoryStore;
    use rstest::rstest;
    use std::sync::Arc;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn dispatcher(broker: Arc<dyn JobBroker>) -> TaskDispatcher {
        TaskDispatcher::new(
            broker,
            TaskTracker::new(Arc::new(MemoryStore::new())),
            Arc::new(AppMetrics::new().unwrap()),
            3,
        )
    }

    #[rstest]
    #[case("2026-01-01T01:00:00Z", "2026-01-01T02:00:00Z")]
    #[case("2026-01-01T02:00:00Z", "2026-01-02T02:00:00Z")]
    #[case("2026-01-01T23:59:00Z", "2026-01-02T02:00:00Z")]
    fn test_daily_next_after(#[case] now: &str, #[case] expected: &str) {
        let schedule = Schedule::DailyAt { hour: 2, minute: 0 };
        assert_eq!(schedule.next_after(at(now)), at(expected));
    }

    #[test]
    fn test_every_next_after() {
        let schedule = Schedule::Every(Duration::from_secs(300));
        assert_eq!(
            schedule.next_after(at("2026-01-01T00:00:00Z")),
            at("2026-01-01T00:05:00Z")
        );
    }

    #[test]
    fn test_default_entries() {
        let entries = default_entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].task, "process_pending_papers");
        assert_eq!(entries[1].schedule, Schedule::DailyAt { hour: 2, minute: 0 });
        assert_eq!(entries[2].schedule, Schedule::DailyAt { hour: 3, minute: 0 });
    }

    #[tokio::test]
    async fn test_tick_enqueues_due_entries_once() {
        let broker: Arc<dyn JobBroker> = Arc::new(MemoryBroker::new(60));
        let start = at("2026-01-01T00:00:00Z");
        let entries = vec![
            ScheduleEntry::new("a", PROCESS_PENDING_PAPERS, Schedule::Every(Duration::from_secs(60))),
            ScheduleEntry::new("b", PROCESS_PENDING_PAPERS, Schedule::Every(Duration::from_secs(60))),
        ];
        let mut beat = Beat::new(entries, dispatcher(broker.clone()), SchedulerConfig::default(), start);

        assert!(beat.tick(start).await.unwrap().is_empty());
        let fired = beat.tick(at("2026-01-01T00:01:00Z")).await.unwrap();
        assert_eq!(fired, vec![PROCESS_PENDING_PAPERS.to_string()]);
        assert_eq!(beat.next_run("a"), Some(at("2026-01-01T00:02:00Z")));
        assert_eq!(broker.stats("default").await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_only_lock_holder_enqueues() {
        let broker: Arc<dyn JobBroker> = Arc::new(MemoryBroker::new(60));
        let start = at("2026-01-01T00:00:00Z");
        let entry = || vec![ScheduleEntry::new("a", UPDATE_PAPER_METRICS, Schedule::Every(Duration::from_secs(60)))];
        let mut leader = Beat::new(entry(), dispatcher(broker.clone()), SchedulerConfig::default(), start);
        let mut follower = Beat::new(entry(), dispatcher(broker.clone()), SchedulerConfig::default(), start);

        let due = at("2026-01-01T00:01:00Z");
        assert_eq!(leader.tick(due).await.unwrap().len(), 1);
        assert!(follower.tick(due).await.unwrap().is_empty());
        assert_eq!(broker.stats("default").await.unwrap().pending, 1);
    }
}
