//! Scheduler - independent periodic tasks
//!
//! - Trade cycle: fixed interval, skip-if-running
//! - Retrain: daily at a wall-clock time (UTC)
//! - Heartbeat: fixed interval append to the scheduler log
//! - Heartbeat reset: daily truncation of the scheduler log
//!
//! Each task owns its own timer. A tick that arrives while the previous run
//! of the same task is still active is dropped, never queued.

pub mod guard;

pub use guard::{RunningToken, TaskGuard};

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::ScheduleConfig;
use crate::cycle::TradeCycle;
use crate::ml_engine::{Retrainer, TrainedModel};
use crate::notify::{messages, Notifier};
use crate::persistence::HeartbeatLog;

/// Resolved timings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub trade_interval: Duration,
    pub retrain_at: NaiveTime,
    pub heartbeat_interval: Duration,
    pub heartbeat_reset_at: NaiveTime,
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Ok(Self {
            trade_interval: Duration::from_secs(config.trade_interval_secs),
            retrain_at: config.retrain_time()?,
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
            heartbeat_reset_at: config.heartbeat_reset_time()?,
        })
    }
}

/// Next instant strictly after `now` whose UTC time of day is `at`
pub fn next_daily_fire(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Run `job` every `period`, first run one period after start. Runs are
/// spawned so the timer keeps ticking; `guard` drops ticks while a run is live.
pub fn spawn_guarded_interval<F, Fut>(
    name: &'static str,
    period: Duration,
    guard: TaskGuard,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match guard.try_begin() {
                Some(token) => {
                    let run = job();
                    tokio::spawn(async move {
                        let _token = token;
                        run.await;
                    });
                }
                None => warn!(task = name, "Previous run still active, tick dropped"),
            }
        }
    })
}

/// Run `job` once a day at `at` (UTC), to completion before scheduling the next day
pub fn spawn_daily<F, Fut>(name: &'static str, at: NaiveTime, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_daily_fire(now, at);
            info!(task = name, next = %next, "Daily task scheduled");
            tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;
            job().await;
        }
    })
}

/// Result of one retrain attempt
#[derive(Debug)]
pub enum RetrainOutcome {
    Finished(TrainedModel),
    Failed(String),
    AlreadyRunning,
}

/// Retrainer shared by the daily task and the `/retrain` command; at most
/// one retrain runs at a time.
pub struct RetrainJob {
    retrainer: Retrainer,
    guard: TaskGuard,
}

impl RetrainJob {
    pub fn new(retrainer: Retrainer) -> Self {
        Self {
            retrainer,
            guard: TaskGuard::new(),
        }
    }

    pub async fn run(&self) -> RetrainOutcome {
        let Some(_token) = self.guard.try_begin() else {
            warn!("Retrain already in progress");
            return RetrainOutcome::AlreadyRunning;
        };
        match self.retrainer.retrain().await {
            Ok(model) => RetrainOutcome::Finished(model),
            Err(e) => {
                error!(error = %e, "Retrain failed");
                RetrainOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Running scheduler tasks
pub struct SchedulerTasks {
    handles: Vec<JoinHandle<()>>,
    trade_guard: TaskGuard,
}

impl SchedulerTasks {
    /// Stop every timer, then wait out an in-flight trade cycle so a flip
    /// is never cut between its close and its open.
    pub async fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        futures_util::future::join_all(self.handles).await;
        if self.trade_guard.is_running() {
            info!("Waiting for the in-flight trade cycle to finish");
        }
        self.trade_guard.wait_idle().await;
    }
}

pub struct Scheduler {
    schedule: Schedule,
    cycle: Arc<TradeCycle>,
    retrain: Arc<RetrainJob>,
    heartbeat: Arc<HeartbeatLog>,
    notifier: Arc<dyn Notifier>,
}

impl Scheduler {
    pub fn new(
        schedule: Schedule,
        cycle: Arc<TradeCycle>,
        retrain: Arc<RetrainJob>,
        heartbeat: Arc<HeartbeatLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            schedule,
            cycle,
            retrain,
            heartbeat,
            notifier,
        }
    }

    /// Spawn every task
    pub fn spawn(self) -> SchedulerTasks {
        info!(
            trade_interval_secs = self.schedule.trade_interval.as_secs(),
            retrain_at = %self.schedule.retrain_at,
            heartbeat_interval_secs = self.schedule.heartbeat_interval.as_secs(),
            heartbeat_reset_at = %self.schedule.heartbeat_reset_at,
            "Starting scheduler"
        );

        let cycle = self.cycle;
        let trade_guard = TaskGuard::new();
        let trade = spawn_guarded_interval(
            "trade_cycle",
            self.schedule.trade_interval,
            trade_guard.clone(),
            move || {
                let cycle = cycle.clone();
                async move {
                    // failures are already logged and notified by the cycle
                    let _ = cycle.run().await;
                }
            },
        );

        let retrain_job = self.retrain;
        let notifier = self.notifier;
        let retrain = spawn_daily("retrain", self.schedule.retrain_at, move || {
            let job = retrain_job.clone();
            let notifier = notifier.clone();
            async move {
                info!("Running daily retrain");
                match job.run().await {
                    RetrainOutcome::Finished(model) => {
                        notifier.send(&messages::retrained(&model)).await
                    }
                    RetrainOutcome::Failed(e) => {
                        notifier.send(&messages::retrain_failed(&e)).await
                    }
                    RetrainOutcome::AlreadyRunning => {}
                }
            }
        });

        let log = self.heartbeat.clone();
        let heartbeat = spawn_guarded_interval(
            "heartbeat",
            self.schedule.heartbeat_interval,
            TaskGuard::new(),
            move || {
                let log = log.clone();
                async move {
                    if let Err(e) = log.beat(Utc::now()) {
                        warn!(error = %format!("{:#}", e), "Heartbeat write failed");
                    }
                }
            },
        );

        let log = self.heartbeat;
        let reset = spawn_daily("heartbeat_reset", self.schedule.heartbeat_reset_at, move || {
            let log = log.clone();
            async move {
                if let Err(e) = log.truncate() {
                    warn!(error = %format!("{:#}", e), "Scheduler log reset failed");
                }
            }
        });

        SchedulerTasks {
            handles: vec![trade, retrain, heartbeat, reset],
            trade_guard,
        }
    }
}
