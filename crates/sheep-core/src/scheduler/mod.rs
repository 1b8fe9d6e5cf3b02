//! Sleep Scheduler
//!
//! Per-process controller that decides when each agent consolidates.
//! Three trigger paths share one entry point: an idle timer (every ten
//! minutes), a cron timer (every minute against a 5-field expression),
//! and manual triggers. At most one consolidation runs per agent; a
//! trigger that collides with an active run is dropped with a log, never
//! queued.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use cron::Schedule;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;

use crate::consolidation::{PipelineError, RunReport};

/// How often the idle timer fires
const IDLE_CHECK_INTERVAL: StdDuration = StdDuration::from_secs(600);
/// How often the cron timer fires
const CRON_CHECK_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Scheduler error type
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The configured cron expression did not parse
    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },
}

/// Scheduler tunables
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// An agent counts as idle after this much silence
    pub idle_threshold_ms: i64,
    /// Minimum gap between consolidations per agent
    pub min_interval_ms: i64,
    /// Optional 5-field cron expression (minute hour dom month dow)
    pub cron: Option<String>,
    /// Idle timer period (overridable for tests)
    pub idle_check_interval: StdDuration,
    /// Cron timer period (overridable for tests)
    pub cron_check_interval: StdDuration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_threshold_ms: 30 * 60 * 1000,
            min_interval_ms: 60 * 60 * 1000,
            cron: None,
            idle_check_interval: IDLE_CHECK_INTERVAL,
            cron_check_interval: CRON_CHECK_INTERVAL,
        }
    }
}

/// What the scheduler delegates actual consolidation to
#[async_trait]
pub trait SleepRunner: Send + Sync {
    async fn consolidate(&self, agent_id: &str) -> Result<RunReport, PipelineError>;
}

/// Point-in-time view for health reporting
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub active_agents: Vec<String>,
    pub known_agents: usize,
    pub cron: Option<String>,
    pub last_runs: HashMap<String, DateTime<Utc>>,
}

#[derive(Default)]
struct SchedulerState {
    last_run: HashMap<String, DateTime<Utc>>,
    last_activity: HashMap<String, DateTime<Utc>>,
    cron_ran: HashMap<String, NaiveDate>,
}

struct Inner {
    runner: Arc<dyn SleepRunner>,
    config: SchedulerConfig,
    schedule: Option<Schedule>,
    state: Mutex<SchedulerState>,
    active: Mutex<HashSet<String>>,
}

/// The per-process sleep scheduler
#[derive(Clone)]
pub struct SleepScheduler {
    inner: Arc<Inner>,
}

impl SleepScheduler {
    /// Build a scheduler; parses the cron expression up front.
    ///
    /// The 5-field expression gets a constant seconds field prepended so
    /// it fires at second zero of the configured minute.
    pub fn new(runner: Arc<dyn SleepRunner>, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let schedule = match &config.cron {
            Some(expr) => Some(Schedule::from_str(&format!("0 {expr}")).map_err(|e| {
                SchedulerError::InvalidCron {
                    expr: expr.clone(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                runner,
                config,
                schedule,
                state: Mutex::new(SchedulerState::default()),
                active: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Record agent activity; also registers the agent with the timers
    pub fn record_activity(&self, agent_id: &str) {
        if let Ok(mut state) = self.inner.state.lock() {
            state
                .last_activity
                .insert(agent_id.to_string(), Utc::now());
        }
    }

    /// Whether a consolidation is in flight for the agent
    pub fn is_active(&self, agent_id: &str) -> bool {
        self.inner
            .active
            .lock()
            .map(|set| set.contains(agent_id))
            .unwrap_or(false)
    }

    /// Health snapshot
    pub fn status(&self) -> SchedulerStatus {
        let active_agents = self
            .inner
            .active
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        let (known_agents, last_runs) = self
            .inner
            .state
            .lock()
            .map(|s| (s.last_activity.len(), s.last_run.clone()))
            .unwrap_or((0, HashMap::new()));
        SchedulerStatus {
            active_agents,
            known_agents,
            cron: self.inner.config.cron.clone(),
            last_runs,
        }
    }

    /// Manual trigger. Returns `None` when the minimum-interval guard
    /// holds (unless `force`) or another run is already active.
    pub async fn trigger(&self, agent_id: &str, force: bool) -> Option<RunReport> {
        self.trigger_inner(agent_id, force, true).await
    }

    async fn trigger_inner(
        &self,
        agent_id: &str,
        force: bool,
        check_interval: bool,
    ) -> Option<RunReport> {
        if check_interval && !force && !self.interval_elapsed(agent_id) {
            tracing::debug!(agent = %agent_id, "trigger skipped: minimum interval not elapsed");
            return None;
        }

        // Atomic insertion into the active set is the mutual exclusion:
        // a second trigger for the same agent sees the entry and drops.
        {
            let mut active = self.inner.active.lock().ok()?;
            if !active.insert(agent_id.to_string()) {
                tracing::info!(agent = %agent_id, "trigger dropped: consolidation already running");
                return None;
            }
        }

        let result = self.inner.runner.consolidate(agent_id).await;

        if let Ok(mut active) = self.inner.active.lock() {
            active.remove(agent_id);
        }

        match result {
            Ok(report) => {
                if let Ok(mut state) = self.inner.state.lock() {
                    state.last_run.insert(agent_id.to_string(), Utc::now());
                }
                Some(report)
            }
            Err(err) => {
                tracing::warn!(agent = %agent_id, error = %err, "consolidation run failed");
                // A failed run still counts against the interval so a
                // crash loop cannot spin hot.
                if let Ok(mut state) = self.inner.state.lock() {
                    state.last_run.insert(agent_id.to_string(), Utc::now());
                }
                None
            }
        }
    }

    fn interval_elapsed(&self, agent_id: &str) -> bool {
        let Ok(state) = self.inner.state.lock() else {
            return false;
        };
        match state.last_run.get(agent_id) {
            Some(last) => {
                (Utc::now() - *last).num_milliseconds() >= self.inner.config.min_interval_ms
            }
            None => true,
        }
    }

    fn idle_agents(&self) -> Vec<String> {
        let Ok(state) = self.inner.state.lock() else {
            return Vec::new();
        };
        let now = Utc::now();
        state
            .last_activity
            .iter()
            .filter(|(_, last)| {
                (now - **last).num_milliseconds() >= self.inner.config.idle_threshold_ms
            })
            .map(|(agent, _)| agent.clone())
            .collect()
    }

    fn cron_due_agents(&self) -> Vec<String> {
        let Some(schedule) = &self.inner.schedule else {
            return Vec::new();
        };
        let now = Utc::now();
        let Some(minute_mark) = now.with_second(0).and_then(|t| t.with_nanosecond(0)) else {
            return Vec::new();
        };
        if !schedule.includes(minute_mark) {
            return Vec::new();
        }
        let today = now.date_naive();
        let Ok(state) = self.inner.state.lock() else {
            return Vec::new();
        };
        state
            .last_activity
            .keys()
            .filter(|agent| state.cron_ran.get(*agent) != Some(&today))
            .cloned()
            .collect()
    }

    fn mark_cron_ran(&self, agent_id: &str) {
        if let Ok(mut state) = self.inner.state.lock() {
            state
                .cron_ran
                .insert(agent_id.to_string(), Utc::now().date_naive());
        }
    }

    /// Spawn the idle and cron timers; both feed the shared trigger path.
    pub fn spawn_timers(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let idle = self.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(idle.inner.config.idle_check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                for agent in idle.idle_agents() {
                    if idle.is_active(&agent) {
                        continue;
                    }
                    if idle.trigger_inner(&agent, false, true).await.is_some() {
                        tracing::info!(agent = %agent, "idle-triggered consolidation finished");
                    }
                }
            }
        }));

        if self.inner.schedule.is_some() {
            let cron = self.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(cron.inner.config.cron_check_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    for agent in cron.cron_due_agents() {
                        cron.mark_cron_ran(&agent);
                        if cron.trigger_inner(&agent, false, false).await.is_some() {
                            tracing::info!(agent = %agent, "cron-triggered consolidation finished");
                        }
                    }
                }
            }));
        }

        handles
    }
}
