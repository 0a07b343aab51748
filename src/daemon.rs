//! Foreground watch loop: periodic all-courses syncs for one user plus the
//! session health monitor, until shutdown is requested.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, Result};
use crate::domain::{SyncScope, SyncTask, TaskState};
use crate::session::spawn_health_monitor;

/// Watch configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Sync interval in seconds (default: 3600 = 1 hour)
    pub interval_secs: u64,
    /// Whether to sync immediately on start
    pub sync_on_start: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600, // 1 hour
            sync_on_start: true,
        }
    }
}

impl WatchConfig {
    /// Longest accepted interval, one year.
    pub const MAX_INTERVAL_SECS: u64 = 365 * 86400;

    /// Parse interval string like "1h", "30m", "6h", "1d"
    pub fn parse_interval(s: &str) -> std::result::Result<u64, String> {
        let s = s.trim().to_lowercase();

        let (amount, unit, multiplier) = if let Some(hours) = s.strip_suffix('h') {
            (hours, "hours", 3600)
        } else if let Some(minutes) = s.strip_suffix('m') {
            (minutes, "minutes", 60)
        } else if let Some(days) = s.strip_suffix('d') {
            (days, "days", 86400)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, "seconds", 1)
        } else {
            // Raw seconds
            let secs = s
                .parse::<u64>()
                .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))?;
            return Self::check_interval(Some(secs));
        };

        let amount = amount
            .parse::<u64>()
            .map_err(|_| format!("Invalid {}: {}", unit, amount))?;
        Self::check_interval(amount.checked_mul(multiplier))
    }

    fn check_interval(secs: Option<u64>) -> std::result::Result<u64, String> {
        match secs {
            Some(0) => Err("Interval must be greater than zero".to_string()),
            Some(secs) if secs <= Self::MAX_INTERVAL_SECS => Ok(secs),
            _ => Err(format!(
                "Interval too long, the maximum is {}",
                Self::format_interval(Self::MAX_INTERVAL_SECS)
            )),
        }
    }

    /// Format interval for display
    pub fn format_interval(secs: u64) -> String {
        if secs >= 86400 && secs.is_multiple_of(86400) {
            format!("{}d", secs / 86400)
        } else if secs >= 3600 && secs.is_multiple_of(3600) {
            format!("{}h", secs / 3600)
        } else if secs >= 60 && secs.is_multiple_of(60) {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}

pub struct Watcher {
    ctx: Arc<AppContext>,
    config: WatchConfig,
    user_id: String,
}

impl Watcher {
    pub fn new(ctx: Arc<AppContext>, config: WatchConfig, user_id: &str) -> Self {
        Self {
            ctx,
            config,
            user_id: user_id.to_string(),
        }
    }

    /// Log a message with timestamp
    fn log(&self, msg: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        println!("[{}] {}", timestamp, msg);
    }

    /// Run until `shutdown` fires, then cancel in-flight work and close sessions.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let health = spawn_health_monitor(
            self.ctx.sessions.clone(),
            self.ctx.config.sync.health_check_interval(),
            shutdown.child_token(),
        );

        self.log(&format!(
            "Satchel watching {} (sync interval: {})",
            self.user_id,
            WatchConfig::format_interval(self.config.interval_secs)
        ));

        if self.config.sync_on_start {
            self.run_cycle(&shutdown).await;
        }

        let mut timer = interval(Duration::from_secs(self.config.interval_secs));
        timer.tick().await; // Skip the first immediate tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => self.run_cycle(&shutdown).await,
            };
        }

        self.log("Shutting down...");
        let _ = health.await;
        self.ctx.shutdown().await;
        Ok(())
    }

    /// Run one all-courses sync as a tracked task and report it.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Option<SyncTask> {
        let start = Utc::now();
        let tasks = &self.ctx.tasks;
        let task_id = tasks.start(SyncScope::all_courses(&self.user_id));

        let finished = tokio::select! {
            task = tasks.wait(&task_id) => task,
            _ = shutdown.cancelled() => {
                tasks.cancel(&task_id);
                tasks.wait(&task_id).await
            }
        };
        let task = match finished {
            Ok(task) => task,
            Err(e) => {
                self.log(&format!("Lost track of sync task {}: {}", task_id, e));
                return None;
            }
        };

        let elapsed = Utc::now().signed_duration_since(start);
        let totals = task.totals();
        match task.state {
            TaskState::Failed => self.log(&format!(
                "Sync failed: {}",
                task.error.as_deref().unwrap_or("unknown error")
            )),
            state => self.log(&format!(
                "Sync {}: {} new items, {} errors across {} courses ({:.1}s)",
                state,
                totals.new,
                totals.errors + task.course_errors,
                task.courses_done,
                elapsed.num_milliseconds() as f64 / 1000.0
            )),
        }
        Some(task)
    }
}
