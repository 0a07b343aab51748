use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ContentType;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    pub seen: usize,
    pub new: usize,
    pub errors: usize,
}

impl SyncCounters {
    pub fn errors(errors: usize) -> Self {
        Self {
            errors,
            ..Default::default()
        }
    }
}

impl AddAssign for SyncCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.seen += rhs.seen;
        self.new += rhs.new;
        self.errors += rhs.errors;
    }
}

impl fmt::Display for SyncCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seen={} new={} errors={}", self.seen, self.new, self.errors)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "course_id")]
pub enum SyncTarget {
    Course(String),
    AllCourses,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Fetch details only for items the store has not seen.
    #[default]
    Incremental,
    /// Re-fetch every listed item and overwrite stored rows.
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncScope {
    pub user_id: String,
    pub target: SyncTarget,
    pub mode: SyncMode,
}

impl SyncScope {
    pub fn course(user_id: &str, course_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            target: SyncTarget::Course(course_id.to_string()),
            mode: SyncMode::Incremental,
        }
    }

    pub fn all_courses(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            target: SyncTarget::AllCourses,
            mode: SyncMode::Incremental,
        }
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Snapshot of one tracked synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: String,
    pub scope: SyncScope,
    pub state: TaskState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counters: BTreeMap<ContentType, SyncCounters>,
    pub courses_total: usize,
    pub courses_done: usize,
    /// Courses skipped because their room or menu could not be reached
    pub course_errors: usize,
    pub cancel_requested: bool,
    pub error: Option<String>,
}

impl SyncTask {
    pub fn new(id: String, scope: SyncScope) -> Self {
        Self {
            id,
            scope,
            state: TaskState::Pending,
            started_at: None,
            finished_at: None,
            counters: BTreeMap::new(),
            courses_total: 0,
            courses_done: 0,
            course_errors: 0,
            cancel_requested: false,
            error: None,
        }
    }

    pub fn record(&mut self, content_type: ContentType, counters: SyncCounters) {
        *self.counters.entry(content_type).or_default() += counters;
    }

    pub fn totals(&self) -> SyncCounters {
        let mut total = SyncCounters::default();
        for counters in self.counters.values() {
            total += *counters;
        }
        total
    }
}
