use serde_json::Value;

/// `spec.md` §4.8 ScheduledTask.mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    Scheduled,
    Countdown,
    Recurring,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Scheduled => "scheduled",
            TaskMode::Countdown => "countdown",
            TaskMode::Recurring => "recurring",
        }
    }

    pub fn parse(s: &str) -> Option<TaskMode> {
        match s {
            "scheduled" => Some(TaskMode::Scheduled),
            "countdown" => Some(TaskMode::Countdown),
            "recurring" => Some(TaskMode::Recurring),
            _ => None,
        }
    }
}

/// A process-local scheduled command (`spec.md` §3, ScheduledTask; §4.8).
/// Lost across restart — this is in-process state, not Identity Store data.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub id: String,
    pub owner_auth_key: String,
    pub target_client_id: String,
    pub command: Value,
    pub mode: TaskMode,
    pub execute_at: i64,
    pub interval_ms: Option<i64>,
    pub created_at: i64,
    pub last_executed_at: Option<i64>,
    pub enabled: bool,
}

/// The mode-specific parameters accepted at task creation (`spec.md` §4.8,
/// "Parameter validation at create time"). `countdown`/`interval` are taken in
/// seconds, matching the HTTP API; `interval_ms` on [`ScheduledTask`] is
/// always stored in milliseconds.
#[derive(Debug, Clone)]
pub enum CreateTaskParams {
    Scheduled { execute_at: i64 },
    Countdown { countdown_secs: i64 },
    Recurring { interval_secs: i64, execute_at: Option<i64> },
}

/// Fields accepted by `updateTask`. `None` means "leave unchanged"; mode's
/// own parameter fields are interpreted per the mode in effect after this
/// update (`new_mode` if given, else the task's current mode).
#[derive(Debug, Clone, Default)]
pub struct UpdateTaskFields {
    pub target_client_id: Option<String>,
    pub command: Option<Value>,
    pub new_mode: Option<TaskMode>,
    pub execute_at: Option<i64>,
    pub countdown_secs: Option<i64>,
    pub interval_secs: Option<i64>,
    pub enabled: Option<bool>,
}
