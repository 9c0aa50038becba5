use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;
use crate::error::SchedulerError;
use crate::model::CreateTaskParams;
use crate::model::ScheduledTask;
use crate::model::TaskMode;
use crate::model::UpdateTaskFields;

fn random_task_id() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    (0..16)
        .map(|_| HEX[fastrand::usize(0..HEX.len())] as char)
        .collect()
}

/// The process-local task store of `spec.md` §4.8. In-process state only —
/// loss across restart is acceptable per §3.
pub struct Scheduler {
    tasks: Mutex<HashMap<String, ScheduledTask>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Parameter validation at create time, `spec.md` §4.8.
    pub fn create_task(
        &self,
        owner_auth_key: impl Into<String>,
        target_client_id: impl Into<String>,
        command: Value,
        params: CreateTaskParams,
        now_ms: i64,
    ) -> Result<ScheduledTask> {
        let (mode, execute_at, interval_ms) = match params {
            CreateTaskParams::Scheduled { execute_at } => (TaskMode::Scheduled, execute_at, None),
            CreateTaskParams::Countdown { countdown_secs } => {
                if countdown_secs <= 0 {
                    return Err(SchedulerError::InvalidParameter { param: "countdown" });
                }
                (TaskMode::Countdown, now_ms + countdown_secs * 1000, None)
            }
            CreateTaskParams::Recurring { interval_secs, execute_at } => {
                if interval_secs <= 0 {
                    return Err(SchedulerError::InvalidParameter { param: "interval" });
                }
                let interval_ms = interval_secs * 1000;
                let execute_at = execute_at.unwrap_or(now_ms + interval_ms);
                (TaskMode::Recurring, execute_at, Some(interval_ms))
            }
        };

        let task = ScheduledTask {
            id: random_task_id(),
            owner_auth_key: owner_auth_key.into(),
            target_client_id: target_client_id.into(),
            command,
            mode,
            execute_at,
            interval_ms,
            created_at: now_ms,
            last_executed_at: None,
            enabled: true,
        };
        self.tasks.lock().insert(task.id.clone(), task.clone());
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> Result<ScheduledTask> {
        self.tasks
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    pub fn list_tasks_for_auth_key(&self, owner_auth_key: &str) -> Vec<ScheduledTask> {
        self.tasks
            .lock()
            .values()
            .filter(|t| t.owner_auth_key == owner_auth_key)
            .cloned()
            .collect()
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        self.tasks
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    /// Update semantics mirror create: when `mode` changes, the new mode's
    /// required parameter must be supplied (or, for `recurring`, already
    /// present on the task). `countdown` supplied with no `countdown_secs`
    /// leaves `executeAt` unchanged — the decided resolution of `spec.md`
    /// §9's open question on ambiguous caller intent.
    pub fn update_task(&self, id: &str, fields: UpdateTaskFields, now_ms: i64) -> Result<ScheduledTask> {
        let mut tasks = self.tasks.lock();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;

        let effective_mode = fields.new_mode.unwrap_or(task.mode);
        match effective_mode {
            TaskMode::Scheduled => {
                if let Some(execute_at) = fields.execute_at {
                    task.execute_at = execute_at;
                } else if fields.new_mode.is_some() {
                    return Err(SchedulerError::MissingParameter {
                        mode: "scheduled",
                        param: "executeAt",
                    });
                }
                task.interval_ms = None;
            }
            TaskMode::Countdown => {
                if let Some(secs) = fields.countdown_secs {
                    if secs <= 0 {
                        return Err(SchedulerError::InvalidParameter { param: "countdown" });
                    }
                    task.execute_at = now_ms + secs * 1000;
                }
                task.interval_ms = None;
            }
            TaskMode::Recurring => {
                let interval_ms = match fields.interval_secs {
                    Some(secs) => {
                        if secs <= 0 {
                            return Err(SchedulerError::InvalidParameter { param: "interval" });
                        }
                        Some(secs * 1000)
                    }
                    None if task.mode == TaskMode::Recurring => task.interval_ms,
                    None => {
                        return Err(SchedulerError::MissingParameter {
                            mode: "recurring",
                            param: "interval",
                        })
                    }
                };
                task.interval_ms = interval_ms;
                if let Some(execute_at) = fields.execute_at {
                    task.execute_at = execute_at;
                }
            }
        }
        task.mode = effective_mode;

        if let Some(target) = fields.target_client_id {
            task.target_client_id = target;
        }
        if let Some(command) = fields.command {
            task.command = command;
        }
        if let Some(enabled) = fields.enabled {
            task.enabled = enabled;
        }

        Ok(task.clone())
    }

    /// One scan of `spec.md` §4.8's periodic tick: returns the tasks whose
    /// `executeAt <= now_ms` that just fired, mutating/removing them in place
    /// (`recurring` tasks advance, others are removed).
    pub fn take_due_tasks(&self, now_ms: i64) -> Vec<ScheduledTask> {
        let mut tasks = self.tasks.lock();
        let mut due = Vec::new();
        let mut to_remove = Vec::new();

        for (id, task) in tasks.iter_mut() {
            if !task.enabled || task.execute_at > now_ms {
                continue;
            }
            due.push(task.clone());
            match task.mode {
                TaskMode::Recurring => {
                    let interval = task.interval_ms.unwrap_or(0);
                    task.last_executed_at = Some(now_ms);
                    task.execute_at = now_ms + interval;
                }
                TaskMode::Scheduled | TaskMode::Countdown => to_remove.push(id.clone()),
            }
        }
        for id in to_remove {
            tasks.remove(&id);
        }
        due
    }
}
