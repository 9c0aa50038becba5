mod error;
mod model;
mod runner;
mod store;

pub use error::Result;
pub use error::SchedulerError;
pub use model::CreateTaskParams;
pub use model::ScheduledTask;
pub use model::TaskMode;
pub use model::UpdateTaskFields;
pub use runner::run;
pub use store::Scheduler;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use broker_engine::LocalRouter;
    use device_cache::DeviceCache;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingRouter {
        published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl LocalRouter for RecordingRouter {
        fn publish_local(&self, topic: &str, payload: &[u8]) {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_vec()));
        }
    }

    #[test]
    fn scheduled_task_requires_no_extra_computation() {
        let scheduler = Scheduler::new();
        let task = scheduler
            .create_task(
                "auth-1",
                "cid-1",
                json!({"op": "noop"}),
                CreateTaskParams::Scheduled { execute_at: 5_000 },
                0,
            )
            .unwrap();
        assert_eq!(task.execute_at, 5_000);
        assert_eq!(task.mode, TaskMode::Scheduled);
    }

    #[test]
    fn countdown_task_computes_execute_at_from_now() {
        let scheduler = Scheduler::new();
        let task = scheduler
            .create_task(
                "auth-1",
                "cid-1",
                json!({}),
                CreateTaskParams::Countdown { countdown_secs: 2 },
                1_000,
            )
            .unwrap();
        assert_eq!(task.execute_at, 3_000);
    }

    #[test]
    fn countdown_task_rejects_non_positive_value() {
        let scheduler = Scheduler::new();
        let result = scheduler.create_task(
            "auth-1",
            "cid-1",
            json!({}),
            CreateTaskParams::Countdown { countdown_secs: 0 },
            1_000,
        );
        assert!(matches!(result, Err(SchedulerError::InvalidParameter { .. })));
    }

    #[test]
    fn recurring_task_defaults_execute_at_and_stores_interval_in_ms() {
        let scheduler = Scheduler::new();
        let task = scheduler
            .create_task(
                "auth-1",
                "cid-1",
                json!({}),
                CreateTaskParams::Recurring {
                    interval_secs: 10,
                    execute_at: None,
                },
                1_000,
            )
            .unwrap();
        assert_eq!(task.interval_ms, Some(10_000));
        assert_eq!(task.execute_at, 11_000);
    }

    #[test]
    fn recurring_task_honors_explicit_execute_at() {
        let scheduler = Scheduler::new();
        let task = scheduler
            .create_task(
                "auth-1",
                "cid-1",
                json!({}),
                CreateTaskParams::Recurring {
                    interval_secs: 10,
                    execute_at: Some(50_000),
                },
                1_000,
            )
            .unwrap();
        assert_eq!(task.execute_at, 50_000);
    }

    #[test]
    fn update_to_countdown_without_value_leaves_execute_at_unchanged() {
        let scheduler = Scheduler::new();
        let task = scheduler
            .create_task(
                "auth-1",
                "cid-1",
                json!({}),
                CreateTaskParams::Scheduled { execute_at: 9_000 },
                0,
            )
            .unwrap();

        let updated = scheduler
            .update_task(
                &task.id,
                UpdateTaskFields {
                    new_mode: Some(TaskMode::Countdown),
                    ..Default::default()
                },
                1_000,
            )
            .unwrap();
        assert_eq!(updated.mode, TaskMode::Countdown);
        assert_eq!(updated.execute_at, 9_000);
    }

    #[test]
    fn update_switching_to_recurring_without_interval_and_no_prior_interval_fails() {
        let scheduler = Scheduler::new();
        let task = scheduler
            .create_task(
                "auth-1",
                "cid-1",
                json!({}),
                CreateTaskParams::Scheduled { execute_at: 9_000 },
                0,
            )
            .unwrap();

        let result = scheduler.update_task(
            &task.id,
            UpdateTaskFields {
                new_mode: Some(TaskMode::Recurring),
                ..Default::default()
            },
            1_000,
        );
        assert!(matches!(result, Err(SchedulerError::MissingParameter { .. })));
    }

    #[test]
    fn update_keeps_existing_interval_when_already_recurring() {
        let scheduler = Scheduler::new();
        let task = scheduler
            .create_task(
                "auth-1",
                "cid-1",
                json!({}),
                CreateTaskParams::Recurring {
                    interval_secs: 5,
                    execute_at: None,
                },
                0,
            )
            .unwrap();

        let updated = scheduler
            .update_task(
                &task.id,
                UpdateTaskFields {
                    command: Some(json!({"op": "ping"})),
                    ..Default::default()
                },
                1_000,
            )
            .unwrap();
        assert_eq!(updated.interval_ms, Some(5_000));
        assert_eq!(updated.command, json!({"op": "ping"}));
    }

    #[test]
    fn listing_is_scoped_to_owner_auth_key() {
        let scheduler = Scheduler::new();
        scheduler
            .create_task("auth-1", "cid-1", json!({}), CreateTaskParams::Scheduled { execute_at: 1 }, 0)
            .unwrap();
        scheduler
            .create_task("auth-2", "cid-2", json!({}), CreateTaskParams::Scheduled { execute_at: 1 }, 0)
            .unwrap();
        assert_eq!(scheduler.list_tasks_for_auth_key("auth-1").len(), 1);
        assert_eq!(scheduler.list_tasks_for_auth_key("auth-2").len(), 1);
        assert_eq!(scheduler.list_tasks_for_auth_key("auth-3").len(), 0);
    }

    #[test]
    fn due_scheduled_task_fires_once_and_is_removed() {
        let scheduler = Scheduler::new();
        let task = scheduler
            .create_task(
                "auth-1",
                "cid-1",
                json!({"op": "noop"}),
                CreateTaskParams::Scheduled { execute_at: 1_000 },
                0,
            )
            .unwrap();

        assert!(scheduler.take_due_tasks(500).is_empty());
        let due = scheduler.take_due_tasks(1_000);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].command, json!({"op": "noop"}));
        assert!(scheduler.get_task(&task.id).is_err());
    }

    #[test]
    fn recurring_task_fires_every_interval_until_disabled() {
        let scheduler = Scheduler::new();
        let task = scheduler
            .create_task(
                "auth-1",
                "cid-1",
                json!({}),
                CreateTaskParams::Recurring {
                    interval_secs: 1,
                    execute_at: Some(1_000),
                },
                0,
            )
            .unwrap();

        assert_eq!(scheduler.take_due_tasks(1_000).len(), 1);
        assert_eq!(scheduler.take_due_tasks(1_500).len(), 0);
        assert_eq!(scheduler.take_due_tasks(2_000).len(), 1);
        assert_eq!(scheduler.get_task(&task.id).unwrap().last_executed_at, Some(2_000));

        scheduler
            .update_task(
                &task.id,
                UpdateTaskFields {
                    enabled: Some(false),
                    ..Default::default()
                },
                2_000,
            )
            .unwrap();
        assert_eq!(scheduler.take_due_tasks(3_000).len(), 0);
    }

    #[tokio::test]
    async fn run_loop_fires_and_delivers_to_http_mode_pending_queue() {
        let scheduler = Arc::new(Scheduler::new());
        let cache = Arc::new(DeviceCache::new(0, 60_000));
        cache.set_device_mode("cid-1", identity_store_mode_http());
        let router: Arc<dyn LocalRouter> = Arc::new(RecordingRouter::default());
        scheduler
            .create_task(
                "auth-1",
                "cid-1",
                json!({"op": "noop"}),
                CreateTaskParams::Scheduled { execute_at: 0 },
                0,
            )
            .unwrap();

        let cancel = tokio_util::sync::CancellationToken::new();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(run(scheduler.clone(), cache.clone(), router, 5, cancel_clone));
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        assert_eq!(cache.get_pending_messages("cid-1", now).len(), 1);
    }

    fn identity_store_mode_http() -> identity_store::DeviceMode {
        identity_store::DeviceMode::Http
    }
}
