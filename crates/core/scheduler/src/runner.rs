use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use broker_engine::LocalRouter;
use device_cache::DeviceCache;
use tokio_util::sync::CancellationToken;
use topic_grammar::device_recv_topic;
use topic_grammar::ForwardMessage;
use tracing::warn;

use crate::store::Scheduler;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Drive the fan-out step of one tick: §4.8 steps 1–2, the synthetic-sender
/// dispatch shared by every fired task.
fn fire(cache: &DeviceCache, router: &dyn LocalRouter, target_client_id: &str, command: serde_json::Value, now_ms: i64) {
    let fm = ForwardMessage::from_device("__scheduler__", command);
    if cache.is_http_mode(target_client_id) {
        cache.add_pending_message(target_client_id, fm, now_ms);
        return;
    }
    match serde_json::to_vec(&fm) {
        Ok(payload) => router.publish_local(&device_recv_topic(target_client_id), &payload),
        Err(e) => warn!(target_client_id, error = %e, "failed to encode scheduler forward message"),
    }
}

/// Runs the scheduler's periodic tick until `cancel` fires, per `spec.md`
/// §4.8's `schedulerTickMs` cadence (default 1000 ms) and §5's graceful
/// shutdown ordering (Scheduler stops before the MQTT engine drains).
pub async fn run(
    scheduler: Arc<Scheduler>,
    cache: Arc<DeviceCache>,
    router: Arc<dyn LocalRouter>,
    tick_ms: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let now = now_ms();
                for task in scheduler.take_due_tasks(now) {
                    fire(&cache, router.as_ref(), &task.target_client_id, task.command, now);
                }
            }
        }
    }
}
