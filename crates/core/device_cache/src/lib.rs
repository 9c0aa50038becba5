//! The in-memory projection fusing connection state, group membership, publish
//! rate accounting and HTTP-mode pending-message queues.
//!
//! Backed entirely by `parking_lot::RwLock`-guarded maps rather than
//! `tokio::sync` locks: every operation here is a short, non-suspending,
//! in-memory mutation.

mod cache;
mod entries;
mod handle;

pub use cache::DeviceCache;
pub use entries::RemoteSharedDeviceEntry;
pub use handle::SessionHandle;

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use identity_store::Device;
    use identity_store::DeviceMode;
    use topic_grammar::ForwardMessage;

    use super::*;

    struct FakeHandle {
        closed: Arc<AtomicBool>,
    }

    impl SessionHandle for FakeHandle {
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn device(id: i64, uuid: &str) -> Device {
        Device {
            id,
            uuid: uuid.to_string(),
            auth_key: format!("auth-{uuid}"),
            client_id: None,
            username: None,
            password: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn publish_rate_enforces_minimum_spacing() {
        let cache = DeviceCache::new(1000, 120_000);
        assert!(cache.check_publish_rate("c1", 0));
        assert!(!cache.check_publish_rate("c1", 500));
        assert!(cache.check_publish_rate("c1", 1000));
    }

    #[test]
    fn unknown_client_defaults_to_mqtt_mode() {
        let cache = DeviceCache::new(1000, 120_000);
        assert!(!cache.is_http_mode("ghost"));
        cache.set_device_mode("c1", DeviceMode::Http);
        assert!(cache.is_http_mode("c1"));
    }

    #[test]
    fn pending_messages_drain_in_order_and_then_empty() {
        let cache = DeviceCache::new(1000, 120_000);
        cache.add_pending_message(
            "c1",
            ForwardMessage::from_device("c2", serde_json::json!({"n": 1})),
            0,
        );
        cache.add_pending_message(
            "c1",
            ForwardMessage::from_device("c2", serde_json::json!({"n": 2})),
            10,
        );

        let drained = cache.get_pending_messages("c1", 20);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].data, serde_json::json!({"n": 1}));
        assert_eq!(drained[1].data, serde_json::json!({"n": 2}));

        assert!(cache.get_pending_messages("c1", 20).is_empty());
    }

    #[test]
    fn pending_messages_older_than_expire_time_are_dropped() {
        let cache = DeviceCache::new(1000, 120_000);
        cache.add_pending_message(
            "c1",
            ForwardMessage::from_device("c2", serde_json::json!({"n": 1})),
            0,
        );
        let drained = cache.get_pending_messages("c1", 200_000);
        assert!(drained.is_empty());
    }

    #[test]
    fn clean_expired_messages_sweeps_without_full_drain() {
        let cache = DeviceCache::new(1000, 120_000);
        cache.add_pending_message(
            "c1",
            ForwardMessage::from_device("c2", serde_json::json!({"n": 1})),
            0,
        );
        cache.add_pending_message(
            "c1",
            ForwardMessage::from_device("c2", serde_json::json!({"n": 2})),
            200_000,
        );
        cache.clean_expired_messages(200_500);
        let remaining = cache.get_pending_messages("c1", 200_500);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].data, serde_json::json!({"n": 2}));
    }

    #[test]
    fn group_reverse_index_stays_coherent_across_updates() {
        let cache = DeviceCache::new(1000, 120_000);
        cache.set_device_groups("c1", &["g1".to_string(), "g2".to_string()]);
        assert!(cache.is_device_in_group("c1", "g1"));
        assert!(cache.is_device_in_group("c1", "g2"));
        assert_eq!(cache.get_device_groups("c1").len(), 2);

        cache.set_device_groups("c1", &["g2".to_string()]);
        assert!(!cache.is_device_in_group("c1", "g1"));
        assert!(cache.get_group_members("g1").is_empty());
        assert!(cache.is_device_in_group("c1", "g2"));

        cache.set_device_groups("c1", &[]);
        assert!(cache.get_device_groups("c1").is_empty());
        assert!(cache.get_group_members("g2").is_empty());
    }

    #[test]
    fn removing_a_device_clears_every_secondary_index() {
        let cache = DeviceCache::new(1000, 120_000);
        cache.set_device_by_client_id("c1", device(1, "u1"));
        cache.set_device_by_auth_key("auth-u1", device(1, "u1"));
        cache.set_device_groups("c1", &["g1".to_string()]);
        cache.set_client_online("c1", Arc::new(FakeHandle { closed: Arc::new(AtomicBool::new(false)) }));

        cache.remove_device("c1", "auth-u1");

        assert!(cache.get_device_by_client_id("c1").is_none());
        assert!(cache.get_device_by_auth_key("auth-u1").is_none());
        assert!(!cache.is_online("c1"));
        assert!(cache.get_device_groups("c1").is_empty());
        assert!(cache.get_group_members("g1").is_empty());
    }

    #[test]
    fn close_session_invokes_the_registered_handle() {
        let cache = DeviceCache::new(1000, 120_000);
        let closed = Arc::new(AtomicBool::new(false));
        cache.set_client_online(
            "c1",
            Arc::new(FakeHandle {
                closed: closed.clone(),
            }),
        );

        assert!(cache.close_session("c1"));
        assert!(closed.load(Ordering::SeqCst));
        assert!(!cache.close_session("unknown-client"));
    }

    #[test]
    fn remote_share_data_updates_only_the_matching_entry() {
        let cache = DeviceCache::new(1000, 120_000);
        cache.set_remote_shared_devices(
            "peer-a",
            vec![RemoteSharedDeviceEntry {
                uuid: "u1".to_string(),
                client_id: Some("c1".to_string()),
                permissions: "readwrite".to_string(),
                last_data: None,
                last_data_at: None,
            }],
        );

        cache.update_remote_share_data("peer-a", "c1", serde_json::json!({"v": 9}), 42);
        let shares = cache.get_remote_shared_devices("peer-a");
        assert_eq!(shares[0].last_data, Some(serde_json::json!({"v": 9})));
        assert_eq!(shares[0].last_data_at, Some(42));

        cache.update_remote_share_data("peer-a", "no-such-device", serde_json::json!({}), 99);
        let shares = cache.get_remote_shared_devices("peer-a");
        assert_eq!(shares[0].last_data_at, Some(42));
    }
}
