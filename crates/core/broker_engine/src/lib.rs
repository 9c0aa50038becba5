mod acl;
mod engine;
mod hooks;
mod policy;
mod session;
mod share;

pub use acl::can_publish;
pub use acl::can_subscribe;
pub use engine::BrokerEngine;
pub use engine::EngineConfig;
pub use engine::PublishOutcome;
pub use hooks::BridgeOutbound;
pub use hooks::LocalRouter;
pub use policy::SessionPolicy;
pub use session::AuthOutcome;
pub use session::SessionIdentity;
pub use session::SessionKind;
pub use share::check_bridge_device_access;
pub use share::ShareAccess;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use device_cache::DeviceCache;
    use identity_store::IdentityStore;
    use identity_store::SharePermission;
    use serde_json::json;
    use topic_grammar::device_send_topic;
    use topic_grammar::group_send_topic;

    use super::*;

    #[derive(Default)]
    struct RecordingBridge {
        sent_device: Mutex<Vec<(String, String, String)>>,
        sent_group: Mutex<Vec<(String, String, String)>>,
    }

    impl BridgeOutbound for RecordingBridge {
        fn send_to_remote_device(&self, peer: &str, from_cid: &str, target_cid: &str, _data: &serde_json::Value) -> bool {
            self.sent_device
                .lock()
                .unwrap()
                .push((peer.to_string(), from_cid.to_string(), target_cid.to_string()));
            true
        }

        fn send_to_remote_group(&self, peer: &str, from_cid: &str, target_group: &str, _data: &serde_json::Value) -> bool {
            self.sent_group
                .lock()
                .unwrap()
                .push((peer.to_string(), from_cid.to_string(), target_group.to_string()));
            true
        }

        fn broadcast_to_remote_group(&self, _from_cid: &str, _target_group: &str, _data: &serde_json::Value) {}

        fn push_share_data_if_needed(&self, _sender_cid: &str, _data: &serde_json::Value) {}
    }

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

    fn harness() -> (
        BrokerEngine,
        Arc<IdentityStore>,
        Arc<DeviceCache>,
        Arc<RecordingBridge>,
        Arc<RecordingRouter>,
    ) {
        let store = Arc::new(IdentityStore::open_in_memory().unwrap());
        let cache = Arc::new(DeviceCache::new(0, 60_000));
        let bridge = Arc::new(RecordingBridge::default());
        let router = Arc::new(RecordingRouter::default());
        let config = EngineConfig {
            max_message_bytes: 1024,
            federation_enabled: true,
            local_bridge_token: "secret".to_string(),
        };
        let engine = BrokerEngine::new(
            store.clone(),
            cache.clone(),
            bridge.clone(),
            router.clone(),
            config,
        );
        (engine, store, cache, bridge, router)
    }

    fn provision_device(store: &IdentityStore, uuid: &str, client_id: &str) -> i64 {
        let device = store.create_device(uuid, &format!("auth-{uuid}")).unwrap();
        store
            .update_device_connection(&device.auth_key, client_id, "user", "pass")
            .unwrap();
        device.id
    }

    #[test]
    fn authenticate_accepts_matching_credentials_and_rejects_bad_password() {
        let (engine, store, ..) = harness();
        provision_device(&store, "dev-1", "cid-1");

        match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(session) => assert_eq!(session.client_id, "cid-1"),
            AuthOutcome::Rejected => panic!("expected accept"),
        }
        assert!(matches!(
            engine.authenticate("cid-1", "user", "wrong"),
            AuthOutcome::Rejected
        ));
    }

    #[test]
    fn authenticate_accepts_bridge_client_with_correct_token_only() {
        let (engine, ..) = harness();
        assert!(matches!(
            engine.authenticate("__bridge_peer-a", "__bridge_", "secret"),
            AuthOutcome::Accepted(_)
        ));
        assert!(matches!(
            engine.authenticate("__bridge_peer-a", "__bridge_", "wrong-token"),
            AuthOutcome::Rejected
        ));
    }

    #[test]
    fn oversized_publish_is_a_violation() {
        let (engine, store, ..) = harness();
        provision_device(&store, "dev-1", "cid-1");
        let session = match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(s) => s,
            _ => panic!(),
        };
        let huge = vec![b'x'; 2048];
        let outcome = engine.handle_device_publish(&session, &device_send_topic("cid-1"), &huge, 0);
        assert_eq!(outcome, PublishOutcome::ViolationClose);
    }

    #[test]
    fn publish_to_someone_elses_send_topic_is_a_violation() {
        let (engine, store, ..) = harness();
        provision_device(&store, "dev-1", "cid-1");
        let session = match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(s) => s,
            _ => panic!(),
        };
        let payload = serde_json::to_vec(&json!({"toDevice": "cid-2", "data": {}})).unwrap();
        let outcome = engine.handle_device_publish(&session, &device_send_topic("cid-2"), &payload, 0);
        assert_eq!(outcome, PublishOutcome::ViolationClose);
    }

    #[test]
    fn local_device_to_device_publish_emits_on_recv_topic() {
        let (engine, store, _cache, _bridge, router) = harness();
        provision_device(&store, "dev-1", "cid-1");
        provision_device(&store, "dev-2", "cid-2");
        let session = match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(s) => s,
            _ => panic!(),
        };
        let payload = serde_json::to_vec(&json!({"toDevice": "cid-2", "data": {"x": 1}})).unwrap();
        let outcome = engine.handle_device_publish(&session, &device_send_topic("cid-1"), &payload, 1_000);
        assert_eq!(outcome, PublishOutcome::Accepted);

        let published = router.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "/device/cid-2/r");
        let fm: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(fm["fromDevice"], "cid-1");
    }

    #[test]
    fn http_mode_target_gets_pending_message_instead_of_emit() {
        let (engine, store, cache, _bridge, router) = harness();
        provision_device(&store, "dev-1", "cid-1");
        provision_device(&store, "dev-2", "cid-2");
        cache.set_device_mode("cid-2", identity_store::DeviceMode::Http);
        let session = match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(s) => s,
            _ => panic!(),
        };
        let payload = serde_json::to_vec(&json!({"toDevice": "cid-2", "data": {}})).unwrap();
        engine.handle_device_publish(&session, &device_send_topic("cid-1"), &payload, 1_000);

        assert!(router.published.lock().unwrap().is_empty());
        assert_eq!(cache.get_pending_messages("cid-2", 1_000).len(), 1);
    }

    #[test]
    fn remote_address_target_goes_through_the_bridge() {
        let (engine, store, ..) = harness();
        provision_device(&store, "dev-1", "cid-1");
        let session = match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(s) => s,
            _ => panic!(),
        };
        let payload = serde_json::to_vec(&json!({"toDevice": "peer-b:remote-cid", "data": {}})).unwrap();
        let outcome = engine.handle_device_publish(&session, &device_send_topic("cid-1"), &payload, 1_000);
        assert_eq!(outcome, PublishOutcome::Accepted);
    }

    #[test]
    fn group_publish_requires_membership_and_fans_out_to_members() {
        let (engine, store, cache, ..) = harness();
        provision_device(&store, "dev-1", "cid-1");
        provision_device(&store, "dev-2", "cid-2");
        let group = store.create_group("floor-1").unwrap();
        store.add_device_to_group(1, group.id).unwrap();
        store.add_device_to_group(2, group.id).unwrap();
        cache.set_device_groups("cid-1", &["floor-1".to_string()]);
        cache.set_device_groups("cid-2", &["floor-1".to_string()]);

        let session = match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(s) => s,
            _ => panic!(),
        };
        let payload = serde_json::to_vec(&json!({"toGroup": "floor-1", "data": {}})).unwrap();
        let outcome = engine.handle_device_publish(&session, &group_send_topic("floor-1"), &payload, 1_000);
        assert_eq!(outcome, PublishOutcome::Accepted);
    }

    #[test]
    fn non_member_group_publish_is_a_violation() {
        let (engine, store, ..) = harness();
        provision_device(&store, "dev-1", "cid-1");
        store.create_group("floor-1").unwrap();

        let session = match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(s) => s,
            _ => panic!(),
        };
        let outcome = engine.authorize_publish(&session, &topic_grammar::Route::GroupSend { name: "floor-1".into() });
        assert!(!outcome);
    }

    #[test]
    fn bridge_device_delivery_respects_share_acl() {
        let (engine, store, cache, ..) = harness();
        provision_device(&store, "dev-1", "cid-1");
        store.add_remote("peer-a", "mqtt://peer-a", "tok").unwrap();
        store.share_device("peer-a", 1, SharePermission::Read).unwrap();

        let bridge_session = SessionIdentity {
            client_id: "__bridge_peer-a".to_string(),
            kind: SessionKind::Bridge,
        };
        let msg = json!({"fromBroker": "peer-a", "fromDevice": "remote-x", "data": {"v": 1}});
        let payload = serde_json::to_vec(&msg).unwrap();
        let outcome = engine.handle_bridge_publish(
            &bridge_session,
            &topic_grammar::bridge_device_topic("cid-1"),
            &payload,
            1_000,
        );
        assert_eq!(outcome, PublishOutcome::Accepted);
        // Read-only share: delivery is denied, no pending message queued.
        cache.set_device_mode("cid-1", identity_store::DeviceMode::Http);
        assert_eq!(cache.get_pending_messages("cid-1", 1_000).len(), 0);
    }

    #[test]
    fn http_publish_does_not_reinject_to_mqtt_mode_target() {
        let (engine, store, cache, _bridge, router) = harness();
        provision_device(&store, "dev-1", "cid-1");
        provision_device(&store, "dev-2", "cid-2");
        let session = match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(s) => s,
            _ => panic!(),
        };
        let payload = serde_json::to_vec(&json!({"toDevice": "cid-2", "data": {}})).unwrap();
        let outcome = engine.handle_http_publish(&session, "cid-1", &payload, 1_000);
        assert_eq!(outcome, PublishOutcome::Accepted);
        assert!(router.published.lock().unwrap().is_empty());
        assert_eq!(cache.get_pending_messages("cid-2", 1_000).len(), 0);
    }

    #[test]
    fn http_publish_still_queues_for_http_mode_target() {
        let (engine, store, cache, _bridge, _router) = harness();
        provision_device(&store, "dev-1", "cid-1");
        provision_device(&store, "dev-2", "cid-2");
        cache.set_device_mode("cid-2", identity_store::DeviceMode::Http);
        let session = match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(s) => s,
            _ => panic!(),
        };
        let payload = serde_json::to_vec(&json!({"toDevice": "cid-2", "data": {"x": 1}})).unwrap();
        let outcome = engine.handle_http_publish(&session, "cid-1", &payload, 1_000);
        assert_eq!(outcome, PublishOutcome::Accepted);
        assert_eq!(cache.get_pending_messages("cid-2", 1_000).len(), 1);
    }

    #[test]
    fn malformed_json_is_dropped_not_closed() {
        let (engine, store, ..) = harness();
        provision_device(&store, "dev-1", "cid-1");
        let session = match engine.authenticate("cid-1", "user", "pass") {
            AuthOutcome::Accepted(s) => s,
            _ => panic!(),
        };
        let outcome = engine.handle_device_publish(&session, &device_send_topic("cid-1"), b"not json", 0);
        assert_eq!(outcome, PublishOutcome::Dropped);
    }
}
