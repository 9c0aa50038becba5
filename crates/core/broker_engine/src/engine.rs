use std::sync::Arc;

use device_cache::DeviceCache;
use identity_store::DeviceMode;
use identity_store::IdentityStore;
use serde_json::Value;
use topic_grammar::device_recv_topic;
use topic_grammar::group_recv_topic;
use topic_grammar::parse_remote_address;
use topic_grammar::BridgeGroupMessage;
use topic_grammar::BridgeMessage;
use topic_grammar::BridgeShareDataMessage;
use topic_grammar::BridgeShareSyncMessage;
use topic_grammar::DevicePublishBody;
use topic_grammar::ForwardMessage;
use topic_grammar::RemoteAddress;
use topic_grammar::Route;
use tracing::debug;
use tracing::warn;

use crate::acl::can_publish;
use crate::acl::can_subscribe;
use crate::hooks::BridgeOutbound;
use crate::hooks::LocalRouter;
use crate::policy::SessionPolicy;
use crate::session::AuthOutcome;
use crate::session::SessionIdentity;
use crate::session::SessionKind;
use crate::share::check_bridge_device_access;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_message_bytes: usize,
    pub federation_enabled: bool,
    pub local_bridge_token: String,
}

/// Outcome of a device publish: whether to keep processing subsequent
/// packets on this session, per the violation policy of `spec.md` §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    Dropped,
    ViolationClose,
}

/// The message routing and access-control engine: session lifecycle, topic
/// ACL, the publish pipeline and its fan-out (`spec.md` §4.3–§4.5).
pub struct BrokerEngine {
    store: Arc<IdentityStore>,
    cache: Arc<DeviceCache>,
    bridge: Arc<dyn BridgeOutbound>,
    router: Arc<dyn LocalRouter>,
    config: EngineConfig,
}

impl BrokerEngine {
    pub fn new(
        store: Arc<IdentityStore>,
        cache: Arc<DeviceCache>,
        bridge: Arc<dyn BridgeOutbound>,
        router: Arc<dyn LocalRouter>,
        config: EngineConfig,
    ) -> Self {
        BrokerEngine {
            store,
            cache,
            bridge,
            router,
            config,
        }
    }

    pub fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    fn is_member(&self, client_id: &str, device_id: i64, group_name: &str) -> bool {
        if self.cache.is_device_in_group(client_id, group_name) {
            return true;
        }
        self.store
            .is_device_in_group(device_id, group_name)
            .unwrap_or(false)
    }

    fn emit(&self, topic: String, fm: &ForwardMessage) {
        match serde_json::to_vec(fm) {
            Ok(payload) => self.router.publish_local(&topic, &payload),
            Err(e) => warn!(topic, error = %e, "failed to encode outbound forward message"),
        }
    }

    /// The timeseries tap run in addition to normal dispatch when `ts: true`
    /// (`spec.md` §4.5).
    fn tap_timeseries(&self, device_uuid: &str, data: &Value, now_ms: i64) {
        let Some(object) = data.as_object() else {
            debug!(device_uuid, "ts=true but data is not an object, skipping");
            return;
        };
        for (key, value) in object {
            let Some(number) = value.as_f64() else {
                continue;
            };
            if let Err(e) = self
                .store
                .insert_timeseries_point(device_uuid, key, number, now_ms)
            {
                warn!(device_uuid, key, error = %e, "failed to record timeseries point");
            }
        }
    }

    /// `DispatchDevice(sender, target, data)` (`spec.md` §4.5). `emit_local`
    /// is `false` for HTTP-originated publishes: per the documented HTTP
    /// limitation, a message addressed to an MQTT-mode device is not
    /// re-injected on the MQTT path when it was submitted over HTTP.
    fn dispatch_device(&self, session: &SessionIdentity, target: &str, data: Value, now_ms: i64, emit_local: bool) {
        if self.config.federation_enabled {
            self.bridge.push_share_data_if_needed(&session.client_id, &data);
        }
        match parse_remote_address(target) {
            RemoteAddress::Remote { broker_id, local_id } => {
                if !self
                    .bridge
                    .send_to_remote_device(broker_id, &session.client_id, local_id, &data)
                {
                    debug!(peer = broker_id, "peer not connected, dropping publish");
                }
            }
            RemoteAddress::Invalid => {
                warn!(target, "invalid cross-broker address, dropping");
            }
            RemoteAddress::Local(_) => {
                let fm = ForwardMessage::from_device(session.client_id.clone(), data);
                if self.cache.is_http_mode(target) {
                    self.cache.add_pending_message(target, fm, now_ms);
                } else if emit_local {
                    self.emit(device_recv_topic(target), &fm);
                } else {
                    debug!(target, "target is mqtt-mode, not re-injected for http-originated publish");
                }
            }
        }
    }

    /// `DispatchGroup(sender, groupName, data)` (`spec.md` §4.5).
    fn dispatch_group(&self, session: &SessionIdentity, group_name: &str, data: Value, now_ms: i64) {
        match parse_remote_address(group_name) {
            RemoteAddress::Remote { broker_id, local_id } => {
                if !self
                    .bridge
                    .send_to_remote_group(broker_id, &session.client_id, local_id, &data)
                {
                    debug!(peer = broker_id, "peer not connected, dropping group publish");
                }
                return;
            }
            RemoteAddress::Invalid => {
                warn!(group_name, "invalid cross-broker group address, dropping");
                return;
            }
            RemoteAddress::Local(_) => {}
        }

        let is_member = match &session.kind {
            SessionKind::Device { device_id, .. } => {
                self.is_member(&session.client_id, *device_id, group_name)
            }
            SessionKind::Bridge => false,
        };
        if !is_member {
            debug!(group_name, client_id = %session.client_id, "not a group member, dropping");
            return;
        }

        let fm = ForwardMessage::from_group(group_name, session.client_id.clone(), data);
        for member in self.cache.get_group_members(group_name) {
            if member == session.client_id {
                continue;
            }
            if self.cache.is_http_mode(&member) {
                self.cache.add_pending_message(&member, fm.clone(), now_ms);
            }
        }
        self.emit(group_recv_topic(group_name), &fm);

        if self.config.federation_enabled {
            self.bridge
                .broadcast_to_remote_group(&session.client_id, group_name, &fm.data);
        }
    }

    /// `DeliverFromRemote(fromBroker, fromDevice, targetClientId, data)`
    /// (`spec.md` §4.5, §4.7 device-share ACL).
    fn deliver_from_remote(
        &self,
        from_broker: &str,
        from_device: &str,
        target_client_id: &str,
        data: Value,
        now_ms: i64,
    ) {
        let target_device_id = match self.cache.get_device_by_client_id(target_client_id) {
            Some(device) => device.id,
            None => match self.store.get_device_by_client_id(target_client_id) {
                Ok(Some(device)) => device.id,
                _ => {
                    debug!(target_client_id, "unknown target, dropping bridge message");
                    return;
                }
            },
        };

        let access = match check_bridge_device_access(&self.store, from_broker, target_device_id) {
            Ok(access) => access,
            Err(e) => {
                warn!(from_broker, error = %e, "share ACL lookup failed, dropping");
                return;
            }
        };
        if !access.allows_write() {
            debug!(from_broker, target_client_id, "share ACL denies delivery");
            return;
        }

        let fm = ForwardMessage::from_device(format!("{from_broker}:{from_device}"), data);
        if self.cache.is_http_mode(target_client_id) {
            self.cache.add_pending_message(target_client_id, fm, now_ms);
        } else {
            self.emit(device_recv_topic(target_client_id), &fm);
        }
    }

    /// `DeliverGroupFromRemote(fromBroker, fromDevice, groupName, data)`
    /// (`spec.md` §4.5). No share-ACL gate — only `DeliverFromRemote` is
    /// gated, per the spec's literal text.
    fn deliver_group_from_remote(
        &self,
        from_broker: &str,
        from_device: &str,
        group_name: &str,
        data: Value,
        now_ms: i64,
    ) {
        let fm = ForwardMessage::from_group(group_name, format!("{from_broker}:{from_device}"), data);
        for member in self.cache.get_group_members(group_name) {
            if self.cache.is_http_mode(&member) {
                self.cache.add_pending_message(&member, fm.clone(), now_ms);
            }
        }
        self.emit(group_recv_topic(group_name), &fm);
    }

    /// The publish pipeline of `spec.md` §4.5, steps 1–5, for a publish from a
    /// device-kind session.
    pub fn handle_device_publish(
        &self,
        session: &SessionIdentity,
        topic: &str,
        payload: &[u8],
        now_ms: i64,
    ) -> PublishOutcome {
        let SessionKind::Device { device_id, uuid } = &session.kind else {
            return PublishOutcome::ViolationClose;
        };

        if payload.len() > self.config.max_message_bytes {
            return PublishOutcome::ViolationClose;
        }
        if !self.cache.check_publish_rate(&session.client_id, now_ms) {
            return PublishOutcome::ViolationClose;
        }

        let route = Route::classify(topic);
        let device_id = *device_id;
        let uuid = uuid.clone();
        if !can_publish(session, &route, |name| self.is_member(&session.client_id, device_id, name)) {
            return PublishOutcome::ViolationClose;
        }

        let body: DevicePublishBody = match serde_json::from_slice(payload) {
            Ok(body) => body,
            Err(e) => {
                debug!(client_id = %session.client_id, error = %e, "malformed publish payload, dropping");
                return PublishOutcome::Dropped;
            }
        };

        match route {
            Route::DeviceSend { .. } => {
                if body.ts {
                    self.tap_timeseries(&uuid, &body.data, now_ms);
                }
                if let Some(target) = &body.to_device {
                    self.dispatch_device(session, target, body.data, now_ms, true);
                } else if let Some(group) = &body.to_group {
                    self.dispatch_group(session, group, body.data, now_ms);
                } else {
                    debug!(client_id = %session.client_id, "publish has neither toDevice nor toGroup, dropping");
                }
                PublishOutcome::Accepted
            }
            Route::GroupSend { .. } => {
                if let Some(group) = &body.to_group {
                    self.dispatch_group(session, group, body.data, now_ms);
                } else {
                    debug!(client_id = %session.client_id, "group publish missing toGroup, dropping");
                }
                PublishOutcome::Accepted
            }
            _ => PublishOutcome::Dropped,
        }
    }

    /// The publish pipeline of `spec.md` §4.5, steps 1–5, for a publish
    /// submitted through the HTTP device API on behalf of an authenticated
    /// device (`POST /device/s`). Same size/rate/ACL/classification checks
    /// as [`Self::handle_device_publish`], but addresses an MQTT-mode target
    /// without re-injecting on the MQTT path (spec-documented limitation).
    pub fn handle_http_publish(
        &self,
        session: &SessionIdentity,
        own_client_id: &str,
        payload: &[u8],
        now_ms: i64,
    ) -> PublishOutcome {
        let SessionKind::Device { device_id, uuid } = &session.kind else {
            return PublishOutcome::ViolationClose;
        };

        if payload.len() > self.config.max_message_bytes {
            return PublishOutcome::ViolationClose;
        }
        if !self.cache.check_publish_rate(&session.client_id, now_ms) {
            return PublishOutcome::ViolationClose;
        }

        let route = Route::DeviceSend {
            client_id: own_client_id.to_string(),
        };
        let device_id = *device_id;
        let uuid = uuid.clone();
        if !can_publish(session, &route, |name| self.is_member(&session.client_id, device_id, name)) {
            return PublishOutcome::ViolationClose;
        }

        let body: DevicePublishBody = match serde_json::from_slice(payload) {
            Ok(body) => body,
            Err(e) => {
                debug!(client_id = %session.client_id, error = %e, "malformed http publish body, dropping");
                return PublishOutcome::Dropped;
            }
        };

        if body.ts {
            self.tap_timeseries(&uuid, &body.data, now_ms);
        }
        if let Some(target) = &body.to_device {
            self.dispatch_device(session, target, body.data, now_ms, false);
        } else if let Some(group) = &body.to_group {
            self.dispatch_group(session, group, body.data, now_ms);
        } else {
            debug!(client_id = %session.client_id, "http publish has neither toDevice nor toGroup, dropping");
        }
        PublishOutcome::Accepted
    }

    /// Inbound publishes from a bridge-kind session on the `/bridge/*`
    /// subtree (`spec.md` §4.5 bullet list).
    pub fn handle_bridge_publish(
        &self,
        session: &SessionIdentity,
        topic: &str,
        payload: &[u8],
        now_ms: i64,
    ) -> PublishOutcome {
        let route = Route::classify(topic);
        if !can_publish(session, &route, |_| false) {
            return PublishOutcome::ViolationClose;
        }

        match route {
            Route::BridgeDevice { client_id } => {
                let msg: BridgeMessage = match serde_json::from_slice(payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(error = %e, "malformed bridge device message, dropping");
                        return PublishOutcome::Dropped;
                    }
                };
                self.deliver_from_remote(&msg.from_broker, &msg.from_device, &client_id, msg.data, now_ms);
                PublishOutcome::Accepted
            }
            Route::BridgeGroup { name } => {
                let msg: BridgeGroupMessage = match serde_json::from_slice(payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(error = %e, "malformed bridge group message, dropping");
                        return PublishOutcome::Dropped;
                    }
                };
                self.deliver_group_from_remote(&msg.from_broker, &msg.from_device, &name, msg.data, now_ms);
                PublishOutcome::Accepted
            }
            Route::BridgeShareSync { broker_id } => {
                let msg: BridgeShareSyncMessage = match serde_json::from_slice(payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(error = %e, "malformed share-sync message, dropping");
                        return PublishOutcome::Dropped;
                    }
                };
                let entries = msg
                    .devices
                    .into_iter()
                    .map(|d| device_cache::RemoteSharedDeviceEntry {
                        uuid: d.uuid,
                        client_id: d.client_id,
                        permissions: d.permissions,
                        last_data: None,
                        last_data_at: None,
                    })
                    .collect();
                self.cache.set_remote_shared_devices(&broker_id, entries);
                PublishOutcome::Accepted
            }
            Route::BridgeShareData {
                broker_id,
                client_id: _,
            } => {
                let msg: BridgeShareDataMessage = match serde_json::from_slice(payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(error = %e, "malformed share-data message, dropping");
                        return PublishOutcome::Dropped;
                    }
                };
                self.cache
                    .update_remote_share_data(&broker_id, &msg.device_uuid, msg.data, now_ms);
                PublishOutcome::Accepted
            }
            _ => PublishOutcome::Dropped,
        }
    }
}

impl SessionPolicy for BrokerEngine {
    fn authenticate(&self, client_id: &str, username: &str, password: &str) -> AuthOutcome {
        if client_id.starts_with("__bridge_") {
            if self.config.federation_enabled
                && username == "__bridge_"
                && password == self.config.local_bridge_token
            {
                return AuthOutcome::Accepted(SessionIdentity {
                    client_id: client_id.to_string(),
                    kind: SessionKind::Bridge,
                });
            }
            return AuthOutcome::Rejected;
        }

        let device = match self.store.get_device_by_client_id(client_id) {
            Ok(Some(device)) => device,
            _ => return AuthOutcome::Rejected,
        };
        if device.username.as_deref() != Some(username) || device.password.as_deref() != Some(password) {
            return AuthOutcome::Rejected;
        }

        let groups = self
            .store
            .get_device_groups(device.id)
            .unwrap_or_default();
        self.cache.set_device_by_client_id(client_id, device.clone());
        self.cache.set_device_by_auth_key(&device.auth_key, device.clone());
        self.cache.set_device_groups(client_id, &groups);

        AuthOutcome::Accepted(SessionIdentity {
            client_id: client_id.to_string(),
            kind: SessionKind::Device {
                device_id: device.id,
                uuid: device.uuid,
            },
        })
    }

    fn authorize_publish(&self, session: &SessionIdentity, route: &Route) -> bool {
        match &session.kind {
            SessionKind::Device { device_id, .. } => {
                can_publish(session, route, |name| self.is_member(&session.client_id, *device_id, name))
            }
            SessionKind::Bridge => can_publish(session, route, |_| false),
        }
    }

    fn authorize_subscribe(&self, session: &SessionIdentity, route: &Route) -> bool {
        match &session.kind {
            SessionKind::Device { device_id, .. } => {
                can_subscribe(session, route, |name| self.is_member(&session.client_id, *device_id, name))
            }
            SessionKind::Bridge => can_subscribe(session, route, |_| false),
        }
    }

    fn on_connected(&self, session: &SessionIdentity) {
        if let SessionKind::Device { device_id, .. } = &session.kind {
            if let Err(e) = self
                .store
                .update_device_online_status(*device_id, true, DeviceMode::Mqtt)
            {
                warn!(device_id, error = %e, "failed to record online status");
            }
        }
    }

    fn on_disconnected(&self, session: &SessionIdentity) {
        self.cache.set_client_offline(&session.client_id);
        if let SessionKind::Device { device_id, .. } = &session.kind {
            if let Err(e) = self.store.mark_device_offline(*device_id) {
                warn!(device_id, error = %e, "failed to record offline status");
            }
        }
    }
}
