use std::collections::HashMap;
use std::sync::Arc;

use broker_engine::BridgeOutbound;
use broker_engine::BrokerEngine;
use device_cache::DeviceCache;
use identity_store::IdentityStore;
use parking_lot::RwLock;
use serde_json::Value;
use topic_grammar::bridge_device_topic;
use topic_grammar::bridge_group_topic;
use topic_grammar::bridge_share_data_topic;
use topic_grammar::bridge_share_sync_topic;
use topic_grammar::BridgeGroupMessage;
use topic_grammar::BridgeMessage;
use topic_grammar::BridgeShareDataMessage;
use topic_grammar::BridgeShareSyncMessage;
use topic_grammar::SharedDeviceDescriptor;
use tracing::warn;

use crate::peer;
use crate::peer::PeerHandle;
use crate::state::PeerState;

/// Federation component: owns one outbound connection per configured peer
/// broker and answers `broker_engine::BridgeOutbound` (`spec.md` §4.7).
pub struct Bridge {
    local_broker_id: String,
    store: Arc<IdentityStore>,
    cache: Arc<DeviceCache>,
    reconnect_ms: u64,
    peers: RwLock<HashMap<String, Arc<PeerHandle>>>,
    /// Set once by `set_engine` after the engine is built (it needs this
    /// `Bridge` as its `BridgeOutbound` first, so the two can't be
    /// constructed in one step); shared with every peer task so an inbound
    /// bridge publish can run the same `handle_bridge_publish` pipeline a
    /// `__bridge_*` client on our own listener would use.
    engine: Arc<RwLock<Option<Arc<BrokerEngine>>>>,
}

impl Bridge {
    pub fn new(local_broker_id: String, store: Arc<IdentityStore>, cache: Arc<DeviceCache>, reconnect_ms: u64) -> Self {
        Bridge {
            local_broker_id,
            store,
            cache,
            reconnect_ms,
            peers: RwLock::new(HashMap::new()),
            engine: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_engine(&self, engine: Arc<BrokerEngine>) {
        *self.engine.write() = Some(engine);
    }

    /// Spawn a connection for every enabled remote already in the Identity
    /// Store; called once at startup.
    pub fn reload_remotes(&self) {
        let remotes = match self.store.get_all_remotes() {
            Ok(remotes) => remotes,
            Err(e) => {
                warn!(error = %e, "failed to load peer brokers");
                return;
            }
        };
        for remote in remotes {
            if remote.enabled {
                self.start_peer(&remote.broker_id, &remote.url, &remote.token);
            }
        }
    }

    fn start_peer(&self, broker_id: &str, url: &str, token: &str) {
        let handle = peer::spawn(
            broker_id.to_string(),
            url.to_string(),
            token.to_string(),
            format!("__bridge_{}", self.local_broker_id),
            self.local_broker_id.clone(),
            self.reconnect_ms,
            self.engine.clone(),
        );
        if let Some(old) = self.peers.write().insert(broker_id.to_string(), handle) {
            old.stop();
        }
    }

    pub fn add_remote(&self, broker_id: &str, url: &str, token: &str) -> identity_store::Result<()> {
        self.store.add_remote(broker_id, url, token)?;
        self.start_peer(broker_id, url, token);
        Ok(())
    }

    pub fn update_remote(&self, broker_id: &str, url: &str, token: &str) -> identity_store::Result<()> {
        self.store.update_remote(broker_id, url, token)?;
        self.start_peer(broker_id, url, token);
        Ok(())
    }

    pub fn remove_remote(&self, broker_id: &str) -> identity_store::Result<()> {
        self.store.remove_remote(broker_id)?;
        if let Some(handle) = self.peers.write().remove(broker_id) {
            handle.stop();
        }
        Ok(())
    }

    pub fn stop_all(&self) {
        for (_, handle) in self.peers.write().drain() {
            handle.stop();
        }
    }

    fn publish_to_peer(&self, broker_id: &str, topic: String, payload: Vec<u8>) -> bool {
        let peers = self.peers.read();
        let Some(handle) = peers.get(broker_id) else {
            return false;
        };
        if handle.state() != PeerState::Connected {
            return false;
        }
        match handle.client() {
            Some(client) => peer::publish(&client, topic, payload),
            None => false,
        }
    }

    /// Replace the receiver's whole view of our share list for `broker_id`
    /// (`spec.md` §4.7, "Inbound share messages... sync replaces the list
    /// entirely"). Called by the management API whenever shares change.
    pub fn push_share_sync(&self, broker_id: &str) -> bool {
        let devices = match self.store.get_shared_devices_for_remote(broker_id) {
            Ok(devices) => devices,
            Err(e) => {
                warn!(broker_id, error = %e, "failed to load shared devices");
                return false;
            }
        };
        let descriptors = devices
            .into_iter()
            .filter_map(|row| {
                let device = self.store.get_device_by_id(row.device_id).ok().flatten()?;
                Some(SharedDeviceDescriptor {
                    uuid: device.uuid,
                    client_id: device.client_id,
                    permissions: row.permission.as_str().to_string(),
                })
            })
            .collect();
        let msg = BridgeShareSyncMessage {
            from_broker: self.local_broker_id.clone(),
            devices: descriptors,
        };
        let Ok(payload) = serde_json::to_vec(&msg) else {
            return false;
        };
        self.publish_to_peer(broker_id, bridge_share_sync_topic(&self.local_broker_id), payload)
    }
}

impl BridgeOutbound for Bridge {
    fn send_to_remote_device(&self, peer: &str, from_cid: &str, target_cid: &str, data: &Value) -> bool {
        let msg = BridgeMessage {
            from_broker: self.local_broker_id.clone(),
            from_device: from_cid.to_string(),
            to_device: target_cid.to_string(),
            data: data.clone(),
        };
        let Ok(payload) = serde_json::to_vec(&msg) else {
            return false;
        };
        self.publish_to_peer(peer, bridge_device_topic(target_cid), payload)
    }

    fn send_to_remote_group(&self, peer: &str, from_cid: &str, target_group: &str, data: &Value) -> bool {
        let msg = BridgeGroupMessage {
            from_broker: self.local_broker_id.clone(),
            from_device: from_cid.to_string(),
            to_group: target_group.to_string(),
            data: data.clone(),
        };
        let Ok(payload) = serde_json::to_vec(&msg) else {
            return false;
        };
        self.publish_to_peer(peer, bridge_group_topic(target_group), payload)
    }

    fn broadcast_to_remote_group(&self, from_cid: &str, target_group: &str, data: &Value) {
        let broker_ids: Vec<String> = self.peers.read().keys().cloned().collect();
        for broker_id in broker_ids {
            self.send_to_remote_group(&broker_id, from_cid, target_group, data);
        }
    }

    fn push_share_data_if_needed(&self, sender_cid: &str, data: &Value) {
        let Some((device_id, uuid)) = self
            .cache
            .get_device_by_client_id(sender_cid)
            .map(|d| (d.id, d.uuid))
            .or_else(|| {
                self.store
                    .get_device_by_client_id(sender_cid)
                    .ok()
                    .flatten()
                    .map(|d| (d.id, d.uuid))
            })
        else {
            return;
        };

        let remotes = match self.store.get_all_remotes() {
            Ok(remotes) => remotes,
            Err(_) => return,
        };
        for remote in remotes {
            if !remote.enabled {
                continue;
            }
            let shared = matches!(self.store.get_share_permission(&remote.broker_id, device_id), Ok(Some(_)));
            if !shared {
                continue;
            }
            let msg = BridgeShareDataMessage {
                from_broker: self.local_broker_id.clone(),
                from_device: sender_cid.to_string(),
                device_uuid: uuid.clone(),
                data: data.clone(),
            };
            if let Ok(payload) = serde_json::to_vec(&msg) {
                self.publish_to_peer(
                    &remote.broker_id,
                    bridge_share_data_topic(&self.local_broker_id, sender_cid),
                    payload,
                );
            }
        }
    }
}
