use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use identity_store::Device;
use identity_store::DeviceMode;
use parking_lot::RwLock;
use topic_grammar::ForwardMessage;
use tracing::debug;

use crate::entries::RemoteSharedDeviceEntry;
use crate::handle::SessionHandle;

/// The process-local, non-durable projection described in `spec.md` §3 "Cache
/// entities" and governed by §4.2. Every map is independently lockable so that
/// operations touching unrelated clients never contend; `set_device_groups` is
/// the one operation that must hold two locks for its whole duration so no
/// reader observes a half-rebuilt reverse index (`spec.md` §5, "Shared mutable
/// state").
pub struct DeviceCache {
    device_by_client_id: RwLock<HashMap<String, Device>>,
    device_by_auth_key: RwLock<HashMap<String, Device>>,
    online_clients: RwLock<HashMap<String, Arc<dyn SessionHandle>>>,
    device_mode: RwLock<HashMap<String, DeviceMode>>,
    device_groups: RwLock<HashMap<String, HashSet<String>>>,
    group_members: RwLock<HashMap<String, HashSet<String>>>,
    last_publish_time: RwLock<HashMap<String, i64>>,
    http_last_active: RwLock<HashMap<String, i64>>,
    pending_messages: RwLock<HashMap<String, Vec<(ForwardMessage, i64)>>>,
    remote_shared_devices: RwLock<HashMap<String, Vec<RemoteSharedDeviceEntry>>>,
    publish_rate_limit_ms: i64,
    message_expire_time_ms: i64,
}

impl DeviceCache {
    pub fn new(publish_rate_limit_ms: i64, message_expire_time_ms: i64) -> Self {
        DeviceCache {
            device_by_client_id: RwLock::new(HashMap::new()),
            device_by_auth_key: RwLock::new(HashMap::new()),
            online_clients: RwLock::new(HashMap::new()),
            device_mode: RwLock::new(HashMap::new()),
            device_groups: RwLock::new(HashMap::new()),
            group_members: RwLock::new(HashMap::new()),
            last_publish_time: RwLock::new(HashMap::new()),
            http_last_active: RwLock::new(HashMap::new()),
            pending_messages: RwLock::new(HashMap::new()),
            remote_shared_devices: RwLock::new(HashMap::new()),
            publish_rate_limit_ms,
            message_expire_time_ms,
        }
    }

    pub fn set_device_by_client_id(&self, client_id: &str, device: Device) {
        self.device_by_client_id
            .write()
            .insert(client_id.to_string(), device);
    }

    pub fn set_device_by_auth_key(&self, auth_key: &str, device: Device) {
        self.device_by_auth_key
            .write()
            .insert(auth_key.to_string(), device);
    }

    pub fn get_device_by_client_id(&self, client_id: &str) -> Option<Device> {
        self.device_by_client_id.read().get(client_id).cloned()
    }

    pub fn get_device_by_auth_key(&self, auth_key: &str) -> Option<Device> {
        self.device_by_auth_key.read().get(auth_key).cloned()
    }

    /// Delete every secondary-index entry belonging to this identity.
    pub fn remove_device(&self, client_id: &str, auth_key: &str) {
        self.device_by_client_id.write().remove(client_id);
        self.device_by_auth_key.write().remove(auth_key);
        self.online_clients.write().remove(client_id);
        self.device_mode.write().remove(client_id);
        self.last_publish_time.write().remove(client_id);
        self.http_last_active.write().remove(client_id);
        self.pending_messages.write().remove(client_id);
        self.set_device_groups(client_id, &[]);
    }

    pub fn set_client_online(&self, client_id: &str, handle: Arc<dyn SessionHandle>) {
        self.online_clients
            .write()
            .insert(client_id.to_string(), handle);
    }

    pub fn set_client_offline(&self, client_id: &str) {
        self.online_clients.write().remove(client_id);
    }

    pub fn is_online(&self, client_id: &str) -> bool {
        self.online_clients.read().contains_key(client_id)
    }

    /// Force-close a live session, used by the violation policy of `spec.md`
    /// §4.4. No-op (returns `false`) if the client isn't currently online.
    pub fn close_session(&self, client_id: &str) -> bool {
        match self.online_clients.read().get(client_id) {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    pub fn set_device_mode(&self, client_id: &str, mode: DeviceMode) {
        self.device_mode
            .write()
            .insert(client_id.to_string(), mode);
    }

    /// Mode map defaults to `mqtt` for unknown clients (`spec.md` §4.2).
    pub fn is_http_mode(&self, client_id: &str) -> bool {
        matches!(
            self.device_mode.read().get(client_id),
            Some(DeviceMode::Http)
        )
    }

    /// Returns true and records `now_ms` iff the elapsed time since the last
    /// accepted publish is at least the configured rate limit.
    pub fn check_publish_rate(&self, client_id: &str, now_ms: i64) -> bool {
        let mut times = self.last_publish_time.write();
        let allowed = match times.get(client_id) {
            Some(&last) => now_ms - last >= self.publish_rate_limit_ms,
            None => true,
        };
        if allowed {
            times.insert(client_id.to_string(), now_ms);
        }
        allowed
    }

    /// Atomically rebuild the forward and reverse group indexes for one
    /// client. Holds both locks for the whole operation so no reader can see
    /// `deviceGroups` and `groupMembers` disagree (`spec.md` §8 property 10).
    pub fn set_device_groups(&self, client_id: &str, group_names: &[String]) {
        let new_groups: HashSet<String> = group_names.iter().cloned().collect();
        let mut forward = self.device_groups.write();
        let mut reverse = self.group_members.write();

        let old_groups = forward
            .insert(client_id.to_string(), new_groups.clone())
            .unwrap_or_default();
        if new_groups.is_empty() {
            forward.remove(client_id);
        }

        for removed in old_groups.difference(&new_groups) {
            if let Some(members) = reverse.get_mut(removed) {
                members.remove(client_id);
                if members.is_empty() {
                    reverse.remove(removed);
                }
            }
        }
        for added in &new_groups {
            reverse
                .entry(added.clone())
                .or_default()
                .insert(client_id.to_string());
        }
    }

    pub fn get_device_groups(&self, client_id: &str) -> HashSet<String> {
        self.device_groups
            .read()
            .get(client_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_group_members(&self, group_name: &str) -> HashSet<String> {
        self.group_members
            .read()
            .get(group_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Cache-only membership check; the Broker Engine falls back to the
    /// Identity Store on a miss (`spec.md` §4.4).
    pub fn is_device_in_group(&self, client_id: &str, group_name: &str) -> bool {
        self.group_members
            .read()
            .get(group_name)
            .is_some_and(|members| members.contains(client_id))
    }

    pub fn add_pending_message(&self, client_id: &str, msg: ForwardMessage, now_ms: i64) {
        self.pending_messages
            .write()
            .entry(client_id.to_string())
            .or_default()
            .push((msg, now_ms));
    }

    /// Atomically filter out expired entries, clear the queue, and return the
    /// remaining messages in enqueue order (`spec.md` §4.2, §8 property 6).
    pub fn get_pending_messages(&self, client_id: &str, now_ms: i64) -> Vec<ForwardMessage> {
        let mut queues = self.pending_messages.write();
        let Some(queue) = queues.remove(client_id) else {
            return Vec::new();
        };
        queue
            .into_iter()
            .filter(|(_, enqueued_at)| now_ms - enqueued_at < self.message_expire_time_ms)
            .map(|(msg, _)| msg)
            .collect()
    }

    /// Periodic sweep: drop expired entries in place without otherwise
    /// touching the queue (`spec.md` §4.2).
    pub fn clean_expired_messages(&self, now_ms: i64) {
        let mut queues = self.pending_messages.write();
        let expire_time_ms = self.message_expire_time_ms;
        queues.retain(|_, queue| {
            queue.retain(|(_, enqueued_at)| now_ms - *enqueued_at < expire_time_ms);
            !queue.is_empty()
        });
    }

    pub fn set_http_device_last_active(&self, client_id: &str, now_ms: i64) {
        self.http_last_active
            .write()
            .insert(client_id.to_string(), now_ms);
    }

    pub fn get_http_last_active(&self, client_id: &str) -> Option<i64> {
        self.http_last_active.read().get(client_id).copied()
    }

    /// Replace the whole share list for a peer (share-sync semantics,
    /// `spec.md` §4.7).
    pub fn set_remote_shared_devices(
        &self,
        broker_id: &str,
        devices: Vec<RemoteSharedDeviceEntry>,
    ) {
        self.remote_shared_devices
            .write()
            .insert(broker_id.to_string(), devices);
    }

    /// Update `lastData`/`lastDataAt` for the matching entry by clientId or
    /// uuid; no-op if no entry matches (`spec.md` §4.7 inbound share-data).
    pub fn update_remote_share_data(
        &self,
        broker_id: &str,
        client_id_or_uuid: &str,
        data: serde_json::Value,
        now_ms: i64,
    ) {
        let mut shares = self.remote_shared_devices.write();
        let Some(list) = shares.get_mut(broker_id) else {
            debug!(broker_id, "share-data update for unknown peer, ignoring");
            return;
        };
        if let Some(entry) = list.iter_mut().find(|e| e.matches(client_id_or_uuid)) {
            entry.last_data = Some(data);
            entry.last_data_at = Some(now_ms);
        }
    }

    pub fn get_remote_shared_devices(&self, broker_id: &str) -> Vec<RemoteSharedDeviceEntry> {
        self.remote_shared_devices
            .read()
            .get(broker_id)
            .cloned()
            .unwrap_or_default()
    }
}
