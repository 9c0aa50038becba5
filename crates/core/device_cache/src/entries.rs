use serde_json::Value;

/// One entry of `remoteSharedDevices[peerBrokerId]` (`spec.md` §3).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSharedDeviceEntry {
    pub uuid: String,
    pub client_id: Option<String>,
    pub permissions: String,
    pub last_data: Option<Value>,
    pub last_data_at: Option<i64>,
}

impl RemoteSharedDeviceEntry {
    pub fn matches(&self, client_id_or_uuid: &str) -> bool {
        self.uuid == client_id_or_uuid
            || self.client_id.as_deref() == Some(client_id_or_uuid)
    }
}
