use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// The envelope delivered on `/device/{cid}/r` and `/group/{name}/r`.
///
/// `from_device` carries `"brokerId:clientId"` when the message originated on a
/// remote peer, the plain clientId otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardMessage {
    pub from_device: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub from_group: Option<String>,
    pub data: Value,
}

impl ForwardMessage {
    pub fn from_device(from_device: impl Into<String>, data: Value) -> Self {
        ForwardMessage {
            from_device: from_device.into(),
            from_group: None,
            data,
        }
    }

    pub fn from_group(
        from_group: impl Into<String>,
        from_device: impl Into<String>,
        data: Value,
    ) -> Self {
        ForwardMessage {
            from_device: from_device.into(),
            from_group: Some(from_group.into()),
            data,
        }
    }
}

/// Body a device publishes on `/device/{cid}/s`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePublishBody {
    #[serde(default)]
    pub to_device: Option<String>,
    #[serde(default)]
    pub to_group: Option<String>,
    #[serde(default)]
    pub ts: bool,
    pub data: Value,
}

/// Body published on `/bridge/device/{cid}` by a bridge peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    pub from_broker: String,
    pub from_device: String,
    pub to_device: String,
    pub data: Value,
}

/// Body published on `/bridge/group/{name}` by a bridge peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeGroupMessage {
    pub from_broker: String,
    pub from_device: String,
    pub to_group: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedDeviceDescriptor {
    pub uuid: String,
    pub client_id: Option<String>,
    pub permissions: String,
}

/// Body published on `/bridge/share/sync/{brokerId}`; replaces the receiver's
/// whole view of the sender's share list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeShareSyncMessage {
    pub from_broker: String,
    pub devices: Vec<SharedDeviceDescriptor>,
}

/// Body published on `/bridge/share/data/{brokerId}/{clientId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeShareDataMessage {
    pub from_broker: String,
    pub from_device: String,
    pub device_uuid: String,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_message_omits_from_group_when_absent() {
        let msg = ForwardMessage::from_device("cid-1", serde_json::json!({"x": 1}));
        let encoded = serde_json::to_string(&msg).unwrap();
        assert!(!encoded.contains("fromGroup"));
    }

    #[test]
    fn device_publish_body_defaults_ts_to_false() {
        let body: DevicePublishBody =
            serde_json::from_str(r#"{"toDevice":"cid-2","data":{"x":1}}"#).unwrap();
        assert!(!body.ts);
        assert_eq!(body.to_device.as_deref(), Some("cid-2"));
        assert!(body.to_group.is_none());
    }
}
