use serde::Deserialize;
use serde::Serialize;

/// A durable device identity record (`spec.md` §3, Device).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub uuid: String,
    pub auth_key: String,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A named group of devices (`spec.md` §3, Group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    Mqtt,
    Http,
}

impl DeviceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceMode::Mqtt => "mqtt",
            DeviceMode::Http => "http",
        }
    }

    pub fn parse(s: &str) -> Option<DeviceMode> {
        match s {
            "mqtt" => Some(DeviceMode::Mqtt),
            "http" => Some(DeviceMode::Http),
            _ => None,
        }
    }
}

/// The durable online/offline projection (`spec.md` §3, DeviceStatus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: i64,
    pub online: bool,
    pub mode: DeviceMode,
    pub last_active_at: i64,
}

/// A federated peer broker (`spec.md` §3, PeerBroker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerBroker {
    pub broker_id: String,
    pub url: String,
    pub token: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    Read,
    ReadWrite,
}

impl SharePermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharePermission::Read => "read",
            SharePermission::ReadWrite => "readwrite",
        }
    }

    pub fn parse(s: &str) -> Option<SharePermission> {
        match s {
            "read" => Some(SharePermission::Read),
            "readwrite" => Some(SharePermission::ReadWrite),
            _ => None,
        }
    }

    pub fn allows_write(&self) -> bool {
        matches!(self, SharePermission::ReadWrite)
    }
}

/// `spec.md` §3, BridgeSharedDevice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSharedDevice {
    pub broker_id: String,
    pub device_id: i64,
    pub permission: SharePermission,
}

/// This broker's own persisted federation identity (`spec.md` §6, Startup invariants).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerIdentity {
    pub broker_id: String,
    pub bridge_token: String,
}

/// One bucket of a `queryTimeseriesData` result (`spec.md` §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub device_uuid: String,
    pub data_key: String,
    pub value: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPage {
    pub data: Vec<TimeseriesPoint>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}
