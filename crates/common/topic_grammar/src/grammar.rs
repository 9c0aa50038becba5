//! The fixed topic tree of `spec.md` §4.4 / §6:
//!
//! ```text
//! /device/{cid}/s
//! /device/{cid}/r
//! /group/{name}/s
//! /group/{name}/r
//! /bridge/device/{cid}
//! /bridge/group/{name}
//! /bridge/share/sync/{brokerId}
//! /bridge/share/data/{brokerId}/{clientId}
//! ```
//!
//! `{cid}`, `{name}`, `{brokerId}` all match `[^/]+`. `Route::classify` turns a
//! topic string into a typed route so the broker engine and the bridge never hand
//! roll topic splitting more than once.

/// A topic classified against the fixed grammar above.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Route {
    DeviceSend { client_id: String },
    DeviceRecv { client_id: String },
    GroupSend { name: String },
    GroupRecv { name: String },
    BridgeDevice { client_id: String },
    BridgeGroup { name: String },
    BridgeShareSync { broker_id: String },
    BridgeShareData { broker_id: String, client_id: String },
    /// Anything not matching the grammar: always denied for pub and sub.
    Unknown,
}

impl Route {
    /// Classify a topic name (not a filter) against the fixed grammar.
    pub fn classify(topic: &str) -> Route {
        let segments: Vec<&str> = topic.split('/').collect();
        match segments.as_slice() {
            ["", "device", cid, "s"] if !cid.is_empty() => Route::DeviceSend {
                client_id: (*cid).to_string(),
            },
            ["", "device", cid, "r"] if !cid.is_empty() => Route::DeviceRecv {
                client_id: (*cid).to_string(),
            },
            ["", "group", name, "s"] if !name.is_empty() => Route::GroupSend {
                name: (*name).to_string(),
            },
            ["", "group", name, "r"] if !name.is_empty() => Route::GroupRecv {
                name: (*name).to_string(),
            },
            ["", "bridge", "device", cid] if !cid.is_empty() => Route::BridgeDevice {
                client_id: (*cid).to_string(),
            },
            ["", "bridge", "group", name] if !name.is_empty() => Route::BridgeGroup {
                name: (*name).to_string(),
            },
            ["", "bridge", "share", "sync", broker_id] if !broker_id.is_empty() => {
                Route::BridgeShareSync {
                    broker_id: (*broker_id).to_string(),
                }
            }
            ["", "bridge", "share", "data", broker_id, cid]
                if !broker_id.is_empty() && !cid.is_empty() =>
            {
                Route::BridgeShareData {
                    broker_id: (*broker_id).to_string(),
                    client_id: (*cid).to_string(),
                }
            }
            _ => Route::Unknown,
        }
    }

    pub fn is_bridge(&self) -> bool {
        matches!(
            self,
            Route::BridgeDevice { .. }
                | Route::BridgeGroup { .. }
                | Route::BridgeShareSync { .. }
                | Route::BridgeShareData { .. }
        )
    }
}

/// The topic a device publishes its own outbound messages on.
pub fn device_send_topic(client_id: &str) -> String {
    format!("/device/{client_id}/s")
}

/// The topic a device subscribes to in order to receive inbound messages.
pub fn device_recv_topic(client_id: &str) -> String {
    format!("/device/{client_id}/r")
}

pub fn group_send_topic(name: &str) -> String {
    format!("/group/{name}/s")
}

pub fn group_recv_topic(name: &str) -> String {
    format!("/group/{name}/r")
}

pub fn bridge_device_topic(client_id: &str) -> String {
    format!("/bridge/device/{client_id}")
}

pub fn bridge_group_topic(name: &str) -> String {
    format!("/bridge/group/{name}")
}

pub fn bridge_share_sync_topic(broker_id: &str) -> String {
    format!("/bridge/share/sync/{broker_id}")
}

pub fn bridge_share_data_topic(broker_id: &str, client_id: &str) -> String {
    format!("/bridge/share/data/{broker_id}/{client_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_device_topics() {
        assert_eq!(
            Route::classify("/device/abc/s"),
            Route::DeviceSend {
                client_id: "abc".into()
            }
        );
        assert_eq!(
            Route::classify("/device/abc/r"),
            Route::DeviceRecv {
                client_id: "abc".into()
            }
        );
    }

    #[test]
    fn classifies_group_topics() {
        assert_eq!(
            Route::classify("/group/g1/s"),
            Route::GroupSend { name: "g1".into() }
        );
    }

    #[test]
    fn classifies_bridge_topics() {
        assert_eq!(
            Route::classify("/bridge/device/cid"),
            Route::BridgeDevice {
                client_id: "cid".into()
            }
        );
        assert_eq!(
            Route::classify("/bridge/share/data/b1/cid"),
            Route::BridgeShareData {
                broker_id: "b1".into(),
                client_id: "cid".into()
            }
        );
    }

    #[test]
    fn anything_else_is_unknown() {
        assert_eq!(Route::classify("/random/topic"), Route::Unknown);
        assert_eq!(Route::classify("device/abc/s"), Route::Unknown);
        assert_eq!(Route::classify("/device//s"), Route::Unknown);
    }
}
