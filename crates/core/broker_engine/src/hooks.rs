use serde_json::Value;

/// What the publish pipeline needs from the Bridge (`spec.md` §4.5, §4.7).
/// Implemented by the `bridge` crate; the engine only ever sees this trait.
pub trait BridgeOutbound: Send + Sync {
    fn send_to_remote_device(&self, peer: &str, from_cid: &str, target_cid: &str, data: &Value) -> bool;

    fn send_to_remote_group(&self, peer: &str, from_cid: &str, target_group: &str, data: &Value) -> bool;

    fn broadcast_to_remote_group(&self, from_cid: &str, target_group: &str, data: &Value);

    /// Push share data to every peer that shares `sender_cid`, if federation
    /// is enabled (`spec.md` §4.7, share data push).
    fn push_share_data_if_needed(&self, sender_cid: &str, data: &Value);
}

/// What the publish pipeline needs to deliver locally over MQTT: emit a
/// publish to whatever session currently subscribes to `topic`
/// (`spec.md` §4.5, the `/device/{target}/r` / `/group/{name}/r` emits).
pub trait LocalRouter: Send + Sync {
    fn publish_local(&self, topic: &str, payload: &[u8]);
}
