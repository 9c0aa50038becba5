//! Topic and address primitives shared by the broker engine, the bridge and
//! the HTTP adapter.
//!
//! `Topic` / `TopicFilter` are adapted from the reference MQTT client's topic
//! module, trimmed to the matching this broker actually does (wildcard
//! matching against the fixed topic tree, no QoS negotiation); `grammar` and
//! `address` are new, encoding the fixed topic tree and the
//! `brokerId:localId` addressing scheme this broker defines.

mod address;
mod grammar;
mod protocol;
mod topics;

pub use address::parse_remote_address;
pub use address::RemoteAddress;
pub use grammar::bridge_device_topic;
pub use grammar::bridge_group_topic;
pub use grammar::bridge_share_data_topic;
pub use grammar::bridge_share_sync_topic;
pub use grammar::device_recv_topic;
pub use grammar::device_send_topic;
pub use grammar::group_recv_topic;
pub use grammar::group_send_topic;
pub use grammar::Route;
pub use protocol::BridgeGroupMessage;
pub use protocol::BridgeMessage;
pub use protocol::BridgeShareDataMessage;
pub use protocol::BridgeShareSyncMessage;
pub use protocol::DevicePublishBody;
pub use protocol::ForwardMessage;
pub use protocol::SharedDeviceDescriptor;
pub use topics::Topic;
pub use topics::TopicFilter;
