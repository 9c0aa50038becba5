//! Durable identity and state storage: devices, groups, online/offline
//! status, federated peer brokers and time-series readings.
//!
//! Backed by a single sqlite connection behind a mutex, per `spec.md` §5's
//! "SQL engine is an implementation detail" latitude.

mod bridge_store;
mod devices;
mod error;
mod model;
mod schema;
mod store;
mod timeseries;

pub use error::Result;
pub use error::StoreError;
pub use model::BridgeSharedDevice;
pub use model::BrokerIdentity;
pub use model::Device;
pub use model::DeviceMode;
pub use model::DeviceStatus;
pub use model::Group;
pub use model::PeerBroker;
pub use model::SharePermission;
pub use model::TimeseriesPage;
pub use model::TimeseriesPoint;
pub use store::IdentityStore;
