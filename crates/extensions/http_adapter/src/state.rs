use std::sync::Arc;

use bridge::Bridge;
use broker_engine::BrokerEngine;
use device_cache::DeviceCache;
use identity_store::IdentityStore;
use scheduler::Scheduler;

/// Shared handles wired once at startup and cloned (as `Arc`s) into every
/// handler via axum's `State` extractor (teacher idiom: a single state struct
/// per router, `Router::with_state`).
pub struct AppState {
    pub store: Arc<IdentityStore>,
    pub cache: Arc<DeviceCache>,
    pub engine: Arc<BrokerEngine>,
    pub scheduler: Arc<Scheduler>,
    pub bridge: Option<Arc<Bridge>>,
    pub user_token: Option<String>,
    pub max_message_bytes: usize,
}
