//! Wires every crate in the workspace into one running broker (`spec.md`
//! §5, §6 Startup invariants & graceful shutdown ordering).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use bridge::Bridge;
use broker_engine::BrokerEngine;
use broker_engine::EngineConfig;
use device_cache::DeviceCache;
use http_adapter::AppState;
use identity_store::IdentityStore;
use scheduler::Scheduler;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::mqtt_server;
use crate::router::SubscriptionRegistry;
use crate::settings::Settings;

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub struct Application {
    settings: Settings,
    state: Arc<AppState>,
    registry: Arc<SubscriptionRegistry>,
    bridge: Option<Arc<Bridge>>,
    cancel: CancellationToken,
}

impl Application {
    pub fn build(settings: Settings) -> anyhow::Result<Application> {
        let store = Arc::new(match &settings.db_path {
            Some(path) => IdentityStore::open(path)?,
            None => IdentityStore::open_in_memory()?,
        });

        let identity = store.load_or_init_broker_identity()?;
        let broker_id = settings.broker_id.clone().unwrap_or(identity.broker_id);
        let bridge_token = settings.bridge_token.clone().unwrap_or(identity.bridge_token);

        let cache = Arc::new(DeviceCache::new(settings.publish_rate_limit, settings.message_expire_time));
        let scheduler = Arc::new(Scheduler::new());
        let registry = Arc::new(SubscriptionRegistry::new());

        let bridge = if settings.bridge_enabled {
            Some(Arc::new(Bridge::new(
                broker_id.clone(),
                store.clone(),
                cache.clone(),
                settings.bridge_reconnect_interval,
            )))
        } else {
            None
        };

        let bridge_outbound: Arc<dyn broker_engine::BridgeOutbound> = match &bridge {
            Some(b) => b.clone(),
            None => Arc::new(NoBridge),
        };
        let router: Arc<dyn broker_engine::LocalRouter> = registry.clone();

        let engine = Arc::new(BrokerEngine::new(
            store.clone(),
            cache.clone(),
            bridge_outbound,
            router,
            EngineConfig {
                max_message_bytes: settings.message_max_length,
                federation_enabled: settings.bridge_enabled,
                local_bridge_token: bridge_token,
            },
        ));

        if let Some(bridge) = &bridge {
            bridge.set_engine(engine.clone());
        }

        let state = Arc::new(AppState {
            store,
            cache,
            engine,
            scheduler,
            bridge: bridge.clone(),
            user_token: settings.user_token.clone(),
            max_message_bytes: settings.message_max_length,
        });

        Ok(Application {
            settings,
            state,
            registry,
            bridge,
            cancel: CancellationToken::new(),
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        if let Some(bridge) = &self.bridge {
            bridge.reload_remotes();
        }

        let scheduler_router: Arc<dyn broker_engine::LocalRouter> = self.registry.clone();
        let scheduler_task = tokio::spawn(scheduler::run(
            self.state.scheduler.clone(),
            self.state.cache.clone(),
            scheduler_router,
            1000,
            self.cancel.clone(),
        ));

        let cleanup_task = tokio::spawn(cleanup_loop(
            self.state.cache.clone(),
            self.state.store.clone(),
            self.settings.cache_cleanup_interval,
            self.settings.timeseries_retention_days,
            self.cancel.clone(),
        ));

        let mqtt_task = tokio::spawn(mqtt_server::serve(
            self.settings.mqtt_addr(),
            self.state.engine.clone(),
            self.state.cache.clone(),
            self.registry.clone(),
            self.settings.message_max_length,
            self.cancel.clone(),
        ));

        let device_addr = std::net::SocketAddr::new(self.settings.mqtt_host, self.settings.http_port);
        let device_router = http_adapter::device_router(self.state.clone());
        let device_listener = tokio::net::TcpListener::bind(device_addr).await?;
        info!(addr = %device_addr, "device http listener bound");
        let device_cancel = self.cancel.clone();
        let device_task = tokio::spawn(async move {
            axum::serve(device_listener, device_router)
                .with_graceful_shutdown(async move { device_cancel.cancelled().await })
                .await
        });

        let mgmt_addr = std::net::SocketAddr::new(self.settings.mqtt_host, self.settings.management_port);
        let mgmt_router: IntoMakeServiceWithConnectInfo<axum::Router, std::net::SocketAddr> =
            http_adapter::management_router(self.state.clone()).into_make_service_with_connect_info::<std::net::SocketAddr>();
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;
        info!(addr = %mgmt_addr, "management http listener bound");
        let mgmt_cancel = self.cancel.clone();
        let mgmt_task = tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_router)
                .with_graceful_shutdown(async move { mgmt_cancel.cancelled().await })
                .await
        });

        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received");
        self.cancel.cancel();

        let _ = scheduler_task.await;
        cleanup_task.abort();
        let _ = mqtt_task.await;
        let _ = device_task.await;
        let _ = mgmt_task.await;
        Ok(())
    }
}

#[derive(Default)]
struct NoBridge;

impl broker_engine::BridgeOutbound for NoBridge {
    fn send_to_remote_device(&self, _peer: &str, _from_cid: &str, _target_cid: &str, _data: &serde_json::Value) -> bool {
        false
    }
    fn send_to_remote_group(&self, _peer: &str, _from_cid: &str, _target_group: &str, _data: &serde_json::Value) -> bool {
        false
    }
    fn broadcast_to_remote_group(&self, _from_cid: &str, _target_group: &str, _data: &serde_json::Value) {}
    fn push_share_data_if_needed(&self, _sender_cid: &str, _data: &serde_json::Value) {}
}

async fn cleanup_loop(
    cache: Arc<DeviceCache>,
    store: Arc<IdentityStore>,
    cleanup_interval_ms: u64,
    retain_days: i64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(cleanup_interval_ms));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                cache.clean_expired_messages(now_ms());
                if let Err(e) = store.sweep_timeseries_retention(retain_days, now_ms()) {
                    warn!(error = %e, "timeseries retention sweep failed");
                }
            }
        }
    }
}
