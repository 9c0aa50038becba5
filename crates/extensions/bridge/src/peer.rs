use std::sync::Arc;
use std::time::Duration;

use broker_engine::BrokerEngine;
use broker_engine::SessionIdentity;
use broker_engine::SessionKind;
use parking_lot::RwLock;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio_util::sync::CancellationToken;
use topic_grammar::bridge_share_sync_topic;
use tracing::debug;
use tracing::warn;

use crate::state::PeerState;

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// `spec.md` §4.7, line 166: the bridge client keeps a 60 s keepalive.
const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// The four subscriptions a connected bridge client needs so inbound
/// federation (device/group delivery, share-sync, share-data) flows back
/// over this same connection (`spec.md` §4.7, line 166).
fn inbound_filters(local_broker_id: &str) -> [String; 4] {
    [
        "/bridge/device/+".to_string(),
        "/bridge/group/+".to_string(),
        bridge_share_sync_topic(local_broker_id),
        format!("/bridge/share/data/{local_broker_id}/+"),
    ]
}

/// Everything the outbound side of the Bridge needs to reach one peer broker
/// (`spec.md` §4.7). The connected [`AsyncClient`] is swapped in once the
/// handshake completes and cleared on disconnect so `try_publish` calls made
/// while reconnecting fail fast instead of queueing indefinitely.
pub struct PeerHandle {
    pub broker_id: String,
    client: RwLock<Option<AsyncClient>>,
    state: RwLock<PeerState>,
    cancel: CancellationToken,
}

impl PeerHandle {
    pub fn state(&self) -> PeerState {
        *self.state.read()
    }

    pub fn client(&self) -> Option<AsyncClient> {
        self.client.read().clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    fn set_state(&self, state: PeerState) {
        *self.state.write() = state;
    }

    fn set_client(&self, client: Option<AsyncClient>) {
        *self.client.write() = client;
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    match rest.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(1883)),
        None => (rest.to_string(), 1883),
    }
}

/// Spawn the reconnect-loop task owning the outbound connection to one peer
/// (`spec.md` §4.7). `local_client_id` is `__bridge_{ourBrokerId}`;
/// `local_broker_id` is the bare id, used to build our own inbound
/// subscriptions; `token` is our own bridge token, presented as the MQTT
/// password.
pub fn spawn(
    broker_id: String,
    url: String,
    token: String,
    local_client_id: String,
    local_broker_id: String,
    reconnect_ms: u64,
    engine: Arc<RwLock<Option<Arc<BrokerEngine>>>>,
) -> Arc<PeerHandle> {
    let handle = Arc::new(PeerHandle {
        broker_id: broker_id.clone(),
        client: RwLock::new(None),
        state: RwLock::new(PeerState::Disconnected),
        cancel: CancellationToken::new(),
    });

    let task_handle = handle.clone();
    tokio::spawn(async move {
        run(task_handle, broker_id, url, token, local_client_id, local_broker_id, reconnect_ms, engine).await;
    });

    handle
}

async fn run(
    handle: Arc<PeerHandle>,
    broker_id: String,
    url: String,
    token: String,
    local_client_id: String,
    local_broker_id: String,
    reconnect_ms: u64,
    engine: Arc<RwLock<Option<Arc<BrokerEngine>>>>,
) {
    let (host, port) = parse_host_port(&url);
    loop {
        if handle.cancel.is_cancelled() {
            return;
        }
        handle.set_state(PeerState::Connecting);

        let mut options = MqttOptions::new(local_client_id.clone(), host.clone(), port);
        options.set_credentials("__bridge_", token.clone());
        options.set_keep_alive(KEEP_ALIVE);
        let (client, mut eventloop) = AsyncClient::new(options, 64);

        let connected = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return true,
                    Ok(_) => continue,
                    Err(_) => return false,
                }
            }
        })
        .await
        .unwrap_or(false);

        if !connected {
            handle.set_state(PeerState::Disconnected);
            if wait_or_stop(&handle, reconnect_ms).await {
                return;
            }
            continue;
        }

        debug!(broker_id, "bridge peer connected");
        for filter in inbound_filters(&local_broker_id) {
            if let Err(e) = client.subscribe(filter.clone(), QoS::AtMostOnce).await {
                warn!(broker_id, filter, error = %e, "failed to subscribe on bridge connection");
            }
        }
        handle.set_state(PeerState::Connected);
        handle.set_client(Some(client));

        let inbound_session = SessionIdentity {
            client_id: local_client_id.clone(),
            kind: SessionKind::Bridge,
        };

        loop {
            tokio::select! {
                _ = handle.cancel.cancelled() => {
                    handle.set_client(None);
                    handle.set_state(PeerState::Disconnected);
                    return;
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::Disconnect)) | Err(_) => {
                            warn!(broker_id, "bridge peer connection lost");
                            break;
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            if let Some(engine) = engine.read().clone() {
                                engine.handle_bridge_publish(&inbound_session, &publish.topic, &publish.payload, now_ms());
                            }
                        }
                        Ok(_) => {}
                    }
                }
            }
        }

        handle.set_client(None);
        handle.set_state(PeerState::Disconnected);
        if wait_or_stop(&handle, reconnect_ms).await {
            return;
        }
    }
}

/// Returns `true` if cancellation won the race and the caller should stop.
async fn wait_or_stop(handle: &PeerHandle, reconnect_ms: u64) -> bool {
    tokio::select! {
        _ = handle.cancel.cancelled() => true,
        _ = tokio::time::sleep(Duration::from_millis(reconnect_ms)) => false,
    }
}

pub fn publish(client: &AsyncClient, topic: String, payload: Vec<u8>) -> bool {
    client.try_publish(topic, QoS::AtMostOnce, false, payload).is_ok()
}
