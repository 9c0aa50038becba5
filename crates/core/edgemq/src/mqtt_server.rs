//! The MQTT TCP listener (`spec.md` §4.3, §6): one task per connection,
//! driving the Broker Engine's `SessionPolicy` through CONNECT/PUBLISH/
//! SUBSCRIBE/UNSUBSCRIBE/PINGREQ/DISCONNECT, in the accept-loop-plus-
//! per-connection-task shape the pack's own hand-rolled broker example uses.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use broker_engine::AuthOutcome;
use broker_engine::BrokerEngine;
use broker_engine::PublishOutcome;
use broker_engine::SessionIdentity;
use broker_engine::SessionKind;
use broker_engine::SessionPolicy;
use bytes::BytesMut;
use device_cache::DeviceCache;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use topic_grammar::Route;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::frame;
use crate::frame::ClientPacket;
use crate::frame::FrameError;
use crate::router::ConnectionHandle;
use crate::router::OutboundEvent;
use crate::router::SubscriptionRegistry;

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub async fn serve(
    addr: SocketAddr,
    engine: Arc<BrokerEngine>,
    cache: Arc<DeviceCache>,
    registry: Arc<SubscriptionRegistry>,
    max_message_bytes: usize,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "mqtt listener bound");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("mqtt listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "failed to accept mqtt connection");
                        continue;
                    }
                };
                let engine = engine.clone();
                let cache = cache.clone();
                let registry = registry.clone();
                let cancel = cancel.child_token();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, engine, cache, registry, max_message_bytes, cancel).await {
                        debug!(%peer, error = ?e, "mqtt connection ended");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    engine: Arc<BrokerEngine>,
    cache: Arc<DeviceCache>,
    registry: Arc<SubscriptionRegistry>,
    max_message_bytes: usize,
    cancel: CancellationToken,
) -> Result<(), FrameError> {
    let mut buf = BytesMut::new();

    let (client_id, username, password, keep_alive) = match frame::read_packet(&mut stream, &mut buf, max_message_bytes).await? {
        Some(ClientPacket::Connect { client_id, username, password, keep_alive }) => {
            (client_id, username, String::from_utf8_lossy(&password).to_string(), keep_alive)
        }
        _ => return Err(FrameError::Protocol("expected CONNECT as first packet")),
    };

    let session = match engine.authenticate(&client_id, &username, &password) {
        AuthOutcome::Accepted(session) => session,
        AuthOutcome::Rejected => {
            stream.write_all(&frame::encode_connack(false)).await?;
            return Ok(());
        }
    };
    stream.write_all(&frame::encode_connack(true)).await?;
    info!(client_id = %session.client_id, %peer, "mqtt session connected");

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEvent>();
    registry.register(&session.client_id, tx.clone());
    cache.set_client_online(&session.client_id, ConnectionHandle::new(tx));
    engine.on_connected(&session);

    let result =
        connection_loop(&mut stream, &mut buf, &session, &engine, &registry, &mut rx, max_message_bytes, keep_alive, &cancel).await;

    engine.on_disconnected(&session);
    registry.remove(&session.client_id);
    info!(client_id = %session.client_id, %peer, "mqtt session disconnected");
    result
}

/// MQTT 3.1.1 §3.1.2.10: a client that sets a non-zero keepalive must be
/// disconnected if the server hasn't seen a packet from it within 1.5x that
/// interval; `keep_alive == 0` means no timeout is enforced.
fn keepalive_deadline(keep_alive: u16) -> Option<Duration> {
    if keep_alive == 0 {
        None
    } else {
        Some(Duration::from_millis(keep_alive as u64 * 1500))
    }
}

#[allow(clippy::too_many_arguments)]
async fn connection_loop(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    session: &SessionIdentity,
    engine: &Arc<BrokerEngine>,
    registry: &Arc<SubscriptionRegistry>,
    rx: &mut mpsc::UnboundedReceiver<OutboundEvent>,
    max_message_bytes: usize,
    keep_alive: u16,
    cancel: &CancellationToken,
) -> Result<(), FrameError> {
    let idle_timeout = keepalive_deadline(keep_alive);
    let mut deadline = idle_timeout.map(|d| tokio::time::Instant::now() + d);

    loop {
        let idle = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),

            _ = idle => {
                debug!(client_id = %session.client_id, keep_alive, "keepalive expired, closing connection");
                return Ok(());
            }

            outbound = rx.recv() => {
                match outbound {
                    Some(OutboundEvent::Publish { topic, payload }) => {
                        stream.write_all(&frame::encode_publish(&topic, &payload)).await?;
                    }
                    Some(OutboundEvent::Close) | None => return Ok(()),
                }
            }

            packet = frame::read_packet(stream, buf, max_message_bytes) => {
                let packet = match packet? {
                    Some(packet) => packet,
                    None => return Ok(()),
                };
                if let Some(d) = idle_timeout {
                    deadline = Some(tokio::time::Instant::now() + d);
                }
                match packet {
                    ClientPacket::Publish { topic, payload } => {
                        let outcome = dispatch_publish(engine, session, &topic, &payload);
                        if outcome == PublishOutcome::ViolationClose {
                            return Ok(());
                        }
                    }
                    ClientPacket::Subscribe { pkid, filters } => {
                        let mut accepted = Vec::with_capacity(filters.len());
                        for filter in &filters {
                            let route = Route::classify(filter);
                            let ok = engine.authorize_subscribe(session, &route);
                            if ok {
                                registry.subscribe(&session.client_id, filter);
                            }
                            accepted.push(ok);
                        }
                        stream.write_all(&frame::encode_suback(pkid, &accepted)).await?;
                    }
                    ClientPacket::Unsubscribe { pkid, filters } => {
                        for filter in &filters {
                            registry.unsubscribe(&session.client_id, filter);
                        }
                        stream.write_all(&frame::encode_unsuback(pkid)).await?;
                    }
                    ClientPacket::PingReq => {
                        stream.write_all(&frame::encode_pingresp()).await?;
                    }
                    ClientPacket::Disconnect => return Ok(()),
                    ClientPacket::Connect { .. } => {
                        return Err(FrameError::Protocol("unexpected second CONNECT"));
                    }
                }
            }
        }
    }
}

fn dispatch_publish(engine: &Arc<BrokerEngine>, session: &SessionIdentity, topic: &str, payload: &[u8]) -> PublishOutcome {
    match &session.kind {
        SessionKind::Bridge => engine.handle_bridge_publish(session, topic, payload, now_ms()),
        SessionKind::Device { .. } => engine.handle_device_publish(session, topic, payload, now_ms()),
    }
}
