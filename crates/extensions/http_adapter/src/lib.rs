//! HTTP compatibility layer (`spec.md` §4.8, §6): the device-facing
//! compatibility API and the bearer-guarded management API, both plain
//! `axum` routers mirroring the pack's `openclaw-server` shape and the
//! teacher's `{"message", "detail"}` envelope idiom.

mod auth;
mod device_api;
mod group_api;
mod peer_api;
mod response;
mod schedule_api;
mod state;
mod timeseries_api;
mod util;

use std::sync::Arc;

use axum::middleware;
use axum::Router;

pub use response::ApiError;
pub use state::AppState;

/// `/device/auth`, `/device/s`, `/device/r` — no authentication middleware;
/// every request carries its own `authKey`.
pub fn device_router(state: Arc<AppState>) -> Router {
    device_api::device_router(state)
}

/// Groups, timeseries, scheduler and peer-broker CRUD, all behind
/// `auth::require_management_token`.
pub fn management_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(group_api::group_router(state.clone()))
        .merge(timeseries_api::timeseries_router(state.clone()))
        .merge(schedule_api::schedule_router(state.clone()))
        .merge(peer_api::peer_router(state.clone()))
        .layer(middleware::from_fn_with_state(state, auth::require_management_token))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use axum::http::StatusCode;
    use broker_engine::BrokerEngine;
    use broker_engine::EngineConfig;
    use device_cache::DeviceCache;
    use identity_store::IdentityStore;
    use scheduler::Scheduler;
    use serde_json::json;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    #[derive(Default)]
    struct NullRouter;
    impl broker_engine::LocalRouter for NullRouter {
        fn publish_local(&self, _topic: &str, _payload: &[u8]) {}
    }

    #[derive(Default)]
    struct NullBridge;
    impl broker_engine::BridgeOutbound for NullBridge {
        fn send_to_remote_device(&self, _peer: &str, _from_cid: &str, _target_cid: &str, _data: &Value) -> bool {
            false
        }
        fn send_to_remote_group(&self, _peer: &str, _from_cid: &str, _target_group: &str, _data: &Value) -> bool {
            false
        }
        fn broadcast_to_remote_group(&self, _from_cid: &str, _target_group: &str, _data: &Value) {}
        fn push_share_data_if_needed(&self, _sender_cid: &str, _data: &Value) {}
    }

    fn test_state() -> Arc<AppState> {
        let store = Arc::new(IdentityStore::open_in_memory().unwrap());
        let cache = Arc::new(DeviceCache::new(0, 60_000));
        let scheduler = Arc::new(Scheduler::new());
        let engine = Arc::new(BrokerEngine::new(
            store.clone(),
            cache.clone(),
            Arc::new(NullBridge::default()),
            Arc::new(NullRouter::default()),
            EngineConfig {
                max_message_bytes: 64,
                federation_enabled: false,
                local_bridge_token: "unused".to_string(),
            },
        ));
        Arc::new(AppState {
            store,
            cache,
            engine,
            scheduler,
            bridge: None,
            user_token: None,
            max_message_bytes: 64,
        })
    }

    async fn send(router: Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router
            .oneshot(req)
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let state = test_state();
        let router = device_router(state);
        let (status1, body1) = send(router.clone(), "POST", "/device/auth", json!({"uuid": "uuid-1"})).await;
        assert_eq!(status1, StatusCode::OK);
        let auth_key1 = body1["detail"]["authKey"].as_str().unwrap().to_string();

        let (status2, body2) = send(router, "POST", "/device/auth", json!({"uuid": "uuid-1"})).await;
        assert_eq!(status2, StatusCode::OK);
        assert_eq!(body2["detail"]["authKey"].as_str().unwrap(), auth_key1);
    }

    async fn bootstrap_and_mint(router: &Router, uuid: &str, mode: &str) -> (String, String) {
        let (_, body) = send(router.clone(), "POST", "/device/auth", json!({"uuid": uuid})).await;
        let auth_key = body["detail"]["authKey"].as_str().unwrap().to_string();

        let req = Request::builder()
            .method("GET")
            .uri(format!("/device/auth?authKey={auth_key}&mode={mode}"))
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let client_id = body["detail"]["clientId"].as_str().unwrap().to_string();
        (auth_key, client_id)
    }

    #[tokio::test]
    async fn credential_minting_branches_on_mode() {
        let state = test_state();
        let router = device_router(state.clone());
        let (_, client_id) = bootstrap_and_mint(&router, "uuid-http", "http").await;
        assert!(state.cache.is_http_mode(&client_id));

        let (_, client_id2) = bootstrap_and_mint(&router, "uuid-mqtt", "mqtt").await;
        assert!(!state.cache.is_http_mode(&client_id2));
    }

    #[tokio::test]
    async fn publish_rejects_oversized_payload() {
        let state = test_state();
        let router = device_router(state);
        let (auth_key, _client_id) = bootstrap_and_mint(&router, "uuid-big", "http").await;

        let big = "x".repeat(200);
        let (status, body) = send(
            router,
            "POST",
            "/device/s",
            json!({"authKey": auth_key, "toDevice": "whoever", "data": {"v": big}}),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["message"], 1004);
    }

    #[tokio::test]
    async fn http_publish_does_not_reinject_to_mqtt_mode_target_over_http() {
        let state = test_state();
        let router = device_router(state.clone());
        let (_auth1, _cid1) = bootstrap_and_mint(&router, "uuid-a", "http").await;
        let (auth2, cid2) = bootstrap_and_mint(&router, "uuid-b", "mqtt").await;
        let _ = cid2;

        let (_, boot) = send(router.clone(), "POST", "/device/auth", json!({"uuid": "uuid-c"})).await;
        let auth3 = boot["detail"]["authKey"].as_str().unwrap().to_string();
        let req = Request::builder()
            .method("GET")
            .uri(format!("/device/auth?authKey={auth3}&mode=http"))
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let sender_client_id = body["detail"]["clientId"].as_str().unwrap().to_string();
        let _ = sender_client_id;

        let cid2_client_id = {
            let device = state.store.get_device_by_auth_key(&auth2).unwrap().unwrap();
            device.client_id.unwrap()
        };
        let (status, _) = send(
            router,
            "POST",
            "/device/s",
            json!({"authKey": auth3, "toDevice": cid2_client_id, "data": {}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn inbox_returns_and_clears_pending_messages() {
        let state = test_state();
        let router = device_router(state.clone());
        let (auth_sender, _) = bootstrap_and_mint(&router, "uuid-sender", "http").await;
        let (auth_recv, recv_client_id) = bootstrap_and_mint(&router, "uuid-recv", "http").await;

        let (status, _) = send(
            router.clone(),
            "POST",
            "/device/s",
            json!({"authKey": auth_sender, "toDevice": recv_client_id, "data": {"hello": 1}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let req = Request::builder()
            .method("GET")
            .uri(format!("/device/r?authKey={auth_recv}"))
            .body(Body::empty())
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["detail"]["count"], 1);

        let req2 = Request::builder()
            .method("GET")
            .uri(format!("/device/r?authKey={auth_recv}"))
            .body(Body::empty())
            .unwrap();
        let resp2 = router.oneshot(req2).await.unwrap();
        let bytes2 = axum::body::to_bytes(resp2.into_body(), usize::MAX).await.unwrap();
        let body2: Value = serde_json::from_slice(&bytes2).unwrap();
        assert_eq!(body2["detail"]["count"], 0);
    }

    fn test_state_with_token(token: &str) -> Arc<AppState> {
        let base = test_state();
        Arc::new(AppState {
            store: base.store.clone(),
            cache: base.cache.clone(),
            engine: base.engine.clone(),
            scheduler: base.scheduler.clone(),
            bridge: None,
            user_token: Some(token.to_string()),
            max_message_bytes: base.max_message_bytes,
        })
    }

    fn with_peer(mut req: Request<Body>, addr: SocketAddr) -> Request<Body> {
        req.extensions_mut().insert(axum::extract::ConnectInfo(addr));
        req
    }

    #[tokio::test]
    async fn management_token_rejects_wrong_bearer_from_remote_peer() {
        let state = test_state_with_token("secret-token");
        let router = management_router(state);
        let req = with_peer(
            Request::builder().uri("/groups").body(Body::empty()).unwrap(),
            "203.0.113.1:5555".parse().unwrap(),
        );
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn management_token_accepts_correct_bearer_from_remote_peer() {
        let state = test_state_with_token("secret-token");
        let router = management_router(state);
        let req = with_peer(
            Request::builder()
                .uri("/groups")
                .header("authorization", "Bearer secret-token")
                .body(Body::empty())
                .unwrap(),
            "203.0.113.1:5555".parse().unwrap(),
        );
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn management_token_bypassed_for_loopback_peer() {
        let state = test_state_with_token("secret-token");
        let router = management_router(state);
        let req = with_peer(
            Request::builder().uri("/groups").body(Body::empty()).unwrap(),
            "127.0.0.1:5555".parse().unwrap(),
        );
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
