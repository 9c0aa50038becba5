use topic_grammar::Route;

use crate::session::SessionIdentity;

/// Topic ACL of `spec.md` §4.4, evaluated against an already-classified
/// [`Route`]. `is_member` checks group membership (cache-first, store
/// fallback is the caller's concern, per §4.4).
pub fn can_publish(
    session: &SessionIdentity,
    route: &Route,
    is_member: impl FnOnce(&str) -> bool,
) -> bool {
    if session.is_bridge() {
        return route.is_bridge();
    }
    match route {
        Route::DeviceSend { client_id } => *client_id == session.client_id,
        Route::DeviceRecv { .. } => false,
        Route::GroupSend { name } | Route::GroupRecv { name } => is_member(name),
        Route::BridgeDevice { .. }
        | Route::BridgeGroup { .. }
        | Route::BridgeShareSync { .. }
        | Route::BridgeShareData { .. } => false,
        Route::Unknown => false,
    }
}

pub fn can_subscribe(
    session: &SessionIdentity,
    route: &Route,
    is_member: impl FnOnce(&str) -> bool,
) -> bool {
    if session.is_bridge() {
        return route.is_bridge();
    }
    match route {
        Route::DeviceRecv { client_id } => *client_id == session.client_id,
        Route::DeviceSend { .. } => false,
        Route::GroupSend { name } | Route::GroupRecv { name } => is_member(name),
        Route::BridgeDevice { .. }
        | Route::BridgeGroup { .. }
        | Route::BridgeShareSync { .. }
        | Route::BridgeShareData { .. } => false,
        Route::Unknown => false,
    }
}
