use topic_grammar::Route;

use crate::session::AuthOutcome;
use crate::session::SessionIdentity;

/// The capability set the Broker Engine needs from whatever authenticates and
/// authorizes sessions (`spec.md` §9, "From callback-based MQTT hooks to typed
/// contracts"). The engine decides whether a violation closes the session; an
/// implementor of this trait only answers allow/deny.
pub trait SessionPolicy: Send + Sync {
    fn authenticate(&self, client_id: &str, username: &str, password: &str) -> AuthOutcome;

    fn authorize_publish(&self, session: &SessionIdentity, route: &Route) -> bool;

    fn authorize_subscribe(&self, session: &SessionIdentity, route: &Route) -> bool;

    fn on_connected(&self, session: &SessionIdentity);

    fn on_disconnected(&self, session: &SessionIdentity);
}
