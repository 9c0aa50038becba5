/// A handle onto a live MQTT session, able to force it closed.
///
/// The Device Cache never talks to sockets directly; it only ever holds this
/// trait object, registered by the Broker Engine at `setClientOnline` time and
/// invoked when an ACL, rate or size violation requires closing the session
/// (`spec.md` §4.4 violation policy).
pub trait SessionHandle: Send + Sync {
    fn close(&self);
}
