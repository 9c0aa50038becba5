/// What authentication bound a live MQTT session to (`spec.md` §4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionKind {
    /// A peer-broker connection, authenticated with the reserved
    /// `__bridge_` client-id prefix and the local bridge token.
    Bridge,
    /// An ordinary device session, bound to one Identity Store row.
    Device { device_id: i64, uuid: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionIdentity {
    pub client_id: String,
    pub kind: SessionKind,
}

impl SessionIdentity {
    pub fn is_bridge(&self) -> bool {
        matches!(self.kind, SessionKind::Bridge)
    }

    pub fn device_uuid(&self) -> Option<&str> {
        match &self.kind {
            SessionKind::Device { uuid, .. } => Some(uuid.as_str()),
            SessionKind::Bridge => None,
        }
    }
}

/// Outcome of the `CONNECT`-time authentication check (`spec.md` §4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Accepted(SessionIdentity),
    Rejected,
}
