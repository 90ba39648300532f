use serde::Serialize;

/// Structured audit events emitted across all Memberkit crates.
///
/// Session ids are rendered as hex; tokens and key material never appear.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionMinted {
        session_id: String,
        expires_at: String,
    },
    SessionRejected {
        reason: String,
        source: String,
    },
    IdentityStored {
        session_id: String,
        kind: String,
        roles: usize,
    },
    IdentityDeleted {
        session_id: String,
        existed: bool,
    },
    LockTakeover {
        resource: String,
        previous_holder: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "mk_event");
    }
}
