//! The set of joined sessions.

use std::sync::Arc;

use sketchsync_core::protocol::Envelope;
use tracing::{debug, warn};

use crate::channel::{CommandChannel, SessionId};
use crate::error::Result;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Sessions whose channel rejected the frame. They have been removed.
    pub failed: Vec<SessionId>,
}

/// Live sessions keyed by [`SessionId`], kept in join order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<(SessionId, Arc<CommandChannel>)>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. Returns `false` if it is already registered.
    pub fn add(&mut self, channel: Arc<CommandChannel>) -> bool {
        let id = channel.id();
        if self.contains(id) {
            return false;
        }
        self.sessions.push((id, channel));
        true
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Arc<CommandChannel>> {
        let pos = self.sessions.iter().position(|(sid, _)| *sid == id)?;
        Some(self.sessions.remove(pos).1)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.iter().any(|(sid, _)| *sid == id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|(id, _)| *id).collect()
    }

    /// Send `envelope` to every session except `exclude`, in join order.
    ///
    /// The envelope is serialized once. A session that cannot take the frame
    /// is logged and dropped from the registry; delivery to the others goes on.
    pub fn broadcast(
        &mut self,
        envelope: &Envelope,
        exclude: Option<SessionId>,
    ) -> Result<BroadcastReport> {
        let text = envelope.encode()?;
        let mut report = BroadcastReport::default();

        for (id, channel) in &self.sessions {
            if Some(*id) == exclude {
                continue;
            }
            match channel.send_text(text.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Broadcast delivery failed");
                    report.failed.push(*id);
                }
            }
        }

        if !report.failed.is_empty() {
            self.sessions.retain(|(id, _)| !report.failed.contains(id));
        }

        debug!(
            command = %envelope.command,
            delivered = report.delivered,
            failed = report.failed.len(),
            "Broadcast"
        );
        Ok(report)
    }
}
