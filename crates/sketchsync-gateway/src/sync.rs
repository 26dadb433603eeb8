//! The sync protocol: apply inbound commands to the canvas and relay them.
//!
//! Every command runs inside one critical section covering the canvas
//! mutation and the enqueueing of its broadcast. Outbound queues are ordered,
//! so every joined session observes mutations in the same global order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::json;
use tracing::{debug, info, warn};

use sketchsync_canvas::store::next_snapshot_name;
use sketchsync_canvas::{Color, DrawSurface, SnapshotStore};
use sketchsync_core::protocol::{CMD_HI, CMD_JOIN, Command, Envelope, JoinReply, Point};

use crate::channel::{ChannelEvent, CommandChannel, EVENT_CLOSE, EVENT_DATA, SessionId};
use crate::error::Result;
use crate::registry::{BroadcastReport, SessionRegistry};

/// What handling one inbound envelope did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Session registered and bootstrapped.
    Joined,
    /// Already-joined session asked again; size and snapshot were re-sent.
    Resynced,
    /// Canvas mutated and the command relayed to peers.
    Applied(BroadcastReport),
    /// Unknown command; nothing happened.
    Ignored,
}

struct SyncState {
    surface: Box<dyn DrawSurface>,
    sessions: SessionRegistry,
}

/// Owns the shared canvas and the session registry.
pub struct SyncController {
    state: Mutex<SyncState>,
    store: Arc<dyn SnapshotStore>,
}

impl SyncController {
    pub fn new(surface: Box<dyn DrawSurface>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            state: Mutex::new(SyncState {
                surface,
                sessions: SessionRegistry::new(),
            }),
            store,
        }
    }

    // No code path panics while holding the lock, but if one ever does the
    // canvas is still usable.
    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wire a freshly accepted channel to this controller and greet it.
    pub fn attach(self: &Arc<Self>, channel: &Arc<CommandChannel>) -> Result<()> {
        let controller: Weak<Self> = Arc::downgrade(self);
        channel
            .events()
            .subscribe(EVENT_DATA, Some("sync-controller"), move |event| {
                let ChannelEvent::Data { envelope, channel } = event else {
                    return Ok(());
                };
                if let Some(controller) = controller.upgrade() {
                    controller.handle(envelope, channel)?;
                }
                Ok(())
            });

        let controller: Weak<Self> = Arc::downgrade(self);
        channel
            .events()
            .subscribe_once(EVENT_CLOSE, Some("sync-controller"), move |event| {
                if let (ChannelEvent::Closed { session }, Some(controller)) =
                    (event, controller.upgrade())
                {
                    controller.detach(*session);
                }
                Ok(())
            });

        #[cfg(feature = "metrics")]
        crate::metrics::record_connect();

        channel.send(CMD_HI, None)
    }

    /// Forget a session. Safe to call for sessions that never joined.
    pub fn detach(&self, session: SessionId) {
        let removed = self.lock().sessions.remove(session).is_some();
        if removed {
            info!(session_id = %session, "Session left");
        }

        #[cfg(feature = "metrics")]
        crate::metrics::record_disconnect();
    }

    /// Apply one inbound envelope from `channel`.
    pub fn handle(&self, envelope: &Envelope, channel: &Arc<CommandChannel>) -> Result<Outcome> {
        let command = Command::decode(envelope)?;

        #[cfg(feature = "metrics")]
        crate::metrics::record_command(command.name());

        let mut state = self.lock();
        match command {
            Command::Join => return self.join(&mut state, channel),
            Command::Line(line) => {
                let color: Color = line.color.parse()?;
                state.surface.draw_line(line.from, line.to, color, line.size);
            }
            Command::Dot(dot) => {
                let color: Color = dot.color.parse()?;
                let half = dot.size / 2.0;
                let corner = Point::new(dot.pos.x - half, dot.pos.y - half);
                state.surface.fill_circle(corner, dot.size, color);
            }
            Command::Erase(erase) => {
                let background = state.surface.background();
                state
                    .surface
                    .draw_line(erase.from, erase.to, background, erase.size);
            }
            Command::Clear => {
                match state.surface.capture_snapshot() {
                    Ok(bytes) => self.store.persist(bytes, next_snapshot_name()),
                    Err(e) => warn!(error = %e, "Could not capture snapshot before clear"),
                }
                let background = state.surface.background();
                state.surface.fill(background);
            }
            Command::Unknown(name) => {
                debug!(session_id = %channel.id(), command = %name, "Ignoring unknown command");
                return Ok(Outcome::Ignored);
            }
        }

        let report = state.sessions.broadcast(envelope, Some(channel.id()))?;

        #[cfg(feature = "metrics")]
        crate::metrics::record_delivery_failures(report.failed.len());

        Ok(Outcome::Applied(report))
    }

    fn join(&self, state: &mut SyncState, channel: &Arc<CommandChannel>) -> Result<Outcome> {
        let is_new = state.sessions.add(Arc::clone(channel));
        let (width, height) = state.surface.size();

        let sent = channel
            .send(CMD_JOIN, Some(json!(JoinReply { size: [width, height] })))
            .and_then(|()| {
                let bytes = state.surface.capture_snapshot()?;
                channel.send_binary(bytes.clone())?;
                Ok(bytes)
            });

        let bytes = match sent {
            Ok(bytes) => bytes,
            Err(e) => {
                state.sessions.remove(channel.id());
                return Err(e);
            }
        };

        if !is_new {
            debug!(session_id = %channel.id(), "Session re-joined; resent snapshot");
            return Ok(Outcome::Resynced);
        }

        self.store.persist(bytes, next_snapshot_name());
        info!(
            session_id = %channel.id(),
            sessions = state.sessions.len(),
            "Session joined"
        );
        Ok(Outcome::Joined)
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.lock().surface.size()
    }

    /// Encoded snapshot of the canvas as it is right now.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(self.lock().surface.capture_snapshot()?)
    }
}
