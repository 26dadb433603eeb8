//! One client connection, seen as a stream of command envelopes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use sketchsync_core::events::{EmitReport, EventDispatcher};
use sketchsync_core::protocol::{Envelope, ProtocolError};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{GatewayError, Result};

/// Emitted for every well-formed inbound envelope.
pub const EVENT_DATA: &str = "data";
/// Emitted once when the connection goes away.
pub const EVENT_CLOSE: &str = "close";

/// Process-unique identity of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// An outbound wire frame, queued for the connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One serialized envelope.
    Text(String),
    /// Raw snapshot bytes. Never carries an envelope.
    Binary(Vec<u8>),
    Close,
}

/// Arguments passed to channel event handlers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Data {
        envelope: Envelope,
        channel: Arc<CommandChannel>,
    },
    Closed {
        session: SessionId,
    },
}

/// Wraps one duplex connection.
///
/// Inbound text frames are parsed into [`Envelope`]s and dispatched as
/// [`EVENT_DATA`]. Outbound frames go into an unbounded queue drained by a
/// per-connection writer task, so a send never blocks the caller.
pub struct CommandChannel {
    id: SessionId,
    outbound: mpsc::UnboundedSender<Frame>,
    events: EventDispatcher<ChannelEvent>,
    closed: AtomicBool,
}

impl fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandChannel")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl CommandChannel {
    /// Create a channel and the receiving end of its outbound queue.
    pub fn new(id: SessionId) -> (Arc<Self>, mpsc::UnboundedReceiver<Frame>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            id,
            outbound,
            events: EventDispatcher::with_events(&[EVENT_DATA, EVENT_CLOSE]),
            closed: AtomicBool::new(false),
        });
        (channel, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn events(&self) -> &EventDispatcher<ChannelEvent> {
        &self.events
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Handle one inbound text frame.
    ///
    /// A frame that is not a valid envelope is returned as
    /// [`ProtocolError::MalformedEnvelope`] and nothing is dispatched.
    pub fn receive_text(self: &Arc<Self>, frame: &str) -> std::result::Result<EmitReport, ProtocolError> {
        let envelope = Envelope::decode(frame)?;
        debug!(session_id = %self.id, command = %envelope.command, "Inbound command");
        Ok(self.events.emit(
            EVENT_DATA,
            &ChannelEvent::Data {
                envelope,
                channel: Arc::clone(self),
            },
        ))
    }

    /// Serialize `{command, data}` and queue it as one text frame.
    pub fn send(&self, command: &str, data: Option<serde_json::Value>) -> Result<()> {
        self.send_envelope(&Envelope::new(command, data))
    }

    pub fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        self.send_text(envelope.encode()?)
    }

    /// Queue an already-serialized envelope.
    pub fn send_text(&self, text: String) -> Result<()> {
        self.push(Frame::Text(text))
    }

    /// Queue a raw binary frame, bypassing envelope framing.
    pub fn send_binary(&self, bytes: Vec<u8>) -> Result<()> {
        self.push(Frame::Binary(bytes))
    }

    fn push(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(GatewayError::ChannelClosed(self.id));
        }
        self.outbound
            .send(frame)
            .map_err(|_| GatewayError::ChannelClosed(self.id))
    }

    /// Mark the channel closed and notify [`EVENT_CLOSE`] subscribers.
    /// Only the first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.outbound.send(Frame::Close);
        self.events
            .emit(EVENT_CLOSE, &ChannelEvent::Closed { session: self.id });
        debug!(session_id = %self.id, "Channel closed");
    }
}
