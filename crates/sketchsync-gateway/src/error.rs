use thiserror::Error;

use sketchsync_canvas::CanvasError;
use sketchsync_core::protocol::ProtocolError;

use crate::channel::SessionId;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The destination's connection is gone; the frame was dropped.
    #[error("Channel {0} is closed")]
    ChannelClosed(SessionId),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Canvas(#[from] CanvasError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
