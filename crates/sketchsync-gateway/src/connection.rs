//! WebSocket connection lifecycle: wrap the socket, pump frames both ways.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{CommandChannel, Frame, SessionId};
use crate::state::GatewayState;

/// Handle a new WebSocket connection until either side closes it.
pub async fn handle_ws_connection(state: Arc<GatewayState>, ws: WebSocket) {
    let (channel, mut outbound) = CommandChannel::new(SessionId::next());
    let session_id = channel.id();
    info!(session_id = %session_id, "New WebSocket connection");

    let (mut ws_tx, mut ws_rx) = ws.split();

    if let Err(e) = state.sync.attach(&channel) {
        warn!(session_id = %session_id, error = %e, "Could not greet client");
        channel.close();
        return;
    }

    // Writer task: the only place that touches the socket's sink.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let msg = match frame {
                Frame::Text(text) => Message::Text(text.into()),
                Frame::Binary(bytes) => Message::Binary(bytes.into()),
                Frame::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            };
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Main read loop
    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if let Err(e) = channel.receive_text(text.as_str()) {
                    warn!(session_id = %session_id, error = %e, "Dropping malformed frame");
                }
            }
            Ok(Message::Binary(bytes)) => {
                debug!(session_id = %session_id, len = bytes.len(), "Ignoring binary frame from client");
            }
            Ok(Message::Close(_)) => {
                debug!(session_id = %session_id, "Client requested close");
                break;
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
            // Axum answers pings itself.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
        }
    }

    channel.close();
    drain_writer(send_task, WRITER_DRAIN_TIMEOUT).await;
    info!(session_id = %session_id, "WebSocket connection closed");
}

/// How long the writer gets to flush queued frames, the close frame
/// included, once the read side is done.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Wait for the writer task to finish, aborting it after `grace`.
async fn drain_writer(mut send_task: JoinHandle<()>, grace: Duration) {
    if tokio::time::timeout(grace, &mut send_task).await.is_err() {
        debug!("Writer did not drain in time; aborting");
        send_task.abort();
    }
}
