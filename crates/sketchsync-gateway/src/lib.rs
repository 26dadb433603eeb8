//! WebSocket sync server for the shared canvas.
//!
//! Each connection is wrapped in a [`CommandChannel`]; the [`SyncController`]
//! subscribes to its events, applies drawing commands to the canvas, and
//! relays them to every other joined session through the [`SessionRegistry`].

pub mod channel;
pub mod connection;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod registry;
pub mod server;
pub mod state;
pub mod sync;

pub use channel::{ChannelEvent, CommandChannel, Frame, SessionId};
pub use error::{GatewayError, Result};
pub use registry::{BroadcastReport, SessionRegistry};
pub use server::{router, serve, start_gateway};
pub use state::GatewayState;
pub use sync::{Outcome, SyncController};
