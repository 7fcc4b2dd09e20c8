//! Collaborator traits implemented by the surrounding node.
//!
//! Subsystems such as the tunnel listener do not own transports, the ring
//! router, or the node's event loop. They reach those through the traits in
//! this module, which keeps them testable against an in-memory overlay.

use crate::address::Address;
use crate::connection::{Connection, ConnectionType};
use crate::error::CoreError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Sender able to route a payload through a chosen neighbour
pub trait OverlaySender: Send + Sync {
    /// Hand `payload` to `forwarder`, which relays it to `target`
    ///
    /// The receiving side sees the payload with a forwarded origin naming
    /// both the original source and `forwarder`.
    ///
    /// # Errors
    ///
    /// Returns an error if `forwarder` is not reachable.
    fn send_forwarding(
        &self,
        forwarder: &Address,
        target: &Address,
        payload: &[u8],
    ) -> Result<(), CoreError>;
}

/// Link-establishment layer
#[async_trait]
pub trait Linker: Send + Sync {
    /// Attempt a connection of `con_type` to `target`
    ///
    /// Resolves once the attempt has finished, successful or not. Success is
    /// observed through the connection table, which has already published
    /// the new connection by the time this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt could not be made or failed.
    async fn connect(&self, target: Address, con_type: ConnectionType) -> Result<(), CoreError>;

    /// Close `connection`, informing the peer of `reason`
    fn close(&self, connection: &Connection, reason: &str);
}

/// Deferred unit of work
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// The node's serialized event context
///
/// Completion callbacks are enqueued here rather than run on whichever task
/// finished the work.
pub trait ActionQueue: Send + Sync {
    /// Schedule `action` on the node's event context
    fn enqueue(&self, action: Action);
}

impl ActionQueue for mpsc::UnboundedSender<Action> {
    fn enqueue(&self, action: Action) {
        if self.send(action).is_err() {
            tracing::warn!("Action queue closed, dropping action");
        }
    }
}

/// Runs actions immediately on the calling task
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineActions;

impl ActionQueue for InlineActions {
    fn enqueue(&self, action: Action) {
        action();
    }
}

/// Network-coordinate latency estimates
pub trait LatencyOracle: Send + Sync {
    /// Measured round-trip latency to `address` in milliseconds, if known
    fn measured_latency(&self, address: &Address) -> Option<f64>;
}
