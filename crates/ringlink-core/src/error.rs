//! Error types for overlay primitives.

use std::borrow::Cow;
use thiserror::Error;

/// Errors raised by the overlay primitives and collaborator traits
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Address text or bytes could not be decoded
    #[error("Invalid address: {0}")]
    InvalidAddress(Cow<'static, str>),

    /// The edge underneath a connection is closed
    #[error("Edge is closed")]
    EdgeClosed,

    /// A datagram could not be handed to the transport
    #[error("Send failed: {0}")]
    Send(Cow<'static, str>),

    /// A link attempt to a remote peer failed
    #[error("Link failed: {0}")]
    LinkFailed(Cow<'static, str>),

    /// No route or connection to the named peer
    #[error("No route to peer: {0}")]
    NoRoute(Cow<'static, str>),
}

impl CoreError {
    /// Returns true if the failure is routine churn rather than misuse
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::EdgeClosed | Self::Send(_) | Self::LinkFailed(_) | Self::NoRoute(_)
        )
    }
}
