//! Error types for the tunnel subsystem
//!
//! Outcomes that are normal churn (an inbound packet for an edge that has
//! already closed, a sync RPC nobody answered) are not errors here; they are
//! reported as [`crate::listener::InboundOutcome::Dropped`] or degrade to "no
//! overlap". Setting an edge's remote id twice is a programming error and
//! panics instead of producing a variant.

use ringlink_core::CoreError;
use std::borrow::Cow;
use thiserror::Error;

/// Errors that can occur in tunnel operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TunnelError {
    // ============ Addressing Errors ============
    /// Tunnel address text could not be parsed
    #[error("Invalid tunnel address: {0}")]
    InvalidAddress(Cow<'static, str>),

    /// Frame shorter than its fixed header
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    // ============ Edge Creation Errors ============
    /// No overlap could be found or manufactured
    #[error("Not enough forwarders!")]
    NotEnoughForwarders,

    /// A direct connection to the target already exists
    #[error("Direct connection to target already exists")]
    DirectConnectionExists,

    /// First-contact packet did not come through a forwarder
    #[error("No local id assigned but packet was not forwarded")]
    MissingForwarder,

    // ============ Edge Errors ============
    /// Forwarder selector has an empty working set
    #[error("No forwarders available")]
    NoForwarders,

    /// Operation on a closed edge
    #[error("Edge is closed")]
    EdgeClosed,

    /// Sync invoked by something other than a tunnel edge
    #[error("{0} must be called from a tunnel edge")]
    NotATunnel(Cow<'static, str>),

    // ============ Lifecycle Errors ============
    /// `start` called a second time
    #[error("Tunnel listener cannot be started twice")]
    AlreadyStarted,

    /// Listener is not running
    #[error("Tunnel listener is not running")]
    NotRunning,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    // ============ Messaging Errors ============
    /// RPC invocation failed or timed out
    #[error("RPC error: {0}")]
    Rpc(Cow<'static, str>),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Error from the overlay primitives
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl TunnelError {
    /// Returns true if this error reflects churn that may clear up on its own
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotEnoughForwarders
            | Self::NoForwarders
            | Self::EdgeClosed
            | Self::Rpc(_)
            | Self::NotRunning => true,
            Self::Core(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result alias for tunnel operations
pub type Result<T> = std::result::Result<T, TunnelError>;
