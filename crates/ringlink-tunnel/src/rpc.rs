//! Overlap-discovery RPC messages.
//!
//! Two methods are exposed under the `tunnel` handler:
//!
//! - `tunnel.Sync(sync_message) -> bool`: invoked over a tunnel edge; the
//!   receiver recomputes that edge's overlap from the message.
//! - `tunnel.RequestSync() -> sync_message`: invoked on a peer by overlay
//!   address; the reply lists all of the peer's candidates.
//!
//! A [`SyncMessage`] maps candidate addresses to what the sender knows about
//! its connection to them.

use crate::edge::TunnelEdge;
use crate::error::{Result, TunnelError};
use async_trait::async_trait;
use ringlink_core::{Address, Connection, TransportKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// RPC handler name
pub const HANDLER_NAME: &str = "tunnel";

/// What a peer advertises about one of its connections
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    /// Transport of the advertised connection
    pub transport: TransportKind,
    /// Milliseconds since the connection was created
    pub age_ms: u64,
    /// Measured latency in milliseconds, when the sender knows it
    pub latency: Option<f64>,
}

impl SyncEntry {
    /// Describe `connection` as of `now`
    #[must_use]
    pub fn for_connection(connection: &Connection, now: Instant, latency: Option<f64>) -> Self {
        Self {
            transport: connection.transport_kind(),
            age_ms: u64::try_from(connection.age(now).as_millis()).unwrap_or(u64::MAX),
            latency,
        }
    }
}

/// Candidate overlap advertised by a peer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    entries: BTreeMap<Address, SyncEntry>,
}

impl SyncMessage {
    /// Empty message
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate; returns false if `address` was already present
    pub fn insert(&mut self, address: Address, entry: SyncEntry) -> bool {
        if self.entries.contains_key(&address) {
            return false;
        }
        self.entries.insert(address, entry);
        true
    }

    /// Whether `address` is advertised
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    /// Entry for `address`
    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&SyncEntry> {
        self.entries.get(address)
    }

    /// All candidates
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &SyncEntry)> {
        self.entries.iter()
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no candidates are advertised
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize message to bytes
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TunnelError::Serialization(e.to_string()))
    }

    /// Deserialize message from bytes
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Deserialization`] if decoding fails.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| TunnelError::Deserialization(e.to_string()))
    }
}

/// Requests accepted by the `tunnel` handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TunnelRequest {
    /// Replace the caller edge's overlap using the sender's candidates
    Sync(SyncMessage),
    /// Ask for the receiver's own candidates
    RequestSync,
}

impl TunnelRequest {
    /// Fully qualified method name
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Sync(_) => "tunnel.Sync",
            Self::RequestSync => "tunnel.RequestSync",
        }
    }

    /// Serialize request to bytes
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TunnelError::Serialization(e.to_string()))
    }

    /// Deserialize request from bytes
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Deserialization`] if decoding fails.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| TunnelError::Deserialization(e.to_string()))
    }
}

/// Replies produced by the `tunnel` handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TunnelResponse {
    /// Reply to `Sync`
    Synced(bool),
    /// Reply to `RequestSync`
    Candidates(SyncMessage),
}

impl TunnelResponse {
    /// Serialize response to bytes
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TunnelError::Serialization(e.to_string()))
    }

    /// Deserialize response from bytes
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Deserialization`] if decoding fails.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| TunnelError::Deserialization(e.to_string()))
    }
}

/// Return path of an inbound RPC
#[derive(Debug, Clone)]
pub enum RpcOrigin {
    /// Arrived over one of our tunnel edges
    Tunnel(Arc<TunnelEdge>),
    /// Arrived through overlay routing from a peer
    Peer(Address),
}

/// Outbound side of the `tunnel` RPC methods
///
/// Implemented by the node's RPC layer, which owns the encoding and
/// timeouts of the actual invocation.
#[async_trait]
pub trait TunnelRpc: Send + Sync {
    /// Invoke `tunnel.RequestSync` on `target` by exact overlay routing
    async fn request_sync(&self, target: Address) -> Result<SyncMessage>;

    /// Invoke `tunnel.Sync` on the peer at the far end of `edge`
    async fn sync(&self, edge: Arc<TunnelEdge>, message: SyncMessage) -> Result<bool>;
}
