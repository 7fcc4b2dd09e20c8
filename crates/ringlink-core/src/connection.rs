//! Connections and connection-table snapshots.
//!
//! A [`Connection`] binds a peer [`Address`] to the [`Edge`] that carries its
//! traffic. The connection table publishes its structured connections as a
//! [`ConnectionList`]: an immutable, address-sorted snapshot. Subsystems keep
//! a reference to the latest snapshot and swap it wholesale when a
//! [`ConnectionEvent`] arrives, so a held list never changes underneath a
//! reader.

use crate::address::Address;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Transport carrying an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// UDP datagrams
    Udp,
    /// TCP stream
    Tcp,
    /// Virtual edge forwarded through overlay neighbours
    Tunnel,
}

impl TransportKind {
    /// Wire name of the transport kind
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Tunnel => "tunnel",
        }
    }

    /// Whether this kind is itself a tunnel
    #[must_use]
    pub const fn is_tunnel(&self) -> bool {
        matches!(self, Self::Tunnel)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            "tunnel" => Ok(Self::Tunnel),
            other => Err(CoreError::InvalidAddress(
                format!("unknown transport kind: {other}").into(),
            )),
        }
    }
}

/// Role of a connection in the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    /// Ring neighbour or shortcut
    Structured,
    /// Structured connection manufactured only to create tunnel overlap
    StructuredOverlap,
    /// Bootstrap connection outside the ring
    Leaf,
    /// Random unstructured link
    Unstructured,
}

impl ConnectionType {
    /// Wire name of the connection type
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::StructuredOverlap => "structured.overlap",
            Self::Leaf => "leaf",
            Self::Unstructured => "unstructured",
        }
    }

    /// Whether the main type is structured (overlap connections included)
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        matches!(self, Self::Structured | Self::StructuredOverlap)
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-to-point link to a peer
///
/// Implemented by transport edges (UDP/TCP) and by virtual tunnel edges.
/// `as_any` allows a subsystem to recognise its own edge type behind a
/// connection.
pub trait Edge: Send + Sync + fmt::Debug {
    /// Transport carrying this edge
    fn transport_kind(&self) -> TransportKind;

    /// Send a datagram on this edge
    ///
    /// # Errors
    ///
    /// Returns an error if the edge is closed or the transport rejects the data.
    fn send(&self, data: &[u8]) -> Result<(), CoreError>;

    /// Whether the edge has been closed
    fn is_closed(&self) -> bool;

    /// Close the edge; idempotent
    fn close(&self);

    /// Downcast hook
    fn as_any(&self) -> &dyn Any;
}

struct ConnectionInner {
    address: Address,
    con_type: ConnectionType,
    edge: Arc<dyn Edge>,
    created_at: Instant,
}

/// A live connection to a peer
///
/// Cheap to clone; clones refer to the same underlying connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a connection created now
    #[must_use]
    pub fn new(address: Address, con_type: ConnectionType, edge: Arc<dyn Edge>) -> Self {
        Self::with_created_at(address, con_type, edge, Instant::now())
    }

    /// Create a connection with an explicit creation time
    #[must_use]
    pub fn with_created_at(
        address: Address,
        con_type: ConnectionType,
        edge: Arc<dyn Edge>,
        created_at: Instant,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                address,
                con_type,
                edge,
                created_at,
            }),
        }
    }

    /// Remote peer address
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    /// Connection type
    #[must_use]
    pub fn con_type(&self) -> ConnectionType {
        self.inner.con_type
    }

    /// Edge carrying this connection
    #[must_use]
    pub fn edge(&self) -> &Arc<dyn Edge> {
        &self.inner.edge
    }

    /// When the connection was established
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    /// Age of the connection at `now`
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inner.created_at)
    }

    /// Transport kind of the underlying edge
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.edge.transport_kind()
    }

    /// Whether the underlying edge is a tunnel
    #[must_use]
    pub fn is_tunnel(&self) -> bool {
        self.transport_kind().is_tunnel()
    }

    /// Whether the underlying edge is closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.edge.is_closed()
    }

    /// Send a datagram on the underlying edge
    ///
    /// # Errors
    ///
    /// Propagates the edge's send error.
    pub fn send(&self, data: &[u8]) -> Result<(), CoreError> {
        self.inner.edge.send(data)
    }

    /// Whether both connections ride on the same edge object
    #[must_use]
    pub fn same_edge(&self, other: &Connection) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner.edge), Arc::as_ptr(&other.inner.edge))
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.address == other.inner.address && self.same_edge(other)
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.inner.address)
            .field("type", &self.inner.con_type.as_str())
            .field("transport", &self.transport_kind())
            .finish()
    }
}

/// Immutable, address-sorted snapshot of connections
///
/// Addresses are unique within a list. Indexing with [`get_wrapped`]
/// treats the list as a ring.
///
/// [`get_wrapped`]: ConnectionList::get_wrapped
#[derive(Clone, Default)]
pub struct ConnectionList {
    connections: Arc<[Connection]>,
}

impl ConnectionList {
    /// Build a snapshot; later duplicates of an address replace earlier ones
    #[must_use]
    pub fn new(connections: impl IntoIterator<Item = Connection>) -> Self {
        let mut sorted: Vec<Connection> = Vec::new();
        for con in connections {
            match sorted.binary_search_by(|c| c.address().cmp(con.address())) {
                Ok(idx) => sorted[idx] = con,
                Err(idx) => sorted.insert(idx, con),
            }
        }
        Self {
            connections: sorted.into(),
        }
    }

    /// Empty snapshot
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of connections
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the snapshot holds no connections
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate in address order
    pub fn iter(&self) -> std::slice::Iter<'_, Connection> {
        self.connections.iter()
    }

    /// Connections as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[Connection] {
        &self.connections
    }

    /// Connection at a position
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Connection> {
        self.connections.get(index)
    }

    /// Connection at a ring position; negative and oversized indices wrap
    #[must_use]
    pub fn get_wrapped(&self, index: isize) -> Option<&Connection> {
        if self.connections.is_empty() {
            return None;
        }
        let len = self.connections.len() as isize;
        let idx = index.rem_euclid(len) as usize;
        self.connections.get(idx)
    }

    /// Position of `addr`, or the insertion point that keeps the list sorted
    ///
    /// # Errors
    ///
    /// `Err(insertion_point)` when `addr` is not in the list.
    pub fn index_of(&self, addr: &Address) -> Result<usize, usize> {
        self.connections
            .binary_search_by(|c| c.address().cmp(addr))
    }

    /// Whether a connection to `addr` exists
    #[must_use]
    pub fn contains(&self, addr: &Address) -> bool {
        self.index_of(addr).is_ok()
    }

    /// Connection to `addr`, if any
    #[must_use]
    pub fn find(&self, addr: &Address) -> Option<&Connection> {
        self.index_of(addr).ok().and_then(|idx| self.connections.get(idx))
    }

    /// The `count` connections closest to `addr` on the ring
    #[must_use]
    pub fn nearest_to(&self, addr: &Address, count: usize) -> Vec<Connection> {
        let mut by_distance: Vec<&Connection> = self.connections.iter().collect();
        by_distance.sort_by_key(|c| addr.ring_distance(c.address()));
        by_distance.into_iter().take(count).cloned().collect()
    }

    /// Connections lying strictly between `from` and `to` walking in the
    /// increasing direction.
    ///
    /// Both ends are excluded: the nearest connection after `from` counts 0,
    /// the second nearest 1. Returns 0 when `from == to` or `to` is not in
    /// the list.
    #[must_use]
    pub fn left_inclusive_count(&self, from: &Address, to: &Address) -> usize {
        if from == to {
            return 0;
        }
        let Ok(target) = self.index_of(to) else {
            return 0;
        };
        let len = self.connections.len();
        let start = match self.index_of(from) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        } % len;
        (target + len - start) % len
    }

    /// Connections lying strictly between `from` and `to` walking in the
    /// decreasing direction. Same conventions as [`Self::left_inclusive_count`].
    #[must_use]
    pub fn right_inclusive_count(&self, from: &Address, to: &Address) -> usize {
        if from == to {
            return 0;
        }
        let Ok(target) = self.index_of(to) else {
            return 0;
        };
        let len = self.connections.len() as isize;
        let start = match self.index_of(from) {
            Ok(idx) | Err(idx) => idx as isize - 1,
        }
        .rem_euclid(len);
        (start - target as isize).rem_euclid(len) as usize
    }

    /// New snapshot with `con` added (replacing any connection to the same address)
    #[must_use]
    pub fn with(&self, con: Connection) -> Self {
        Self::new(self.connections.iter().cloned().chain(std::iter::once(con)))
    }

    /// New snapshot without the connection to `addr`
    #[must_use]
    pub fn without(&self, addr: &Address) -> Self {
        Self::new(self.connections.iter().filter(|c| c.address() != addr).cloned())
    }
}

impl fmt::Debug for ConnectionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.connections.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a ConnectionList {
    type Item = &'a Connection;
    type IntoIter = std::slice::Iter<'a, Connection>;

    fn into_iter(self) -> Self::IntoIter {
        self.connections.iter()
    }
}

/// Kind of connection-table change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEventKind {
    /// A connection was added
    Connected,
    /// A connection was removed
    Disconnected,
}

/// A connection-table change
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// What happened
    pub kind: ConnectionEventKind,
    /// The connection added or removed
    pub connection: Connection,
    /// Snapshot of the connections of the same main type after the change
    pub connections: ConnectionList,
}

impl ConnectionEvent {
    /// Whether the event concerns structured connections
    #[must_use]
    pub fn is_structured(&self) -> bool {
        self.connection.con_type().is_structured()
    }
}

/// Receives connection-table changes
///
/// Every registered observer is notified once per change; no ordering is
/// guaranteed across observers.
pub trait ConnectionObserver: Send + Sync {
    /// Called after the table has changed
    fn on_connection_event(&self, event: &ConnectionEvent);
}
