//! Virtual tunnel edges.
//!
//! A [`TunnelEdge`] is a point-to-point edge whose datagrams travel through
//! overlap connections shared with the remote peer. Its lifecycle:
//!
//! ```text
//!   Open(remote id unset) ──bind──▶ Open(remote id set)
//!          │                               │
//!          └──────────────┬────────────────┘
//!                         ▼
//!                      Closed   (terminal)
//! ```
//!
//! An edge closes when its overlap becomes empty or when it can no longer
//! reach a direct connection through the graph of tunnel overlaps
//! ([`TunnelEdge::should_close`]).

use crate::address::TunnelAddress;
use crate::selector::ForwarderSelector;
use crate::wire::{RoutingHeader, UNASSIGNED_ID};
use parking_lot::{Mutex, RwLock};
use ringlink_core::{Connection, CoreError, Edge, TransportKind};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};

/// Receives tunnel edge notifications
///
/// Both methods default to doing nothing.
pub trait EdgeObserver: Send + Sync {
    /// A datagram arrived on `edge`
    fn on_packet(&self, edge: &TunnelEdge, payload: &[u8]) {
        let _ = (edge, payload);
    }

    /// `edge` closed
    fn on_close(&self, edge: &TunnelEdge) {
        let _ = edge;
    }
}

/// Outbound path of a tunnel edge, provided by its listener
pub(crate) trait EdgeSendHandler: Send + Sync {
    fn handle_edge_send(&self, edge: &TunnelEdge, data: &[u8]) -> Result<(), CoreError>;
}

/// Everything needed to construct an edge
pub(crate) struct EdgeSetup {
    pub local_id: i32,
    pub remote_id: Option<i32>,
    pub local_ta: TunnelAddress,
    pub remote_ta: TunnelAddress,
    pub inbound: bool,
    pub selector: Arc<dyn ForwarderSelector>,
    pub overlap: Vec<Connection>,
    pub handler: Weak<dyn EdgeSendHandler>,
}

/// A virtual edge carried over shared neighbours
pub struct TunnelEdge {
    local_id: i32,
    remote_id: AtomicI32,
    local_ta: TunnelAddress,
    remote_ta: TunnelAddress,
    inbound: bool,
    header: Vec<u8>,
    selector: Arc<dyn ForwarderSelector>,
    overlap: RwLock<Arc<[Connection]>>,
    /// Serializes read-modify-write updates of `overlap`
    update_lock: Mutex<()>,
    closed: AtomicBool,
    observers: RwLock<Vec<Arc<dyn EdgeObserver>>>,
    handler: Weak<dyn EdgeSendHandler>,
}

impl TunnelEdge {
    pub(crate) fn new(setup: EdgeSetup) -> Arc<Self> {
        let header =
            RoutingHeader::exact(*setup.local_ta.target(), *setup.remote_ta.target()).encode();
        setup.selector.update(&setup.overlap);
        Arc::new(Self {
            local_id: setup.local_id,
            remote_id: AtomicI32::new(setup.remote_id.unwrap_or(UNASSIGNED_ID)),
            local_ta: setup.local_ta,
            remote_ta: setup.remote_ta,
            inbound: setup.inbound,
            header,
            selector: setup.selector,
            overlap: RwLock::new(setup.overlap.into()),
            update_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            observers: RwLock::new(Vec::new()),
            handler: setup.handler,
        })
    }

    /// Our id for this edge
    #[must_use]
    pub fn local_id(&self) -> i32 {
        self.local_id
    }

    /// The peer's id for this edge, once known
    #[must_use]
    pub fn remote_id(&self) -> Option<i32> {
        match self.remote_id.load(Ordering::Acquire) {
            UNASSIGNED_ID => None,
            id => Some(id),
        }
    }

    /// Bind the peer's id
    ///
    /// # Panics
    ///
    /// Panics if the remote id was already set, even to the same value, or
    /// if `id` is the reserved unassigned value.
    pub fn set_remote_id(&self, id: i32) {
        assert_ne!(id, UNASSIGNED_ID, "remote id cannot be unassigned");
        if self
            .remote_id
            .compare_exchange(UNASSIGNED_ID, id, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!("remote id already set");
        }
        tracing::trace!("Edge {} bound to remote id {}", self.local_id, id);
    }

    /// Bind the peer's id unless one is already bound
    ///
    /// Returns whether the bound id equals `id` afterwards.
    pub(crate) fn try_bind_remote_id(&self, id: i32) -> bool {
        match self
            .remote_id
            .compare_exchange(UNASSIGNED_ID, id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                tracing::trace!("Edge {} bound to remote id {}", self.local_id, id);
                true
            }
            Err(current) => current == id,
        }
    }

    /// Our tunnel address at creation time
    #[must_use]
    pub fn local_ta(&self) -> &TunnelAddress {
        &self.local_ta
    }

    /// The peer's tunnel address
    #[must_use]
    pub fn remote_ta(&self) -> &TunnelAddress {
        &self.remote_ta
    }

    /// Whether the peer initiated this edge
    #[must_use]
    pub fn is_inbound(&self) -> bool {
        self.inbound
    }

    /// Precomputed routing header for direct sends
    #[must_use]
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub(crate) fn selector(&self) -> &Arc<dyn ForwarderSelector> {
        &self.selector
    }

    /// Current overlap snapshot
    #[must_use]
    pub fn overlap(&self) -> Arc<[Connection]> {
        Arc::clone(&self.overlap.read())
    }

    /// Register for packet and close notifications
    pub fn add_observer(&self, observer: Arc<dyn EdgeObserver>) {
        self.observers.write().push(observer);
    }

    fn observers(&self) -> Vec<Arc<dyn EdgeObserver>> {
        self.observers.read().clone()
    }

    fn replace_overlap(&self, overlap: Vec<Connection>) -> bool {
        self.selector.update(&overlap);
        let empty = overlap.is_empty();
        *self.overlap.write() = overlap.into();
        empty
    }

    /// Replace the overlap; closes the edge if it ends up isolated
    pub fn update_neighbor_intersection(&self, overlap: Vec<Connection>) {
        let guard = self.update_lock.lock();
        if self.is_closed() {
            return;
        }
        let close = self.replace_overlap(overlap) || self.should_close();
        drop(guard);

        if close {
            tracing::debug!("Edge {} isolated after overlap update", self.local_id);
            self.close();
        }
    }

    /// Remove a lost connection from the overlap; closes the edge if it
    /// ends up isolated
    pub fn disconnection_handler(&self, lost: &Connection) {
        let guard = self.update_lock.lock();
        let current = self.overlap();
        if !current.contains(lost) {
            return;
        }
        let remaining: Vec<Connection> = current.iter().filter(|c| *c != lost).cloned().collect();
        let close = self.replace_overlap(remaining) || self.should_close();
        drop(guard);

        if close {
            tracing::debug!(
                "Edge {} isolated after losing {}",
                self.local_id,
                lost.address()
            );
            self.close();
        }
    }

    /// Whether no direct connection is reachable through the overlap graph
    ///
    /// Walks from this edge through every overlap connection that is itself
    /// a tunnel edge. Reaching any other connection means a real path
    /// exists.
    #[must_use]
    pub fn should_close(&self) -> bool {
        let mut visited: HashSet<*const TunnelEdge> = HashSet::new();
        visited.insert(std::ptr::from_ref(self));
        let mut pending = vec![self.overlap()];

        while let Some(overlap) = pending.pop() {
            for con in overlap.iter() {
                let Some(tunnel) = con.edge().as_any().downcast_ref::<TunnelEdge>() else {
                    return false;
                };
                if visited.insert(std::ptr::from_ref(tunnel)) {
                    pending.push(tunnel.overlap());
                }
            }
        }
        true
    }

    /// Hand an inbound datagram to the observers
    pub(crate) fn deliver(&self, payload: &[u8]) {
        for observer in self.observers() {
            observer.on_packet(self, payload);
        }
    }
}

impl Edge for TunnelEdge {
    fn transport_kind(&self) -> TransportKind {
        TransportKind::Tunnel
    }

    fn send(&self, data: &[u8]) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::EdgeClosed);
        }
        let handler = self.handler.upgrade().ok_or(CoreError::EdgeClosed)?;
        handler.handle_edge_send(self, data)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Overlap connections may hold other tunnel edges that hold us
        {
            let _guard = self.update_lock.lock();
            self.replace_overlap(Vec::new());
        }
        tracing::debug!(
            "Edge {} to {} closed",
            self.local_id,
            self.remote_ta.target()
        );
        for observer in self.observers() {
            observer.on_close(self);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for TunnelEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelEdge")
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id())
            .field("remote", self.remote_ta.target())
            .field("inbound", &self.inbound)
            .field("closed", &self.is_closed())
            .finish()
    }
}
