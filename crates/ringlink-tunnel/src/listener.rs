//! Tunnel listener.
//!
//! The listener owns every tunnel edge of a node. It
//!
//! - creates outbound edges once an overlap with the target exists,
//!   connecting to a candidate of the target first when none does,
//! - demultiplexes inbound tunnel datagrams by local id and allocates edges
//!   for first-contact datagrams,
//! - frames and forwards outbound datagrams of its edges,
//! - answers the `tunnel.Sync` and `tunnel.RequestSync` RPCs,
//! - resynchronizes every edge's overlap on structured connection churn,
//! - periodically closes bridging connections nobody uses any more.
//!
//! ```text
//!            create_edge_to                          handle_data
//!                 │                                       │
//!          delay, find_overlap                      TunnelFrame::parse
//!                 │ empty                                 │
//!        RequestSync ─▶ evaluate_potential_overlap   first contact? ─▶ register
//!                 │                                       │
//!        OverlapConnector::connect_to               registry lookup, bind id
//!                 │                                       │
//!             register ─▶ callback (action queue)     deliver
//! ```

use crate::address::TunnelAddress;
use crate::config::TunnelConfig;
use crate::connector::OverlapConnector;
use crate::edge::{EdgeObserver, EdgeSendHandler, EdgeSetup, TunnelEdge};
use crate::error::{Result, TunnelError};
use crate::overlap::{OverlapStrategy, RecencyOverlap};
use crate::registry::{EdgeRegistry, RegistryStats};
use crate::rpc::{RpcOrigin, TunnelRequest, TunnelResponse, TunnelRpc};
use crate::selector::{SelectorFactory, SimpleSelectorFactory};
use crate::wire::{TunnelFrame, UNASSIGNED_ID, assemble, encode_ids};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ringlink_core::{
    ActionQueue, Address, Connection, ConnectionEvent, ConnectionEventKind, ConnectionList,
    ConnectionObserver, ConnectionType, CoreError, Linker, OverlaySender,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Completion callback of [`TunnelListener::create_edge_to`]
pub type EdgeCallback = Box<dyn FnOnce(Result<Arc<TunnelEdge>>) + Send + 'static>;

/// Receives listener notifications
pub trait ListenerObserver: Send + Sync {
    /// A peer opened a new inbound edge
    fn on_new_edge(&self, edge: &Arc<TunnelEdge>);
}

/// How an inbound tunnel datagram reached us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    /// Exact overlay routing from `source`
    Direct {
        /// Originating peer
        source: Address,
    },
    /// Relayed by `forwarder` on behalf of `source`
    Forwarded {
        /// Originating peer
        source: Address,
        /// Neighbour that relayed the datagram
        forwarder: Address,
    },
}

impl DataOrigin {
    /// Originating peer
    #[must_use]
    pub fn source(&self) -> &Address {
        match self {
            Self::Direct { source } | Self::Forwarded { source, .. } => source,
        }
    }
}

/// Why an inbound datagram was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Listener is not running
    NotRunning,
    /// First contact relayed by a neighbour we are not connected to
    UnknownForwarder,
    /// No edge with that local id, typically one that already closed
    UnknownEdge,
    /// Remote id differs from the one bound to the edge
    RemoteIdMismatch,
    /// Edge has closed
    EdgeClosed,
    /// First contact that does not carry the sender's edge id
    UnassignedSender,
}

/// Result of handling an inbound datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Payload handed to the edge
    Delivered {
        /// Edge the payload went to
        local_id: i32,
        /// Whether the datagram created the edge
        created: bool,
    },
    /// Datagram discarded
    Dropped(DropReason),
}

/// Collaborators supplied by the node
#[derive(Clone)]
pub struct TunnelServices {
    /// Sends payloads relayed by a chosen neighbour
    pub sender: Arc<dyn OverlaySender>,
    /// Outbound `tunnel.*` RPCs
    pub rpc: Arc<dyn TunnelRpc>,
    /// Opens and closes overlay connections
    pub linker: Arc<dyn Linker>,
    /// The node's event context for completion callbacks
    pub actions: Arc<dyn ActionQueue>,
    /// Overlap policy; recency-ranked when absent
    pub strategy: Option<Arc<dyn OverlapStrategy>>,
    /// Per-edge forwarder selection; round robin when absent
    pub selectors: Option<Arc<dyn SelectorFactory>>,
}

impl TunnelServices {
    /// Services with the default overlap strategy and selectors
    #[must_use]
    pub fn new(
        sender: Arc<dyn OverlaySender>,
        rpc: Arc<dyn TunnelRpc>,
        linker: Arc<dyn Linker>,
        actions: Arc<dyn ActionQueue>,
    ) -> Self {
        Self {
            sender,
            rpc,
            linker,
            actions,
            strategy: None,
            selectors: None,
        }
    }

    /// Use `strategy` for overlap decisions
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn OverlapStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Use `selectors` to build each edge's forwarder selector
    #[must_use]
    pub fn with_selector_factory(mut self, selectors: Arc<dyn SelectorFactory>) -> Self {
        self.selectors = Some(selectors);
        self
    }
}

/// Owner of a node's tunnel edges
///
/// Cheap to clone; clones share the same listener. Methods that start
/// background work must be called within a Tokio runtime.
#[derive(Clone)]
pub struct TunnelListener {
    inner: Arc<ListenerInner>,
}

struct ListenerInner {
    me: Weak<ListenerInner>,
    local: Address,
    config: TunnelConfig,
    registry: EdgeRegistry,
    connections: RwLock<ConnectionList>,
    local_ta: RwLock<Arc<TunnelAddress>>,
    strategy: Arc<dyn OverlapStrategy>,
    selectors: Arc<dyn SelectorFactory>,
    connector: OverlapConnector,
    sender: Arc<dyn OverlaySender>,
    rpc: Arc<dyn TunnelRpc>,
    linker: Arc<dyn Linker>,
    actions: Arc<dyn ActionQueue>,
    observers: RwLock<Vec<Arc<dyn ListenerObserver>>>,
    delay_rng: Mutex<StdRng>,
    started: AtomicBool,
    running: AtomicBool,
    trim_task: Mutex<Option<JoinHandle<()>>>,
}

/// Removes closed edges from the registry
struct RegistryCleanup(Weak<ListenerInner>);

impl EdgeObserver for RegistryCleanup {
    fn on_close(&self, edge: &TunnelEdge) {
        if let Some(inner) = self.0.upgrade() {
            inner.registry.remove(edge);
        }
    }
}

impl TunnelListener {
    /// Create a stopped listener for the node at `local`
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::InvalidConfig`] if `config` fails validation.
    pub fn new(local: Address, config: TunnelConfig, services: TunnelServices) -> Result<Self> {
        config.validate()?;

        let strategy: Arc<dyn OverlapStrategy> = match services.strategy {
            Some(strategy) => strategy,
            None => Arc::new(RecencyOverlap::from_config(&config)),
        };
        let selectors: Arc<dyn SelectorFactory> = match services.selectors {
            Some(selectors) => selectors,
            None => Arc::new(SimpleSelectorFactory),
        };
        let connector = OverlapConnector::new(Arc::clone(&services.linker));
        connector.deactivate();
        let delay_rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };

        let inner = Arc::new_cyclic(|me| ListenerInner {
            me: me.clone(),
            local,
            registry: EdgeRegistry::new(config.rng_seed),
            connections: RwLock::new(ConnectionList::empty()),
            local_ta: RwLock::new(Arc::new(TunnelAddress::new(local, []))),
            strategy,
            selectors,
            connector,
            sender: services.sender,
            rpc: services.rpc,
            linker: services.linker,
            actions: services.actions,
            observers: RwLock::new(Vec::new()),
            delay_rng: Mutex::new(delay_rng),
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
            trim_task: Mutex::new(None),
            config,
        });

        Ok(Self { inner })
    }

    /// Start accepting and creating edges, and schedule overlap trimming
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::AlreadyStarted`] on a second call.
    pub fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(TunnelError::AlreadyStarted);
        }
        self.inner.connector.activate();
        self.inner.running.store(true, Ordering::Release);

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.trim_interval;
        let handle = tokio::spawn(async move {
            let first = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(first, period);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.trim_overlap_connections();
            }
        });
        *self.inner.trim_task.lock() = Some(handle);

        tracing::info!("Tunnel listener started for {}", self.inner.local);
        Ok(())
    }

    /// Stop: refuse bridging, cancel trimming, close every edge
    pub fn stop(&self) {
        self.inner.connector.deactivate();
        self.inner.running.store(false, Ordering::Release);
        if let Some(handle) = self.inner.trim_task.lock().take() {
            handle.abort();
        }

        let edges = self.inner.registry.edges();
        let count = edges.len();
        for edge in edges {
            ringlink_core::Edge::close(edge.as_ref());
        }
        tracing::info!("Tunnel listener stopped, closed {} edges", count);
    }

    /// Whether `start` has been called
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Whether the listener is started and not stopped
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Local overlay address
    #[must_use]
    pub fn local(&self) -> &Address {
        &self.inner.local
    }

    /// Tunnel address currently advertised for this node
    #[must_use]
    pub fn local_address(&self) -> Arc<TunnelAddress> {
        self.inner.local_ta()
    }

    /// Listener configuration
    #[must_use]
    pub fn config(&self) -> &TunnelConfig {
        &self.inner.config
    }

    /// Current structured connection snapshot
    #[must_use]
    pub fn connections(&self) -> ConnectionList {
        self.inner.connections()
    }

    /// Number of live edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Snapshot of live edges
    #[must_use]
    pub fn edges(&self) -> Vec<Arc<TunnelEdge>> {
        self.inner.registry.edges()
    }

    /// Live edge with `local_id`
    #[must_use]
    pub fn edge(&self, local_id: i32) -> Option<Arc<TunnelEdge>> {
        self.inner.registry.get(local_id)
    }

    /// Edge registry statistics
    #[must_use]
    pub fn registry_stats(&self) -> RegistryStats {
        self.inner.registry.stats()
    }

    /// Register for new-edge notifications
    pub fn add_observer(&self, observer: Arc<dyn ListenerObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Replace the structured connection snapshot and the advertised address
    pub fn update_connections(&self, connections: ConnectionList) {
        self.inner.update_connections(connections);
    }

    /// Create an edge to `ta` after a randomized delay
    ///
    /// `callback` runs on the action queue with the new edge or the reason
    /// no edge could be created.
    pub fn create_edge_to(
        &self,
        ta: TunnelAddress,
        callback: impl FnOnce(Result<Arc<TunnelEdge>>) + Send + 'static,
    ) {
        let callback: EdgeCallback = Box::new(callback);
        if !self.inner.is_running() {
            self.inner.finish(&ta, callback, Err(TunnelError::NotRunning));
            return;
        }

        let delay = self.inner.create_delay();
        tracing::debug!("Creating edge to {} in {:?}", ta.target(), delay);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = inner.establish(&ta).await;
            inner.finish(&ta, callback, result);
        });
    }

    /// Demultiplex an inbound tunnel datagram
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::FrameTooShort`] for a truncated id header and
    /// [`TunnelError::MissingForwarder`] for a first-contact datagram that
    /// was not relayed.
    pub fn handle_data(&self, data: &[u8], origin: DataOrigin) -> Result<InboundOutcome> {
        self.inner.handle_data(data, origin)
    }

    /// Send `data` on `edge`
    ///
    /// # Errors
    ///
    /// Returns an error if no forwarder is available or the relayed send
    /// fails. Direct sends on a forwarder never fail.
    pub fn handle_edge_send(
        &self,
        edge: &TunnelEdge,
        data: &[u8],
    ) -> std::result::Result<(), CoreError> {
        self.inner.handle_edge_send(edge, data)
    }

    /// Answer a `tunnel.*` RPC
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::NotATunnel`] when `Sync` does not arrive over
    /// a tunnel edge.
    pub fn handle_rpc(&self, origin: RpcOrigin, request: TunnelRequest) -> Result<TunnelResponse> {
        self.inner.handle_rpc(origin, request)
    }

    /// Answer an encoded `tunnel.*` RPC with an encoded response
    ///
    /// # Errors
    ///
    /// Returns decoding, handling and encoding errors.
    pub fn handle_rpc_bytes(&self, origin: RpcOrigin, request: &[u8]) -> Result<Vec<u8>> {
        let request = TunnelRequest::from_bytes(request)?;
        self.handle_rpc(origin, request)?.to_bytes()
    }

    /// Close unused bridging connections; returns how many were closed
    pub fn trim_overlap_connections(&self) -> usize {
        self.inner.trim_overlap_connections()
    }
}

impl ConnectionObserver for TunnelListener {
    fn on_connection_event(&self, event: &ConnectionEvent) {
        self.inner.on_connection_event(event);
    }
}

impl std::fmt::Debug for TunnelListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelListener")
            .field("local", &self.inner.local)
            .field("edges", &self.inner.registry.len())
            .field("running", &self.inner.is_running())
            .finish_non_exhaustive()
    }
}

impl ListenerInner {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn connections(&self) -> ConnectionList {
        self.connections.read().clone()
    }

    fn local_ta(&self) -> Arc<TunnelAddress> {
        Arc::clone(&self.local_ta.read())
    }

    fn handler(&self) -> Weak<dyn EdgeSendHandler> {
        self.me.clone()
    }

    fn create_delay(&self) -> Duration {
        let (min, max) = (self.config.create_delay_min, self.config.create_delay_max);
        if max <= min {
            return min;
        }
        self.delay_rng.lock().gen_range(min..=max)
    }

    fn update_connections(&self, connections: ConnectionList) {
        let nearest = connections.nearest_to(&self.local, self.config.local_ta_neighbors);
        let ta = TunnelAddress::from_connections(self.local, &nearest);
        *self.connections.write() = connections;
        *self.local_ta.write() = Arc::new(ta);
    }

    /// Register an edge and hook its removal on close
    fn register(&self, setup: impl FnOnce(i32) -> EdgeSetup) -> Arc<TunnelEdge> {
        let edge = self.registry.register(|id| TunnelEdge::new(setup(id)));
        edge.add_observer(Arc::new(RegistryCleanup(self.me.clone())));
        if ringlink_core::Edge::is_closed(edge.as_ref()) {
            self.registry.remove(&edge);
        }
        edge
    }

    fn finish(&self, ta: &TunnelAddress, callback: EdgeCallback, result: Result<Arc<TunnelEdge>>) {
        match &result {
            Ok(edge) => tracing::debug!(
                "Edge {} to {} created",
                edge.local_id(),
                ta.target()
            ),
            Err(e) => tracing::debug!("Edge creation to {} failed: {}", ta.target(), e),
        }
        self.actions.enqueue(Box::new(move || callback(result)));
    }

    async fn establish(&self, ta: &TunnelAddress) -> Result<Arc<TunnelEdge>> {
        let overlap = self.strategy.find_overlap(ta, &self.connections());
        let overlap = if overlap.is_empty() {
            self.bridge(ta).await?
        } else {
            overlap
        };
        self.create_edge(ta, overlap)
    }

    /// Manufacture an overlap through a candidate advertised by the target
    async fn bridge(&self, ta: &TunnelAddress) -> Result<Vec<Connection>> {
        let target = *ta.target();
        let answer = tokio::time::timeout(self.config.rpc_timeout, self.rpc.request_sync(target));
        let message = match answer.await {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => {
                tracing::debug!("RequestSync to {} failed: {}", target, e);
                return Err(TunnelError::NotEnoughForwarders);
            }
            Err(_) => {
                tracing::debug!("RequestSync to {} timed out", target);
                return Err(TunnelError::NotEnoughForwarders);
            }
        };

        let candidate = self
            .strategy
            .evaluate_potential_overlap(&message)
            .ok_or(TunnelError::NotEnoughForwarders)?;

        let (tx, rx) = oneshot::channel();
        self.connector.connect_to(candidate, move |result| {
            let _ = tx.send(result);
        });
        if let Ok(Err(e)) = rx.await {
            tracing::debug!("Bridging to {} for {} failed: {}", candidate, target, e);
        }

        self.connections()
            .find(&candidate)
            .map(|con| vec![con.clone()])
            .ok_or(TunnelError::NotEnoughForwarders)
    }

    fn create_edge(&self, ta: &TunnelAddress, overlap: Vec<Connection>) -> Result<Arc<TunnelEdge>> {
        if self.connections().contains(ta.target()) {
            return Err(TunnelError::DirectConnectionExists);
        }

        let local_ta = (*self.local_ta()).clone();
        let edge = self.register(|local_id| EdgeSetup {
            local_id,
            remote_id: None,
            local_ta,
            remote_ta: ta.clone(),
            inbound: false,
            selector: self.selectors.create(),
            overlap,
            handler: self.handler(),
        });

        if !self.is_running() {
            ringlink_core::Edge::close(edge.as_ref());
            return Err(TunnelError::NotRunning);
        }
        Ok(edge)
    }

    fn handle_data(&self, data: &[u8], origin: DataOrigin) -> Result<InboundOutcome> {
        let frame = TunnelFrame::parse(data)?;
        if !self.is_running() {
            return Ok(InboundOutcome::Dropped(DropReason::NotRunning));
        }

        let (local_id, created) = if frame.is_first_contact() {
            let DataOrigin::Forwarded { source, forwarder } = origin else {
                return Err(TunnelError::MissingForwarder);
            };
            let Some(forwarder) = self.connections().find(&forwarder).cloned() else {
                tracing::trace!("Dropping first contact from {} via unknown {}", source, forwarder);
                return Ok(InboundOutcome::Dropped(DropReason::UnknownForwarder));
            };
            if frame.remote_id == UNASSIGNED_ID {
                tracing::trace!("Dropping first contact from {} without a sender id", source);
                return Ok(InboundOutcome::Dropped(DropReason::UnassignedSender));
            }

            let overlap = vec![forwarder];
            let remote_ta = TunnelAddress::from_connections(source, &overlap);
            let local_ta = (*self.local_ta()).clone();
            let edge = self.register(|local_id| EdgeSetup {
                local_id,
                remote_id: Some(frame.remote_id),
                local_ta,
                remote_ta,
                inbound: true,
                selector: self.selectors.create(),
                overlap,
                handler: self.handler(),
            });
            tracing::debug!("Inbound edge {} from {}", edge.local_id(), source);

            let observers = self.observers.read().clone();
            for observer in observers {
                observer.on_new_edge(&edge);
            }
            (edge.local_id(), true)
        } else {
            (frame.local_id, false)
        };

        let Some(edge) = self.registry.lookup(local_id) else {
            tracing::trace!("Dropping datagram for unknown edge {}", local_id);
            return Ok(InboundOutcome::Dropped(DropReason::UnknownEdge));
        };
        if !edge.try_bind_remote_id(frame.remote_id) {
            tracing::trace!(
                "Dropping datagram for edge {} from remote id {}",
                local_id,
                frame.remote_id
            );
            return Ok(InboundOutcome::Dropped(DropReason::RemoteIdMismatch));
        }
        if ringlink_core::Edge::is_closed(edge.as_ref()) {
            return Ok(InboundOutcome::Dropped(DropReason::EdgeClosed));
        }

        edge.deliver(frame.payload);
        Ok(InboundOutcome::Delivered { local_id, created })
    }

    fn handle_rpc(&self, origin: RpcOrigin, request: TunnelRequest) -> Result<TunnelResponse> {
        let method = request.method();
        match request {
            TunnelRequest::Sync(message) => {
                let RpcOrigin::Tunnel(edge) = origin else {
                    return Err(TunnelError::NotATunnel(method.into()));
                };
                let overlap = self.strategy.evaluate_overlap(&self.connections(), &message);
                tracing::trace!(
                    "Sync on edge {}: {} of {} candidates shared",
                    edge.local_id(),
                    overlap.len(),
                    message.len()
                );
                edge.update_neighbor_intersection(overlap);
                Ok(TunnelResponse::Synced(true))
            }
            TunnelRequest::RequestSync => Ok(TunnelResponse::Candidates(
                self.strategy
                    .sync_message(&[], &self.local, &self.connections()),
            )),
        }
    }

    fn handle_edge_send(
        &self,
        edge: &TunnelEdge,
        data: &[u8],
    ) -> std::result::Result<(), CoreError> {
        let forwarder = edge
            .selector()
            .next()
            .map_err(|e| CoreError::NoRoute(e.to_string().into()))?;
        let ids = encode_ids(edge.local_id(), edge.remote_id().unwrap_or(UNASSIGNED_ID));

        if edge.remote_id().is_none() {
            return self.sender.send_forwarding(
                forwarder.address(),
                edge.remote_ta().target(),
                &assemble(&[], &ids, data),
            );
        }

        if let Err(e) = forwarder.send(&assemble(edge.header(), &ids, data)) {
            tracing::trace!(
                "Send on edge {} via {} failed: {}",
                edge.local_id(),
                forwarder.address(),
                e
            );
        }
        Ok(())
    }

    fn on_connection_event(&self, event: &ConnectionEvent) {
        if !event.is_structured() {
            return;
        }
        self.update_connections(event.connections.clone());
        let connections = self.connections();

        for edge in self.registry.edges() {
            if event.kind == ConnectionEventKind::Disconnected {
                edge.disconnection_handler(&event.connection);
                if ringlink_core::Edge::is_closed(edge.as_ref()) {
                    continue;
                }
            }
            self.push_sync(edge, &connections);
        }
    }

    fn push_sync(&self, edge: Arc<TunnelEdge>, connections: &ConnectionList) {
        let message = self
            .strategy
            .sync_message(&edge.overlap(), &self.local, connections);
        let rpc = Arc::clone(&self.rpc);
        let deadline = self.config.rpc_timeout;
        tokio::spawn(async move {
            let local_id = edge.local_id();
            match tokio::time::timeout(deadline, rpc.sync(edge, message)).await {
                Ok(Ok(_)) => tracing::trace!("Synced edge {}", local_id),
                Ok(Err(e)) => tracing::debug!("Sync on edge {} failed: {}", local_id, e),
                Err(_) => tracing::debug!("Sync on edge {} timed out", local_id),
            }
        });
    }

    fn trim_overlap_connections(&self) -> usize {
        if !self.is_running() {
            return 0;
        }

        let used: HashSet<Address> = self
            .registry
            .edges()
            .iter()
            .flat_map(|edge| edge.overlap().iter().map(|c| *c.address()).collect::<Vec<_>>())
            .collect();

        let connections = self.connections();
        let now = Instant::now();
        let desired = self.config.desired_near_neighbors;
        let mut closed = 0;
        for con in &connections {
            if con.con_type() != ConnectionType::StructuredOverlap {
                continue;
            }
            if used.contains(con.address()) || con.age(now) < self.config.trim_interval {
                continue;
            }
            // Connections strictly between us and `con`; keeps the `desired` nearest per side
            let left = connections.left_inclusive_count(&self.local, con.address());
            let right = connections.right_inclusive_count(&self.local, con.address());
            if left >= desired && right >= desired {
                tracing::info!("Closing unused overlap connection to {}", con.address());
                self.linker.close(con, "unused overlap connection");
                closed += 1;
            }
        }
        closed
    }
}

impl EdgeSendHandler for ListenerInner {
    fn handle_edge_send(
        &self,
        edge: &TunnelEdge,
        data: &[u8],
    ) -> std::result::Result<(), CoreError> {
        ListenerInner::handle_edge_send(self, edge, data)
    }
}
