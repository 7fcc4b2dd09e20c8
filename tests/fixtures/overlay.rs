//! In-memory overlay for multi-node tunnel scenarios
//!
//! Every node owns a [`TunnelListener`] and a structured connection table.
//! Links between nodes are [`MemoryEdge`]s that deliver routed datagrams
//! synchronously, so a tunnel datagram travels
//!
//! ```text
//! A ──MemoryEdge──▶ C ──MemoryEdge──▶ B
//!        (routing header names B; C relays it)
//! ```
//!
//! Pairs can be blocked to model peers that cannot reach each other
//! directly, e.g. both behind NAT.
//!
//! # Example
//!
//! ```no_run
//! use ringlink_integration_tests::fixtures::MemoryNetwork;
//!
//! # async fn demo() {
//! let net = MemoryNetwork::new();
//! let a = net.add_node(1);
//! let b = net.add_node(2);
//! let c = net.add_node(3);
//! net.block(&a, &b);
//! net.link(&a, &c).unwrap();
//! net.link(&b, &c).unwrap();
//!
//! let edge = a.open_edge(b.listener.local_address().as_ref().clone()).await.unwrap();
//! # }
//! ```

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use ringlink_core::{
    ADDRESS_LEN, Address, Connection, ConnectionEvent, ConnectionEventKind, ConnectionList,
    ConnectionObserver, ConnectionType, CoreError, Edge, InlineActions, Linker, OverlaySender,
    TransportKind,
};
use ringlink_tunnel::wire::RoutingHeader;
use ringlink_tunnel::{
    DataOrigin, EdgeObserver, InboundOutcome, ListenerObserver, RpcOrigin, SyncMessage,
    TunnelAddress, TunnelConfig, TunnelEdge, TunnelError, TunnelListener, TunnelRequest,
    TunnelResponse, TunnelRpc, TunnelServices,
};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;

/// Install a test-friendly tracing subscriber once per process
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Address whose first byte is `first`
#[must_use]
pub fn node_address(first: u8) -> Address {
    let mut bytes = [0u8; ADDRESS_LEN];
    bytes[0] = first;
    Address::from_bytes(bytes)
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Set of simulated nodes and the links between them
pub struct MemoryNetwork {
    me: Weak<MemoryNetwork>,
    nodes: RwLock<HashMap<Address, Arc<TestNode>>>,
    blocked: Mutex<HashSet<(Address, Address)>>,
}

impl MemoryNetwork {
    /// Create an empty network
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            nodes: RwLock::new(HashMap::new()),
            blocked: Mutex::new(HashSet::new()),
        })
    }

    /// Add and start a node at `node_address(first)` with an immediate config
    pub fn add_node(&self, first: u8) -> Arc<TestNode> {
        self.add_node_with(first, TunnelConfig::immediate())
    }

    /// Add and start a node with `config`
    pub fn add_node_with(&self, first: u8, config: TunnelConfig) -> Arc<TestNode> {
        let address = node_address(first);
        let services = Arc::new(NodeServices {
            me: address,
            network: self.me.clone(),
        });
        let services = TunnelServices::new(
            services.clone(),
            services.clone(),
            services,
            Arc::new(InlineActions),
        );
        let listener = TunnelListener::new(address, config, services).expect("valid config");

        let log = Arc::new(PacketLog::default());
        listener.add_observer(Arc::new(AttachLog(Arc::clone(&log))));
        listener.start().expect("fresh listener");

        let node = Arc::new(TestNode {
            address,
            listener,
            table: RwLock::new(ConnectionList::empty()),
            log,
            outcomes: Mutex::new(Vec::new()),
        });
        self.nodes.write().insert(address, Arc::clone(&node));
        node
    }

    /// Node at `address`
    #[must_use]
    pub fn node(&self, address: &Address) -> Option<Arc<TestNode>> {
        self.nodes.read().get(address).cloned()
    }

    /// Forbid direct links between `a` and `b`
    pub fn block(&self, a: &TestNode, b: &TestNode) {
        let mut blocked = self.blocked.lock();
        blocked.insert((a.address, b.address));
        blocked.insert((b.address, a.address));
    }

    /// Link `a` and `b` with structured connections
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LinkFailed`] if the pair is blocked.
    pub fn link(&self, a: &TestNode, b: &TestNode) -> Result<(), CoreError> {
        self.connect(a.address, b.address, ConnectionType::Structured)
    }

    /// Remove the link between `a` and `b`
    pub fn unlink(&self, a: &TestNode, b: &TestNode) {
        self.disconnect(a.address, b.address);
    }

    fn connect(&self, a: Address, b: Address, con_type: ConnectionType) -> Result<(), CoreError> {
        if self.blocked.lock().contains(&(a, b)) {
            return Err(CoreError::LinkFailed(format!("{a} cannot reach {b}").into()));
        }
        let (Some(na), Some(nb)) = (self.node(&a), self.node(&b)) else {
            return Err(CoreError::LinkFailed(format!("{b} is not in the network").into()));
        };
        if na.table().contains(&b) {
            return Ok(());
        }

        tracing::debug!("Linking {} <-> {} as {}", a, b, con_type);
        na.publish(ConnectionEventKind::Connected, self.connection(b, con_type));
        nb.publish(ConnectionEventKind::Connected, self.connection(a, con_type));
        Ok(())
    }

    fn connection(&self, remote: Address, con_type: ConnectionType) -> Connection {
        let edge = Arc::new(MemoryEdge {
            remote,
            network: self.me.clone(),
            closed: AtomicBool::new(false),
        });
        Connection::new(remote, con_type, edge)
    }

    fn disconnect(&self, a: Address, b: Address) {
        for (from, to) in [(a, b), (b, a)] {
            let Some(node) = self.node(&from) else {
                continue;
            };
            let Some(con) = node.table().find(&to).cloned() else {
                continue;
            };
            con.edge().close();
            node.publish(ConnectionEventKind::Disconnected, con);
        }
    }

    /// Deliver a routed datagram arriving at `at`
    fn deliver_routed(&self, at: Address, data: &[u8]) {
        let Some(node) = self.node(&at) else {
            return;
        };
        let (header, datagram) = match RoutingHeader::parse(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::trace!("{} dropped malformed datagram: {}", at, e);
                return;
            }
        };

        if header.destination == at {
            node.receive(datagram, DataOrigin::Direct { source: header.source });
            return;
        }
        match node.table().find(&header.destination) {
            Some(next) => {
                if let Err(e) = next.send(data) {
                    tracing::trace!("{} could not relay to {}: {}", at, header.destination, e);
                }
            }
            None => tracing::trace!("{} has no route to {}", at, header.destination),
        }
    }
}

/// A simulated node
pub struct TestNode {
    /// Overlay address
    pub address: Address,
    /// The node's tunnel listener
    pub listener: TunnelListener,
    table: RwLock<ConnectionList>,
    log: Arc<PacketLog>,
    outcomes: Mutex<Vec<Result<InboundOutcome, TunnelError>>>,
}

impl TestNode {
    /// Structured connection table
    #[must_use]
    pub fn table(&self) -> ConnectionList {
        self.table.read().clone()
    }

    /// Payloads delivered to this node's edges as (local id, payload)
    #[must_use]
    pub fn received(&self) -> Vec<(i32, Vec<u8>)> {
        self.log.0.lock().clone()
    }

    /// Outcomes of every tunnel datagram handed to the listener
    #[must_use]
    pub fn outcomes(&self) -> Vec<Result<InboundOutcome, TunnelError>> {
        self.outcomes.lock().clone()
    }

    /// Create an edge to `ta` and record its packets
    pub async fn open_edge(&self, ta: TunnelAddress) -> Result<Arc<TunnelEdge>, TunnelError> {
        let (tx, rx) = oneshot::channel();
        self.listener.create_edge_to(ta, move |result| {
            let _ = tx.send(result);
        });
        let edge = rx.await.expect("create_edge_to always calls back")?;
        edge.add_observer(Arc::clone(&self.log) as Arc<dyn EdgeObserver>);
        Ok(edge)
    }

    fn publish(&self, kind: ConnectionEventKind, connection: Connection) {
        let connections = {
            let mut table = self.table.write();
            *table = match kind {
                ConnectionEventKind::Connected => table.with(connection.clone()),
                ConnectionEventKind::Disconnected => table.without(connection.address()),
            };
            table.clone()
        };
        self.listener.on_connection_event(&ConnectionEvent {
            kind,
            connection,
            connections,
        });
    }

    fn receive(&self, data: &[u8], origin: DataOrigin) {
        let outcome = self.listener.handle_data(data, origin);
        tracing::trace!("{} handled tunnel datagram: {:?}", self.address, outcome);
        self.outcomes.lock().push(outcome);
    }
}

/// Records payloads of the edges it observes
#[derive(Default)]
struct PacketLog(Mutex<Vec<(i32, Vec<u8>)>>);

impl EdgeObserver for PacketLog {
    fn on_packet(&self, edge: &TunnelEdge, payload: &[u8]) {
        self.0.lock().push((edge.local_id(), payload.to_vec()));
    }
}

/// Attaches the packet log to inbound edges
struct AttachLog(Arc<PacketLog>);

impl ListenerObserver for AttachLog {
    fn on_new_edge(&self, edge: &Arc<TunnelEdge>) {
        edge.add_observer(Arc::clone(&self.0) as Arc<dyn EdgeObserver>);
    }
}

/// Direct link to another simulated node
#[derive(Debug)]
pub struct MemoryEdge {
    remote: Address,
    network: Weak<MemoryNetwork>,
    closed: AtomicBool,
}

impl Edge for MemoryEdge {
    fn transport_kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn send(&self, data: &[u8]) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::EdgeClosed);
        }
        let network = self.network.upgrade().ok_or(CoreError::EdgeClosed)?;
        network.deliver_routed(self.remote, data);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Node-side collaborators handed to a listener
struct NodeServices {
    me: Address,
    network: Weak<MemoryNetwork>,
}

impl NodeServices {
    fn network(&self) -> Result<Arc<MemoryNetwork>, CoreError> {
        self.network
            .upgrade()
            .ok_or_else(|| CoreError::NoRoute("network shut down".into()))
    }

    fn remote(&self, address: &Address) -> ringlink_tunnel::Result<Arc<TestNode>> {
        self.network()?
            .node(address)
            .ok_or_else(|| TunnelError::Rpc(format!("{address} unreachable").into()))
    }
}

impl OverlaySender for NodeServices {
    fn send_forwarding(
        &self,
        forwarder: &Address,
        target: &Address,
        payload: &[u8],
    ) -> Result<(), CoreError> {
        let network = self.network()?;
        let no_route = || CoreError::NoRoute(format!("{forwarder} -> {target}").into());
        let me = network.node(&self.me).ok_or_else(no_route)?;
        if !me.table().contains(forwarder) {
            return Err(no_route());
        }
        let relay = network.node(forwarder).ok_or_else(no_route)?;
        if !relay.table().contains(target) {
            return Err(no_route());
        }
        let destination = network.node(target).ok_or_else(no_route)?;
        destination.receive(
            payload,
            DataOrigin::Forwarded {
                source: self.me,
                forwarder: *forwarder,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl TunnelRpc for NodeServices {
    async fn request_sync(&self, target: Address) -> ringlink_tunnel::Result<SyncMessage> {
        let remote = self.remote(&target)?;
        let reply = remote
            .listener
            .handle_rpc_bytes(RpcOrigin::Peer(self.me), &TunnelRequest::RequestSync.to_bytes()?)?;
        match TunnelResponse::from_bytes(&reply)? {
            TunnelResponse::Candidates(message) => Ok(message),
            other => Err(TunnelError::Rpc(format!("unexpected reply {other:?}").into())),
        }
    }

    async fn sync(&self, edge: Arc<TunnelEdge>, message: SyncMessage) -> ringlink_tunnel::Result<bool> {
        let remote = self.remote(edge.remote_ta().target())?;
        let remote_id = edge
            .remote_id()
            .ok_or_else(|| TunnelError::Rpc("edge has no remote id yet".into()))?;
        let remote_edge = remote
            .listener
            .edge(remote_id)
            .ok_or_else(|| TunnelError::Rpc(format!("no edge {remote_id} at peer").into()))?;
        let reply = remote.listener.handle_rpc_bytes(
            RpcOrigin::Tunnel(remote_edge),
            &TunnelRequest::Sync(message).to_bytes()?,
        )?;
        match TunnelResponse::from_bytes(&reply)? {
            TunnelResponse::Synced(ok) => Ok(ok),
            other => Err(TunnelError::Rpc(format!("unexpected reply {other:?}").into())),
        }
    }
}

#[async_trait]
impl Linker for NodeServices {
    async fn connect(&self, target: Address, con_type: ConnectionType) -> Result<(), CoreError> {
        self.network()?.connect(self.me, target, con_type)
    }

    fn close(&self, connection: &Connection, reason: &str) {
        tracing::debug!("{} closing {}: {}", self.me, connection.address(), reason);
        if let Ok(network) = self.network() {
            network.disconnect(self.me, *connection.address());
        }
    }
}
