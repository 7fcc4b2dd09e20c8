//! Multi-node tunnel scenarios over the in-memory overlay.
//!
//! Peers A and B are never allowed to link directly; every scenario builds
//! a tunnel edge between them through shared neighbours.

use ringlink_core::{ConnectionType, Edge};
use ringlink_integration_tests::fixtures::{MemoryNetwork, TestNode, eventually, init_tracing};
use ringlink_tunnel::{DropReason, InboundOutcome, TunnelEdge, TunnelError};
use std::sync::Arc;

/// A and B behind a common neighbour C
fn triangle() -> (Arc<MemoryNetwork>, Arc<TestNode>, Arc<TestNode>, Arc<TestNode>) {
    init_tracing();
    let net = MemoryNetwork::new();
    let a = net.add_node(10);
    let b = net.add_node(200);
    let c = net.add_node(100);
    net.block(&a, &b);
    net.link(&a, &c).unwrap();
    net.link(&b, &c).unwrap();
    (net, a, b, c)
}

fn only_edge(node: &TestNode) -> Arc<TunnelEdge> {
    let edges = node.listener.edges();
    assert_eq!(edges.len(), 1, "expected exactly one edge");
    Arc::clone(&edges[0])
}

/// Open A → B and exchange one datagram each way so both ids are bound
async fn established(a: &TestNode, b: &TestNode) -> (Arc<TunnelEdge>, Arc<TunnelEdge>) {
    let a_edge = a
        .open_edge(b.listener.local_address().as_ref().clone())
        .await
        .unwrap();
    a_edge.send(b"hello").unwrap();
    let b_edge = only_edge(b);
    b_edge.send(b"world").unwrap();
    (a_edge, b_edge)
}

#[tokio::test]
async fn test_edge_through_shared_neighbour() -> anyhow::Result<()> {
    let (_net, a, b, c) = triangle();

    let a_edge = a.open_edge(b.listener.local_address().as_ref().clone()).await?;
    assert_eq!(a_edge.overlap().len(), 1);
    assert_eq!(a_edge.overlap()[0].address(), &c.address);
    assert_eq!(a_edge.remote_id(), None);

    // First datagram is relayed by C and creates B's edge
    a_edge.send(b"hello")?;
    let b_edge = only_edge(&b);
    assert!(b_edge.is_inbound());
    assert_eq!(b_edge.remote_id(), Some(a_edge.local_id()));
    assert_eq!(b_edge.remote_ta().target(), &a.address);
    assert_eq!(b.received(), vec![(b_edge.local_id(), b"hello".to_vec())]);

    // B already knows both ids; its reply travels with a routing header
    b_edge.send(b"world")?;
    assert_eq!(a_edge.remote_id(), Some(b_edge.local_id()));
    assert_eq!(a.received(), vec![(a_edge.local_id(), b"world".to_vec())]);

    a_edge.send(b"again")?;
    assert_eq!(
        b.outcomes(),
        vec![
            Ok(InboundOutcome::Delivered {
                local_id: b_edge.local_id(),
                created: true,
            }),
            Ok(InboundOutcome::Delivered {
                local_id: b_edge.local_id(),
                created: false,
            }),
        ]
    );
    assert_eq!(b.received().len(), 2);
    assert_eq!(b.listener.edge_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_bridging_connection_creates_overlap() -> anyhow::Result<()> {
    init_tracing();
    let net = MemoryNetwork::new();
    let a = net.add_node(10);
    let b = net.add_node(200);
    let c = net.add_node(50);
    let d = net.add_node(150);
    net.block(&a, &b);
    net.link(&a, &c)?;
    net.link(&b, &d)?;

    let a_edge = a.open_edge(b.listener.local_address().as_ref().clone()).await?;
    assert_eq!(a_edge.overlap()[0].address(), &d.address);

    let bridge = a.table().find(&d.address).cloned().expect("bridged to D");
    assert_eq!(bridge.con_type(), ConnectionType::StructuredOverlap);

    a_edge.send(b"through d")?;
    let b_edge = only_edge(&b);
    assert_eq!(b_edge.overlap()[0].address(), &d.address);
    assert_eq!(b.received(), vec![(b_edge.local_id(), b"through d".to_vec())]);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_candidate_fails_creation() {
    init_tracing();
    let net = MemoryNetwork::new();
    let a = net.add_node(10);
    let b = net.add_node(200);
    let d = net.add_node(150);
    net.block(&a, &b);
    net.block(&a, &d);
    net.link(&b, &d).unwrap();

    let err = a
        .open_edge(b.listener.local_address().as_ref().clone())
        .await
        .unwrap_err();
    assert_eq!(err, TunnelError::NotEnoughForwarders);
    assert_eq!(a.listener.edge_count(), 0);
}

#[tokio::test]
async fn test_direct_connection_preferred() {
    let (net, a, _b, c) = triangle();
    let f = net.add_node(201);
    net.link(&a, &f).unwrap();
    net.link(&c, &f).unwrap();

    let err = a
        .open_edge(f.listener.local_address().as_ref().clone())
        .await
        .unwrap_err();
    assert_eq!(err, TunnelError::DirectConnectionExists);
    assert_eq!(a.listener.edge_count(), 0);
}

#[tokio::test]
async fn test_losing_shared_neighbour_closes_both_ends() {
    let (net, a, b, c) = triangle();
    let (a_edge, b_edge) = established(&a, &b).await;

    net.unlink(&a, &c);
    assert!(a_edge.is_closed());
    assert_eq!(a.listener.edge_count(), 0);

    net.unlink(&b, &c);
    assert!(b_edge.is_closed());
    assert_eq!(b.listener.edge_count(), 0);
}

#[tokio::test]
async fn test_sync_extends_peer_overlap() {
    init_tracing();
    let net = MemoryNetwork::new();
    let a = net.add_node(10);
    let b = net.add_node(200);
    let c1 = net.add_node(100);
    let c2 = net.add_node(110);
    net.block(&a, &b);
    for shared in [&c1, &c2] {
        net.link(&a, shared).unwrap();
        net.link(&b, shared).unwrap();
    }

    let (a_edge, b_edge) = established(&a, &b).await;
    assert_eq!(a_edge.overlap().len(), 2);
    assert_eq!(b_edge.overlap().len(), 1);

    // New connection at A pushes its candidates to B over the edge
    let e = net.add_node(30);
    net.link(&a, &e).unwrap();
    assert!(eventually(|| b_edge.overlap().len() == 2).await);
    assert!(!b_edge.is_closed());
}

#[tokio::test]
async fn test_stale_ids_are_dropped() {
    let (_net, a, b, _c) = triangle();
    let (a_edge, b_edge) = established(&a, &b).await;

    b_edge.close();
    assert_eq!(b.listener.edge_count(), 0);

    a_edge.send(b"late").unwrap();
    assert_eq!(
        b.outcomes().last(),
        Some(&Ok(InboundOutcome::Dropped(DropReason::UnknownEdge)))
    );
    assert_eq!(b.received().len(), 1);
}

#[tokio::test]
async fn test_stopped_listener_refuses_traffic() {
    let (_net, a, b, _c) = triangle();
    let (a_edge, b_edge) = established(&a, &b).await;

    b.listener.stop();
    assert!(b_edge.is_closed());
    a_edge.send(b"after stop").unwrap();
    assert_eq!(
        b.outcomes().last(),
        Some(&Ok(InboundOutcome::Dropped(DropReason::NotRunning)))
    );

    let err = b
        .open_edge(a.listener.local_address().as_ref().clone())
        .await
        .unwrap_err();
    assert_eq!(err, TunnelError::NotRunning);
}
