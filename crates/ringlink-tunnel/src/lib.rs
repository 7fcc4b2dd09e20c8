//! # Ringlink Tunnel
//!
//! Tunnel edges for the Ringlink overlay.
//!
//! Two peers that cannot open a direct transport connection build a virtual
//! point-to-point edge by forwarding datagrams through the neighbours they
//! share (the edge's *overlap*). This crate provides:
//!
//! - [`TunnelAddress`]: a peer plus the prefixes of the neighbours it can be
//!   reached through
//! - [`TunnelEdge`]: the virtual edge, its overlap and its id pair
//! - [`OverlapStrategy`]: recency-ranked and latency-ranked overlap policies
//! - [`TunnelListener`]: edge creation, inbound demultiplexing, overlap
//!   synchronization and trimming of bridging connections
//! - [`OverlapConnector`]: deduplicated bridging connections
//!
//! ## Example
//!
//! ```rust
//! use ringlink_core::Address;
//! use ringlink_tunnel::TunnelAddress;
//!
//! let target = Address::from_bytes([1u8; 20]);
//! let forwarder = Address::from_bytes([2u8; 20]);
//! let ta = TunnelAddress::new(target, [forwarder]);
//!
//! let parsed: TunnelAddress = ta.to_string().parse().unwrap();
//! assert_eq!(parsed, ta);
//! assert!(parsed.contains_forwarder(&forwarder));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod config;
pub mod connector;
pub mod edge;
pub mod error;
pub mod listener;
pub mod overlap;
pub mod registry;
pub mod rpc;
pub mod selector;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use address::{TUNNEL_SCHEME, TunnelAddress};
pub use config::TunnelConfig;
pub use connector::{ConnectCallback, OverlapConnector};
pub use edge::{EdgeObserver, TunnelEdge};
pub use error::{Result, TunnelError};
pub use listener::{
    DataOrigin, DropReason, EdgeCallback, InboundOutcome, ListenerObserver, TunnelListener,
    TunnelServices,
};
pub use overlap::{LatencyOverlap, OverlapStrategy, RecencyOverlap, TrimPolicy};
pub use registry::{EdgeRegistry, RegistryStats};
pub use rpc::{RpcOrigin, SyncEntry, SyncMessage, TunnelRequest, TunnelResponse, TunnelRpc};
pub use selector::{
    ForwarderSelector, SelectorFactory, SimpleForwarderSelector, SimpleSelectorFactory,
};
