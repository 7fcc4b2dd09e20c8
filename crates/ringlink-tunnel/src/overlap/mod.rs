//! Overlap strategies.
//!
//! An overlap strategy decides which shared neighbours carry a tunnel:
//!
//! ```text
//!   local table ──┐                      ┌── remote SyncMessage
//!                 ├── evaluate_overlap ──┤
//!                 │   find_overlap       │
//!                 ▼                      ▼
//!             [overlap connections, at most max_overlap]
//! ```
//!
//! When nothing is shared, [`OverlapStrategy::evaluate_potential_overlap`]
//! names one of the remote candidates to connect to so that an overlap
//! exists afterwards.

mod latency;
mod recency;

pub use latency::LatencyOverlap;
pub use recency::{RecencyOverlap, TrimPolicy};

use crate::address::TunnelAddress;
use crate::rpc::SyncMessage;
use ringlink_core::{Address, Connection, ConnectionList};
use std::fmt;

/// Policy computing tunnel overlap
pub trait OverlapStrategy: Send + Sync + fmt::Debug {
    /// Pick a non-tunnel candidate from `message` worth connecting to
    fn evaluate_potential_overlap(&self, message: &SyncMessage) -> Option<Address>;

    /// Local connections also advertised in `message`, trimmed
    fn evaluate_overlap(&self, connections: &ConnectionList, message: &SyncMessage)
    -> Vec<Connection>;

    /// Candidates to advertise: `current_overlap` first, then local picks
    fn sync_message(
        &self,
        current_overlap: &[Connection],
        local: &Address,
        connections: &ConnectionList,
    ) -> SyncMessage;

    /// Local connections matching a forwarder prefix of `ta`, trimmed
    fn find_overlap(&self, ta: &TunnelAddress, connections: &ConnectionList) -> Vec<Connection>;
}

/// Local connections advertised in `message`
///
/// A candidate we only reach by tunnel is skipped when the peer also reaches
/// it by tunnel; routing across two tunnels is not supported.
pub(crate) fn intersect(connections: &ConnectionList, message: &SyncMessage) -> Vec<Connection> {
    message
        .iter()
        .filter_map(|(addr, entry)| {
            let con = connections.find(addr)?;
            if con.is_tunnel() && entry.transport.is_tunnel() {
                return None;
            }
            Some(con.clone())
        })
        .collect()
}

/// Local connections whose address matches a forwarder prefix of `ta`
pub(crate) fn matching_forwarders(
    ta: &TunnelAddress,
    connections: &ConnectionList,
) -> Vec<Connection> {
    connections
        .iter()
        .filter(|c| ta.contains_forwarder(c.address()))
        .cloned()
        .collect()
}
