//! Latency-ranked overlap backed by network-coordinate estimates

use super::{OverlapStrategy, RecencyOverlap, intersect, matching_forwarders};
use crate::address::TunnelAddress;
use crate::config::TunnelConfig;
use crate::rpc::{SyncEntry, SyncMessage};
use ringlink_core::{Address, Connection, ConnectionList, LatencyOracle};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Strategy preferring the lowest measured latency
///
/// Unknown latencies rank after every known one. When no usable latency
/// exists for any candidate, potential-overlap selection falls back to
/// [`RecencyOverlap`].
pub struct LatencyOverlap {
    oracle: Arc<dyn LatencyOracle>,
    max_overlap: usize,
    fallback: RecencyOverlap,
}

impl LatencyOverlap {
    /// Create a strategy ranking by `oracle`
    #[must_use]
    pub fn new(oracle: Arc<dyn LatencyOracle>, config: &TunnelConfig) -> Self {
        Self {
            oracle,
            max_overlap: config.max_overlap,
            fallback: RecencyOverlap::from_config(config),
        }
    }

    fn latency(&self, addr: &Address) -> Option<f64> {
        self.oracle.measured_latency(addr).filter(|l| usable(*l))
    }

    /// The `max_overlap` fastest connections, fastest first
    fn closest(&self, cons: impl IntoIterator<Item = Connection>) -> Vec<Connection> {
        // Oracle answers can change between calls, so sample once
        let mut ranked: Vec<(Option<f64>, Connection)> = cons
            .into_iter()
            .map(|c| (self.latency(c.address()), c))
            .collect();
        ranked.sort_by(|(a, _), (b, _)| compare_latency(*a, *b));
        ranked
            .into_iter()
            .take(self.max_overlap)
            .map(|(_, c)| c)
            .collect()
    }
}

impl fmt::Debug for LatencyOverlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencyOverlap")
            .field("max_overlap", &self.max_overlap)
            .finish_non_exhaustive()
    }
}

fn usable(latency: f64) -> bool {
    latency.is_finite() && latency >= 0.0
}

fn compare_latency(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl OverlapStrategy for LatencyOverlap {
    fn evaluate_potential_overlap(&self, message: &SyncMessage) -> Option<Address> {
        let mut ours: Option<(&Address, f64)> = None;
        let mut theirs: Option<(&Address, f64)> = None;

        for (addr, entry) in message.iter() {
            if entry.transport.is_tunnel() {
                continue;
            }
            if let Some(lat) = self.latency(addr) {
                if ours.is_none_or(|(_, best)| lat < best) {
                    ours = Some((addr, lat));
                }
            }
            if let Some(lat) = entry.latency.filter(|l| usable(*l)) {
                if theirs.is_none_or(|(_, best)| lat < best) {
                    theirs = Some((addr, lat));
                }
            }
        }

        let best = match (ours, theirs) {
            (Some(o), Some(t)) => Some(if t.1 < o.1 { t } else { o }),
            (o, t) => o.or(t),
        };
        match best {
            Some((addr, _)) => Some(*addr),
            None => self.fallback.evaluate_potential_overlap(message),
        }
    }

    fn evaluate_overlap(
        &self,
        connections: &ConnectionList,
        message: &SyncMessage,
    ) -> Vec<Connection> {
        self.closest(intersect(connections, message))
    }

    fn sync_message(
        &self,
        current_overlap: &[Connection],
        _local: &Address,
        connections: &ConnectionList,
    ) -> SyncMessage {
        let now = Instant::now();
        let mut msg = SyncMessage::new();
        for con in current_overlap.iter().cloned().chain(self.closest(connections.iter().cloned())) {
            let latency = self.latency(con.address());
            msg.insert(*con.address(), SyncEntry::for_connection(&con, now, latency));
        }
        msg
    }

    fn find_overlap(&self, ta: &TunnelAddress, connections: &ConnectionList) -> Vec<Connection> {
        self.closest(matching_forwarders(ta, connections))
    }
}
