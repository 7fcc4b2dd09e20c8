//! Recency-ranked overlap

use super::{OverlapStrategy, intersect, matching_forwarders};
use crate::address::TunnelAddress;
use crate::config::TunnelConfig;
use crate::rpc::{SyncEntry, SyncMessage};
use ringlink_core::{Address, Connection, ConnectionList};
use std::time::Instant;

/// Which end of the creation-time ordering survives a trim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimPolicy {
    /// Keep the most recently created connections
    #[default]
    KeepNewest,
    /// Keep the longest-lived connections
    KeepOldest,
}

/// Default strategy: ranks overlap by connection creation time and
/// advertises the ring window around the local address
#[derive(Debug, Clone)]
pub struct RecencyOverlap {
    max_overlap: usize,
    sync_candidates: usize,
    trim: TrimPolicy,
}

impl RecencyOverlap {
    /// Create a strategy keeping at most `max_overlap` connections and
    /// advertising up to `sync_candidates` ring neighbours
    #[must_use]
    pub fn new(max_overlap: usize, sync_candidates: usize) -> Self {
        Self {
            max_overlap,
            sync_candidates,
            trim: TrimPolicy::default(),
        }
    }

    /// Create from listener configuration
    #[must_use]
    pub fn from_config(config: &TunnelConfig) -> Self {
        Self::new(config.max_overlap, config.sync_candidates)
    }

    /// Override the trim policy
    #[must_use]
    pub fn with_trim_policy(mut self, trim: TrimPolicy) -> Self {
        self.trim = trim;
        self
    }

    /// Active trim policy
    #[must_use]
    pub fn trim_policy(&self) -> TrimPolicy {
        self.trim
    }

    /// Sort by creation time and keep `max_overlap` according to the policy
    pub(crate) fn trim(&self, mut cons: Vec<Connection>) -> Vec<Connection> {
        cons.sort_by_key(Connection::created_at);
        if cons.len() > self.max_overlap {
            match self.trim {
                TrimPolicy::KeepNewest => {
                    cons.drain(..cons.len() - self.max_overlap);
                }
                TrimPolicy::KeepOldest => cons.truncate(self.max_overlap),
            }
        }
        cons
    }
}

impl Default for RecencyOverlap {
    fn default() -> Self {
        Self::from_config(&TunnelConfig::default())
    }
}

impl OverlapStrategy for RecencyOverlap {
    /// Longest-lived non-tunnel candidate; ties go to the smaller address
    fn evaluate_potential_overlap(&self, message: &SyncMessage) -> Option<Address> {
        let mut best: Option<(&Address, u64)> = None;
        for (addr, entry) in message.iter() {
            if entry.transport.is_tunnel() {
                continue;
            }
            if best.is_none_or(|(_, age)| entry.age_ms > age) {
                best = Some((addr, entry.age_ms));
            }
        }
        best.map(|(addr, _)| *addr)
    }

    fn evaluate_overlap(
        &self,
        connections: &ConnectionList,
        message: &SyncMessage,
    ) -> Vec<Connection> {
        self.trim(intersect(connections, message))
    }

    fn sync_message(
        &self,
        current_overlap: &[Connection],
        local: &Address,
        connections: &ConnectionList,
    ) -> SyncMessage {
        let now = Instant::now();
        let mut msg = SyncMessage::new();
        for con in current_overlap {
            msg.insert(*con.address(), SyncEntry::for_connection(con, now, None));
        }

        let idx = match connections.index_of(local) {
            Ok(idx) | Err(idx) => idx as isize,
        };
        let window = connections.len().min(self.sync_candidates) as isize;
        let start = idx - window / 2;
        for i in start..start + window {
            if let Some(con) = connections.get_wrapped(i) {
                msg.insert(*con.address(), SyncEntry::for_connection(con, now, None));
            }
        }
        msg
    }

    fn find_overlap(&self, ta: &TunnelAddress, connections: &ConnectionList) -> Vec<Connection> {
        self.trim(matching_forwarders(ta, connections))
    }
}
