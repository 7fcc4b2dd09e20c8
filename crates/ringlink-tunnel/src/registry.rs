//! Local id → edge registry
//!
//! Inbound datagrams carry our local id for the edge they belong to. The
//! registry resolves that id and allocates fresh, non-colliding ids for new
//! edges.
//!
//! Uses DashMap so lookups on the datagram path do not contend with edge
//! creation and removal.

use crate::edge::TunnelEdge;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Edge registry keyed by local id
pub struct EdgeRegistry {
    /// Local id → live edge
    edges: DashMap<i32, Arc<TunnelEdge>>,

    /// Local id source
    rng: Mutex<StdRng>,

    /// Statistics: total lookups performed
    total_lookups: AtomicU64,

    /// Statistics: lookups that found an edge
    successful_lookups: AtomicU64,

    /// Statistics: lookups for an unknown id
    failed_lookups: AtomicU64,
}

impl EdgeRegistry {
    /// Create an empty registry; ids are deterministic when `seed` is given
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            edges: DashMap::new(),
            rng: Mutex::new(rng),
            total_lookups: AtomicU64::new(0),
            successful_lookups: AtomicU64::new(0),
            failed_lookups: AtomicU64::new(0),
        }
    }

    /// Allocate an unused local id and register the edge built for it
    ///
    /// Ids are drawn from `[0, i32::MAX)`; a collision with a live edge
    /// draws again.
    pub(crate) fn register(&self, build: impl FnOnce(i32) -> Arc<TunnelEdge>) -> Arc<TunnelEdge> {
        loop {
            let id = self.rng.lock().gen_range(0..i32::MAX);
            match self.edges.entry(id) {
                Entry::Vacant(slot) => {
                    let edge = build(id);
                    slot.insert(Arc::clone(&edge));
                    tracing::debug!("Registered edge {} to {}", id, edge.remote_ta().target());
                    return edge;
                }
                Entry::Occupied(_) => {
                    tracing::trace!("Local id {} in use, drawing again", id);
                }
            }
        }
    }

    /// Remove `edge` if it is still the one registered under its id
    pub fn remove(&self, edge: &TunnelEdge) -> bool {
        let removed = self
            .edges
            .remove_if(&edge.local_id(), |_, e| std::ptr::eq(Arc::as_ptr(e), edge))
            .is_some();
        if removed {
            tracing::debug!("Removed edge {}", edge.local_id());
        }
        removed
    }

    /// Edge registered under `local_id`
    pub fn lookup(&self, local_id: i32) -> Option<Arc<TunnelEdge>> {
        self.total_lookups.fetch_add(1, Ordering::Relaxed);

        match self.edges.get(&local_id) {
            Some(entry) => {
                self.successful_lookups.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(entry.value()))
            }
            None => {
                self.failed_lookups.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Edge registered under `local_id`, without counting a lookup
    #[must_use]
    pub fn get(&self, local_id: i32) -> Option<Arc<TunnelEdge>> {
        self.edges.get(&local_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `local_id` is registered
    #[must_use]
    pub fn contains(&self, local_id: i32) -> bool {
        self.edges.contains_key(&local_id)
    }

    /// Snapshot of all live edges
    #[must_use]
    pub fn edges(&self) -> Vec<Arc<TunnelEdge>> {
        self.edges.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Number of live edges
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether no edges are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Registry statistics
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_edges: self.edges.len(),
            total_lookups: self.total_lookups.load(Ordering::Relaxed),
            successful_lookups: self.successful_lookups.load(Ordering::Relaxed),
            failed_lookups: self.failed_lookups.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for EdgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeRegistry")
            .field("edges", &self.edges.len())
            .finish_non_exhaustive()
    }
}

/// Edge registry statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live edges
    pub active_edges: usize,
    /// Total id lookups
    pub total_lookups: u64,
    /// Lookups that found an edge
    pub successful_lookups: u64,
    /// Lookups for unknown ids
    pub failed_lookups: u64,
}

impl RegistryStats {
    /// Fraction of lookups that found an edge (0.0 when none were made)
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.total_lookups == 0 {
            return 0.0;
        }
        self.successful_lookups as f64 / self.total_lookups as f64
    }
}
