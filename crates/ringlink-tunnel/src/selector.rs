//! Forwarder selection.
//!
//! Each tunnel edge owns a selector that picks the connection carrying its
//! next outbound datagram. The working set is replaced wholesale on every
//! overlap update, and selection rotates over it.

use crate::error::{Result, TunnelError};
use parking_lot::RwLock;
use ringlink_core::Connection;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks the forwarder for each outbound datagram of one edge
pub trait ForwarderSelector: Send + Sync + fmt::Debug {
    /// Replace the working set with `connections`
    fn update(&self, connections: &[Connection]);

    /// Forwarder for the next send
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::NoForwarders`] if the working set is empty.
    fn next(&self) -> Result<Connection>;
}

/// Creates one selector per edge
pub trait SelectorFactory: Send + Sync {
    /// Fresh selector with an empty working set
    fn create(&self) -> Arc<dyn ForwarderSelector>;
}

/// Round robin over open, non-tunnel forwarders
///
/// Tunnel forwarders are used only when no direct forwarder remains, since
/// every tunnel hop adds a forwarding round.
#[derive(Debug)]
pub struct SimpleForwarderSelector {
    forwarders: RwLock<Arc<[Connection]>>,
    counter: AtomicUsize,
}

impl SimpleForwarderSelector {
    /// Create with an empty working set
    #[must_use]
    pub fn new() -> Self {
        Self {
            forwarders: RwLock::new(Vec::new().into()),
            counter: AtomicUsize::new(0),
        }
    }

    /// Current working set
    #[must_use]
    pub fn forwarders(&self) -> Arc<[Connection]> {
        Arc::clone(&self.forwarders.read())
    }
}

impl Default for SimpleForwarderSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwarderSelector for SimpleForwarderSelector {
    fn update(&self, connections: &[Connection]) {
        let open: Vec<Connection> = connections
            .iter()
            .filter(|c| !c.is_closed())
            .cloned()
            .collect();
        let working: Vec<Connection> = if open.iter().any(|c| !c.is_tunnel()) {
            open.into_iter().filter(|c| !c.is_tunnel()).collect()
        } else {
            open
        };
        *self.forwarders.write() = working.into();
    }

    fn next(&self) -> Result<Connection> {
        let forwarders = self.forwarders();
        if forwarders.is_empty() {
            return Err(TunnelError::NoForwarders);
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % forwarders.len();
        Ok(forwarders[idx].clone())
    }
}

/// Factory for [`SimpleForwarderSelector`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleSelectorFactory;

impl SelectorFactory for SimpleSelectorFactory {
    fn create(&self) -> Arc<dyn ForwarderSelector> {
        Arc::new(SimpleForwarderSelector::new())
    }
}
