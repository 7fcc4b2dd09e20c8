//! Bridging connections.
//!
//! When two tunnel endpoints share no neighbour, one of them connects to a
//! candidate advertised by the other so that an overlap exists. The
//! connector keeps at most one attempt in flight per target; every caller
//! waiting on that target is answered once the attempt finishes.

use parking_lot::Mutex;
use ringlink_core::{Address, ConnectionType, CoreError, Linker};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Completion of a bridging attempt
pub type ConnectCallback = Box<dyn FnOnce(Result<(), CoreError>) + Send + 'static>;

type Pending = Arc<Mutex<HashMap<Address, Vec<ConnectCallback>>>>;

/// Deduplicating bridging-connection helper
pub struct OverlapConnector {
    linker: Arc<dyn Linker>,
    pending: Pending,
    active: AtomicBool,
}

impl OverlapConnector {
    /// Create an active connector using `linker`
    #[must_use]
    pub fn new(linker: Arc<dyn Linker>) -> Self {
        Self {
            linker,
            pending: Arc::new(Mutex::new(HashMap::new())),
            active: AtomicBool::new(true),
        }
    }

    /// Connect to `target` as structured overlap and report to `callback`
    ///
    /// Joins an in-flight attempt for `target` when there is one. Must be
    /// called within a Tokio runtime.
    pub fn connect_to(
        &self,
        target: Address,
        callback: impl FnOnce(Result<(), CoreError>) + Send + 'static,
    ) {
        if !self.is_active() {
            callback(Err(CoreError::LinkFailed("overlap connector inactive".into())));
            return;
        }

        {
            let mut pending = self.pending.lock();
            if let Some(waiters) = pending.get_mut(&target) {
                waiters.push(Box::new(callback));
                tracing::trace!("Joined pending bridging attempt to {}", target);
                return;
            }
            pending.insert(target, vec![Box::new(callback)]);
        }

        tracing::debug!("Starting bridging connection to {}", target);
        let linker = Arc::clone(&self.linker);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let result = linker
                .connect(target, ConnectionType::StructuredOverlap)
                .await;
            if let Err(e) = &result {
                tracing::debug!("Bridging connection to {} failed: {}", target, e);
            }
            let waiters = pending.lock().remove(&target).unwrap_or_default();
            for waiter in waiters {
                waiter(result.clone());
            }
        });
    }

    /// Whether new attempts are accepted
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Accept new attempts
    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Refuse new attempts; in-flight attempts still complete
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Targets with an attempt in flight
    #[must_use]
    pub fn pending_targets(&self) -> usize {
        self.pending.lock().len()
    }
}

impl std::fmt::Debug for OverlapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlapConnector")
            .field("active", &self.is_active())
            .field("pending", &self.pending_targets())
            .finish_non_exhaustive()
    }
}
