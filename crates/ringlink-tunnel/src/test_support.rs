//! Fixtures shared by the unit tests

use parking_lot::Mutex;
use ringlink_core::{
    ADDRESS_LEN, Address, Connection, ConnectionType, CoreError, Edge, TransportKind,
};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Transport edge that records what is sent on it
#[derive(Debug)]
pub(crate) struct StubEdge {
    kind: TransportKind,
    closed: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl StubEdge {
    pub(crate) fn new(kind: TransportKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

impl Edge for StubEdge {
    fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    fn send(&self, data: &[u8]) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::EdgeClosed);
        }
        self.sent.lock().push(data.to_vec());
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

/// Address whose first byte is `first`, rest zero
pub(crate) fn addr(first: u8) -> Address {
    let mut bytes = [0u8; ADDRESS_LEN];
    bytes[0] = first;
    Address::from_bytes(bytes)
}

/// Fresh structured connection to `addr(first)`
pub(crate) fn con(first: u8, kind: TransportKind) -> Connection {
    Connection::new(addr(first), ConnectionType::Structured, StubEdge::new(kind))
}

/// Structured connection created `age` ago
pub(crate) fn con_aged(first: u8, kind: TransportKind, age: Duration) -> Connection {
    let created = Instant::now().checked_sub(age).unwrap_or_else(Instant::now);
    Connection::with_created_at(
        addr(first),
        ConnectionType::Structured,
        StubEdge::new(kind),
        created,
    )
}
