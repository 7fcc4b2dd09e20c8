//! Shared fixtures for the integration tests

pub mod overlay;

pub use overlay::{MemoryEdge, MemoryNetwork, TestNode, eventually, init_tracing, node_address};
