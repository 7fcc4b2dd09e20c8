//! # Ringlink Core
//!
//! Overlay primitives shared by the Ringlink subsystems.
//!
//! This crate provides:
//! - 160-bit ring addresses with a base32 text form
//! - Connections and immutable, address-sorted connection snapshots
//! - Connection-table observer registration
//! - Collaborator traits for the surrounding node (senders, linker,
//!   action queue, latency oracle)
//!
//! ## Example
//!
//! ```rust
//! use ringlink_core::Address;
//!
//! let addr = Address::from_bytes([7u8; 20]);
//! let text = addr.to_string();
//! assert_eq!(text.parse::<Address>().unwrap(), addr);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod connection;
pub mod error;
pub mod overlay;

pub use address::{ADDRESS_LEN, Address, PREFIX_LEN};
pub use connection::{
    Connection, ConnectionEvent, ConnectionEventKind, ConnectionList, ConnectionObserver,
    ConnectionType, Edge, TransportKind,
};
pub use error::CoreError;
pub use overlay::{Action, ActionQueue, InlineActions, LatencyOracle, Linker, OverlaySender};
