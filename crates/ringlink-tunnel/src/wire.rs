//! Tunnel wire framing.
//!
//! Every tunnel datagram starts with an 8-byte id pair, big-endian, written
//! from the sender's point of view:
//!
//! ```text
//! +----------------+----------------+------------------+
//! | sender id (4)  | receiver id (4)| opaque payload   |
//! +----------------+----------------+------------------+
//! ```
//!
//! so the receiver reads `remote_id | local_id | payload`. A receiver id of
//! [`UNASSIGNED_ID`] asks the receiver to allocate a new edge.
//!
//! Datagrams sent directly on a forwarder connection are additionally
//! prefixed with a [`RoutingHeader`] so the forwarder can deliver them to
//! the tunnel peer with exact routing.

use crate::error::{Result, TunnelError};
use ringlink_core::{ADDRESS_LEN, Address};

/// Length of the id pair
pub const ID_HEADER_LEN: usize = 8;

/// Id value meaning "not assigned yet"
pub const UNASSIGNED_ID: i32 = -1;

/// Protocol tag of overlay-routed packets
pub const PROTOCOL_ROUTED: u8 = 0x01;

/// Protocol tag of tunnel payloads
pub const PROTOCOL_TUNNEL: u8 = 0x54;

/// Length of an encoded [`RoutingHeader`] including both protocol tags
pub const ROUTING_HEADER_LEN: usize = 1 + 2 + 2 + ADDRESS_LEN * 2 + 2 + 1;

/// Default time-to-live of a routed packet
pub const DEFAULT_TTL: u16 = 20;

/// Routing option: deliver only to the exact destination
pub const OPTION_EXACT: u16 = 0x0003;

/// Zero-copy view of an inbound tunnel datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelFrame<'a> {
    /// Id the sender uses for its end of the edge
    pub remote_id: i32,
    /// Id the sender believes we use, or [`UNASSIGNED_ID`]
    pub local_id: i32,
    /// Everything after the id pair
    pub payload: &'a [u8],
}

impl<'a> TunnelFrame<'a> {
    /// Parse the id pair at the start of `data`
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::FrameTooShort`] if `data` is shorter than
    /// [`ID_HEADER_LEN`].
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < ID_HEADER_LEN {
            return Err(TunnelError::FrameTooShort {
                expected: ID_HEADER_LEN,
                actual: data.len(),
            });
        }

        let remote_id = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let local_id = i32::from_be_bytes([data[4], data[5], data[6], data[7]]);

        Ok(Self {
            remote_id,
            local_id,
            payload: &data[ID_HEADER_LEN..],
        })
    }

    /// Whether the sender asked us to allocate an edge
    #[must_use]
    pub fn is_first_contact(&self) -> bool {
        self.local_id == UNASSIGNED_ID
    }
}

/// Encode the id pair as the sender writes it
#[must_use]
pub fn encode_ids(local_id: i32, remote_id: i32) -> [u8; ID_HEADER_LEN] {
    let mut ids = [0u8; ID_HEADER_LEN];
    ids[..4].copy_from_slice(&local_id.to_be_bytes());
    ids[4..].copy_from_slice(&remote_id.to_be_bytes());
    ids
}

/// Assemble `prefix | ids | payload` into one buffer
#[must_use]
pub fn assemble(prefix: &[u8], ids: &[u8; ID_HEADER_LEN], payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(prefix.len() + ID_HEADER_LEN + payload.len());
    buf.extend_from_slice(prefix);
    buf.extend_from_slice(ids);
    buf.extend_from_slice(payload);
    buf
}

/// Overlay routing header carried in front of directly-sent tunnel datagrams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingHeader {
    /// Hops taken so far
    pub hops: u16,
    /// Remaining hop budget
    pub ttl: u16,
    /// Originating peer
    pub source: Address,
    /// Destination peer
    pub destination: Address,
    /// Routing options
    pub options: u16,
}

impl RoutingHeader {
    /// Exact-delivery header from `source` to `destination`, as emitted by a
    /// peer one hop away from the destination
    #[must_use]
    pub fn exact(source: Address, destination: Address) -> Self {
        Self {
            hops: 1,
            ttl: DEFAULT_TTL,
            source,
            destination,
            options: OPTION_EXACT,
        }
    }

    /// Encode including the routed and tunnel protocol tags
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ROUTING_HEADER_LEN);
        buf.push(PROTOCOL_ROUTED);
        buf.extend_from_slice(&self.hops.to_be_bytes());
        buf.extend_from_slice(&self.ttl.to_be_bytes());
        buf.extend_from_slice(self.source.as_bytes());
        buf.extend_from_slice(self.destination.as_bytes());
        buf.extend_from_slice(&self.options.to_be_bytes());
        buf.push(PROTOCOL_TUNNEL);
        buf
    }

    /// Parse a header and return the tunnel datagram following it
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is short or the protocol tags are not
    /// routed/tunnel.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < ROUTING_HEADER_LEN {
            return Err(TunnelError::FrameTooShort {
                expected: ROUTING_HEADER_LEN,
                actual: data.len(),
            });
        }
        if data[0] != PROTOCOL_ROUTED || data[ROUTING_HEADER_LEN - 1] != PROTOCOL_TUNNEL {
            return Err(TunnelError::Deserialization(format!(
                "unexpected protocol tags {:#04x}/{:#04x}",
                data[0],
                data[ROUTING_HEADER_LEN - 1]
            )));
        }

        let hops = u16::from_be_bytes([data[1], data[2]]);
        let ttl = u16::from_be_bytes([data[3], data[4]]);
        let src_start = 5;
        let dst_start = src_start + ADDRESS_LEN;
        let opt_start = dst_start + ADDRESS_LEN;
        let source = Address::from_slice(&data[src_start..dst_start])?;
        let destination = Address::from_slice(&data[dst_start..opt_start])?;
        let options = u16::from_be_bytes([data[opt_start], data[opt_start + 1]]);

        Ok((
            Self {
                hops,
                ttl,
                source,
                destination,
                options,
            },
            &data[ROUTING_HEADER_LEN..],
        ))
    }
}
