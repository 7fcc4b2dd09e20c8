//! Ring Address and Distance Metric
//!
//! This module provides the [`Address`] type, a 160-bit identifier placing a
//! peer on the structured ring. Addresses are ordered as big-endian unsigned
//! integers and the ring wraps at 2^160, so "left" (increasing) and "right"
//! (decreasing) distances are both meaningful.
//!
//! The text form is the 32-character RFC 4648 base32 encoding of the 20
//! address bytes. The first 5 bytes (8 base32 characters) form the
//! forwarder prefix used by tunnel addresses.

use crate::error::CoreError;
use data_encoding::BASE32;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of an address in bytes
pub const ADDRESS_LEN: usize = 20;

/// Length of an address prefix in bytes (8 base32 characters)
pub const PREFIX_LEN: usize = 5;

/// 160-bit ring address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Number of bits in an Address
    pub const BITS: usize = 160;

    /// Generate a random Address
    ///
    /// # Examples
    ///
    /// ```
    /// use ringlink_core::Address;
    ///
    /// let a = Address::random();
    /// let b = Address::random();
    /// assert_ne!(a, b);
    /// ```
    #[must_use]
    pub fn random() -> Self {
        Self::random_with(&mut rand::thread_rng())
    }

    /// Generate a random Address from the supplied source
    #[must_use]
    pub fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        rng.fill(&mut bytes[..]);
        Self(bytes)
    }

    /// Create an Address from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Create an Address from a byte slice
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAddress`] if the slice is not 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let array: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            CoreError::InvalidAddress(
                format!("expected {ADDRESS_LEN} bytes, got {}", bytes.len()).into(),
            )
        })?;
        Ok(Self(array))
    }

    /// Get the raw bytes of the Address
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Leading bytes used to name this address as a forwarder
    #[must_use]
    pub fn prefix(&self) -> [u8; PREFIX_LEN] {
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&self.0[..PREFIX_LEN]);
        prefix
    }

    /// Base32 text form (32 characters, no padding)
    #[must_use]
    pub fn to_base32(&self) -> String {
        BASE32.encode(&self.0)
    }

    /// Parse the base32 text form
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAddress`] on bad characters or length.
    pub fn from_base32(text: &str) -> Result<Self, CoreError> {
        let bytes = BASE32
            .decode(text.as_bytes())
            .map_err(|e| CoreError::InvalidAddress(format!("{text}: {e}").into()))?;
        Self::from_slice(&bytes)
    }

    /// Distance walking from `self` to `other` in the increasing direction
    ///
    /// Computed as `(other - self) mod 2^160`.
    #[must_use]
    pub fn left_distance(&self, other: &Address) -> [u8; ADDRESS_LEN] {
        wrapping_sub(&other.0, &self.0)
    }

    /// Distance walking from `self` to `other` in the decreasing direction
    #[must_use]
    pub fn right_distance(&self, other: &Address) -> [u8; ADDRESS_LEN] {
        wrapping_sub(&self.0, &other.0)
    }

    /// Shortest distance around the ring in either direction
    ///
    /// # Examples
    ///
    /// ```
    /// use ringlink_core::Address;
    ///
    /// let low = Address::from_bytes([0u8; 20]);
    /// let high = Address::from_bytes([0xff; 20]);
    /// let mut one = [0u8; 20];
    /// one[19] = 1;
    /// // The ring wraps, so 0x00.. and 0xff.. are neighbours
    /// assert_eq!(low.ring_distance(&high), one);
    /// ```
    #[must_use]
    pub fn ring_distance(&self, other: &Address) -> [u8; ADDRESS_LEN] {
        let left = self.left_distance(other);
        let right = self.right_distance(other);
        left.min(right)
    }
}

/// Big-endian `a - b` modulo 2^160
fn wrapping_sub(a: &[u8; ADDRESS_LEN], b: &[u8; ADDRESS_LEN]) -> [u8; ADDRESS_LEN] {
    let mut out = [0u8; ADDRESS_LEN];
    let mut borrow = 0i16;
    for i in (0..ADDRESS_LEN).rev() {
        let mut diff = i16::from(a[i]) - i16::from(b[i]) - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = diff as u8;
    }
    out
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_base32()[..8])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base32())
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base32(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[ADDRESS_LEN - 1] = last;
        Address::from_bytes(bytes)
    }

    #[test]
    fn test_base32_roundtrip() {
        let a = Address::random();
        let text = a.to_base32();
        assert_eq!(text.len(), 32);
        assert_eq!(Address::from_base32(&text).unwrap(), a);
    }

    #[test]
    fn test_known_encoding() {
        let a = Address::from_base32("CADSL6GVVBM6V442CETP4JTEAWACLC5A").unwrap();
        assert_eq!(a.to_string(), "CADSL6GVVBM6V442CETP4JTEAWACLC5A");
        assert_eq!(BASE32.encode(&a.prefix()), "CADSL6GV");
    }

    #[test]
    fn test_invalid_base32() {
        assert!(Address::from_base32("not-base32").is_err());
        // Valid base32 but only 5 bytes
        assert!(Address::from_base32("CADSL6GV").is_err());
    }

    #[test]
    fn test_from_slice_length() {
        assert!(Address::from_slice(&[0u8; 19]).is_err());
        assert!(Address::from_slice(&[0u8; 20]).is_ok());
    }

    #[test]
    fn test_directional_distances() {
        let a = addr(10);
        let b = addr(15);
        assert_eq!(a.left_distance(&b), addr(5).0);
        assert_eq!(b.right_distance(&a), addr(5).0);
        // Walking right from 10 to 15 wraps nearly the whole ring
        assert_eq!(a.right_distance(&b)[0], 0xff);
    }

    #[test]
    fn test_ring_distance_symmetry() {
        let a = Address::random();
        let b = Address::random();
        assert_eq!(a.ring_distance(&b), b.ring_distance(&a));
        assert_eq!(a.ring_distance(&a), [0u8; ADDRESS_LEN]);
    }

    #[test]
    fn test_ordering_is_big_endian() {
        let mut hi = [0u8; ADDRESS_LEN];
        hi[0] = 1;
        assert!(Address::from_bytes(hi) > addr(0xff));
    }
}
