//! Tunnel transport addresses.
//!
//! A tunnel address names the remote peer plus the neighbours it can be
//! reached through. Forwarders are stored as 5-byte address prefixes, which
//! is enough to recognise a shared neighbour while keeping the text form
//! short:
//!
//! ```text
//! brunet.tunnel://<base32 target>/<prefix1>+<prefix2>+...+<prefixN>
//! ```
//!
//! Each prefix is 8 base32 characters.

use crate::error::TunnelError;
use data_encoding::BASE32;
use ringlink_core::{Address, Connection, PREFIX_LEN};
use std::fmt;
use std::str::FromStr;

/// URI scheme of tunnel addresses
pub const TUNNEL_SCHEME: &str = "brunet.tunnel://";

/// Base32 length of a forwarder prefix
const PREFIX_CHARS: usize = 8;

/// Leading bytes of a forwarder's address
pub type ForwarderPrefix = [u8; PREFIX_LEN];

/// Address of a tunnel endpoint: target plus sorted forwarder prefixes
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TunnelAddress {
    target: Address,
    forwarders: Vec<ForwarderPrefix>,
}

impl TunnelAddress {
    /// Create from a target and any number of forwarder addresses
    ///
    /// Duplicate prefixes collapse and order does not matter.
    ///
    /// # Examples
    ///
    /// ```
    /// use ringlink_core::Address;
    /// use ringlink_tunnel::TunnelAddress;
    ///
    /// let target = Address::random();
    /// let a = Address::random();
    /// let b = Address::random();
    /// assert_eq!(
    ///     TunnelAddress::new(target, [a, b]),
    ///     TunnelAddress::new(target, [b, a, b]),
    /// );
    /// ```
    #[must_use]
    pub fn new(target: Address, forwarders: impl IntoIterator<Item = Address>) -> Self {
        Self::from_prefixes(target, forwarders.into_iter().map(|a| a.prefix()))
    }

    /// Create from a target and the connections it is reachable through
    #[must_use]
    pub fn from_connections<'a>(
        target: Address,
        connections: impl IntoIterator<Item = &'a Connection>,
    ) -> Self {
        Self::new(target, connections.into_iter().map(|c| *c.address()))
    }

    /// Create from a target and raw prefixes
    #[must_use]
    pub fn from_prefixes(
        target: Address,
        prefixes: impl IntoIterator<Item = ForwarderPrefix>,
    ) -> Self {
        let mut forwarders: Vec<ForwarderPrefix> = prefixes.into_iter().collect();
        forwarders.sort_unstable();
        forwarders.dedup();
        Self { target, forwarders }
    }

    /// The peer this address names
    #[must_use]
    pub fn target(&self) -> &Address {
        &self.target
    }

    /// Sorted forwarder prefixes
    #[must_use]
    pub fn forwarders(&self) -> &[ForwarderPrefix] {
        &self.forwarders
    }

    /// Whether `addr` matches one of the forwarder prefixes
    #[must_use]
    pub fn contains_forwarder(&self, addr: &Address) -> bool {
        self.forwarders.binary_search(&addr.prefix()).is_ok()
    }
}

impl fmt::Display for TunnelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TUNNEL_SCHEME}{}/", self.target.to_base32())?;
        for (i, prefix) in self.forwarders.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            f.write_str(&BASE32.encode(prefix))?;
        }
        Ok(())
    }
}

impl fmt::Debug for TunnelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TunnelAddress({self})")
    }
}

impl FromStr for TunnelAddress {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(TUNNEL_SCHEME)
            .ok_or_else(|| TunnelError::InvalidAddress(format!("bad scheme: {s}").into()))?;
        let (target, forwarders) = rest
            .split_once('/')
            .ok_or_else(|| TunnelError::InvalidAddress(format!("missing '/': {s}").into()))?;

        let target = Address::from_base32(target)
            .map_err(|e| TunnelError::InvalidAddress(e.to_string().into()))?;

        let mut prefixes = Vec::new();
        if !forwarders.is_empty() {
            for part in forwarders.split('+') {
                if part.len() != PREFIX_CHARS {
                    return Err(TunnelError::InvalidAddress(
                        format!("forwarder prefix must be {PREFIX_CHARS} characters: {part}")
                            .into(),
                    ));
                }
                let bytes = BASE32
                    .decode(part.as_bytes())
                    .map_err(|e| TunnelError::InvalidAddress(format!("{part}: {e}").into()))?;
                let prefix: ForwarderPrefix = bytes.as_slice().try_into().map_err(|_| {
                    TunnelError::InvalidAddress(format!("bad prefix length: {part}").into())
                })?;
                prefixes.push(prefix);
            }
        }

        Ok(Self::from_prefixes(target, prefixes))
    }
}
