//! Tunnel listener configuration

use crate::error::{Result, TunnelError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunnel listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Lower bound of the delay before an outbound edge attempt
    pub create_delay_min: Duration,

    /// Upper bound of the delay before an outbound edge attempt
    pub create_delay_max: Duration,

    /// Overlap-connection trim period; also the minimum age before trimming
    pub trim_interval: Duration,

    /// Maximum connections kept in an edge's overlap
    pub max_overlap: usize,

    /// Ring neighbours advertised in a sync message
    pub sync_candidates: usize,

    /// Forwarders advertised in the local tunnel address
    pub local_ta_neighbors: usize,

    /// Near neighbours protected from trimming on each side of the ring
    pub desired_near_neighbors: usize,

    /// Deadline for a RequestSync round trip
    pub rpc_timeout: Duration,

    /// Seed for the local-id generator (random when absent)
    pub rng_seed: Option<u64>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            create_delay_min: Duration::from_secs(5),
            create_delay_max: Duration::from_secs(10),
            trim_interval: Duration::from_secs(300), // 5 minutes
            max_overlap: 4,
            sync_candidates: 16,
            local_ta_neighbors: 16,
            desired_near_neighbors: 2,
            rpc_timeout: Duration::from_secs(30),
            rng_seed: None,
        }
    }
}

impl TunnelConfig {
    /// Configuration without creation delay, for tests and simulations
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            create_delay_min: Duration::ZERO,
            create_delay_max: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Check the configuration for inconsistent values
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.create_delay_min > self.create_delay_max {
            return Err(TunnelError::InvalidConfig(
                "create_delay_min exceeds create_delay_max".into(),
            ));
        }
        if self.max_overlap == 0 {
            return Err(TunnelError::InvalidConfig("max_overlap must be > 0".into()));
        }
        if self.trim_interval.is_zero() {
            return Err(TunnelError::InvalidConfig(
                "trim_interval must be > 0".into(),
            ));
        }
        if self.rpc_timeout.is_zero() {
            return Err(TunnelError::InvalidConfig("rpc_timeout must be > 0".into()));
        }
        Ok(())
    }
}
