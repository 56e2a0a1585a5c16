// Copyright (c) 2024 Botho Foundation

//! Tunable route parameters.
//!
//! Envelope sizes and timing constants must agree between peers; the relay
//! bounds and pool sizing are local policy.
//!
//! ```toml
//! [routes]
//! min_relays = 1
//! max_relays = 3
//! target_routes = 3
//! over_provision_factor = 1.5
//! base_delay_ms = 2000
//! ping_interval_secs = 10
//! ```

use super::onion::{
    BOUNDARY_LAYER_OVERHEAD, RELAY_LAYER_OVERHEAD, ROUTED_HEADER_LEN, ROUTED_IV_LEN,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default fixed size of an establishment envelope.
pub const DEFAULT_ESTABLISH_ENVELOPE_SIZE: usize = 320;

/// Default fixed size of a steady-state envelope.
pub const DEFAULT_ROUTED_ENVELOPE_SIZE: usize = 896;

/// Default anti-replay window capacity.
pub const DEFAULT_REPLAY_WINDOW: usize = 1024;

/// Smallest establishment payload a route must be able to carry: a
/// recipient identifier and an empty body.
const MIN_ESTABLISH_PAYLOAD: usize = 33;

/// Sizes shared by the cipher builder and opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherParams {
    /// Size of every establishment envelope on the wire.
    pub establish_envelope_size: usize,
    /// Size of every steady-state envelope on the wire.
    pub routed_envelope_size: usize,
}

impl CipherParams {
    /// Largest object a steady-state envelope can carry.
    pub fn max_routed_object(&self) -> usize {
        self.routed_envelope_size
            .saturating_sub(ROUTED_IV_LEN + ROUTED_HEADER_LEN)
    }

    /// Largest establishment payload that fits behind `relays` relay layers.
    pub fn max_establish_payload(&self, relays: usize) -> usize {
        self.establish_envelope_size
            .saturating_sub(BOUNDARY_LAYER_OVERHEAD + relays * RELAY_LAYER_OVERHEAD)
    }
}

impl Default for CipherParams {
    fn default() -> Self {
        Self {
            establish_envelope_size: DEFAULT_ESTABLISH_ENVELOPE_SIZE,
            routed_envelope_size: DEFAULT_ROUTED_ENVELOPE_SIZE,
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum RouteConfigError {
    #[error("min_relays ({min}) exceeds max_relays ({max})")]
    RelayBounds { min: usize, max: usize },

    #[error("over_provision_factor must be at least 1.0, got {0}")]
    OverProvision(f64),

    #[error("target_routes must be at least 1")]
    NoTarget,

    #[error("establish envelope of {size} bytes cannot carry {relays} relays")]
    EstablishTooSmall { size: usize, relays: usize },

    #[error("routed envelope of {0} bytes leaves no room for payload")]
    RoutedTooSmall(usize),

    #[error("replay window must hold at least 64 sequences, got {0}")]
    ReplayWindow(usize),

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Route configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Fewest relays in front of the boundary on a pool route
    #[serde(default = "default_min_relays")]
    pub min_relays: usize,

    /// Most relays in front of the boundary on a pool route
    #[serde(default = "default_max_relays")]
    pub max_relays: usize,

    /// Established routes each endpoint tries to keep
    #[serde(default = "default_target_routes")]
    pub target_routes: usize,

    /// Multiplier on missing routes when launching attempts
    #[serde(default = "default_over_provision_factor")]
    pub over_provision_factor: f64,

    /// Base delay budget for one round trip through a route
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Keep-alive interval on established start routes
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// How often the sweeper runs
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    #[serde(default = "default_establish_envelope_size")]
    pub establish_envelope_size: usize,

    #[serde(default = "default_routed_envelope_size")]
    pub routed_envelope_size: usize,

    #[serde(default = "default_replay_window")]
    pub replay_window: usize,
}

fn default_min_relays() -> usize {
    1
}

fn default_max_relays() -> usize {
    3
}

fn default_target_routes() -> usize {
    3
}

fn default_over_provision_factor() -> f64 {
    1.5
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_ping_interval_secs() -> u64 {
    10
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

fn default_establish_envelope_size() -> usize {
    DEFAULT_ESTABLISH_ENVELOPE_SIZE
}

fn default_routed_envelope_size() -> usize {
    DEFAULT_ROUTED_ENVELOPE_SIZE
}

fn default_replay_window() -> usize {
    DEFAULT_REPLAY_WINDOW
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            min_relays: default_min_relays(),
            max_relays: default_max_relays(),
            target_routes: default_target_routes(),
            over_provision_factor: default_over_provision_factor(),
            base_delay_ms: default_base_delay_ms(),
            ping_interval_secs: default_ping_interval_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            establish_envelope_size: default_establish_envelope_size(),
            routed_envelope_size: default_routed_envelope_size(),
            replay_window: default_replay_window(),
        }
    }
}

impl RouteConfig {
    /// Check that the values are usable together.
    pub fn validate(&self) -> Result<(), RouteConfigError> {
        if self.min_relays > self.max_relays {
            return Err(RouteConfigError::RelayBounds {
                min: self.min_relays,
                max: self.max_relays,
            });
        }
        if !(self.over_provision_factor >= 1.0) {
            return Err(RouteConfigError::OverProvision(self.over_provision_factor));
        }
        if self.target_routes == 0 {
            return Err(RouteConfigError::NoTarget);
        }
        if self.cipher_params().max_establish_payload(self.max_relays) < MIN_ESTABLISH_PAYLOAD {
            return Err(RouteConfigError::EstablishTooSmall {
                size: self.establish_envelope_size,
                relays: self.max_relays,
            });
        }
        if self.cipher_params().max_routed_object() < 64 {
            return Err(RouteConfigError::RoutedTooSmall(self.routed_envelope_size));
        }
        if self.replay_window < 64 {
            return Err(RouteConfigError::ReplayWindow(self.replay_window));
        }
        if self.sweep_interval_ms == 0 {
            return Err(RouteConfigError::ZeroInterval("sweep_interval_ms"));
        }
        if self.ping_interval_secs == 0 {
            return Err(RouteConfigError::ZeroInterval("ping_interval_secs"));
        }
        Ok(())
    }

    /// Envelope sizes for the cipher.
    pub fn cipher_params(&self) -> CipherParams {
        CipherParams {
            establish_envelope_size: self.establish_envelope_size,
            routed_envelope_size: self.routed_envelope_size,
        }
    }

    /// Base delay budget.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// How long an establishment may take end to end.
    pub fn establish_timeout(&self) -> Duration {
        self.base_delay() * 2
    }

    /// Keep-alive interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Silence after which any hop gives a route up.
    pub fn route_timeout(&self) -> Duration {
        self.ping_interval() + self.base_delay()
    }

    /// Sweeper period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
