// Copyright (c) 2024 Botho Foundation

//! Relay side of a route.
//!
//! A relay knows one key, its inward neighbour and its outward neighbour.
//! It never sees payloads: traffic from the inward side has one layer
//! removed, traffic from the outward side has one layer added.
//!
//! ```text
//!   inward neighbour                              outward neighbour
//!  (addr, its label) ◀──── add layer ──── [ relay ] ◀──── (addr, its label)
//!                    ──── peel layer ───▶ [ relay ] ────▶
//! ```
//!
//! The relay is registered under two table keys, one per side, inserted
//! and removed together.

use super::config::CipherParams;
use super::onion::{self, CipherError};
use super::table::RouteKey;
use super::types::{AtomicPhase, HopKey, Phase, Side};
use parking_lot::Mutex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;
use umbra_wire::{PeerAddr, RouteLabel};

/// Outcome of a relay liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelayHealth {
    Alive,
    /// Tear down; notify the listed side if it is still live.
    Expired { notify: Option<Side> },
}

/// Relay state of one route.
#[derive(Debug)]
pub struct RelayRoute {
    key: HopKey,
    inward: PeerAddr,
    inward_label: RouteLabel,
    inward_remote: RouteLabel,
    outward: PeerAddr,
    outward_label: RouteLabel,
    outward_remote: OnceLock<RouteLabel>,
    phase: AtomicPhase,
    last_inward: Mutex<Instant>,
    last_outward: Mutex<Instant>,
}

impl RelayRoute {
    /// `inward_remote` is the label the inward neighbour chose; the
    /// outward neighbour's label arrives with its acknowledgement.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: HopKey,
        inward: PeerAddr,
        inward_label: RouteLabel,
        inward_remote: RouteLabel,
        outward: PeerAddr,
        outward_label: RouteLabel,
        now: Instant,
    ) -> Self {
        Self {
            key,
            inward,
            inward_label,
            inward_remote,
            outward,
            outward_label,
            outward_remote: OnceLock::new(),
            phase: AtomicPhase::new(Phase::Establishing),
            last_inward: Mutex::new(now),
            last_outward: Mutex::new(now),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase.load()
    }

    /// Table key for the entry facing `side`.
    pub fn table_key(&self, side: Side) -> RouteKey {
        match side {
            Side::Inward => RouteKey::new(self.inward, self.inward_label),
            Side::Outward => RouteKey::new(self.outward, self.outward_label),
        }
    }

    /// Address and label to reach the neighbour on `side`.
    pub(crate) fn neighbour(&self, side: Side) -> Option<(PeerAddr, RouteLabel)> {
        match side {
            Side::Inward => Some((self.inward, self.inward_remote)),
            Side::Outward => self.outward_remote.get().map(|label| (self.outward, *label)),
        }
    }

    /// Label the inward neighbour must use for this relay.
    pub(crate) fn inward_label(&self) -> RouteLabel {
        self.inward_label
    }

    /// Record the outward acknowledgement and go live.
    pub(crate) fn complete(&self, outward_remote: RouteLabel, now: Instant) -> bool {
        if self.outward_remote.set(outward_remote).is_err() || !self.phase.establish() {
            return false;
        }
        *self.last_inward.lock() = now;
        *self.last_outward.lock() = now;
        true
    }

    /// Add this hop's layer to an acknowledgement heading inward.
    pub(crate) fn layer_ack(
        &self,
        ack: &mut [u8],
        params: &CipherParams,
    ) -> Result<(), CipherError> {
        onion::apply_hop_layer(&self.key, ack, params)
    }

    /// Transform traffic that arrived from `from` and name its next hop.
    ///
    /// Returns `None` when the route is not live.
    pub(crate) fn relay(
        &self,
        from: Side,
        packet: &mut [u8],
        params: &CipherParams,
        now: Instant,
    ) -> Option<Result<(PeerAddr, RouteLabel), CipherError>> {
        if self.phase() != Phase::Established {
            return None;
        }
        let target = self.neighbour(from.opposite())?;
        if let Err(err) = onion::apply_hop_layer(&self.key, packet, params) {
            return Some(Err(err));
        }
        match from {
            Side::Inward => *self.last_inward.lock() = now,
            Side::Outward => *self.last_outward.lock() = now,
        }
        Some(Ok(target))
    }

    /// Check both neighbours' liveness.
    pub(crate) fn check(&self, now: Instant, timeout: Duration) -> RelayHealth {
        if self.phase() != Phase::Established {
            return RelayHealth::Alive;
        }
        let inward_live = now.saturating_duration_since(*self.last_inward.lock()) <= timeout;
        let outward_live = now.saturating_duration_since(*self.last_outward.lock()) <= timeout;
        match (inward_live, outward_live) {
            (true, true) => RelayHealth::Alive,
            (true, false) => RelayHealth::Expired {
                notify: Some(Side::Inward),
            },
            (false, true) => RelayHealth::Expired {
                notify: Some(Side::Outward),
            },
            (false, false) => RelayHealth::Expired { notify: None },
        }
    }

    /// Mark closed. True for the one caller that performs the transition.
    pub(crate) fn close(&self) -> bool {
        self.phase.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::route::types::HOP_KEY_MATERIAL_LEN;

    fn relay(now: Instant) -> RelayRoute {
        RelayRoute::new(
            HopKey::from_material(&[9u8; HOP_KEY_MATERIAL_LEN]),
            "10.0.0.1:7200".parse().unwrap(),
            RouteLabel(1),
            RouteLabel(100),
            "10.0.0.3:7200".parse().unwrap(),
            RouteLabel(2),
            now,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_directions() {
        let now = Instant::now();
        let route = relay(now);
        let params = CipherParams::default();
        let mut packet = vec![0u8; params.routed_envelope_size];

        assert!(route.relay(Side::Inward, &mut packet, &params, now).is_none());
        assert!(route.complete(RouteLabel(200), now));

        let (addr, label) = route
            .relay(Side::Inward, &mut packet, &params, now)
            .unwrap()
            .unwrap();
        assert_eq!(addr, "10.0.0.3:7200".parse().unwrap());
        assert_eq!(label, RouteLabel(200));

        let (addr, label) = route
            .relay(Side::Outward, &mut packet, &params, now)
            .unwrap()
            .unwrap();
        assert_eq!(addr, "10.0.0.1:7200".parse().unwrap());
        assert_eq!(label, RouteLabel(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_size_packet_is_an_error() {
        let now = Instant::now();
        let route = relay(now);
        route.complete(RouteLabel(200), now);
        let mut packet = vec![0u8; 10];
        let result = route.relay(Side::Inward, &mut packet, &CipherParams::default(), now);
        assert!(matches!(result, Some(Err(CipherError::WrongSize { .. }))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_reports_live_side() {
        let start = Instant::now();
        let route = relay(start);
        route.complete(RouteLabel(200), start);
        let params = CipherParams::default();
        let timeout = Duration::from_secs(12);

        let later = start + Duration::from_secs(8);
        let mut packet = vec![0u8; params.routed_envelope_size];
        route.relay(Side::Inward, &mut packet, &params, later);

        assert_eq!(route.check(later, timeout), RelayHealth::Alive);
        assert_eq!(
            route.check(start + Duration::from_secs(13), timeout),
            RelayHealth::Expired {
                notify: Some(Side::Inward)
            }
        );
        assert_eq!(
            route.check(start + Duration::from_secs(30), timeout),
            RelayHealth::Expired { notify: None }
        );
    }

    #[test]
    fn test_table_keys_per_side() {
        let route = relay(Instant::now());
        assert_eq!(
            route.table_key(Side::Inward),
            RouteKey::new("10.0.0.1:7200".parse().unwrap(), RouteLabel(1))
        );
        assert_eq!(
            route.table_key(Side::Outward),
            RouteKey::new("10.0.0.3:7200".parse().unwrap(), RouteLabel(2))
        );
        assert!(route.close());
        assert!(!route.close());
    }
}
