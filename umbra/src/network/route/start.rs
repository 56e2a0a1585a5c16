// Copyright (c) 2024 Botho Foundation

//! Start-point side of a route.
//!
//! The start point holds every hop's key and is the only party that can
//! produce or read a routed envelope end to end.
//!
//! ```text
//! Establishing ──ack validates──▶ Established ──send fails / silence──▶ Closed
//!       │                                                                ▲
//!       └──────────────timeout / rejected / bad ack──────────────────────┘
//! ```
//!
//! This type only tracks state; all messaging goes through
//! [`RouteService`](super::service::RouteService).

use super::config::CipherParams;
use super::onion;
use super::error::RouteError;
use super::replay::ReplayWindow;
use super::table::RouteKey;
use super::types::{AtomicPhase, DropReason, HopKey, Inbound, Phase, RouteId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use umbra_wire::{PeerAddr, RouteLabel, RoutedPayload};

/// Notification from a start route to whoever owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEvent {
    /// Application data arrived on the route
    Data { route: RouteId, payload: Vec<u8> },
    /// The route closed
    Closed { route: RouteId },
}

/// What the sweeper should do for a start route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartTick {
    Idle,
    Ping,
    Expired,
}

/// Initiator state of one route.
#[derive(Debug)]
pub struct StartRoute {
    id: RouteId,
    first_hop: PeerAddr,
    label: RouteLabel,
    remote_label: OnceLock<RouteLabel>,
    keys: Vec<HopKey>,
    phase: AtomicPhase,
    sequence: AtomicU64,
    replay: Mutex<ReplayWindow>,
    last_received: Mutex<Instant>,
    next_ping: Mutex<Instant>,
    events: mpsc::UnboundedSender<RouteEvent>,
}

impl StartRoute {
    pub(crate) fn new(
        id: RouteId,
        first_hop: PeerAddr,
        label: RouteLabel,
        keys: Vec<HopKey>,
        replay_capacity: usize,
        events: mpsc::UnboundedSender<RouteEvent>,
        now: Instant,
    ) -> Self {
        Self {
            id,
            first_hop,
            label,
            remote_label: OnceLock::new(),
            keys,
            phase: AtomicPhase::new(Phase::Establishing),
            sequence: AtomicU64::new(0),
            replay: Mutex::new(ReplayWindow::new(replay_capacity)),
            last_received: Mutex::new(now),
            next_ping: Mutex::new(now),
            events,
        }
    }

    /// Local identifier.
    pub fn id(&self) -> RouteId {
        self.id
    }

    /// Address of the first hop.
    pub fn first_hop(&self) -> PeerAddr {
        self.first_hop
    }

    /// Label the first hop uses when sending to us.
    pub fn label(&self) -> RouteLabel {
        self.label
    }

    /// Table key of the single entry.
    pub fn table_key(&self) -> RouteKey {
        RouteKey::new(self.first_hop, self.label)
    }

    /// Label we use when sending to the first hop, once established.
    pub fn remote_label(&self) -> Option<RouteLabel> {
        self.remote_label.get().copied()
    }

    /// Relays between us and the boundary.
    pub fn relay_count(&self) -> usize {
        self.keys.len().saturating_sub(1)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase.load()
    }

    /// Whether the route carries traffic.
    pub fn is_established(&self) -> bool {
        self.phase() == Phase::Established
    }

    /// Sequences start at 1 and never repeat on one route.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Wrap an object for the boundary.
    pub(crate) fn seal(
        &self,
        payload: &RoutedPayload,
        params: &CipherParams,
    ) -> Result<Vec<u8>, RouteError> {
        let object = umbra_wire::encode(payload)?;
        Ok(onion::wrap_outbound(
            &self.keys,
            self.next_sequence(),
            &object,
            params,
        )?)
    }

    /// Validate the boundary's acknowledgement and go live.
    ///
    /// Returns the recipient's optional response, or `None` if the
    /// acknowledgement is invalid or the route was closed meanwhile.
    pub(crate) fn complete(
        &self,
        remote: RouteLabel,
        ack: Vec<u8>,
        params: &CipherParams,
        now: Instant,
        ping_interval: Duration,
    ) -> Option<Option<Vec<u8>>> {
        let opened = onion::unwrap_inbound(&self.keys, ack, params);
        let response = match Inbound::screen(&self.replay, opened) {
            Inbound::Payload(RoutedPayload::Established { response }) => response,
            _ => return None,
        };
        if self.remote_label.set(remote).is_err() || !self.phase.establish() {
            return None;
        }
        *self.last_received.lock() = now;
        *self.next_ping.lock() = now + ping_interval;
        Some(response)
    }

    /// Screen an inbound envelope, refreshing liveness on success.
    pub(crate) fn receive(&self, packet: Vec<u8>, params: &CipherParams, now: Instant) -> Inbound {
        if !self.is_established() {
            return Inbound::Dropped(DropReason::Inactive);
        }
        let inbound = Inbound::screen(
            &self.replay,
            onion::unwrap_inbound(&self.keys, packet, params),
        );
        if matches!(inbound, Inbound::Payload(_)) {
            *self.last_received.lock() = now;
        }
        inbound
    }

    /// Decide whether a ping is due or the route went silent.
    pub(crate) fn tick(
        &self,
        now: Instant,
        ping_interval: Duration,
        timeout: Duration,
    ) -> StartTick {
        if !self.is_established() {
            return StartTick::Idle;
        }
        let silent = now.saturating_duration_since(*self.last_received.lock());
        if silent > timeout {
            return StartTick::Expired;
        }
        let mut next_ping = self.next_ping.lock();
        if now >= *next_ping {
            *next_ping = now + ping_interval;
            return StartTick::Ping;
        }
        StartTick::Idle
    }

    /// Mark closed. True for the one caller that performs the transition.
    pub(crate) fn close(&self) -> bool {
        self.phase.close()
    }

    pub(crate) fn notify(&self, event: RouteEvent) {
        // The owner may already be gone.
        let _ = self.events.send(event);
    }
}
