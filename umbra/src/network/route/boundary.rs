// Copyright (c) 2024 Botho Foundation

//! Boundary side of a route.
//!
//! The boundary is the last hop. It terminates the onion, hands payloads to
//! the subscribed recipient and answers pings. It holds one key and knows
//! only its inward neighbour.

use super::config::CipherParams;
use super::error::{RouteError, RouteResult};
use super::onion;
use super::replay::ReplayWindow;
use super::service::RouteService;
use super::table::RouteKey;
use super::types::{AtomicPhase, DropReason, HopKey, Inbound, Phase, RouteId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use umbra_wire::{PeerAddr, RecipientId, RouteLabel, RoutedPayload};

/// Terminal state of one route.
#[derive(Debug)]
pub struct BoundaryRoute {
    id: RouteId,
    inward: PeerAddr,
    label: RouteLabel,
    inward_remote: RouteLabel,
    recipient: RecipientId,
    key: HopKey,
    phase: AtomicPhase,
    sequence: AtomicU64,
    replay: Mutex<ReplayWindow>,
    last_received: Mutex<Instant>,
}

impl BoundaryRoute {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: RouteId,
        inward: PeerAddr,
        label: RouteLabel,
        inward_remote: RouteLabel,
        recipient: RecipientId,
        key: HopKey,
        replay_capacity: usize,
        now: Instant,
    ) -> Self {
        Self {
            id,
            inward,
            label,
            inward_remote,
            recipient,
            key,
            phase: AtomicPhase::new(Phase::Established),
            sequence: AtomicU64::new(0),
            replay: Mutex::new(ReplayWindow::new(replay_capacity)),
            last_received: Mutex::new(now),
        }
    }

    /// Local identifier.
    pub fn id(&self) -> RouteId {
        self.id
    }

    /// Recipient this route was opened to.
    pub fn recipient(&self) -> RecipientId {
        self.recipient
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase.load()
    }

    /// Table key of the single entry.
    pub fn table_key(&self) -> RouteKey {
        RouteKey::new(self.inward, self.label)
    }

    /// Label the inward neighbour must use.
    pub fn label(&self) -> RouteLabel {
        self.label
    }

    /// Address and label of the inward neighbour.
    pub(crate) fn neighbour(&self) -> (PeerAddr, RouteLabel) {
        (self.inward, self.inward_remote)
    }

    /// Wrap an object heading back to the start point.
    pub(crate) fn seal(
        &self,
        payload: &RoutedPayload,
        params: &CipherParams,
    ) -> RouteResult<Vec<u8>> {
        let object = umbra_wire::encode(payload)?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(onion::wrap_terminal(&self.key, sequence, &object, params)?)
    }

    /// Screen an inbound envelope, refreshing liveness on success.
    pub(crate) fn receive(&self, packet: Vec<u8>, params: &CipherParams, now: Instant) -> Inbound {
        if self.phase() != Phase::Established {
            return Inbound::Dropped(DropReason::Inactive);
        }
        let inbound = Inbound::screen(
            &self.replay,
            onion::unwrap_terminal(&self.key, packet, params),
        );
        if matches!(inbound, Inbound::Payload(_)) {
            *self.last_received.lock() = now;
        }
        inbound
    }

    /// True once nothing has arrived within `timeout`.
    pub(crate) fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(*self.last_received.lock()) > timeout
    }

    /// Mark closed. True for the one caller that performs the transition.
    pub(crate) fn close(&self) -> bool {
        self.phase.close()
    }
}

/// Handle given to a recipient for a route that reached it.
///
/// Cheap to clone. Sending after the route closed fails with
/// [`RouteError::Closed`].
#[derive(Clone)]
pub struct InboundConnection {
    route: Arc<BoundaryRoute>,
    service: Weak<RouteService>,
}

impl InboundConnection {
    pub(crate) fn new(route: Arc<BoundaryRoute>, service: Weak<RouteService>) -> Self {
        Self { route, service }
    }

    /// Local identifier of the underlying route.
    pub fn id(&self) -> RouteId {
        self.route.id()
    }

    /// Recipient the start point asked for.
    pub fn recipient(&self) -> RecipientId {
        self.route.recipient()
    }

    /// Whether the route still carries traffic.
    pub fn is_open(&self) -> bool {
        self.route.phase() == Phase::Established
    }

    /// Send application data back toward the start point.
    pub async fn send(&self, data: Vec<u8>) -> RouteResult<()> {
        let service = self.service.upgrade().ok_or(RouteError::Closed)?;
        service
            .send_from_boundary(&self.route, RoutedPayload::Data(data))
            .await
    }

    /// Tear the route down from this end.
    pub async fn close(&self) {
        if let Some(service) = self.service.upgrade() {
            service.shutdown_boundary(&self.route).await;
        }
    }
}

impl std::fmt::Debug for InboundConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundConnection")
            .field("id", &self.route.id())
            .field("recipient", &self.route.recipient())
            .finish()
    }
}
