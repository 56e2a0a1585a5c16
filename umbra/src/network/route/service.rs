// Copyright (c) 2024 Botho Foundation

//! Route protocol engine.
//!
//! [`RouteService`] owns a node's route table and answers every route
//! request the transport delivers. It plays all three roles at once: start
//! point for local endpoints, relay for other nodes, and boundary for local
//! recipients.
//!
//! # Request handling
//!
//! | Request          | Start                 | Relay                          | Boundary                  |
//! |------------------|-----------------------|--------------------------------|---------------------------|
//! | `EstablishRoute` | n/a                   | peel, register pair, forward   | register, ask recipient   |
//! | `RoutedMessage`  | unwrap, deliver       | ack, transform, forward        | unwrap, deliver or pong   |
//! | `Disconnect`     | close                 | close, notify other side       | close                     |
//!
//! Unknown labels get `NoRoute`. Envelopes that fail to decode or replay are
//! dropped after the hop-level `Ack`, so the sender cannot tell them apart.
//! Establishment envelopes that fail to open get no reply at all.

use super::boundary::{BoundaryRoute, InboundConnection};
use super::collaborators::{Acceptance, HopTransport, RecipientRegistry, RelaySelector};
use super::config::{CipherParams, RouteConfig, RouteConfigError};
use super::endpoint::{Endpoint, EndpointOptions, RouteSocket};
use super::error::{RouteError, RouteResult};
use super::keys::IdentityKeyPair;
use super::metrics::RouteMetrics;
use super::onion::{self, CipherError, Opened};
use super::relay::{RelayHealth, RelayRoute};
use super::start::{RouteEvent, StartRoute, StartTick};
use super::table::{RouteKey, RouteState, RouteTable};
use super::types::{DropReason, HopKey, Inbound, Phase, RouteId, Side};
use parking_lot::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use umbra_wire::{
    EstablishPayload, NodeKey, PeerAddr, RecipientId, RelayHandle, Request, Response,
    RouteLabel, RoutedPayload,
};

/// Per-node route engine.
pub struct RouteService {
    identity: IdentityKeyPair,
    config: RouteConfig,
    params: CipherParams,
    transport: Arc<dyn HopTransport>,
    selector: Arc<dyn RelaySelector>,
    registry: Arc<dyn RecipientRegistry>,
    table: RouteTable,
    metrics: RouteMetrics,
    route_ids: AtomicU64,
    endpoints: Mutex<Vec<Weak<Endpoint>>>,
}

impl RouteService {
    /// Create a service for the node owning `identity`.
    pub fn new(
        identity: IdentityKeyPair,
        config: RouteConfig,
        transport: Arc<dyn HopTransport>,
        selector: Arc<dyn RelaySelector>,
        registry: Arc<dyn RecipientRegistry>,
    ) -> Result<Arc<Self>, RouteConfigError> {
        config.validate()?;
        let params = config.cipher_params();
        Ok(Arc::new(Self {
            identity,
            config,
            params,
            transport,
            selector,
            registry,
            table: RouteTable::new(),
            metrics: RouteMetrics::new(),
            route_ids: AtomicU64::new(1),
            endpoints: Mutex::new(Vec::new()),
        }))
    }

    /// Public key of this node.
    pub fn node_key(&self) -> NodeKey {
        self.identity.node_key()
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    pub fn params(&self) -> &CipherParams {
        &self.params
    }

    pub fn metrics(&self) -> &RouteMetrics {
        &self.metrics
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn selector(&self) -> &Arc<dyn RelaySelector> {
        &self.selector
    }

    pub fn registry(&self) -> &Arc<dyn RecipientRegistry> {
        &self.registry
    }

    /// Create a logical endpoint that keeps a pool of routes alive.
    pub fn create_endpoint(
        self: &Arc<Self>,
        identity: IdentityKeyPair,
        options: EndpointOptions,
    ) -> Arc<Endpoint> {
        let endpoint = Endpoint::new(self.clone(), identity, options);
        {
            let mut endpoints = self.endpoints.lock();
            endpoints.retain(|weak| weak.strong_count() > 0);
            endpoints.push(Arc::downgrade(&endpoint));
        }
        endpoint.check_routes();
        endpoint
    }

    // ========================================================================
    // Inbound requests
    // ========================================================================

    /// Entry point for the transport.
    ///
    /// `None` means the request is dropped without an answer.
    pub async fn handle_request(
        self: &Arc<Self>,
        from: PeerAddr,
        request: Request,
    ) -> Option<Response> {
        debug!(%from, kind = request.kind(), "Route request");
        match request {
            Request::EstablishRoute { label, envelope } => {
                self.handle_establish(from, label, envelope).await
            }
            Request::RoutedMessage { label, payload } => {
                Some(self.handle_routed(from, label, payload).await)
            }
            Request::Disconnect { label } => Some(self.handle_disconnect(from, label).await),
        }
    }

    async fn handle_establish(
        self: &Arc<Self>,
        from: PeerAddr,
        remote_label: RouteLabel,
        envelope: Vec<u8>,
    ) -> Option<Response> {
        match onion::open_envelope(&self.identity, &envelope, &self.params) {
            Ok(Opened::Relay {
                key,
                next_hop,
                envelope,
            }) => Some(
                self.establish_relay(from, remote_label, key, next_hop, envelope)
                    .await,
            ),
            Ok(Opened::Boundary { key, payload }) => {
                self.establish_boundary(from, remote_label, key, payload)
            }
            Err(err) => {
                debug!(%from, "Dropping establishment envelope: {}", err);
                self.metrics.inc_dropped_decode();
                None
            }
        }
    }

    async fn establish_relay(
        self: &Arc<Self>,
        from: PeerAddr,
        remote_label: RouteLabel,
        key: HopKey,
        next_hop: PeerAddr,
        envelope: Vec<u8>,
    ) -> Response {
        let now = Instant::now();
        let route = self
            .table
            .insert_pair_with(from, next_hop, |inward_label, outward_label| {
                Arc::new(RelayRoute::new(
                    key,
                    from,
                    inward_label,
                    remote_label,
                    next_hop,
                    outward_label,
                    now,
                ))
            });

        let request = Request::EstablishRoute {
            label: route.table_key(Side::Outward).label,
            envelope,
        };
        let outcome = timeout(
            self.config.establish_timeout(),
            self.transport.inquire(next_hop, request),
        )
        .await;

        match outcome {
            Ok(Ok(Response::Established { label, mut payload })) => {
                let live = route.complete(label, Instant::now())
                    && route.layer_ack(&mut payload, &self.params).is_ok();
                if live {
                    self.metrics.inc_relays_established();
                    debug!(%from, %next_hop, "Relay established");
                    return Response::Established {
                        label: route.inward_label(),
                        payload,
                    };
                }
                self.remove_relay(&route);
                self.send_disconnect(next_hop, label).await;
                Response::NoRoute
            }
            Ok(Ok(Response::Rejected)) => {
                self.remove_relay(&route);
                Response::Rejected
            }
            Ok(Ok(other)) => {
                debug!(%next_hop, ?other, "Unexpected establishment reply");
                self.remove_relay(&route);
                Response::NoRoute
            }
            Ok(Err(err)) => {
                debug!(%next_hop, "Establishment forward failed: {}", err);
                self.remove_relay(&route);
                Response::NoRoute
            }
            Err(_) => {
                debug!(%next_hop, "Establishment forward timed out");
                self.remove_relay(&route);
                Response::NoRoute
            }
        }
    }

    fn establish_boundary(
        self: &Arc<Self>,
        from: PeerAddr,
        remote_label: RouteLabel,
        key: HopKey,
        payload: Vec<u8>,
    ) -> Option<Response> {
        let request: EstablishPayload = match umbra_wire::decode(&payload) {
            Ok(request) => request,
            Err(err) => {
                debug!(%from, "Dropping establishment payload: {}", err);
                self.metrics.inc_dropped_decode();
                return None;
            }
        };
        let Some(handler) = self.registry.handler(&request.recipient) else {
            debug!(%from, recipient = ?request.recipient, "No subscriber for recipient");
            return Some(Response::Rejected);
        };

        let id = RouteId::next(&self.route_ids);
        let now = Instant::now();
        let replay_window = self.config.replay_window;
        let route = self.table.insert_with(from, Side::Inward, |label| {
            Arc::new(BoundaryRoute::new(
                id,
                from,
                label,
                remote_label,
                request.recipient,
                key,
                replay_window,
                now,
            ))
        });

        let connection = InboundConnection::new(route.clone(), Arc::downgrade(self));
        let response = match handler.on_connect(&connection, &request.body) {
            Acceptance::Accept { response } => response,
            Acceptance::Reject => {
                debug!(route = %id, "Recipient rejected connection");
                self.remove_boundary(&route);
                return Some(Response::Rejected);
            }
        };

        match route.seal(&RoutedPayload::Established { response }, &self.params) {
            Ok(ack) => {
                self.metrics.inc_boundaries_established();
                info!(route = %id, %from, "Boundary established");
                Some(Response::Established {
                    label: route.label(),
                    payload: ack,
                })
            }
            Err(err) => {
                warn!(route = %id, "Cannot seal acknowledgement: {}", err);
                self.remove_boundary(&route);
                Some(Response::Rejected)
            }
        }
    }

    async fn handle_routed(
        self: &Arc<Self>,
        from: PeerAddr,
        label: RouteLabel,
        payload: Vec<u8>,
    ) -> Response {
        let Some(entry) = self.table.get(&RouteKey::new(from, label)) else {
            debug!(%from, ?label, "Routed message for unknown label");
            self.metrics.inc_no_route();
            return Response::NoRoute;
        };
        match entry.state {
            RouteState::Relay(route) => self.forward(route, entry.side, payload),
            RouteState::Start(route) => {
                self.receive_at_start(&route, payload).await;
                Response::Ack
            }
            RouteState::Boundary(route) => {
                self.receive_at_boundary(&route, payload).await;
                Response::Ack
            }
        }
    }

    async fn handle_disconnect(self: &Arc<Self>, from: PeerAddr, label: RouteLabel) -> Response {
        let Some(entry) = self.table.get(&RouteKey::new(from, label)) else {
            self.metrics.inc_no_route();
            return Response::NoRoute;
        };
        self.metrics.inc_disconnects_received();
        debug!(%from, role = entry.state.role(), "Disconnect received");
        match entry.state {
            RouteState::Relay(route) => self.teardown_relay(&route, Some(entry.side.opposite())),
            RouteState::Start(route) => self.close_start(&route, false),
            RouteState::Boundary(route) => self.close_boundary(&route),
        }
        Response::Ack
    }

    // ========================================================================
    // Relay
    // ========================================================================

    fn forward(
        self: &Arc<Self>,
        route: Arc<RelayRoute>,
        from: Side,
        mut packet: Vec<u8>,
    ) -> Response {
        let (next, label) = match route.relay(from, &mut packet, &self.params, Instant::now()) {
            None => {
                self.metrics.inc_no_route();
                return Response::NoRoute;
            }
            Some(Err(err)) => {
                debug!("Dropping routed envelope at relay: {}", err);
                self.metrics.inc_dropped_decode();
                return Response::Ack;
            }
            Some(Ok(target)) => target,
        };
        self.metrics.inc_relayed();

        let service = self.clone();
        tokio::spawn(async move {
            let request = Request::RoutedMessage {
                label,
                payload: packet,
            };
            match service.transport.inquire(next, request).await {
                Ok(Response::Ack) => {}
                other => {
                    debug!(%next, ?other, "Relay forward failed");
                    service.teardown_relay(&route, Some(from));
                }
            }
        });
        Response::Ack
    }

    fn remove_relay(&self, route: &Arc<RelayRoute>) -> bool {
        let closed = route.close();
        self.table.remove_all(
            &[route.table_key(Side::Inward), route.table_key(Side::Outward)],
            &RouteState::Relay(route.clone()),
        );
        closed
    }

    /// Tear a relay down, telling the neighbour on `notify` once.
    fn teardown_relay(self: &Arc<Self>, route: &Arc<RelayRoute>, notify: Option<Side>) {
        if !self.remove_relay(route) {
            return;
        }
        debug!(?notify, "Relay torn down");
        if let Some((addr, label)) = notify.and_then(|side| route.neighbour(side)) {
            self.spawn_disconnect(addr, label);
        }
    }

    /// Best-effort Disconnect that never holds up the caller.
    fn spawn_disconnect(self: &Arc<Self>, to: PeerAddr, label: RouteLabel) {
        let service = self.clone();
        tokio::spawn(async move { service.send_disconnect(to, label).await });
    }

    async fn send_disconnect(&self, to: PeerAddr, label: RouteLabel) {
        self.metrics.inc_disconnects_sent();
        if let Err(err) = self
            .transport
            .inquire(to, Request::Disconnect { label })
            .await
        {
            debug!(%to, "Disconnect not delivered: {}", err);
        }
    }

    // ========================================================================
    // Start point
    // ========================================================================

    /// Establish a route over `chain`, whose last element is the boundary.
    ///
    /// Returns the route and the recipient's optional response.
    pub(crate) async fn open_route(
        &self,
        chain: &[RelayHandle],
        recipient: RecipientId,
        body: &[u8],
        events: mpsc::UnboundedSender<RouteEvent>,
    ) -> RouteResult<(Arc<StartRoute>, Option<Vec<u8>>)> {
        let payload = umbra_wire::encode(&EstablishPayload {
            recipient,
            body: body.to_vec(),
        })?;
        let first_hop = chain.first().ok_or(CipherError::EmptyChain)?.addr;
        let built = onion::build_envelope(chain, &payload, &self.params)?;

        let id = RouteId::next(&self.route_ids);
        let replay_window = self.config.replay_window;
        let route = self.table.insert_with(first_hop, Side::Outward, |label| {
            Arc::new(StartRoute::new(
                id,
                first_hop,
                label,
                built.hop_keys,
                replay_window,
                events,
                Instant::now(),
            ))
        });

        let request = Request::EstablishRoute {
            label: route.label(),
            envelope: built.envelope,
        };
        let outcome = timeout(
            self.config.establish_timeout(),
            self.transport.inquire(first_hop, request),
        )
        .await;

        let result = match outcome {
            Err(_) => Err(RouteError::EstablishTimeout),
            Ok(Err(err)) => Err(err.into()),
            Ok(Ok(Response::Established { label, payload })) => {
                let completed = route.complete(
                    label,
                    payload,
                    &self.params,
                    Instant::now(),
                    self.config.ping_interval(),
                );
                if completed.is_none() {
                    self.send_disconnect(first_hop, label).await;
                }
                completed.ok_or(RouteError::BadAcknowledgement)
            }
            Ok(Ok(Response::Rejected)) => Err(RouteError::Rejected),
            Ok(Ok(Response::NoRoute)) => Err(RouteError::EstablishFailed("no route")),
            Ok(Ok(Response::Ack)) => Err(RouteError::EstablishFailed("unexpected ack")),
        };

        match result {
            Ok(response) => {
                self.metrics.inc_routes_established();
                info!(route = %id, relays = route.relay_count(), "Route established");
                Ok((route, response))
            }
            Err(err) => {
                route.close();
                self.table
                    .remove(&route.table_key(), &RouteState::Start(route.clone()));
                self.metrics.inc_establish_failures();
                debug!(route = %id, "Route establishment failed: {}", err);
                Err(err)
            }
        }
    }

    /// Open a dedicated route over an explicit chain.
    pub async fn connect_via(
        self: &Arc<Self>,
        chain: &[RelayHandle],
        recipient: RecipientId,
        body: &[u8],
    ) -> RouteResult<RouteSocket> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (route, response) = self.open_route(chain, recipient, body, tx).await?;
        Ok(RouteSocket::new(route, self.clone(), rx, response))
    }

    /// Send an object to the boundary of a start route.
    ///
    /// Anything but a hop-level `Ack` closes the route.
    pub(crate) async fn send_start(
        self: &Arc<Self>,
        route: &Arc<StartRoute>,
        payload: RoutedPayload,
    ) -> RouteResult<()> {
        let label = match (route.phase(), route.remote_label()) {
            (Phase::Established, Some(label)) => label,
            (Phase::Closed, _) => return Err(RouteError::Closed),
            _ => return Err(RouteError::NotEstablished),
        };
        let packet = route.seal(&payload, &self.params)?;
        let request = Request::RoutedMessage {
            label,
            payload: packet,
        };
        match self.transport.inquire(route.first_hop(), request).await {
            Ok(Response::Ack) => Ok(()),
            Ok(other) => {
                debug!(route = %route.id(), ?other, "Send refused by first hop");
                self.close_start(route, false);
                Err(RouteError::Closed)
            }
            Err(err) => {
                debug!(route = %route.id(), "Send failed: {}", err);
                self.close_start(route, false);
                Err(err.into())
            }
        }
    }

    async fn receive_at_start(self: &Arc<Self>, route: &Arc<StartRoute>, packet: Vec<u8>) {
        match route.receive(packet, &self.params, Instant::now()) {
            Inbound::Payload(RoutedPayload::Data(payload)) => {
                self.metrics.inc_delivered();
                route.notify(RouteEvent::Data {
                    route: route.id(),
                    payload,
                });
            }
            Inbound::Payload(RoutedPayload::Close) => self.close_start(route, true),
            Inbound::Payload(RoutedPayload::Ping | RoutedPayload::Established { .. }) => {}
            Inbound::Dropped(reason) => self.note_drop(reason),
        }
    }

    /// Close a start route, optionally telling the first hop.
    pub(crate) fn close_start(self: &Arc<Self>, route: &Arc<StartRoute>, notify: bool) {
        if !route.close() {
            return;
        }
        self.table
            .remove(&route.table_key(), &RouteState::Start(route.clone()));
        info!(route = %route.id(), "Route closed");
        if notify {
            if let Some(label) = route.remote_label() {
                self.spawn_disconnect(route.first_hop(), label);
            }
        }
        route.notify(RouteEvent::Closed { route: route.id() });
    }

    /// Close a start route end to end.
    pub(crate) async fn shutdown_start(self: &Arc<Self>, route: &Arc<StartRoute>) {
        if route.is_established() {
            // Failure already closed the route without a disconnect.
            let _ = self.send_start(route, RoutedPayload::Close).await;
        }
        self.close_start(route, true);
    }

    // ========================================================================
    // Boundary
    // ========================================================================

    async fn receive_at_boundary(self: &Arc<Self>, route: &Arc<BoundaryRoute>, packet: Vec<u8>) {
        match route.receive(packet, &self.params, Instant::now()) {
            Inbound::Payload(RoutedPayload::Data(data)) => {
                self.metrics.inc_delivered();
                let Some(handler) = self.registry.handler(&route.recipient()) else {
                    return;
                };
                let connection = InboundConnection::new(route.clone(), Arc::downgrade(self));
                if let Some(reply) = handler.on_message(&connection, data) {
                    self.reply_from_boundary(route, RoutedPayload::Data(reply));
                }
            }
            Inbound::Payload(RoutedPayload::Ping) => {
                self.reply_from_boundary(route, RoutedPayload::Ping);
            }
            Inbound::Payload(RoutedPayload::Close) => self.close_boundary(route),
            Inbound::Payload(RoutedPayload::Established { .. }) => {}
            Inbound::Dropped(reason) => self.note_drop(reason),
        }
    }

    fn reply_from_boundary(self: &Arc<Self>, route: &Arc<BoundaryRoute>, payload: RoutedPayload) {
        let service = self.clone();
        let route = route.clone();
        tokio::spawn(async move {
            if let Err(err) = service.send_from_boundary(&route, payload).await {
                debug!(route = %route.id(), "Boundary reply failed: {}", err);
            }
        });
    }

    /// Send an object back toward the start point.
    pub(crate) async fn send_from_boundary(
        &self,
        route: &Arc<BoundaryRoute>,
        payload: RoutedPayload,
    ) -> RouteResult<()> {
        if route.phase() != Phase::Established {
            return Err(RouteError::Closed);
        }
        let packet = route.seal(&payload, &self.params)?;
        let (addr, label) = route.neighbour();
        let request = Request::RoutedMessage {
            label,
            payload: packet,
        };
        match self.transport.inquire(addr, request).await {
            Ok(Response::Ack) => Ok(()),
            Ok(_) => {
                self.close_boundary(route);
                Err(RouteError::Closed)
            }
            Err(err) => {
                self.close_boundary(route);
                Err(err.into())
            }
        }
    }

    fn remove_boundary(&self, route: &Arc<BoundaryRoute>) -> bool {
        let closed = route.close();
        self.table
            .remove(&route.table_key(), &RouteState::Boundary(route.clone()));
        closed
    }

    fn close_boundary(&self, route: &Arc<BoundaryRoute>) {
        if !self.remove_boundary(route) {
            return;
        }
        info!(route = %route.id(), "Boundary closed");
        if let Some(handler) = self.registry.handler(&route.recipient()) {
            // Weak service: the connection is already closed.
            handler.on_close(&InboundConnection::new(route.clone(), Weak::new()));
        }
    }

    /// Close a boundary route from the recipient side.
    pub(crate) async fn shutdown_boundary(&self, route: &Arc<BoundaryRoute>) {
        if route.phase() == Phase::Established {
            let _ = self.send_from_boundary(route, RoutedPayload::Close).await;
        }
        self.close_boundary(route);
    }

    // ========================================================================
    // Timeouts
    // ========================================================================

    /// One sweeper pass: pings, timeouts, then endpoint health.
    ///
    /// Never waits on the transport; pings and disconnects run on their own
    /// tasks.
    pub fn sweep(self: &Arc<Self>, now: Instant) {
        let ping_interval = self.config.ping_interval();
        let route_timeout = self.config.route_timeout();

        for state in self.table.states() {
            match state {
                RouteState::Start(route) => match route.tick(now, ping_interval, route_timeout) {
                    StartTick::Idle => {}
                    StartTick::Ping => self.spawn_ping(route),
                    StartTick::Expired => {
                        self.metrics.inc_timeouts();
                        self.close_start(&route, true);
                    }
                },
                RouteState::Relay(route) => {
                    if let RelayHealth::Expired { notify } = route.check(now, route_timeout) {
                        self.metrics.inc_timeouts();
                        self.teardown_relay(&route, notify);
                    }
                }
                RouteState::Boundary(route) => {
                    if route.is_expired(now, route_timeout) {
                        self.metrics.inc_timeouts();
                        self.close_boundary(&route);
                    }
                }
            }
        }

        let endpoints: Vec<Arc<Endpoint>> = {
            let mut endpoints = self.endpoints.lock();
            endpoints.retain(|weak| weak.strong_count() > 0);
            endpoints.iter().filter_map(Weak::upgrade).collect()
        };
        for endpoint in endpoints {
            endpoint.check_routes();
        }
    }

    fn spawn_ping(self: &Arc<Self>, route: Arc<StartRoute>) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(err) = service.send_start(&route, RoutedPayload::Ping).await {
                debug!(route = %route.id(), "Ping failed: {}", err);
            }
        });
    }

    fn note_drop(&self, reason: DropReason) {
        match reason {
            DropReason::Decode => self.metrics.inc_dropped_decode(),
            DropReason::Replay => self.metrics.inc_dropped_replay(),
            DropReason::Inactive => {}
        }
    }
}

impl std::fmt::Debug for RouteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteService")
            .field("node_key", &self.identity.node_key())
            .field("routes", &self.table.counts())
            .finish()
    }
}
