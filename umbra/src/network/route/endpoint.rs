// Copyright (c) 2024 Botho Foundation

//! Logical endpoints and route sockets.
//!
//! An [`Endpoint`] keeps a pool of established start routes to random
//! boundaries offering its service, replacing routes as they fail. Routes are
//! over-provisioned: when `k` routes are missing, `ceil(k * factor)` attempts
//! are in flight at once, counting those already running. Once more routes
//! than the target are established, the surplus is shut down.
//!
//! A [`RouteSocket`] is a single dedicated route to a known destination,
//! opened with [`Endpoint::connect`] or
//! [`RouteService::connect_via`](super::service::RouteService::connect_via).

use super::collaborators::ConnectionHandler;
use super::config::RouteConfig;
use super::error::{RouteError, RouteResult};
use super::keys::IdentityKeyPair;
use super::service::RouteService;
use super::start::{RouteEvent, StartRoute};
use super::types::{Phase, RouteId};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info};
use umbra_wire::{NodeKey, RecipientId, RoutedPayload};

/// Pool policy of one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointOptions {
    /// Application the relays are selected for
    pub app_id: u32,
    /// Recipient every pool route is opened to
    pub service: RecipientId,
    pub min_relays: usize,
    pub max_relays: usize,
    /// Established routes to keep
    pub target_routes: usize,
    pub over_provision_factor: f64,
}

impl EndpointOptions {
    /// Pool policy taken from the node's route configuration.
    pub fn from_config(app_id: u32, service: RecipientId, config: &RouteConfig) -> Self {
        Self {
            app_id,
            service,
            min_relays: config.min_relays,
            max_relays: config.max_relays,
            target_routes: config.target_routes,
            over_provision_factor: config.over_provision_factor,
        }
    }

    fn random_relay_count(&self) -> usize {
        if self.max_relays <= self.min_relays {
            return self.min_relays;
        }
        thread_rng().gen_range(self.min_relays..=self.max_relays)
    }
}

/// Establishment attempts to launch so the pool converges on `target`.
pub fn attempts_needed(
    target: usize,
    established: usize,
    establishing: usize,
    factor: f64,
) -> usize {
    if established >= target {
        return 0;
    }
    let wanted = ((target - established) as f64 * factor.max(1.0)).ceil() as usize;
    wanted.saturating_sub(establishing)
}

/// A logical endpoint with its own identity and route pool.
pub struct Endpoint {
    identity: IdentityKeyPair,
    options: EndpointOptions,
    service: Arc<RouteService>,
    pool: Mutex<HashMap<RouteId, Arc<StartRoute>>>,
    establishing: AtomicUsize,
    events: mpsc::UnboundedSender<RouteEvent>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl Endpoint {
    pub(crate) fn new(
        service: Arc<RouteService>,
        identity: IdentityKeyPair,
        options: EndpointOptions,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(Self {
            identity,
            options,
            service,
            pool: Mutex::new(HashMap::new()),
            establishing: AtomicUsize::new(0),
            events: events_tx,
            incoming: tokio::sync::Mutex::new(incoming_rx),
            closed: AtomicBool::new(false),
        });
        tokio::spawn(drive(Arc::downgrade(&endpoint), events_rx, incoming_tx));
        endpoint
    }

    /// Public key of this endpoint.
    pub fn node_key(&self) -> NodeKey {
        self.identity.node_key()
    }

    /// Identifier others connect to after [`listen`](Self::listen).
    pub fn recipient_id(&self) -> RecipientId {
        RecipientId::from(self.identity.node_key())
    }

    pub fn options(&self) -> &EndpointOptions {
        &self.options
    }

    pub fn established_count(&self) -> usize {
        self.pool
            .lock()
            .values()
            .filter(|route| route.is_established())
            .count()
    }

    pub fn establishing_count(&self) -> usize {
        self.establishing.load(Ordering::Relaxed)
    }

    /// Launch establishment attempts if the pool is short, or retire routes
    /// if it is over target.
    pub fn check_routes(self: &Arc<Self>) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        self.retire_surplus();
        let attempts = attempts_needed(
            self.options.target_routes,
            self.established_count(),
            self.establishing_count(),
            self.options.over_provision_factor,
        );
        if attempts > 0 {
            debug!(attempts, "Launching route attempts");
        }
        for _ in 0..attempts {
            self.establishing.fetch_add(1, Ordering::Relaxed);
            let endpoint = self.clone();
            tokio::spawn(async move { endpoint.attempt().await });
        }
    }

    fn retire_surplus(&self) {
        let surplus: Vec<Arc<StartRoute>> = {
            let mut pool = self.pool.lock();
            let live: Vec<RouteId> = pool
                .values()
                .filter(|route| route.is_established())
                .map(|route| route.id())
                .collect();
            let excess = live.len().saturating_sub(self.options.target_routes);
            live.choose_multiple(&mut thread_rng(), excess)
                .filter_map(|id| pool.remove(id))
                .collect()
        };
        if surplus.is_empty() {
            return;
        }
        debug!(surplus = surplus.len(), "Retiring surplus routes");
        let service = self.service.clone();
        tokio::spawn(async move {
            for route in surplus {
                service.shutdown_start(&route).await;
            }
        });
    }

    async fn attempt(self: Arc<Self>) {
        let result = self.open_pool_route().await;
        self.establishing.fetch_sub(1, Ordering::Relaxed);

        let route = match result {
            Ok(route) => route,
            Err(err) => {
                debug!("Pool route attempt failed: {}", err);
                return;
            }
        };
        if self.closed.load(Ordering::Relaxed) {
            self.service.shutdown_start(&route).await;
            return;
        }
        self.pool.lock().insert(route.id(), route.clone());
        // A close racing the insert has already been delivered.
        if route.phase() == Phase::Closed {
            self.pool.lock().remove(&route.id());
        }
    }

    async fn open_pool_route(&self) -> RouteResult<Arc<StartRoute>> {
        let relays = self.options.random_relay_count();
        let chain = self
            .service
            .selector()
            .random_relays(self.options.app_id, relays + 1)
            .await;
        if chain.len() < relays + 1 {
            return Err(RouteError::NoRelays {
                needed: relays + 1,
                available: chain.len(),
            });
        }
        let (route, _) = self
            .service
            .open_route(&chain, self.options.service, &[], self.events.clone())
            .await?;
        Ok(route)
    }

    /// Send over a uniformly random established pool route.
    pub async fn send(&self, data: Vec<u8>) -> RouteResult<()> {
        let route = {
            let pool = self.pool.lock();
            let live: Vec<&Arc<StartRoute>> =
                pool.values().filter(|route| route.is_established()).collect();
            live.choose(&mut thread_rng()).map(|route| Arc::clone(route))
        };
        let route = route.ok_or(RouteError::NoEstablishedRoute)?;
        self.service
            .send_start(&route, RoutedPayload::Data(data))
            .await
    }

    /// Next payload that arrived on any pool route.
    pub async fn recv(&self) -> Option<Vec<u8>> {
        self.incoming.lock().await.recv().await
    }

    /// Open a dedicated route to the recipient behind node `destination`.
    pub async fn connect(
        &self,
        recipient: RecipientId,
        destination: &NodeKey,
        body: &[u8],
    ) -> RouteResult<RouteSocket> {
        let selector = self.service.selector();
        let boundary = selector
            .lookup(destination)
            .await
            .ok_or(RouteError::UnknownDestination(*destination))?;

        let relays = self.options.random_relay_count();
        let mut chain = selector
            .random_relays(self.options.app_id, relays + 1)
            .await;
        chain.retain(|handle| handle.key != boundary.key);
        chain.truncate(relays);
        if chain.len() < relays {
            return Err(RouteError::NoRelays {
                needed: relays,
                available: chain.len(),
            });
        }
        chain.push(boundary);
        self.service.connect_via(&chain, recipient, body).await
    }

    /// Accept inbound connections addressed to this endpoint.
    ///
    /// Returns false if another handler already holds the identifier.
    pub fn listen(&self, handler: Arc<dyn ConnectionHandler>) -> bool {
        self.service
            .registry()
            .subscribe(self.recipient_id(), handler)
    }

    /// Stop listening and close every pool route.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        self.service.registry().unsubscribe(&self.recipient_id());
        let routes: Vec<_> = self.pool.lock().drain().map(|(_, route)| route).collect();
        for route in routes {
            self.service.shutdown_start(&route).await;
        }
        info!(endpoint = %self.node_key(), "Endpoint closed");
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let routes: Vec<_> = self.pool.get_mut().drain().map(|(_, route)| route).collect();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let service = self.service.clone();
        runtime.spawn(async move {
            for route in routes {
                service.shutdown_start(&route).await;
            }
        });
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("node_key", &self.identity.node_key())
            .field("established", &self.established_count())
            .field("establishing", &self.establishing_count())
            .finish()
    }
}

async fn drive(
    endpoint: Weak<Endpoint>,
    mut events: mpsc::UnboundedReceiver<RouteEvent>,
    incoming: mpsc::UnboundedSender<Vec<u8>>,
) {
    while let Some(event) = events.recv().await {
        let Some(endpoint) = endpoint.upgrade() else {
            break;
        };
        match event {
            RouteEvent::Data { payload, .. } => {
                let _ = incoming.send(payload);
            }
            RouteEvent::Closed { route } => {
                endpoint.pool.lock().remove(&route);
                endpoint.check_routes();
            }
        }
    }
}

/// One dedicated start route.
pub struct RouteSocket {
    route: Arc<StartRoute>,
    service: Arc<RouteService>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<RouteEvent>>,
    response: Option<Vec<u8>>,
}

impl RouteSocket {
    pub(crate) fn new(
        route: Arc<StartRoute>,
        service: Arc<RouteService>,
        events: mpsc::UnboundedReceiver<RouteEvent>,
        response: Option<Vec<u8>>,
    ) -> Self {
        Self {
            route,
            service,
            events: tokio::sync::Mutex::new(events),
            response,
        }
    }

    /// Response the recipient attached to its acceptance.
    pub fn response(&self) -> Option<&[u8]> {
        self.response.as_deref()
    }

    pub fn route(&self) -> &Arc<StartRoute> {
        &self.route
    }

    pub fn is_open(&self) -> bool {
        self.route.is_established()
    }

    pub async fn send(&self, data: Vec<u8>) -> RouteResult<()> {
        self.service
            .send_start(&self.route, RoutedPayload::Data(data))
            .await
    }

    /// Next payload from the recipient; `None` once the route closed.
    pub async fn recv(&self) -> Option<Vec<u8>> {
        let mut events = self.events.lock().await;
        loop {
            match events.recv().await? {
                RouteEvent::Data { payload, .. } => return Some(payload),
                RouteEvent::Closed { .. } => return None,
            }
        }
    }

    /// Close the route end to end.
    pub async fn close(&self) {
        self.service.shutdown_start(&self.route).await;
    }
}

impl Drop for RouteSocket {
    fn drop(&mut self) {
        if self.route.phase() == Phase::Closed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let service = self.service.clone();
        let route = self.route.clone();
        runtime.spawn(async move { service.shutdown_start(&route).await });
    }
}

impl std::fmt::Debug for RouteSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSocket")
            .field("route", &self.route.id())
            .field("phase", &self.route.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_needed() {
        // 3 missing, factor 1.5 -> 5 in flight
        assert_eq!(attempts_needed(3, 0, 0, 1.5), 5);
        assert_eq!(attempts_needed(3, 0, 2, 1.5), 3);
        assert_eq!(attempts_needed(3, 1, 0, 1.5), 3);
        assert_eq!(attempts_needed(3, 0, 9, 1.5), 0);
        assert_eq!(attempts_needed(3, 3, 0, 1.5), 0);
        assert_eq!(attempts_needed(3, 5, 0, 1.5), 0);
    }

    #[test]
    fn test_factor_below_one_is_clamped() {
        assert_eq!(attempts_needed(4, 0, 0, 0.5), 4);
    }

    #[test]
    fn test_options_from_config() {
        let config = RouteConfig::default();
        let options = EndpointOptions::from_config(7, RecipientId([1u8; 32]), &config);
        assert_eq!(options.app_id, 7);
        assert_eq!(options.target_routes, config.target_routes);

        let count = options.random_relay_count();
        assert!(count >= options.min_relays && count <= options.max_relays);
    }
}
