// Copyright (c) 2024 Botho Foundation

//! In-memory network for simulation and tests.
//!
//! Every node gets a [`RouteService`] wired to a [`LocalTransport`] that
//! delivers requests by calling the target's
//! [`handle_request`](RouteService::handle_request) directly. Nodes can be
//! taken offline, establishment requests can be failed at a fixed rate to
//! exercise pool health, and a node's inbound link can be made to swallow
//! routed traffic or hold Disconnects.
//!
//! ```ignore
//! let network = LocalNetwork::new();
//! let nodes = network.spawn_nodes(8, RouteConfig::default())?;
//! let socket = nodes[0]
//!     .service
//!     .connect_via(&[nodes[1].handle(), nodes[2].handle()], ECHO_SERVICE, b"")
//!     .await?;
//! ```

use super::boundary::InboundConnection;
use super::collaborators::{
    Acceptance, ConnectionHandler, HopTransport, RecipientRegistry, RelaySelector,
    TransportError,
};
use super::config::{RouteConfig, RouteConfigError};
use super::keys::IdentityKeyPair;
use super::service::RouteService;
use super::subscriptions::Subscriptions;
use super::sweeper;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use umbra_wire::{NodeKey, PeerAddr, RecipientId, RelayHandle, Request, Response};

/// Port every simulated node listens on.
pub const SIM_PORT: u16 = 7200;

/// Recipient every simulated node serves with [`EchoHandler`].
pub const ECHO_SERVICE: RecipientId = RecipientId([0xec; 32]);

/// Accepts every connection with a greeting and echoes every message.
#[derive(Debug, Default)]
pub struct EchoHandler {
    received: AtomicU64,
}

/// Greeting returned in the acknowledgement.
pub const ECHO_GREETING: &[u8] = b"welcome";

impl EchoHandler {
    /// Messages echoed so far.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl ConnectionHandler for EchoHandler {
    fn on_connect(&self, _connection: &InboundConnection, _body: &[u8]) -> Acceptance {
        Acceptance::Accept {
            response: Some(ECHO_GREETING.to_vec()),
        }
    }

    fn on_message(&self, _connection: &InboundConnection, payload: Vec<u8>) -> Option<Vec<u8>> {
        self.received.fetch_add(1, Ordering::Relaxed);
        Some(payload)
    }
}

/// A node of the simulated network.
#[derive(Debug, Clone)]
pub struct SimNode {
    pub addr: PeerAddr,
    pub service: Arc<RouteService>,
    pub echo: Arc<EchoHandler>,
}

impl SimNode {
    pub fn handle(&self) -> RelayHandle {
        RelayHandle::new(self.addr, self.service.node_key())
    }
}

struct Slot {
    node: SimNode,
    online: bool,
    faults: LinkFaults,
    sweeper: JoinHandle<()>,
}

/// Misbehaviour injected on the link into one node.
#[derive(Debug, Clone, Copy, Default)]
struct LinkFaults {
    swallow_routed: bool,
    disconnect_delay: Duration,
}

#[derive(Default)]
struct Inner {
    nodes: RwLock<BTreeMap<PeerAddr, Slot>>,
    next_host: AtomicU32,
    establish_failure_rate: Mutex<f64>,
    disconnects: Mutex<HashMap<PeerAddr, usize>>,
    request_sizes: Mutex<HashMap<&'static str, Vec<usize>>>,
    last_routed: Mutex<HashMap<PeerAddr, (PeerAddr, Request)>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for slot in self.nodes.get_mut().values() {
            slot.sweeper.abort();
        }
    }
}

/// Handle to an in-memory network. Cheap to clone.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    inner: Arc<Inner>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node at the next free address, serving [`ECHO_SERVICE`].
    ///
    /// Must be called inside a tokio runtime; the node's sweeper starts
    /// immediately.
    pub fn spawn_node(&self, config: RouteConfig) -> Result<SimNode, RouteConfigError> {
        let host = self.inner.next_host.fetch_add(1, Ordering::Relaxed) + 1;
        let ip = Ipv4Addr::from(u32::from(Ipv4Addr::new(10, 0, 0, 0)) + host);
        let addr = PeerAddr(SocketAddr::from((ip, SIM_PORT)));

        let transport = Arc::new(LocalTransport {
            network: Arc::downgrade(&self.inner),
            local: addr,
        });
        let subscriptions = Arc::new(Subscriptions::new());
        let echo = Arc::new(EchoHandler::default());
        subscriptions.subscribe(ECHO_SERVICE, echo.clone());

        let identity = IdentityKeyPair::generate(&mut thread_rng());
        let service = RouteService::new(
            identity,
            config,
            transport.clone(),
            transport,
            subscriptions,
        )?;
        let node = SimNode {
            addr,
            service,
            echo,
        };
        let sweeper = sweeper::spawn(&node.service);
        self.inner.nodes.write().insert(
            addr,
            Slot {
                node: node.clone(),
                online: true,
                faults: LinkFaults::default(),
                sweeper,
            },
        );
        Ok(node)
    }

    /// Add `count` nodes with the same configuration.
    pub fn spawn_nodes(
        &self,
        count: usize,
        config: RouteConfig,
    ) -> Result<Vec<SimNode>, RouteConfigError> {
        (0..count).map(|_| self.spawn_node(config.clone())).collect()
    }

    pub fn nodes(&self) -> Vec<SimNode> {
        self.inner
            .nodes
            .read()
            .values()
            .map(|slot| slot.node.clone())
            .collect()
    }

    /// Take a node off the network or bring it back.
    pub fn set_online(&self, addr: PeerAddr, online: bool) {
        if let Some(slot) = self.inner.nodes.write().get_mut(&addr) {
            slot.online = online;
        }
    }

    /// Acknowledge routed messages to `addr` without delivering them.
    pub fn set_swallow_routed(&self, addr: PeerAddr, swallow: bool) {
        if let Some(slot) = self.inner.nodes.write().get_mut(&addr) {
            slot.faults.swallow_routed = swallow;
        }
    }

    /// Hold Disconnect requests to `addr` for `delay` before delivering them.
    pub fn set_disconnect_delay(&self, addr: PeerAddr, delay: Duration) {
        if let Some(slot) = self.inner.nodes.write().get_mut(&addr) {
            slot.faults.disconnect_delay = delay;
        }
    }

    /// Fail this fraction of establishment requests with a timeout.
    pub fn set_establish_failure_rate(&self, rate: f64) {
        *self.inner.establish_failure_rate.lock() = rate.clamp(0.0, 1.0);
    }

    /// Disconnect requests delivered to `addr`.
    pub fn disconnects_to(&self, addr: PeerAddr) -> usize {
        self.inner
            .disconnects
            .lock()
            .get(&addr)
            .copied()
            .unwrap_or(0)
    }

    /// Envelope sizes seen on the wire, by request kind.
    pub fn envelope_sizes(&self, kind: &str) -> Vec<usize> {
        self.inner
            .request_sizes
            .lock()
            .get(kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Most recent routed message delivered to `addr`, with its sender.
    pub fn last_routed_to(&self, addr: PeerAddr) -> Option<(PeerAddr, Request)> {
        self.inner.last_routed.lock().get(&addr).cloned()
    }
}

impl std::fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNetwork")
            .field("nodes", &self.inner.nodes.read().len())
            .finish()
    }
}

impl Inner {
    fn target(
        &self,
        from: PeerAddr,
        to: PeerAddr,
    ) -> Result<(Arc<RouteService>, LinkFaults), TransportError> {
        let nodes = self.nodes.read();
        let sender_online = nodes.get(&from).map(|slot| slot.online).unwrap_or(false);
        match nodes.get(&to) {
            Some(slot) if slot.online && sender_online => {
                Ok((slot.node.service.clone(), slot.faults))
            }
            _ => Err(TransportError::Unreachable(to)),
        }
    }

    fn record(&self, from: PeerAddr, to: PeerAddr, request: &Request) {
        let size = match request {
            Request::EstablishRoute { envelope, .. } => envelope.len(),
            Request::RoutedMessage { payload, .. } => payload.len(),
            Request::Disconnect { .. } => {
                *self.disconnects.lock().entry(to).or_default() += 1;
                return;
            }
        };
        self.request_sizes
            .lock()
            .entry(request.kind())
            .or_default()
            .push(size);
        if matches!(request, Request::RoutedMessage { .. }) {
            self.last_routed.lock().insert(to, (from, request.clone()));
        }
    }

    fn roll_establish_failure(&self) -> bool {
        let rate = *self.establish_failure_rate.lock();
        rate > 0.0 && thread_rng().gen_bool(rate)
    }
}

/// Transport and relay selector of one simulated node.
pub struct LocalTransport {
    network: Weak<Inner>,
    local: PeerAddr,
}

#[async_trait]
impl HopTransport for LocalTransport {
    async fn inquire(&self, to: PeerAddr, request: Request) -> Result<Response, TransportError> {
        let network = self.network.upgrade().ok_or(TransportError::Unreachable(to))?;
        let (service, faults) = network.target(self.local, to)?;
        match request {
            Request::EstablishRoute { .. } if network.roll_establish_failure() => {
                return Err(TransportError::Timeout(to));
            }
            Request::Disconnect { .. } if !faults.disconnect_delay.is_zero() => {
                sleep(faults.disconnect_delay).await;
            }
            _ => {}
        }
        network.record(self.local, to, &request);
        drop(network);

        if faults.swallow_routed && matches!(request, Request::RoutedMessage { .. }) {
            return Ok(Response::Ack);
        }
        service
            .handle_request(self.local, request)
            .await
            .ok_or(TransportError::NoResponse(to))
    }
}

#[async_trait]
impl RelaySelector for LocalTransport {
    async fn random_relays(&self, _app_id: u32, count: usize) -> Vec<RelayHandle> {
        let Some(network) = self.network.upgrade() else {
            return Vec::new();
        };
        let mut candidates: Vec<RelayHandle> = network
            .nodes
            .read()
            .values()
            .filter(|slot| slot.node.addr != self.local)
            .map(|slot| slot.node.handle())
            .collect();
        candidates.shuffle(&mut thread_rng());
        candidates.truncate(count);
        candidates
    }

    async fn lookup(&self, key: &NodeKey) -> Option<RelayHandle> {
        let network = self.network.upgrade()?;
        let nodes = network.nodes.read();
        nodes
            .values()
            .find(|slot| slot.node.service.node_key() == *key)
            .map(|slot| slot.node.handle())
    }
}
