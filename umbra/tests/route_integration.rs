// Copyright (c) 2024 Botho Foundation

//! Integration tests for cipher routes.
//!
//! These tests run whole routes over the in-memory network: establishment,
//! data in both directions, teardown paths and pool health.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{sleep, timeout, Instant};
use umbra::network::route::sim::{LocalNetwork, SimNode, ECHO_GREETING, ECHO_SERVICE};
use umbra::network::route::{
    Acceptance, ConnectionHandler, EndpointOptions, IdentityKeyPair, InboundConnection,
    RouteConfig, RouteError,
};
use umbra_wire::{RecipientId, RelayHandle, Request, Response};

const RECV_LIMIT: Duration = Duration::from_secs(5);

fn chain(nodes: &[SimNode]) -> Vec<RelayHandle> {
    nodes.iter().map(SimNode::handle).collect()
}

fn identity() -> IdentityKeyPair {
    IdentityKeyPair::generate(&mut rand::thread_rng())
}

async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(500)).await;
    }
    check()
}

#[derive(Default)]
struct Greeter {
    closed: AtomicUsize,
}

impl ConnectionHandler for Greeter {
    fn on_connect(&self, _connection: &InboundConnection, body: &[u8]) -> Acceptance {
        let mut response = b"hello, ".to_vec();
        response.extend_from_slice(body);
        Acceptance::Accept {
            response: Some(response),
        }
    }

    fn on_message(&self, _connection: &InboundConnection, payload: Vec<u8>) -> Option<Vec<u8>> {
        let mut reply = b"ack:".to_vec();
        reply.extend_from_slice(&payload);
        Some(reply)
    }

    fn on_close(&self, _connection: &InboundConnection) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }
}

struct Refuse;

impl ConnectionHandler for Refuse {
    fn on_connect(&self, _connection: &InboundConnection, _body: &[u8]) -> Acceptance {
        Acceptance::Reject
    }

    fn on_message(&self, _connection: &InboundConnection, _payload: Vec<u8>) -> Option<Vec<u8>> {
        None
    }
}

/// Data round trip through every supported chain length.
#[tokio::test(start_paused = true)]
async fn test_round_trip_through_zero_to_three_relays() {
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(5, RouteConfig::default()).unwrap();

    for relays in 0..=3 {
        let socket = nodes[0]
            .service
            .connect_via(&chain(&nodes[1..=relays + 1]), ECHO_SERVICE, b"")
            .await
            .unwrap();
        assert_eq!(socket.response(), Some(ECHO_GREETING));
        assert_eq!(socket.route().relay_count(), relays);

        let message = format!("through {relays} relays").into_bytes();
        socket.send(message.clone()).await.unwrap();
        let echoed = timeout(RECV_LIMIT, socket.recv()).await.unwrap();
        assert_eq!(echoed, Some(message));

        socket.close().await;
    }

    let boundary = &nodes[4];
    assert_eq!(boundary.echo.received(), 1);
}

/// Every envelope on the wire has the configured size.
#[tokio::test(start_paused = true)]
async fn test_envelopes_have_fixed_size() {
    let config = RouteConfig::default();
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(5, config.clone()).unwrap();

    let socket = nodes[0]
        .service
        .connect_via(&chain(&nodes[1..]), ECHO_SERVICE, b"short body")
        .await
        .unwrap();
    for size in [0usize, 1, 100, config.cipher_params().max_routed_object() - 16] {
        socket.send(vec![0xab; size]).await.unwrap();
        timeout(RECV_LIMIT, socket.recv()).await.unwrap().unwrap();
    }

    let establish = network.envelope_sizes("establish");
    let routed = network.envelope_sizes("routed");
    assert_eq!(establish.len(), 4);
    assert!(establish.iter().all(|size| *size == config.establish_envelope_size));
    assert!(!routed.is_empty());
    assert!(routed.iter().all(|size| *size == config.routed_envelope_size));
}

#[tokio::test(start_paused = true)]
async fn test_oversized_payload_rejected_locally() {
    let config = RouteConfig::default();
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(2, config.clone()).unwrap();

    let socket = nodes[0]
        .service
        .connect_via(&chain(&nodes[1..]), ECHO_SERVICE, b"")
        .await
        .unwrap();
    let result = socket
        .send(vec![0u8; config.cipher_params().max_routed_object()])
        .await;
    assert!(matches!(result, Err(RouteError::PayloadTooLarge { .. })));
    assert!(socket.is_open());
}

/// A replayed envelope is acknowledged but never delivered twice.
#[tokio::test(start_paused = true)]
async fn test_replayed_messages_are_dropped() {
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(2, RouteConfig::default()).unwrap();
    let (start, boundary) = (&nodes[0], &nodes[1]);

    let socket = start
        .service
        .connect_via(&chain(&nodes[1..]), ECHO_SERVICE, b"")
        .await
        .unwrap();
    socket.send(b"once".to_vec()).await.unwrap();
    let echoed = timeout(RECV_LIMIT, socket.recv()).await.unwrap();
    assert_eq!(echoed, Some(b"once".to_vec()));

    // Outbound replay at the boundary
    let (from, request) = network.last_routed_to(boundary.addr).unwrap();
    assert_eq!(from, start.addr);
    let response = boundary.service.handle_request(from, request).await;
    assert_eq!(response, Some(Response::Ack));
    assert_eq!(boundary.service.metrics().snapshot().dropped_replay, 1);
    assert_eq!(boundary.echo.received(), 1);

    // Inbound replay at the start
    let (from, request) = network.last_routed_to(start.addr).unwrap();
    let response = start.service.handle_request(from, request).await;
    assert_eq!(response, Some(Response::Ack));
    assert_eq!(start.service.metrics().snapshot().dropped_replay, 1);
    assert_eq!(start.service.metrics().snapshot().messages_delivered, 1);
}

/// A silent boundary expires and later traffic to its label gets NoRoute.
#[tokio::test(start_paused = true)]
async fn test_boundary_timeout_then_no_route() {
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(2, RouteConfig::default()).unwrap();
    let (start, boundary) = (&nodes[0], &nodes[1]);

    let socket = start
        .service
        .connect_via(&chain(&nodes[1..]), ECHO_SERVICE, b"")
        .await
        .unwrap();
    let label = socket.route().remote_label().unwrap();
    assert_eq!(boundary.service.table().counts().boundary, 1);

    network.set_online(start.addr, false);
    sleep(Duration::from_secs(14)).await;

    assert_eq!(boundary.service.table().counts().boundary, 0);
    assert!(boundary.service.metrics().snapshot().timeouts >= 1);
    assert!(!socket.is_open());

    let response = boundary
        .service
        .handle_request(
            start.addr,
            Request::RoutedMessage {
                label,
                payload: vec![0u8; boundary.service.params().routed_envelope_size],
            },
        )
        .await;
    assert_eq!(response, Some(Response::NoRoute));
}

/// Keep-alive pings hold an idle route open well past the hop timeout.
#[tokio::test(start_paused = true)]
async fn test_pings_keep_idle_route_alive() {
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(3, RouteConfig::default()).unwrap();

    let socket = nodes[0]
        .service
        .connect_via(&chain(&nodes[1..]), ECHO_SERVICE, b"")
        .await
        .unwrap();
    sleep(Duration::from_secs(60)).await;

    assert!(socket.is_open());
    assert_eq!(nodes[1].service.table().counts().relay, 1);
    assert_eq!(nodes[2].service.table().counts().boundary, 1);
    socket.send(b"still here".to_vec()).await.unwrap();
    let echoed = timeout(RECV_LIMIT, socket.recv()).await.unwrap();
    assert_eq!(echoed, Some(b"still here".to_vec()));
}

/// A relay whose forward fails tears down and tells the inward side once.
#[tokio::test(start_paused = true)]
async fn test_relay_cascade_sends_one_disconnect_inward() {
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(3, RouteConfig::default()).unwrap();
    let (start, relay, boundary) = (&nodes[0], &nodes[1], &nodes[2]);

    let socket = start
        .service
        .connect_via(&chain(&nodes[1..]), ECHO_SERVICE, b"")
        .await
        .unwrap();
    assert_eq!(relay.service.table().counts().relay, 1);

    network.set_online(boundary.addr, false);
    // The relay acknowledges before forwarding
    socket.send(b"lost".to_vec()).await.unwrap();

    let closed = timeout(RECV_LIMIT, socket.recv()).await.unwrap();
    assert_eq!(closed, None);
    assert!(!socket.is_open());
    assert_eq!(network.disconnects_to(start.addr), 1);
    assert!(relay.service.table().is_empty());
    assert!(start.service.table().is_empty());
}

/// A relay whose outward side goes silent expires on its own sweep and
/// tells only the inward neighbour.
#[tokio::test(start_paused = true)]
async fn test_relay_expires_when_boundary_goes_silent() {
    let network = LocalNetwork::new();
    // Patient start so only the relay times out
    let patient = RouteConfig {
        base_delay_ms: 60_000,
        ..RouteConfig::default()
    };
    let start = network.spawn_node(patient).unwrap();
    let relay = network.spawn_node(RouteConfig::default()).unwrap();
    let boundary = network.spawn_node(RouteConfig::default()).unwrap();

    let socket = start
        .service
        .connect_via(&[relay.handle(), boundary.handle()], ECHO_SERVICE, b"")
        .await
        .unwrap();
    assert_eq!(relay.service.table().counts().relay, 1);

    network.set_swallow_routed(boundary.addr, true);
    sleep(Duration::from_secs(15)).await;

    assert!(relay.service.table().is_empty());
    assert_eq!(relay.service.metrics().snapshot().timeouts, 1);
    assert_eq!(network.disconnects_to(start.addr), 1);
    assert_eq!(network.disconnects_to(boundary.addr), 0);
    assert!(!socket.is_open());
    assert!(start.service.table().is_empty());
}

/// A Disconnect stuck in the transport does not hold up pings on other
/// routes.
#[tokio::test(start_paused = true)]
async fn test_slow_disconnect_does_not_stall_sweep() {
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(3, RouteConfig::default()).unwrap();
    let (start, silent, healthy) = (&nodes[0], &nodes[1], &nodes[2]);

    let lost = start
        .service
        .connect_via(&[silent.handle()], ECHO_SERVICE, b"")
        .await
        .unwrap();
    let kept = start
        .service
        .connect_via(&[healthy.handle()], ECHO_SERVICE, b"")
        .await
        .unwrap();

    network.set_swallow_routed(silent.addr, true);
    network.set_disconnect_delay(silent.addr, Duration::from_secs(30));
    sleep(Duration::from_secs(40)).await;

    assert!(!lost.is_open());
    assert!(kept.is_open());
    assert_eq!(healthy.service.table().counts().boundary, 1);

    kept.send(b"alive".to_vec()).await.unwrap();
    let echoed = timeout(RECV_LIMIT, kept.recv()).await.unwrap();
    assert_eq!(echoed, Some(b"alive".to_vec()));
}

/// Rejection at the boundary leaves no state anywhere on the chain.
#[tokio::test(start_paused = true)]
async fn test_rejected_connection_leaves_no_state() {
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(3, RouteConfig::default()).unwrap();
    let refusing = RecipientId([9u8; 32]);
    nodes[2].service.registry().subscribe(refusing, Arc::new(Refuse));

    let err = nodes[0]
        .service
        .connect_via(&chain(&nodes[1..]), refusing, b"")
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::Rejected));

    let err = nodes[0]
        .service
        .connect_via(&chain(&nodes[1..]), RecipientId([3u8; 32]), b"")
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::Rejected));

    for node in &nodes {
        assert!(node.service.table().is_empty());
    }
    assert_eq!(nodes[0].service.metrics().snapshot().establish_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_first_hop_fails_establishment() {
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(3, RouteConfig::default()).unwrap();
    network.set_online(nodes[1].addr, false);

    let err = nodes[0]
        .service
        .connect_via(&chain(&nodes[1..]), ECHO_SERVICE, b"")
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::Transport(_)));
    assert!(nodes[0].service.table().is_empty());
}

/// Concurrent establishments over the same link get distinct labels.
#[tokio::test(start_paused = true)]
async fn test_concurrent_routes_share_a_link() {
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(3, RouteConfig::default()).unwrap();
    let hops = chain(&nodes[1..]);

    let sockets = join_all(
        (0..20).map(|_| nodes[0].service.connect_via(&hops, ECHO_SERVICE, b"")),
    )
    .await;
    let sockets: Vec<_> = sockets.into_iter().map(Result::unwrap).collect();

    assert_eq!(nodes[0].service.table().len(), 20);
    assert_eq!(nodes[1].service.table().len(), 40);
    assert_eq!(nodes[1].service.table().counts().relay, 20);
    assert_eq!(nodes[2].service.table().counts().boundary, 20);

    for (n, socket) in sockets.iter().enumerate() {
        socket.send(vec![n as u8]).await.unwrap();
        let echoed = timeout(RECV_LIMIT, socket.recv()).await.unwrap();
        assert_eq!(echoed, Some(vec![n as u8]));
    }
}

/// Endpoint connect and listen with a custom handler.
#[tokio::test(start_paused = true)]
async fn test_connect_to_listening_endpoint() {
    let config = RouteConfig::default();
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(6, config.clone()).unwrap();
    let server_node = &nodes[5];

    let server = server_node.service.create_endpoint(
        identity(),
        EndpointOptions::from_config(1, ECHO_SERVICE, &config),
    );
    let greeter = Arc::new(Greeter::default());
    assert!(server.listen(greeter.clone()));
    assert!(!server.listen(greeter.clone()));

    let client = nodes[0].service.create_endpoint(
        identity(),
        EndpointOptions::from_config(1, ECHO_SERVICE, &config),
    );
    let socket = client
        .connect(server.recipient_id(), &server_node.service.node_key(), b"client")
        .await
        .unwrap();
    assert_eq!(socket.response(), Some(&b"hello, client"[..]));

    socket.send(b"data".to_vec()).await.unwrap();
    let reply = timeout(RECV_LIMIT, socket.recv()).await.unwrap();
    assert_eq!(reply, Some(b"ack:data".to_vec()));

    socket.close().await;
    assert!(wait_until(RECV_LIMIT, || greeter.closed.load(Ordering::Relaxed) == 1).await);

    let unknown = identity().node_key();
    let err = client
        .connect(server.recipient_id(), &unknown, b"")
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::UnknownDestination(_)));
}

/// The pool converges under establishment failures and recovers from churn.
#[tokio::test(start_paused = true)]
async fn test_pool_converges_and_recovers() {
    let config = RouteConfig::default();
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(12, config.clone()).unwrap();
    network.set_establish_failure_rate(0.3);

    let endpoint = nodes[0].service.create_endpoint(
        identity(),
        EndpointOptions::from_config(0, ECHO_SERVICE, &config),
    );
    assert!(
        wait_until(Duration::from_secs(60), || endpoint.established_count()
            >= config.target_routes)
        .await
    );
    assert!(nodes[0].service.metrics().snapshot().establish_failures > 0);

    endpoint.send(b"pool".to_vec()).await.unwrap();
    let echoed = timeout(RECV_LIMIT, endpoint.recv()).await.unwrap();
    assert_eq!(echoed, Some(b"pool".to_vec()));

    network.set_establish_failure_rate(0.0);
    for node in &nodes[1..5] {
        network.set_online(node.addr, false);
    }
    sleep(Duration::from_secs(30)).await;
    assert!(
        wait_until(Duration::from_secs(120), || endpoint.established_count()
            >= config.target_routes)
        .await
    );

    endpoint.send(b"after churn".to_vec()).await.unwrap();
    let echoed = timeout(RECV_LIMIT, endpoint.recv()).await.unwrap();
    assert_eq!(echoed, Some(b"after churn".to_vec()));
}

/// Over-provisioned attempts settle back to exactly the target.
#[tokio::test(start_paused = true)]
async fn test_pool_settles_on_target() {
    let config = RouteConfig::default();
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(12, config.clone()).unwrap();

    let endpoint = nodes[0].service.create_endpoint(
        identity(),
        EndpointOptions::from_config(0, ECHO_SERVICE, &config),
    );
    sleep(Duration::from_secs(30)).await;

    assert_eq!(endpoint.established_count(), config.target_routes);
    assert_eq!(endpoint.establishing_count(), 0);
    assert_eq!(
        nodes[0].service.table().counts().start,
        config.target_routes
    );
}

#[tokio::test(start_paused = true)]
async fn test_closed_endpoint_stops_provisioning() {
    let config = RouteConfig::default();
    let network = LocalNetwork::new();
    let nodes = network.spawn_nodes(6, config.clone()).unwrap();

    let endpoint = nodes[0].service.create_endpoint(
        identity(),
        EndpointOptions::from_config(0, ECHO_SERVICE, &config),
    );
    assert!(
        wait_until(Duration::from_secs(30), || endpoint.established_count()
            >= config.target_routes)
        .await
    );

    endpoint.close().await;
    sleep(Duration::from_secs(5)).await;

    assert_eq!(endpoint.established_count(), 0);
    assert_eq!(endpoint.establishing_count(), 0);
    assert_eq!(nodes[0].service.table().counts().start, 0);
    assert!(matches!(
        endpoint.send(b"nope".to_vec()).await,
        Err(RouteError::NoEstablishedRoute)
    ));
}
