// Copyright (c) 2024 Botho Foundation

//! Route simulator.
//!
//! Runs an in-memory network, keeps one endpoint's route pool alive while
//! establishment requests fail at the given rate, exchanges messages over
//! the pool and prints the counters of every node.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};

use umbra::network::route::sim::{LocalNetwork, ECHO_SERVICE};
use umbra::network::route::{EndpointOptions, IdentityKeyPair, RouteConfig, RouteMetricsSnapshot};
use umbra::telemetry;

#[derive(Parser)]
#[command(name = "route_sim")]
#[command(about = "Simulate cipher routes on an in-memory network", long_about = None)]
struct Args {
    /// Number of nodes
    #[arg(long, default_value_t = 12)]
    nodes: usize,

    /// Established routes the endpoint keeps
    #[arg(long, default_value_t = 3)]
    target: usize,

    /// Fraction of establishment requests that fail
    #[arg(long, default_value_t = 0.1)]
    failure_rate: f64,

    /// Messages to send once the pool converged
    #[arg(long, default_value_t = 20)]
    messages: usize,

    /// Seconds to wait for the pool to converge
    #[arg(long, default_value_t = 30)]
    converge_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(args.verbose)?;

    let config = RouteConfig {
        target_routes: args.target,
        ..RouteConfig::default()
    };
    let network = LocalNetwork::new();
    let nodes = network
        .spawn_nodes(args.nodes, config.clone())
        .context("Invalid route configuration")?;
    network.set_establish_failure_rate(args.failure_rate);
    let origin = nodes.first().context("Need at least one node")?;

    let identity = IdentityKeyPair::generate(&mut rand::thread_rng());
    let endpoint = origin.service.create_endpoint(
        identity,
        EndpointOptions::from_config(0, ECHO_SERVICE, &config),
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.converge_secs);
    while endpoint.established_count() < args.target {
        if tokio::time::Instant::now() >= deadline {
            warn!(
                established = endpoint.established_count(),
                "Pool did not converge in time"
            );
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!(
        established = endpoint.established_count(),
        establishing = endpoint.establishing_count(),
        "Pool ready"
    );

    let mut echoed = 0;
    for n in 0..args.messages {
        let message = format!("message {n}").into_bytes();
        if let Err(err) = endpoint.send(message).await {
            warn!("Send failed: {}", err);
            continue;
        }
        match tokio::time::timeout(Duration::from_secs(2), endpoint.recv()).await {
            Ok(Some(_)) => echoed += 1,
            _ => warn!("No echo for message {}", n),
        }
    }
    info!(sent = args.messages, echoed, "Exchange finished");

    endpoint.close().await;

    let mut total = RouteMetricsSnapshot::default();
    for node in network.nodes() {
        let snapshot = node.service.metrics().snapshot();
        info!(
            node = %node.addr,
            relayed = snapshot.messages_relayed,
            established = snapshot.routes_established,
            "Node counters"
        );
        total += snapshot;
    }
    eprintln!("{total}");
    Ok(())
}
