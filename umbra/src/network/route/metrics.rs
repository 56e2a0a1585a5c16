// Copyright (c) 2024 Botho Foundation

//! Route counters.
//!
//! Plain relaxed atomics; read them through [`RouteMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a [`RouteService`](super::service::RouteService).
#[derive(Debug, Default)]
pub struct RouteMetrics {
    /// Start routes that completed establishment.
    pub routes_established: AtomicU64,
    /// Start routes that failed to establish.
    pub establish_failures: AtomicU64,
    /// Relay roles taken on for other nodes.
    pub relays_established: AtomicU64,
    /// Boundary roles taken on for local recipients.
    pub boundaries_established: AtomicU64,
    /// Routed envelopes forwarded by relays.
    pub messages_relayed: AtomicU64,
    /// Application payloads delivered at a route end.
    pub messages_delivered: AtomicU64,
    /// Envelopes dropped because a layer or object did not decode.
    pub dropped_decode: AtomicU64,
    /// Envelopes dropped by an anti-replay window.
    pub dropped_replay: AtomicU64,
    /// Requests naming a label this node does not know.
    pub no_route: AtomicU64,
    /// Disconnect notifications sent.
    pub disconnects_sent: AtomicU64,
    /// Disconnect notifications received for known routes.
    pub disconnects_received: AtomicU64,
    /// Routes torn down for silence.
    pub timeouts: AtomicU64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl RouteMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        inc_routes_established => routes_established,
        inc_establish_failures => establish_failures,
        inc_relays_established => relays_established,
        inc_boundaries_established => boundaries_established,
        inc_relayed => messages_relayed,
        inc_delivered => messages_delivered,
        inc_dropped_decode => dropped_decode,
        inc_dropped_replay => dropped_replay,
        inc_no_route => no_route,
        inc_disconnects_sent => disconnects_sent,
        inc_disconnects_received => disconnects_received,
        inc_timeouts => timeouts,
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> RouteMetricsSnapshot {
        RouteMetricsSnapshot {
            routes_established: self.routes_established.load(Ordering::Relaxed),
            establish_failures: self.establish_failures.load(Ordering::Relaxed),
            relays_established: self.relays_established.load(Ordering::Relaxed),
            boundaries_established: self.boundaries_established.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            dropped_decode: self.dropped_decode.load(Ordering::Relaxed),
            dropped_replay: self.dropped_replay.load(Ordering::Relaxed),
            no_route: self.no_route.load(Ordering::Relaxed),
            disconnects_sent: self.disconnects_sent.load(Ordering::Relaxed),
            disconnects_received: self.disconnects_received.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RouteMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteMetricsSnapshot {
    pub routes_established: u64,
    pub establish_failures: u64,
    pub relays_established: u64,
    pub boundaries_established: u64,
    pub messages_relayed: u64,
    pub messages_delivered: u64,
    pub dropped_decode: u64,
    pub dropped_replay: u64,
    pub no_route: u64,
    pub disconnects_sent: u64,
    pub disconnects_received: u64,
    pub timeouts: u64,
}

impl std::ops::AddAssign for RouteMetricsSnapshot {
    fn add_assign(&mut self, other: Self) {
        self.routes_established += other.routes_established;
        self.establish_failures += other.establish_failures;
        self.relays_established += other.relays_established;
        self.boundaries_established += other.boundaries_established;
        self.messages_relayed += other.messages_relayed;
        self.messages_delivered += other.messages_delivered;
        self.dropped_decode += other.dropped_decode;
        self.dropped_replay += other.dropped_replay;
        self.no_route += other.no_route;
        self.disconnects_sent += other.disconnects_sent;
        self.disconnects_received += other.disconnects_received;
        self.timeouts += other.timeouts;
    }
}

impl std::fmt::Display for RouteMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "routes established   {}", self.routes_established)?;
        writeln!(f, "establish failures   {}", self.establish_failures)?;
        writeln!(f, "relay roles          {}", self.relays_established)?;
        writeln!(f, "boundary roles       {}", self.boundaries_established)?;
        writeln!(f, "messages relayed     {}", self.messages_relayed)?;
        writeln!(f, "messages delivered   {}", self.messages_delivered)?;
        writeln!(f, "dropped (decode)     {}", self.dropped_decode)?;
        writeln!(f, "dropped (replay)     {}", self.dropped_replay)?;
        writeln!(f, "no route             {}", self.no_route)?;
        writeln!(f, "disconnects sent     {}", self.disconnects_sent)?;
        writeln!(f, "disconnects received {}", self.disconnects_received)?;
        write!(f, "timeouts             {}", self.timeouts)
    }
}
