// Copyright (c) 2024 Botho Foundation

//! Route table.
//!
//! Every route a node takes part in is reachable through one or two entries
//! keyed by `(peer address, label)`, where the label is one this node chose
//! for that peer. Start and boundary routes own one entry; a relay owns two,
//! inserted and removed in the same critical section.
//!
//! ```text
//!  (10.0.0.1, 0x1a2b..) ──▶ Relay(inward)  ┐
//!  (10.0.0.3, 0x77f0..) ──▶ Relay(outward) ┴─▶ same Arc<RelayRoute>
//!  (10.0.0.5, 0x0c44..) ──▶ Start
//! ```
//!
//! Labels are drawn from a CSPRNG under the write lock, so no two entries
//! for the same peer ever share one.

use super::boundary::BoundaryRoute;
use super::relay::RelayRoute;
use super::start::StartRoute;
use super::types::Side;
use parking_lot::RwLock;
use rand::thread_rng;
use std::collections::HashMap;
use std::sync::Arc;
use umbra_wire::{PeerAddr, RouteLabel};

/// Key of a route table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub peer: PeerAddr,
    pub label: RouteLabel,
}

impl RouteKey {
    pub fn new(peer: PeerAddr, label: RouteLabel) -> Self {
        Self { peer, label }
    }
}

/// Role this node plays on a route.
#[derive(Debug, Clone)]
pub enum RouteState {
    Start(Arc<StartRoute>),
    Relay(Arc<RelayRoute>),
    Boundary(Arc<BoundaryRoute>),
}

impl RouteState {
    /// Whether both values refer to the same route.
    pub fn same_route(&self, other: &RouteState) -> bool {
        match (self, other) {
            (RouteState::Start(a), RouteState::Start(b)) => Arc::ptr_eq(a, b),
            (RouteState::Relay(a), RouteState::Relay(b)) => Arc::ptr_eq(a, b),
            (RouteState::Boundary(a), RouteState::Boundary(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            RouteState::Start(_) => "start",
            RouteState::Relay(_) => "relay",
            RouteState::Boundary(_) => "boundary",
        }
    }
}

impl From<Arc<StartRoute>> for RouteState {
    fn from(route: Arc<StartRoute>) -> Self {
        RouteState::Start(route)
    }
}

impl From<Arc<RelayRoute>> for RouteState {
    fn from(route: Arc<RelayRoute>) -> Self {
        RouteState::Relay(route)
    }
}

impl From<Arc<BoundaryRoute>> for RouteState {
    fn from(route: Arc<BoundaryRoute>) -> Self {
        RouteState::Boundary(route)
    }
}

/// A table entry: the route and which of its neighbours the key faces.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub state: RouteState,
    pub side: Side,
}

/// Number of routes per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleCounts {
    pub start: usize,
    pub relay: usize,
    pub boundary: usize,
}

/// All routes of one node.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: RwLock<HashMap<RouteKey, RouteEntry>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the entry for `key`.
    pub fn get(&self, key: &RouteKey) -> Option<RouteEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Number of entries (a relay counts twice).
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Reserve a fresh label for `peer` and register the route `build`
    /// produces for it.
    pub fn insert_with<T, F>(&self, peer: PeerAddr, side: Side, build: F) -> T
    where
        T: Clone + Into<RouteState>,
        F: FnOnce(RouteLabel) -> T,
    {
        let mut entries = self.entries.write();
        let label = fresh_label(&entries, peer, None);
        let route = build(label);
        entries.insert(
            RouteKey::new(peer, label),
            RouteEntry {
                state: route.clone().into(),
                side,
            },
        );
        route
    }

    /// Reserve one label per side and register a relay under both.
    pub fn insert_pair_with<T, F>(&self, inward: PeerAddr, outward: PeerAddr, build: F) -> T
    where
        T: Clone + Into<RouteState>,
        F: FnOnce(RouteLabel, RouteLabel) -> T,
    {
        let mut entries = self.entries.write();
        let inward_label = fresh_label(&entries, inward, None);
        let taken = (inward == outward).then_some(inward_label);
        let outward_label = fresh_label(&entries, outward, taken);

        let route = build(inward_label, outward_label);
        let state: RouteState = route.clone().into();
        entries.insert(
            RouteKey::new(inward, inward_label),
            RouteEntry {
                state: state.clone(),
                side: Side::Inward,
            },
        );
        entries.insert(
            RouteKey::new(outward, outward_label),
            RouteEntry {
                state,
                side: Side::Outward,
            },
        );
        route
    }

    /// Remove the entry at `key` if it still belongs to `state`.
    pub fn remove(&self, key: &RouteKey, state: &RouteState) -> bool {
        self.remove_all(&[*key], state) > 0
    }

    /// Remove every listed entry that still belongs to `state`, atomically.
    pub fn remove_all(&self, keys: &[RouteKey], state: &RouteState) -> usize {
        let mut entries = self.entries.write();
        let mut removed = 0;
        for key in keys {
            let owned = entries
                .get(key)
                .map(|entry| entry.state.same_route(state))
                .unwrap_or(false);
            if owned {
                entries.remove(key);
                removed += 1;
            }
        }
        removed
    }

    /// Every route once, in no particular order.
    pub fn states(&self) -> Vec<RouteState> {
        self.entries
            .read()
            .values()
            .filter(|entry| {
                !matches!(entry.state, RouteState::Relay(_)) || entry.side == Side::Inward
            })
            .map(|entry| entry.state.clone())
            .collect()
    }

    pub fn counts(&self) -> RoleCounts {
        let mut counts = RoleCounts::default();
        for state in self.states() {
            match state {
                RouteState::Start(_) => counts.start += 1,
                RouteState::Relay(_) => counts.relay += 1,
                RouteState::Boundary(_) => counts.boundary += 1,
            }
        }
        counts
    }
}

fn fresh_label(
    entries: &HashMap<RouteKey, RouteEntry>,
    peer: PeerAddr,
    taken: Option<RouteLabel>,
) -> RouteLabel {
    let mut rng = thread_rng();
    loop {
        let label = RouteLabel::random(&mut rng);
        if Some(label) != taken && !entries.contains_key(&RouteKey::new(peer, label)) {
            return label;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::route::types::{HopKey, RouteId, HOP_KEY_MATERIAL_LEN};
    use std::collections::HashSet;
    use std::thread;
    use tokio::time::Instant;
    use umbra_wire::RecipientId;

    fn peer(n: u8) -> PeerAddr {
        format!("10.0.0.{n}:7200").parse().unwrap()
    }

    fn boundary(peer: PeerAddr, label: RouteLabel) -> Arc<BoundaryRoute> {
        Arc::new(BoundaryRoute::new(
            RouteId(u64::from(label.0)),
            peer,
            label,
            RouteLabel(0),
            RecipientId([0u8; 32]),
            HopKey::from_material(&[1u8; HOP_KEY_MATERIAL_LEN]),
            64,
            Instant::now(),
        ))
    }

    fn relay(
        inward: PeerAddr,
        in_label: RouteLabel,
        outward: PeerAddr,
        out_label: RouteLabel,
    ) -> Arc<RelayRoute> {
        Arc::new(RelayRoute::new(
            HopKey::from_material(&[2u8; HOP_KEY_MATERIAL_LEN]),
            inward,
            in_label,
            RouteLabel(0),
            outward,
            out_label,
            Instant::now(),
        ))
    }

    #[test]
    fn test_insert_and_remove() {
        let table = RouteTable::new();
        let route = table.insert_with(peer(1), Side::Inward, |label| boundary(peer(1), label));
        let key = route.table_key();

        let entry = table.get(&key).unwrap();
        assert_eq!(entry.side, Side::Inward);
        assert_eq!(entry.state.role(), "boundary");

        let state: RouteState = route.clone().into();
        assert!(table.remove(&key, &state));
        assert!(!table.remove(&key, &state));
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_ignores_other_route() {
        let table = RouteTable::new();
        let route = table.insert_with(peer(1), Side::Inward, |label| boundary(peer(1), label));
        let impostor: RouteState = boundary(peer(1), route.label()).into();

        assert!(!table.remove(&route.table_key(), &impostor));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_relay_pair_same_peer_gets_distinct_labels() {
        let table = RouteTable::new();
        let route = table.insert_pair_with(peer(4), peer(4), |a, b| relay(peer(4), a, peer(4), b));

        let inward = route.table_key(Side::Inward);
        let outward = route.table_key(Side::Outward);
        assert_ne!(inward, outward);
        assert_eq!(table.get(&inward).unwrap().side, Side::Inward);
        assert_eq!(table.get(&outward).unwrap().side, Side::Outward);
        assert_eq!(table.counts().relay, 1);

        let state: RouteState = route.into();
        assert_eq!(table.remove_all(&[inward, outward], &state), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_labels_unique_under_concurrent_allocation() {
        let table = Arc::new(RouteTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || {
                    (0..500)
                        .map(|_| {
                            table
                                .insert_with(peer(1), Side::Inward, |label| {
                                    boundary(peer(1), label)
                                })
                                .label()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut labels = HashSet::new();
        for handle in handles {
            for label in handle.join().unwrap() {
                assert!(labels.insert(label), "label {label:?} issued twice");
            }
        }
        assert_eq!(labels.len(), 4000);
        assert_eq!(table.len(), 4000);
    }
}
