// Copyright (c) 2024 Botho Foundation

//! Core types for cipher routes.
//!
//! - [`RouteId`]: node-local identifier of a route end
//! - [`HopKey`]: symmetric key material shared between the start point and
//!   one hop
//! - [`Side`]: which neighbour of a hop a table entry faces
//! - [`Phase`]: lifecycle of a route state machine
//!
//! # Security
//!
//! Key material uses `zeroize` so it does not outlive the route that owns it.

use super::onion::CipherError;
use super::replay::ReplayWindow;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use umbra_wire::RoutedPayload;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Local identifier of a start or boundary route, unique per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(pub u64);

impl RouteId {
    /// Allocate the next identifier from a counter.
    pub(crate) fn next(counter: &AtomicU64) -> Self {
        Self(counter.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why an inbound routed envelope was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Layer, hash or object decoding failed
    Decode,
    /// Sequence rejected by the anti-replay window
    Replay,
    /// The route is not carrying traffic
    Inactive,
}

/// Result of screening an inbound routed envelope at a route end.
#[derive(Debug)]
pub(crate) enum Inbound {
    Payload(RoutedPayload),
    Dropped(DropReason),
}

impl Inbound {
    /// Apply the replay window and decode the object.
    pub(crate) fn screen(
        window: &Mutex<ReplayWindow>,
        opened: Result<(u64, Vec<u8>), CipherError>,
    ) -> Self {
        let (sequence, object) = match opened {
            Ok(opened) => opened,
            Err(_) => return Inbound::Dropped(DropReason::Decode),
        };
        if !window.lock().check(sequence) {
            return Inbound::Dropped(DropReason::Replay);
        }
        match umbra_wire::decode::<RoutedPayload>(&object) {
            Ok(payload) => Inbound::Payload(payload),
            Err(_) => Inbound::Dropped(DropReason::Decode),
        }
    }
}

/// Length of the AES-256 stream key.
pub const STREAM_KEY_LEN: usize = 32;

/// Length of the AES-256 IV blinding key.
pub const IV_KEY_LEN: usize = 32;

/// Total HKDF output consumed by a [`HopKey`].
pub const HOP_KEY_MATERIAL_LEN: usize = STREAM_KEY_LEN + IV_KEY_LEN;

/// Per-hop symmetric key for steady-state traffic.
///
/// The stream key drives AES-256-CTR over the envelope body. The IV key
/// drives a single AES-256 block operation that re-randomizes the envelope
/// IV at every hop, so neighbouring hops never see the same IV.
///
/// Clone is not derived; each key has exactly one owner.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct HopKey {
    stream: [u8; STREAM_KEY_LEN],
    iv: [u8; IV_KEY_LEN],
}

impl HopKey {
    /// Split HKDF output into a hop key.
    pub fn from_material(material: &[u8; HOP_KEY_MATERIAL_LEN]) -> Self {
        let mut stream = [0u8; STREAM_KEY_LEN];
        let mut iv = [0u8; IV_KEY_LEN];
        stream.copy_from_slice(&material[..STREAM_KEY_LEN]);
        iv.copy_from_slice(&material[STREAM_KEY_LEN..]);
        Self { stream, iv }
    }

    /// Key for the CTR keystream.
    #[inline]
    pub(crate) fn stream_key(&self) -> &[u8; STREAM_KEY_LEN] {
        &self.stream
    }

    /// Key for the IV permutation.
    #[inline]
    pub(crate) fn iv_key(&self) -> &[u8; IV_KEY_LEN] {
        &self.iv
    }

    /// Short fingerprint for logs; reveals nothing about the key.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.stream);
        hasher.update(self.iv);
        hex::encode(&hasher.finalize()[..4])
    }
}

impl PartialEq for HopKey {
    fn eq(&self, other: &Self) -> bool {
        self.stream == other.stream && self.iv == other.iv
    }
}

impl Eq for HopKey {}

impl fmt::Debug for HopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HopKey(sha256:{})", self.fingerprint())
    }
}

/// Which neighbour a route table entry faces.
///
/// Relays register one entry per side; start points only face outward and
/// boundaries only face inward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Toward the start point
    Inward,
    /// Toward the boundary
    Outward,
}

impl Side {
    /// The other neighbour.
    pub fn opposite(self) -> Self {
        match self {
            Side::Inward => Side::Outward,
            Side::Outward => Side::Inward,
        }
    }
}

/// Lifecycle of a route at one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Establishment envelope sent, waiting for the acknowledgement
    Establishing,
    /// Carrying traffic
    Established,
    /// Torn down; every later event is a no-op
    Closed,
}

impl Phase {
    fn to_u8(self) -> u8 {
        match self {
            Phase::Establishing => 0,
            Phase::Established => 1,
            Phase::Closed => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Establishing,
            1 => Phase::Established,
            _ => Phase::Closed,
        }
    }
}

/// Atomically updated [`Phase`].
#[derive(Debug)]
pub struct AtomicPhase(AtomicU8);

impl AtomicPhase {
    /// Start in the given phase.
    pub fn new(phase: Phase) -> Self {
        Self(AtomicU8::new(phase.to_u8()))
    }

    /// Current phase.
    pub fn load(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `Establishing` to `Established`.
    ///
    /// Returns false if the route was already closed.
    pub fn establish(&self) -> bool {
        self.0
            .compare_exchange(
                Phase::Establishing.to_u8(),
                Phase::Established.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Closed`.
    ///
    /// Returns true for exactly one caller, the one that performed the
    /// transition.
    pub fn close(&self) -> bool {
        self.0.swap(Phase::Closed.to_u8(), Ordering::AcqRel) != Phase::Closed.to_u8()
    }
}
