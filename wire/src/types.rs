// Copyright (c) 2024 Botho Foundation

//! Identifiers shared by every hop of a cipher route.
//!
//! - [`RouteLabel`]: per-link route identifier chosen by the receiving hop
//! - [`PeerAddr`]: transport address of a neighbouring node
//! - [`NodeKey`]: X25519 public key doubling as a routable node identifier
//! - [`RecipientId`]: identifier a boundary hop delivers payloads to
//! - [`RelayHandle`]: address plus key, as handed out by relay selection

use crate::error::{WireError, WireResult};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Length of a node key in bytes.
pub const NODE_KEY_LEN: usize = 32;

/// Length of a recipient identifier in bytes.
pub const RECIPIENT_ID_LEN: usize = 32;

/// Upper bound on the compact encoding of a [`PeerAddr`].
pub const MAX_COMPACT_ADDR_LEN: usize = 1 + 16 + 2;

const TAG_V4: u8 = 4;
const TAG_V6: u8 = 6;

/// A route label.
///
/// Each node picks the label its neighbour must use when sending to it, so a
/// label is only meaningful together with the neighbour's address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteLabel(pub u32);

impl RouteLabel {
    /// Draw a random label.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        Self(rng.next_u32())
    }
}

impl fmt::Debug for RouteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouteLabel({:08x})", self.0)
    }
}

impl fmt::Display for RouteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Transport address of a peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddr(pub SocketAddr);

impl PeerAddr {
    /// Number of bytes [`PeerAddr::encode_compact`] writes.
    pub fn compact_len(&self) -> usize {
        match self.0.ip() {
            IpAddr::V4(_) => 1 + 4 + 2,
            IpAddr::V6(_) => 1 + 16 + 2,
        }
    }

    /// Append the compact form `[family][ip][port BE]` to `out`.
    pub fn encode_compact(&self, out: &mut Vec<u8>) {
        match self.0.ip() {
            IpAddr::V4(ip) => {
                out.push(TAG_V4);
                out.extend_from_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                out.push(TAG_V6);
                out.extend_from_slice(&ip.octets());
            }
        }
        out.extend_from_slice(&self.0.port().to_be_bytes());
    }

    /// Decode a compact address from the front of `bytes`.
    ///
    /// Returns the address and the number of bytes consumed.
    pub fn decode_compact(bytes: &[u8]) -> WireResult<(Self, usize)> {
        let tag = *bytes.first().ok_or(WireError::TruncatedAddress {
            needed: 1,
            available: 0,
        })?;
        let ip_len = match tag {
            TAG_V4 => 4,
            TAG_V6 => 16,
            other => return Err(WireError::UnknownAddressFamily(other)),
        };
        let needed = 1 + ip_len + 2;
        if bytes.len() < needed {
            return Err(WireError::TruncatedAddress {
                needed,
                available: bytes.len(),
            });
        }

        let ip = if ip_len == 4 {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&bytes[1..5]);
            IpAddr::V4(Ipv4Addr::from(octets))
        } else {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&bytes[1..17]);
            IpAddr::V6(Ipv6Addr::from(octets))
        };
        let port = u16::from_be_bytes([bytes[needed - 2], bytes[needed - 1]]);

        Ok((Self(SocketAddr::new(ip, port)), needed))
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for PeerAddr {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>().map(Self)
    }
}

impl fmt::Debug for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddr({})", self.0)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public X25519 key identifying a node or a logical endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey(pub [u8; NODE_KEY_LEN]);

impl NodeKey {
    /// Create a node key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> WireResult<Self> {
        if bytes.len() != NODE_KEY_LEN {
            return Err(WireError::InvalidKeyLength(bytes.len()));
        }
        let mut arr = [0u8; NODE_KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Get the raw key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; NODE_KEY_LEN] {
        &self.0
    }

    /// Full lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for NodeKey {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| WireError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Identifier of whatever local logic a boundary hop hands payloads to.
///
/// A logical endpoint listens on the identifier derived from its own key;
/// node-wide services pick arbitrary identifiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipientId(pub [u8; RECIPIENT_ID_LEN]);

impl RecipientId {
    /// Get the raw identifier bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; RECIPIENT_ID_LEN] {
        &self.0
    }
}

impl From<NodeKey> for RecipientId {
    fn from(key: NodeKey) -> Self {
        Self(key.0)
    }
}

impl fmt::Debug for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecipientId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// A candidate hop: where to reach it and the key to agree secrets with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayHandle {
    /// Transport address
    pub addr: PeerAddr,
    /// Static X25519 public key of the node
    pub key: NodeKey,
}

impl RelayHandle {
    /// Create a relay handle.
    pub fn new(addr: PeerAddr, key: NodeKey) -> Self {
        Self { addr, key }
    }
}
