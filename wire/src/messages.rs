// Copyright (c) 2024 Botho Foundation

//! Messages exchanged between neighbouring hops, and the objects carried
//! inside encrypted route envelopes.
//!
//! Hop-to-hop traffic is strictly request/response: every [`Request`] is
//! answered with a [`Response`] by the neighbour it was sent to, or not at
//! all when the neighbour silently drops it.

use crate::error::{WireError, WireResult};
use crate::types::{RecipientId, RouteLabel};
use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Upper bound on any encoded wire object.
pub const MAX_MESSAGE_SIZE: u64 = 64 * 1024;

// ============================================================================
// Hop-to-hop messages
// ============================================================================

/// A request sent to a neighbouring hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// One layer of a nested establishment envelope.
    EstablishRoute {
        /// Label the sender chose for replies on this link
        label: RouteLabel,
        /// Fixed-size envelope for the receiving hop
        envelope: Vec<u8>,
    },

    /// Steady-state traffic on an established route.
    RoutedMessage {
        /// Label the receiving hop chose for this link
        label: RouteLabel,
        /// Fixed-size layered payload
        payload: Vec<u8>,
    },

    /// Best-effort teardown notice.
    Disconnect {
        /// Label the receiving hop chose for this link
        label: RouteLabel,
    },
}

impl Request {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::EstablishRoute { .. } => "establish",
            Request::RoutedMessage { .. } => "routed",
            Request::Disconnect { .. } => "disconnect",
        }
    }
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// The route was established through the responder.
    Established {
        /// Label the responder chose; the requester sends with it henceforth
        label: RouteLabel,
        /// Layered acknowledgement travelling back to the start point
        payload: Vec<u8>,
    },

    /// Hop-level acknowledgement of a routed message or disconnect.
    Ack,

    /// No route is registered under the label for the sender's address.
    NoRoute,

    /// The recipient refused the connection.
    Rejected,
}

// ============================================================================
// Objects inside route envelopes
// ============================================================================

/// Payload of the innermost establishment layer, read by the boundary hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishPayload {
    /// Local logic the boundary should hand the connection to
    pub recipient: RecipientId,
    /// Opaque application data offered with the connection
    pub body: Vec<u8>,
}

/// Object carried by a steady-state routed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutedPayload {
    /// Acknowledgement produced by the boundary when the route comes up.
    Established {
        /// Optional response from the recipient
        response: Option<Vec<u8>>,
    },

    /// Application data.
    Data(Vec<u8>),

    /// Keep-alive. The boundary answers each one with a ping of its own.
    Ping,

    /// The sending end is tearing the route down.
    Close,
}

// ============================================================================
// Encoding
// ============================================================================

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_MESSAGE_SIZE)
}

/// Serialize a wire object.
pub fn encode<T: Serialize>(value: &T) -> WireResult<Vec<u8>> {
    options()
        .serialize(value)
        .map_err(|e| WireError::SerializationError(e.to_string()))
}

/// Deserialize a wire object, rejecting trailing bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> WireResult<T> {
    options()
        .deserialize(bytes)
        .map_err(|e| WireError::DeserializationError(e.to_string()))
}
