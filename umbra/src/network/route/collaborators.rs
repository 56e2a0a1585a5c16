// Copyright (c) 2024 Botho Foundation

//! Interfaces the route layer consumes from the rest of the node.
//!
//! ```text
//! ┌────────────────────┐   random_relays / lookup   ┌───────────────┐
//! │                    │◀───────────────────────────│ RelaySelector │
//! │                    │                            └───────────────┘
//! │    RouteService    │   inquire(to, request)     ┌───────────────┐
//! │                    │───────────────────────────▶│ HopTransport  │
//! │                    │                            └───────────────┘
//! │                    │   handler(recipient)       ┌───────────────────┐
//! │                    │───────────────────────────▶│ RecipientRegistry │
//! └────────────────────┘                            └───────────────────┘
//! ```
//!
//! # Thread Safety
//!
//! All collaborators must be `Send + Sync`; several endpoints and every
//! inbound request handler call them concurrently.

use super::boundary::InboundConnection;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use umbra_wire::{NodeKey, PeerAddr, RecipientId, RelayHandle, Request, Response};

/// Failure reported by the hop-to-hop transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No connection to the peer could be made
    #[error("peer {0} is unreachable")]
    Unreachable(PeerAddr),

    /// The peer did not answer within the transport's retry budget
    #[error("request to {0} timed out")]
    Timeout(PeerAddr),

    /// The peer received the request and chose not to answer
    #[error("peer {0} sent no response")]
    NoResponse(PeerAddr),
}

/// Request/response messaging with a neighbouring node.
///
/// Retries, duplicate suppression and framing belong to the implementation.
#[async_trait]
pub trait HopTransport: Send + Sync {
    /// Send `request` to `to` and wait for its response.
    async fn inquire(&self, to: PeerAddr, request: Request) -> Result<Response, TransportError>;
}

/// Source of candidate hops, typically backed by the DHT.
#[async_trait]
pub trait RelaySelector: Send + Sync {
    /// Up to `count` distinct random nodes willing to relay for `app_id`.
    ///
    /// May return fewer when not enough candidates are known.
    async fn random_relays(&self, app_id: u32, count: usize) -> Vec<RelayHandle>;

    /// Resolve a node key to a reachable hop.
    async fn lookup(&self, key: &NodeKey) -> Option<RelayHandle>;
}

/// Decision of a [`ConnectionHandler`] on an inbound connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// Keep the route; `response` travels back inside the acknowledgement
    Accept { response: Option<Vec<u8>> },
    /// Refuse; no route state is kept
    Reject,
}

/// Local logic reached through boundary routes.
pub trait ConnectionHandler: Send + Sync {
    /// A start point opened a route to this recipient.
    fn on_connect(&self, connection: &InboundConnection, body: &[u8]) -> Acceptance;

    /// Application data arrived; a returned value is sent back on the route.
    fn on_message(&self, connection: &InboundConnection, payload: Vec<u8>) -> Option<Vec<u8>>;

    /// The route closed.
    fn on_close(&self, _connection: &InboundConnection) {}
}

/// Subscriptions of local logic, keyed by recipient identifier.
pub trait RecipientRegistry: Send + Sync {
    /// Register `handler`; returns false if the recipient is taken.
    fn subscribe(&self, recipient: RecipientId, handler: Arc<dyn ConnectionHandler>) -> bool;

    /// Drop a registration.
    fn unsubscribe(&self, recipient: &RecipientId);

    /// The handler for `recipient`, if any.
    fn handler(&self, recipient: &RecipientId) -> Option<Arc<dyn ConnectionHandler>>;
}
