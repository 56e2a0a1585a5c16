// Copyright (c) 2024 Botho Foundation

//! Multi-hop cipher routes.
//!
//! # Overview
//!
//! A cipher route lets a node exchange messages with a recipient on another
//! node through a chain of relays, so that no single relay learns both ends.
//! Every node plays up to three roles at once:
//!
//! - **Start**: builds the route, holds every hop's key, wraps and unwraps
//!   all layers
//! - **Relay**: holds one key, peels or adds one layer, knows only its two
//!   neighbours
//! - **Boundary**: holds one key, terminates the route and hands payloads to
//!   the subscribed recipient
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                         ROUTE ESTABLISHMENT                        │
//! │                                                                    │
//! │  start ──EstablishRoute──▶ relay ──EstablishRoute──▶ boundary      │
//! │    │       [eph|enc( 1 |next|[eph|enc( 0 |len|hash|payload)])]     │
//! │    │                                                  │            │
//! │    ◀──Established(label, ack)── relay ◀──Established──┘            │
//! │                                  (adds its layer to the ack)       │
//! │                                                                    │
//! │                            STEADY STATE                            │
//! │                                                                    │
//! │  start ──RoutedMessage──▶ relay ──RoutedMessage──▶ boundary        │
//! │    ◀──────── Ack ───────── (ack per hop, forward asynchronously)   │
//! │                                                                    │
//! │  Data / Ping / Close travel inside fixed-size envelopes.           │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each node keys its routes by `(peer address, label)`, with the label
//! chosen by the node itself. A message therefore always carries the label
//! its receiver handed out.
//!
//! # Module Structure
//!
//! - [`types`]: identifiers, hop keys, phases
//! - [`keys`]: identity keys and HKDF derivation
//! - [`onion`]: establishment and steady-state layering
//! - [`replay`]: anti-replay window
//! - [`table`]: route table and role dispatch
//! - [`start`], [`relay`], [`boundary`]: per-role state machines
//! - [`service`]: request handling for all roles
//! - [`endpoint`]: route pools and sockets
//! - [`sweeper`]: periodic pings and timeouts
//! - [`sim`]: in-memory network
//!
//! # Security Considerations
//!
//! - Every layer uses a fresh ephemeral X25519 key
//! - Hop keys are zeroized on drop
//! - Envelopes have a fixed size in both phases
//! - Decode failures and replays are dropped without a distinguishable reply

pub mod boundary;
pub mod collaborators;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod onion;
pub mod relay;
pub mod replay;
pub mod service;
pub mod sim;
pub mod start;
pub mod subscriptions;
pub mod sweeper;
pub mod table;
pub mod types;

pub use boundary::{BoundaryRoute, InboundConnection};
pub use collaborators::{
    Acceptance, ConnectionHandler, HopTransport, RecipientRegistry, RelaySelector,
    TransportError,
};
pub use config::{CipherParams, RouteConfig, RouteConfigError};
pub use endpoint::{attempts_needed, Endpoint, EndpointOptions, RouteSocket};
pub use error::{RouteError, RouteResult};
pub use keys::IdentityKeyPair;
pub use metrics::{RouteMetrics, RouteMetricsSnapshot};
pub use onion::{BuiltEnvelope, CipherError, Opened};
pub use relay::RelayRoute;
pub use replay::{ReplayCheck, ReplayWindow};
pub use service::RouteService;
pub use start::{RouteEvent, StartRoute};
pub use subscriptions::Subscriptions;
pub use table::{RoleCounts, RouteEntry, RouteKey, RouteState, RouteTable};
pub use types::{DropReason, HopKey, Phase, RouteId, Side};
