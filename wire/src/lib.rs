// Copyright (c) 2024 Botho Foundation

//! Wire vocabulary for Umbra multi-hop cipher routes.
//!
//! This crate defines everything two neighbouring hops must agree on:
//!
//! - **Identifiers**: route labels, peer addresses, node keys and recipient
//!   identifiers
//! - **Hop messages**: the [`Request`]/[`Response`] pairs exchanged over the
//!   underlying request/response transport
//! - **Route objects**: [`EstablishPayload`] read by the boundary hop and
//!   [`RoutedPayload`] carried inside steady-state envelopes
//!
//! # Message Flow
//!
//! ```text
//!  start            relay             boundary
//!    │ EstablishRoute  │                  │
//!    │────────────────▶│ EstablishRoute   │
//!    │                 │─────────────────▶│
//!    │                 │   Established    │
//!    │   Established   │◀─────────────────│
//!    │◀────────────────│                  │
//!    │ RoutedMessage   │                  │
//!    │────────────────▶│ RoutedMessage    │
//!    │       Ack       │─────────────────▶│
//!    │◀────────────────│       Ack        │
//!    │                 │◀─────────────────│
//! ```
//!
//! Encoding uses bincode with a size limit; see [`encode`] and [`decode`].

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod error;
pub mod messages;
pub mod types;

pub use error::{WireError, WireResult};
pub use messages::{
    decode, encode, EstablishPayload, Request, Response, RoutedPayload, MAX_MESSAGE_SIZE,
};
pub use types::{
    NodeKey, PeerAddr, RecipientId, RelayHandle, RouteLabel, MAX_COMPACT_ADDR_LEN, NODE_KEY_LEN,
    RECIPIENT_ID_LEN,
};
