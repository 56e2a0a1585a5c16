// Copyright (c) 2024 Botho Foundation

//! Errors surfaced at the connect and socket boundary.
//!
//! Decode failures, replays and unknown labels never reach callers; they are
//! handled where they occur. What remains is "connect failed" or "send
//! failed", with the reason attached.

use super::collaborators::TransportError;
use super::onion::CipherError;
use thiserror::Error;
use umbra_wire::{NodeKey, WireError};

/// Route-level failure.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Relay selection returned too few candidates
    #[error("need {needed} relays, selector offered {available}")]
    NoRelays { needed: usize, available: usize },

    /// The destination key could not be resolved
    #[error("unknown destination {0}")]
    UnknownDestination(NodeKey),

    /// No acknowledgement within the establishment window
    #[error("route establishment timed out")]
    EstablishTimeout,

    /// The recipient refused the connection
    #[error("connection rejected by recipient")]
    Rejected,

    /// The first hop answered establishment with something unexpected
    #[error("establishment failed: {0}")]
    EstablishFailed(&'static str),

    /// The acknowledgement did not decrypt or validate
    #[error("invalid establishment acknowledgement")]
    BadAcknowledgement,

    /// The neighbouring hop could not be reached
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The route is gone
    #[error("route closed")]
    Closed,

    /// The route is not yet carrying traffic
    #[error("route not established")]
    NotEstablished,

    /// No established route is available
    #[error("endpoint has no established routes")]
    NoEstablishedRoute,

    /// The payload does not fit one envelope
    #[error("payload of {size} bytes exceeds capacity of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Cipher(CipherError),

    #[error(transparent)]
    Wire(#[from] WireError),
}

impl From<CipherError> for RouteError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::PayloadTooLarge { size, max } => RouteError::PayloadTooLarge { size, max },
            other => RouteError::Cipher(other),
        }
    }
}

/// Result type for route operations.
pub type RouteResult<T> = Result<T, RouteError>;
