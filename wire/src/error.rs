// Copyright (c) 2024 Botho Foundation

//! Error types for the wire crate.

use displaydoc::Display;
use thiserror::Error;

/// Errors that can occur while encoding or decoding wire data.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum WireError {
    /// Failed to serialize message: {0}
    SerializationError(String),

    /// Failed to deserialize message: {0}
    DeserializationError(String),

    /// Unknown address family tag: {0}
    UnknownAddressFamily(u8),

    /// Address truncated: need {needed} bytes, have {available}
    TruncatedAddress {
        /// Bytes required by the address family
        needed: usize,
        /// Bytes actually present
        available: usize,
    },

    /// Invalid node key length: {0}
    InvalidKeyLength(usize),

    /// Invalid hex encoding: {0}
    InvalidHex(String),
}

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;
