// Copyright (c) 2024 Botho Foundation

//! Umbra overlay node library.
//!
//! Provides multi-hop cipher routes over an external request/response
//! transport, together with the node configuration and CLI commands.

#![deny(clippy::print_stdout)]

pub mod config;
pub mod network;
pub mod telemetry;

// Re-export commands module for CLI binary
pub mod commands;
