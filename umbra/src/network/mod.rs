// Copyright (c) 2024 Botho Foundation

//! Overlay networking.
//!
//! Hop-to-hop transport and peer discovery live outside this crate and are
//! consumed through the traits in [`route::collaborators`].

pub mod route;

pub use route::{Endpoint, EndpointOptions, RouteConfig, RouteService};
