// Copyright (c) 2024 Botho Foundation

use anyhow::Result;
use std::path::Path;

use crate::config::Config;

/// Validate the config file and print the effective route settings.
pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    config.validate()?;

    let routes = &config.routes;
    println!("Config OK: {}", config_path.display());
    println!("  relays per route:    {}..={}", routes.min_relays, routes.max_relays);
    println!(
        "  target routes:       {} (x{} over-provisioning)",
        routes.target_routes, routes.over_provision_factor
    );
    println!(
        "  envelopes:           {} B establish, {} B routed",
        routes.establish_envelope_size, routes.routed_envelope_size
    );
    println!("  establish timeout:   {:?}", routes.establish_timeout());
    println!("  ping interval:       {:?}", routes.ping_interval());
    println!("  route timeout:       {:?}", routes.route_timeout());
    println!("  replay window:       {}", routes.replay_window);
    Ok(())
}
