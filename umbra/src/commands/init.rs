// Copyright (c) 2024 Botho Foundation

use anyhow::{bail, Result};
use rand::thread_rng;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::network::route::IdentityKeyPair;

/// Run the init command
pub fn run(config_path: &Path, listen: Option<&str>) -> Result<()> {
    if Config::exists(config_path) {
        bail!(
            "Config already exists at {}\nUse a different --config path or delete the existing config.",
            config_path.display()
        );
    }

    let identity = IdentityKeyPair::generate(&mut thread_rng());
    let mut config = Config::new(&identity);
    if let Some(listen) = listen {
        config.node.listen_addr = listen.to_string();
    }
    config.validate()?;
    config.save(config_path)?;

    info!("Node initialized at {}", config_path.display());
    println!("\nNode identity created.");
    println!("Node key:  {}", identity.node_key());
    println!("Config saved to: {}", config_path.display());
    println!("\nKeep the config file private; it holds the node secret.");

    Ok(())
}
