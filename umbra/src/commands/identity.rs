// Copyright (c) 2024 Botho Foundation

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use umbra_wire::RecipientId;

/// Print the node key and the recipient id derived from it.
pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let identity = config.identity()?;

    println!("Node key:     {}", identity.node_key());
    println!(
        "Recipient id: {}",
        hex::encode(RecipientId::from(identity.node_key()).as_bytes())
    );
    println!("Listen addr:  {}", config.listen_addr()?);
    Ok(())
}
