// Copyright (c) 2024 Botho Foundation

//! Node configuration file.
//!
//! ```toml
//! [node]
//! listen_addr = "0.0.0.0:7200"
//! secret = "<64 hex chars>"
//!
//! [routes]
//! target_routes = 3
//!
//! [telemetry]
//! verbose = false
//! ```

use crate::network::route::{IdentityKeyPair, RouteConfig};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use umbra_wire::PeerAddr;

/// Main configuration for an Umbra node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub routes: RouteConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the hop transport binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Node identity secret (hex, 32 bytes)
    pub secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Debug-level logging unless RUST_LOG says otherwise
    #[serde(default)]
    pub verbose: bool,
}

fn default_listen_addr() -> String {
    "0.0.0.0:7200".to_string()
}

impl Config {
    /// Create a config around a node identity
    pub fn new(identity: &IdentityKeyPair) -> Self {
        Self {
            node: NodeConfig {
                listen_addr: default_listen_addr(),
                secret: hex::encode(&*identity.secret_bytes()),
            },
            routes: RouteConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Load config from a file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        // The file holds the node secret
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms)
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }

        Ok(())
    }

    /// Check if config file exists
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Decode the node identity
    pub fn identity(&self) -> Result<IdentityKeyPair> {
        let bytes = hex::decode(self.node.secret.trim()).context("Node secret is not valid hex")?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| {
                anyhow!("Node secret must be 32 bytes, got {}", bytes.len())
            })?;
        Ok(IdentityKeyPair::from_secret_bytes(secret))
    }

    /// Parse the listen address
    pub fn listen_addr(&self) -> Result<PeerAddr> {
        self.node
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address {}", self.node.listen_addr))
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.identity()?;
        self.listen_addr()?;
        self.routes.validate().context("Invalid [routes] section")?;
        Ok(())
    }
}

/// Get the default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".umbra")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::tempdir;

    fn identity() -> IdentityKeyPair {
        IdentityKeyPair::generate(&mut ChaCha8Rng::seed_from_u64(5))
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::new(&identity());
        config.save(&path).unwrap();
        assert!(Config::exists(&path));

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.identity().unwrap().node_key(), identity().node_key());
        assert_eq!(loaded.routes, RouteConfig::default());
        loaded.validate().unwrap();
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let toml = format!("[node]\nsecret = \"{}\"\n", "11".repeat(32));
        let config: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.node.listen_addr, "0.0.0.0:7200");
        assert_eq!(config.routes.target_routes, 3);
        assert!(!config.telemetry.verbose);
        config.validate().unwrap();
    }

    #[test]
    fn test_bad_secret_rejected() {
        let mut config = Config::new(&identity());
        config.node.secret = "abcd".to_string();
        assert!(config.identity().is_err());

        config.node.secret = "zz".repeat(32);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_routes_rejected() {
        let mut config = Config::new(&identity());
        config.routes.min_relays = 5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[routes]"));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_config_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::new(&identity()).save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
