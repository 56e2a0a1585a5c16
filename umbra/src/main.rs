// Copyright (c) 2024 Botho Foundation

use anyhow::Result;
use clap::{Parser, Subcommand};

use umbra::{commands, config, telemetry};

#[derive(Parser)]
#[command(name = "umbra")]
#[command(about = "Overlay node with multi-hop cipher routes", long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.umbra/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a node identity and write a default config
    Init {
        /// Address the hop transport binds to
        #[arg(long)]
        listen: Option<String>,
    },

    /// Show the node key
    Identity,

    /// Validate the config file
    CheckConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    telemetry::init_tracing(telemetry::verbose_from(cli.verbose, &config_path))?;

    match cli.command {
        Commands::Init { listen } => commands::init::run(&config_path, listen.as_deref()),
        Commands::Identity => commands::identity::run(&config_path),
        Commands::CheckConfig => commands::check_config::run(&config_path),
    }
}
