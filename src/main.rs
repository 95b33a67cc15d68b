//! Command-line maintenance tool for stored wireless channels.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use wireless::{init_logging, Config, HostError, Location, Wireless, WorldAdapter};

/// Inspect and maintain stored wireless channels
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List channels with their owners and endpoint counts
    List,
    /// Show every endpoint of one channel
    Show {
        /// Channel name, case-insensitive
        channel: String,
    },
    /// Remove endpoints whose world is not in the given list
    Purge {
        /// Worlds that still exist
        #[arg(long = "world", required = true)]
        worlds: Vec<String>,
    },
}

/// Stand-in host for offline maintenance: knows a fixed set of worlds and
/// cannot drive blocks.
struct OfflineWorld {
    worlds: Option<Vec<String>>,
}

impl WorldAdapter for OfflineWorld {
    fn world_exists(&self, world: &str) -> bool {
        self.worlds
            .as_ref()
            .is_none_or(|known| known.iter().any(|w| w.eq_ignore_ascii_case(world)))
    }

    fn apply_output(&self, location: &Location, _level: bool) -> Result<(), HostError> {
        Err(HostError::WorldUnloaded(location.world.clone()))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    init_logging(args.verbose || config.debug);

    let worlds = match &args.command {
        Command::Purge { worlds } => Some(worlds.clone()),
        Command::List | Command::Show { .. } => None,
    };
    let wireless = Wireless::from_config(&config, Arc::new(OfflineWorld { worlds }))
        .context("opening channel storage")?;

    match args.command {
        Command::List => {
            for channel in wireless.channels() {
                println!(
                    "{}\towners: {}\tendpoints: {}",
                    channel.name,
                    channel.owners.join(", "),
                    channel.endpoints.len()
                );
            }
        }
        Command::Show { channel } => {
            let found = wireless
                .registry()
                .channel(&channel)
                .with_context(|| format!("channel `{channel}` does not exist"))?;
            println!("{} (owners: {})", found.name, found.owners.join(", "));
            for endpoint in &found.endpoints {
                let delay = endpoint
                    .role
                    .delay()
                    .map(|d| format!(" delay={d}"))
                    .unwrap_or_default();
                println!(
                    "  {}\t{}{delay}\tfacing {:?}\tby {}",
                    endpoint.location, endpoint.role.kind(), endpoint.facing, endpoint.owner
                );
            }
        }
        Command::Purge { .. } => {
            let removed = wireless.purge_invalid_endpoints();
            info!("removed {removed} endpoints");
            println!("removed {removed} endpoints");
        }
    }

    wireless.close().context("closing channel storage")?;
    Ok(())
}
