//! CLI command definitions.
//!
//! Every subcommand talks to the same chat service; the connection settings
//! live in `GlobalArgs` so they can be given before or after the subcommand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use parley_chat::{HttpServiceClient, ParleyConfig, TurnOrchestrator};

pub mod agents;
pub mod chat;
pub mod send;

/// Parley - talk to a room full of agents
#[derive(Parser)]
#[command(name = "parley")]
#[command(version, about = "Parley - talk to a room full of agents")]
#[command(long_about = r#"
Parley is a terminal front end for a multi-agent chat service. Pick an agent
yourself, or let the dispatcher route every message to the agent best suited
to answer it. Agents may hand the floor to each other without waiting for you.

COMMANDS:
  agents  → List the agents the service offers
  chat    → Interactive conversation
  send    → Send one message and print the resulting exchange

CONFIGURATION:
  --config / PARLEY_CONFIG      TOML file with [client] and [orchestrator]
  --url    / PARLEY_BASE_URL    Service address (overrides the file)
  RUST_LOG                      Log filter, logs are written to stderr

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Chat service unreachable
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Base URL of the chat service
    #[arg(long, global = true, env = "PARLEY_BASE_URL")]
    pub url: Option<String>,

    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    /// Configuration file (if any) with the URL override applied
    pub fn load_config(&self) -> Result<ParleyConfig> {
        let config = ParleyConfig::load_or_default(self.config.as_deref())
            .context("Failed to load configuration")?;
        Ok(config.with_base_url(self.url.clone()))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the agents offered by the chat service
    Agents(agents::AgentsArgs),

    /// Start an interactive conversation
    Chat(chat::ChatArgs),

    /// Send a single message and print the exchange
    Send(send::SendArgs),
}

/// Build an orchestrator over HTTP for `config`
pub fn connect(config: &ParleyConfig) -> Result<TurnOrchestrator<HttpServiceClient>> {
    let client = HttpServiceClient::new(&config.client)?;
    info!("Connecting to chat service at {}", client.base_url());
    Ok(TurnOrchestrator::new(client, config.orchestrator.clone()))
}
