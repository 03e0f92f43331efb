//! Parley CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Chat service unreachable

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parley_chat::ChatError;

mod commands;
mod render;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const SERVICE_UNREACHABLE: u8 = 3;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the conversation
    let default_filter = if cli.global.verbose {
        "parley_chat=debug,parley_cli=debug,warn"
    } else {
        "parley_chat=info,parley_cli=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match cli.command {
        Commands::Agents(args) => commands::agents::execute(args, &cli.global).await,
        Commands::Chat(args) => commands::chat::execute(args, &cli.global).await,
        Commands::Send(args) => commands::send::execute(args, &cli.global).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    let chat_error = e.chain().find_map(|cause| cause.downcast_ref::<ChatError>());

    match chat_error {
        Some(ChatError::RosterUnavailable(_)) | Some(ChatError::ServiceUnreachable(_)) => {
            ExitCodes::SERVICE_UNREACHABLE
        }
        Some(ChatError::InvalidAgentSelection(_)) | Some(ChatError::Config(_)) => ExitCodes::INVALID_ARGS,
        _ => ExitCodes::GENERAL_ERROR,
    }
}
