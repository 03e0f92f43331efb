//! Send command - Run a single exchange and print it.

use anyhow::{Context, Result};
use clap::Args;

use parley_chat::{EventSink, ExchangeOutcome, Mode};

use super::GlobalArgs;
use crate::render::TerminalRenderer;

#[derive(Args)]
pub struct SendArgs {
    /// Message to send
    message: String,

    /// Let the dispatcher pick the agent
    #[arg(long, conflicts_with = "agent")]
    auto: bool,

    /// Agent to address (defaults to the first agent in the roster)
    #[arg(short, long)]
    agent: Option<String>,

    /// Show dispatcher reasoning and debug traces
    #[arg(long)]
    trace: bool,

    /// Print the conversation log as JSON once the exchange is over
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: SendArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.load_config()?;
    let mut orch = super::connect(&config)?;

    let render_task = if args.json {
        None
    } else {
        let (sink, events) = EventSink::channel();
        orch = orch.with_events(sink);
        Some(TerminalRenderer::new(args.trace).echo_user(true).spawn(events))
    };

    let cancel = orch.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    orch.initialize().await.context("Failed to load the agent roster")?;
    if let Some(agent_id) = &args.agent {
        orch.select_agent(agent_id)?;
    }
    if args.auto {
        orch.set_mode(Mode::Automatic);
    }

    let outcome = orch.send_message(&args.message).await;

    let log = serde_json::to_string_pretty(orch.log().turns())?;
    drop(orch);
    if let Some(task) = render_task {
        task.await?;
    }
    if args.json {
        println!("{}", log);
    }

    match outcome {
        ExchangeOutcome::Completed { continuations, end } => {
            if continuations > 0 {
                eprintln!("✅ {} follow-up turn(s), chain ended: {:?}", continuations, end);
            }
            Ok(())
        }
        ExchangeOutcome::Ignored => anyhow::bail!("Message is empty"),
        ExchangeOutcome::NoAgentSelected => anyhow::bail!("No agent available to answer"),
        ExchangeOutcome::Failed { kind } => anyhow::bail!("Exchange failed ({})", kind),
    }
}
