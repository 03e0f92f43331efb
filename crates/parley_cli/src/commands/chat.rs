//! Chat command - Interactive conversation.
//!
//! Lines starting with `/` are commands, anything else is sent to the
//! current agent (manual mode) or to the dispatcher (automatic mode).

use std::sync::atomic::Ordering;

use anyhow::Result;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use parley_chat::{EventSink, HttpServiceClient, Mode, TurnOrchestrator};

use super::GlobalArgs;
use crate::render::TerminalRenderer;

#[derive(Args)]
pub struct ChatArgs {
    /// Start in automatic mode (the dispatcher picks agents)
    #[arg(long, conflicts_with = "agent")]
    auto: bool,

    /// Agent to talk to first
    #[arg(short, long)]
    agent: Option<String>,

    /// Show dispatcher reasoning and debug traces
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand<'a> {
    Say(&'a str),
    Auto,
    Manual,
    Agent(&'a str),
    Agents,
    Reset,
    Next,
    Trace,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_line(line: &str) -> ReplCommand<'_> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Say(line);
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match (name, arg) {
        ("auto", _) => ReplCommand::Auto,
        ("manual", _) => ReplCommand::Manual,
        ("agent", id) if !id.is_empty() => ReplCommand::Agent(id),
        ("agents", _) => ReplCommand::Agents,
        ("reset", _) => ReplCommand::Reset,
        ("next", _) => ReplCommand::Next,
        ("trace", _) => ReplCommand::Trace,
        ("help", _) | ("?", _) => ReplCommand::Help,
        ("quit", _) | ("exit", _) => ReplCommand::Quit,
        _ => ReplCommand::Unknown(line),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /auto          Let the dispatcher pick agents");
    println!("  /manual        Pick agents yourself");
    println!("  /agent <id>    Talk to a specific agent (manual mode)");
    println!("  /agents        Show the roster");
    println!("  /reset         Clear the conversation history");
    println!("  /next          Ask who should speak after the last agent");
    println!("  /trace         Show or hide dispatcher traces");
    println!("  /quit          Leave");
    println!("Ctrl-C stops agents that are still talking to each other.");
}

fn print_roster(orch: &TurnOrchestrator<HttpServiceClient>) {
    let session = orch.session();
    let current = session.current_agent().map(|a| a.id.as_str());
    for agent in session.roster() {
        let marker = if Some(agent.id.as_str()) == current { "▶" } else { " " };
        println!(" {} {:<12} {}", marker, agent.id, agent.name);
    }
    println!("   mode: {}", session.mode());
}

pub async fn execute(args: ChatArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.load_config()?;
    let (sink, events) = EventSink::channel();
    let renderer = TerminalRenderer::new(args.trace);
    let show_trace = renderer.trace_toggle();
    let render_task = renderer.spawn(events);

    let mut orch = super::connect(&config)?.with_events(sink);

    let cancel = orch.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
            println!("⏹  Pending turns cancelled. Type /quit to leave.");
        }
    });

    println!("🗨️  Parley - type /help for commands");
    if let Err(e) = orch.initialize().await {
        // Already shown as a system turn; /agents retries
        warn!("Starting without a roster: {}", e);
    }
    if let Some(agent_id) = &args.agent {
        if let Err(e) = orch.select_agent(agent_id) {
            debug!("Initial agent not selected: {}", e);
        }
    }
    if args.auto {
        orch.set_mode(Mode::Automatic);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            ReplCommand::Say(text) => {
                orch.send_message(text).await;
            }
            ReplCommand::Auto => orch.set_mode(Mode::Automatic),
            ReplCommand::Manual => orch.set_mode(Mode::Manual),
            ReplCommand::Agent(id) => {
                if orch.session().mode() == Mode::Automatic {
                    orch.set_mode(Mode::Manual);
                }
                if let Err(e) = orch.select_agent(id) {
                    debug!("Agent selection rejected: {}", e);
                }
            }
            ReplCommand::Agents => {
                if !orch.session().is_initialized() && orch.initialize().await.is_err() {
                    continue;
                }
                print_roster(&orch);
            }
            ReplCommand::Reset => {
                if let Err(e) = orch.reset().await {
                    debug!("Reset failed: {}", e);
                }
            }
            ReplCommand::Next => match orch.probe_next_speaker().await {
                Ok(verdict) => {
                    let target = verdict
                        .next_speaker
                        .as_ref()
                        .and_then(|next| next.continuation_target())
                        .unwrap_or("the user");
                    println!("🎭 Next speaker: {}", target);
                }
                Err(e) => debug!("Next speaker probe failed: {}", e),
            },
            ReplCommand::Trace => {
                let enabled = !show_trace.load(Ordering::Relaxed);
                show_trace.store(enabled, Ordering::Relaxed);
                println!("🔍 Traces {}", if enabled { "on" } else { "off" });
            }
            ReplCommand::Help => print_help(),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(input) => println!("Unknown command: {} (try /help)", input),
        }
    }

    drop(orch);
    render_task.await?;
    println!("👋 Bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(parse_line("  hello there "), ReplCommand::Say("hello there"));
        assert_eq!(parse_line(""), ReplCommand::Say(""));
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse_line("/auto"), ReplCommand::Auto);
        assert_eq!(parse_line("/agent  a2 "), ReplCommand::Agent("a2"));
        assert_eq!(parse_line("/exit"), ReplCommand::Quit);
        assert_eq!(parse_line("/next"), ReplCommand::Next);
    }

    #[test]
    fn test_agent_without_id_is_unknown() {
        assert_eq!(parse_line("/agent"), ReplCommand::Unknown("/agent"));
        assert_eq!(parse_line("/dance"), ReplCommand::Unknown("/dance"));
    }
}
