//! Agents command - List the agents offered by the chat service.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use parley_chat::{HttpServiceClient, ServiceClient};

use super::GlobalArgs;

#[derive(Args)]
pub struct AgentsArgs {
    /// Print the roster as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: AgentsArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.load_config()?;
    let client = HttpServiceClient::new(&config.client)?;

    info!("Fetching agents from {}", client.base_url());
    let list = client
        .list_agents()
        .await
        .context("Failed to fetch the agent list")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    println!("🤖 Agents at {}:", client.base_url());
    for agent in &list.agents {
        let willingness = agent
            .speaking_willingness
            .map(|w| format!(" (willingness {})", w))
            .unwrap_or_default();
        println!("   {:<12} {}{}", agent.id, agent.name, willingness);
        if !agent.description.is_empty() {
            println!("   {:<12} {}", "", agent.description);
        }
    }
    println!();
    match &list.dispatcher {
        Some(dispatcher) => println!("🧭 Dispatcher: {} ({})", dispatcher.name, dispatcher.id),
        None => println!("🧭 Dispatcher: none (automatic mode uses a placeholder)"),
    }
    if let Some(detector) = &list.character_dispatcher {
        println!("🎭 Next speaker detection: {} ({})", detector.name, detector.id);
    }

    Ok(())
}
