//! Main Entrypoint for a Negotiation Agent
//!
//! This binary is responsible for:
//! 1. Loading configuration and parsing the role from the command line.
//! 2. Initializing logging and the oracle client.
//! 3. Researching the represented party before connecting.
//! 4. Running the agent's event loop against the relay.

use anyhow::Context;
use clap::Parser;
use dealtalk_agent::{config::AgentConfig, research, runtime::Agent};
use dealtalk_core::negotiation::Role;
use dealtalk_core::oracle::ChatOracle;
use dealtalk_core::prompts;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "agent",
    about = "One party in an AI-to-AI financial negotiation",
    group = clap::ArgGroup::new("party").required(true).args(["company", "investor"])
)]
struct Cli {
    /// Negotiate as this company (the proposing side)
    #[arg(long, value_name = "NAME")]
    company: Option<String>,

    /// Negotiate as this investor (the evaluating side)
    #[arg(long, value_name = "NAME")]
    investor: Option<String>,

    /// WebSocket URL of the relay
    #[arg(long, default_value = "ws://localhost:9000")]
    relay_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AgentConfig::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let (role, name) = match (cli.company, cli.investor) {
        (Some(name), None) => (Role::Company, name),
        (None, Some(name)) => (Role::Investor, name),
        _ => unreachable!("clap enforces exactly one role"),
    };

    let oracle = Arc::new(ChatOracle::for_provider(
        config.provider,
        &config.api_key,
        config.model.clone(),
    ));

    info!(
        role = %role,
        party = %name,
        provider = ?config.provider,
        model = %config.model,
        "Agent starting. Researching {name}..."
    );

    let search = research::BraveSearch::new(config.brave_api_key.clone())
        .context("Failed to build search client")?;
    let briefing = research::build_briefing(role, &name, &search, oracle.as_ref()).await;
    info!(briefing_chars = briefing.len(), "Research complete");

    let system_prompt = match role {
        Role::Company => prompts::company_system_prompt(&name, &briefing),
        Role::Investor => prompts::investor_system_prompt(&name, &briefing),
    };

    Agent::new(role, name, system_prompt, oracle)
        .run(&cli.relay_url)
        .await?;

    info!("Agent has shut down.");
    Ok(())
}
