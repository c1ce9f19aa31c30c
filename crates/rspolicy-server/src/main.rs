//! rspolicy server binary
//!
//! Runs the policy service on an in-memory journal.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! rspolicy --config config.yaml
//!
//! # Seed policies from JSON files, one policy per file
//! rspolicy --policy policies/p1.json --policy policies/p2.json
//!
//! # With environment variables only
//! RSPOLICY_LOGGING__LEVEL=debug rspolicy
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rspolicy_domain::cache::register_cache_metrics;
use rspolicy_domain::{CommandResult, Policy, PolicyCommand};
use rspolicy_server::enforcement::register_enforcement_metrics;
use rspolicy_server::observability::init_logging;
use rspolicy_server::{PolicyService, ServerConfig};
use rspolicy_storage::MemoryEventJournal;
use tokio::signal;
use tracing::{error, info};

/// rspolicy - event-sourced policy service with cached enforcers
#[derive(Parser, Debug)]
#[command(name = "rspolicy")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Policy JSON file to create at startup (repeatable)
    #[arg(short, long = "policy")]
    policies: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(&config.logging);
    register_cache_metrics();
    register_enforcement_metrics();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting rspolicy");

    let service = PolicyService::start(&config, MemoryEventJournal::new_shared());

    for path in &args.policies {
        seed_policy(&service, path).await?;
    }

    info!("rspolicy ready, press Ctrl-C to stop");
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    service.shutdown();
    Ok(())
}

/// Creates the policy stored in `path`.
async fn seed_policy(service: &PolicyService, path: &PathBuf) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy file {}", path.display()))?;
    let policy: Policy = serde_json::from_str(&json)
        .with_context(|| format!("invalid policy in {}", path.display()))?;
    let policy_id = policy.id().clone();

    match service.ask(PolicyCommand::CreatePolicy { policy }).await? {
        CommandResult::Error(e) => {
            Err(e).with_context(|| format!("failed to create policy {policy_id}"))
        }
        _ => {
            info!(policy_id = %policy_id, "Seeded policy");
            Ok(())
        }
    }
}
