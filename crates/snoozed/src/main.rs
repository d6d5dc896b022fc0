//! snoozed — the snooze daemon.
//!
//! Single binary that assembles the orchestrator:
//! - Gateway, PaaS and chat clients
//! - Wake context (state caches, control and poll queues)
//! - Scan loop, savings and candidate reports
//! - HTTP surface (waiting page, savings, health)
//!
//! # Usage
//!
//! ```text
//! snoozed serve --config /etc/snooze/snooze.toml --port 8080
//! snoozed candidates --config /etc/snooze/snooze.toml
//! snoozed savings --config /etc/snooze/snooze.toml
//! ```

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use snooze_core::SnoozeConfig;

#[derive(Parser)]
#[command(name = "snoozed", about = "Scale-to-zero orchestrator daemon")]
struct Cli {
    /// Path to snooze.toml. Every key can also come from SNOOZE_* variables.
    #[arg(long, global = true, env = "SNOOZE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP surface and the background loops.
    Serve {
        /// Port to listen on (overrides server.port).
        #[arg(long)]
        port: Option<u16>,

        /// Log suppressions instead of performing them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Announce and print idle routes that have not opted in.
    Candidates,
    /// Print the current savings report as JSON.
    Savings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,snoozed=debug,snooze=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = SnoozeConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { port, dry_run } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            config.scan.dry_run |= dry_run;
            config.validate()?;
            serve::run(config).await
        }
        Command::Candidates => {
            config.validate()?;
            let ctx = serve::build_context(&config)?;
            let candidates = snooze_autoscale::announce_candidates(
                &ctx,
                config.scan.lookback(),
                config.scan.excluded_signature.as_deref(),
            )
            .await?;
            for candidate in &candidates {
                println!("{}\t{}", candidate.route_id, candidate.name);
            }
            ctx.shutdown();
            Ok(())
        }
        Command::Savings => {
            config.validate()?;
            let ctx = serve::build_context(&config)?;
            let report = snooze_autoscale::compute_savings(&ctx).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            ctx.shutdown();
            Ok(())
        }
    }
}
