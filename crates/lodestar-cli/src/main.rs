//! Lodestar - Soroban batch deployment CLI
//!
//! The `lodestar` command deploys batches of Soroban contracts described by
//! a JSON manifest, in dependency order, sequentially or in parallel.
//!
//! ## Commands
//!
//! - `deploy`: Run a deployment batch against a network
//! - `validate`: Check a manifest's dependency graph without deploying

mod manifest;
mod soroban;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use lodestar_core::{
    BatchDeploymentResult, BatchMode, BatchRunner, DeployContext, ItemStatus,
};

use crate::manifest::BatchManifest;
use crate::soroban::SorobanDeployExecutor;

#[derive(Parser)]
#[command(name = "lodestar")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch deployment scheduler for Soroban smart contracts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a deployment batch from a manifest
    Deploy {
        /// Path to the batch manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Target network (overrides the manifest)
        #[arg(short, long, env = "STELLAR_NETWORK")]
        network: Option<String>,

        /// Source account that signs and funds deployments
        #[arg(short, long, env = "STELLAR_ACCOUNT")]
        source_account: Option<String>,

        /// RPC endpoint override
        #[arg(long, env = "STELLAR_RPC_URL")]
        rpc_url: Option<String>,

        /// Execution mode (overrides the manifest)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Concurrency cap for parallel mode (overrides the manifest)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Per-subprocess timeout in seconds (0 disables)
        #[arg(long, default_value = "600")]
        timeout_secs: u64,

        /// Write the full batch result as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a manifest's dependency graph and print the deploy order
    Validate {
        /// Path to the batch manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Sequential,
    Parallel,
}

impl From<ModeArg> for BatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => BatchMode::Sequential,
            ModeArg::Parallel => BatchMode::Parallel,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    lodestar_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Deploy {
            manifest,
            network,
            source_account,
            rpc_url,
            mode,
            concurrency,
            timeout_secs,
            output,
        } => {
            cmd_deploy(
                &manifest,
                network,
                source_account,
                rpc_url,
                mode.map(Into::into),
                concurrency,
                timeout_secs,
                output.as_deref(),
            )
            .await
        }
        Commands::Validate { manifest } => cmd_validate(&manifest),
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_deploy(
    manifest_path: &std::path::Path,
    network: Option<String>,
    source_account: Option<String>,
    rpc_url: Option<String>,
    mode: Option<BatchMode>,
    concurrency: Option<usize>,
    timeout_secs: u64,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let manifest = BatchManifest::load(manifest_path)?;

    let Some(network) = network.or_else(|| manifest.network.clone()) else {
        bail!("no network given: set --network or the manifest's `network` field");
    };
    let Some(source_account) = source_account.or_else(|| manifest.source_account.clone()) else {
        bail!("no source account given: set --source-account or the manifest's `source_account` field");
    };
    let mut context = DeployContext::new(network, source_account);
    context.rpc_url = rpc_url.or_else(|| manifest.rpc_url.clone());

    let request = manifest.into_request(mode, concurrency);
    if request.items.is_empty() {
        warn!("manifest contains no items; nothing to deploy");
    }

    let executor = Arc::new(SorobanDeployExecutor::new().with_timeout(timeout_secs));
    let runner = BatchRunner::new(executor, context);

    // Ctrl-C requests cooperative cancellation: in-flight items finish,
    // queued items are finalized as cancelled.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling queued deployments");
            signal_cancel.cancel();
        }
    });

    let result = runner.run(request, cancel).await?;

    print_summary(&result);
    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "wrote batch result");
    }

    if !result.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_validate(manifest_path: &std::path::Path) -> Result<()> {
    let manifest = BatchManifest::load(manifest_path)?;
    let graph = lodestar_core::DependencyGraph::build(&manifest.items)?;

    println!("manifest ok: {} item(s)", manifest.items.len());
    for (position, id) in graph.topological_order().iter().enumerate() {
        let deps = graph.dependencies_of(id);
        if deps.is_empty() {
            println!("  {}. {}", position + 1, id);
        } else {
            println!("  {}. {} (after {})", position + 1, id, deps.join(", "));
        }
    }
    Ok(())
}

fn print_summary(result: &BatchDeploymentResult) {
    println!("\nbatch {} ({:?})", result.batch_id, result.mode);
    for item in &result.results {
        match item.status {
            ItemStatus::Succeeded => {
                let contract = item.contract_id.as_deref().unwrap_or("-");
                println!("  ok      {:<20} {}", item.id, contract);
            }
            ItemStatus::Failed => {
                let reason = item
                    .error
                    .as_ref()
                    .map(|e| e.summary.clone().unwrap_or_else(|| e.message.clone()))
                    .unwrap_or_default();
                println!("  FAILED  {:<20} {}", item.id, reason);
                if let Some(error) = &item.error {
                    for suggestion in &error.suggestions {
                        println!("          hint: {suggestion}");
                    }
                }
            }
            ItemStatus::Skipped => {
                let reason = item
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_default();
                println!("  skipped {:<20} {}", item.id, reason);
            }
            ItemStatus::Cancelled => println!("  cancel  {:<20}", item.id),
            ItemStatus::Queued | ItemStatus::Running => {
                // Unreachable in a finished batch; printed for completeness.
                println!("  ?       {:<20}", item.id);
            }
        }
    }
    println!(
        "{} succeeded, {} failed, {} skipped{}",
        result.succeeded_count(),
        result.failed_count(),
        result.skipped_count(),
        if result.cancelled { ", cancelled" } else { "" }
    );
}
