//! Deploy executor backed by the `stellar` CLI.
//!
//! Source items are built with `stellar contract build` and then published
//! with `stellar contract deploy`; artifact items skip straight to publish.
//! Tool failures are folded into structured [`DeployFailure`]s with a
//! category and remediation hints, never into process-level errors, so one
//! broken contract cannot abort the rest of the batch.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lodestar_core::{
    BatchDeploymentItem, DeployContext, DeployExecutor, DeployFailure, DeployOutcome, DeployTarget,
};

/// Where to look for the built WASM relative to a contract source directory.
const WASM_RELEASE_DIR: &str = "target/wasm32-unknown-unknown/release";

/// Deploys contracts by shelling out to the `stellar` CLI.
pub struct SorobanDeployExecutor {
    binary: String,
    timeout_secs: u64,
}

impl SorobanDeployExecutor {
    pub fn new() -> Self {
        Self {
            binary: "stellar".to_string(),
            timeout_secs: 600,
        }
    }

    /// Override the CLI binary name (e.g. `soroban` for older installs).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Per-subprocess timeout in seconds; 0 disables the timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    async fn build_contract(&self, item: &BatchDeploymentItem, dir: &Path) -> BuildStep {
        info!(item = %item.id, dir = %dir.display(), "building contract");
        let output = match run_command(&self.binary, &["contract", "build"], Some(dir), self.timeout_secs)
            .await
        {
            Ok(output) => output,
            Err(e) => return BuildStep::Failed(environment_failure(e)),
        };
        if !output.success {
            return BuildStep::Failed(stage_failure("build", &output));
        }
        match built_wasm_path(dir) {
            Ok(wasm) => BuildStep::Built(wasm),
            Err(e) => BuildStep::Failed(
                DeployFailure::from_message(format!("{e:#}")).with_category("build"),
            ),
        }
    }

    async fn publish_contract(
        &self,
        item: &BatchDeploymentItem,
        wasm: &Path,
        ctx: &DeployContext,
    ) -> Result<DeployOutcome> {
        info!(item = %item.id, wasm = %wasm.display(), network = %ctx.network, "publishing contract");
        let wasm_arg = wasm.display().to_string();
        let mut args = vec![
            "contract",
            "deploy",
            "--wasm",
            &wasm_arg,
            "--source-account",
            &ctx.source_account,
            "--network",
            &ctx.network,
        ];
        if let Some(rpc_url) = &ctx.rpc_url {
            args.push("--rpc-url");
            args.push(rpc_url);
        }

        let output = match run_command(&self.binary, &args, None, self.timeout_secs).await {
            Ok(output) => output,
            Err(e) => return Ok(DeployOutcome::Failure(environment_failure(e))),
        };
        if !output.success {
            return Ok(DeployOutcome::Failure(stage_failure("publish", &output)));
        }

        match parse_contract_id(&output.stdout) {
            Some(contract_id) => Ok(DeployOutcome::Success {
                contract_id,
                tx_hash: parse_tx_hash(&output.stderr).or_else(|| parse_tx_hash(&output.stdout)),
            }),
            None => Ok(DeployOutcome::Failure(DeployFailure {
                message: "deploy succeeded but no contract id found in output".to_string(),
                summary: None,
                category: Some("publish".to_string()),
                suggestions: vec!["check the stellar CLI version".to_string()],
                raw_output: Some(output.combined()),
            })),
        }
    }
}

impl Default for SorobanDeployExecutor {
    fn default() -> Self {
        Self::new()
    }
}

enum BuildStep {
    Built(PathBuf),
    Failed(DeployFailure),
}

#[async_trait]
impl DeployExecutor for SorobanDeployExecutor {
    async fn deploy(
        &self,
        item: &BatchDeploymentItem,
        target: &DeployTarget,
        ctx: &DeployContext,
        cancel: CancellationToken,
    ) -> Result<DeployOutcome> {
        let wasm = match target {
            DeployTarget::Source { dir } => match self.build_contract(item, dir).await {
                BuildStep::Built(wasm) => wasm,
                BuildStep::Failed(failure) => return Ok(DeployOutcome::Failure(failure)),
            },
            DeployTarget::Artifact { wasm } => {
                if !wasm.is_file() {
                    return Ok(DeployOutcome::Failure(
                        DeployFailure::from_message(format!(
                            "wasm artifact not found: {}",
                            wasm.display()
                        ))
                        .with_category("artifact"),
                    ));
                }
                wasm.clone()
            }
        };

        // A build can be lengthy; re-check before committing a transaction.
        if cancel.is_cancelled() {
            debug!(item = %item.id, "cancelled between build and publish");
            return Ok(DeployOutcome::Failure(
                DeployFailure::from_message("cancelled before publish").with_category("cancelled"),
            ));
        }

        self.publish_contract(item, &wasm, ctx).await
    }
}

#[derive(Debug)]
struct CommandOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
    success: bool,
}

impl CommandOutput {
    fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

async fn run_command(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout_secs: u64,
) -> Result<CommandOutput> {
    let mut command = Command::new(program);
    command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let child = command
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    let output = if timeout_secs > 0 {
        tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("{program} timed out after {timeout_secs} seconds"))??
    } else {
        child.wait_with_output().await?
    };

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    })
}

/// Locate the WASM produced by `stellar contract build` under `dir`.
///
/// The build writes into the contract's own target directory; a single
/// contract crate produces a single artifact, so ties are broken by name
/// for determinism.
fn built_wasm_path(dir: &Path) -> Result<PathBuf> {
    let release = dir.join(WASM_RELEASE_DIR);
    let mut wasms: Vec<PathBuf> = fs::read_dir(&release)
        .with_context(|| format!("no build output at {}", release.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|ext| ext == "wasm").unwrap_or(false))
        .collect();
    wasms.sort();
    wasms
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no .wasm artifact in {}", release.display()))
}

/// Extract the contract id from deploy output: a 56-character `C...`
/// strkey, conventionally the last line of stdout.
fn parse_contract_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| {
            line.len() == 56
                && line.starts_with('C')
                && line.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_string)
}

/// Extract a transaction hash from diagnostic output. The CLI reports it on
/// stderr as `Transaction hash is <hex>`.
fn parse_tx_hash(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Transaction hash is ")?;
        let hash = rest.trim().trim_end_matches('.');
        (hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit())).then(|| hash.to_string())
    })
}

fn environment_failure(error: anyhow::Error) -> DeployFailure {
    let message = format!("{error:#}");
    let mut suggestions = Vec::new();
    if message.contains("failed to spawn") {
        suggestions.push("install the stellar CLI: cargo install --locked stellar-cli".to_string());
    }
    let category = if message.contains("timed out") {
        "timeout"
    } else {
        "environment"
    };
    DeployFailure {
        message,
        summary: None,
        category: Some(category.to_string()),
        suggestions,
        raw_output: None,
    }
}

/// Turn a failed subprocess into a categorized failure with remediation
/// hints keyed off well-known stellar CLI error strings.
fn stage_failure(stage: &str, output: &CommandOutput) -> DeployFailure {
    let summary = output
        .stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string);

    let lowered = output.stderr.to_lowercase();
    let mut suggestions = Vec::new();
    if lowered.contains("account not found") {
        suggestions.push("fund the source account (friendbot on testnet)".to_string());
    }
    if lowered.contains("wasm32-unknown-unknown") || lowered.contains("can't find crate") {
        suggestions.push("rustup target add wasm32-unknown-unknown".to_string());
    }
    if lowered.contains("connection") || lowered.contains("dns") || lowered.contains("unreachable")
    {
        suggestions.push("check the network name and RPC URL".to_string());
    }

    DeployFailure {
        message: format!("{stage} failed with exit code {}", output.exit_code),
        summary,
        category: Some(stage.to_string()),
        suggestions,
        raw_output: Some(output.combined()),
    }
}
