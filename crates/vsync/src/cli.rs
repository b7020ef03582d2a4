//! CLI command definitions and handlers

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use vsync::path::DEFAULT_MOUNT;
use vsync::walker::DEFAULT_CONCURRENCY;
use vsync::{
    replicate, FailurePolicy, FileConfig, Mount, Namespace, PolicyMode, ReplicateConfig,
    ReplicationOutcome, ReplicationPlan, VaultConfig, WalkOptions,
};

/// Version plus the commit set by build.rs
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ngit commit hash ",
    env!("VSYNC_GIT_COMMIT")
);

/// vsync - Vault secrets replicator
#[derive(Parser)]
#[command(name = "vsync")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Replicate secrets between two Vault instances")]
#[command(long_about = "Replicate secrets between two Vault instances.\n\n\
    Walks every secret under a path in a source Vault KV v2 mount and\n\
    writes it to the same path in a destination Vault. Useful for keeping\n\
    a disaster-recovery Vault in step with the primary.")]
#[command(after_help = "EXAMPLES:\n\
    vsync kv -s https://vault-a:8200 -d https://vault-b:8200 -p apps/\n\
    SRC_VAULT_TOKEN=... DEST_VAULT_TOKEN=... vsync kv -s $A -d $B\n\
    vsync kv -s $A -d $B --src-mount secret --dest-mount dr-secret\n\
    vsync kv -s $A -d $B -p apps/ --dry-run --json")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replicate KV secrets from one Vault to another
    #[command(about = "Replicate all KV v2 secrets under a path from a source Vault to a destination Vault")]
    Kv(KvArgs),
}

#[derive(Args, Debug)]
pub struct KvArgs {
    /// Source Vault address (required)
    #[arg(short = 's', long)]
    pub src_vault: Option<String>,

    /// Destination Vault address (required)
    #[arg(short = 'd', long)]
    pub dest_vault: Option<String>,

    /// Source Vault token
    #[arg(long, env = "SRC_VAULT_TOKEN", hide_env_values = true)]
    pub src_token: Option<String>,

    /// Destination Vault token
    #[arg(long, env = "DEST_VAULT_TOKEN", hide_env_values = true)]
    pub dest_token: Option<String>,

    /// Secret path to replicate (default: the whole mount)
    #[arg(short = 'p', long)]
    pub path: Option<String>,

    /// KV v2 mount on the source [default: secret]
    #[arg(long)]
    pub src_mount: Option<String>,

    /// KV v2 mount on the destination [default: secret]
    #[arg(long)]
    pub dest_mount: Option<String>,

    /// Vault Enterprise namespace on the source
    #[arg(long)]
    pub src_namespace: Option<String>,

    /// Vault Enterprise namespace on the destination
    #[arg(long)]
    pub dest_namespace: Option<String>,

    /// Maximum concurrent requests per Vault [default: 4]
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub concurrency: Option<u64>,

    /// What to do when a secret cannot be read or written [default: best-effort]
    #[arg(long, value_enum)]
    pub on_error: Option<PolicyMode>,

    /// What to do when a path cannot be listed [default: fail-fast]
    #[arg(long, value_enum)]
    pub on_list_error: Option<PolicyMode>,

    /// Read everything but write nothing
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Abort if the run takes longer than this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output the summary as JSON
    #[arg(long, default_value = "false")]
    pub json: bool,

    /// Config file (default: ~/.config/vsync/config.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Merge flags, environment and config file into one run configuration
pub fn build_config(args: &KvArgs, file: &FileConfig) -> Result<ReplicateConfig> {
    let (src_token, dest_token) = match (non_empty(args.src_token.as_ref()), non_empty(args.dest_token.as_ref())) {
        (Some(src), Some(dest)) => (src, dest),
        _ => bail!("Vault tokens are required but not provided (use --src-token/--dest-token or SRC_VAULT_TOKEN/DEST_VAULT_TOKEN)"),
    };

    let Some(src_addr) = non_empty(args.src_vault.as_ref()).or_else(|| file.source.addr.clone()) else {
        bail!("Source Vault address is required (--src-vault)");
    };
    let Some(dest_addr) = non_empty(args.dest_vault.as_ref()).or_else(|| file.destination.addr.clone()) else {
        bail!("Destination Vault address is required (--dest-vault)");
    };

    let retry = file.retry_config();
    let request_timeout = file.request_timeout_secs.map(Duration::from_secs);

    let mut source = VaultConfig::new(&src_addr, &src_token);
    source.namespace = args.src_namespace.clone().or_else(|| file.source.namespace.clone());
    source.ca_cert = file.source.ca_cert.clone();
    source.tls_skip_verify = file.source.tls_skip_verify.unwrap_or(false);
    source.retry = retry.clone();

    let mut destination = VaultConfig::new(&dest_addr, &dest_token);
    destination.namespace = args.dest_namespace.clone().or_else(|| file.destination.namespace.clone());
    destination.ca_cert = file.destination.ca_cert.clone();
    destination.tls_skip_verify = file.destination.tls_skip_verify.unwrap_or(false);
    destination.retry = retry;

    if let Some(timeout) = request_timeout {
        source.request_timeout = timeout;
        destination.request_timeout = timeout;
    }

    let src_mount = args
        .src_mount
        .clone()
        .or_else(|| file.source.mount.clone())
        .unwrap_or_else(|| DEFAULT_MOUNT.to_string());
    let dest_mount = args
        .dest_mount
        .clone()
        .or_else(|| file.destination.mount.clone())
        .unwrap_or_else(|| DEFAULT_MOUNT.to_string());

    let defaults = FailurePolicy::default();
    let policy = FailurePolicy {
        leaf: args.on_error.or(file.on_error).unwrap_or(defaults.leaf),
        listing: args.on_list_error.or(file.on_list_error).unwrap_or(defaults.listing),
    };

    let concurrency = args
        .concurrency
        .map(|n| n as usize)
        .or(file.concurrency)
        .unwrap_or(DEFAULT_CONCURRENCY);

    let plan = ReplicationPlan {
        source: Namespace::new(
            Mount::new(&src_mount).with_context(|| format!("Invalid source mount {:?}", src_mount))?,
        ),
        destination: Namespace::new(
            Mount::new(&dest_mount).with_context(|| format!("Invalid destination mount {:?}", dest_mount))?,
        ),
        base_path: args.path.clone().or_else(|| file.path.clone()).unwrap_or_default(),
        walk: WalkOptions {
            concurrency,
            policy,
            dry_run: args.dry_run,
        },
        timeout: args.timeout.or(file.timeout_secs).map(Duration::from_secs),
    };

    Ok(ReplicateConfig {
        source,
        destination,
        plan,
    })
}

/// Replicate KV secrets; returns whether the run was clean
pub async fn cmd_kv(args: KvArgs) -> Result<bool> {
    let file = match &args.config {
        Some(path) => FileConfig::load_from(path)?,
        None => FileConfig::load()?,
    };
    let config = build_config(&args, &file)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping replication");
            on_interrupt.cancel();
        }
    });

    let outcome = match replicate(&config, cancel).await {
        Ok(outcome) => outcome,
        Err(aborted) => {
            // Report what got done before the error, then fail
            if let Some(outcome) = &aborted.outcome {
                print!("{}", render_report(outcome, &config, args.json)?);
            }
            return Err(anyhow::Error::new(aborted).context("Error replicating KV secrets"));
        }
    };

    print!("{}", render_report(&outcome, &config, args.json)?);
    Ok(outcome.is_clean())
}

/// Summary text (or pretty JSON) for a finished or aborted run
fn render_report(outcome: &ReplicationOutcome, config: &ReplicateConfig, json: bool) -> Result<String> {
    if json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(outcome)?));
    }

    let mut report = outcome.summary();
    if outcome.is_clean() && !outcome.dry_run {
        report.push_str(&format!(
            "Successfully replicated KV secrets from {} to {} under path {}\n",
            config.source.addr,
            config.destination.addr,
            if config.plan.base_path.is_empty() { "/" } else { config.plan.base_path.as_str() }
        ));
    }
    Ok(report)
}
