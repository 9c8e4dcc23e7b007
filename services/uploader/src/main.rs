//! Rotating Uploader
//!
//! Uploads a directory tree to Google Drive with rclone, rotating through a
//! pool of service-account credentials:
//! 1. Discovers credential files in the accounts directory
//! 2. Walks the input directory
//! 3. Uploads each file, switching credentials when one hits its quota
//! 4. Exits with a code describing the worst outcome

mod batch;
mod config;
mod error;
mod metrics;
mod tool;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rotation::{CredentialPool, Scheduler, SelectionPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transfer::{RcloneOptions, RcloneTransfer};

use credentials::Credential;

use crate::config::{AccountsConfig, Config, Selection};

/// Exit code for invalid configuration (EX_CONFIG).
const EXIT_CONFIG: u8 = 78;
/// Exit code when rclone cannot be found (EX_UNAVAILABLE).
const EXIT_UNAVAILABLE: u8 = 69;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Upload a directory to Google Drive, rotating service accounts on quota exhaustion.
#[derive(Debug, Parser)]
#[command(name = "rotating-uploader", version, about)]
struct Cli {
    /// Local directory to upload
    input_dir: PathBuf,

    /// Destination folder id (or shared drive id starting with "0A")
    folder_id: String,

    /// Config file (default: $UPLOADER_CONFIG, then ./rotating-uploader.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding service-account credential files
    #[arg(long)]
    accounts_dir: Option<PathBuf>,

    /// rclone --drive-chunk-size value
    #[arg(long)]
    chunk_size: Option<String>,

    /// Path to the rclone executable
    #[arg(long)]
    rclone: Option<PathBuf>,

    /// Credential selection policy
    #[arg(long, value_enum)]
    selection: Option<Selection>,

    /// Seed for the shuffled selection policy
    #[arg(long)]
    seed: Option<u64>,

    /// Attempts per credential on transient failures
    #[arg(long)]
    max_transient_retries: Option<u32>,

    /// Overall deadline in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write Prometheus metrics to this file when the run ends
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Cli {
    /// Layer command-line overrides onto the loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.accounts_dir {
            config.accounts.dir = dir.clone();
        }
        if let Some(chunk) = &self.chunk_size {
            config.rclone.chunk_size = chunk.clone();
        }
        if let Some(binary) = &self.rclone {
            config.rclone.binary = Some(binary.clone());
        }
        if let Some(selection) = self.selection {
            config.rotation.selection = selection;
        }
        if let Some(seed) = self.seed {
            config.rotation.seed = Some(seed);
        }
        if let Some(retries) = self.max_transient_retries {
            config.rotation.max_transient_retries = retries;
        }
        if let Some(secs) = self.timeout_secs {
            config.run.timeout_secs = Some(secs);
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let run_id = format!("run_{}", uuid::Uuid::new_v4().as_simple());
    let span = tracing::info_span!("upload", run_id = %run_id);
    run(cli).instrument(span).await
}

async fn run(cli: Cli) -> Result<ExitCode> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting rotating-uploader");

    let prometheus = metrics::install_recorder().context("installing metrics recorder")?;

    let config_path = Config::resolve_path(cli.config.as_deref());
    let mut config = match Config::load_or_default(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(path = ?config_path, error = %e, "invalid configuration");
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        error!(error = %e, "invalid command-line override");
        return Ok(ExitCode::from(EXIT_CONFIG));
    }
    if cli.folder_id.trim().is_empty() {
        error!("folder id must not be empty");
        return Ok(ExitCode::from(EXIT_CONFIG));
    }
    info!(path = ?config_path, "configuration loaded");

    let files = match batch::collect_files(&cli.input_dir) {
        Ok(files) => files,
        Err(e) => {
            error!(error = %e, "cannot read input");
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };
    if files.is_empty() {
        warn!(input = %cli.input_dir.display(), "input directory is empty, nothing to upload");
        return Ok(ExitCode::SUCCESS);
    }

    let found = match load_credentials(&config.accounts).await {
        Ok(found) => found,
        Err(e) => {
            error!(error = %e, "credential discovery failed");
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };

    let policy = config.rotation.selection_policy();
    if let SelectionPolicy::Shuffled { seed } = policy {
        info!(seed, "shuffling credential order");
    }
    let mut pool = CredentialPool::new(found, policy);
    info!(counts = %pool.counts(), ?policy, "credential pool ready");

    let binary = match tool::locate_rclone(
        config.rclone.binary.as_deref(),
        &tool::fallback_dirs(&config.accounts.dir),
    ) {
        Ok(binary) => binary,
        Err(e) => {
            error!(error = %e, "cannot run uploads");
            return Ok(ExitCode::from(EXIT_UNAVAILABLE));
        }
    };

    let transfer = RcloneTransfer::new(RcloneOptions {
        binary,
        remote_name: config.rclone.remote_name.clone(),
        folder_id: cli.folder_id.clone(),
        chunk_size: config.rclone.chunk_size.clone(),
        extra_args: config.rclone.extra_args.clone(),
    })
    .context("preparing rclone")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));
    if let Some(timeout) = config.run.timeout() {
        tokio::spawn(cancel_after(timeout, cancel.clone()));
    }

    let scheduler = Scheduler::new(
        Arc::new(transfer),
        config.classification.clone(),
        config.rotation.retry_policy(),
    )
    .with_cancellation(cancel.clone());

    info!(files = files.len(), input = %cli.input_dir.display(), "starting upload");
    let report = batch::run_batch(&scheduler, &mut pool, files).await;
    report.log_summary();
    info!(counts = %pool.counts(), "final credential state");

    if let Some(path) = &cli.metrics_file {
        match metrics::write_textfile(&prometheus, path) {
            Ok(()) => info!(path = %path.display(), "metrics written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write metrics"),
        }
    }

    cancel.cancel();
    Ok(ExitCode::from(report.exit_code() as u8))
}

/// Discover credential files, treating an empty directory as a configuration
/// error so it is reported before rclone is looked up.
async fn load_credentials(accounts: &AccountsConfig) -> Result<Vec<Credential>> {
    let found = credentials::discover(&accounts.dir, &accounts.extension).await?;
    if found.is_empty() {
        anyhow::bail!(
            "no *.{} credential files in {}",
            accounts.extension.trim_start_matches('.'),
            accounts.dir.display()
        );
    }
    Ok(found)
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = token.cancelled() => return,
        _ = ctrl_c => warn!("received SIGINT, cancelling upload"),
        _ = terminate => warn!("received SIGTERM, cancelling upload"),
    }
    token.cancel();
}

/// Cancel `token` once `timeout` has elapsed.
async fn cancel_after(timeout: Duration, token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => {}
        _ = tokio::time::sleep(timeout) => {
            warn!(timeout_secs = timeout.as_secs(), "deadline reached, cancelling upload");
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rotating-uploader").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn cli_requires_input_and_folder() {
        assert!(Cli::try_parse_from(["rotating-uploader", "/data"]).is_err());
        let cli = parse(&["/data", "0AbcDrive"]);
        assert_eq!(cli.input_dir, PathBuf::from("/data"));
        assert_eq!(cli.folder_id, "0AbcDrive");
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn cli_overrides_replace_config_values() {
        let cli = parse(&[
            "/data",
            "folder",
            "--accounts-dir",
            "/keys",
            "--chunk-size",
            "64M",
            "--selection",
            "round-robin",
            "--max-transient-retries",
            "5",
            "--timeout-secs",
            "600",
            "--log-format",
            "json",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.accounts.dir, PathBuf::from("/keys"));
        assert_eq!(config.rclone.chunk_size, "64M");
        assert_eq!(config.rotation.selection, Selection::RoundRobin);
        assert_eq!(config.rotation.max_transient_retries, 5);
        assert_eq!(config.run.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(cli.log_format, LogFormat::Json);
        config.validate().unwrap();
    }

    #[test]
    fn cli_without_overrides_keeps_config() {
        let cli = parse(&["/data", "folder"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.rclone.chunk_size, "8M");
        assert_eq!(config.accounts.dir, PathBuf::from("accounts"));
        assert_eq!(config.run.timeout(), None);
    }

    #[test]
    fn zero_retries_override_fails_validation() {
        let cli = parse(&["/data", "folder", "--max-transient-retries", "0"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn empty_accounts_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = AccountsConfig {
            dir: dir.path().to_path_buf(),
            extension: "json".into(),
        };

        let err = load_credentials(&accounts).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(&dir.path().display().to_string()), "got: {msg}");
        assert!(msg.contains("*.json"), "got: {msg}");

        std::fs::write(dir.path().join("sa-1.json"), "{}").unwrap();
        let found = load_credentials(&accounts).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "sa-1");
    }

    #[tokio::test]
    async fn missing_accounts_dir_is_rejected() {
        let accounts = AccountsConfig {
            dir: PathBuf::from("/nonexistent/accounts"),
            extension: "json".into(),
        };
        assert!(load_credentials(&accounts).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_token() {
        let token = CancellationToken::new();
        let task = tokio::spawn(cancel_after(Duration::from_secs(30), token.clone()));
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(!token.is_cancelled());
        tokio::time::sleep(Duration::from_secs(2)).await;
        task.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn deadline_task_exits_when_run_finishes() {
        let token = CancellationToken::new();
        let task = tokio::spawn(cancel_after(Duration::from_secs(3600), token.clone()));
        token.cancel();
        task.await.unwrap();
    }
}
