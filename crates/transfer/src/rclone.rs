//! rclone transfer runner
//!
//! Each attempt gets its own rclone config pointing the Google Drive backend
//! at the attempt's service-account file. Configs live in a temporary
//! directory owned by the runner and disappear when it is dropped.
//!
//! Folder ids starting with `0A` are shared drives and are configured with
//! `team_drive`; anything else is a regular folder used as `root_folder_id`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use credentials::Credential;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{
    AttemptOutput, Result, Transfer, TransferError, TransferProgress, TransferTask, parse_stats_line,
    run_and_observe,
};

/// Prefix identifying a shared drive id.
const SHARED_DRIVE_PREFIX: &str = "0A";

/// Static settings for every rclone invocation.
#[derive(Debug, Clone)]
pub struct RcloneOptions {
    /// Path to the rclone executable.
    pub binary: PathBuf,
    /// Remote name used inside the generated config.
    pub remote_name: String,
    /// Destination folder or shared drive id.
    pub folder_id: String,
    /// Value for `--drive-chunk-size` (e.g. "8M").
    pub chunk_size: String,
    /// Extra flags appended after the fixed ones.
    pub extra_args: Vec<String>,
}

/// Render the rclone config for one credential.
pub fn render_config(remote_name: &str, folder_id: &str, service_account_file: &Path) -> String {
    let folder_key = if folder_id.starts_with(SHARED_DRIVE_PREFIX) {
        "team_drive"
    } else {
        "root_folder_id"
    };
    format!(
        "[{remote_name}]\ntype = drive\nscope = drive\nservice_account_file = {}\n{folder_key} = {folder_id}\n",
        service_account_file.display()
    )
}

pub struct RcloneTransfer {
    options: RcloneOptions,
    config_dir: TempDir,
}

impl RcloneTransfer {
    pub fn new(options: RcloneOptions) -> Result<Self> {
        let config_dir = tempfile::Builder::new()
            .prefix("rotating-uploader-")
            .tempdir()
            .map_err(|e| TransferError::Config(format!("creating config dir: {e}")))?;
        Ok(Self {
            options,
            config_dir,
        })
    }

    /// Where the config for `credential` is written.
    pub fn config_path(&self, credential: &Credential) -> PathBuf {
        self.config_dir
            .path()
            .join(format!("rclone_{}.conf", credential.id))
    }

    /// Arguments for one attempt, excluding the binary itself.
    pub fn build_args(&self, task: &TransferTask, config_path: &Path) -> Vec<String> {
        let mut args = vec![
            "--config".to_string(),
            config_path.display().to_string(),
            "copy".to_string(),
            "--drive-chunk-size".to_string(),
            self.options.chunk_size.clone(),
            "--transfers".to_string(),
            "1".to_string(),
        ];
        args.extend(self.options.extra_args.iter().cloned());
        args.push(task.source.display().to_string());
        args.push(format!(
            "{}:{}",
            self.options.remote_name,
            remote_path(&task.destination)
        ));
        args
    }

    async fn write_config(&self, credential: &Credential) -> Result<PathBuf> {
        let path = self.config_path(credential);
        let contents = render_config(
            &self.options.remote_name,
            &self.options.folder_id,
            &credential.path,
        );
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| TransferError::Config(format!("writing {}: {e}", path.display())))?;
        Ok(path)
    }
}

impl Transfer for RcloneTransfer {
    fn id(&self) -> &str {
        "rclone"
    }

    fn attempt<'a>(
        &'a self,
        task: &'a TransferTask,
        credential: &'a Credential,
    ) -> Pin<Box<dyn Future<Output = Result<AttemptOutput>> + Send + 'a>> {
        Box::pin(async move {
            let config_path = self.write_config(credential).await?;
            let args = self.build_args(task, &config_path);
            debug!(credential = %credential, ?args, "invoking rclone");

            let mut cmd = Command::new(&self.options.binary);
            cmd.args(&args);
            run_and_observe(cmd, &credential.id, |line| {
                report_progress(task, credential, line);
            })
            .await
        })
    }
}

/// Log an rclone stats line as structured progress.
fn report_progress(
    task: &TransferTask,
    credential: &Credential,
    line: &str,
) -> Option<TransferProgress> {
    let progress = parse_stats_line(line)?;
    info!(
        file = %task.source.display(),
        credential = %credential,
        percent = progress.percent,
        speed = %progress.speed,
        eta = progress.eta.as_deref().unwrap_or("-"),
        transferred_bytes = progress.transferred(task.size),
        size_bytes = task.size,
        "upload progress"
    );
    Some(progress)
}

/// Normalize a destination into rclone's remote path form.
fn remote_path(destination: &str) -> &str {
    if destination.is_empty() { "/" } else { destination }
}
