// Helper functions for running the extraction tool

use std::path::Path;
use std::process::{Command as StdCommand, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

use super::errors::DownloadError;

/// Run a command with a timeout, capturing stdout and stderr.
///
/// The child is killed when the timeout fires or when the returned future is
/// dropped, so an abandoned extraction never leaves a process behind.
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, DownloadError> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DownloadError::ToolNotFound(program.to_string()),
            _ => DownloadError::ExecutionError(format!("Failed to start {}: {}", program, e)),
        })?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| {
        DownloadError::ExecutionError(format!("Failed to capture stdout from {}", program))
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| {
        DownloadError::ExecutionError(format!("Failed to capture stderr from {}", program))
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status_res) => {
            let status = status_res.map_err(|e| {
                DownloadError::ExecutionError(format!("Failed to wait for {}: {}", program, e))
            })?;
            let stdout = join_pipe(stdout_task, "stdout").await?;
            let stderr = join_pipe(stderr_task, "stderr").await?;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::Timeout(timeout_secs))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    name: &str,
) -> Result<Vec<u8>, DownloadError> {
    task.await
        .map_err(|e| DownloadError::ExecutionError(format!("{} task failed: {}", name, e)))?
        .map_err(|e| DownloadError::ExecutionError(format!("Failed to read {}: {}", name, e)))
}

/// Locate a binary in the usual install locations, then in PATH
pub fn find_binary(name: &str) -> String {
    let common_paths = [
        format!("/opt/homebrew/bin/{}", name),
        format!("/usr/local/bin/{}", name),
        format!("/usr/bin/{}", name),
    ];

    for path in &common_paths {
        if Path::new(path).exists() {
            return path.clone();
        }
    }

    if let Ok(output) = StdCommand::new("which").arg(name).output() {
        if output.status.success() {
            let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !found.is_empty() {
                return found;
            }
        }
    }

    name.to_string()
}
