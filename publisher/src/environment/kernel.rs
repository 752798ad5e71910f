//! Kernels that run the environment inspection command

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::PublishError;

/// A command to run next to the notebook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

/// A piece of a running command's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelOutput {
    Stdout(String),
    Stderr(String),
    /// Exit code, `None` when the command was killed by a signal
    Exited(Option<i32>),
}

/// The computation kernel attached to the notebook
#[async_trait]
pub trait Kernel: Send + Sync {
    /// Interpreter the kernel itself runs on
    async fn interpreter(&self) -> Result<String, PublishError>;

    /// Start `command` and stream its output as it arrives.
    ///
    /// The channel closes after the command exits.
    async fn execute(
        &self,
        command: KernelCommand,
    ) -> Result<mpsc::Receiver<KernelOutput>, PublishError>;
}

/// Runs commands as local subprocesses
#[derive(Debug, Clone)]
pub struct ProcessKernel {
    python: String,
}

impl ProcessKernel {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

#[async_trait]
impl Kernel for ProcessKernel {
    async fn interpreter(&self) -> Result<String, PublishError> {
        Ok(self.python.clone())
    }

    async fn execute(
        &self,
        command: KernelCommand,
    ) -> Result<mpsc::Receiver<KernelOutput>, PublishError> {
        debug!(
            "Executing {} {:?} in {}",
            command.program,
            command.args,
            command.working_dir.display()
        );

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PublishError::EnvironmentInspection(format!(
                    "failed to run {}: {}",
                    command.program, e
                ))
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(PublishError::EnvironmentInspection(
                "command has no output stream".to_string(),
            ));
        };

        let (tx, rx) = mpsc::channel(16);
        let stdout_task = tokio::spawn(forward(stdout, tx.clone(), KernelOutput::Stdout));
        let stderr_task = tokio::spawn(forward(stderr, tx.clone(), KernelOutput::Stderr));
        tokio::spawn(async move {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            match child.wait().await {
                Ok(status) => {
                    debug!("Command exited with {}", status);
                    let _ = tx.send(KernelOutput::Exited(status.code())).await;
                }
                Err(e) => warn!("Waiting for command failed: {}", e),
            }
        });

        Ok(rx)
    }
}

/// Send `reader`'s text to `tx` as it arrives, until EOF or until the
/// receiver goes away
async fn forward<R>(
    mut reader: R,
    tx: mpsc::Sender<KernelOutput>,
    wrap: fn(String) -> KernelOutput,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("Reading command output failed: {}", e);
                break;
            }
        };
        pending.extend_from_slice(&buf[..n]);
        let fragment = take_utf8_prefix(&mut pending);
        if !fragment.is_empty() && tx.send(wrap(fragment)).await.is_err() {
            // receiver has what it needs
            return;
        }
    }
    if !pending.is_empty() {
        let _ = tx
            .send(wrap(String::from_utf8_lossy(&pending).into_owned()))
            .await;
    }
}

/// Split off the longest valid UTF-8 prefix, leaving an incomplete
/// trailing sequence in `pending`.
fn take_utf8_prefix(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            return text;
        }
    };
    let rest = pending.split_off(valid);
    String::from_utf8(std::mem::replace(pending, rest)).unwrap_or_default()
}
