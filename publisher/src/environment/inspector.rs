//! Environment capture for source deployments

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::environment::kernel::{Kernel, KernelCommand, KernelOutput};
use crate::errors::PublishError;
use crate::models::deployment::EnvironmentSnapshot;

/// Module the kernel's interpreter runs to describe its environment
pub const ENVIRONMENT_MODULE: &str = "rsconnect_jupyter.environment";

/// Tracks whether streamed JSON text has closed its outermost object.
///
/// Braces inside string literals are not counted, so a package name such
/// as `a{}` cannot end the capture early.
#[derive(Debug, Default)]
pub struct BraceTracker {
    depth: i64,
    opened: bool,
    in_string: bool,
    escaped: bool,
}

impl BraceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, fragment: &str) {
        for ch in fragment.chars() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if ch == '\\' {
                    self.escaped = true;
                } else if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match ch {
                '"' => self.in_string = true,
                '{' => {
                    self.depth += 1;
                    self.opened = true;
                }
                '}' => self.depth -= 1,
                _ => {}
            }
        }
    }

    /// At least one object opened and every opened brace closed
    pub fn is_balanced(&self) -> bool {
        self.opened && self.depth == 0 && !self.in_string
    }
}

/// Captures the notebook's language and package environment through its kernel
pub struct EnvironmentInspector {
    kernel: Arc<dyn Kernel>,
}

impl EnvironmentInspector {
    pub fn new(kernel: Arc<dyn Kernel>) -> Self {
        Self { kernel }
    }

    /// Run the environment command for the notebook file at `notebook_path`.
    ///
    /// The command runs in the notebook's directory and is given the file
    /// name, so it finds `requirements.txt` or `environment.yml` next to the
    /// notebook. Output is accumulated until the braces balance, then parsed
    /// once; fragments arriving after that are ignored.
    pub async fn inspect(&self, notebook_path: &Path) -> Result<EnvironmentSnapshot, PublishError> {
        let interpreter = self.kernel.interpreter().await?;
        let (working_dir, file_name) = split_notebook_path(notebook_path)?;

        let command = KernelCommand {
            program: interpreter,
            args: vec![
                "-m".to_string(),
                ENVIRONMENT_MODULE.to_string(),
                file_name,
            ],
            working_dir,
        };

        info!("Inspecting environment for {}", notebook_path.display());
        let mut output = self.kernel.execute(command).await?;

        let mut content = String::new();
        let mut stderr = String::new();
        let mut exit_code = None;
        let mut tracker = BraceTracker::new();
        while let Some(chunk) = output.recv().await {
            match chunk {
                KernelOutput::Stdout(fragment) => {
                    tracker.feed(&fragment);
                    content.push_str(&fragment);
                    if tracker.is_balanced() {
                        return parse_snapshot(content);
                    }
                }
                KernelOutput::Stderr(fragment) => stderr.push_str(&fragment),
                KernelOutput::Exited(code) => exit_code = code,
            }
        }

        error!("Environment output ended before a complete object: {}", content);
        let mut message = format!(
            "output ended before a complete JSON object was received: {}",
            content.trim()
        );
        if let Some(code) = exit_code.filter(|code| *code != 0) {
            message.push_str(&format!(" (exit code {})", code));
        }
        if !stderr.trim().is_empty() {
            message.push_str(&format!("\n{}", stderr.trim()));
        }
        Err(PublishError::EnvironmentInspection(message))
    }
}

/// Absolute directory of the notebook and its file name
fn split_notebook_path(notebook_path: &Path) -> Result<(PathBuf, String), PublishError> {
    let absolute = if notebook_path.is_absolute() {
        notebook_path.to_path_buf()
    } else {
        std::env::current_dir()?.join(notebook_path)
    };

    let file_name = absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            PublishError::EnvironmentInspection(format!(
                "{} does not name a notebook file",
                notebook_path.display()
            ))
        })?;
    let working_dir = absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    Ok((working_dir, file_name))
}

fn parse_snapshot(content: String) -> Result<EnvironmentSnapshot, PublishError> {
    debug!("environment: {}", content);

    let value: serde_json::Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            error!("Environment output is not valid JSON: {}", e);
            return Err(PublishError::EnvironmentParse {
                message: e.to_string(),
                raw: content,
            });
        }
    };

    if let Some(message) = value.get("error") {
        let message = message
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| message.to_string());
        error!("Environment inspection reported: {}", message);
        return Err(PublishError::EnvironmentInspection(message));
    }

    Ok(EnvironmentSnapshot(value))
}
