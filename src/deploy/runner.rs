//! Remote command execution policy.
//!
//! The transport delivers output chunks tagged by stream; this module decides
//! what a run produced. Stdout is accumulated in arrival order. The first
//! stderr chunk ends collection and marks the run as failed, whatever the
//! remote exit status would have been.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{DeployError, Result};

/// A piece of remote output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Output of one remote command, chunk by chunk.
#[async_trait]
pub trait CommandStream: Send {
    /// Next chunk, or `None` once the remote side closed its output.
    async fn next_chunk(&mut self) -> Result<Option<OutputChunk>>;
}

/// What one deployment's remote command produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentResult {
    pub stdout: String,

    /// First stderr chunk, if the remote process wrote to its error stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_failure: Option<String>,
}

impl DeploymentResult {
    pub fn succeeded(&self) -> bool {
        self.remote_failure.is_none()
    }

    /// Rebuild the partial result carried by a remote command failure.
    pub fn from_remote_failure(err: &DeployError) -> Option<Self> {
        match err {
            DeployError::RemoteCommand { message, stdout } => Some(Self {
                stdout: stdout.clone(),
                remote_failure: Some(message.clone()),
            }),
            _ => None,
        }
    }
}

/// Drain `stream` under the stderr-is-fatal policy.
pub async fn collect_output(stream: &mut dyn CommandStream) -> Result<DeploymentResult> {
    let mut stdout = Vec::new();

    while let Some(chunk) = stream.next_chunk().await? {
        match chunk {
            OutputChunk::Stdout(data) => stdout.extend_from_slice(&data),
            OutputChunk::Stderr(data) => {
                let message = String::from_utf8_lossy(&data).into_owned();
                tracing::debug!("Remote stderr, aborting: {}", message.trim_end());
                return Ok(DeploymentResult {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    remote_failure: Some(message),
                });
            }
        }
    }

    Ok(DeploymentResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        remote_failure: None,
    })
}

/// `cd <staging_dir> && <exports>; <command>`.
///
/// Exports are joined with `;` and passed through unchecked. With no exports
/// the separator is dropped so the result stays valid shell.
pub fn compose_command(staging_dir: &str, exports: &[String], command: &str) -> String {
    let exports: Vec<&str> = exports
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect();

    if exports.is_empty() {
        format!("cd {} && {}", staging_dir, command)
    } else {
        format!("cd {} && {}; {}", staging_dir, exports.join(";"), command)
    }
}
