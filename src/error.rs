use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    /// Malformed connection string, missing host/user, or invalid settings.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed for {user}@{host}: {message}")]
    Authentication {
        user: String,
        host: String,
        message: String,
    },

    /// Transport-level failure: unreachable host, dropped session.
    #[error("SSH connection error: {0}")]
    Connection(String),

    #[error("Remote filesystem error during {operation} on '{path}': {message}")]
    RemoteFilesystem {
        operation: &'static str,
        path: String,
        message: String,
    },

    #[error("Couldn't determine type for remote entry '{path}'")]
    UnknownEntryKind { path: String },

    #[error("Staging directory '{path}' does not exist after creation")]
    StagingDirectoryMissing { path: String },

    /// The remote command wrote to its error stream. `stdout` holds whatever
    /// was captured before that happened.
    #[error("Remote command failed: {message}")]
    RemoteCommand { message: String, stdout: String },

    #[error("{phase} timed out after {elapsed:?}")]
    Timeout { phase: String, elapsed: Duration },

    #[error("Deployment cancelled during {phase}")]
    Cancelled { phase: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workspace traversal error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SSH protocol error: {0}")]
    SshProtocol(#[from] russh::Error),
}

impl DeployError {
    pub(crate) fn remote_fs(
        operation: &'static str,
        path: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::RemoteFilesystem {
            operation,
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Stdout captured before a remote command failure, if any.
    pub fn partial_stdout(&self) -> Option<&str> {
        match self {
            Self::RemoteCommand { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    /// Whether an outer caller may reasonably rerun the deployment.
    ///
    /// Staging directories are recreated from scratch on every run, so
    /// transport failures are safe to retry. The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout { .. } | Self::SshProtocol(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
