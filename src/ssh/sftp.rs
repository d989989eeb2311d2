//! SFTP session implementing the remote filesystem primitives.

use async_trait::async_trait;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::StatusCode;
use tokio::io::AsyncWriteExt;

use crate::deploy::remote_fs::{EntryKind, RemoteEntry, RemoteFs};
use crate::error::{DeployError, Result};
use crate::ssh::client::SshClient;

/// SFTP client for staging operations. Owns its SSH session.
pub struct SftpClient {
    session: SftpSession,
    client: SshClient,
}

impl SftpClient {
    /// Start the sftp subsystem on `client`.
    pub async fn open(client: SshClient) -> Result<Self> {
        let channel = client.open_subsystem("sftp").await?;

        let session = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| DeployError::Connection(format!("Failed to initialize SFTP: {}", e)))?;

        tracing::debug!("SFTP session open on {}", client.target());
        Ok(Self { session, client })
    }
}

#[async_trait]
impl RemoteFs for SftpClient {
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.session.metadata(path).await {
            Ok(_) => Ok(true),
            Err(SftpError::Status(status)) if status.status_code == StatusCode::NoSuchFile => {
                Ok(false)
            }
            Err(e) => Err(DeployError::remote_fs("stat", path, e)),
        }
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let entries = self
            .session
            .read_dir(path)
            .await
            .map_err(|e| DeployError::remote_fs("opendir", path, e))?;

        Ok(entries
            .map(|entry| {
                let file_type = entry.file_type();
                let kind = if file_type.is_symlink() {
                    EntryKind::Symlink
                } else if file_type.is_dir() {
                    EntryKind::Directory
                } else if file_type.is_file() {
                    EntryKind::File
                } else {
                    EntryKind::Unknown
                };
                RemoteEntry::new(entry.file_name(), kind)
            })
            .collect())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        self.session
            .remove_file(path)
            .await
            .map_err(|e| DeployError::remote_fs("remove", path, e))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        self.session
            .remove_dir(path)
            .await
            .map_err(|e| DeployError::remote_fs("rmdir", path, e))
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.session
            .create_dir(path)
            .await
            .map_err(|e| DeployError::remote_fs("mkdir", path, e))
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<()> {
        let mut file = self
            .session
            .create(path)
            .await
            .map_err(|e| DeployError::remote_fs("open", path, e))?;

        file.write_all(contents)
            .await
            .map_err(|e| DeployError::remote_fs("write", path, e))?;

        // Ensure data is flushed
        file.shutdown()
            .await
            .map_err(|e| DeployError::remote_fs("close", path, e))?;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.session.close().await {
            tracing::debug!("SFTP close failed: {}", e);
        }
        self.client.disconnect().await
    }
}
