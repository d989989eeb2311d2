//! Session factory used by the orchestrator.
//!
//! Every call opens a brand-new session, so a failure in one deployment phase
//! never leaves state behind for the next.

use async_trait::async_trait;

use crate::deploy::remote_fs::RemoteFs;
use crate::deploy::runner::CommandStream;
use crate::error::Result;
use crate::ssh::{ConnectionSpec, SftpClient, SshClient};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and start a remote filesystem session.
    async fn open_filesystem(&self, spec: &ConnectionSpec) -> Result<Box<dyn RemoteFs>>;

    /// Connect and start `command` on a fresh exec channel.
    async fn open_exec(&self, spec: &ConnectionSpec, command: &str)
        -> Result<Box<dyn CommandStream>>;
}

/// SSH/SFTP transport backed by russh.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshTransport;

#[async_trait]
impl Transport for SshTransport {
    async fn open_filesystem(&self, spec: &ConnectionSpec) -> Result<Box<dyn RemoteFs>> {
        let client = SshClient::connect(spec).await?;
        let sftp = SftpClient::open(client).await?;
        Ok(Box::new(sftp))
    }

    async fn open_exec(
        &self,
        spec: &ConnectionSpec,
        command: &str,
    ) -> Result<Box<dyn CommandStream>> {
        let client = SshClient::connect(spec).await?;
        let channel = client.exec(command).await?;
        Ok(Box::new(channel))
    }
}
