//! Remote command execution.
//!
//! Exposes an exec channel as a stream of stdout/stderr chunks.

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use crate::deploy::runner::{CommandStream, OutputChunk};
use crate::error::Result;
use crate::ssh::client::SshClient;

/// SSH extended-data type for stderr.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// A running remote command. Owns its session; dropping it closes both.
pub struct ExecChannel {
    client: SshClient,
    channel: Channel<Msg>,
}

impl ExecChannel {
    pub(crate) fn new(client: SshClient, channel: Channel<Msg>) -> Self {
        Self { client, channel }
    }
}

#[async_trait]
impl CommandStream for ExecChannel {
    async fn next_chunk(&mut self) -> Result<Option<OutputChunk>> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    return Ok(Some(OutputChunk::Stdout(data.to_vec())));
                }
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == SSH_EXTENDED_DATA_STDERR => {
                    return Ok(Some(OutputChunk::Stderr(data.to_vec())));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    tracing::debug!("{} exited with status {}", self.client.target(), exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                _ => {}
            }
        }
    }
}
