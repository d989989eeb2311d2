//! SSH client implementation using russh.
//!
//! Provides connection management and authentication.

use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg, Session};
use russh::Channel;
use tokio::net::UnixStream;

use crate::error::{DeployError, Result};
use crate::ssh::config::{AuthMethod, ConnectionSpec, Secret};
use crate::ssh::exec::ExecChannel;

/// One authenticated SSH session.
pub struct SshClient {
    session: Handle<ClientHandler>,
    target: String,
    forward_agent: bool,
}

impl SshClient {
    /// Connect and authenticate.
    pub async fn connect(spec: &ConnectionSpec) -> Result<Self> {
        if !spec.is_complete() {
            return Err(DeployError::Config(format!(
                "Connection needs both user and host, got '{}'",
                spec
            )));
        }

        let russh_config = Arc::new(client::Config {
            // Remote commands may be silent for a long time
            inactivity_timeout: None,
            keepalive_interval: Some(std::time::Duration::from_secs(15)),
            keepalive_max: 4,
            ..Default::default()
        });

        let addr = spec
            .address()
            .to_socket_addrs()
            .map_err(|e| DeployError::Connection(format!("Failed to resolve {}: {}", spec.host, e)))?
            .next()
            .ok_or_else(|| DeployError::Connection(format!("No address found for {}", spec.host)))?;

        let handler = ClientHandler {
            forward_agent: spec.forward_agent,
        };

        tracing::debug!("Connecting to {} ({})", spec, addr);
        let mut session = client::connect(russh_config, addr, handler)
            .await
            .map_err(|e| DeployError::Connection(format!("Connection to {} failed: {}", spec.address(), e)))?;

        Self::authenticate(&mut session, spec).await?;

        Ok(Self {
            session,
            target: spec.to_string(),
            forward_agent: spec.forward_agent,
        })
    }

    async fn authenticate(session: &mut Handle<ClientHandler>, spec: &ConnectionSpec) -> Result<()> {
        let accepted = match &spec.auth {
            AuthMethod::Password(secret) => {
                tracing::debug!("Authenticating {} with password", spec.user);
                session
                    .authenticate_password(&spec.user, secret.expose())
                    .await
                    .map_err(|e| DeployError::Connection(format!("Password authentication failed: {}", e)))?
            }
            AuthMethod::PrivateKey { path, passphrase } => {
                tracing::debug!("Authenticating {} with key {}", spec.user, path.display());
                let key = load_private_key(path, passphrase.as_ref()).map_err(|message| {
                    DeployError::Authentication {
                        user: spec.user.clone(),
                        host: spec.host.clone(),
                        message,
                    }
                })?;
                session
                    .authenticate_publickey(&spec.user, Arc::new(key))
                    .await
                    .map_err(|e| DeployError::Connection(format!("Public key authentication failed: {}", e)))?
            }
        };

        if accepted {
            Ok(())
        } else {
            Err(DeployError::Authentication {
                user: spec.user.clone(),
                host: spec.host.clone(),
                message: "credentials rejected by server".to_string(),
            })
        }
    }

    /// Start `command` on a new exec channel.
    pub async fn exec(self, command: &str) -> Result<ExecChannel> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(|e| DeployError::Connection(format!("Failed to open channel: {}", e)))?;

        if self.forward_agent {
            channel
                .agent_forward(true)
                .await
                .map_err(|e| DeployError::Connection(format!("Agent forwarding refused: {}", e)))?;
        }

        channel
            .exec(true, command.as_bytes())
            .await
            .map_err(|e| DeployError::Connection(format!("Failed to execute command: {}", e)))?;

        Ok(ExecChannel::new(self, channel))
    }

    /// Open a channel running the sftp subsystem.
    pub(crate) async fn open_subsystem(&self, name: &str) -> Result<Channel<Msg>> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(|e| DeployError::Connection(format!("Failed to open {} channel: {}", name, e)))?;

        channel
            .request_subsystem(true, name)
            .await
            .map_err(|e| DeployError::Connection(format!("Failed to request {} subsystem: {}", name, e)))?;

        Ok(channel)
    }

    /// `user@host:port` this client is connected to.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Say goodbye to the server.
    pub async fn disconnect(&self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

/// Load a private key, decrypting it with `passphrase` when given.
pub fn load_private_key(
    path: &Path,
    passphrase: Option<&Secret>,
) -> std::result::Result<russh_keys::PrivateKey, String> {
    russh_keys::load_secret_key(path, passphrase.map(Secret::expose))
        .map_err(|e| format!("Failed to load key {}: {}", path.display(), e))
}

/// Client handler for russh connection callbacks.
pub struct ClientHandler {
    forward_agent: bool,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = DeployError;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        // No known_hosts handling: trust on first use, every time.
        tracing::debug!("Server key algorithm {}", server_public_key.algorithm());
        Ok(true)
    }

    async fn server_channel_open_agent_forward(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        if !self.forward_agent {
            return Ok(());
        }

        let Ok(socket_path) = std::env::var("SSH_AUTH_SOCK") else {
            tracing::warn!("Agent forwarding requested but SSH_AUTH_SOCK is not set");
            return Ok(());
        };

        tokio::spawn(async move {
            let mut agent = match UnixStream::connect(&socket_path).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("Failed to connect to local agent: {}", e);
                    return;
                }
            };
            let mut channel_stream = channel.into_stream();
            if let Err(e) = tokio::io::copy_bidirectional(&mut agent, &mut channel_stream).await {
                tracing::debug!("Agent forward closed: {}", e);
            }
        });

        Ok(())
    }
}
