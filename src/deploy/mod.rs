//! Deployment orchestration.
//!
//! One run walks these phases in order and stops at the first failure:
//!
//! 1. resolve the connection string
//! 2. recreate `<stage_dir>/<node_name>` on the remote host
//! 3. upload the build workspace into it (optional)
//! 4. write the build parameters as a properties file
//! 5. expand the command template
//! 6. run `cd <staging> && <exports>; <command>` and capture its output
//!
//! Each remote phase gets its own session.

pub mod progress;
pub mod properties;
pub mod remote_fs;
pub mod runner;
pub mod template;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::config::DeploymentConfig;
use crate::error::{DeployError, Result};
use crate::ssh::ConnectionSpec;

pub use progress::{ConsoleSink, MemorySink, ProgressSink, TracingSink};
pub use remote_fs::{EntryKind, RemoteEntry, RemoteFs, UploadStats};
pub use runner::{CommandStream, DeploymentResult, OutputChunk};
pub use template::{expand, BuildParameters, NODE_NAME_PARAM};
pub use transport::{SshTransport, Transport};

use properties::render_properties;
use remote_fs::{ensure_fresh_directory, join_remote, upload_tree};
use runner::{collect_output, compose_command};
use template::with_node_name;

/// What the build system hands over for one run.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub workspace: PathBuf,
    pub parameters: BuildParameters,
}

impl BuildContext {
    pub fn new(workspace: impl Into<PathBuf>, parameters: BuildParameters) -> Self {
        Self {
            workspace: workspace.into(),
            parameters,
        }
    }
}

/// Steps of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ConnectionResolved,
    StagingPrepared,
    WorkspaceTransferred,
    PropertiesWritten,
    CommandResolved,
    Executed,
    Succeeded,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::ConnectionResolved => "connection",
            Phase::StagingPrepared => "staging",
            Phase::WorkspaceTransferred => "workspace transfer",
            Phase::PropertiesWritten => "properties",
            Phase::CommandResolved => "command resolution",
            Phase::Executed => "remote command",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Something the build system can ask to deploy a build.
///
/// `prepare` stages files before the build step runs, `execute` runs the
/// remote command afterwards.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn prepare(&self, ctx: &BuildContext, sink: &dyn ProgressSink) -> Result<()>;

    async fn execute(&self, ctx: &BuildContext, sink: &dyn ProgressSink)
        -> Result<DeploymentResult>;

    async fn deploy(&self, ctx: &BuildContext, sink: &dyn ProgressSink) -> Result<DeploymentResult> {
        self.prepare(ctx, sink).await?;
        self.execute(ctx, sink).await
    }
}

/// Deployment of one node.
pub struct Deployment<T = SshTransport> {
    config: DeploymentConfig,
    transport: T,
    cancel: Option<watch::Receiver<bool>>,
}

impl Deployment<SshTransport> {
    pub fn new(config: DeploymentConfig) -> Self {
        Self::with_transport(config, SshTransport)
    }
}

impl<T: Transport> Deployment<T> {
    pub fn with_transport(config: DeploymentConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            cancel: None,
        }
    }

    /// Abort the run at the next remote wait once `true` is sent.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// The user command with all placeholders expanded.
    ///
    /// A command that expands to nothing (or only whitespace) is refused with
    /// [`DeployError::Config`] rather than sent as `cd <dir> && `.
    pub fn resolved_command(&self, params: &BuildParameters) -> Result<String> {
        let node_name = &self.config.node_name;
        let resolved = expand(&self.config.command, &with_node_name(params, node_name), node_name);

        if resolved.trim().is_empty() {
            return Err(DeployError::Config(format!(
                "No command configured for node '{}'",
                node_name
            )));
        }
        Ok(resolved)
    }

    /// The exact string sent to the remote shell.
    pub fn remote_command(&self, params: &BuildParameters) -> Result<String> {
        let resolved = self.resolved_command(params)?;
        Ok(compose_command(
            &self.config.staging_dir(),
            &self.config.environment,
            &resolved,
        ))
    }

    /// Checked before any remote contact. An empty node name would make the
    /// staging dir the stage root itself.
    fn resolve_connection(&self, sink: &dyn ProgressSink) -> Result<ConnectionSpec> {
        let resolved = if self.config.node_name.trim().is_empty() {
            Err(DeployError::Config("node_name must not be empty".to_string()))
        } else {
            self.config.connection_spec()
        };
        let spec = resolved.inspect_err(|e| {
            sink.line(&format!("{} failed: {}", Phase::ConnectionResolved, e));
        })?;

        sink.line(&format!("Node Name: \"{}\".", self.config.node_name));
        sink.line(&format!("Remote Host: \"{}\"", spec.host));
        sink.line(&format!("Remote Port: \"{}\"", spec.port));
        sink.line(&format!("Remote User: \"{}\"", spec.user));
        tracing::debug!("Connection resolved for {}", spec);

        Ok(spec)
    }

    async fn run_prepare(
        &self,
        spec: &ConnectionSpec,
        ctx: &BuildContext,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        let staging_dir = self.config.staging_dir();
        sink.line(&format!("Staging Dir: \"{}\"", staging_dir));

        self.step(Phase::StagingPrepared, sink, async {
            let fs = self.transport.open_filesystem(spec).await?;
            let outcome = ensure_fresh_directory(fs.as_ref(), &staging_dir).await;
            finish(fs, outcome).await
        })
        .await?;
        sink.line(&format!("Prepared staging directory \"{}\"", staging_dir));

        if self.config.transfer_workspace {
            let stats = self
                .step(Phase::WorkspaceTransferred, sink, async {
                    if ctx.workspace.as_os_str().is_empty() {
                        return Err(DeployError::Config(
                            "Workspace transfer is enabled but no workspace was given".to_string(),
                        ));
                    }
                    let fs = self.transport.open_filesystem(spec).await?;
                    let outcome = upload_tree(fs.as_ref(), &ctx.workspace, &staging_dir).await;
                    finish(fs, outcome).await
                })
                .await?;
            sink.line(&format!(
                "Transferred workspace \"{}\" to \"{}\" ({} files, {} directories, {} bytes)",
                ctx.workspace.display(),
                staging_dir,
                stats.files,
                stats.directories,
                stats.bytes
            ));
        } else {
            tracing::warn!("Workspace transfer disabled for {}", self.config.node_name);
            sink.line("Workspace transfer disabled, skipping");
        }

        let properties_path = join_remote(&staging_dir, self.config.properties_file_name());
        let properties = render_properties(&ctx.parameters);
        self.step(Phase::PropertiesWritten, sink, async {
            let fs = self.transport.open_filesystem(spec).await?;
            let outcome = fs.write_file(&properties_path, properties.as_bytes()).await;
            finish(fs, outcome).await
        })
        .await?;
        sink.line(&format!(
            "Wrote {} build parameters to \"{}\"",
            ctx.parameters.len(),
            properties_path
        ));

        Ok(())
    }

    async fn run_execute(
        &self,
        spec: &ConnectionSpec,
        ctx: &BuildContext,
        sink: &dyn ProgressSink,
    ) -> Result<DeploymentResult> {
        let command = self.remote_command(&ctx.parameters).inspect_err(|e| {
            sink.line(&format!("{} failed: {}", Phase::CommandResolved, e));
        })?;
        // Expanded values may be sensitive, log the template only
        tracing::debug!(
            "Remote command template: {} (in {})",
            self.config.command,
            self.config.staging_dir()
        );

        sink.line(&format!(
            "Attempting to connect to \"{}\" on port \"{}\" as \"{}\".",
            spec.host, spec.port, spec.user
        ));

        let timeout = self.config.command_timeout();
        let result = self
            .step(Phase::Executed, sink, async {
                let run = async {
                    let mut stream = self.transport.open_exec(spec, &command).await?;
                    collect_output(stream.as_mut()).await
                };

                let result = match timeout {
                    Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                        DeployError::Timeout {
                            phase: Phase::Executed.to_string(),
                            elapsed: limit,
                        }
                    })??,
                    None => run.await?,
                };

                if !result.stdout.is_empty() {
                    sink.line(result.stdout.trim_end());
                }

                if let Some(message) = result.remote_failure.clone() {
                    return Err(DeployError::RemoteCommand {
                        message,
                        stdout: result.stdout,
                    });
                }
                Ok(result)
            })
            .await?;

        sink.line(&format!(
            "Deployment of \"{}\" {}",
            self.config.node_name,
            Phase::Succeeded
        ));
        Ok(result)
    }

    /// Run one phase, racing it against cancellation and reporting failure.
    async fn step<F, O>(&self, phase: Phase, sink: &dyn ProgressSink, fut: F) -> Result<O>
    where
        F: Future<Output = Result<O>> + Send,
        O: Send,
    {
        tracing::debug!("Entering phase: {}", phase);

        let outcome = tokio::select! {
            biased;
            _ = cancelled(self.cancel.clone()) => Err(DeployError::Cancelled {
                phase: phase.to_string(),
            }),
            outcome = fut => outcome,
        };

        if let Err(e) = &outcome {
            tracing::error!("Deployment {} during {}: {}", Phase::Failed, phase, e);
            sink.line(&format!("{} failed: {}", phase, e));
        }
        outcome
    }
}

#[async_trait]
impl<T: Transport> Deployer for Deployment<T> {
    async fn prepare(&self, ctx: &BuildContext, sink: &dyn ProgressSink) -> Result<()> {
        let spec = self.resolve_connection(sink)?;
        self.run_prepare(&spec, ctx, sink).await
    }

    async fn execute(
        &self,
        ctx: &BuildContext,
        sink: &dyn ProgressSink,
    ) -> Result<DeploymentResult> {
        let spec = self.resolve_connection(sink)?;
        self.run_execute(&spec, ctx, sink).await
    }

    async fn deploy(&self, ctx: &BuildContext, sink: &dyn ProgressSink) -> Result<DeploymentResult> {
        let spec = self.resolve_connection(sink)?;
        self.run_prepare(&spec, ctx, sink).await?;
        self.run_execute(&spec, ctx, sink).await
    }
}

/// Close the session, keeping the operation's error if there was one.
async fn finish<O>(fs: Box<dyn RemoteFs>, outcome: Result<O>) -> Result<O> {
    let closed = fs.close().await;
    let value = outcome?;
    closed?;
    Ok(value)
}

/// Resolves once `true` is observed. Never resolves without a receiver, or
/// after the sender is gone.
async fn cancelled(cancel: Option<watch::Receiver<bool>>) {
    let Some(mut cancel) = cancel else {
        return std::future::pending().await;
    };

    loop {
        let requested = *cancel.borrow_and_update();
        if requested {
            return;
        }
        if cancel.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
