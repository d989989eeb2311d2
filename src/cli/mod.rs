mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use ssh_installer::deploy::BuildParameters;
use ssh_installer::error::Result;
use ssh_installer::DeploymentConfig;

#[derive(Parser)]
#[command(name = "ssh-installer")]
#[command(version)]
#[command(about = "Stage a build on a remote host and run an install command over SSH")]
#[command(long_about = "Recreates <stage_dir>/<node_name> on the remote host over SFTP, uploads the workspace, \
writes the build parameters as a properties file, then runs the configured command there.\n\n\
Any output on the remote command's stderr fails the deployment.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy the workspace and run the remote command
    Deploy {
        /// Deployment config file
        #[arg(short, long, env = "SSH_INSTALLER_CONFIG", default_value = "ssh-installer.yaml")]
        config: PathBuf,

        /// Build workspace to upload
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Build parameter as KEY=VALUE (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Override the node name from the config file
        #[arg(long)]
        node_name: Option<String>,

        /// Which part of the deployment to run
        #[arg(long, value_enum, default_value_t = PhaseSelection::All)]
        phase: PhaseSelection,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the command that would run remotely, without connecting
    Render {
        /// Deployment config file
        #[arg(short, long, env = "SSH_INSTALLER_CONFIG", default_value = "ssh-installer.yaml")]
        config: PathBuf,

        /// Build parameter as KEY=VALUE (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Override the node name from the config file
        #[arg(long)]
        node_name: Option<String>,
    },

    /// Parse a user@host[:port] connection string
    Parse {
        /// Connection string
        connection: String,
    },
}

/// Deployment phases selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PhaseSelection {
    /// Stage files only (staging dir, workspace, properties)
    Prepare,
    /// Run the remote command only
    Execute,
    /// Both, in order
    All,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Deploy {
                config,
                workspace,
                params,
                node_name,
                phase,
                json,
            } => {
                let config = load_config(&config, node_name)?;
                let params: BuildParameters = params.into_iter().collect();
                commands::deploy::execute(config, workspace, params, phase, json).await
            }
            Commands::Render {
                config,
                params,
                node_name,
            } => {
                let config = load_config(&config, node_name)?;
                let params: BuildParameters = params.into_iter().collect();
                commands::render::execute(config, &params)
            }
            Commands::Parse { connection } => commands::parse::execute(&connection),
        }
    }
}

fn load_config(path: &std::path::Path, node_name: Option<String>) -> Result<DeploymentConfig> {
    let mut config = DeploymentConfig::load(path)?;
    if let Some(node_name) = node_name {
        config.node_name = node_name;
    }
    config.validate()?;
    Ok(config)
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
