use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DeployError, Result};
use crate::ssh::{AuthMethod, ConnectionSpec};

/// Environment variable consulted for the password/passphrase when the
/// config file leaves it unset.
pub const PASSWORD_ENV: &str = "SSH_INSTALLER_PASSWORD";

/// Settings for deploying to one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub node_name: String,
    /// `user@host[:port]`
    #[serde(default)]
    pub connection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Password, or key passphrase when `private_key` is set.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// `NAME=VALUE` entries placed before the command.
    #[serde(
        default,
        deserialize_with = "deserialize_environment",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub environment: Vec<String>,
    /// Shell command with `${name}` placeholders.
    #[serde(default)]
    pub command: String,
    #[serde(default = "default_stage_dir")]
    pub stage_dir: String,
    #[serde(default = "default_true")]
    pub transfer_workspace: bool,
    #[serde(default)]
    pub forward_agent: bool,
    #[serde(default = "default_properties_file")]
    pub properties_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<String>,
}

fn default_stage_dir() -> String {
    "./".to_string()
}

fn default_properties_file() -> String {
    "install.properties".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvironmentField {
    Joined(String),
    List(Vec<String>),
}

fn deserialize_environment<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Option::<EnvironmentField>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(EnvironmentField::Joined(joined)) => joined.split(';').map(str::to_string).collect(),
        Some(EnvironmentField::List(list)) => list,
    };

    Ok(entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect())
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            connection: String::new(),
            private_key: None,
            password: None,
            environment: Vec::new(),
            command: String::new(),
            stage_dir: default_stage_dir(),
            transfer_workspace: true,
            forward_agent: false,
            properties_file: default_properties_file(),
            command_timeout: None,
        }
    }
}

impl DeploymentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeployError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: DeploymentConfig = serde_yaml::from_str(&content)
            .map_err(|e| DeployError::Config(format!("Invalid config: {}", e)))?;

        if config.password.as_deref().is_none_or(str::is_empty) {
            if let Ok(secret) = std::env::var(PASSWORD_ENV) {
                config.password = Some(secret);
            }
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.node_name.trim().is_empty() {
            return Err(DeployError::Config("node_name must not be empty".to_string()));
        }

        let spec = ConnectionSpec::parse(&self.connection)?;
        if !spec.is_complete() {
            return Err(DeployError::Config(
                "connection must be of the form user@host[:port]".to_string(),
            ));
        }

        if let Some(timeout) = &self.command_timeout {
            if parse_duration(timeout).is_none() {
                return Err(DeployError::Config(format!(
                    "Invalid command_timeout '{}'. Use format like '2h', '30m', or '3600'",
                    timeout
                )));
            }
        }

        Ok(())
    }

    /// Parse the connection string and attach credentials.
    ///
    /// Fails when the string is malformed, or when host or user are missing.
    pub fn connection_spec(&self) -> Result<ConnectionSpec> {
        let spec = ConnectionSpec::parse(&self.connection)?;
        if !spec.is_complete() {
            return Err(DeployError::Config(format!(
                "No remote host/user configured for node '{}'",
                self.node_name
            )));
        }

        Ok(spec
            .with_auth(AuthMethod::resolve(
                self.private_key.as_deref(),
                self.password.as_deref(),
            ))
            .with_forward_agent(self.forward_agent))
    }

    /// Stage root, with the legacy `./` fallback for an empty value.
    pub fn stage_root(&self) -> &str {
        if self.stage_dir.is_empty() {
            "./"
        } else {
            &self.stage_dir
        }
    }

    /// `<stage_dir>/<node_name>`
    pub fn staging_dir(&self) -> String {
        format!("{}/{}", self.stage_root(), self.node_name)
    }

    pub fn properties_file_name(&self) -> &str {
        if self.properties_file.is_empty() {
            "install.properties"
        } else {
            &self.properties_file
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout.as_deref().and_then(parse_duration)
    }
}

/// Parse `2h`, `30m`, `45s` or a bare number of seconds.
///
/// Values whose second count does not fit in a `u64` are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    let (digits, unit) = match s.char_indices().last()? {
        (i, 'h') => (&s[..i], 3600),
        (i, 'm') => (&s[..i], 60),
        (i, 's') => (&s[..i], 1),
        _ => (s.as_str(), 1),
    };

    digits
        .parse::<u64>()
        .ok()?
        .checked_mul(unit)
        .map(Duration::from_secs)
}
