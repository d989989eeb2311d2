//! SSH connection configuration.
//!
//! Turns a `user@host[:port]` connection string plus credential material into
//! the parameters needed to open a session.

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::error::{DeployError, Result};

/// Default SSH port used when the connection string omits one.
pub const DEFAULT_PORT: u16 = 22;

static CONN_STRING: LazyLock<regex_lite::Regex> = LazyLock::new(|| {
    regex_lite::Regex::new(r"^(.+?)@([^:]+)(?::(\d+))?$").expect("connection string regex")
});

/// A secret that never shows up in debug output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// How to authenticate against the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Password authentication. May be empty, in which case the server rejects it.
    Password(Secret),

    /// Private key file, with an optional passphrase to decrypt it.
    PrivateKey {
        path: PathBuf,
        passphrase: Option<Secret>,
    },
}

impl AuthMethod {
    /// Pick key authentication when a key path is configured, password otherwise.
    ///
    /// The secret doubles as the key passphrase when a key is used.
    pub fn resolve(key_path: Option<&str>, secret: Option<&str>) -> Self {
        let secret = secret.filter(|s| !s.is_empty());

        match key_path.filter(|p| !p.is_empty()) {
            Some(path) => Self::PrivateKey {
                path: PathBuf::from(shellexpand::tilde(path).as_ref()),
                passphrase: secret.map(Secret::new),
            },
            None => Self::Password(Secret::new(secret.unwrap_or_default())),
        }
    }
}

impl Default for AuthMethod {
    fn default() -> Self {
        Self::Password(Secret::default())
    }
}

/// Everything needed to open one SSH session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: AuthMethod,
    /// Request agent forwarding on exec channels.
    pub forward_agent: bool,
}

impl Default for ConnectionSpec {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            auth: AuthMethod::default(),
            forward_agent: false,
        }
    }
}

impl ConnectionSpec {
    /// Parse `user@host` or `user@host:port`.
    ///
    /// An empty string yields an empty spec rather than an error; callers
    /// check [`ConnectionSpec::is_complete`] before connecting.
    pub fn parse(conn_string: &str) -> Result<Self> {
        let conn_string = conn_string.trim();
        if conn_string.is_empty() {
            return Ok(Self::default());
        }

        let caps = CONN_STRING.captures(conn_string).ok_or_else(|| {
            DeployError::Config(format!(
                "Malformed connection string '{}'. Expected user@host[:port]",
                conn_string
            ))
        })?;

        let port = match caps.get(3) {
            Some(port) => port.as_str().parse::<u16>().map_err(|_| {
                DeployError::Config(format!(
                    "Invalid port '{}' in connection string '{}'",
                    port.as_str(),
                    conn_string
                ))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            host: caps[2].to_string(),
            port,
            user: caps[1].to_string(),
            ..Default::default()
        })
    }

    pub fn with_auth(mut self, auth: AuthMethod) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_forward_agent(mut self, forward_agent: bool) -> Self {
        self.forward_agent = forward_agent;
        self
    }

    /// Host and user are both known.
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.user.is_empty()
    }

    /// `host:port`, suitable for address resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_port() {
        let spec = ConnectionSpec::parse("deploy@example.com:2222").unwrap();
        assert_eq!(spec.user, "deploy");
        assert_eq!(spec.host, "example.com");
        assert_eq!(spec.port, 2222);
        assert!(spec.is_complete());
    }

    #[test]
    fn test_parse_default_port() {
        let spec = ConnectionSpec::parse("root@10.0.0.5").unwrap();
        assert_eq!(spec.user, "root");
        assert_eq!(spec.host, "10.0.0.5");
        assert_eq!(spec.port, DEFAULT_PORT);
    }

    #[test]
    fn test_parse_empty_is_not_an_error() {
        let spec = ConnectionSpec::parse("").unwrap();
        assert!(spec.host.is_empty());
        assert!(spec.user.is_empty());
        assert_eq!(spec.port, 22);
        assert!(!spec.is_complete());
    }

    #[test]
    fn test_parse_user_is_shortest_match() {
        let spec = ConnectionSpec::parse("a@b@c").unwrap();
        assert_eq!(spec.user, "a");
        assert_eq!(spec.host, "b@c");
    }

    #[test]
    fn test_parse_malformed() {
        for input in ["example.com", "@host", "user@", "user@host:abc", "user@host:22:33"] {
            let err = ConnectionSpec::parse(input).unwrap_err();
            assert!(
                matches!(err, DeployError::Config(_)),
                "expected config error for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_parse_port_out_of_range() {
        let err = ConnectionSpec::parse("u@h:70000").unwrap_err();
        assert!(err.to_string().contains("Invalid port"));
    }

    #[test]
    fn test_auth_resolve_prefers_key() {
        let auth = AuthMethod::resolve(Some("/keys/id_ed25519"), Some("hunter2"));
        assert_eq!(
            auth,
            AuthMethod::PrivateKey {
                path: PathBuf::from("/keys/id_ed25519"),
                passphrase: Some(Secret::new("hunter2")),
            }
        );
    }

    #[test]
    fn test_auth_resolve_password() {
        let auth = AuthMethod::resolve(None, Some("hunter2"));
        assert_eq!(auth, AuthMethod::Password(Secret::new("hunter2")));

        let auth = AuthMethod::resolve(Some(""), None);
        assert_eq!(auth, AuthMethod::Password(Secret::default()));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let auth = AuthMethod::Password(Secret::new("hunter2"));
        let debug = format!("{:?}", auth);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_display() {
        let spec = ConnectionSpec::parse("ci@build-01").unwrap();
        assert_eq!(spec.to_string(), "ci@build-01:22");
        assert_eq!(spec.address(), "build-01:22");
    }
}
