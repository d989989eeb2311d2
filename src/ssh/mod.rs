//! Pure Rust SSH transport for ssh-installer.
//!
//! ## Modules
//!
//! - [`config`] - Connection string parsing and credentials
//! - [`client`] - SSH connection management and authentication
//! - [`exec`] - Remote command execution
//! - [`sftp`] - Remote filesystem operations via SFTP

mod client;
pub mod config;
mod exec;
mod sftp;

// Re-exports for public API
pub use client::{load_private_key, SshClient};
pub use config::{AuthMethod, ConnectionSpec, Secret, DEFAULT_PORT};
pub use exec::ExecChannel;
pub use sftp::SftpClient;
