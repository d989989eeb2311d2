//! Deploy a build to a remote host over SSH.
//!
//! A run recreates a per-node staging directory over SFTP, uploads the build
//! workspace, writes the build parameters as a properties file and finally
//! runs an operator-supplied command in that directory. See [`deploy`] for the
//! phase sequence.

pub mod config;
pub mod deploy;
pub mod error;
pub mod ssh;

pub use config::DeploymentConfig;
pub use deploy::{BuildContext, Deployer, Deployment, DeploymentResult};
pub use error::{DeployError, Result};
