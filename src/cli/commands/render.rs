use console::style;

use ssh_installer::deploy::{BuildParameters, Deployment};
use ssh_installer::error::Result;
use ssh_installer::DeploymentConfig;

pub fn execute(config: DeploymentConfig, params: &BuildParameters) -> Result<()> {
    let deployment = Deployment::new(config);

    let resolved = deployment.resolved_command(params)?;
    let remote = deployment.remote_command(params)?;

    println!("{}", style("Staging directory").bold());
    println!("  {}", deployment.config().staging_dir());
    println!("{}", style("Resolved command").bold());
    println!("  {}", resolved);
    println!("{}", style("Remote command").bold());
    println!("  {}", remote);

    Ok(())
}
