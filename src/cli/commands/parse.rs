use console::style;

use ssh_installer::error::Result;
use ssh_installer::ssh::ConnectionSpec;

pub fn execute(connection: &str) -> Result<()> {
    let spec = ConnectionSpec::parse(connection)?;

    println!("  {:<6} {}", style("user").dim(), spec.user);
    println!("  {:<6} {}", style("host").dim(), spec.host);
    println!("  {:<6} {}", style("port").dim(), spec.port);

    if !spec.is_complete() {
        println!("  {}", style("(empty connection string)").yellow());
    }

    Ok(())
}
