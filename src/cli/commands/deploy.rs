use std::path::PathBuf;

use console::style;
use tokio::sync::watch;

use ssh_installer::deploy::{BuildContext, BuildParameters, ConsoleSink, Deployer, Deployment};
use ssh_installer::error::Result;
use ssh_installer::{DeploymentConfig, DeploymentResult};

use crate::cli::PhaseSelection;

pub async fn execute(
    config: DeploymentConfig,
    workspace: PathBuf,
    params: BuildParameters,
    phase: PhaseSelection,
    json: bool,
) -> Result<()> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling deployment");
            let _ = cancel_tx.send(true);
        }
    });

    let deployment = Deployment::new(config).with_cancellation(cancel_rx);
    let ctx = BuildContext::new(workspace, params);
    let sink = ConsoleSink;

    let outcome = match phase {
        PhaseSelection::Prepare => {
            deployment.prepare(&ctx, &sink).await?;
            eprintln!("{} Staging complete", style("✓").green().bold());
            return Ok(());
        }
        PhaseSelection::Execute => deployment.execute(&ctx, &sink).await,
        PhaseSelection::All => deployment.deploy(&ctx, &sink).await,
    };

    match outcome {
        Ok(result) => {
            print_result(&result, json)?;
            eprintln!("{} Deployment succeeded", style("✓").green().bold());
            Ok(())
        }
        Err(e) => {
            if let Some(partial) = DeploymentResult::from_remote_failure(&e) {
                print_result(&partial, json)?;
            }
            Err(e)
        }
    }
}

fn print_result(result: &DeploymentResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print!("{}", result.stdout);
    }
    Ok(())
}
