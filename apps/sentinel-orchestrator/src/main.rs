use sentinel_orchestrator::prelude::*;

use dotenvy::dotenv;
use sentinel_telemetry::init_tracing;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing("sentinel-orchestrator");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let config = match OrchestratorConfig::from_env() {
            Ok(config) => config,
            Err(err) => {
                error!(error = %err, "fatal configuration error, exiting before ignition");
                std::process::exit(1);
            }
        };

        let kernel = match OrchestratorKernel::ignite(&config).await {
            Ok(kernel) => kernel,
            Err(err) => {
                error!(error = %err, "fatal error during ignition, exiting");
                std::process::exit(1);
            }
        };

        info!("sentinel-orchestrator starting");
        if let Err(err) = kernel.launch().await {
            error!(error = %err, "orchestrator exited with error");
            std::process::exit(1);
        }
    });

    Ok(())
}
