// [apps/netmon-server/src/main.rs]
//! Binary entry point: loads configuration, initializes tracing, and
//! ignites the kernel.

use netmon_server::prelude::*;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async {
        let config = match netmon_config::NetmonConfig::from_env() {
            Ok(config) => config,
            Err(err) => {
                eprintln!("fatal: invalid configuration: {err}");
                std::process::exit(1);
            }
        };

        netmon_telemetry::init_tracing("netmon_server");
        info!("netmon core igniting");

        let kernel = match NetmonKernel::ignite(config).await {
            Ok(kernel) => kernel,
            Err(err) => {
                error!(error = %err, "kernel ignition failed");
                std::process::exit(1);
            }
        };

        kernel.launch().await
    })
}
