use agilewatch::config::Config;
use agilewatch::control::LoggingController;
use agilewatch::octopus::OctopusClient;
use agilewatch::scheduler::{Scheduler, SystemClock};
use anyhow::{Context, Result};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    agilewatch::logging::init_logging(&config.logging).context("Failed to initialise logging")?;

    info!(
        "agilewatch {} starting (region {}, serial {})",
        agilewatch::APP_VERSION,
        config.octopus.region,
        config.octopus.serial_no
    );

    let tz = config.tz()?;
    let client = OctopusClient::from_config(&config.octopus)?;
    let controller = LoggingController::new(&config.octopus.serial_no);
    let mut scheduler = Scheduler::new(
        client,
        controller,
        SystemClock,
        tz,
        config.scheduler.clone(),
    );

    match scheduler.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Polling loop stopped: {}", e);
            Err(anyhow::anyhow!("Polling loop error: {}", e))
        }
    }
}
