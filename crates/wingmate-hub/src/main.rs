//! Wingmate session hub binary.
//!
//! ```bash
//! wingmate-hub --port 6826
//! ```

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wingmate_core::env::SystemEnvironment;
use wingmate_hub::HubDriver;

/// Group-flying session hub.
#[derive(Parser, Debug)]
#[command(name = "wingmate-hub")]
#[command(about = "Session hub for group-flying coordination")]
#[command(version)]
struct Args {
    /// UDP port to bind.
    #[arg(short, long, default_value = "6826")]
    port: u16,

    /// Opaque passcode carried alongside sessions; not validated here.
    #[arg(long)]
    passcode: Option<String>,

    /// Directory for the optional per-datagram packet log.
    #[arg(long)]
    log_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    if args.passcode.is_some() {
        tracing::info!("passcode configured (carried as opaque metadata, not validated)");
    }

    let addr = format!("0.0.0.0:{}", args.port).parse()?;
    let driver = HubDriver::bind(addr, SystemEnvironment, args.log_dir.as_deref()).await?;
    tracing::info!(addr = %driver.local_addr(), "hub listening");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("shutting down");
        },
        () = wait_for_death(&driver) => {
            if let Some(error) = driver.take_fault() {
                tracing::error!(%error, "hub terminated");
            }
        },
    }
    driver.shutdown().await;

    Ok(())
}

/// Poll for the driver task having died on its own (a transport fault).
async fn wait_for_death(driver: &HubDriver) {
    loop {
        if driver.is_dead() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}
