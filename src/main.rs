//! Two-phase commit coordinator walkthrough
//!
//! Usage: `tpc [settings.yaml]`

use tpc::{Settings, bootstrap, demo};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    bootstrap::init_tracing();

    let path = std::env::args().nth(1);
    let settings = Settings::load(path.as_deref())?;
    tracing::info!(log_dir = %settings.log_dir.display(), "Loaded settings");

    let report = demo::run(&settings).await?;
    tracing::info!(?report, "Walkthrough finished");

    Ok(())
}
