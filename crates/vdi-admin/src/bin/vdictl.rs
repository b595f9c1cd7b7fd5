//! vdictl binary entry point
//!
//! Runs one administrative command against the configured Sheepdog cluster.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vdi_admin::{run, Cli};
use vdi_core::StoreConfig;
use vdi_storage::SheepdogStore;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "vdictl=debug,vdi_admin=debug,vdi_storage=debug,vdi_core=debug"
    } else {
        "vdictl=info,vdi_admin=info,vdi_storage=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::default(),
    };
    tracing::debug!(address = %config.address, port = config.port, "Using Sheepdog cluster");

    let store = SheepdogStore::new(config)?;
    let stdout = std::io::stdout();
    run(&store, cli.command, &mut stdout.lock())?;

    Ok(())
}
