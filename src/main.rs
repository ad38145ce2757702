mod api;
#[cfg(feature = "cli")]
mod cli;
mod config;
mod error;
mod export;
mod ingest;
mod ledger;
mod logging;
mod models;
mod parser;
mod ui;

use anyhow::{Context, Result};
use config::Config;
use ui::App;

#[tokio::main]
async fn main() -> Result<()> {
    // Arguments are parsed before any configuration loads
    #[cfg(feature = "cli")]
    {
        if let Some(command) = cli::parse() {
            return cli::run(command).await;
        }
    }

    let (config, client) = connect()?;

    // Start TUI application
    let mut app = App::new(client, config.export_dir);
    app.run().await?;

    Ok(())
}

/// Load configuration, start logging and build the API client.
fn connect() -> Result<(Config, api::AcademyClient)> {
    let config = Config::load().context("Failed to load configuration")?;
    logging::init(&config.log_file)?;

    // The client owns the auth token; nothing global is mutated
    let client = api::AcademyClient::new(&config)?;
    Ok((config, client))
}
