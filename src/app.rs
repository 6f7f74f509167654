pub mod catalog;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod formatter;
pub mod inspector;
pub mod models;
pub mod resolver;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use self::catalog::{ExtractOptions, SchemaCatalog, Target};
use self::cli::{Cli, Format};
use self::config::{resolve_config, AppConfig};
use self::formatter::OutputGenerator;

// Connects, extracts, and formats in one go.
pub async fn generate_report(config: &AppConfig) -> Result<String> {
    let options = ExtractOptions {
        schema: config.schema.clone(),
        statement_timeout: config.statement_timeout,
    };

    // 1. Connect (and, for a server, authenticate and extract)
    let catalog = match &config.target {
        Target::File(path) => {
            let mut catalog = SchemaCatalog::open_sqlite(path, options)
                .await
                .context("Failed to open database file")?;
            catalog.extract().await.context("Failed to extract schema")?;
            catalog
        }
        Target::Server(address) => {
            let catalog = SchemaCatalog::postgres(address.clone(), config.credentials.clone(), options)
                .await
                .context("Failed to extract schema")?;
            anyhow::ensure!(catalog.connected(), "Failed to connect to {}", config.target);
            catalog
        }
    };

    // 2. Format
    let mut visible = catalog.schema().clone();
    visible
        .tables
        .retain(|name, _| !config.ignore_tables.contains(name));
    let output = match config.format {
        Format::Text => formatter::describe_catalog(&config.db_name, &visible),
        Format::Markdown => OutputGenerator::generate_markdown(&config.db_name, &visible)?,
    };

    // 3. Release the connection
    catalog.close().await.context("Failed to close connection")?;

    Ok(output)
}

pub async fn run() -> Result<()> {
    // 1. Parse Args
    let args = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // 2. Resolve Config
    let config = resolve_config(args)?;

    // 3. Generate
    let output = generate_report(&config).await?;

    // 4. Output
    print!("{}", output);

    Ok(())
}
