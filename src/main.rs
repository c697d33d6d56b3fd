use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{BackupCommand, ConfigCommand, DocCommand, StatusCommand, TagCommand};
use config::Config;
use margin_core::{DiskDatastore, PersistenceLayer};

#[derive(Parser)]
#[command(name = "margin")]
#[command(version)]
#[command(about = "A document annotation repository", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage documents in the repository
    Doc(DocCommand),

    /// Manage document tags and the tag index
    Tag(TagCommand),

    /// Back up the repository
    Backup(BackupCommand),

    /// Show repository status
    Status(StatusCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "margin=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Doc(cmd)) => {
            let layer = open_layer(&config).await?;
            cmd.run(&layer).await?;
            layer.stop().await?;
        }
        Some(Commands::Tag(cmd)) => {
            let layer = open_layer(&config).await?;
            cmd.run(&layer).await?;
            layer.stop().await?;
        }
        Some(Commands::Backup(cmd)) => {
            let layer = open_layer(&config).await?;
            cmd.run(&layer).await?;
            layer.stop().await?;
        }
        Some(Commands::Status(cmd)) => {
            let layer = open_layer(&config).await?;
            cmd.run(&layer).await?;
            layer.stop().await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

async fn open_layer(config: &Config) -> Result<PersistenceLayer, Box<dyn std::error::Error>> {
    let datastore = Arc::new(DiskDatastore::new(config.data_dir.clone()));
    let layer = PersistenceLayer::new(datastore);
    layer.init().await?;
    tracing::debug!(data_dir = %config.data_dir.display(), "opened repository");
    Ok(layer)
}
