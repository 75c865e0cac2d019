//! metasync command-line interface.

mod commands;
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "metasync")]
#[command(about = "Local-first metadata store with archive sync and collision checks")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.metasync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or hydrate an owner's store
    Ensure {
        owner: String,
    },
    /// Add a record, or overwrite the record holding the same name
    Add {
        owner: String,
        name: String,
        /// Size of the content in bytes
        #[arg(long)]
        size: u64,
        /// MIME type, e.g. image/jpeg
        #[arg(long)]
        media_type: String,
        /// Blob location of the original content
        #[arg(long)]
        location: String,
        /// Capture time (RFC 3339)
        #[arg(long)]
        created_at: Option<chrono::DateTime<chrono::Utc>>,
        /// Replace the content of an existing record with this name
        #[arg(long)]
        overwrite: bool,
    },
    /// List records, newest first
    List {
        owner: String,
        #[arg(long, default_value = "50")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
    },
    /// Find records whose name contains a pattern
    Search {
        owner: String,
        pattern: String,
        #[arg(long, default_value = "50")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
    },
    /// Check which names are already taken
    Probe {
        owner: String,
        #[arg(required = true)]
        names: Vec<String>,
        /// Fail instead of reporting unchecked names as degraded
        #[arg(long)]
        no_fallback: bool,
    },
    /// Delete a record by id
    Delete {
        owner: String,
        id: String,
    },
    /// Push the owner's store to the archive now
    Push {
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    commands::init_logging(cli.json_logs);

    let registry = commands::open_registry(cli.config.as_deref())?;
    let outcome = match cli.command {
        Commands::Ensure { owner } => commands::records::ensure(&registry, &owner).await,
        Commands::Add {
            owner,
            name,
            size,
            media_type,
            location,
            created_at,
            overwrite,
        } => {
            let input = commands::records::AddInput {
                name,
                size,
                media_type,
                location,
                created_at,
                overwrite,
            };
            commands::records::add(&registry, &owner, input).await
        },
        Commands::List {
            owner,
            limit,
            offset,
        } => commands::records::list(&registry, &owner, limit, offset).await,
        Commands::Search {
            owner,
            pattern,
            limit,
            offset,
        } => commands::records::search(&registry, &owner, &pattern, limit, offset).await,
        Commands::Probe {
            owner,
            names,
            no_fallback,
        } => commands::probe::execute(&registry, &owner, &names, !no_fallback).await,
        Commands::Delete { owner, id } => commands::records::delete(&registry, &owner, &id).await,
        Commands::Push { owner } => commands::sync::push(&registry, &owner).await,
    };

    registry.shutdown().await;
    outcome
}
