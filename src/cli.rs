//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::auth::GoogleAuth;
use crate::config::Config;
use crate::error::Result;
use crate::mailbox::GmailMailbox;
use crate::retry::RetryPolicy;
use crate::sheets::{GoogleSheet, SheetGateway};
use crate::state::ProcessedSet;
use crate::sync::{RunSummary, SyncEngine, SyncOptions};

#[derive(Parser, Debug)]
#[command(name = "gmail-sheets-sync")]
#[command(version)]
#[command(about = "Append unread Gmail messages to a Google Sheet, once each", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = ".gmail-sheets-sync/config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 client secret file
    #[arg(long, default_value = ".gmail-sheets-sync/credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-sheets-sync/token.json")]
    pub token_cache: PathBuf,

    /// Path to processed-message state file
    #[arg(long, default_value = ".gmail-sheets-sync/state.json")]
    pub state_file: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one synchronization pass
    Run {
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Authenticate with Google (Gmail and Sheets)
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Show processed-message state
    Status {
        /// Also count rows in the destination sheet
        #[arg(long)]
        rows: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = ".gmail-sheets-sync/config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// State file contents plus, optionally, the destination row count
#[derive(Debug)]
pub struct StatusReport {
    pub state: ProcessedSet,
    pub state_file_exists: bool,
    /// Data rows below the header, when requested
    pub sheet_rows: Option<usize>,
}

/// Load config, wire the Google gateways and run one pass
pub async fn run_sync(cli: &Cli) -> Result<RunSummary> {
    let config = Config::load(&cli.config).await?;
    let auth = GoogleAuth::new(&cli.credentials, &cli.token_cache).await?;

    let engine = SyncEngine::new(
        Box::new(GmailMailbox::new(&auth)?),
        Box::new(GoogleSheet::new(&auth)?),
        config.destination(),
        RetryPolicy::from(&config.retry),
        SyncOptions::from_config(&config, cli.state_file.clone()),
    );

    engine.run().await
}

/// Run the OAuth flow and return the connected account address
pub async fn authenticate(cli: &Cli, force: bool) -> Result<String> {
    if force && cli.token_cache.exists() {
        tokio::fs::remove_file(&cli.token_cache).await?;
        info!("Removed existing token cache");
    }

    let auth = GoogleAuth::new(&cli.credentials, &cli.token_cache).await?;
    auth.authorize_all().await?;

    GmailMailbox::new(&auth)?.account_email().await
}

pub async fn status(cli: &Cli, with_rows: bool) -> Result<StatusReport> {
    let config = Config::load(&cli.config).await?;
    let state = ProcessedSet::load(&cli.state_file, config.state.max_tracked_ids).await;

    let sheet_rows = if with_rows {
        let auth = GoogleAuth::new(&cli.credentials, &cli.token_cache).await?;
        let sheet = GoogleSheet::new(&auth)?;
        sheet.authenticate().await?;
        let rows = sheet.read_rows(&config.destination()).await?;
        Some(rows.len().saturating_sub(1))
    } else {
        None
    };

    Ok(StatusReport {
        state,
        state_file_exists: cli.state_file.exists(),
        sheet_rows,
    })
}

/// Write a default config file; refuses to overwrite unless `force`
pub async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(crate::error::SyncError::ConfigError(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        )));
    }
    Config::create_example(output).await
}
