use anyhow::{Context, Result};
use clap::Parser;
use gmail_sheets_sync::cli::{self, Cli, Commands};
use std::fs::OpenOptions;
use std::process;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        eprintln!("\nFor help, run: gmail-sheets-sync --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    init_tracing(&cli)?;

    tracing::debug!("gmail-sheets-sync starting");

    match &cli.command {
        Commands::Run { json } => {
            let summary = cli::run_sync(&cli).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!("\n========================================");
            println!("Sync Summary");
            println!("========================================");
            println!("Run ID: {}", summary.run_id);
            println!(
                "Duration: {} seconds",
                (summary.finished_at - summary.started_at).num_seconds()
            );
            println!("Candidates: {}", summary.candidates());
            println!("Appended: {}", summary.appended());
            println!("Already processed: {}", summary.duplicates());
            println!("Failed: {}", summary.failures());
            println!("Mark-read failures: {}", summary.mark_read_failures());
            if summary.listing_failed {
                println!("Listing failed: no messages were processed");
            }
            if !summary.destination_ready {
                println!("Warning: destination sheet could not be verified");
            }
            if !summary.state_saved {
                println!("Warning: processed state was NOT saved");
            }
            println!("========================================");
            Ok(())
        }

        Commands::Auth { force } => {
            tracing::info!("Authenticating with Google...");
            let account = cli::authenticate(&cli, *force).await?;

            println!("Successfully authenticated with Gmail and Sheets");
            println!("Token cached at: {:?}", cli.token_cache);
            println!("Connected to account: {}", account);
            Ok(())
        }

        Commands::Status { rows } => {
            let report = cli::status(&cli, *rows).await?;

            println!("\n========================================");
            println!("Sync State");
            println!("========================================");
            if !report.state_file_exists {
                println!("No previous runs found.");
            }
            println!("State file: {:?}", cli.state_file);
            println!(
                "Processed ids tracked: {} (limit {})",
                report.state.len(),
                report.state.capacity()
            );
            match report.state.last_run() {
                Some(at) => println!("Last run: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("Last run: never"),
            }
            let recent: Vec<&str> = report.state.ids().collect();
            if !recent.is_empty() {
                println!("\nMost recent ids:");
                for id in recent.iter().rev().take(10) {
                    println!("  - {}", id);
                }
            }
            if let Some(count) = report.sheet_rows {
                println!("\nRows in sheet (excluding header): {}", count);
            }
            println!("========================================");
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            cli::init_config(output, *force).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file before the first run.");
            println!("Key settings to review:");
            println!("  - sheet.spreadsheet_id: Target spreadsheet (or SPREADSHEET_ID)");
            println!("  - sheet.sheet_name: Tab receiving the rows");
            println!("  - mailbox.query / mailbox.subject_filter: Which messages to copy");
            Ok(())
        }
    }
}

/// Console logging (plain or JSON) plus an optional plain-text log file
fn init_tracing(cli: &Cli) -> Result<()> {
    let default_directive = if cli.verbose {
        "gmail_sheets_sync=debug,info"
    } else {
        "gmail_sheets_sync=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if cli.json_logs {
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed(),
        );
    } else {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .boxed(),
        );
    }

    if let Some(path) = &cli.log_file {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {:?}", parent))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {:?}", path))?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .init();
    Ok(())
}
