//! Gmail to Google Sheets Sync
//!
//! A batch job that appends unread Gmail messages to a Google Sheet, one row
//! per message, marks them read and remembers what it already wrote so a
//! message is never appended twice.
//!
//! # Overview
//!
//! - **Retry**: exponential backoff for transient API failures
//! - **Normalization**: sender, subject, canonical date and plain-text body
//! - **State**: bounded, atomically saved record of processed message ids
//! - **Sync**: the per-run sequence fetch, append, mark read, record
//! - **Gateways**: narrow traits over Gmail and Sheets, with Google-backed implementations
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_sheets_sync::{
//!     auth::GoogleAuth, config::Config, mailbox::GmailMailbox, retry::RetryPolicy,
//!     sheets::GoogleSheet, sync::{SyncEngine, SyncOptions},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(".gmail-sheets-sync/config.toml".as_ref()).await?;
//!     let auth = GoogleAuth::new(
//!         ".gmail-sheets-sync/credentials.json".as_ref(),
//!         ".gmail-sheets-sync/token.json".as_ref(),
//!     )
//!     .await?;
//!
//!     let engine = SyncEngine::new(
//!         Box::new(GmailMailbox::new(&auth)?),
//!         Box::new(GoogleSheet::new(&auth)?),
//!         config.destination(),
//!         RetryPolicy::from(&config.retry),
//!         SyncOptions::from_config(&config, ".gmail-sheets-sync/state.json".into()),
//!     );
//!
//!     let summary = engine.run().await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication shared by both Google APIs
//! - [`cli`] - Command-line interface and command handlers
//! - [`config`] - Configuration file, environment overrides, validation
//! - [`error`] - Error types, failure classification and result alias
//! - [`mailbox`] - Mailbox gateway trait and Gmail implementation
//! - [`models`] - Core data structures
//! - [`normalize`] - Message to row conversion
//! - [`retry`] - Retry policy
//! - [`sheets`] - Sheet gateway trait and Google Sheets implementation
//! - [`state`] - Processed-message store
//! - [`sync`] - Run orchestration

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod models;
pub mod normalize;
pub mod retry;
pub mod sheets;
pub mod state;
pub mod sync;

// Re-export commonly used types for convenience
pub use error::{FailureKind, Result, SyncError};

// Core data models
pub use models::{BodyPart, Destination, NormalizedRecord, RawMessage, SheetRow};

// Config types
pub use config::{Config, MailboxConfig, RetryConfig, SheetConfig, StateConfig};

// Gateway traits
pub use mailbox::{GmailMailbox, MailboxGateway};
pub use sheets::{GoogleSheet, SheetGateway};

// Orchestration
pub use retry::RetryPolicy;
pub use state::ProcessedSet;
pub use sync::{MessageOutcome, RunSummary, SyncEngine, SyncOptions};

// CLI types (for binary usage)
pub use cli::{Cli, Commands};
