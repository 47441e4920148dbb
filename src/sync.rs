//! One synchronization pass: list, append, mark read, record
//!
//! Per message the order is fetch, normalize, append, mark read, record. The
//! append is the only step that cannot be undone, so a message is recorded
//! as processed only once its row exists, and a failed append leaves the
//! message unread for the next run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::mailbox::MailboxGateway;
use crate::models::Destination;
use crate::normalize::{extract_sender_email, normalize};
use crate::retry::RetryPolicy;
use crate::sheets::SheetGateway;
use crate::state::ProcessedSet;

/// Run parameters that are not part of the destination or retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Full mailbox query, subject filter already applied
    pub query: String,
    pub max_results: u32,
    pub remark_read_duplicates: bool,
    pub state_path: PathBuf,
    pub max_tracked_ids: usize,
}

impl SyncOptions {
    pub fn from_config(config: &Config, state_path: PathBuf) -> Self {
        Self {
            query: config.build_query(),
            max_results: config.mailbox.max_results,
            remark_read_duplicates: config.mailbox.remark_read_duplicates,
            state_path,
            max_tracked_ids: config.state.max_tracked_ids,
        }
    }
}

/// What happened to one candidate message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    /// Row appended and id recorded; `marked_read` is false if clearing UNREAD failed
    Appended { id: String, marked_read: bool },
    /// Already recorded by an earlier run; `remarked_read` is set when a mark-read was retried
    Duplicate {
        id: String,
        remarked_read: Option<bool>,
    },
    /// Detail could not be retrieved; left untouched
    FetchFailed { id: String, error: String },
    /// Row could not be appended; left unread and unrecorded
    AppendFailed { id: String, error: String },
}

impl MessageOutcome {
    pub fn id(&self) -> &str {
        match self {
            MessageOutcome::Appended { id, .. }
            | MessageOutcome::Duplicate { id, .. }
            | MessageOutcome::FetchFailed { id, .. }
            | MessageOutcome::AppendFailed { id, .. } => id,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            MessageOutcome::FetchFailed { .. } | MessageOutcome::AppendFailed { .. }
        )
    }
}

/// Result of one [`SyncEngine::run`]
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sheet tab and header were confirmed before processing
    pub destination_ready: bool,
    /// Listing gave up; no candidates were processed
    pub listing_failed: bool,
    /// Processed set was written back to disk
    pub state_saved: bool,
    pub outcomes: Vec<MessageOutcome>,
}

impl RunSummary {
    pub fn candidates(&self) -> usize {
        self.outcomes.len()
    }

    pub fn appended(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Appended { .. }))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Duplicate { .. }))
    }

    pub fn failures(&self) -> usize {
        self.count(MessageOutcome::is_failure)
    }

    pub fn mark_read_failures(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                MessageOutcome::Appended {
                    marked_read: false,
                    ..
                } | MessageOutcome::Duplicate {
                    remarked_read: Some(false),
                    ..
                }
            )
        })
    }

    /// Ids appended during this run, in processing order
    pub fn appended_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MessageOutcome::Appended { .. }))
            .map(MessageOutcome::id)
            .collect()
    }

    fn count(&self, predicate: impl Fn(&MessageOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(*o)).count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} candidate(s): {} appended, {} duplicate(s), {} failed, {} mark-read failure(s)",
            self.candidates(),
            self.appended(),
            self.duplicates(),
            self.failures(),
            self.mark_read_failures()
        )?;
        if self.listing_failed {
            write!(f, " [listing failed]")?;
        }
        if !self.destination_ready {
            write!(f, " [destination not verified]")?;
        }
        if !self.state_saved {
            write!(f, " [state NOT saved]")?;
        }
        Ok(())
    }
}

/// Drives one pass from mailbox to sheet
pub struct SyncEngine {
    mailbox: Box<dyn MailboxGateway>,
    sheet: Box<dyn SheetGateway>,
    destination: Destination,
    retry: RetryPolicy,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        mailbox: Box<dyn MailboxGateway>,
        sheet: Box<dyn SheetGateway>,
        destination: Destination,
        retry: RetryPolicy,
        options: SyncOptions,
    ) -> Self {
        Self {
            mailbox,
            sheet,
            destination,
            retry,
            options,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Run one synchronization pass
    ///
    /// Returns `Err` only when the destination is not configured or
    /// authentication fails; every other failure is contained and reported in
    /// the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        validate_destination(&self.destination)?;

        let mut state =
            ProcessedSet::load(&self.options.state_path, self.options.max_tracked_ids).await;
        info!(
            run_id = %run_id,
            "Starting sync into '{}' ({} ids already processed)",
            self.destination.sheet_name,
            state.len()
        );

        self.authenticate().await?;

        let destination_ready = match self
            .retry
            .run("ensure_sheet_and_headers", || {
                self.sheet.ensure_sheet_and_headers(&self.destination)
            })
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("Could not prepare sheet '{}': {}", self.destination.sheet_name, e);
                false
            }
        };

        let (candidates, listing_failed) = match self
            .retry
            .run("list_unread", || {
                self.mailbox
                    .list_unread(&self.options.query, self.options.max_results)
            })
            .await
        {
            Ok(ids) => (dedupe_candidates(ids), false),
            Err(e) => {
                error!("Listing messages failed: {}", e);
                (Vec::new(), true)
            }
        };
        info!("Found {} candidate message(s)", candidates.len());

        let mut outcomes = Vec::with_capacity(candidates.len());
        for id in &candidates {
            outcomes.push(self.process_one(&mut state, id).await);
        }

        state.update_last_run(Utc::now());
        let state_saved = match state.save(&self.options.state_path).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed to save processed state to {:?}: {}",
                    self.options.state_path, e
                );
                false
            }
        };

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            destination_ready,
            listing_failed,
            state_saved,
            outcomes,
        };
        info!(run_id = %summary.run_id, "Sync finished: {}", summary);
        Ok(summary)
    }

    async fn authenticate(&self) -> Result<()> {
        self.mailbox
            .authenticate()
            .await
            .map_err(|e| auth_failure("mailbox", e))?;
        self.sheet
            .authenticate()
            .await
            .map_err(|e| auth_failure("sheet", e))?;
        debug!("Authenticated mailbox and sheet");
        Ok(())
    }

    async fn process_one(&self, state: &mut ProcessedSet, id: &str) -> MessageOutcome {
        if state.is_processed(id) {
            debug!("Skipping {}: already processed", id);
            let remarked_read = if self.options.remark_read_duplicates {
                Some(self.mark_read(id).await)
            } else {
                None
            };
            return MessageOutcome::Duplicate {
                id: id.to_string(),
                remarked_read,
            };
        }

        let raw = match self
            .retry
            .run("get_detail", || self.mailbox.get_detail(id))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to fetch message {}: {}", id, e);
                return MessageOutcome::FetchFailed {
                    id: id.to_string(),
                    error: e.to_string(),
                };
            }
        };

        let record = normalize(&raw);
        let row = record.to_row();
        debug!(
            "Message {} from {} ({:?})",
            id,
            extract_sender_email(&record.from),
            record.subject
        );

        if let Err(e) = self
            .retry
            .run("append_row", || self.sheet.append_row(&self.destination, &row))
            .await
        {
            error!("Failed to append message {}: {}", id, e);
            return MessageOutcome::AppendFailed {
                id: id.to_string(),
                error: e.to_string(),
            };
        }

        let marked_read = self.mark_read(id).await;
        state.mark_processed(id);
        info!("Appended message {}", id);

        MessageOutcome::Appended {
            id: id.to_string(),
            marked_read,
        }
    }

    async fn mark_read(&self, id: &str) -> bool {
        match self
            .retry
            .run("mark_read", || self.mailbox.mark_read(id))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to mark message {} as read: {}", id, e);
                false
            }
        }
    }
}

fn validate_destination(destination: &Destination) -> Result<()> {
    if destination.spreadsheet_id.trim().is_empty() {
        return Err(SyncError::ConfigError(
            "sheet.spreadsheet_id is not set (config file or SPREADSHEET_ID)".to_string(),
        ));
    }
    if destination.sheet_name.trim().is_empty() {
        return Err(SyncError::ConfigError(
            "sheet.sheet_name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn auth_failure(gateway: &str, e: SyncError) -> SyncError {
    error!("Authentication with the {} failed: {}", gateway, e);
    match e {
        SyncError::AuthError(_) | SyncError::ConfigError(_) => e,
        other => SyncError::AuthError(format!("{} authentication failed: {}", gateway, other)),
    }
}

/// Drop empty ids and repeats, keeping listing order
fn dedupe_candidates(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}
