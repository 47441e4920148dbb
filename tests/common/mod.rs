//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_sheets_sync::error::{Result, SyncError};
use gmail_sheets_sync::mailbox::MailboxGateway;
use gmail_sheets_sync::models::{BodyPart, Destination, RawMessage, SheetRow};
use gmail_sheets_sync::retry::RetryPolicy;
use gmail_sheets_sync::sheets::SheetGateway;
use gmail_sheets_sync::sync::{SyncEngine, SyncOptions};
use mockall::mock;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Create a plain-text test message
pub fn create_test_message(id: &str, from: &str, subject: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        internal_date: None,
        from: Some(from.to_string()),
        subject: Some(subject.to_string()),
        date: Some("Mon, 1 Jan 2024 10:00:00 -0800".to_string()),
        body: Some(BodyPart::multipart(
            "multipart/alternative",
            vec![
                BodyPart::text("text/plain", &format!("Body of {}\n", subject)),
                BodyPart::text("text/html", &format!("<p>Body of {}</p>", subject)),
            ],
        )),
    }
}

/// Create an HTML-only test message
pub fn create_html_message(id: &str, subject: &str, html: &str) -> RawMessage {
    RawMessage {
        body: Some(BodyPart::text("text/html", html)),
        ..create_test_message(id, "Sender <sender@example.com>", subject)
    }
}

pub fn test_destination() -> Destination {
    Destination::new("spreadsheet-123", "Sheet1")
}

pub fn test_options(state_path: &Path) -> SyncOptions {
    SyncOptions {
        query: "is:unread in:inbox".to_string(),
        max_results: 50,
        remark_read_duplicates: true,
        state_path: state_path.to_path_buf(),
        max_tracked_ids: 1000,
    }
}

/// Engine over the given gateways with retries disabled
pub fn engine_with(
    mailbox: impl MailboxGateway + 'static,
    sheet: impl SheetGateway + 'static,
    options: SyncOptions,
) -> SyncEngine {
    SyncEngine::new(
        Box::new(mailbox),
        Box::new(sheet),
        test_destination(),
        RetryPolicy::no_retry(),
        options,
    )
}

// Mock implementations of the gateway traits for testing
mock! {
    pub Mailbox {}

    #[async_trait::async_trait]
    impl MailboxGateway for Mailbox {
        async fn authenticate(&self) -> Result<()>;
        async fn list_unread(&self, query: &str, max_results: u32) -> Result<Vec<String>>;
        async fn get_detail(&self, id: &str) -> Result<RawMessage>;
        async fn mark_read(&self, id: &str) -> Result<()>;
    }
}

mock! {
    pub Sheet {}

    #[async_trait::async_trait]
    impl SheetGateway for Sheet {
        async fn authenticate(&self) -> Result<()>;
        async fn ensure_sheet_and_headers(&self, destination: &Destination) -> Result<()>;
        async fn append_row(&self, destination: &Destination, row: &SheetRow) -> Result<()>;
        async fn read_rows(&self, destination: &Destination) -> Result<Vec<Vec<String>>>;
    }
}

/// In-memory inbox shared between a [`FakeMailbox`] and the test body
#[derive(Debug, Default)]
pub struct InboxState {
    /// Messages in listing order
    pub messages: Vec<RawMessage>,
    pub unread: HashSet<String>,
    pub fail_fetch: HashSet<String>,
    pub fail_mark_read: HashSet<String>,
    pub fail_list: bool,
    pub fail_auth: bool,
    pub fetch_calls: Vec<String>,
    pub mark_read_calls: Vec<String>,
}

/// Mailbox fake whose state survives across engine instances
#[derive(Clone, Default)]
pub struct FakeMailbox {
    pub state: Arc<Mutex<InboxState>>,
}

impl FakeMailbox {
    pub fn with_messages(messages: Vec<RawMessage>) -> Self {
        let fake = Self::default();
        for message in messages {
            fake.deliver(message);
        }
        fake
    }

    /// Add a new unread message to the inbox
    pub fn deliver(&self, message: RawMessage) {
        let mut state = self.state.lock().unwrap();
        state.unread.insert(message.id.clone());
        state.messages.push(message);
    }

    pub fn mark_unread(&self, id: &str) {
        self.state.lock().unwrap().unread.insert(id.to_string());
    }

    pub fn is_unread(&self, id: &str) -> bool {
        self.state.lock().unwrap().unread.contains(id)
    }

    pub fn inspect<R>(&self, f: impl FnOnce(&mut InboxState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl MailboxGateway for FakeMailbox {
    async fn authenticate(&self) -> Result<()> {
        if self.state.lock().unwrap().fail_auth {
            return Err(SyncError::AuthError("token revoked".to_string()));
        }
        Ok(())
    }

    async fn list_unread(&self, _query: &str, max_results: u32) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(SyncError::Forbidden("listing denied".to_string()));
        }
        Ok(state
            .messages
            .iter()
            .filter(|m| state.unread.contains(&m.id))
            .take(max_results as usize)
            .map(|m| m.id.clone())
            .collect())
    }

    async fn get_detail(&self, id: &str) -> Result<RawMessage> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls.push(id.to_string());
        if state.fail_fetch.contains(id) {
            return Err(SyncError::NotFound(id.to_string()));
        }
        state
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.mark_read_calls.push(id.to_string());
        if state.fail_mark_read.contains(id) {
            return Err(SyncError::Forbidden(format!("cannot modify {}", id)));
        }
        state.unread.remove(id);
        Ok(())
    }
}

/// In-memory spreadsheet shared between a [`FakeSheet`] and the test body
#[derive(Debug, Default)]
pub struct SheetState {
    pub header_written: bool,
    pub rows: Vec<SheetRow>,
    /// Appends of rows with these subjects fail
    pub fail_subjects: HashSet<String>,
    pub fail_ensure: bool,
    pub fail_auth: bool,
    pub append_calls: usize,
}

#[derive(Clone, Default)]
pub struct FakeSheet {
    pub state: Arc<Mutex<SheetState>>,
}

impl FakeSheet {
    pub fn rows(&self) -> Vec<SheetRow> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.rows().into_iter().map(|r| r.subject).collect()
    }

    pub fn inspect<R>(&self, f: impl FnOnce(&mut SheetState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl SheetGateway for FakeSheet {
    async fn authenticate(&self) -> Result<()> {
        if self.state.lock().unwrap().fail_auth {
            return Err(SyncError::AuthError("sheet token revoked".to_string()));
        }
        Ok(())
    }

    async fn ensure_sheet_and_headers(&self, _destination: &Destination) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_ensure {
            return Err(SyncError::Forbidden("no edit access".to_string()));
        }
        state.header_written = true;
        Ok(())
    }

    async fn append_row(&self, _destination: &Destination, row: &SheetRow) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.append_calls += 1;
        if state.fail_subjects.contains(&row.subject) {
            return Err(SyncError::BadRequest(format!("rejected {}", row.subject)));
        }
        state.rows.push(row.clone());
        Ok(())
    }

    async fn read_rows(&self, _destination: &Destination) -> Result<Vec<Vec<String>>> {
        let state = self.state.lock().unwrap();
        let mut rows = Vec::new();
        if state.header_written {
            rows.push(
                SheetRow::header()
                    .cells()
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
            );
        }
        rows.extend(
            state
                .rows
                .iter()
                .map(|r| r.cells().iter().map(|c| c.to_string()).collect()),
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_message() {
        let msg = create_test_message("msg1", "test@example.com", "Test Subject");
        assert_eq!(msg.id, "msg1");
        assert_eq!(msg.from.as_deref(), Some("test@example.com"));
        assert_eq!(msg.subject.as_deref(), Some("Test Subject"));
        assert_eq!(msg.body.unwrap().parts.len(), 2);
    }

    #[tokio::test]
    async fn test_fake_mailbox_lists_only_unread() {
        let mailbox = FakeMailbox::with_messages(vec![
            create_test_message("a", "x@y.com", "A"),
            create_test_message("b", "x@y.com", "B"),
        ]);
        mailbox.mark_read("a").await.unwrap();
        assert_eq!(mailbox.list_unread("", 10).await.unwrap(), vec!["b"]);
        assert_eq!(mailbox.list_unread("", 0).await.unwrap(), Vec::<String>::new());
    }
}
