//! Mailbox gateway: candidate listing, message retrieval and read-marking

use async_trait::async_trait;
use chrono::DateTime;
use google_gmail1::api::{Message, MessagePart, ModifyMessageRequest};
use tracing::debug;

use crate::auth::{GmailHub, GoogleAuth, GMAIL_SCOPE};
use crate::config::MAX_RESULTS_LIMIT;
use crate::error::{Result, SyncError};
use crate::models::{BodyPart, RawMessage};

/// Label Gmail uses to flag unread messages
pub const UNREAD_LABEL: &str = "UNREAD";

/// Operations the sync needs from a mailbox provider
#[async_trait]
pub trait MailboxGateway: Send + Sync {
    /// Make sure a usable credential exists for the mailbox scope
    async fn authenticate(&self) -> Result<()>;

    /// Ids of messages matching `query`, newest first, at most `max_results`
    async fn list_unread(&self, query: &str, max_results: u32) -> Result<Vec<String>>;

    /// Full message: headers, internal date and body tree
    async fn get_detail(&self, id: &str) -> Result<RawMessage>;

    /// Clear the unread flag
    async fn mark_read(&self, id: &str) -> Result<()>;
}

/// Gmail-backed mailbox for the authenticated user
pub struct GmailMailbox {
    hub: GmailHub,
    auth: GoogleAuth,
}

impl GmailMailbox {
    pub fn new(auth: &GoogleAuth) -> Result<Self> {
        Ok(Self {
            hub: auth.gmail_hub()?,
            auth: auth.clone(),
        })
    }

    /// Address of the account the token belongs to
    pub async fn account_email(&self) -> Result<String> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile("me")
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await?;

        profile
            .email_address
            .ok_or_else(|| SyncError::InvalidMessageFormat("Profile has no email address".to_string()))
    }
}

#[async_trait]
impl MailboxGateway for GmailMailbox {
    async fn authenticate(&self) -> Result<()> {
        // Both scopes at once; the cached token then serves either hub
        self.auth.authorize_all().await
    }

    async fn list_unread(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        let wanted = max_results as usize;
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        while all_ids.len() < wanted {
            let remaining = (wanted - all_ids.len()).min(MAX_RESULTS_LIMIT as usize);
            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .q(query)
                .max_results(remaining as u32);

            if let Some(token) = page_token.as_ref() {
                call = call.page_token(token);
            }

            let (_, response) = call.add_scope(GMAIL_SCOPE).doit().await?;

            if let Some(messages) = response.messages {
                all_ids.extend(messages.into_iter().filter_map(|msg_ref| msg_ref.id));
            }

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        all_ids.truncate(wanted);
        debug!("Listed {} message(s) for query {:?}", all_ids.len(), query);
        Ok(all_ids)
    }

    async fn get_detail(&self, id: &str) -> Result<RawMessage> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await?;

        Ok(raw_message_from(id, message))
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        let modify_request = ModifyMessageRequest {
            add_label_ids: None,
            remove_label_ids: Some(vec![UNREAD_LABEL.to_string()]),
        };

        self.hub
            .users()
            .messages_modify(modify_request, "me", id)
            .add_scope(GMAIL_SCOPE)
            .doit()
            .await?;

        Ok(())
    }
}

/// Convert a Gmail API message into the provider-neutral shape
///
/// `requested_id` is used when the response omits the id.
pub fn raw_message_from(requested_id: &str, message: Message) -> RawMessage {
    let mut raw = RawMessage {
        id: message.id.unwrap_or_else(|| requested_id.to_string()),
        internal_date: message.internal_date.and_then(DateTime::from_timestamp_millis),
        ..Default::default()
    };

    if let Some(payload) = message.payload {
        for header in payload.headers.iter().flatten() {
            if let (Some(name), Some(value)) = (&header.name, &header.value) {
                let slot = match name.to_lowercase().as_str() {
                    "from" => &mut raw.from,
                    "subject" => &mut raw.subject,
                    "date" => &mut raw.date,
                    _ => continue,
                };
                // First occurrence wins
                if slot.is_none() {
                    *slot = Some(value.clone());
                }
            }
        }
        raw.body = Some(body_part_from(payload));
    }

    raw
}

fn body_part_from(part: MessagePart) -> BodyPart {
    // The generated client already decodes the base64url body into bytes
    let data = part
        .body
        .and_then(|body| body.data)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

    BodyPart {
        mime_type: part.mime_type.unwrap_or_default(),
        data,
        parts: part
            .parts
            .unwrap_or_default()
            .into_iter()
            .map(body_part_from)
            .collect(),
    }
}
