//! Conversion of provider messages into sheet records
//!
//! Everything here is total: missing headers become empty strings, an
//! unparseable date is passed through verbatim and a body without any text
//! part yields empty content.

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{BodyPart, NormalizedRecord, RawMessage};

/// Canonical date format written to the sheet
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Simple tag-removal pass; not an HTML parser
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<]+?>").expect("valid regex"));

/// First angle-bracketed address in a From header
static ANGLE_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(.+?)>").expect("valid regex"));

/// Trailing zone comment such as `(PST)` or `(UTC)`
static TRAILING_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^()]*\)\s*$").expect("valid regex"));

/// Normalize a raw message into the record appended to the sheet
pub fn normalize(message: &RawMessage) -> NormalizedRecord {
    NormalizedRecord {
        id: message.id.clone(),
        from: message.from.clone().unwrap_or_default(),
        subject: message.subject.clone().unwrap_or_default(),
        date: format_date(message.date.as_deref().unwrap_or("")),
        content: message
            .body
            .as_ref()
            .map(extract_body)
            .unwrap_or_default(),
    }
}

/// Format an RFC 2822 date as `YYYY-MM-DD HH:MM:SS` in the sender's offset
///
/// Returns the input unchanged when it cannot be parsed.
pub fn format_date(date_str: &str) -> String {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let parsed = DateTime::parse_from_rfc2822(trimmed).or_else(|_| {
        let without_comment = TRAILING_COMMENT.replace(trimmed, "");
        DateTime::parse_from_rfc2822(&without_comment)
    });

    match parsed {
        Ok(dt) => dt.format(DATE_FORMAT).to_string(),
        Err(_) => date_str.to_string(),
    }
}

/// Pick the message text: first `text/plain` part, else first `text/html` with tags removed
pub fn extract_body(root: &BodyPart) -> String {
    if let Some(text) = find_part(root, "text/plain") {
        return text.trim().to_string();
    }
    if let Some(html) = find_part(root, "text/html") {
        return strip_html_tags(html).trim().to_string();
    }
    String::new()
}

/// Depth-first search for the first part of `mime_type` carrying non-empty data
fn find_part<'a>(part: &'a BodyPart, mime_type: &str) -> Option<&'a str> {
    if part.essence() == mime_type {
        if let Some(data) = part.data.as_deref().filter(|d| !d.is_empty()) {
            return Some(data);
        }
    }
    part.parts
        .iter()
        .find_map(|child| find_part(child, mime_type))
}

/// Remove anything that looks like a tag; entities are left as-is
pub fn strip_html_tags(html: &str) -> String {
    HTML_TAG.replace_all(html, "").into_owned()
}

/// Extract `addr` from `Display Name <addr>`; without brackets the trimmed field is the address
pub fn extract_sender_email(from: &str) -> String {
    if from.is_empty() {
        return String::new();
    }
    match ANGLE_ADDRESS.captures(from) {
        Some(caps) => caps[1].to_string(),
        None => from.trim().to_string(),
    }
}
