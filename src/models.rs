use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header row written once at the top of the destination sheet
pub const SHEET_HEADERS: [&str; 4] = ["From", "Subject", "Date", "Content"];

/// A message as returned by the mailbox provider, before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMessage {
    pub id: String,
    pub internal_date: Option<DateTime<Utc>>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub body: Option<BodyPart>,
}

/// One node of a (possibly multipart) message body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyPart {
    pub mime_type: String,
    /// Decoded text content of this part, if it carries any
    pub data: Option<String>,
    pub parts: Vec<BodyPart>,
}

impl BodyPart {
    /// Leaf part carrying text
    pub fn text(mime_type: &str, data: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: Some(data.to_string()),
            parts: Vec::new(),
        }
    }

    /// Container part (`multipart/*`)
    pub fn multipart(mime_type: &str, parts: Vec<BodyPart>) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: None,
            parts,
        }
    }

    /// Media type without parameters, lowercased (`text/plain; charset=utf-8` -> `text/plain`)
    pub fn essence(&self) -> String {
        self.mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }
}

/// Canonical shape of a message destined for the sheet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: String,
    pub from: String,
    pub subject: String,
    /// `YYYY-MM-DD HH:MM:SS`, or the original header if it could not be parsed
    pub date: String,
    pub content: String,
}

impl NormalizedRecord {
    pub fn to_row(&self) -> SheetRow {
        SheetRow {
            from: self.from.clone(),
            subject: self.subject.clone(),
            date: self.date.clone(),
            content: self.content.clone(),
        }
    }
}

/// One appended row: (From, Subject, Date, Content)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRow {
    pub from: String,
    pub subject: String,
    pub date: String,
    pub content: String,
}

impl SheetRow {
    pub fn cells(&self) -> [&str; 4] {
        [
            self.from.as_str(),
            self.subject.as_str(),
            self.date.as_str(),
            self.content.as_str(),
        ]
    }

    pub fn header() -> Self {
        Self {
            from: SHEET_HEADERS[0].to_string(),
            subject: SHEET_HEADERS[1].to_string(),
            date: SHEET_HEADERS[2].to_string(),
            content: SHEET_HEADERS[3].to_string(),
        }
    }
}

/// Spreadsheet and tab that receive the rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

impl Destination {
    pub fn new(spreadsheet_id: impl Into<String>, sheet_name: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
        }
    }

    /// A1 reference to the tab, quoted so names with spaces or punctuation work
    pub fn quoted_sheet_name(&self) -> String {
        format!("'{}'", self.sheet_name.replace('\'', "''"))
    }

    /// Range holding the header row
    pub fn header_range(&self) -> String {
        format!("{}!A1:D1", self.quoted_sheet_name())
    }

    /// Full four-column range used for appends and read-back
    pub fn data_range(&self) -> String {
        format!("{}!A:D", self.quoted_sheet_name())
    }
}

/// Custom deserializers for persisted data
pub mod deserializers {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    /// Parse an ISO-8601 timestamp with or without an offset
    ///
    /// Offset-less values are taken as UTC.
    pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Deserialize an optional timestamp, mapping anything unreadable to `None`
    pub fn deserialize_lenient_timestamp<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<serde_json::Value> = Option::deserialize(deserializer)?;
        Ok(match opt {
            Some(serde_json::Value::String(s)) => {
                let parsed = parse_timestamp(&s);
                if parsed.is_none() {
                    tracing::warn!("Ignoring unreadable last_run timestamp: {:?}", s);
                }
                parsed
            }
            _ => None,
        })
    }
}
