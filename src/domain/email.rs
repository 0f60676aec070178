use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One inbound message flattened into the shape the processing API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEmail {
    /// `Message-ID` header, empty when the message has none.
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    /// Raw `Date` header value, not parsed.
    pub date: String,
    /// MIME type of the part the body was taken from.
    pub content_type: String,
    pub body: String,
    pub processed_at: DateTime<Utc>,
}

impl NormalizedEmail {
    /// Short label for log lines: the subject, or the id when there is no subject.
    pub fn label(&self) -> &str {
        if !self.subject.is_empty() {
            &self.subject
        } else if !self.id.is_empty() {
            &self.id
        } else {
            "(no subject)"
        }
    }
}
