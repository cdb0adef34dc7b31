//! Inbound mail handling for the activity service.
//!
//! Holds the Postmark-style inbound payload model, the mailbox store, and
//! the header parsing used to link a reply back to the work item it was
//! sent about.

use serde::Deserialize;

mod store;

pub use store::{MailboxStore, StoredMail, StoredMailAttachment};

#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("invalid mail: {0}")]
    InvalidMail(String),
}

/// An inbound email payload as delivered by the mail provider webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMail {
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
    #[serde(rename = "Date")]
    pub date: Option<String>,
    #[serde(rename = "MessageID", alias = "MessageId")]
    pub message_id: Option<String>,
    #[serde(rename = "TextBody")]
    pub text_body: Option<String>,
    #[serde(rename = "Headers")]
    pub headers: Option<Vec<MailHeader>>,
    #[serde(rename = "Attachments")]
    pub attachments: Option<Vec<MailAttachment>>,
}

impl InboundMail {
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.as_ref().and_then(|headers| {
            headers
                .iter()
                .find(|header| header.name.eq_ignore_ascii_case(name))
                .map(|header| header.value.as_str())
        })
    }

    pub fn in_reply_to(&self) -> Option<&str> {
        self.header_value("In-Reply-To")
    }

    pub fn references(&self) -> Option<&str> {
        self.header_value("References")
    }

    pub fn header_message_id(&self) -> Option<&str> {
        self.header_value("Message-ID").or(self.message_id.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailHeader {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailAttachment {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "ContentType")]
    pub content_type: String,
}

pub fn normalize_message_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|ch| matches!(ch, '<' | '>'));
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

/// Recover a work item id from a single `Message-ID`-style token.
///
/// Replies to activity notifications carry `<ID@host>` message ids; the
/// numeric part before the `@` is the work item id.
pub fn reference_work_id(token: &str) -> Option<i64> {
    let trimmed = token.trim().trim_matches(|ch| matches!(ch, '<' | '>'));
    if trimmed.is_empty() {
        return None;
    }
    let local = trimmed.split('@').next().unwrap_or("");
    match local.parse::<i64>() {
        Ok(id) if id > 0 => Some(id),
        _ => None,
    }
}

/// Extract a work item id from a reply's threading headers.
///
/// `In-Reply-To` is authoritative; the `References` header is scanned
/// token by token as a fallback, since clients differ in which header
/// they preserve.
pub fn extract_work_item_id(in_reply_to: &str, references: Option<&str>) -> Option<i64> {
    if let Some(id) = reference_work_id(in_reply_to) {
        return Some(id);
    }
    for token in references.unwrap_or("").split_whitespace() {
        if let Some(id) = reference_work_id(token) {
            return Some(id);
        }
    }
    None
}

pub fn normalize_email(raw: &str) -> Option<String> {
    let mut value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(stripped) = value.strip_prefix("mailto:") {
        value = stripped.trim();
    }
    value = value.trim_matches(|ch: char| matches!(ch, '<' | '>' | '"' | '\'' | ',' | ';'));
    if !value.contains('@') {
        return None;
    }

    let mut parts = value.splitn(2, '@');
    let local = parts.next().unwrap_or("").trim();
    let domain = parts.next().unwrap_or("").trim();
    if local.is_empty() || domain.is_empty() {
        return None;
    }

    Some(format!(
        "{}@{}",
        local.to_ascii_lowercase(),
        domain.to_ascii_lowercase()
    ))
}

/// Pull every email address out of a raw header value such as
/// `"Ann Smith" <ann@example.com>, bob@example.com`.
pub fn extract_emails(raw: &str) -> Vec<String> {
    let mut emails = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let mut remainder = raw;
    while let Some(start) = remainder.find('<') {
        let after_start = &remainder[start + 1..];
        if let Some(end) = after_start.find('>') {
            let inside = &after_start[..end];
            if let Some(email) = normalize_email(inside) {
                if seen.insert(email.clone()) {
                    emails.push(email);
                }
            }
            remainder = &after_start[end + 1..];
        } else {
            break;
        }
    }

    for token in raw.split(|ch| matches!(ch, ',' | ';' | ' ' | '\t' | '\n' | '\r')) {
        if let Some(email) = normalize_email(token) {
            if seen.insert(email.clone()) {
                emails.push(email);
            }
        }
    }

    emails
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_work_id_strips_angle_brackets() {
        assert_eq!(reference_work_id("<42@projects.example.com>"), Some(42));
        assert_eq!(reference_work_id("42@host"), Some(42));
    }

    #[test]
    fn reference_work_id_rejects_non_numeric_tokens() {
        assert_eq!(reference_work_id("<abc123@host>"), None);
        assert_eq!(reference_work_id("<-3@host>"), None);
        assert_eq!(reference_work_id(""), None);
    }

    #[test]
    fn extract_work_item_id_falls_back_to_references() {
        let references = "<other@client> <17@host> <later@client>";
        assert_eq!(
            extract_work_item_id("<reply-token@client>", Some(references)),
            Some(17)
        );
    }

    #[test]
    fn extract_work_item_id_prefers_in_reply_to() {
        assert_eq!(
            extract_work_item_id("<9@host>", Some("<17@host>")),
            Some(9)
        );
    }

    #[test]
    fn normalize_message_id_lowercases_and_trims() {
        assert_eq!(
            normalize_message_id(" <Msg-1@Example.COM> "),
            Some("msg-1@example.com".to_string())
        );
        assert_eq!(normalize_message_id("<>"), None);
    }

    #[test]
    fn extract_emails_handles_display_names() {
        let emails = extract_emails("\"Ann Smith\" <Ann@Example.com>, bob@example.com");
        assert_eq!(
            emails,
            vec!["ann@example.com".to_string(), "bob@example.com".to_string()]
        );
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let payload = r#"{
            "From": "ann@example.com",
            "Headers": [
                {"Name": "in-reply-to", "Value": "<42@host>"}
            ]
        }"#;
        let mail: InboundMail = serde_json::from_str(payload).expect("parse payload");
        assert_eq!(mail.in_reply_to(), Some("<42@host>"));
    }
}
