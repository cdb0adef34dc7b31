use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::{InboundMail, MailboxError};

const MAILBOX_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS mailboxes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS inbound_mails (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mailbox_id INTEGER NOT NULL REFERENCES mailboxes(id) ON DELETE CASCADE,
    from_address TEXT NOT NULL,
    subject TEXT,
    date TEXT NOT NULL,
    message_id TEXT,
    in_reply_to TEXT,
    references_header TEXT,
    body TEXT,
    flag_seen INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS mail_attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mail_id INTEGER NOT NULL REFERENCES inbound_mails(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content TEXT NOT NULL
);
"#;

/// A persisted inbound mail record.
#[derive(Debug, Clone)]
pub struct StoredMail {
    pub id: i64,
    pub mailbox_id: i64,
    pub from_address: String,
    pub subject: Option<String>,
    pub date: DateTime<Utc>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references_header: Option<String>,
    pub body: Option<String>,
    pub flag_seen: bool,
}

#[derive(Debug, Clone)]
pub struct StoredMailAttachment {
    pub id: i64,
    pub mail_id: i64,
    pub name: String,
    pub content_type: String,
    pub content: String,
}

impl StoredMailAttachment {
    /// Decode the base64 payload; providers deliver attachment bodies
    /// base64-encoded inside the JSON payload.
    pub fn decode(&self) -> Vec<u8> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        STANDARD.decode(self.content.as_bytes()).unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct MailboxStore {
    path: PathBuf,
}

impl MailboxStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, MailboxError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    pub fn create_mailbox(&self, name: &str) -> Result<i64, MailboxError> {
        let conn = self.open()?;
        conn.execute("INSERT INTO mailboxes (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_mailbox(&self, name: &str) -> Result<Option<i64>, MailboxError> {
        let conn = self.open()?;
        let id = conn
            .query_row(
                "SELECT id FROM mailboxes WHERE name = ?1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Persist an inbound payload, attachments included, in one transaction.
    pub fn record_inbound(
        &self,
        mailbox_id: i64,
        payload: &InboundMail,
    ) -> Result<i64, MailboxError> {
        let from_address = payload
            .from
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| MailboxError::InvalidMail("missing sender".to_string()))?;
        let date = parse_mail_date(payload.date.as_deref());
        let message_id = payload.header_message_id().map(|value| value.trim().to_string());

        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO inbound_mails (mailbox_id, from_address, subject, date, message_id, in_reply_to, references_header, body, flag_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            params![
                mailbox_id,
                from_address,
                payload.subject.as_deref(),
                format_datetime(date),
                message_id,
                payload.in_reply_to(),
                payload.references(),
                payload.text_body.as_deref(),
            ],
        )?;
        let mail_id = tx.last_insert_rowid();
        if let Some(attachments) = payload.attachments.as_ref() {
            let mut stmt = tx.prepare(
                "INSERT INTO mail_attachments (mail_id, name, content_type, content)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for attachment in attachments {
                stmt.execute(params![
                    mail_id,
                    attachment.name.as_str(),
                    attachment.content_type.as_str(),
                    attachment.content.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(mail_id)
    }

    /// Unprocessed replies in a mailbox: `flag_seen` still unset and a
    /// non-empty `In-Reply-To` header.
    pub fn unseen_replies(&self, mailbox_id: i64) -> Result<Vec<StoredMail>, MailboxError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, mailbox_id, from_address, subject, date, message_id, in_reply_to, references_header, body, flag_seen
             FROM inbound_mails
             WHERE mailbox_id = ?1
               AND flag_seen = 0
               AND in_reply_to IS NOT NULL
               AND in_reply_to != ''
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![mailbox_id], mail_from_row)?;
        let mut mails = Vec::new();
        for row in rows {
            mails.push(row?.try_into_mail()?);
        }
        Ok(mails)
    }

    pub fn mail(&self, id: i64) -> Result<Option<StoredMail>, MailboxError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, mailbox_id, from_address, subject, date, message_id, in_reply_to, references_header, body, flag_seen
                 FROM inbound_mails WHERE id = ?1",
                params![id],
                mail_from_row,
            )
            .optional()?;
        row.map(RawMail::try_into_mail).transpose()
    }

    /// Flag a batch of mails as seen in a single transaction.
    pub fn mark_seen(&self, ids: &[i64]) -> Result<(), MailboxError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE inbound_mails SET flag_seen = 1 WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn attachments_for(&self, mail_id: i64) -> Result<Vec<StoredMailAttachment>, MailboxError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, mail_id, name, content_type, content
             FROM mail_attachments WHERE mail_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![mail_id], |row| {
            Ok(StoredMailAttachment {
                id: row.get(0)?,
                mail_id: row.get(1)?,
                name: row.get(2)?,
                content_type: row.get(3)?,
                content: row.get(4)?,
            })
        })?;
        let mut attachments = Vec::new();
        for row in rows {
            attachments.push(row?);
        }
        Ok(attachments)
    }

    fn open(&self) -> Result<Connection, MailboxError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(MAILBOX_SCHEMA)?;
        Ok(conn)
    }
}

struct RawMail {
    id: i64,
    mailbox_id: i64,
    from_address: String,
    subject: Option<String>,
    date: String,
    message_id: Option<String>,
    in_reply_to: Option<String>,
    references_header: Option<String>,
    body: Option<String>,
    flag_seen: i64,
}

impl RawMail {
    fn try_into_mail(self) -> Result<StoredMail, MailboxError> {
        let date = DateTime::parse_from_rfc3339(&self.date)?.with_timezone(&Utc);
        Ok(StoredMail {
            id: self.id,
            mailbox_id: self.mailbox_id,
            from_address: self.from_address,
            subject: self.subject,
            date,
            message_id: self.message_id,
            in_reply_to: self.in_reply_to,
            references_header: self.references_header,
            body: self.body,
            flag_seen: self.flag_seen != 0,
        })
    }
}

fn mail_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMail> {
    Ok(RawMail {
        id: row.get(0)?,
        mailbox_id: row.get(1)?,
        from_address: row.get(2)?,
        subject: row.get(3)?,
        date: row.get(4)?,
        message_id: row.get(5)?,
        in_reply_to: row.get(6)?,
        references_header: row.get(7)?,
        body: row.get(8)?,
        flag_seen: row.get(9)?,
    })
}

fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

/// Mail dates arrive RFC 2822 formatted; tolerate RFC 3339 too and fall
/// back to the ingestion time when the header is missing or malformed.
fn parse_mail_date(raw: Option<&str>) -> DateTime<Utc> {
    let raw = match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value,
        None => return Utc::now(),
    };
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    Utc::now()
}
