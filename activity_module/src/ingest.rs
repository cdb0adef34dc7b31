//! Turn inbound mail replies into activities on the work item they
//! answer.
//!
//! Runs on the scheduler's cron tick. Each run scans the configured
//! mailbox for unseen replies, recovers the work item id from the
//! threading headers, and logs a `done` activity against it. Matched
//! mails are flagged seen in one batch at the end, so a failure leaves
//! everything unseen for the next run.

use tracing::{info, warn};

use mailbox_module::{extract_emails, extract_work_item_id, MailboxError, MailboxStore, StoredMail};

use crate::activities::{self, ActivityError};
use crate::records::{ActivityConfig, ActivityDraft, ActivityState, ResourceRef};
use crate::store::{ProjectStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("mailbox error: {0}")]
    Mailbox(#[from] MailboxError),
    #[error("activity error: {0}")]
    Activity(#[from] ActivityError),
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub scanned: usize,
    pub created: usize,
}

/// Process every unseen reply in the configured mailbox.
pub fn run_mail_ingestion(
    project: &ProjectStore,
    mailbox: &MailboxStore,
) -> Result<IngestReport, IngestError> {
    let config = project.activity_config()?;
    let mailbox_id = config
        .mailbox_id
        .ok_or(IngestError::MissingConfig("mailbox"))?;
    let mails = mailbox.unseen_replies(mailbox_id)?;
    let mut report = IngestReport {
        scanned: mails.len(),
        created: 0,
    };
    let mut seen = Vec::new();
    for mail in &mails {
        match ingest_mail(project, mailbox, &config, mail)? {
            Some(activity_id) => {
                seen.push(mail.id);
                report.created += 1;
                info!("created activity {} from mail {}", activity_id, mail.id);
            }
            None => {
                warn!("no work item matches reply headers of mail {}", mail.id);
            }
        }
    }
    mailbox.mark_seen(&seen)?;
    Ok(report)
}

fn ingest_mail(
    project: &ProjectStore,
    mailbox: &MailboxStore,
    config: &ActivityConfig,
    mail: &StoredMail,
) -> Result<Option<i64>, IngestError> {
    let Some(work_id) = extract_work_item_id(
        mail.in_reply_to.as_deref().unwrap_or(""),
        mail.references_header.as_deref(),
    ) else {
        return Ok(None);
    };
    if !project.work_item_exists(work_id)? {
        return Ok(None);
    }

    let sender = extract_emails(&mail.from_address).into_iter().next();
    let sender_party = match sender.as_deref() {
        Some(email) => project.find_party_by_email(email)?,
        None => None,
    };
    let mut employee = match sender.as_deref() {
        Some(email) => project.find_employee_by_email(email)?,
        None => None,
    };
    if employee.is_none() {
        employee = match config.default_employee_id {
            Some(id) => project.employee(id)?,
            None => None,
        };
    }

    let draft = ActivityDraft {
        dtstart: Some(mail.date),
        duration_minutes: None,
        activity_type_id: config.default_activity_type_id,
        subject: mail.subject.clone(),
        description: mail.body.clone(),
        state: ActivityState::Done,
        employee_id: employee.as_ref().map(|record| record.id),
        company_id: employee.as_ref().map(|record| record.company_id),
        party_id: sender_party.as_ref().map(|party| party.id),
        resource: Some(ResourceRef::work(work_id)),
    };
    let activity_id = activities::log_activity(project, &draft)?;
    if let Some(party) = sender_party.as_ref() {
        project.add_activity_contact(activity_id, party.id)?;
        project.add_work_item_contact(work_id, party.id)?;
    }
    for attachment in mailbox.attachments_for(mail.id)? {
        project.insert_attachment(
            &attachment.name,
            &ResourceRef::activity(activity_id),
            &attachment.decode(),
        )?;
    }
    Ok(Some(activity_id))
}
