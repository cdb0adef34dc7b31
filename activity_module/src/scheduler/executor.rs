use tracing::info;

use mailbox_module::MailboxStore;

use crate::ingest::run_mail_ingestion;
use crate::store::ProjectStore;

use super::types::{SchedulerError, TaskKind};

pub trait TaskExecutor {
    fn execute(&self, task: &TaskKind) -> Result<(), SchedulerError>;
}

#[derive(Debug, Default, Clone)]
pub struct ModuleExecutor;

impl TaskExecutor for ModuleExecutor {
    fn execute(&self, task: &TaskKind) -> Result<(), SchedulerError> {
        match task {
            TaskKind::IngestMail(task) => {
                let project = ProjectStore::new(&task.project_db_path)
                    .map_err(|err| SchedulerError::TaskFailed(err.to_string()))?;
                let mailbox = MailboxStore::new(&task.mailbox_db_path)
                    .map_err(|err| SchedulerError::TaskFailed(err.to_string()))?;
                let report = run_mail_ingestion(&project, &mailbox)
                    .map_err(|err| SchedulerError::TaskFailed(err.to_string()))?;
                info!(
                    "mail ingestion scanned {} mails, created {} activities",
                    report.scanned, report.created
                );
                Ok(())
            }
            TaskKind::Noop => Ok(()),
        }
    }
}
