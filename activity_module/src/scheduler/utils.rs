use chrono::{DateTime, Utc};

use super::types::{Schedule, SchedulerError, TaskKind};

pub(crate) fn task_kind_label(kind: &TaskKind) -> &'static str {
    match kind {
        TaskKind::IngestMail(_) => "ingest_mail",
        TaskKind::Noop => "noop",
    }
}

pub(crate) fn schedule_columns(
    schedule: &Schedule,
) -> (String, Option<String>, Option<String>, Option<String>) {
    match schedule {
        Schedule::Cron {
            expression,
            next_run,
        } => (
            "cron".to_string(),
            Some(expression.clone()),
            Some(format_datetime(*next_run)),
            None,
        ),
        Schedule::OneShot { run_at } => (
            "one_shot".to_string(),
            None,
            None,
            Some(format_datetime(*run_at)),
        ),
    }
}

pub(crate) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, SchedulerError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

pub(crate) fn parse_optional_datetime(
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, SchedulerError> {
    match value {
        Some(raw) => Ok(Some(parse_datetime(raw)?)),
        None => Ok(None),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
