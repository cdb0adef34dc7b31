use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use std::str::FromStr;

use crate::records::{Activity, ActivityState, ResourceRef, TimesheetLine, WorkItem, WorkKind};

use super::StoreError;

pub(super) const ACTIVITY_COLUMNS: &str =
    "id, code, dtstart, duration_minutes, activity_type_id, subject, description, state, \
     employee_id, company_id, party_id, resource_model, resource_id";

pub(super) const WORK_ITEM_COLUMNS: &str =
    "id, name, kind, party_id, parent_id, status_id, company_id, comment";

pub(super) const LINE_COLUMNS: &str =
    "id, company_id, employee_id, duration_minutes, date, timesheet_work_id";

pub(super) struct RawActivity {
    id: i64,
    code: String,
    dtstart: String,
    duration_minutes: Option<i64>,
    activity_type_id: Option<i64>,
    subject: Option<String>,
    description: Option<String>,
    state: String,
    employee_id: Option<i64>,
    company_id: Option<i64>,
    party_id: Option<i64>,
    resource_model: Option<String>,
    resource_id: Option<i64>,
}

pub(super) fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<RawActivity> {
    Ok(RawActivity {
        id: row.get(0)?,
        code: row.get(1)?,
        dtstart: row.get(2)?,
        duration_minutes: row.get(3)?,
        activity_type_id: row.get(4)?,
        subject: row.get(5)?,
        description: row.get(6)?,
        state: row.get(7)?,
        employee_id: row.get(8)?,
        company_id: row.get(9)?,
        party_id: row.get(10)?,
        resource_model: row.get(11)?,
        resource_id: row.get(12)?,
    })
}

impl RawActivity {
    pub(super) fn try_into_activity(self) -> Result<Activity, StoreError> {
        let dtstart = DateTime::parse_from_rfc3339(&self.dtstart)?.with_timezone(&Utc);
        let state = ActivityState::from_str(&self.state).map_err(StoreError::Storage)?;
        let resource = match (self.resource_model, self.resource_id) {
            (Some(model), Some(id)) => Some(ResourceRef { model, id }),
            (None, None) => None,
            _ => {
                return Err(StoreError::Storage(format!(
                    "partial resource reference on activity {}",
                    self.id
                )))
            }
        };
        Ok(Activity {
            id: self.id,
            code: self.code,
            dtstart,
            duration_minutes: self.duration_minutes,
            activity_type_id: self.activity_type_id,
            subject: self.subject,
            description: self.description,
            state,
            employee_id: self.employee_id,
            company_id: self.company_id,
            party_id: self.party_id,
            resource,
        })
    }
}

pub(super) struct RawWorkItem {
    id: i64,
    name: String,
    kind: String,
    party_id: Option<i64>,
    parent_id: Option<i64>,
    status_id: Option<i64>,
    company_id: Option<i64>,
    comment: Option<String>,
}

pub(super) fn work_item_from_row(row: &Row<'_>) -> rusqlite::Result<RawWorkItem> {
    Ok(RawWorkItem {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        party_id: row.get(3)?,
        parent_id: row.get(4)?,
        status_id: row.get(5)?,
        company_id: row.get(6)?,
        comment: row.get(7)?,
    })
}

impl RawWorkItem {
    pub(super) fn try_into_work_item(self) -> Result<WorkItem, StoreError> {
        let kind = WorkKind::from_str(&self.kind).map_err(StoreError::Storage)?;
        Ok(WorkItem {
            id: self.id,
            name: self.name,
            kind,
            party_id: self.party_id,
            parent_id: self.parent_id,
            status_id: self.status_id,
            company_id: self.company_id,
            comment: self.comment,
        })
    }
}

pub(super) struct RawLine {
    id: i64,
    company_id: Option<i64>,
    employee_id: Option<i64>,
    duration_minutes: Option<i64>,
    date: String,
    timesheet_work_id: i64,
}

pub(super) fn line_from_row(row: &Row<'_>) -> rusqlite::Result<RawLine> {
    Ok(RawLine {
        id: row.get(0)?,
        company_id: row.get(1)?,
        employee_id: row.get(2)?,
        duration_minutes: row.get(3)?,
        date: row.get(4)?,
        timesheet_work_id: row.get(5)?,
    })
}

impl RawLine {
    pub(super) fn try_into_line(self) -> Result<TimesheetLine, StoreError> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")?;
        Ok(TimesheetLine {
            id: self.id,
            company_id: self.company_id,
            employee_id: self.employee_id,
            duration_minutes: self.duration_minutes,
            date,
            timesheet_work_id: self.timesheet_work_id,
        })
    }
}
