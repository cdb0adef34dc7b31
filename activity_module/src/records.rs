use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

/// Model name of project work items, the only resource target shipped in
/// the default allow-list.
pub const WORK_MODEL: &str = "project.work";

/// Model name of activities, used when records (attachments) point back
/// at an activity.
pub const ACTIVITY_MODEL: &str = "activity.activity";

#[derive(Debug, Clone, PartialEq)]
pub struct Party {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Employee {
    pub id: i64,
    pub party_id: i64,
    pub company_id: i64,
}

/// A work status; `progress` runs from 0.0 to the terminal 1.0. The
/// optional pointer names the status a work item advances to when a
/// stakeholder-action activity is logged against it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkStatus {
    pub id: i64,
    pub name: String,
    pub progress: Option<f64>,
    pub stakeholder_action_status_id: Option<i64>,
}

impl WorkStatus {
    pub fn is_terminal(&self) -> bool {
        self.progress.map_or(false, |value| value >= 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityType {
    pub id: i64,
    pub name: String,
    pub update_status_on_stakeholder_action: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkKind {
    Project,
    #[default]
    Task,
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkKind::Project => write!(f, "project"),
            WorkKind::Task => write!(f, "task"),
        }
    }
}

impl FromStr for WorkKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "project" => Ok(WorkKind::Project),
            "task" => Ok(WorkKind::Task),
            other => Err(format!("unknown work kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub id: i64,
    pub name: String,
    pub kind: WorkKind,
    pub party_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub status_id: Option<i64>,
    pub company_id: Option<i64>,
    pub comment: Option<String>,
}

/// A polymorphic record reference, stored as a `(model, id)` pair and
/// rendered as `model,id` (for example `project.work,42`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub model: String,
    pub id: i64,
}

impl ResourceRef {
    pub fn work(id: i64) -> Self {
        Self {
            model: WORK_MODEL.to_string(),
            id,
        }
    }

    pub fn activity(id: i64) -> Self {
        Self {
            model: ACTIVITY_MODEL.to_string(),
            id,
        }
    }

    pub fn is_work(&self) -> bool {
        self.model == WORK_MODEL
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.model, self.id)
    }
}

impl FromStr for ResourceRef {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (model, id) = value
            .split_once(',')
            .ok_or_else(|| format!("invalid resource reference: {value}"))?;
        let id = id
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid resource id in: {value}"))?;
        if model.trim().is_empty() {
            return Err(format!("invalid resource model in: {value}"));
        }
        Ok(Self {
            model: model.trim().to_string(),
            id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityState {
    #[default]
    Planned,
    Done,
    Canceled,
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityState::Planned => write!(f, "planned"),
            ActivityState::Done => write!(f, "done"),
            ActivityState::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for ActivityState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "planned" => Ok(ActivityState::Planned),
            "done" => Ok(ActivityState::Done),
            "canceled" => Ok(ActivityState::Canceled),
            other => Err(format!("unknown activity state: {other}")),
        }
    }
}

/// A logged interaction (call, email, meeting), optionally attached to a
/// work item through its polymorphic resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub id: i64,
    pub code: String,
    pub dtstart: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub activity_type_id: Option<i64>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub state: ActivityState,
    pub employee_id: Option<i64>,
    pub company_id: Option<i64>,
    pub party_id: Option<i64>,
    pub resource: Option<ResourceRef>,
}

impl Activity {
    /// Whether the activity carries time worth a timesheet line.
    pub fn has_duration(&self) -> bool {
        matches!(self.duration_minutes, Some(minutes) if minutes > 0)
    }

    pub fn work_id(&self) -> Option<i64> {
        self.resource
            .as_ref()
            .filter(|resource| resource.is_work())
            .map(|resource| resource.id)
    }
}

/// Field values for a new activity; the store assigns id and code.
#[derive(Debug, Clone, Default)]
pub struct ActivityDraft {
    pub dtstart: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub activity_type_id: Option<i64>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub state: ActivityState,
    pub employee_id: Option<i64>,
    pub company_id: Option<i64>,
    pub party_id: Option<i64>,
    pub resource: Option<ResourceRef>,
}

/// Field values for a new work item.
#[derive(Debug, Clone, Default)]
pub struct WorkItemDraft {
    pub name: String,
    pub kind: WorkKind,
    pub party_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub status_id: Option<i64>,
    pub company_id: Option<i64>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimesheetLine {
    pub id: i64,
    pub company_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub date: NaiveDate,
    pub timesheet_work_id: i64,
}

/// Field values for a new timesheet line.
#[derive(Debug, Clone)]
pub struct TimesheetLineDraft {
    pub company_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub date: NaiveDate,
    pub timesheet_work_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub id: i64,
    pub name: String,
    pub resource: ResourceRef,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Attachment row without the blob, for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentMeta {
    pub id: i64,
    pub name: String,
    pub resource: ResourceRef,
    pub created_at: DateTime<Utc>,
}

/// The singleton configuration record (id = 1).
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityConfig {
    pub default_employee_id: Option<i64>,
    pub default_activity_type_id: Option<i64>,
    pub mailbox_id: Option<i64>,
    pub synchronize_activity_time: bool,
}

/// Denormalized display fields derived from a work item's activities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActivitySummary {
    pub last_action_date: Option<DateTime<Utc>>,
    pub channel: Option<i64>,
    pub contact_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_reference_round_trips_through_text() {
        let resource = ResourceRef::work(42);
        assert_eq!(resource.to_string(), "project.work,42");
        let parsed: ResourceRef = "project.work,42".parse().expect("parse");
        assert_eq!(parsed, resource);
        assert!(parsed.is_work());
        assert!("project.work".parse::<ResourceRef>().is_err());
        assert!("project.work,abc".parse::<ResourceRef>().is_err());
    }

    #[test]
    fn terminal_status_requires_full_progress() {
        let mut status = WorkStatus {
            id: 1,
            name: "open".to_string(),
            progress: Some(0.5),
            stakeholder_action_status_id: None,
        };
        assert!(!status.is_terminal());
        status.progress = Some(1.0);
        assert!(status.is_terminal());
        status.progress = None;
        assert!(!status.is_terminal());
    }

    #[test]
    fn only_positive_durations_count() {
        let mut activity = Activity {
            id: 1,
            code: "ACT00001".to_string(),
            dtstart: Utc::now(),
            duration_minutes: None,
            activity_type_id: None,
            subject: None,
            description: None,
            state: ActivityState::Planned,
            employee_id: None,
            company_id: None,
            party_id: None,
            resource: None,
        };
        assert!(!activity.has_duration());
        activity.duration_minutes = Some(0);
        assert!(!activity.has_duration());
        activity.duration_minutes = Some(1);
        assert!(activity.has_duration());
    }
}
