//! Two-step flow that attaches activities to a work item.
//!
//! Step one collects the open projects and tasks under the activities'
//! party. Step two either attaches to a chosen task or creates a fresh
//! task under a chosen project from the first activity's subject and
//! description. Exactly one of the two runs per confirmation.

use tracing::info;

use crate::activities::{self, ActivityError};
use crate::records::{WorkItem, WorkItemDraft, WorkKind};
use crate::store::{ProjectStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("activity error: {0}")]
    Activity(#[from] ActivityError),
    #[error("no activities selected")]
    NoActivities,
    #[error("activity {0} has no party to scope the selection to")]
    MissingParty(i64),
}

/// Selection domain offered on the first screen.
#[derive(Debug, Clone)]
pub struct ResourceSelection {
    pub open_projects: Vec<WorkItem>,
    pub open_tasks: Vec<WorkItem>,
}

/// The confirmed choice on the second screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceChoice {
    /// Attach the activities to an already-existing open task.
    ExistingTask(i64),
    /// Create a new task under this project, then attach.
    NewTask { project_id: i64 },
}

/// First screen: open projects and open tasks under the first
/// activity's party.
pub fn start(store: &ProjectStore, activity_ids: &[i64]) -> Result<ResourceSelection, WizardError> {
    let first = *activity_ids.first().ok_or(WizardError::NoActivities)?;
    let activity = store
        .activity(first)?
        .ok_or_else(|| StoreError::NotFound(format!("activity {first}")))?;
    let party_id = activity
        .party_id
        .ok_or(WizardError::MissingParty(activity.id))?;
    Ok(ResourceSelection {
        open_projects: store.open_work_items(WorkKind::Project, party_id)?,
        open_tasks: store.open_work_items(WorkKind::Task, party_id)?,
    })
}

/// Second screen: run the confirmed choice and return the work item the
/// activities now point at.
pub fn execute(
    store: &ProjectStore,
    activity_ids: &[i64],
    choice: ResourceChoice,
) -> Result<i64, WizardError> {
    if activity_ids.is_empty() {
        return Err(WizardError::NoActivities);
    }
    let work_id = match choice {
        ResourceChoice::ExistingTask(task_id) => {
            if !store.work_item_exists(task_id)? {
                return Err(StoreError::NotFound(format!("work item {task_id}")).into());
            }
            task_id
        }
        ResourceChoice::NewTask { project_id } => {
            let project = store
                .work_item(project_id)?
                .ok_or_else(|| StoreError::NotFound(format!("work item {project_id}")))?;
            let first = store
                .activity(activity_ids[0])?
                .ok_or_else(|| StoreError::NotFound(format!("activity {}", activity_ids[0])))?;
            let name = first
                .subject
                .clone()
                .filter(|subject| !subject.trim().is_empty())
                .unwrap_or_else(|| first.code.clone());
            let task_id = store.insert_work_item(&WorkItemDraft {
                name,
                kind: WorkKind::Task,
                party_id: first.party_id.or(project.party_id),
                parent_id: Some(project.id),
                status_id: None,
                company_id: project.company_id,
                comment: first.description.clone(),
            })?;
            info!("created task {} under project {}", task_id, project.id);
            task_id
        }
    };
    for activity_id in activity_ids {
        activities::attach_to_work(store, *activity_id, work_id)?;
        let activity = store
            .activity(*activity_id)?
            .ok_or_else(|| StoreError::NotFound(format!("activity {activity_id}")))?;
        if let Some(party_id) = activity.party_id {
            store.add_work_item_contact(work_id, party_id)?;
        }
    }
    Ok(work_id)
}
