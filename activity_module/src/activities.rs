//! Record entrypoints for activities.
//!
//! Create/write/delete run the stakeholder-action status hook and the
//! timesheet synchronization, the same way both fire on every save in
//! the record workflow.

use tracing::info;

use crate::records::{Activity, ActivityDraft, ResourceRef};
use crate::status;
use crate::store::{ProjectStore, StoreError};
use crate::timesheet;
use crate::warnings::UserWarning;

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Warning(UserWarning),
    #[error("resource model not allowed: {0}")]
    ResourceNotAllowed(String),
}

/// Create an activity and run the post-save hooks.
///
/// A hook warning rolls the create back, so the caller can acknowledge
/// and retry the identical call.
pub fn log_activity(store: &ProjectStore, draft: &ActivityDraft) -> Result<i64, ActivityError> {
    if let Some(resource) = draft.resource.as_ref() {
        validate_resource(store, resource)?;
    }
    let id = store.insert_activity(draft)?;
    if let Err(err) = run_hooks(store, id) {
        store.delete_activity_record(id)?;
        return Err(err);
    }
    Ok(id)
}

/// Write an activity's fields and run the post-save hooks. Retrying the
/// same write after acknowledging a warning completes the gated hook
/// actions.
pub fn write_activity(store: &ProjectStore, activity: &Activity) -> Result<(), ActivityError> {
    if let Some(resource) = activity.resource.as_ref() {
        validate_resource(store, resource)?;
    }
    store.update_activity(activity)?;
    run_hooks(store, activity.id)
}

/// Point an activity at a work item and run the post-save hooks.
pub fn attach_to_work(
    store: &ProjectStore,
    activity_id: i64,
    work_id: i64,
) -> Result<(), ActivityError> {
    let resource = ResourceRef::work(work_id);
    validate_resource(store, &resource)?;
    store.set_activity_resource(activity_id, Some(&resource))?;
    run_hooks(store, activity_id)
}

/// Delete an activity. With synchronization enabled and a linked
/// timesheet line, the delete is gated behind a warning and then
/// cascades to the line.
pub fn delete_activity(store: &ProjectStore, activity_id: i64) -> Result<(), ActivityError> {
    let Some(activity) = store.activity(activity_id)? else {
        return Ok(());
    };
    if store.activity_config()?.synchronize_activity_time {
        if let Some(line) = store.line_for_activity(activity_id)? {
            timesheet::gate(
                store,
                format!("delete_activity_line_{}", activity.id),
                format!(
                    "Activity {} has a timesheet line; deleting it removes line {} as well.",
                    activity.code, line.id
                ),
            )?;
            store.delete_timesheet_line_record(line.id)?;
        }
    }
    store.delete_activity_record(activity_id)?;
    info!("deleted activity {}", activity.code);
    Ok(())
}

fn run_hooks(store: &ProjectStore, activity_id: i64) -> Result<(), ActivityError> {
    // Synchronization runs first: its warnings gate the save, and a
    // gated create must roll back before any status change lands.
    timesheet::sync_activity(store, activity_id)?;
    if let Some(activity) = store.activity(activity_id)? {
        status::maybe_advance_status(store, &activity)?;
    }
    Ok(())
}

fn validate_resource(store: &ProjectStore, resource: &ResourceRef) -> Result<(), ActivityError> {
    let models = store.resource_models()?;
    if !models.iter().any(|model| model == &resource.model) {
        return Err(ActivityError::ResourceNotAllowed(resource.model.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{TimesheetLineDraft, WorkItemDraft, WorkKind};
    use crate::warnings;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn store() -> (TempDir, ProjectStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(temp.path().join("project.db")).expect("store");
        (temp, store)
    }

    #[test]
    fn resource_model_must_be_allow_listed() {
        let (_temp, store) = store();
        let err = log_activity(
            &store,
            &ActivityDraft {
                resource: Some(ResourceRef {
                    model: "sale.sale".to_string(),
                    id: 1,
                }),
                ..Default::default()
            },
        )
        .expect_err("rejected");
        assert!(matches!(err, ActivityError::ResourceNotAllowed(model) if model == "sale.sale"));

        store.add_project_reference("sale.sale").expect("reference");
        log_activity(
            &store,
            &ActivityDraft {
                resource: Some(ResourceRef {
                    model: "sale.sale".to_string(),
                    id: 1,
                }),
                ..Default::default()
            },
        )
        .expect("allowed after registration");
    }

    #[test]
    fn deleting_activity_with_line_is_gated_then_cascades() {
        let (_temp, store) = store();
        let work_id = store
            .insert_work_item(&WorkItemDraft {
                name: "roof".to_string(),
                kind: WorkKind::Task,
                ..Default::default()
            })
            .expect("work item");
        let timesheet_work = store.add_timesheet_work(work_id).expect("timesheet work");
        let activity_id = log_activity(
            &store,
            &ActivityDraft {
                resource: Some(ResourceRef::work(work_id)),
                ..Default::default()
            },
        )
        .expect("activity");
        let line_id = store
            .insert_timesheet_line(&TimesheetLineDraft {
                company_id: None,
                employee_id: None,
                duration_minutes: Some(30),
                date: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
                timesheet_work_id: timesheet_work,
            })
            .expect("line");
        store.link_activity_line(activity_id, line_id).expect("link");

        let err = delete_activity(&store, activity_id).expect_err("warning");
        let ActivityError::Warning(warning) = err else {
            panic!("expected warning, got {err:?}");
        };
        assert!(store.activity(activity_id).expect("query").is_some());

        warnings::acknowledge(&store, &warning.key).expect("acknowledge");
        delete_activity(&store, activity_id).expect("delete");
        assert!(store.activity(activity_id).expect("query").is_none());
        assert!(store.timesheet_line(line_id).expect("query").is_none());
    }

    #[test]
    fn deleting_missing_activity_is_a_no_op() {
        let (_temp, store) = store();
        delete_activity(&store, 999).expect("no-op");
    }
}
