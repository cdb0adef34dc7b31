//! Keep activities and timesheet lines consistent with each other.
//!
//! Both directions run from the record entrypoints in `activities` and
//! from the line entrypoints below. The singleton configuration flag
//! `synchronize_activity_time` disables the whole mechanism.

use chrono::{TimeZone, Utc};
use tracing::info;

use crate::activities::ActivityError;
use crate::records::{Activity, ResourceRef, TimesheetLine, TimesheetLineDraft, WorkItem};
use crate::store::{ProjectStore, StoreError};
use crate::warnings;

/// Activity-side synchronization, run after an activity is created or
/// written.
pub fn sync_activity(store: &ProjectStore, activity_id: i64) -> Result<(), ActivityError> {
    if !store.activity_config()?.synchronize_activity_time {
        return Ok(());
    }
    let Some(activity) = store.activity(activity_id)? else {
        return Ok(());
    };
    let work_item = match activity.work_id() {
        Some(work_id) => store.work_item(work_id)?,
        None => None,
    };
    let line = store.line_for_activity(activity_id)?;

    match (work_item, line) {
        (None, None) => Ok(()),
        (None, Some(line)) => {
            gate(
                store,
                format!("activity_line_orphan_{}", activity.id),
                format!(
                    "Activity {} is no longer attached to a work item; its timesheet line will be deleted.",
                    activity.code
                ),
            )?;
            store.delete_timesheet_line_record(line.id)?;
            info!("deleted orphaned timesheet line {} of activity {}", line.id, activity.code);
            Ok(())
        }
        (Some(work_item), None) => create_line_for(store, &activity, &work_item),
        (Some(_work_item), Some(line)) => {
            if !activity.has_duration() {
                gate(
                    store,
                    format!("activity_line_clear_{}_{}", activity.id, line.id),
                    format!(
                        "Activity {} has no duration left; its timesheet line will be deleted.",
                        activity.code
                    ),
                )?;
                store.delete_timesheet_line_record(line.id)?;
                info!("deleted timesheet line {} of activity {}", line.id, activity.code);
                return Ok(());
            }
            let mut updated = line.clone();
            updated.company_id = activity.company_id;
            updated.employee_id = activity.employee_id;
            updated.duration_minutes = activity.duration_minutes;
            updated.date = activity.dtstart.date_naive();
            if updated != line {
                store.update_timesheet_line(&updated)?;
            }
            Ok(())
        }
    }
}

fn create_line_for(
    store: &ProjectStore,
    activity: &Activity,
    work_item: &WorkItem,
) -> Result<(), ActivityError> {
    if !activity.has_duration() {
        return Ok(());
    }
    let works = store.timesheet_works(work_item.id)?;
    let Some(timesheet_work_id) = works.first().copied() else {
        // Keyed by the work item so an acknowledgement survives the
        // rollback-and-retry of a gated create.
        gate(
            store,
            format!("no_timesheet_work_{}", work_item.id),
            format!(
                "Work item \"{}\" accepts no timesheets; no line was created for activity {}.",
                work_item.name, activity.code
            ),
        )?;
        return Ok(());
    };
    let line_id = store.insert_timesheet_line(&TimesheetLineDraft {
        company_id: activity.company_id,
        employee_id: activity.employee_id,
        duration_minutes: activity.duration_minutes,
        date: activity.dtstart.date_naive(),
        timesheet_work_id,
    })?;
    store.link_activity_line(activity.id, line_id)?;
    info!("created timesheet line {} for activity {}", line_id, activity.code);
    Ok(())
}

/// Line-side synchronization, run after a timesheet line is created or
/// written: mirror company/employee/duration/date back onto the linked
/// activity and reattach the activity when the line's work item moved.
pub fn sync_timesheet_line(store: &ProjectStore, line_id: i64) -> Result<(), ActivityError> {
    if !store.activity_config()?.synchronize_activity_time {
        return Ok(());
    }
    let Some(line) = store.timesheet_line(line_id)? else {
        return Ok(());
    };
    let Some(activity) = store.activity_for_line(line_id)? else {
        return Ok(());
    };

    let mut updated = activity.clone();
    updated.company_id = line.company_id;
    updated.employee_id = line.employee_id;
    updated.duration_minutes = line.duration_minutes;
    let naive = line.date.and_time(activity.dtstart.time());
    updated.dtstart = Utc.from_utc_datetime(&naive);

    if let Some(work_item_id) = store.work_item_for_timesheet_work(line.timesheet_work_id)? {
        if activity.work_id() != Some(work_item_id) {
            gate(
                store,
                format!("line_reassign_{}_{}", line.id, activity.id),
                format!(
                    "Timesheet line {} belongs to work item {}; activity {} will be moved there.",
                    line.id, work_item_id, activity.code
                ),
            )?;
            updated.resource = Some(ResourceRef::work(work_item_id));
        }
    }

    if updated != activity {
        store.update_activity(&updated)?;
        info!("mirrored timesheet line {} onto activity {}", line.id, activity.code);
    }
    Ok(())
}

/// Create a line and run the line-side hook.
pub fn create_timesheet_line(
    store: &ProjectStore,
    draft: &TimesheetLineDraft,
) -> Result<i64, ActivityError> {
    let line_id = store.insert_timesheet_line(draft)?;
    sync_timesheet_line(store, line_id)?;
    Ok(line_id)
}

/// Write a line and run the line-side hook.
pub fn write_timesheet_line(
    store: &ProjectStore,
    line: &TimesheetLine,
) -> Result<(), ActivityError> {
    store.update_timesheet_line(line)?;
    sync_timesheet_line(store, line.id)
}

/// Delete a line; with synchronization enabled, the linked activity's
/// duration is cleared first.
pub fn delete_timesheet_line(store: &ProjectStore, line_id: i64) -> Result<(), ActivityError> {
    if store.activity_config()?.synchronize_activity_time {
        if let Some(activity) = store.activity_for_line(line_id)? {
            if activity.duration_minutes.is_some() {
                store.set_activity_duration(activity.id, None)?;
                info!(
                    "cleared duration of activity {} after deleting its timesheet line",
                    activity.code
                );
            }
        }
    }
    store.delete_timesheet_line_record(line_id)?;
    Ok(())
}

pub(crate) fn gate(
    store: &ProjectStore,
    key: String,
    message: String,
) -> Result<(), ActivityError> {
    match warnings::check(store, &key, &message)? {
        Some(warning) => Err(ActivityError::Warning(warning)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities;
    use crate::records::{ActivityConfig, ActivityDraft, WorkItemDraft, WorkKind};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: ProjectStore,
        work_id: i64,
        timesheet_work: i64,
        employee: i64,
        company: i64,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(temp.path().join("project.db")).expect("store");
        let party = store.insert_party("Ann Smith").expect("party");
        let company = store.insert_company("Acme").expect("company");
        let employee = store.insert_employee(party, company).expect("employee");
        let work_id = store
            .insert_work_item(&WorkItemDraft {
                name: "roof repair".to_string(),
                kind: WorkKind::Task,
                party_id: Some(party),
                company_id: Some(company),
                ..Default::default()
            })
            .expect("work item");
        let timesheet_work = store.add_timesheet_work(work_id).expect("timesheet work");
        Fixture {
            _temp: temp,
            store,
            work_id,
            timesheet_work,
            employee,
            company,
        }
    }

    fn timed_activity(fixture: &Fixture, minutes: Option<i64>) -> i64 {
        activities::log_activity(
            &fixture.store,
            &ActivityDraft {
                duration_minutes: minutes,
                employee_id: Some(fixture.employee),
                company_id: Some(fixture.company),
                resource: Some(ResourceRef::work(fixture.work_id)),
                ..Default::default()
            },
        )
        .expect("activity")
    }

    #[test]
    fn creates_exactly_one_line_with_copied_attributes() {
        let fixture = fixture();
        let activity_id = timed_activity(&fixture, Some(90));

        let line = fixture
            .store
            .line_for_activity(activity_id)
            .expect("query")
            .expect("line created");
        assert_eq!(line.company_id, Some(fixture.company));
        assert_eq!(line.employee_id, Some(fixture.employee));
        assert_eq!(line.duration_minutes, Some(90));
        assert_eq!(line.timesheet_work_id, fixture.timesheet_work);
        let activity = fixture
            .store
            .activity(activity_id)
            .expect("query")
            .expect("exists");
        assert_eq!(line.date, activity.dtstart.date_naive());

        // Re-running the synchronization performs no further writes.
        sync_activity(&fixture.store, activity_id).expect("sync");
        let unchanged = fixture
            .store
            .line_for_activity(activity_id)
            .expect("query")
            .expect("still linked");
        assert_eq!(unchanged, line);
    }

    #[test]
    fn no_line_without_duration() {
        let fixture = fixture();
        let activity_id = timed_activity(&fixture, None);
        assert!(fixture
            .store
            .line_for_activity(activity_id)
            .expect("query")
            .is_none());
    }

    #[test]
    fn warns_when_work_item_has_no_timesheet_work() {
        let temp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(temp.path().join("project.db")).expect("store");
        let work_id = store
            .insert_work_item(&WorkItemDraft {
                name: "no timesheets".to_string(),
                kind: WorkKind::Task,
                ..Default::default()
            })
            .expect("work item");

        let draft = ActivityDraft {
            duration_minutes: Some(30),
            resource: Some(ResourceRef::work(work_id)),
            ..Default::default()
        };
        let err = activities::log_activity(&store, &draft).expect_err("warning expected");
        let ActivityError::Warning(warning) = err else {
            panic!("expected warning, got {err:?}");
        };
        // The gated create rolled back.
        assert!(store
            .activities_for_resource(&ResourceRef::work(work_id))
            .expect("query")
            .is_empty());

        // Acknowledging lets the retried create proceed, still without a
        // line because there is nothing to book against.
        warnings::acknowledge(&store, &warning.key).expect("acknowledge");
        let activity_id = activities::log_activity(&store, &draft).expect("retry");
        assert!(store
            .line_for_activity(activity_id)
            .expect("query")
            .is_none());
    }

    #[test]
    fn clearing_duration_deletes_line_after_warning() {
        let fixture = fixture();
        let activity_id = timed_activity(&fixture, Some(60));
        let line = fixture
            .store
            .line_for_activity(activity_id)
            .expect("query")
            .expect("line");

        let mut activity = fixture
            .store
            .activity(activity_id)
            .expect("query")
            .expect("exists");
        activity.duration_minutes = None;
        let err = activities::write_activity(&fixture.store, &activity).expect_err("warning");
        let ActivityError::Warning(warning) = err else {
            panic!("expected warning, got {err:?}");
        };
        // The write itself landed; only the line cleanup was gated.
        warnings::acknowledge(&fixture.store, &warning.key).expect("acknowledge");
        activities::write_activity(&fixture.store, &activity).expect("retry");
        assert!(fixture
            .store
            .timesheet_line(line.id)
            .expect("query")
            .is_none());
    }

    #[test]
    fn deleting_line_clears_activity_duration() {
        let fixture = fixture();
        let activity_id = timed_activity(&fixture, Some(45));
        let line = fixture
            .store
            .line_for_activity(activity_id)
            .expect("query")
            .expect("line");

        delete_timesheet_line(&fixture.store, line.id).expect("delete");
        let activity = fixture
            .store
            .activity(activity_id)
            .expect("query")
            .expect("exists");
        assert!(activity.duration_minutes.is_none());
    }

    #[test]
    fn line_write_mirrors_attributes_onto_activity() {
        let fixture = fixture();
        let activity_id = timed_activity(&fixture, Some(45));
        let mut line = fixture
            .store
            .line_for_activity(activity_id)
            .expect("query")
            .expect("line");

        line.duration_minutes = Some(75);
        line.date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        write_timesheet_line(&fixture.store, &line).expect("write");

        let activity = fixture
            .store
            .activity(activity_id)
            .expect("query")
            .expect("exists");
        assert_eq!(activity.duration_minutes, Some(75));
        assert_eq!(activity.dtstart.date_naive(), line.date);
    }

    #[test]
    fn line_under_other_work_item_reassigns_activity_after_warning() {
        let fixture = fixture();
        let activity_id = timed_activity(&fixture, Some(45));
        let line = fixture
            .store
            .line_for_activity(activity_id)
            .expect("query")
            .expect("line");

        let other_work = fixture
            .store
            .insert_work_item(&WorkItemDraft {
                name: "other".to_string(),
                kind: WorkKind::Task,
                ..Default::default()
            })
            .expect("work item");
        let other_timesheet_work = fixture
            .store
            .add_timesheet_work(other_work)
            .expect("timesheet work");
        let mut moved = line.clone();
        moved.timesheet_work_id = other_timesheet_work;

        let err = write_timesheet_line(&fixture.store, &moved).expect_err("warning");
        let ActivityError::Warning(warning) = err else {
            panic!("expected warning, got {err:?}");
        };
        warnings::acknowledge(&fixture.store, &warning.key).expect("acknowledge");
        write_timesheet_line(&fixture.store, &moved).expect("retry");

        let activity = fixture
            .store
            .activity(activity_id)
            .expect("query")
            .expect("exists");
        assert_eq!(activity.work_id(), Some(other_work));
    }

    #[test]
    fn disabled_synchronization_is_a_no_op_in_both_directions() {
        let fixture = fixture();
        let config = fixture.store.activity_config().expect("config");
        fixture
            .store
            .update_activity_config(&ActivityConfig {
                synchronize_activity_time: false,
                ..config
            })
            .expect("disable");

        let activity_id = timed_activity(&fixture, Some(60));
        assert!(fixture
            .store
            .line_for_activity(activity_id)
            .expect("query")
            .is_none());

        let line_id = create_timesheet_line(
            &fixture.store,
            &TimesheetLineDraft {
                company_id: None,
                employee_id: None,
                duration_minutes: Some(15),
                date: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
                timesheet_work_id: fixture.timesheet_work,
            },
        )
        .expect("line");
        fixture
            .store
            .link_activity_line(activity_id, line_id)
            .expect("link");

        delete_timesheet_line(&fixture.store, line_id).expect("delete");
        let activity = fixture
            .store
            .activity(activity_id)
            .expect("query")
            .expect("exists");
        // Duration untouched because synchronization is off.
        assert_eq!(activity.duration_minutes, Some(60));
    }
}
