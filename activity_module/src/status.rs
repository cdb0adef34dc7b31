//! Work item status transitions driven by stakeholder-action activities.

use tracing::info;

use crate::records::Activity;
use crate::store::{ProjectStore, StoreError};

/// Advance the work item's status one step when a stakeholder-action
/// activity is logged against it.
///
/// Fires only when the activity's type carries the stakeholder-action
/// flag and the work item's current status names a successor. Each call
/// advances a single step; a cyclic status graph will keep advancing on
/// every logged activity.
pub fn maybe_advance_status(store: &ProjectStore, activity: &Activity) -> Result<bool, StoreError> {
    let Some(type_id) = activity.activity_type_id else {
        return Ok(false);
    };
    let Some(activity_type) = store.activity_type(type_id)? else {
        return Ok(false);
    };
    if !activity_type.update_status_on_stakeholder_action {
        return Ok(false);
    }
    let Some(work_id) = activity.work_id() else {
        return Ok(false);
    };
    let Some(work_item) = store.work_item(work_id)? else {
        return Ok(false);
    };
    let Some(status_id) = work_item.status_id else {
        return Ok(false);
    };
    let Some(status) = store.work_status(status_id)? else {
        return Ok(false);
    };
    let Some(successor_id) = status.stakeholder_action_status_id else {
        return Ok(false);
    };
    store.set_work_item_status(work_id, Some(successor_id))?;
    info!(
        "advanced work item {} from status {} to {} on activity {}",
        work_id, status_id, successor_id, activity.code
    );
    Ok(true)
}
