//! Denormalized activity display fields for work items.

use crate::records::{ActivitySummary, ResourceRef};
use crate::store::{ProjectStore, StoreError};

/// Compute the last-action/channel/contact fields for a work item in a
/// single pass over its activities.
///
/// `channel` and `contact_name` come from the chronologically earliest
/// activity, `last_action_date` from the most recent one. Comparisons
/// are `<=`/`>=`, so on equal timestamps the later-stored activity wins.
pub fn work_item_summary(
    store: &ProjectStore,
    work_item_id: i64,
) -> Result<ActivitySummary, StoreError> {
    let activities = store.activities_for_resource(&ResourceRef::work(work_item_id))?;
    let mut summary = ActivitySummary::default();
    let mut min_date = None;
    let mut max_date = None;
    for activity in &activities {
        if min_date.map_or(true, |date| activity.dtstart <= date) {
            min_date = Some(activity.dtstart);
            summary.channel = activity.activity_type_id;
            summary.contact_name = store
                .activity_contacts(activity.id)?
                .first()
                .map(|party| party.name.clone());
        }
        if max_date.map_or(true, |date| activity.dtstart >= date) {
            max_date = Some(activity.dtstart);
            summary.last_action_date = Some(activity.dtstart);
        }
    }
    Ok(summary)
}
