use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::records::{
    Activity, ActivityConfig, ActivityDraft, ActivityType, Attachment, AttachmentMeta, Company,
    Employee, Party, ResourceRef, TimesheetLine, TimesheetLineDraft, WorkItem, WorkItemDraft,
    WorkKind, WorkStatus,
};

mod migrations;
mod rows;
mod schema;

use migrations::{ensure_activity_columns, ensure_config_columns, ensure_work_status_columns};
use rows::{
    activity_from_row, line_from_row, work_item_from_row, ACTIVITY_COLUMNS, LINE_COLUMNS,
    WORK_ITEM_COLUMNS,
};
use schema::PROJECT_SCHEMA;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

/// SQLite-backed store for the project/activity records.
#[derive(Debug)]
pub struct ProjectStore {
    path: PathBuf,
}

impl ProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(PROJECT_SCHEMA)?;
        ensure_activity_columns(&conn)?;
        ensure_work_status_columns(&conn)?;
        ensure_config_columns(&conn)?;
        Ok(conn)
    }

    // ---- parties / companies / employees ----

    pub fn insert_party(&self, name: &str) -> Result<i64, StoreError> {
        let conn = self.open()?;
        conn.execute("INSERT INTO parties (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn party(&self, id: i64) -> Result<Option<Party>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, name FROM parties WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Party {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_company(&self, name: &str) -> Result<i64, StoreError> {
        let conn = self.open()?;
        conn.execute("INSERT INTO companies (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn company(&self, id: i64) -> Result<Option<Company>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, name FROM companies WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Company {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_employee(&self, party_id: i64, company_id: i64) -> Result<i64, StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO employees (party_id, company_id) VALUES (?1, ?2)",
            params![party_id, company_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn employee(&self, id: i64) -> Result<Option<Employee>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, party_id, company_id FROM employees WHERE id = ?1",
                params![id],
                employee_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn add_contact_mechanism(
        &self,
        party_id: i64,
        mechanism_type: &str,
        value: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO contact_mechanisms (party_id, mechanism_type, value)
             VALUES (?1, ?2, ?3)",
            params![party_id, mechanism_type, value],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Find the employee whose party owns the given email address.
    pub fn find_employee_by_email(&self, email: &str) -> Result<Option<Employee>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT e.id, e.party_id, e.company_id
                 FROM employees e
                 JOIN contact_mechanisms cm ON cm.party_id = e.party_id
                 WHERE cm.mechanism_type = 'email' AND lower(cm.value) = lower(?1)
                 LIMIT 1",
                params![email],
                employee_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Find the party that owns the given email address.
    pub fn find_party_by_email(&self, email: &str) -> Result<Option<Party>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT p.id, p.name
                 FROM parties p
                 JOIN contact_mechanisms cm ON cm.party_id = p.id
                 WHERE cm.mechanism_type = 'email' AND lower(cm.value) = lower(?1)
                 LIMIT 1",
                params![email],
                |row| {
                    Ok(Party {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // ---- statuses / activity types ----

    pub fn insert_work_status(
        &self,
        name: &str,
        progress: Option<f64>,
        stakeholder_action_status_id: Option<i64>,
    ) -> Result<i64, StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO work_statuses (name, progress, stakeholder_action_status_id)
             VALUES (?1, ?2, ?3)",
            params![name, progress, stakeholder_action_status_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn work_status(&self, id: i64) -> Result<Option<WorkStatus>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, name, progress, stakeholder_action_status_id
                 FROM work_statuses WHERE id = ?1",
                params![id],
                |row| {
                    Ok(WorkStatus {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        progress: row.get(2)?,
                        stakeholder_action_status_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn set_stakeholder_action_status(
        &self,
        status_id: i64,
        successor_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE work_statuses SET stakeholder_action_status_id = ?1 WHERE id = ?2",
            params![successor_id, status_id],
        )?;
        Ok(())
    }

    pub fn insert_activity_type(
        &self,
        name: &str,
        update_status_on_stakeholder_action: bool,
    ) -> Result<i64, StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO activity_types (name, update_status_on_stakeholder_action)
             VALUES (?1, ?2)",
            params![name, update_status_on_stakeholder_action as i64],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn activity_type(&self, id: i64) -> Result<Option<ActivityType>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, name, update_status_on_stakeholder_action
                 FROM activity_types WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ActivityType {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        update_status_on_stakeholder_action: row.get::<_, i64>(2)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // ---- work items ----

    pub fn insert_work_item(&self, draft: &WorkItemDraft) -> Result<i64, StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO work_items (name, kind, party_id, parent_id, status_id, company_id, comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                draft.name.as_str(),
                draft.kind.to_string(),
                draft.party_id,
                draft.parent_id,
                draft.status_id,
                draft.company_id,
                draft.comment.as_deref(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn work_item(&self, id: i64) -> Result<Option<WorkItem>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!("SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE id = ?1"),
                params![id],
                work_item_from_row,
            )
            .optional()?;
        row.map(|raw| raw.try_into_work_item()).transpose()
    }

    pub fn work_item_exists(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.open()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM work_items WHERE id = ?1",
                params![id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn set_work_item_status(&self, id: i64, status_id: Option<i64>) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE work_items SET status_id = ?1 WHERE id = ?2",
            params![status_id, id],
        )?;
        Ok(())
    }

    /// Work items of a kind under a party that are still open: no status,
    /// statusless progress, or progress below the terminal 1.0.
    pub fn open_work_items(
        &self,
        kind: WorkKind,
        party_id: i64,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT w.id, w.name, w.kind, w.party_id, w.parent_id, w.status_id, w.company_id, w.comment
             FROM work_items w
             LEFT JOIN work_statuses s ON s.id = w.status_id
             WHERE w.kind = ?1
               AND w.party_id = ?2
               AND (w.status_id IS NULL OR s.progress IS NULL OR s.progress < 1.0)
             ORDER BY w.id",
        )?;
        let rows = stmt.query_map(params![kind.to_string(), party_id], work_item_from_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into_work_item()?);
        }
        Ok(items)
    }

    pub fn add_work_item_contact(&self, work_item_id: i64, party_id: i64) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO work_item_contacts (work_item_id, party_id) VALUES (?1, ?2)",
            params![work_item_id, party_id],
        )?;
        Ok(())
    }

    pub fn work_item_contacts(&self, work_item_id: i64) -> Result<Vec<Party>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name
             FROM work_item_contacts wc
             JOIN parties p ON p.id = wc.party_id
             WHERE wc.work_item_id = ?1
             ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![work_item_id], |row| {
            Ok(Party {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut parties = Vec::new();
        for row in rows {
            parties.push(row?);
        }
        Ok(parties)
    }

    // ---- timesheet works ----

    pub fn add_timesheet_work(&self, work_item_id: i64) -> Result<i64, StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO timesheet_works (work_item_id) VALUES (?1)",
            params![work_item_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn timesheet_works(&self, work_item_id: i64) -> Result<Vec<i64>, StoreError> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT id FROM timesheet_works WHERE work_item_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![work_item_id], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn work_item_for_timesheet_work(
        &self,
        timesheet_work_id: i64,
    ) -> Result<Option<i64>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT work_item_id FROM timesheet_works WHERE id = ?1",
                params![timesheet_work_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(row)
    }

    // ---- activities ----

    /// Insert an activity, assigning its sequential code in the same
    /// transaction.
    pub fn insert_activity(&self, draft: &ActivityDraft) -> Result<i64, StoreError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let dtstart = draft.dtstart.unwrap_or_else(Utc::now);
        let (resource_model, resource_id) = resource_columns(draft.resource.as_ref());
        tx.execute(
            "INSERT INTO activities (code, dtstart, duration_minutes, activity_type_id, subject, description, state, employee_id, company_id, party_id, resource_model, resource_id)
             VALUES ('', ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                format_datetime(dtstart),
                draft.duration_minutes,
                draft.activity_type_id,
                draft.subject.as_deref(),
                draft.description.as_deref(),
                draft.state.to_string(),
                draft.employee_id,
                draft.company_id,
                draft.party_id,
                resource_model,
                resource_id,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE activities SET code = ?1 WHERE id = ?2",
            params![format!("ACT{id:05}"), id],
        )?;
        tx.commit()?;
        Ok(id)
    }

    pub fn activity(&self, id: i64) -> Result<Option<Activity>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1"),
                params![id],
                activity_from_row,
            )
            .optional()?;
        row.map(|raw| raw.try_into_activity()).transpose()
    }

    /// Activities logged against a resource, in storage order.
    pub fn activities_for_resource(
        &self,
        resource: &ResourceRef,
    ) -> Result<Vec<Activity>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities
             WHERE resource_model = ?1 AND resource_id = ?2
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![resource.model.as_str(), resource.id], activity_from_row)?;
        let mut activities = Vec::new();
        for row in rows {
            activities.push(row?.try_into_activity()?);
        }
        Ok(activities)
    }

    /// Write every mutable activity field back to storage.
    pub fn update_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        let conn = self.open()?;
        let (resource_model, resource_id) = resource_columns(activity.resource.as_ref());
        conn.execute(
            "UPDATE activities
             SET dtstart = ?1,
                 duration_minutes = ?2,
                 activity_type_id = ?3,
                 subject = ?4,
                 description = ?5,
                 state = ?6,
                 employee_id = ?7,
                 company_id = ?8,
                 party_id = ?9,
                 resource_model = ?10,
                 resource_id = ?11
             WHERE id = ?12",
            params![
                format_datetime(activity.dtstart),
                activity.duration_minutes,
                activity.activity_type_id,
                activity.subject.as_deref(),
                activity.description.as_deref(),
                activity.state.to_string(),
                activity.employee_id,
                activity.company_id,
                activity.party_id,
                resource_model,
                resource_id,
                activity.id,
            ],
        )?;
        Ok(())
    }

    pub fn set_activity_duration(
        &self,
        id: i64,
        duration_minutes: Option<i64>,
    ) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE activities SET duration_minutes = ?1 WHERE id = ?2",
            params![duration_minutes, id],
        )?;
        Ok(())
    }

    pub fn set_activity_resource(
        &self,
        id: i64,
        resource: Option<&ResourceRef>,
    ) -> Result<(), StoreError> {
        let conn = self.open()?;
        let (resource_model, resource_id) = resource_columns(resource);
        conn.execute(
            "UPDATE activities SET resource_model = ?1, resource_id = ?2 WHERE id = ?3",
            params![resource_model, resource_id, id],
        )?;
        Ok(())
    }

    /// Remove the activity row; join records cascade.
    pub fn delete_activity_record(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute("DELETE FROM activities WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn add_activity_contact(&self, activity_id: i64, party_id: i64) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO activity_contacts (activity_id, party_id) VALUES (?1, ?2)",
            params![activity_id, party_id],
        )?;
        Ok(())
    }

    pub fn activity_contacts(&self, activity_id: i64) -> Result<Vec<Party>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name
             FROM activity_contacts ac
             JOIN parties p ON p.id = ac.party_id
             WHERE ac.activity_id = ?1
             ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![activity_id], |row| {
            Ok(Party {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut parties = Vec::new();
        for row in rows {
            parties.push(row?);
        }
        Ok(parties)
    }

    // ---- timesheet lines ----

    pub fn insert_timesheet_line(&self, draft: &TimesheetLineDraft) -> Result<i64, StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO timesheet_lines (company_id, employee_id, duration_minutes, date, timesheet_work_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                draft.company_id,
                draft.employee_id,
                draft.duration_minutes,
                draft.date.format("%Y-%m-%d").to_string(),
                draft.timesheet_work_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn timesheet_line(&self, id: i64) -> Result<Option<TimesheetLine>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!("SELECT {LINE_COLUMNS} FROM timesheet_lines WHERE id = ?1"),
                params![id],
                line_from_row,
            )
            .optional()?;
        row.map(|raw| raw.try_into_line()).transpose()
    }

    pub fn update_timesheet_line(&self, line: &TimesheetLine) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE timesheet_lines
             SET company_id = ?1,
                 employee_id = ?2,
                 duration_minutes = ?3,
                 date = ?4,
                 timesheet_work_id = ?5
             WHERE id = ?6",
            params![
                line.company_id,
                line.employee_id,
                line.duration_minutes,
                line.date.format("%Y-%m-%d").to_string(),
                line.timesheet_work_id,
                line.id,
            ],
        )?;
        Ok(())
    }

    /// Remove the line row; the join record cascades.
    pub fn delete_timesheet_line_record(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute("DELETE FROM timesheet_lines WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Create the one-to-one activity/line join record. The UNIQUE
    /// constraints on both columns enforce the one-to-one shape.
    pub fn link_activity_line(&self, activity_id: i64, line_id: i64) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO activity_timesheet (activity_id, line_id) VALUES (?1, ?2)",
            params![activity_id, line_id],
        )?;
        Ok(())
    }

    pub fn line_for_activity(&self, activity_id: i64) -> Result<Option<TimesheetLine>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT l.id, l.company_id, l.employee_id, l.duration_minutes, l.date, l.timesheet_work_id
                 FROM activity_timesheet at
                 JOIN timesheet_lines l ON l.id = at.line_id
                 WHERE at.activity_id = ?1",
                params![activity_id],
                line_from_row,
            )
            .optional()?;
        row.map(|raw| raw.try_into_line()).transpose()
    }

    pub fn activity_for_line(&self, line_id: i64) -> Result<Option<Activity>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT a.id, a.code, a.dtstart, a.duration_minutes, a.activity_type_id, a.subject, a.description, a.state, a.employee_id, a.company_id, a.party_id, a.resource_model, a.resource_id
                 FROM activity_timesheet at
                 JOIN activities a ON a.id = at.activity_id
                 WHERE at.line_id = ?1",
                params![line_id],
                activity_from_row,
            )
            .optional()?;
        row.map(|raw| raw.try_into_activity()).transpose()
    }

    // ---- project references ----

    pub fn add_project_reference(&self, model: &str) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO project_references (model) VALUES (?1)",
            params![model],
        )?;
        Ok(())
    }

    /// The allow-list of models a resource reference may target.
    pub fn resource_models(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT model FROM project_references ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut models = Vec::new();
        for row in rows {
            models.push(row?);
        }
        Ok(models)
    }

    // ---- attachments ----

    pub fn insert_attachment(
        &self,
        name: &str,
        resource: &ResourceRef,
        data: &[u8],
    ) -> Result<i64, StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO attachments (name, resource_model, resource_id, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                resource.model.as_str(),
                resource.id,
                data,
                format_datetime(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn attachment(&self, id: i64) -> Result<Option<Attachment>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, name, resource_model, resource_id, data, created_at
                 FROM attachments WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, name, resource_model, resource_id, data, created_at)) = row else {
            return Ok(None);
        };
        Ok(Some(Attachment {
            id,
            name,
            resource: ResourceRef {
                model: resource_model,
                id: resource_id,
            },
            data,
            created_at: parse_datetime(&created_at)?,
        }))
    }

    pub fn attachments_for_resource(
        &self,
        resource: &ResourceRef,
    ) -> Result<Vec<AttachmentMeta>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, resource_model, resource_id, created_at
             FROM attachments
             WHERE resource_model = ?1 AND resource_id = ?2
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![resource.model.as_str(), resource.id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut attachments = Vec::new();
        for row in rows {
            let (id, name, resource_model, resource_id, created_at) = row?;
            attachments.push(AttachmentMeta {
                id,
                name,
                resource: ResourceRef {
                    model: resource_model,
                    id: resource_id,
                },
                created_at: parse_datetime(&created_at)?,
            });
        }
        Ok(attachments)
    }

    /// Delete attachments on a resource with a given name; used when a
    /// generated document is replaced.
    pub fn delete_attachments_named(
        &self,
        resource: &ResourceRef,
        name: &str,
    ) -> Result<usize, StoreError> {
        let conn = self.open()?;
        let deleted = conn.execute(
            "DELETE FROM attachments WHERE resource_model = ?1 AND resource_id = ?2 AND name = ?3",
            params![resource.model.as_str(), resource.id, name],
        )?;
        Ok(deleted)
    }

    // ---- configuration ----

    pub fn activity_config(&self) -> Result<ActivityConfig, StoreError> {
        let conn = self.open()?;
        let config = conn.query_row(
            "SELECT default_employee_id, default_activity_type_id, mailbox_id, synchronize_activity_time
             FROM activity_config WHERE id = 1",
            [],
            |row| {
                Ok(ActivityConfig {
                    default_employee_id: row.get(0)?,
                    default_activity_type_id: row.get(1)?,
                    mailbox_id: row.get(2)?,
                    synchronize_activity_time: row.get::<_, i64>(3)? != 0,
                })
            },
        )?;
        Ok(config)
    }

    pub fn update_activity_config(&self, config: &ActivityConfig) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE activity_config
             SET default_employee_id = ?1,
                 default_activity_type_id = ?2,
                 mailbox_id = ?3,
                 synchronize_activity_time = ?4
             WHERE id = 1",
            params![
                config.default_employee_id,
                config.default_activity_type_id,
                config.mailbox_id,
                config.synchronize_activity_time as i64,
            ],
        )?;
        Ok(())
    }

    // ---- warnings ----

    pub fn warning_acknowledged(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.open()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM acknowledged_warnings WHERE key = ?1",
                params![key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn acknowledge_warning(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO acknowledged_warnings (key, acknowledged_at) VALUES (?1, ?2)",
            params![key, format_datetime(Utc::now())],
        )?;
        Ok(())
    }
}

fn employee_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        party_id: row.get(1)?,
        company_id: row.get(2)?,
    })
}

fn resource_columns(resource: Option<&ResourceRef>) -> (Option<String>, Option<i64>) {
    match resource {
        Some(resource) => (Some(resource.model.clone()), Some(resource.id)),
        None => (None, None),
    }
}

pub(crate) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ActivityState;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn store() -> (TempDir, ProjectStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(temp.path().join("project.db")).expect("store");
        (temp, store)
    }

    #[test]
    fn activity_round_trip_assigns_code() {
        let (_temp, store) = store();
        let draft = ActivityDraft {
            subject: Some("kickoff call".to_string()),
            state: ActivityState::Done,
            resource: Some(ResourceRef::work(7)),
            ..Default::default()
        };
        let id = store.insert_activity(&draft).expect("insert");
        let activity = store.activity(id).expect("query").expect("exists");
        assert_eq!(activity.code, format!("ACT{id:05}"));
        assert_eq!(activity.state, ActivityState::Done);
        assert_eq!(activity.resource, Some(ResourceRef::work(7)));
        assert!(activity.duration_minutes.is_none());
    }

    #[test]
    fn join_record_is_unique_in_both_directions() {
        let (_temp, store) = store();
        let work_id = store
            .insert_work_item(&WorkItemDraft {
                name: "roof".to_string(),
                kind: WorkKind::Task,
                ..Default::default()
            })
            .expect("work item");
        let timesheet_work = store.add_timesheet_work(work_id).expect("timesheet work");
        let line = store
            .insert_timesheet_line(&TimesheetLineDraft {
                company_id: None,
                employee_id: None,
                duration_minutes: Some(30),
                date: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
                timesheet_work_id: timesheet_work,
            })
            .expect("line");
        let other_line = store
            .insert_timesheet_line(&TimesheetLineDraft {
                company_id: None,
                employee_id: None,
                duration_minutes: Some(15),
                date: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
                timesheet_work_id: timesheet_work,
            })
            .expect("other line");
        let activity = store
            .insert_activity(&ActivityDraft::default())
            .expect("activity");

        store.link_activity_line(activity, line).expect("link");
        assert!(store.link_activity_line(activity, other_line).is_err());

        let linked = store
            .line_for_activity(activity)
            .expect("query")
            .expect("linked");
        assert_eq!(linked.id, line);
        let back = store
            .activity_for_line(line)
            .expect("query")
            .expect("linked");
        assert_eq!(back.id, activity);
    }

    #[test]
    fn deleting_activity_cascades_join_record_only() {
        let (_temp, store) = store();
        let work_id = store
            .insert_work_item(&WorkItemDraft {
                name: "roof".to_string(),
                kind: WorkKind::Task,
                ..Default::default()
            })
            .expect("work item");
        let timesheet_work = store.add_timesheet_work(work_id).expect("timesheet work");
        let line = store
            .insert_timesheet_line(&TimesheetLineDraft {
                company_id: None,
                employee_id: None,
                duration_minutes: Some(30),
                date: NaiveDate::from_ymd_opt(2026, 2, 3).unwrap(),
                timesheet_work_id: timesheet_work,
            })
            .expect("line");
        let activity = store
            .insert_activity(&ActivityDraft::default())
            .expect("activity");
        store.link_activity_line(activity, line).expect("link");

        store.delete_activity_record(activity).expect("delete");
        assert!(store.activity_for_line(line).expect("query").is_none());
        assert!(store.timesheet_line(line).expect("query").is_some());
    }

    #[test]
    fn config_singleton_defaults_to_sync_enabled() {
        let (_temp, store) = store();
        let config = store.activity_config().expect("config");
        assert!(config.synchronize_activity_time);
        assert!(config.mailbox_id.is_none());

        store
            .update_activity_config(&ActivityConfig {
                synchronize_activity_time: false,
                ..config
            })
            .expect("update");
        assert!(!store.activity_config().expect("config").synchronize_activity_time);
    }

    #[test]
    fn open_work_items_excludes_terminal_statuses() {
        let (_temp, store) = store();
        let party = store.insert_party("Acme").expect("party");
        let open_status = store
            .insert_work_status("in progress", Some(0.4), None)
            .expect("status");
        let done_status = store
            .insert_work_status("done", Some(1.0), None)
            .expect("status");
        for (name, status) in [
            ("open task", Some(open_status)),
            ("done task", Some(done_status)),
            ("statusless task", None),
        ] {
            store
                .insert_work_item(&WorkItemDraft {
                    name: name.to_string(),
                    kind: WorkKind::Task,
                    party_id: Some(party),
                    status_id: status,
                    ..Default::default()
                })
                .expect("work item");
        }

        let open = store.open_work_items(WorkKind::Task, party).expect("open");
        let names: Vec<&str> = open.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, vec!["open task", "statusless task"]);
    }

    #[test]
    fn find_employee_by_email_matches_contact_mechanism() {
        let (_temp, store) = store();
        let party = store.insert_party("Ann Smith").expect("party");
        let company = store.insert_company("Acme").expect("company");
        let employee = store.insert_employee(party, company).expect("employee");
        store
            .add_contact_mechanism(party, "email", "Ann@Example.com")
            .expect("mechanism");

        let found = store
            .find_employee_by_email("ann@example.com")
            .expect("query")
            .expect("match");
        assert_eq!(found.id, employee);
        assert!(store
            .find_employee_by_email("missing@example.com")
            .expect("query")
            .is_none());
    }
}
