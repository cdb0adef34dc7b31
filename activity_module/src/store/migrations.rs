use rusqlite::Connection;
use std::collections::HashSet;

use super::StoreError;

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }
    Ok(columns)
}

pub(super) fn ensure_activity_columns(conn: &Connection) -> Result<(), StoreError> {
    let columns = table_columns(conn, "activities")?;
    if !columns.contains("company_id") {
        conn.execute(
            "ALTER TABLE activities ADD COLUMN company_id INTEGER REFERENCES companies(id)",
            [],
        )?;
    }
    if !columns.contains("party_id") {
        conn.execute(
            "ALTER TABLE activities ADD COLUMN party_id INTEGER REFERENCES parties(id)",
            [],
        )?;
    }
    Ok(())
}

pub(super) fn ensure_work_status_columns(conn: &Connection) -> Result<(), StoreError> {
    let columns = table_columns(conn, "work_statuses")?;
    if !columns.contains("stakeholder_action_status_id") {
        conn.execute(
            "ALTER TABLE work_statuses ADD COLUMN stakeholder_action_status_id INTEGER REFERENCES work_statuses(id)",
            [],
        )?;
    }
    Ok(())
}

pub(super) fn ensure_config_columns(conn: &Connection) -> Result<(), StoreError> {
    let columns = table_columns(conn, "activity_config")?;
    if !columns.contains("mailbox_id") {
        conn.execute("ALTER TABLE activity_config ADD COLUMN mailbox_id INTEGER", [])?;
    }
    Ok(())
}
