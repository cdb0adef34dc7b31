pub(super) const PROJECT_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS parties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contact_mechanisms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    party_id INTEGER NOT NULL REFERENCES parties(id) ON DELETE CASCADE,
    mechanism_type TEXT NOT NULL,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS companies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS employees (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    party_id INTEGER NOT NULL REFERENCES parties(id),
    company_id INTEGER NOT NULL REFERENCES companies(id)
);

CREATE TABLE IF NOT EXISTS work_statuses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    progress REAL,
    stakeholder_action_status_id INTEGER REFERENCES work_statuses(id)
);

CREATE TABLE IF NOT EXISTS activity_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    update_status_on_stakeholder_action INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS work_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    party_id INTEGER REFERENCES parties(id),
    parent_id INTEGER REFERENCES work_items(id),
    status_id INTEGER REFERENCES work_statuses(id),
    company_id INTEGER REFERENCES companies(id),
    comment TEXT
);

CREATE TABLE IF NOT EXISTS work_item_contacts (
    work_item_id INTEGER NOT NULL REFERENCES work_items(id) ON DELETE CASCADE,
    party_id INTEGER NOT NULL REFERENCES parties(id) ON DELETE CASCADE,
    UNIQUE(work_item_id, party_id)
);

CREATE TABLE IF NOT EXISTS timesheet_works (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    work_item_id INTEGER NOT NULL REFERENCES work_items(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS activities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL DEFAULT '',
    dtstart TEXT NOT NULL,
    duration_minutes INTEGER,
    activity_type_id INTEGER REFERENCES activity_types(id),
    subject TEXT,
    description TEXT,
    state TEXT NOT NULL DEFAULT 'planned',
    employee_id INTEGER REFERENCES employees(id),
    party_id INTEGER REFERENCES parties(id),
    resource_model TEXT,
    resource_id INTEGER
);

CREATE TABLE IF NOT EXISTS activity_contacts (
    activity_id INTEGER NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    party_id INTEGER NOT NULL REFERENCES parties(id) ON DELETE CASCADE,
    UNIQUE(activity_id, party_id)
);

CREATE TABLE IF NOT EXISTS timesheet_lines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id INTEGER REFERENCES companies(id),
    employee_id INTEGER REFERENCES employees(id),
    duration_minutes INTEGER,
    date TEXT NOT NULL,
    timesheet_work_id INTEGER NOT NULL REFERENCES timesheet_works(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS activity_timesheet (
    activity_id INTEGER NOT NULL UNIQUE REFERENCES activities(id) ON DELETE CASCADE,
    line_id INTEGER NOT NULL UNIQUE REFERENCES timesheet_lines(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS project_references (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    resource_model TEXT NOT NULL,
    resource_id INTEGER NOT NULL,
    data BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activity_config (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    default_employee_id INTEGER REFERENCES employees(id),
    default_activity_type_id INTEGER REFERENCES activity_types(id),
    mailbox_id INTEGER,
    synchronize_activity_time INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS acknowledged_warnings (
    key TEXT PRIMARY KEY,
    acknowledged_at TEXT NOT NULL
);

INSERT OR IGNORE INTO activity_config (id, synchronize_activity_time) VALUES (1, 1);
INSERT OR IGNORE INTO project_references (model) VALUES ('project.work');
"#;
