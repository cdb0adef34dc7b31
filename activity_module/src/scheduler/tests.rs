use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use super::{IngestMailTask, Schedule, Scheduler, SchedulerError, TaskExecutor, TaskKind};

#[derive(Default)]
struct NoopExecutor;

impl TaskExecutor for NoopExecutor {
    fn execute(&self, _task: &TaskKind) -> Result<(), SchedulerError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CountingExecutor {
    executions: Arc<AtomicUsize>,
    fail: bool,
}

impl TaskExecutor for CountingExecutor {
    fn execute(&self, _task: &TaskKind) -> Result<(), SchedulerError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(SchedulerError::TaskFailed("boom".to_string()))
        } else {
            Ok(())
        }
    }
}

#[test]
fn tasks_survive_a_reload() {
    let temp = TempDir::new().expect("tempdir");
    let tasks_db = temp.path().join("tasks.db");

    let mut scheduler = Scheduler::load(&tasks_db, NoopExecutor).expect("load");
    let ingest = TaskKind::IngestMail(IngestMailTask {
        project_db_path: PathBuf::from("/data/project.db"),
        mailbox_db_path: PathBuf::from("/data/mailbox.db"),
    });
    let cron_id = scheduler
        .add_cron_task("0 */15 * * * *", ingest)
        .expect("cron task");
    let one_shot_id = scheduler
        .add_one_shot_at(Utc::now() + chrono::Duration::days(1), TaskKind::Noop)
        .expect("one shot");

    let reloaded = Scheduler::load(&tasks_db, NoopExecutor).expect("reload");
    assert_eq!(reloaded.tasks().len(), 2);
    assert!(reloaded.has_enabled_ingest_task());

    let cron_task = reloaded
        .tasks()
        .iter()
        .find(|task| task.id == cron_id)
        .expect("cron task found");
    match (&cron_task.kind, &cron_task.schedule) {
        (TaskKind::IngestMail(ingest), Schedule::Cron { expression, .. }) => {
            assert_eq!(expression, "0 */15 * * * *");
            assert_eq!(ingest.project_db_path, PathBuf::from("/data/project.db"));
            assert_eq!(ingest.mailbox_db_path, PathBuf::from("/data/mailbox.db"));
        }
        other => panic!("unexpected task shape: {other:?}"),
    }
    let one_shot = reloaded
        .tasks()
        .iter()
        .find(|task| task.id == one_shot_id)
        .expect("one shot found");
    assert!(matches!(one_shot.kind, TaskKind::Noop));
}

#[test]
fn cron_expressions_must_have_six_fields() {
    let temp = TempDir::new().expect("tempdir");
    let mut scheduler =
        Scheduler::load(temp.path().join("tasks.db"), NoopExecutor).expect("load");
    let err = scheduler
        .add_cron_task("*/5 * * * *", TaskKind::Noop)
        .expect_err("rejected");
    assert!(matches!(err, SchedulerError::InvalidCron(5)));
}

#[test]
fn due_one_shot_runs_once_and_disables() {
    let temp = TempDir::new().expect("tempdir");
    let executor = CountingExecutor::default();
    let executions = executor.executions.clone();
    let mut scheduler = Scheduler::load(temp.path().join("tasks.db"), executor).expect("load");

    scheduler
        .add_one_shot_at(Utc::now() - chrono::Duration::minutes(1), TaskKind::Noop)
        .expect("one shot");
    scheduler.tick().expect("tick");
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert!(!scheduler.tasks()[0].enabled);
    assert!(scheduler.tasks()[0].last_run.is_some());

    scheduler.tick().expect("tick");
    assert_eq!(executions.load(Ordering::SeqCst), 1);
}

#[test]
fn repeatedly_failing_one_shot_is_disabled() {
    let temp = TempDir::new().expect("tempdir");
    let executor = CountingExecutor {
        executions: Arc::new(AtomicUsize::new(0)),
        fail: true,
    };
    let executions = executor.executions.clone();
    let mut scheduler = Scheduler::load(temp.path().join("tasks.db"), executor).expect("load");

    scheduler
        .add_one_shot_at(Utc::now() - chrono::Duration::minutes(1), TaskKind::Noop)
        .expect("one shot");
    for _ in 0..3 {
        assert!(scheduler.tick().is_err());
    }
    assert_eq!(executions.load(Ordering::SeqCst), 3);
    assert!(!scheduler.tasks()[0].enabled);

    // Disabled tasks are not retried.
    scheduler.tick().expect("tick");
    assert_eq!(executions.load(Ordering::SeqCst), 3);
}
