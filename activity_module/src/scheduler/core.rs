use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use super::executor::TaskExecutor;
use super::schedule::{next_run_after, validate_cron_expression};
use super::store::SqliteSchedulerStore;
use super::types::{Schedule, ScheduledTask, SchedulerError, TaskKind, ONE_SHOT_FAILURE_LIMIT};

pub struct Scheduler<E: TaskExecutor> {
    tasks: Vec<ScheduledTask>,
    executor: E,
    store: SqliteSchedulerStore,
    failure_counts: HashMap<Uuid, u32>,
}

impl<E: TaskExecutor> Scheduler<E> {
    pub fn load(storage_path: impl Into<PathBuf>, executor: E) -> Result<Self, SchedulerError> {
        let store = SqliteSchedulerStore::new(storage_path.into())?;
        let tasks = store.load_tasks()?;
        Ok(Self {
            tasks,
            executor,
            store,
            failure_counts: HashMap::new(),
        })
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn has_enabled_ingest_task(&self) -> bool {
        self.tasks
            .iter()
            .any(|task| task.enabled && matches!(task.kind, TaskKind::IngestMail(_)))
    }

    pub fn add_cron_task(
        &mut self,
        expression: &str,
        kind: TaskKind,
    ) -> Result<Uuid, SchedulerError> {
        validate_cron_expression(expression)?;
        let now = Utc::now();
        let next_run = next_run_after(expression, now)?;

        let task = ScheduledTask {
            id: Uuid::new_v4(),
            kind,
            schedule: Schedule::Cron {
                expression: expression.to_string(),
                next_run,
            },
            enabled: true,
            created_at: now,
            last_run: None,
        };

        self.store.insert_task(&task)?;
        let id = task.id;
        self.tasks.push(task);
        Ok(id)
    }

    pub fn add_one_shot_in(
        &mut self,
        delay: Duration,
        kind: TaskKind,
    ) -> Result<Uuid, SchedulerError> {
        let now = Utc::now();
        let chrono_delay =
            chrono::Duration::from_std(delay).map_err(|_| SchedulerError::DurationOutOfRange)?;
        self.add_one_shot_at(now + chrono_delay, kind)
    }

    pub fn add_one_shot_at(
        &mut self,
        run_at: DateTime<Utc>,
        kind: TaskKind,
    ) -> Result<Uuid, SchedulerError> {
        let task = ScheduledTask {
            id: Uuid::new_v4(),
            kind,
            schedule: Schedule::OneShot { run_at },
            enabled: true,
            created_at: Utc::now(),
            last_run: None,
        };

        self.store.insert_task(&task)?;
        let id = task.id;
        self.tasks.push(task);
        Ok(id)
    }

    /// Run every enabled, due task once. Stops at the first failing task
    /// so a broken batch is retried whole on the next tick.
    pub fn tick(&mut self) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let task_count = self.tasks.len();
        for index in 0..task_count {
            if !self.tasks[index].enabled {
                continue;
            }
            if !self.tasks[index].is_due(now) {
                continue;
            }
            self.execute_task_at_index(index)?;
        }
        Ok(())
    }

    fn execute_task_at_index(&mut self, index: usize) -> Result<(), SchedulerError> {
        let task_id = self.tasks[index].id;
        let task_kind = self.tasks[index].kind.clone();
        let started_at = Utc::now();
        let execution_id = self.store.record_execution_start(task_id, started_at)?;
        let result = self.executor.execute(&task_kind);
        let executed_at = Utc::now();

        match result {
            Ok(()) => {
                self.failure_counts.remove(&task_id);
                self.store
                    .record_execution_finish(execution_id, executed_at, "success", None)?;
                self.tasks[index].last_run = Some(executed_at);
                match &mut self.tasks[index].schedule {
                    Schedule::Cron {
                        expression,
                        next_run,
                    } => {
                        *next_run = next_run_after(expression, executed_at)?;
                    }
                    Schedule::OneShot { .. } => {
                        self.tasks[index].enabled = false;
                    }
                }
                self.store.update_task(&self.tasks[index])?;
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.store.record_execution_finish(
                    execution_id,
                    executed_at,
                    "failed",
                    Some(&message),
                )?;
                match &mut self.tasks[index].schedule {
                    // A failed cron task waits for its next slot instead of
                    // spinning on the same tick.
                    Schedule::Cron {
                        expression,
                        next_run,
                    } => {
                        *next_run = next_run_after(expression, executed_at)?;
                        self.store.update_task(&self.tasks[index])?;
                    }
                    Schedule::OneShot { .. } => {
                        let failures = self.failure_counts.entry(task_id).or_insert(0);
                        *failures += 1;
                        if *failures >= ONE_SHOT_FAILURE_LIMIT {
                            self.failure_counts.remove(&task_id);
                            self.tasks[index].enabled = false;
                            self.store.update_task(&self.tasks[index])?;
                            warn!(
                                "disabled one-shot task {} after repeated failures: {}",
                                task_id, message
                            );
                        }
                    }
                }
                Err(err)
            }
        }
    }

    pub fn run_loop(&mut self, poll_interval: Duration, stop_flag: &AtomicBool) {
        while !stop_flag.load(Ordering::Relaxed) {
            if let Err(err) = self.tick() {
                warn!("scheduler tick failed: {}", err);
            }
            std::thread::sleep(poll_interval);
        }
    }
}
