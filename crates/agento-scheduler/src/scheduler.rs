// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use agento_config::ProfileStore;
use agento_core::AgentRunner;
use agento_store::{ScheduledTask, Store, TaskStatus};

use crate::events::EventBus;
use crate::executor;
use crate::schedule::Schedule;
use crate::SchedulerError;

/// Default execution concurrency when user settings do not override it.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

pub(crate) struct Inner {
    pub(crate) store: Arc<Store>,
    pub(crate) runner: Arc<AgentRunner>,
    pub(crate) profiles: ProfileStore,
    pub(crate) bus: EventBus,
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) jobs: Mutex<HashMap<Uuid, CancellationToken>>,
    pub(crate) root: CancellationToken,
}

/// In-process task scheduler.  Cheap to clone; all clones share one job
/// map and one concurrency semaphore.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        runner: Arc<AgentRunner>,
        profiles: ProfileStore,
        bus: EventBus,
        max_concurrency: usize,
    ) -> Self {
        let permits = max_concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                store,
                runner,
                profiles,
                bus,
                semaphore: Arc::new(Semaphore::new(permits)),
                jobs: Mutex::new(HashMap::new()),
                root: CancellationToken::new(),
            }),
        }
    }

    /// Load every active task and begin scheduling.  Rows abandoned in
    /// `running` state by a previous process are failed first.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let abandoned = self.inner.store.fail_abandoned_jobs().await?;
        if abandoned > 0 {
            warn!(abandoned, "failed job-history rows abandoned by a previous run");
        }

        let tasks = self.inner.store.list_active_tasks().await?;
        let count = tasks.len();
        for task in tasks {
            if let Err(e) = self.schedule_task(&task).await {
                warn!(task = %task.id, "could not schedule task: {e}");
            }
        }
        info!(tasks = count, "scheduler started");
        Ok(())
    }

    /// Create: persist, then schedule when active.
    pub async fn create_task(&self, task: &ScheduledTask) -> Result<(), SchedulerError> {
        // Reject unparseable schedules before persisting anything.
        Schedule::from_config(task.schedule_type, &task.schedule_config)?;
        self.inner.store.create_task(task).await?;
        if task.status == TaskStatus::Active {
            self.schedule_task(task).await?;
        }
        Ok(())
    }

    /// Update: re-persist, then drop and re-add the schedule entry.
    pub async fn update_task(&self, task: &ScheduledTask) -> Result<(), SchedulerError> {
        Schedule::from_config(task.schedule_type, &task.schedule_config)?;
        self.inner.store.update_task(task).await?;
        self.unschedule(task.id).await;
        if task.status == TaskStatus::Active {
            self.schedule_task(task).await?;
        }
        Ok(())
    }

    /// Delete: remove from the scheduler, then from the store.
    pub async fn delete_task(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.unschedule(id).await;
        self.inner.store.delete_task(id).await?;
        Ok(())
    }

    /// Pause: a paused task must not have an active schedule entry.
    pub async fn pause_task(&self, id: Uuid) -> Result<ScheduledTask, SchedulerError> {
        self.inner.store.set_task_status(id, TaskStatus::Paused).await?;
        self.unschedule(id).await;
        let _ = self.inner.store.set_task_next_run(id, None).await;
        Ok(self.inner.store.get_task(id).await?)
    }

    /// Resume: flip to active and re-add.
    pub async fn resume_task(&self, id: Uuid) -> Result<ScheduledTask, SchedulerError> {
        self.inner.store.set_task_status(id, TaskStatus::Active).await?;
        let task = self.inner.store.get_task(id).await?;
        self.schedule_task(&task).await?;
        Ok(task)
    }

    /// Stop all job loops (process shutdown).
    pub async fn shutdown(&self) {
        self.inner.root.cancel();
        self.inner.jobs.lock().await.clear();
        info!("scheduler stopped");
    }

    async fn schedule_task(&self, task: &ScheduledTask) -> Result<(), SchedulerError> {
        let schedule = Schedule::from_config(task.schedule_type, &task.schedule_config)?;

        let Some(first_fire) = schedule.next_fire(Utc::now()) else {
            // A one-off already in the past has nothing left to do.
            warn!(task = %task.id, "schedule has no future fire time; not scheduling");
            return Ok(());
        };
        let _ = self
            .inner
            .store
            .set_task_next_run(task.id, Some(first_fire))
            .await;

        let cancel = self.inner.root.child_token();
        {
            let mut jobs = self.inner.jobs.lock().await;
            if let Some(previous) = jobs.insert(task.id, cancel.clone()) {
                previous.cancel();
            }
        }

        let inner = self.inner.clone();
        let task_id = task.id;
        tokio::spawn(job_loop(inner, task_id, schedule, cancel));
        Ok(())
    }

    pub(crate) async fn unschedule(&self, id: Uuid) {
        let mut jobs = self.inner.jobs.lock().await;
        if let Some(token) = jobs.remove(&id) {
            token.cancel();
        }
    }

    /// Number of tasks currently scheduled (test and introspection hook).
    pub async fn scheduled_count(&self) -> usize {
        self.inner.jobs.lock().await.len()
    }
}

/// One spawned loop per scheduled task: sleep until the next fire, run one
/// tick, repeat.  Exits when the schedule exhausts or the token fires.
async fn job_loop(
    inner: Arc<Inner>,
    task_id: Uuid,
    schedule: Schedule,
    cancel: CancellationToken,
) {
    loop {
        let Some(next) = schedule.next_fire(Utc::now()) else {
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = cancel.cancelled() => return,
        }

        executor::run_tick(&inner, task_id, &schedule, &cancel).await;

        if cancel.is_cancelled() {
            return;
        }
        if matches!(schedule, Schedule::OneOff(_)) {
            break;
        }
    }

    // Exhausted schedule: drop our registration so the map stays accurate.
    inner.jobs.lock().await.remove(&task_id);
}
