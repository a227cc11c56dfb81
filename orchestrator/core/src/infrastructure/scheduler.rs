// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tokio Task Scheduler
//!
//! [`TaskScheduler`] on top of a tokio runtime. Every task is a spawned
//! tokio task; cancellation aborts it.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Background execution for supervision, probes and builds

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

use crate::domain::scheduler::{RepeatingTask, ScheduledTask, TaskHandle, TaskScheduler};

pub struct TokioTaskScheduler {
    runtime: Handle,
    next_id: AtomicU64,
    tasks: Arc<DashMap<TaskHandle, AbortHandle>>,
}

impl TokioTaskScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(DashMap::new()),
        }
    }

    /// Number of tasks that have not finished or been cancelled.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    fn spawn(&self, task: ScheduledTask) -> TaskHandle {
        let handle = TaskHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tasks = Arc::clone(&self.tasks);
        let (recorded, wait_recorded) = oneshot::channel::<()>();
        let join = self.runtime.spawn(async move {
            // Held back until the abort handle is in the table, so the
            // removal below always follows the insert.
            let _ = wait_recorded.await;
            task.await;
            tasks.remove(&handle);
        });
        self.tasks.insert(handle, join.abort_handle());
        let _ = recorded.send(());
        handle
    }
}

impl TaskScheduler for TokioTaskScheduler {
    fn run_async(&self, task: ScheduledTask) -> TaskHandle {
        self.spawn(task)
    }

    fn schedule(&self, task: ScheduledTask, delay: Duration) -> TaskHandle {
        self.spawn(Box::pin(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }))
    }

    fn schedule_repeating(
        &self,
        task: RepeatingTask,
        delay: Duration,
        interval: Duration,
    ) -> TaskHandle {
        self.spawn(Box::pin(async move {
            tokio::time::sleep(delay).await;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task().await;
            }
        }))
    }

    fn cancel(&self, handle: TaskHandle) {
        if let Some((_, abort)) = self.tasks.remove(&handle) {
            trace!("Cancelling task {:?}", handle);
            abort.abort();
        }
    }
}
