// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task Scheduler
//!
//! Background execution seam used for process output pumping, readiness
//! probes, forced kills, builds and directory scans.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Abstract one-shot, delayed and repeating background tasks

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub type ScheduledTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Produces one run of a repeating task.
pub type RepeatingTask = Arc<dyn Fn() -> ScheduledTask + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

pub trait TaskScheduler: Send + Sync {
    /// Runs `task` in the background as soon as possible.
    fn run_async(&self, task: ScheduledTask) -> TaskHandle;

    /// Runs `task` once after `delay`.
    fn schedule(&self, task: ScheduledTask, delay: Duration) -> TaskHandle;

    /// Runs `task` after `delay`, then every `interval` until cancelled.
    /// Runs never overlap.
    fn schedule_repeating(
        &self,
        task: RepeatingTask,
        delay: Duration,
        interval: Duration,
    ) -> TaskHandle;

    /// Cancels a pending or running task. Unknown handles are ignored.
    fn cancel(&self, handle: TaskHandle);
}
