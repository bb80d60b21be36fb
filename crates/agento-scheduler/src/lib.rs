// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The task scheduler: runs persisted [`agento_store::ScheduledTask`]
//! recipes on their triggers, each execution creating a one-off chat via
//! the agent runner.
//!
//! # Shape
//!
//! ```text
//! Scheduler::start()
//!     │ loads active tasks
//!     ▼
//! per task: job_loop (spawned)           jobs map: task id → cancel token
//!     │ sleeps until next fire
//!     ▼
//! tick: Semaphore::acquire (max_concurrency)
//!     │ re-fetch task, stop-condition pre-check
//!     ▼
//! execute: interpolate → chat → history(running) → run_to_completion
//!     │
//!     ├─ success: persist messages + tokens, history=success,
//!     │           publish task_execution.finished
//!     └─ failure: history=failed, publish task_execution.failed
//! ```
//!
//! Background policy (§ error handling): a failing tick never propagates;
//! it is recorded in job history and the loop keeps its schedule.

mod events;
mod executor;
mod schedule;
mod scheduler;

pub use events::{AppEvent, EventBus};
pub use schedule::Schedule;
pub use scheduler::{Scheduler, DEFAULT_MAX_CONCURRENCY};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error(transparent)]
    Store(#[from] agento_store::StoreError),
}
