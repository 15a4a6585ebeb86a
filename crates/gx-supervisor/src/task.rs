//! One supervised task: state machine, bookkeeping and the scheduling loop.
//!
//! ```text
//! Stopped -> Starting -> Running -> Scheduled -> Running -> ... -> Stopped
//! ```
//!
//! `Starting` fires the first iteration immediately. Each iteration runs in
//! its own tokio task so a panic is caught at the join point instead of
//! taking the loop down. The next tick is planned only after the iteration
//! finished, so iterations of one task never overlap.
//!
//! An iteration holds the task's run guard until it returns, even after its
//! loop was abandoned, so a restarted loop waits for it. Every loop owns one
//! epoch of the record; once the supervisor retires that epoch the loop's
//! bookkeeping is discarded.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gx_core::bus::GatewayEvent;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Mutex as RunGuard;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::manager::{Manager, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Stopped,
    Starting,
    Scheduled,
    Running,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
        })
    }
}

/// Snapshot of one task for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub name: String,
    pub state: TaskState,
    pub active: bool,
    pub interval: Duration,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub runs: u64,
    pub failures: u64,
    /// Time since the last iteration finished.
    pub since_last_run: Option<Duration>,
}

#[derive(Debug)]
pub(crate) struct TaskRecord {
    name: String,
    interval: Duration,
    state: TaskState,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    runs: u64,
    failures: u64,
    epoch: u64,
}

pub(crate) type SharedRecord = Arc<Mutex<TaskRecord>>;

impl TaskRecord {
    pub(crate) fn new(name: &str, interval: Duration) -> SharedRecord {
        Arc::new(Mutex::new(Self {
            name: name.to_string(),
            interval,
            state: TaskState::Stopped,
            last_run_at: None,
            next_run_at: None,
            last_error: None,
            runs: 0,
            failures: 0,
            epoch: 0,
        }))
    }

    /// Open a new epoch for a loop about to start and return it.
    pub(crate) fn begin(&mut self) -> u64 {
        self.epoch += 1;
        self.set_state(TaskState::Starting);
        self.epoch
    }

    /// Retire the current loop: whatever it reports from now on is ignored.
    pub(crate) fn abandon(&mut self) {
        self.epoch += 1;
        self.set_error("abandoned");
        self.set_state(TaskState::Stopped);
    }

    pub(crate) fn set_state(&mut self, state: TaskState) {
        self.state = state;
        if state == TaskState::Stopped {
            self.next_run_at = None;
        }
    }

    pub(crate) fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub(crate) fn status(&self, now: DateTime<Utc>) -> TaskStatus {
        TaskStatus {
            name: self.name.clone(),
            state: self.state,
            active: self.state != TaskState::Stopped,
            interval: self.interval,
            last_run_at: self.last_run_at,
            next_run_at: self.next_run_at,
            last_error: self.last_error.clone(),
            runs: self.runs,
            failures: self.failures,
            since_last_run: self.last_run_at.and_then(|t| (now - t).to_std().ok()),
        }
    }
}

/// Planned tick after `planned`: one interval later, or, if that instant has
/// already passed, one interval from `now` (missed ticks are skipped).
pub fn next_tick(planned: Instant, interval: Duration, now: Instant) -> Instant {
    let next = planned + interval;
    if next > now { next } else { now + interval }
}

/// Apply `f` if `epoch` is still current. Returns false for a retired loop.
fn update(record: &SharedRecord, epoch: u64, f: impl FnOnce(&mut TaskRecord)) -> bool {
    let mut rec = record.lock();
    if rec.epoch != epoch {
        return false;
    }
    f(&mut rec);
    true
}

fn panic_message(err: &tokio::task::JoinError) -> String {
    if err.is_cancelled() {
        return "iteration cancelled".to_string();
    }
    format!("panicked: {err}")
}

/// Scheduling loop of one task. Returns once the context is cancelled or the
/// loop's epoch is retired.
pub(crate) async fn run_loop(
    manager: Arc<dyn Manager>,
    record: SharedRecord,
    guard: Arc<RunGuard<()>>,
    epoch: u64,
    ctx: RunContext,
) {
    let name = manager.name().to_string();
    let interval = manager.interval();
    let mut planned = Instant::now();
    info!("[supervisor] task '{name}' started (interval {} ms)", interval.as_millis());

    while !ctx.is_cancelled() {
        let permit = match Arc::clone(&guard).try_lock_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("[supervisor] task '{name}' previous iteration still running, waiting for it");
                tokio::select! {
                    _ = ctx.cancellation().cancelled() => break,
                    permit = Arc::clone(&guard).lock_owned() => permit,
                }
            }
        };
        if !update(&record, epoch, |rec| rec.set_state(TaskState::Running)) {
            break;
        }
        let run_id = Uuid::new_v4();
        let span = info_span!("task", name = %name, run_id = %run_id);

        let iteration = {
            let manager = Arc::clone(&manager);
            let ctx = ctx.clone();
            tokio::spawn(
                async move {
                    let _permit = permit;
                    manager.run_once(&ctx).await
                }
                .instrument(span),
            )
        };
        let failure = match iteration.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(join_err) => Some(panic_message(&join_err)),
        };

        let now = Instant::now();
        let next = next_tick(planned, interval, now);
        if planned + interval < now {
            debug!("[supervisor] task '{name}' overran its interval, skipping missed ticks");
        }
        planned = next;

        let finished = Utc::now();
        let current = update(&record, epoch, |rec| {
            rec.runs += 1;
            rec.last_run_at = Some(finished);
            rec.next_run_at = chrono::Duration::from_std(next - now).ok().map(|d| finished + d);
            match &failure {
                Some(error) => {
                    rec.failures += 1;
                    rec.last_error = Some(error.clone());
                }
                None => rec.last_error = None,
            }
            rec.set_state(TaskState::Scheduled);
        });
        if !current {
            debug!("[supervisor] task '{name}' iteration finished after its loop was abandoned");
            return;
        }

        if let Some(error) = failure {
            if ctx.is_cancelled() {
                debug!("[supervisor] task '{name}' iteration ended during stop: {error}");
            } else {
                warn!("[supervisor] task '{name}' iteration failed: {error}");
                ctx.publish(GatewayEvent::TaskFailed { task: name.clone(), error });
            }
        }

        tokio::select! {
            _ = ctx.cancellation().cancelled() => break,
            _ = tokio::time::sleep_until(next) => {}
        }
    }

    update(&record, epoch, |rec| rec.set_state(TaskState::Stopped));
    info!("[supervisor] task '{name}' stopped");
}
