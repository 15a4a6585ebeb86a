//! Task Supervisor: owns the registered managers and their lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gx_core::bus::EventBus;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::manager::{Manager, PublishGate, RunContext};
use crate::task::{SharedRecord, TaskRecord, TaskState, TaskStatus, run_loop};

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

struct Entry {
    manager: Arc<dyn Manager>,
    record: SharedRecord,
    /// Held by the running iteration. Outlives an abandoned loop.
    guard: Arc<tokio::sync::Mutex<()>>,
}

impl Entry {
    fn new(manager: Arc<dyn Manager>) -> Self {
        let record = TaskRecord::new(manager.name(), manager.interval());
        Self { manager, record, guard: Arc::new(tokio::sync::Mutex::new(())) }
    }
}

/// One `start()`..`stop_all()` cycle. Every cycle gets a fresh token and gate.
struct Run {
    cancel: CancellationToken,
    gate: Arc<PublishGate>,
    handles: Vec<(String, SharedRecord, JoinHandle<()>)>,
}

pub struct Supervisor {
    bus: EventBus,
    stop_grace: Duration,
    entries: Mutex<Vec<Entry>>,
    run: Mutex<Option<Run>>,
}

impl Supervisor {
    pub fn new(bus: EventBus, stop_grace: Duration) -> Self {
        Self { bus, stop_grace, entries: Mutex::new(Vec::new()), run: Mutex::new(None) }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Add a task. Registered while running, it is started right away.
    pub fn register(&self, manager: Arc<dyn Manager>) {
        let entry = Entry::new(manager);
        if let Some(run) = self.run.lock().as_mut() {
            let handle = self.spawn(&entry, run);
            run.handles.push(handle);
        }
        self.entries.lock().push(entry);
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().is_some()
    }

    /// Start every registered task; each fires its first iteration immediately.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut slot = self.run.lock();
        if slot.is_some() {
            warn!("[supervisor] start() while already running, ignored");
            return;
        }
        let mut run = Run { cancel: CancellationToken::new(), gate: Arc::new(PublishGate::default()), handles: Vec::new() };
        let entries = self.entries.lock();
        for entry in entries.iter() {
            let handle = self.spawn(entry, &run);
            run.handles.push(handle);
        }
        info!("[supervisor] started {} task(s)", run.handles.len());
        *slot = Some(run);
    }

    fn spawn(&self, entry: &Entry, run: &Run) -> (String, SharedRecord, JoinHandle<()>) {
        let name = entry.manager.name();
        let epoch = entry.record.lock().begin();
        let ctx = RunContext::new(name, run.cancel.clone(), Arc::clone(&run.gate), self.bus.clone());
        let handle = tokio::spawn(run_loop(
            Arc::clone(&entry.manager),
            Arc::clone(&entry.record),
            Arc::clone(&entry.guard),
            epoch,
            ctx,
        ));
        (name.to_string(), Arc::clone(&entry.record), handle)
    }

    /// Request cancellation, wait up to the stop grace for all tasks to wind
    /// down, then seal publishing. The grace is one deadline shared by every
    /// task. A task still busy at the deadline is abandoned: its handle is
    /// dropped, it can no longer publish or touch its status, and a later
    /// `start()` waits for its iteration before running the next one.
    pub async fn stop_all(&self) {
        let Some(run) = self.run.lock().take() else {
            return;
        };
        info!("[supervisor] stopping {} task(s)", run.handles.len());
        run.cancel.cancel();

        let deadline = tokio::time::Instant::now() + self.stop_grace;
        let mut abandoned = 0usize;
        for (name, record, handle) in run.handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("[supervisor] task '{name}' loop ended abnormally: {e}");
                    record.lock().set_state(TaskState::Stopped);
                }
                Err(_) => {
                    abandoned += 1;
                    warn!(
                        "[supervisor] task '{name}' still running after {} ms grace, abandoned",
                        self.stop_grace.as_millis()
                    );
                    record.lock().abandon();
                }
            }
        }
        run.gate.seal();
        info!("[supervisor] all tasks stopped ({abandoned} abandoned)");
    }

    /// Per-task state, in registration order.
    pub fn status(&self) -> Vec<TaskStatus> {
        let now = Utc::now();
        self.entries.lock().iter().map(|e| e.record.lock().status(now)).collect()
    }
}
