//! The unit of supervised work and what it sees while running.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use gx_core::bus::{EventBus, GatewayEvent};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// A periodic task.
///
/// `run_once` is never called concurrently with itself. A returned error or
/// a panic fails only the current iteration; the task is rescheduled as
/// usual.
#[async_trait]
pub trait Manager: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn run_once(&self, ctx: &RunContext) -> Result<()>;
}

/// Publish permission shared by every task of one supervisor run.
///
/// Sealing takes the write lock, so it waits for any publish already past
/// the check; nothing reaches the bus once `seal` returns.
#[derive(Debug, Default)]
pub(crate) struct PublishGate {
    sealed: RwLock<bool>,
}

impl PublishGate {
    pub(crate) fn seal(&self) {
        *self.sealed.write() = true;
    }

    fn publish(&self, bus: &EventBus, event: GatewayEvent) -> bool {
        let sealed = self.sealed.read();
        if *sealed {
            return false;
        }
        bus.publish(event);
        true
    }
}

/// Handle passed to every iteration.
#[derive(Clone)]
pub struct RunContext {
    task: Arc<str>,
    cancel: CancellationToken,
    gate: Arc<PublishGate>,
    bus: EventBus,
}

impl RunContext {
    pub(crate) fn new(task: &str, cancel: CancellationToken, gate: Arc<PublishGate>, bus: EventBus) -> Self {
        Self { task: Arc::from(task), cancel, gate, bus }
    }

    pub fn task_name(&self) -> &str {
        &self.task
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Call between sub-steps: errors out once a stop was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            bail!("task '{}' cancelled", self.task);
        }
        Ok(())
    }

    /// Publish on the bus. Returns `false` (and drops the event) after the
    /// supervisor has stopped.
    pub fn publish(&self, event: GatewayEvent) -> bool {
        self.gate.publish(&self.bus, event)
    }
}

#[cfg(test)]
impl RunContext {
    /// Context wired to `bus`, for exercising a manager outside a supervisor.
    pub fn for_test(bus: EventBus) -> Self {
        Self::new("test", CancellationToken::new(), Arc::new(PublishGate::default()), bus)
    }
}
