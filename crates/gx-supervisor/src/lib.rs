//! # gx-supervisor
//!
//! Runs periodic managers as independent, self-rescheduling tasks.
//!
//! | Module       | Role                                                  |
//! |--------------|-------------------------------------------------------|
//! | `manager`    | [`Manager`] trait and the per-iteration [`RunContext`] |
//! | `task`       | task state machine, bookkeeping, scheduling loop      |
//! | `supervisor` | [`Supervisor`]: `start`, `stop_all`, `status`          |
//! | `managers`   | market pulse, account snapshots, revalidation         |

pub mod manager;
pub mod managers;
pub mod supervisor;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{Manager, RunContext};
pub use managers::{AccountSnapshotManager, MarketPulseManager, RevalidationManager};
pub use supervisor::{DEFAULT_STOP_GRACE, Supervisor};
pub use task::{TaskState, TaskStatus, next_tick};
