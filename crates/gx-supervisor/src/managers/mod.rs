//! Built-in managers.

pub mod pulse;
pub mod revalidation;
pub mod snapshot;

pub use pulse::MarketPulseManager;
pub use revalidation::RevalidationManager;
pub use snapshot::AccountSnapshotManager;
