//! # gx-core
//!
//! Core crate for the multi-provider gateway, providing:
//!
//! - **Types** (`types`): credentials, provider descriptors, aggregation results
//! - **Configuration** (`config`): JSON config deserialization and validation
//! - **Error types** (`error`): domain-specific `GxError` via thiserror
//! - **Credential Store** (`store`): per-row locked, versioned credential rows
//! - **Event Bus** (`bus`): non-blocking typed publish/subscribe
//! - **Transport** (`transport`): injectable HTTP seam with a reqwest backend
//! - **Time utilities** (`time_util`): wall-clock and strictly increasing timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod time_util;
pub mod transport;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
