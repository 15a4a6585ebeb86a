//! Core data model: credentials, provider descriptors, aggregation results.

pub mod credential;
pub mod enums;
pub mod metric;
pub mod provider;

pub use credential::*;
pub use enums::*;
pub use metric::*;
pub use provider::*;
