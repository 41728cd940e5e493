//! Shared types for the Querymill conversion pipeline.
//!
//! A corpus of question/query pairs moves through a small state machine
//! backed by flat CSV stores. This crate defines the record shape, the
//! per-store schemas, and the legal state transitions; the storage
//! mechanics live in `querymill_store`.

pub mod fields;
pub mod record;
pub mod role;

// Re-export types for convenience
pub use record::{Patch, Record};
pub use role::{StoreRole, StoreSchema};
