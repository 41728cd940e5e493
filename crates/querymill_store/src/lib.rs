//! CSV-backed, crash-safe record stores for the Querymill pipeline.
//!
//! A conversion corpus lives in flat CSV files, one per pipeline state
//! (pending, converted, failed_conversion, needs_review). This crate is
//! the storage and state-transition layer that keeps that corpus
//! consistent: point lookups stream the files, appends are guarded
//! against duplicate keys, deletes commit by atomic rename, and moves
//! between stores are append-then-delete so a crash can only ever
//! duplicate a record, never lose one.
//!
//! Concurrency model: one writer per store at a time, enforced with
//! advisory file locks (`lock` module); readers take shared locks and
//! only ever observe complete lines.

pub mod codec;
pub mod collection;
pub mod error;
pub mod lock;
pub mod mover;
pub mod store;

pub use collection::{Collection, CollectionCounts, ConservationReport, RepairedDuplicate};
pub use error::{Result, StoreError};
pub use lock::{LockError, StoreLockGuard};
pub use mover::move_record;
pub use store::Store;
