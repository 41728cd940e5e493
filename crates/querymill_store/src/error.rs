//! Error types for the storage layer.

use std::path::{Path, PathBuf};

use querymill_protocol::StoreRole;
use thiserror::Error;

/// Storage operation result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage errors.
///
/// Two classes with very different handling: `NotFound`, `DuplicateKey`,
/// `InvalidTransition` and `DuplicateHolder` are flow-control outcomes
/// the caller branches on; `MalformedRecord`, `SchemaMismatch` and
/// `Storage` are corruption or I/O failures that must halt batch
/// processing.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Key absent from the queried store
    #[error("key {key} not found in {}", store.display())]
    NotFound { key: u64, store: PathBuf },

    /// Append target already holds this key
    #[error("key {key} already present in {}", store.display())]
    DuplicateKey { key: u64, store: PathBuf },

    /// A line failed to decode under its store's schema
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A record does not satisfy the destination store's required fields
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Illegal state-machine edge
    #[error("illegal transition: {from} -> {to}")]
    InvalidTransition { from: StoreRole, to: StoreRole },

    /// Key held by more than one store (crash-window leftover); the
    /// collection needs a reconcile pass before this key can move
    #[error("key {key} present in multiple stores: {}", roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", "))]
    DuplicateHolder { key: u64, roles: Vec<StoreRole> },

    /// Underlying I/O failure
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl From<crate::lock::LockError> for StoreError {
    fn from(err: crate::lock::LockError) -> Self {
        Self::Storage(err.into())
    }
}

impl StoreError {
    /// Stable kind name surfaced by the CLI and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "NotFound",
            StoreError::DuplicateKey { .. } => "Duplicate",
            StoreError::MalformedRecord(_) => "Malformed",
            StoreError::SchemaMismatch(_) => "SchemaMismatch",
            StoreError::InvalidTransition { .. } => "InvalidTransition",
            StoreError::DuplicateHolder { .. } => "DuplicateHolder",
            StoreError::Storage(_) => "Storage",
        }
    }

    /// Flow-control errors are expected outcomes; everything else is a
    /// corruption/I/O failure that halts the batch.
    pub fn is_flow_control(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. }
                | StoreError::DuplicateKey { .. }
                | StoreError::InvalidTransition { .. }
                | StoreError::DuplicateHolder { .. }
        )
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord(reason.into())
    }

    pub fn schema_mismatch(detail: impl Into<String>) -> Self {
        Self::SchemaMismatch(detail.into())
    }

    /// Classify a csv crate error: an error wrapping an underlying
    /// io::Error is an I/O failure, everything else is data corruption.
    pub fn from_csv(store: &Path, err: csv::Error) -> Self {
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(io) => Self::Storage(io),
                // is_io_error() guarantees the Io kind
                other => Self::malformed(format!("{}: {:?}", store.display(), other)),
            }
        } else {
            Self::malformed(format!("{}: {}", store.display(), err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let nf = StoreError::NotFound {
            key: 42,
            store: PathBuf::from("pending.csv"),
        };
        assert!(nf.is_flow_control());
        assert_eq!(nf.kind_name(), "NotFound");
        assert_eq!(nf.to_string(), "key 42 not found in pending.csv");

        let bad = StoreError::malformed("pending.csv: unbalanced quote");
        assert!(!bad.is_flow_control());
        assert_eq!(bad.kind_name(), "Malformed");
    }
}
