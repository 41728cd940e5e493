//! A logical collection: the four role stores of one conversion corpus.
//!
//! The central invariant is set membership, not ordering: at any
//! quiescent point every key lives in exactly one store. Counts are
//! always derived from the files on demand - there is no separately
//! maintained running total that can drift from ground truth.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use querymill_protocol::{Patch, StoreRole};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::mover;
use crate::store::Store;

/// Per-role record counts, recomputed from the store files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionCounts {
    pub pending: usize,
    pub converted: usize,
    pub failed_conversion: usize,
    pub needs_review: usize,
}

impl CollectionCounts {
    pub fn total(&self) -> usize {
        self.pending + self.converted + self.failed_conversion + self.needs_review
    }

    fn slot(&mut self, role: StoreRole) -> &mut usize {
        match role {
            StoreRole::Pending => &mut self.pending,
            StoreRole::Converted => &mut self.converted,
            StoreRole::FailedConversion => &mut self.failed_conversion,
            StoreRole::NeedsReview => &mut self.needs_review,
        }
    }
}

/// Outcome of the conservation check.
#[derive(Debug, Clone, Serialize)]
pub struct ConservationReport {
    pub counts: CollectionCounts,
    /// Keys found in more than one store, with every store holding them.
    pub duplicates: Vec<(u64, Vec<StoreRole>)>,
    /// Expected corpus size, when the caller knows it.
    pub expected_total: Option<usize>,
}

impl ConservationReport {
    /// The conservation law: zero duplicates, and (when the corpus size
    /// is known) total == corpus size.
    pub fn holds(&self) -> bool {
        self.duplicates.is_empty()
            && self
                .expected_total
                .map_or(true, |expected| self.counts.total() == expected)
    }
}

/// One duplicate repaired by `reconcile`.
#[derive(Debug, Clone, Serialize)]
pub struct RepairedDuplicate {
    pub key: u64,
    pub kept: StoreRole,
    pub removed: Vec<StoreRole>,
}

/// The four role stores of one corpus domain, in one directory.
#[derive(Debug, Clone)]
pub struct Collection {
    dir: PathBuf,
}

impl Collection {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store(&self, role: StoreRole) -> Store {
        Store::for_role(&self.dir, role)
    }

    /// Every store currently holding this key. More than one entry means
    /// a crash-window duplicate awaiting reconciliation; empty means the
    /// key is not in this collection.
    pub fn locate(&self, key: u64) -> Result<Vec<StoreRole>> {
        let mut holders = Vec::new();
        for role in StoreRole::all() {
            if self.store(role).exists(key)? {
                holders.push(role);
            }
        }
        Ok(holders)
    }

    /// Per-role counts, derived from the files on demand.
    pub fn counts(&self) -> Result<CollectionCounts> {
        let mut counts = CollectionCounts::default();
        for role in StoreRole::all() {
            *counts.slot(role) = self.store(role).count()?;
        }
        Ok(counts)
    }

    /// Check the conservation law across all stores.
    pub fn check(&self, expected_total: Option<usize>) -> Result<ConservationReport> {
        let mut counts = CollectionCounts::default();
        let mut holders: BTreeMap<u64, Vec<StoreRole>> = BTreeMap::new();
        for role in StoreRole::all() {
            let keys = self.store(role).keys()?;
            *counts.slot(role) = keys.len();
            for key in keys {
                holders.entry(key).or_default().push(role);
            }
        }
        let duplicates: Vec<(u64, Vec<StoreRole>)> = holders
            .into_iter()
            .filter(|(_, roles)| roles.len() > 1)
            .collect();
        if !duplicates.is_empty() {
            warn!(count = duplicates.len(), dir = %self.dir.display(), "conservation violated: duplicate keys");
        }
        Ok(ConservationReport {
            counts,
            duplicates,
            expected_total,
        })
    }

    /// Repair every crash-window duplicate: keep the copy in the role
    /// nearest the terminal state (converted > needs_review >
    /// failed_conversion > pending), delete the rest.
    pub fn reconcile(&self) -> Result<Vec<RepairedDuplicate>> {
        let report = self.check(None)?;
        let mut repaired = Vec::new();
        for (key, mut roles) in report.duplicates {
            roles.sort_by_key(|r| std::cmp::Reverse(r.reconcile_rank()));
            let kept = roles[0];
            let removed: Vec<StoreRole> = roles[1..].to_vec();
            for role in &removed {
                self.store(*role).delete(key)?;
            }
            info!(key, kept = %kept, dir = %self.dir.display(), "repaired duplicate");
            repaired.push(RepairedDuplicate { key, kept, removed });
        }
        Ok(repaired)
    }

    /// Run one state-machine transition for a key, validating the edge
    /// before delegating to the mover.
    pub fn transition(&self, key: u64, to: StoreRole, patch: &Patch) -> Result<()> {
        let holders = self.locate(key)?;
        let from = match holders.as_slice() {
            [] => {
                return Err(StoreError::NotFound {
                    key,
                    store: self.dir.clone(),
                })
            }
            [role] => *role,
            _ => {
                // Duplicates must be repaired before new transitions.
                return Err(StoreError::DuplicateHolder { key, roles: holders });
            }
        };
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { from, to });
        }
        mover::move_record(&self.store(from), &self.store(to), key, patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querymill_protocol::{fields, Record};
    use tempfile::TempDir;

    fn seed(collection: &Collection, keys: &[u64]) {
        let pending = collection.store(StoreRole::Pending);
        for &key in keys {
            pending
                .append(
                    &Record::new(key)
                        .with_field(fields::QUESTION, format!("question {key}"))
                        .with_field(fields::SOURCE_QUERY, format!("MATCH (n) RETURN {key}")),
                )
                .unwrap();
        }
    }

    fn translated(query: &str) -> Patch {
        let mut patch = Patch::new();
        patch.insert(fields::TRANSLATED_QUERY.to_string(), query.to_string());
        patch
    }

    #[test]
    fn test_conservation_after_batch_of_transitions() {
        let dir = TempDir::new().unwrap();
        let collection = Collection::open(dir.path());
        seed(&collection, &[0, 1, 2, 3, 4]);

        collection.transition(0, StoreRole::Converted, &translated("match $a;")).unwrap();
        let mut failed = Patch::new();
        failed.insert(fields::ERROR_REASON.to_string(), "size() unsupported".to_string());
        collection.transition(1, StoreRole::FailedConversion, &failed).unwrap();
        let mut review = translated("match $b;");
        review.insert(fields::REVIEW_REASON.to_string(), "does not answer question".to_string());
        collection.transition(2, StoreRole::NeedsReview, &review).unwrap();
        collection.transition(2, StoreRole::Converted, &translated("match $c;")).unwrap();

        let report = collection.check(Some(5)).unwrap();
        assert!(report.holds());
        assert_eq!(report.counts.pending, 2);
        assert_eq!(report.counts.converted, 2);
        assert_eq!(report.counts.failed_conversion, 1);
        assert_eq!(report.counts.needs_review, 0);
        assert_eq!(report.counts.total(), 5);
    }

    #[test]
    fn test_terminal_states_never_transition() {
        let dir = TempDir::new().unwrap();
        let collection = Collection::open(dir.path());
        seed(&collection, &[1]);
        collection.transition(1, StoreRole::Converted, &translated("match $x;")).unwrap();

        let err = collection
            .transition(1, StoreRole::FailedConversion, &Patch::new())
            .unwrap_err();
        assert_eq!(err.kind_name(), "InvalidTransition");
        assert!(collection.store(StoreRole::Converted).exists(1).unwrap());
    }

    #[test]
    fn test_reconcile_prefers_role_nearer_terminal() {
        let dir = TempDir::new().unwrap();
        let collection = Collection::open(dir.path());
        seed(&collection, &[10]);

        // Stage the crash window by hand: converted copy written, the
        // pending copy never deleted.
        let record = collection.store(StoreRole::Pending).read(10).unwrap();
        let mut enriched = record.clone();
        enriched.merge_patch(&translated("match $n;"));
        collection.store(StoreRole::Converted).append(&enriched).unwrap();

        let report = collection.check(Some(1)).unwrap();
        assert!(!report.holds());
        assert_eq!(report.duplicates.len(), 1);

        let repaired = collection.reconcile().unwrap();
        assert_eq!(repaired.len(), 1);
        assert_eq!(repaired[0].kept, StoreRole::Converted);
        assert_eq!(repaired[0].removed, vec![StoreRole::Pending]);

        let report = collection.check(Some(1)).unwrap();
        assert!(report.holds());
        assert!(collection.store(StoreRole::Converted).exists(10).unwrap());
        assert!(!collection.store(StoreRole::Pending).exists(10).unwrap());
    }

    #[test]
    fn test_transition_refuses_while_duplicated() {
        let dir = TempDir::new().unwrap();
        let collection = Collection::open(dir.path());
        seed(&collection, &[3]);
        let record = collection.store(StoreRole::Pending).read(3).unwrap();
        let mut enriched = record.clone();
        enriched.merge_patch(&translated("match $n;"));
        collection.store(StoreRole::NeedsReview).append(&{
            let mut r = enriched.clone();
            r.set(fields::REVIEW_REASON, "wrong aggregation");
            r
        }).unwrap();

        let err = collection
            .transition(3, StoreRole::Converted, &translated("match $n;"))
            .unwrap_err();
        assert_eq!(err.kind_name(), "DuplicateHolder");
        match err {
            StoreError::DuplicateHolder { key, roles } => {
                assert_eq!(key, 3);
                assert_eq!(roles, vec![StoreRole::Pending, StoreRole::NeedsReview]);
            }
            other => panic!("expected DuplicateHolder, got {other:?}"),
        }
        // Both copies untouched; reconcile is the way out.
        assert!(collection.store(StoreRole::Pending).exists(3).unwrap());
        assert!(collection.store(StoreRole::NeedsReview).exists(3).unwrap());
    }

    #[test]
    fn test_locate_and_missing_key() {
        let dir = TempDir::new().unwrap();
        let collection = Collection::open(dir.path());
        seed(&collection, &[5]);

        assert_eq!(collection.locate(5).unwrap(), vec![StoreRole::Pending]);
        assert!(collection.locate(99).unwrap().is_empty());
        let err = collection
            .transition(99, StoreRole::Converted, &Patch::new())
            .unwrap_err();
        assert_eq!(err.kind_name(), "NotFound");
    }

    #[test]
    fn test_expected_total_mismatch_fails_check() {
        let dir = TempDir::new().unwrap();
        let collection = Collection::open(dir.path());
        seed(&collection, &[1, 2]);
        let report = collection.check(Some(3)).unwrap();
        assert!(!report.holds());
        assert!(report.duplicates.is_empty());
    }
}
