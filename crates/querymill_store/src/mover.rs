//! Cross-store moves: delete-from-source + append-to-destination as one
//! crash-safe logical unit.
//!
//! The order is append-then-delete, never the reverse. A crash between
//! the two steps leaves the key in BOTH stores - a detectable duplicate
//! the reconciliation pass repairs - instead of in neither, which would
//! be silent loss. For a corpus whose whole value is completeness,
//! duplication is the recoverable failure and loss is not.

use querymill_protocol::{Patch, Record};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// Move the record with `key` from `source` to `destination`, merging
/// `patch` into its fields on the way.
///
/// Steps:
/// 1. read from source (`NotFound` if absent)
/// 2. merge the patch and check the destination schema
///    (`SchemaMismatch` before anything is written)
/// 3. append to destination
/// 4. delete from source
///
/// Re-running an interrupted move is the repair: if the destination
/// already holds the key, the append step is treated as done and the
/// move proceeds straight to the source delete.
pub fn move_record(source: &Store, destination: &Store, key: u64, patch: &Patch) -> Result<()> {
    let record = preview(source, destination, key, patch)?;

    match destination.append(&record) {
        Ok(()) => {}
        Err(StoreError::DuplicateKey { .. }) => {
            // Leftover from a move that crashed between append and
            // delete; the destination copy wins.
            info!(
                key,
                destination = %destination.path().display(),
                "destination already holds key, completing interrupted move"
            );
        }
        Err(e) => return Err(e),
    }

    source.delete(key)?;

    debug!(
        key,
        source = %source.path().display(),
        destination = %destination.path().display(),
        "moved record"
    );
    Ok(())
}

/// The patched record that `move_record` would write, without moving
/// anything. Used by callers that want to show or validate the merge.
pub fn preview(source: &Store, destination: &Store, key: u64, patch: &Patch) -> Result<Record> {
    let mut record = source.read(key)?;
    record.merge_patch(patch);
    if !destination.schema().satisfied_by(&record) {
        return Err(StoreError::schema_mismatch(format!(
            "record {} cannot enter {}: missing fields {}",
            key,
            destination.path().display(),
            destination.schema().missing_columns(&record).join(", ")
        )));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use querymill_protocol::{fields, StoreRole};
    use tempfile::TempDir;

    fn stores(dir: &TempDir) -> (Store, Store) {
        (
            Store::for_role(dir.path(), StoreRole::Pending),
            Store::for_role(dir.path(), StoreRole::Converted),
        )
    }

    fn seed_pending(store: &Store, key: u64) {
        store
            .append(
                &Record::new(key)
                    .with_field(fields::QUESTION, "How many users?")
                    .with_field(fields::SOURCE_QUERY, "MATCH (u:User) RETURN count(u)"),
            )
            .unwrap();
    }

    fn translation_patch() -> Patch {
        let mut patch = Patch::new();
        patch.insert(
            fields::TRANSLATED_QUERY.to_string(),
            "match $u isa user; reduce $c = count;".to_string(),
        );
        patch
    }

    #[test]
    fn test_move_with_patch() {
        let dir = TempDir::new().unwrap();
        let (pending, converted) = stores(&dir);
        seed_pending(&pending, 42);

        move_record(&pending, &converted, 42, &translation_patch()).unwrap();

        assert!(!pending.exists(42).unwrap());
        assert!(converted.exists(42).unwrap());
        let moved = converted.read(42).unwrap();
        assert_eq!(moved.get(fields::QUESTION), Some("How many users?"));
        assert_eq!(
            moved.get(fields::TRANSLATED_QUERY),
            Some("match $u isa user; reduce $c = count;")
        );
    }

    #[test]
    fn test_second_move_is_not_found_and_destination_unchanged() {
        let dir = TempDir::new().unwrap();
        let (pending, converted) = stores(&dir);
        seed_pending(&pending, 42);
        move_record(&pending, &converted, 42, &translation_patch()).unwrap();
        let before = std::fs::read(converted.path()).unwrap();

        let err = move_record(&pending, &converted, 42, &translation_patch()).unwrap_err();
        assert_eq!(err.kind_name(), "NotFound");
        assert_eq!(std::fs::read(converted.path()).unwrap(), before);
    }

    #[test]
    fn test_schema_mismatch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (pending, converted) = stores(&dir);
        seed_pending(&pending, 1);

        // No translated_query in the patch: move must refuse.
        let err = move_record(&pending, &converted, 1, &Patch::new()).unwrap_err();
        assert_eq!(err.kind_name(), "SchemaMismatch");
        assert!(pending.exists(1).unwrap());
        assert!(!converted.path().exists());
    }

    #[test]
    fn test_rerun_after_simulated_crash_completes_the_move() {
        let dir = TempDir::new().unwrap();
        let (pending, converted) = stores(&dir);
        seed_pending(&pending, 7);

        // Simulate a crash between append and delete: the destination
        // copy exists, the source copy is still there.
        let staged = preview(&pending, &converted, 7, &translation_patch()).unwrap();
        converted.append(&staged).unwrap();
        assert!(pending.exists(7).unwrap());
        assert!(converted.exists(7).unwrap());

        // Retrying the same move finishes the job.
        move_record(&pending, &converted, 7, &translation_patch()).unwrap();
        assert!(!pending.exists(7).unwrap());
        assert!(converted.exists(7).unwrap());
        assert_eq!(converted.keys().unwrap(), vec![7]);
    }
}
