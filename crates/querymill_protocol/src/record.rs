//! The unit of storage: a keyed row of free-text fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Extra/replacement fields applied to a record during a move.
pub type Patch = BTreeMap<String, String>;

/// One logical row of a store file.
///
/// `key` is the record's stable identity within its logical collection;
/// `fields` holds the free-text values. Field values may contain commas,
/// double quotes, and newlines — escaping is the codec's problem, not
/// the record's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: u64,
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(key: u64) -> Self {
        Self {
            key,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter, mainly for tests and CLI input.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Merge a patch into this record. Patch fields overwrite or add;
    /// fields not named in the patch are preserved.
    pub fn merge_patch(&mut self, patch: &Patch) {
        for (name, value) in patch {
            self.fields.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn test_merge_patch_overwrites_and_preserves() {
        let mut record = Record::new(7)
            .with_field(fields::QUESTION, "How many?")
            .with_field(fields::SOURCE_QUERY, "MATCH (n) RETURN count(n)");

        let mut patch = Patch::new();
        patch.insert(fields::SOURCE_QUERY.to_string(), "rewritten".to_string());
        patch.insert(fields::TRANSLATED_QUERY.to_string(), "match $n; reduce $c = count;".to_string());
        record.merge_patch(&patch);

        assert_eq!(record.get(fields::QUESTION), Some("How many?"));
        assert_eq!(record.get(fields::SOURCE_QUERY), Some("rewritten"));
        assert_eq!(
            record.get(fields::TRANSLATED_QUERY),
            Some("match $n; reduce $c = count;")
        );
    }
}
