//! Store roles and the pipeline state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fields;
use crate::record::Record;

/// Pipeline state of a record - each role is backed by one store file.
/// This is the CANONICAL definition of the state machine; every
/// transition in the pipeline goes through `can_transition_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRole {
    /// Untranslated corpus rows waiting for a conversion attempt
    Pending,
    /// Validated, semantically correct translations (terminal)
    Converted,
    /// Rows that could not be converted after retries (terminal)
    FailedConversion,
    /// Syntactically valid translations that do not answer the question
    NeedsReview,
}

impl StoreRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreRole::Pending => "pending",
            StoreRole::Converted => "converted",
            StoreRole::FailedConversion => "failed_conversion",
            StoreRole::NeedsReview => "needs_review",
        }
    }

    /// File name of this role's store inside a collection directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            StoreRole::Pending => "pending.csv",
            StoreRole::Converted => "converted.csv",
            StoreRole::FailedConversion => "failed.csv",
            StoreRole::NeedsReview => "needs_review.csv",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StoreRole::Converted | StoreRole::FailedConversion)
    }

    /// Legal transitions:
    /// pending -> converted | failed_conversion | needs_review
    /// needs_review -> converted | failed_conversion
    pub fn can_transition_to(&self, to: StoreRole) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, to),
            (
                StoreRole::Pending,
                StoreRole::Converted | StoreRole::FailedConversion | StoreRole::NeedsReview
            ) | (
                StoreRole::NeedsReview,
                StoreRole::Converted | StoreRole::FailedConversion
            )
        )
    }

    /// Precedence used when a crash leaves a key in two stores: the copy
    /// in the higher-ranked role is kept, the other deleted.
    /// converted > needs_review > failed_conversion > pending.
    pub fn reconcile_rank(&self) -> u8 {
        match self {
            StoreRole::Converted => 3,
            StoreRole::NeedsReview => 2,
            StoreRole::FailedConversion => 1,
            StoreRole::Pending => 0,
        }
    }

    pub fn all() -> [StoreRole; 4] {
        [
            StoreRole::Pending,
            StoreRole::Converted,
            StoreRole::FailedConversion,
            StoreRole::NeedsReview,
        ]
    }

    pub fn schema(&self) -> StoreSchema {
        let columns: &[&str] = match self {
            StoreRole::Pending => &[fields::QUESTION, fields::SOURCE_QUERY],
            StoreRole::Converted => &[
                fields::QUESTION,
                fields::SOURCE_QUERY,
                fields::TRANSLATED_QUERY,
            ],
            StoreRole::FailedConversion => {
                &[fields::QUESTION, fields::SOURCE_QUERY, fields::ERROR_REASON]
            }
            StoreRole::NeedsReview => &[
                fields::QUESTION,
                fields::SOURCE_QUERY,
                fields::TRANSLATED_QUERY,
                fields::REVIEW_REASON,
            ],
        };
        StoreSchema::new(columns.iter().map(|c| c.to_string()).collect())
    }
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StoreRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(StoreRole::Pending),
            "converted" => Ok(StoreRole::Converted),
            "failed" | "failed_conversion" => Ok(StoreRole::FailedConversion),
            "needs_review" | "failed_review" => Ok(StoreRole::NeedsReview),
            _ => Err(format!(
                "Invalid store role: '{}'. Expected: pending, converted, failed_conversion, or needs_review",
                s
            )),
        }
    }
}

/// Ordered field list of one store, not counting the leading key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    columns: Vec<String>,
}

impl StoreSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Field names in file order, key column excluded.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Header row in file order, key column included.
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(fields::KEY)
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    /// The schema columns the record is missing, if any.
    pub fn missing_columns(&self, record: &Record) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| record.get(c).is_none())
            .cloned()
            .collect()
    }

    pub fn satisfied_by(&self, record: &Record) -> bool {
        self.missing_columns(record).is_empty()
    }
}
