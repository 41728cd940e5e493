//! Canonical column names shared by every store file.

/// Key column. Every store file leads with this column; the value is the
/// record's position in the original corpus and never changes.
pub const KEY: &str = "original_index";

/// The natural-language question, verbatim from the corpus.
pub const QUESTION: &str = "question";

/// The query in the source language (read-only corpus content).
pub const SOURCE_QUERY: &str = "source_query";

/// The validated translation attached when a record converts.
pub const TRANSLATED_QUERY: &str = "translated_query";

/// Diagnostic attached when conversion fails for good.
pub const ERROR_REASON: &str = "error_reason";

/// Why a syntactically valid translation was flagged for review.
pub const REVIEW_REASON: &str = "review_reason";
