//! The coordinator transition: attach a validation outcome to a key and
//! move it to the matching state.
//!
//! The conversion step itself (producing a candidate translation) stays
//! external; this command only records its result. The verdict comes
//! either pre-judged via `--outcome` or from running a validator
//! command against the candidate.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use querymill_protocol::{fields, Patch, StoreRole};
use querymill_store::Collection;
use tracing::info;

use crate::cli::validate::{CommandValidator, Verdict};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Valid and semantically correct: move to converted
    Ok,
    /// Unconvertible: move to failed_conversion
    Invalid,
    /// Valid but does not answer the question: move to needs_review
    NeedsReview,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Collection directory holding the role store files
    pub collection: PathBuf,

    /// Record key (original_index)
    pub key: u64,

    /// The candidate translated query
    #[arg(long)]
    pub candidate: String,

    /// Pre-judged outcome for the candidate
    #[arg(long, conflicts_with = "validator")]
    pub outcome: Option<Outcome>,

    /// Validator command to judge the candidate (reads it on stdin;
    /// exit 0 means valid, stderr becomes the diagnostic)
    #[arg(long, conflicts_with = "outcome")]
    pub validator: Option<String>,

    /// Diagnostic or review note to store with the record
    #[arg(long)]
    pub reason: Option<String>,
}

pub fn submit(args: SubmitArgs) -> Result<()> {
    let outcome = match (args.outcome, &args.validator) {
        (Some(outcome), None) => outcome,
        (None, Some(command)) => {
            match CommandValidator::new(command).validate(&args.candidate)? {
                Verdict::Valid => Outcome::Ok,
                Verdict::Invalid(diagnostic) => {
                    info!(key = args.key, %diagnostic, "validator rejected candidate");
                    return record_failure(&args, diagnostic);
                }
            }
        }
        _ => bail!("exactly one of --outcome or --validator is required"),
    };

    let collection = Collection::open(&args.collection);
    match outcome {
        Outcome::Ok => {
            let mut patch = Patch::new();
            patch.insert(fields::TRANSLATED_QUERY.to_string(), args.candidate.clone());
            collection.transition(args.key, StoreRole::Converted, &patch)?;
            println!("key {}: converted", args.key);
        }
        Outcome::Invalid => {
            let reason = args
                .reason
                .clone()
                .unwrap_or_else(|| "conversion failed".to_string());
            return record_failure(&args, reason);
        }
        Outcome::NeedsReview => {
            let Some(reason) = args.reason.clone() else {
                bail!("--reason is required for a needs-review outcome");
            };
            let mut patch = Patch::new();
            patch.insert(fields::TRANSLATED_QUERY.to_string(), args.candidate.clone());
            patch.insert(fields::REVIEW_REASON.to_string(), reason);
            collection.transition(args.key, StoreRole::NeedsReview, &patch)?;
            println!("key {}: flagged for review", args.key);
        }
    }
    Ok(())
}

fn record_failure(args: &SubmitArgs, diagnostic: String) -> Result<()> {
    let collection = Collection::open(&args.collection);
    let mut patch = Patch::new();
    patch.insert(fields::ERROR_REASON.to_string(), diagnostic);
    collection.transition(args.key, StoreRole::FailedConversion, &patch)?;
    println!("key {}: failed conversion", args.key);
    Ok(())
}
