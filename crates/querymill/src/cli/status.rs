//! Collection-level commands: conservation status and duplicate repair.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use querymill_store::Collection;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Collection directory holding the role store files
    pub collection: PathBuf,

    /// Expected corpus size; when given, the total must match it
    #[arg(long)]
    pub expect: Option<usize>,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    pub collection: PathBuf,
}

pub fn status(args: StatusArgs) -> Result<()> {
    let collection = Collection::open(&args.collection);
    let report = collection.check(args.expect)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let c = &report.counts;
        println!("pending:            {}", c.pending);
        println!("converted:          {}", c.converted);
        println!("failed_conversion:  {}", c.failed_conversion);
        println!("needs_review:       {}", c.needs_review);
        println!("total:              {}", c.total());
        if let Some(expected) = report.expected_total {
            println!("expected:           {expected}");
        }
        for (key, roles) in &report.duplicates {
            let held: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
            println!("duplicate key {key}: {}", held.join(", "));
        }
    }

    if !report.holds() {
        bail!(
            "conservation violated in {}: {} duplicate key(s), total {} (expected {})",
            args.collection.display(),
            report.duplicates.len(),
            report.counts.total(),
            report
                .expected_total
                .map_or_else(|| "unchecked".to_string(), |e| e.to_string())
        );
    }
    Ok(())
}

pub fn reconcile(args: ReconcileArgs) -> Result<()> {
    let collection = Collection::open(&args.collection);
    let repaired = collection.reconcile()?;

    if repaired.is_empty() {
        println!("No duplicates found");
        return Ok(());
    }
    for fix in &repaired {
        let removed: Vec<&str> = fix.removed.iter().map(|r| r.as_str()).collect();
        println!(
            "key {}: kept {}, removed from {}",
            fix.key,
            fix.kept,
            removed.join(", ")
        );
    }
    println!("Repaired {} duplicate(s)", repaired.len());
    Ok(())
}
