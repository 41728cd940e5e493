//! Point operations on single stores: exists, read, append, move.
//!
//! Records cross the CLI boundary as flat JSON objects keyed by column
//! name, `original_index` included:
//! `{"original_index": 42, "question": "...", "source_query": "..."}`

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use querymill_protocol::{fields, Patch, Record, StoreRole};
use querymill_store::{move_record, Store};
use serde_json::{Map, Value};

#[derive(Args, Debug)]
pub struct ExistsArgs {
    /// Path to the store file
    pub store: PathBuf,

    /// Store role, which fixes the schema (pending, converted,
    /// failed_conversion, needs_review)
    #[arg(long)]
    pub role: StoreRole,

    /// Record key (original_index)
    pub key: u64,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    pub store: PathBuf,

    #[arg(long)]
    pub role: StoreRole,

    pub key: u64,
}

#[derive(Args, Debug)]
pub struct AppendArgs {
    pub store: PathBuf,

    #[arg(long)]
    pub role: StoreRole,

    /// The record as a JSON object, original_index included
    pub row: String,
}

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Source store file
    pub source: PathBuf,

    /// Destination store file
    pub destination: PathBuf,

    /// Role of the source store
    #[arg(long = "from")]
    pub from_role: StoreRole,

    /// Role of the destination store
    #[arg(long = "to")]
    pub to_role: StoreRole,

    pub key: u64,

    /// Extra/replacement fields for the destination row, as JSON
    #[arg(long)]
    pub patch: Option<String>,
}

pub fn exists(args: ExistsArgs) -> Result<()> {
    let store = Store::open(args.store, args.role.schema());
    let present = store.exists(args.key)?;
    println!("{present}");
    Ok(())
}

pub fn read(args: ReadArgs) -> Result<()> {
    let store = Store::open(args.store, args.role.schema());
    let record = store.read(args.key)?;
    println!("{}", serde_json::to_string_pretty(&record_to_json(&record))?);
    Ok(())
}

pub fn append(args: AppendArgs) -> Result<()> {
    let record = parse_row_json(&args.row)?;
    let store = Store::open(args.store, args.role.schema());
    store.append(&record)?;
    println!("Appended key {} to {}", record.key, store.path().display());
    Ok(())
}

pub fn move_row(args: MoveArgs) -> Result<()> {
    let patch = match &args.patch {
        Some(raw) => parse_patch_json(raw)?,
        None => Patch::new(),
    };
    let source = Store::open(args.source, args.from_role.schema());
    let destination = Store::open(args.destination, args.to_role.schema());
    move_record(&source, &destination, args.key, &patch)?;
    println!(
        "Moved key {} from {} to {}",
        args.key,
        source.path().display(),
        destination.path().display()
    );
    Ok(())
}

/// Flatten a record into the CLI's JSON shape.
pub fn record_to_json(record: &Record) -> Value {
    let mut map = Map::new();
    map.insert(fields::KEY.to_string(), Value::from(record.key));
    for (name, value) in &record.fields {
        map.insert(name.clone(), Value::from(value.clone()));
    }
    Value::Object(map)
}

/// Parse the CLI's JSON shape into a record. Scalar values are coerced
/// to text; nested arrays/objects are rejected.
pub fn parse_row_json(raw: &str) -> Result<Record> {
    let value: Value = serde_json::from_str(raw).context("Invalid JSON row")?;
    let Value::Object(map) = value else {
        bail!("JSON row must be an object");
    };

    let key = map
        .get(fields::KEY)
        .ok_or_else(|| anyhow!("JSON row missing {}", fields::KEY))
        .and_then(|v| match v {
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| anyhow!("{} must be a non-negative integer", fields::KEY)),
            Value::String(s) => s
                .parse::<u64>()
                .map_err(|_| anyhow!("{} must be a non-negative integer", fields::KEY)),
            _ => Err(anyhow!("{} must be a non-negative integer", fields::KEY)),
        })?;

    let mut record = Record::new(key);
    for (name, value) in map {
        if name == fields::KEY {
            continue;
        }
        record.set(name, scalar_to_string(&value)?);
    }
    Ok(record)
}

/// Parse a JSON object of field overrides into a patch.
pub fn parse_patch_json(raw: &str) -> Result<Patch> {
    let value: Value = serde_json::from_str(raw).context("Invalid JSON patch")?;
    let Value::Object(map) = value else {
        bail!("JSON patch must be an object");
    };
    let mut patch = Patch::new();
    for (name, value) in map {
        patch.insert(name, scalar_to_string(&value)?);
    }
    Ok(patch)
}

fn scalar_to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => {
            bail!("field values must be scalars, got: {value}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_json_round_trip() {
        let record = parse_row_json(
            r#"{"original_index": 42, "question": "What, \"exactly\"?", "source_query": "MATCH (n)"}"#,
        )
        .unwrap();
        assert_eq!(record.key, 42);
        assert_eq!(record.get("question"), Some("What, \"exactly\"?"));

        let json = record_to_json(&record);
        assert_eq!(json["original_index"], 42);
        assert_eq!(json["question"], "What, \"exactly\"?");
    }

    #[test]
    fn test_row_json_requires_key() {
        assert!(parse_row_json(r#"{"question": "q"}"#).is_err());
        assert!(parse_row_json(r#"{"original_index": -1, "question": "q"}"#).is_err());
        assert!(parse_row_json(r#"[1, 2]"#).is_err());
    }

    #[test]
    fn test_patch_rejects_nested_values() {
        assert!(parse_patch_json(r#"{"translated_query": {"nested": true}}"#).is_err());
        let patch = parse_patch_json(r#"{"translated_query": "match $x;"}"#).unwrap();
        assert_eq!(patch.get("translated_query").map(String::as_str), Some("match $x;"));
    }
}
