//! Record codec: one record <-> one physical CSV line.
//!
//! RFC 4180 quoting via the csv crate: a value containing the delimiter,
//! a double quote, or a line break is enclosed in quotes with internal
//! quotes doubled. `decode` is the exact inverse of `encode` for every
//! record valid under the schema - the corpus is full of questions with
//! embedded commas, quotes, and multi-line query text, and field
//! boundaries must never desynchronize.

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use querymill_protocol::{fields, Record, StoreSchema};

use crate::error::{Result, StoreError};

/// Encode a record as a single CSV line (no trailing newline).
/// Key column first, then the schema fields in order.
pub fn encode(record: &Record, schema: &StoreSchema) -> Result<String> {
    let missing = schema.missing_columns(record);
    if !missing.is_empty() {
        return Err(StoreError::schema_mismatch(format!(
            "record {} missing fields: {}",
            record.key,
            missing.join(", ")
        )));
    }

    let mut row = vec![record.key.to_string()];
    for column in schema.columns() {
        // missing_columns() already proved every column is present
        row.push(record.get(column).unwrap_or_default().to_string());
    }

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(&row)
        .map_err(|e| StoreError::malformed(e.to_string()))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::malformed(e.to_string()))?;
    let mut line = String::from_utf8(bytes)
        .map_err(|e| StoreError::malformed(format!("non-UTF-8 encode output: {e}")))?;
    // The writer terminates the row; embedded newlines stay quoted.
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

/// Decode one physical line into a record.
///
/// Fails with a malformed-record error when the field count does not
/// match the schema, the key is not a non-negative integer, or quoting
/// is unbalanced.
pub fn decode(line: &str, schema: &StoreSchema) -> Result<Record> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes());
    let mut row = StringRecord::new();
    let got = reader
        .read_record(&mut row)
        .map_err(|e| StoreError::malformed(e.to_string()))?;
    if !got {
        return Err(StoreError::malformed("empty line"));
    }
    decode_row(&row, schema)
}

/// Decode an already-parsed CSV row. Shared by `decode` and the
/// streaming store scans, which read rows straight off a file reader.
pub(crate) fn decode_row(row: &StringRecord, schema: &StoreSchema) -> Result<Record> {
    let expected = schema.columns().len() + 1;
    if row.len() != expected {
        return Err(StoreError::malformed(format!(
            "expected {} fields, found {}",
            expected,
            row.len()
        )));
    }

    let key = parse_key(&row[0])?;
    let mut record = Record::new(key);
    for (column, value) in schema.columns().iter().zip(row.iter().skip(1)) {
        record.set(column.clone(), value);
    }
    Ok(record)
}

/// Parse the key column of a row.
pub(crate) fn parse_key(raw: &str) -> Result<u64> {
    raw.trim().parse::<u64>().map_err(|_| {
        StoreError::malformed(format!("{} is not a valid {}", raw, fields::KEY))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use querymill_protocol::StoreRole;

    fn pending_record(key: u64, question: &str, query: &str) -> Record {
        Record::new(key)
            .with_field(fields::QUESTION, question)
            .with_field(fields::SOURCE_QUERY, query)
    }

    fn round_trip(record: &Record, schema: &StoreSchema) {
        let line = encode(record, schema).unwrap();
        let back = decode(&line, schema).unwrap();
        assert_eq!(&back, record, "round trip failed for line: {line:?}");
    }

    #[test]
    fn test_round_trip_plain() {
        let schema = StoreRole::Pending.schema();
        round_trip(&pending_record(0, "How many users?", "MATCH (u:User) RETURN count(u)"), &schema);
    }

    #[test]
    fn test_round_trip_embedded_comma_and_quotes() {
        let schema = StoreRole::Pending.schema();
        round_trip(
            &pending_record(
                42,
                r#"What tweets mention "Neo4j", and why?"#,
                r#"MATCH (t:Tweet) WHERE t.text CONTAINS "Neo4j" RETURN t"#,
            ),
            &schema,
        );
    }

    #[test]
    fn test_round_trip_embedded_newlines() {
        let schema = StoreRole::Pending.schema();
        round_trip(
            &pending_record(7, "line one\nline two", "MATCH (n)\nWHERE n.x = 1\nRETURN n"),
            &schema,
        );
    }

    #[test]
    fn test_round_trip_all_hazards_in_one_value() {
        let schema = StoreRole::Pending.schema();
        round_trip(
            &pending_record(9, "a,\"b\"\nc,d \"and\" e", ""),
            &schema,
        );
    }

    #[test]
    fn test_round_trip_empty_fields() {
        let schema = StoreRole::Converted.schema();
        let record = Record::new(3)
            .with_field(fields::QUESTION, "")
            .with_field(fields::SOURCE_QUERY, "")
            .with_field(fields::TRANSLATED_QUERY, "");
        round_trip(&record, &schema);
    }

    #[test]
    fn test_encode_rejects_missing_field() {
        let schema = StoreRole::Converted.schema();
        let record = pending_record(1, "q", "c");
        let err = encode(&record, &schema).unwrap_err();
        assert_eq!(err.kind_name(), "SchemaMismatch");
    }

    #[test]
    fn test_decode_rejects_wrong_field_count() {
        let schema = StoreRole::Pending.schema();
        let err = decode("1,only-one-field", &schema).unwrap_err();
        assert_eq!(err.kind_name(), "Malformed");
    }

    #[test]
    fn test_decode_rejects_bad_key() {
        let schema = StoreRole::Pending.schema();
        let err = decode("not-a-number,q,c", &schema).unwrap_err();
        assert_eq!(err.kind_name(), "Malformed");
        let err = decode("-4,q,c", &schema).unwrap_err();
        assert_eq!(err.kind_name(), "Malformed");
    }
}
