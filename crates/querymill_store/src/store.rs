//! File-backed, key-indexed record store.
//!
//! One store file = one pipeline state of one collection. Point lookups
//! stream the file and stop at the first hit; nothing ever materializes
//! the whole store in memory. Append is the only way in, delete (a
//! whole-file rewrite committed by atomic rename) is the only way out -
//! there is no update-in-place.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use csv::{Reader, ReaderBuilder, StringRecord};
use querymill_protocol::{Record, StoreRole, StoreSchema};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::codec;
use crate::error::{Result, StoreError};
use crate::lock;

/// A named, ordered sequence of records sharing one schema, backed by
/// one CSV file. The file may not exist yet; the first append creates
/// it, header included.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    schema: StoreSchema,
}

impl Store {
    pub fn open(path: impl Into<PathBuf>, schema: StoreSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    /// The store for one role inside a collection directory.
    pub fn for_role(dir: &Path, role: StoreRole) -> Self {
        Self::open(dir.join(role.file_name()), role.schema())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    /// Whether a record with this key is present.
    ///
    /// Safe alongside the (single) writer: appends land as complete
    /// newline-terminated lines and delete replaces the file atomically,
    /// so a reader only ever sees complete lines.
    pub fn exists(&self, key: u64) -> Result<bool> {
        let _guard = lock::lock_shared(&self.path)?;
        Ok(self.scan_for(key)?.is_some())
    }

    /// Read the record with this key.
    pub fn read(&self, key: u64) -> Result<Record> {
        let _guard = lock::lock_shared(&self.path)?;
        self.scan_for(key)?.ok_or_else(|| self.not_found(key))
    }

    /// Append one record, creating the file (with header) if needed.
    ///
    /// Re-validates the duplicate guard under the exclusive lock even if
    /// the caller already checked `exists` - no caller may rely on a
    /// prior check alone.
    pub fn append(&self, record: &Record) -> Result<()> {
        let line = codec::encode(record, &self.schema)?;

        let _guard = lock::lock_exclusive(&self.path)?;

        if self.scan_for(record.key)?.is_some() {
            return Err(StoreError::DuplicateKey {
                key: record.key,
                store: self.path.clone(),
            });
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;

        // One write_all call per append: a complete header (when the
        // file is new or empty) plus exactly one newline-terminated row.
        let mut buf = String::new();
        if file.metadata()?.len() == 0 {
            buf.push_str(&self.schema.header().join(","));
            buf.push('\n');
        }
        buf.push_str(&line);
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
        file.sync_all()?;

        debug!(key = record.key, store = %self.path.display(), "appended record");
        Ok(())
    }

    /// Remove exactly the record with this key and return it.
    ///
    /// The rewrite streams the file into a temp file in the same
    /// directory, copying every other line byte-for-byte, then commits
    /// with an atomic rename. A crash mid-rewrite leaves the original
    /// file untouched.
    pub fn delete(&self, key: u64) -> Result<Record> {
        let _guard = lock::lock_exclusive(&self.path)?;

        let mut reader = match self.open_reader()? {
            Some(reader) => reader,
            None => return Err(self.not_found(key)),
        };

        // Locate the matched row's byte span [start, end).
        let mut row = StringRecord::new();
        let mut found: Option<(u64, u64, Record)> = None;
        loop {
            match reader.read_record(&mut row) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return Err(StoreError::from_csv(&self.path, e)),
            }
            let row_key = self.row_key(&row)?;
            if row_key == key {
                let start = row
                    .position()
                    .map(csv::Position::byte)
                    .ok_or_else(|| self.malformed("record without position"))?;
                let end = reader.position().byte();
                let record = self.decode_row(&row)?;
                found = Some((start, end, record));
                break;
            }
        }
        drop(reader);

        let (start, end, record) = found.ok_or_else(|| self.not_found(key))?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(parent)?;

        let mut source = File::open(&self.path)?;
        io::copy(&mut (&mut source).take(start), tmp.as_file_mut())?;
        source.seek(SeekFrom::Start(end))?;
        io::copy(&mut source, tmp.as_file_mut())?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(key, store = %self.path.display(), "deleted record");
        Ok(record)
    }

    /// Number of records in the store (0 when the file does not exist).
    pub fn count(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    /// All keys in file order.
    pub fn keys(&self) -> Result<Vec<u64>> {
        let _guard = lock::lock_shared(&self.path)?;
        let mut reader = match self.open_reader()? {
            Some(reader) => reader,
            None => return Ok(Vec::new()),
        };
        let mut keys = Vec::new();
        let mut row = StringRecord::new();
        loop {
            match reader.read_record(&mut row) {
                Ok(true) => keys.push(self.row_key(&row)?),
                Ok(false) => break,
                Err(e) => return Err(StoreError::from_csv(&self.path, e)),
            }
        }
        Ok(keys)
    }

    /// Streaming scan for one key. Callers hold whatever lock the
    /// operation requires; this takes none itself.
    fn scan_for(&self, key: u64) -> Result<Option<Record>> {
        let mut reader = match self.open_reader()? {
            Some(reader) => reader,
            None => return Ok(None),
        };
        let mut row = StringRecord::new();
        loop {
            match reader.read_record(&mut row) {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(e) => return Err(StoreError::from_csv(&self.path, e)),
            }
            if self.row_key(&row)? == key {
                return Ok(Some(self.decode_row(&row)?));
            }
        }
    }

    /// Open a CSV reader over the store file, validating the header.
    /// `Ok(None)` when the file does not exist or is empty - an
    /// unwritten store is a valid empty store, not an error.
    fn open_reader(&self) -> Result<Option<Reader<File>>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Storage(e)),
        };
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        let headers = reader
            .headers()
            .map_err(|e| StoreError::from_csv(&self.path, e))?;
        // len, not is_empty: StringRecord::is_empty is true for an
        // all-empty-fields header like ",,", which is garbage to report,
        // not a fresh store.
        if headers.len() == 0 {
            return Ok(None);
        }
        let expected = self.schema.header();
        if headers.iter().collect::<Vec<_>>() != expected {
            return Err(self.malformed(format!(
                "header mismatch: expected [{}], found [{}]",
                expected.join(", "),
                headers.iter().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(Some(reader))
    }

    fn row_key(&self, row: &StringRecord) -> Result<u64> {
        let raw = row
            .get(0)
            .ok_or_else(|| self.malformed("row without key column"))?;
        codec::parse_key(raw).map_err(|e| self.attribute(e))
    }

    fn decode_row(&self, row: &StringRecord) -> Result<Record> {
        codec::decode_row(row, &self.schema).map_err(|e| self.attribute(e))
    }

    /// Attach the store path to a codec error.
    fn attribute(&self, err: StoreError) -> StoreError {
        match err {
            StoreError::MalformedRecord(reason) => self.malformed(reason),
            other => other,
        }
    }

    fn malformed(&self, reason: impl std::fmt::Display) -> StoreError {
        StoreError::malformed(format!("{}: {}", self.path.display(), reason))
    }

    fn not_found(&self, key: u64) -> StoreError {
        StoreError::NotFound {
            key,
            store: self.path.clone(),
        }
    }
}
