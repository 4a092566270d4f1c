//! Keyed values and append-only record streams on the local filesystem.
//!
//! # Storage layout
//!
//! Everything lives under one base directory:
//!
//! | path | contents |
//! |------|----------|
//! | `<key>.json` | one keyed value, pretty-printed JSON |
//! | `<log_name>.jsonl` | live stream, one compact JSON record per line |
//! | `<log_name>.<stamp>.jsonl.gz` | rotated archive, gzip of the live stream |
//!
//! `<stamp>` is the UTC rotation time formatted `YYYYMMDDTHHMMSSffffffZ`, so
//! archives of one stream sort chronologically by name.  Keys and log names
//! may contain `/` to nest files in sub-directories.
//!
//! # Concurrency
//!
//! Appends and rotations on one store instance are serialised by an internal
//! lock, so lines never interleave and no append is lost to a concurrent
//! truncate.  The store assumes it is the only writer to its base directory;
//! nothing guards against a second process.
//!
//! # Example
//!
//! ```rust
//! use aegis_memory::{LocalJsonlStore, StateStore};
//! use serde_json::json;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = LocalJsonlStore::new(dir.path()).unwrap();
//!
//! store.set("agent/profile", json!({"maturity_level": 6})).unwrap();
//! assert_eq!(store.get("agent/profile").unwrap().unwrap()["maturity_level"], 6);
//! assert!(store.get("missing").unwrap().is_none());
//!
//! store.append_jsonl("events", &json!({"n": 1})).unwrap();
//! assert_eq!(store.read_jsonl("events").unwrap().len(), 1);
//! ```

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use aegis_types::AegisError;
use chrono::{DateTime, TimeDelta, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::Value;
use tracing::{debug, info};

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6fZ";
const STAMP_LEN: usize = 22;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// ─────────────────────────────────────────────────────────────────────────────
// StateStore contract
// ─────────────────────────────────────────────────────────────────────────────

/// Durable keyed values plus named append-only JSON Lines streams.
///
/// All operations are synchronous and complete their disk work before
/// returning.
pub trait StateStore: Send + Sync {
    /// Value stored under `key`, or `Ok(None)` when nothing was ever stored.
    fn get(&self, key: &str) -> Result<Option<Value>, AegisError>;

    /// Persist `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: Value) -> Result<(), AegisError>;

    /// Append `record` as one line of the `log_name` stream.
    fn append_jsonl(&self, log_name: &str, record: &Value) -> Result<(), AegisError>;

    /// Every record currently in the live `log_name` stream, oldest first.
    fn read_jsonl(&self, log_name: &str) -> Result<Vec<Value>, AegisError>;

    /// Archive and truncate the live stream once it exceeds `max_mb`
    /// megabytes, keeping at most `max_files` archives.
    ///
    /// Returns the new archive's path, or `None` when no rotation was needed.
    fn rotate(&self, log_name: &str, max_mb: f64, max_files: usize) -> Result<Option<PathBuf>, AegisError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// LocalJsonlStore
// ─────────────────────────────────────────────────────────────────────────────

/// [`StateStore`] backed by plain files under one base directory.
///
/// `get` is served from an instance-local cache once a key has been read or
/// written, but only while the file's modification time and length still
/// match what was cached.  Disk stays authoritative: a value rewritten or
/// removed by another instance over the same directory is picked up on the
/// next `get`.
#[derive(Debug)]
pub struct LocalJsonlStore {
    base_path: PathBuf,
    cache: Mutex<HashMap<String, Cached>>,
    streams: Mutex<()>,
}

/// Modification time and length of a value file when it was cached.
type Fingerprint = (Option<SystemTime>, u64);

#[derive(Debug)]
struct Cached {
    value: Value,
    fingerprint: Fingerprint,
}

fn fingerprint(meta: &fs::Metadata) -> Fingerprint {
    (meta.modified().ok(), meta.len())
}

impl LocalJsonlStore {
    /// Open (or create) a store rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, AegisError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).map_err(|e| AegisError::storage(&base_path, e))?;
        Ok(Self {
            base_path,
            cache: Mutex::new(HashMap::new()),
            streams: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of the live stream file for `log_name`.
    pub fn log_path(&self, log_name: &str) -> Result<PathBuf, AegisError> {
        validate_name(log_name)?;
        Ok(self.base_path.join(format!("{log_name}.jsonl")))
    }

    /// Rotated archives of `log_name`, oldest first.
    pub fn list_archives(&self, log_name: &str) -> Result<Vec<PathBuf>, AegisError> {
        let live = self.log_path(log_name)?;
        let dir = live.parent().unwrap_or(&self.base_path);
        let stem = file_stem(log_name);
        let prefix = format!("{stem}.");

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AegisError::storage(dir, e)),
        };

        let mut archives: Vec<(String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AegisError::storage(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(stamp) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".jsonl.gz"))
            else {
                continue;
            };
            if is_archive_stamp(stamp) {
                archives.push((stamp.to_string(), entry.path()));
            }
        }
        archives.sort();
        Ok(archives.into_iter().map(|(_, path)| path).collect())
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, AegisError> {
        validate_name(key)?;
        Ok(self.base_path.join(format!("{key}.json")))
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Cached>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stream_guard(&self) -> MutexGuard<'_, ()> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn archive_path(live: &Path, stem: &str) -> PathBuf {
        let dir = live.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut at: DateTime<Utc> = Utc::now();
        loop {
            let candidate = dir.join(format!("{stem}.{}.jsonl.gz", at.format(STAMP_FORMAT)));
            if !candidate.exists() {
                return candidate;
            }
            at += TimeDelta::microseconds(1);
        }
    }
}

impl StateStore for LocalJsonlStore {
    fn get(&self, key: &str) -> Result<Option<Value>, AegisError> {
        let path = self.key_path(key)?;
        let current = match fs::metadata(&path) {
            Ok(meta) => fingerprint(&meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.cache().remove(key);
                return Ok(None);
            }
            Err(e) => return Err(AegisError::storage(&path, e)),
        };
        if let Some(cached) = self.cache().get(key)
            && cached.fingerprint == current
        {
            return Ok(Some(cached.value.clone()));
        }

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.cache().remove(key);
                return Ok(None);
            }
            Err(e) => return Err(AegisError::storage(&path, e)),
        };
        let value: Value = serde_json::from_str(&text)?;
        self.cache().insert(
            key.to_string(),
            Cached {
                value: value.clone(),
                fingerprint: current,
            },
        );
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), AegisError> {
        let path = self.key_path(key)?;
        let body = serde_json::to_vec_pretty(&value)?;
        ensure_parent(&path)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| AegisError::storage(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| AegisError::storage(&path, e))?;

        match fs::metadata(&path) {
            Ok(meta) => {
                let fingerprint = fingerprint(&meta);
                self.cache().insert(key.to_string(), Cached { value, fingerprint });
            }
            Err(_) => {
                self.cache().remove(key);
            }
        }
        debug!(key, "value stored");
        Ok(())
    }

    fn append_jsonl(&self, log_name: &str, record: &Value) -> Result<(), AegisError> {
        let path = self.log_path(log_name)?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.stream_guard();
        ensure_parent(&path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AegisError::storage(&path, e))?;
        file.write_all(&line).map_err(|e| AegisError::storage(&path, e))?;
        Ok(())
    }

    fn read_jsonl(&self, log_name: &str) -> Result<Vec<Value>, AegisError> {
        let path = self.log_path(log_name)?;
        let _guard = self.stream_guard();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AegisError::storage(&path, e)),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| AegisError::storage(&path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    fn rotate(&self, log_name: &str, max_mb: f64, max_files: usize) -> Result<Option<PathBuf>, AegisError> {
        if !max_mb.is_finite() || max_mb < 0.0 {
            return Err(AegisError::Configuration(format!(
                "rotation size limit must be a non-negative number of megabytes, got {max_mb}"
            )));
        }
        if max_files == 0 {
            return Err(AegisError::Configuration(
                "rotation must keep at least one archive".to_string(),
            ));
        }
        let live = self.log_path(log_name)?;

        let _guard = self.stream_guard();
        let size = match fs::metadata(&live) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AegisError::storage(&live, e)),
        };
        if size as f64 <= max_mb * BYTES_PER_MB {
            debug!(log_name, size, "rotation not needed");
            return Ok(None);
        }

        let archive = Self::archive_path(&live, file_stem(log_name));
        let tmp = archive.with_extension("gz.tmp");
        compress(&live, &tmp)?;
        fs::rename(&tmp, &archive).map_err(|e| AegisError::storage(&archive, e))?;
        File::create(&live).map_err(|e| AegisError::storage(&live, e))?;
        info!(log_name, size, archive = %archive.display(), "stream rotated");

        let archives = self.list_archives(log_name)?;
        let excess = archives.len().saturating_sub(max_files);
        for old in &archives[..excess] {
            fs::remove_file(old).map_err(|e| AegisError::storage(old, e))?;
            debug!(log_name, pruned = %old.display(), "old archive removed");
        }
        Ok(Some(archive))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Reject names that are empty, absolute, or step outside the base directory.
fn validate_name(name: &str) -> Result<(), AegisError> {
    let reject = |why: &str| Err(AegisError::InvalidName(format!("'{name}' {why}")));
    if name.trim().is_empty() {
        return reject("is empty");
    }
    if name.ends_with('/') || name.contains('\\') {
        return reject("must name a file");
    }
    if Path::new(name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return reject("must be a relative path without '.' or '..' segments");
    }
    Ok(())
}

fn file_stem(log_name: &str) -> &str {
    log_name.rsplit('/').next().unwrap_or(log_name)
}

fn is_archive_stamp(stamp: &str) -> bool {
    let bytes = stamp.as_bytes();
    bytes.len() == STAMP_LEN
        && bytes[8] == b'T'
        && bytes[STAMP_LEN - 1] == b'Z'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || i == STAMP_LEN - 1 || b.is_ascii_digit())
}

fn ensure_parent(path: &Path) -> Result<(), AegisError> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| AegisError::storage(parent, e)),
        None => Ok(()),
    }
}

fn compress(source: &Path, target: &Path) -> Result<(), AegisError> {
    let mut input = File::open(source).map_err(|e| AegisError::storage(source, e))?;
    let output = File::create(target).map_err(|e| AegisError::storage(target, e))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder).map_err(|e| AegisError::storage(target, e))?;
    encoder
        .finish()
        .and_then(|file| file.sync_all())
        .map_err(|e| AegisError::storage(target, e))
}
