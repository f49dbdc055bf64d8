//! File-based object cache
//!
//! Each key is stored in its own JSON file, `{escaped key}.json`, holding the
//! record metadata and the payload. Files are replaced atomically (write to a
//! temporary file, then rename), so a concurrent reader never sees a partial record.

use super::StalePolicy;
use crate::errors::BuildError;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const WRITE_TEST_FILE: &str = "write_test";

/// Metadata of a cached record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRecordMeta {
    pub key: String,
    pub cached_at: DateTime<Utc>,
    /// Expiry in effect when the record was written
    pub expiry_secs: u64,
}

impl CachedRecordMeta {
    /// Whether the record is younger than `expiry`
    pub fn is_fresh(&self, expiry: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age.num_seconds() < expiry.as_secs() as i64
    }
}

/// A cached record as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRecord {
    #[serde(flatten)]
    pub meta: CachedRecordMeta,
    pub payload: serde_json::Value,
}

type Slot = Arc<Mutex<Option<serde_json::Value>>>;

/// Expiring key/value store shared by all enrichment workers of a build
pub struct ObjectCache {
    dir: PathBuf,
    expiry: Duration,
    stale_policy: StalePolicy,
    /// Per-key slots; the mutex serializes lookups of one key and memoizes the
    /// payload for the rest of the build
    slots: DashMap<String, Slot>,
}

impl ObjectCache {
    /// Open the cache in `dir`, creating the directory if needed
    pub fn new(dir: &Path, expiry: Duration, stale_policy: StalePolicy) -> Result<Self, BuildError> {
        fs::create_dir_all(dir).map_err(|source| BuildError::CacheNotWritable {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            expiry,
            stale_policy,
            slots: DashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Write and remove a probe file
    pub fn check_writable(&self) -> Result<(), BuildError> {
        let probe = self.dir.join(WRITE_TEST_FILE);
        fs::write(&probe, b"ok")
            .and_then(|_| fs::remove_file(&probe))
            .map_err(|source| BuildError::CacheNotWritable {
                path: self.dir.clone(),
                source,
            })
    }

    /// Return the value for `key`, calling `fetch` only when no fresh record exists
    pub fn get_or_fetch<T, F>(&self, key: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let slot = Arc::clone(&self.slots.entry(key.to_string()).or_default());
        let mut memo = slot
            .lock()
            .map_err(|_| anyhow!("cache slot for '{}' is poisoned", key))?;

        if let Some(payload) = memo.as_ref() {
            return Ok(serde_json::from_value(payload.clone())?);
        }

        let path = self.record_path(key);
        let stored = self.read_record(&path);
        if let Some(record) = &stored {
            if record.meta.is_fresh(self.expiry) {
                debug!("cache hit for {}", key);
                let value = serde_json::from_value(record.payload.clone())?;
                *memo = Some(record.payload.clone());
                return Ok(value);
            }
        }

        debug!("cache miss for {}", key);
        match fetch() {
            Ok(value) => {
                let payload = serde_json::to_value(&value)?;
                self.write_record(key, &path, &payload)?;
                *memo = Some(payload);
                Ok(value)
            }
            Err(e) => match (self.stale_policy, stored) {
                (StalePolicy::UseStale, Some(record)) => {
                    warn!(
                        "can't refresh {} ({:#}), using the record cached at {}",
                        key, e, record.meta.cached_at
                    );
                    let value = serde_json::from_value(record.payload.clone())?;
                    *memo = Some(record.payload);
                    Ok(value)
                }
                _ => Err(e),
            },
        }
    }

    /// List all records, most recent first
    pub fn list(&self) -> Result<Vec<CachedRecordMeta>> {
        let mut results: Vec<CachedRecordMeta> = self
            .record_files()?
            .into_iter()
            .filter_map(|path| {
                let content = fs::read_to_string(&path).ok()?;
                serde_json::from_str::<CachedRecordMeta>(&content).ok()
            })
            .collect();
        results.sort_by(|a, b| b.cached_at.cmp(&a.cached_at));
        Ok(results)
    }

    /// Remove every record, returning how many were removed
    pub fn clear_all(&self) -> Result<usize> {
        let files = self.record_files()?;
        for path in &files {
            fs::remove_file(path)
                .map_err(|e| anyhow!("Failed to remove cache file {:?}: {}", path, e))?;
        }
        self.slots.clear();
        Ok(files.len())
    }

    /// Remove expired and unreadable records, returning how many were removed
    pub fn clear_expired(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.record_files()? {
            let fresh = fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<CachedRecordMeta>(&c).ok())
                .map_or(false, |meta| meta.is_fresh(self.expiry));
            if !fresh {
                fs::remove_file(&path)
                    .map_err(|e| anyhow!("Failed to remove cache file {:?}: {}", path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn record_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = vec![];
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)?.flatten() {
                let path = entry.path();
                if path.extension().map_or(false, |e| e == "json") {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(key)))
    }

    fn read_record(&self, path: &Path) -> Option<CachedRecord> {
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("ignoring unreadable cache file {:?}: {}", path, e);
                None
            }
        }
    }

    fn write_record(&self, key: &str, path: &Path, payload: &serde_json::Value) -> Result<()> {
        let record = CachedRecord {
            meta: CachedRecordMeta {
                key: key.to_string(),
                cached_at: Utc::now(),
                expiry_secs: self.expiry.as_secs(),
            },
            payload: payload.clone(),
        };
        let content = serde_json::to_string_pretty(&record)?;
        let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&tmp, content)
            .map_err(|e| anyhow!("Failed to write cache file {:?}: {}", tmp, e))?;
        fs::rename(&tmp, path)
            .map_err(|e| anyhow!("Failed to replace cache file {:?}: {}", path, e))?;
        Ok(())
    }
}

/// Keep `[A-Za-z0-9-]` and encode everything else as `_XX`
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{:02X}", b));
        }
    }
    out
}
