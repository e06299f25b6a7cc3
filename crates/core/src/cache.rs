// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Local document cache.
//!
//! [`CacheManager`] owns one cache root:
//!
//! ```text
//! <root>/
//! ├── .review-cache-meta.json   index (schema version, last_sync, records)
//! ├── stories/<id>.md
//! ├── prds/<id>.md
//! └── epics/epic-<id>.md
//! ```
//!
//! Every operation is synchronous and reads the index fresh from disk, so
//! several managers over the same root observe each other's writes. The
//! read-modify-write of the index is not locked; callers within a process
//! must sequence concurrent writers themselves.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

use crate::atomic::write_atomic;
use crate::clock::{ClockSource, SystemClock};
use crate::config::{CacheConfig, Config, RemoteConfig};
use crate::digest::content_hash;
use crate::document::{DocKey, DocKind, DocStatus, DocumentMeta, MetaPatch};
use crate::error::Result;
use crate::index::{CacheIndex, IndexFile, META_FILE_NAME};

/// Options for [`CacheManager::read`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Suppress the staleness warning.
    pub ignore_stale: bool,
}

/// A document as read from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDocument {
    pub content: String,
    pub meta: Option<DocumentMeta>,
    pub is_stale: bool,
    /// Present when the document is stale and staleness was not ignored.
    pub warning: Option<String>,
}

/// Outcome of a successful [`CacheManager::write`].
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReceipt {
    pub key: DocKey,
    pub path: PathBuf,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable local mirror of remote documents plus sync and lock metadata.
pub struct CacheManager<C: ClockSource = SystemClock> {
    root: PathBuf,
    index: IndexFile,
    threshold_minutes: u32,
    remote: Option<RemoteConfig>,
    clock: C,
}

impl CacheManager<SystemClock> {
    /// Opens (creating if needed) the cache described by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        Self::with_clock(config.cache.clone(), config.remote.clone(), SystemClock)
    }
}

impl<C: ClockSource> CacheManager<C> {
    /// Opens a cache that reads the current time from `clock`.
    pub fn with_clock(
        cache: CacheConfig,
        remote: Option<RemoteConfig>,
        clock: C,
    ) -> Result<Self> {
        let root = cache.dir;
        fs::create_dir_all(&root)?;
        for kind in DocKind::ALL {
            fs::create_dir_all(root.join(kind.dir_name()))?;
        }

        let manager = CacheManager {
            index: IndexFile::new(root.join(META_FILE_NAME)),
            root,
            threshold_minutes: cache.staleness_threshold_minutes,
            remote,
            clock,
        };
        // Materialize (or migrate) the index up front.
        manager.load_index()?;
        Ok(manager)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> &Path {
        self.index.path()
    }

    pub fn staleness_threshold_minutes(&self) -> u32 {
        self.threshold_minutes
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Path of the content file for `key`.
    pub fn content_path(&self, key: &DocKey) -> PathBuf {
        self.root
            .join(key.kind().dir_name())
            .join(key.kind().file_name(key.id()))
    }

    /// Loads the index, recovering from a missing or corrupt file.
    pub fn load_index(&self) -> Result<CacheIndex> {
        self.index.load_or_init(|| {
            CacheIndex::new(
                self.remote.as_ref().map(|r| r.owner.clone()),
                self.remote.as_ref().map(|r| r.repo.clone()),
            )
        })
    }

    pub fn save_index(&self, index: &CacheIndex) -> Result<()> {
        self.index.save(index)
    }

    /// Read-modify-write of the whole index.
    pub(crate) fn update_index<T>(&self, f: impl FnOnce(&mut CacheIndex) -> T) -> Result<T> {
        let mut index = self.load_index()?;
        let out = f(&mut index);
        self.index.save(&index)?;
        Ok(out)
    }

    /// Metadata record for `key`, if any.
    pub fn meta(&self, key: &DocKey) -> Result<Option<DocumentMeta>> {
        Ok(self.load_index()?.get(key).cloned())
    }

    /// Reads a cached document.
    ///
    /// Returns `None` when no content file exists. Staleness never withholds
    /// content; it only attaches a warning.
    pub fn read(&self, key: &DocKey, options: ReadOptions) -> Result<Option<CachedDocument>> {
        let content = match fs::read_to_string(self.content_path(key)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let meta = self.meta(key)?;
        let is_stale = self.is_meta_stale(meta.as_ref(), self.clock.now());
        let warning = (is_stale && !options.ignore_stale).then(|| {
            format!(
                "{} cache is stale (>{} min old). Sync recommended.",
                kind_label(key.kind()),
                self.threshold_minutes
            )
        });

        Ok(Some(CachedDocument {
            content,
            meta,
            is_stale,
            warning,
        }))
    }

    /// Writes content and merges `patch` into the document's metadata.
    ///
    /// The content file is replaced atomically. PRDs and epics get a
    /// `draft` status and version 1 unless one is already recorded.
    pub fn write(&self, key: &DocKey, content: &str, patch: MetaPatch) -> Result<WriteReceipt> {
        let hash = content_hash(content);
        let path = self.content_path(key);
        write_atomic(&path, content.as_bytes())?;

        let now = self.clock.now();
        let timestamp = self.update_index(|index| {
            let record = index.entry(key);
            record.apply(patch);
            if key.kind().is_reviewed() {
                record.status.get_or_insert(DocStatus::Draft);
                record.version.get_or_insert(1);
            }
            record.content_hash = Some(hash.clone());
            advance_timestamp(record, now)
        })?;

        tracing::debug!("cached {} ({})", key, hash);

        Ok(WriteReceipt {
            key: key.clone(),
            path,
            hash,
            timestamp,
        })
    }

    /// Marks `key` stale without touching its content.
    /// Marks a cached document fresh without rewriting its content.
    ///
    /// Used when the remote copy was re-read and found identical. Returns
    /// false if `key` has no record.
    pub fn touch(&self, key: &DocKey) -> Result<bool> {
        let now = self.clock.now();
        let touched = self.update_index(|index| match index.get_mut(key) {
            Some(record) => {
                advance_timestamp(record, now);
                true
            }
            None => false,
        })?;
        if touched {
            tracing::debug!("refreshed {}", key);
        }
        Ok(touched)
    }

    pub fn invalidate(&self, key: &DocKey) -> Result<()> {
        let mut index = self.load_index()?;
        if let Some(record) = index.get_mut(key) {
            record.cache_timestamp = Some(DateTime::<Utc>::UNIX_EPOCH);
            self.index.save(&index)?;
        }
        Ok(())
    }

    /// Marks every cached document stale.
    ///
    /// The sync watermark is left alone; a forced pass ignores it anyway.
    pub fn invalidate_all(&self) -> Result<()> {
        self.update_index(|index| {
            for kind in DocKind::ALL {
                for record in index.records_mut(kind).values_mut() {
                    record.cache_timestamp = Some(DateTime::<Utc>::UNIX_EPOCH);
                }
            }
        })
    }

    /// True if `key` has no record, no cache time, or is older than the threshold.
    pub fn is_stale(&self, key: &DocKey) -> Result<bool> {
        let index = self.load_index()?;
        Ok(self.is_meta_stale(index.get(key), self.clock.now()))
    }

    /// Whole minutes since `key` was last written.
    pub fn cache_age_minutes(&self, key: &DocKey) -> Result<Option<i64>> {
        let now = self.clock.now();
        Ok(self
            .meta(key)?
            .and_then(|meta| meta.cache_timestamp)
            .map(|ts| (now - ts).num_minutes()))
    }

    pub(crate) fn is_meta_stale(&self, meta: Option<&DocumentMeta>, now: DateTime<Utc>) -> bool {
        match meta.and_then(|m| m.cache_timestamp) {
            Some(ts) => now - ts > Duration::minutes(i64::from(self.threshold_minutes)),
            None => true,
        }
    }

    /// True if `candidate` differs from the content last written for `key`.
    pub fn has_content_changed(&self, key: &DocKey, candidate: &str) -> Result<bool> {
        let stored = self.meta(key)?.and_then(|meta| meta.content_hash);
        Ok(match stored {
            Some(hash) => hash != content_hash(candidate),
            None => true,
        })
    }

    /// Removes the content file and metadata for `key`.
    ///
    /// Returns true if anything was removed.
    pub fn delete(&self, key: &DocKey) -> Result<bool> {
        let removed_file = match fs::remove_file(self.content_path(key)) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        let removed_record = self.update_index(|index| index.remove(key).is_some())?;
        Ok(removed_file || removed_record)
    }

    pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.load_index()?.last_sync)
    }

    pub fn update_last_sync(&self, timestamp: DateTime<Utc>) -> Result<()> {
        self.update_index(|index| index.last_sync = Some(timestamp))
    }

    /// Ids of every cached document of `kind`.
    pub fn list(&self, kind: DocKind) -> Result<Vec<String>> {
        Ok(self.load_index()?.records(kind).keys().cloned().collect())
    }

    /// Ids of every stale document of `kind`.
    pub fn stale_keys(&self, kind: DocKind) -> Result<Vec<String>> {
        let index = self.load_index()?;
        let now = self.clock.now();
        Ok(index
            .records(kind)
            .iter()
            .filter(|(_, meta)| self.is_meta_stale(Some(meta), now))
            .map(|(id, _)| id.clone())
            .collect())
    }
}

/// Sets `cache_timestamp` to `now`, never moving it backwards.
fn advance_timestamp(record: &mut DocumentMeta, now: DateTime<Utc>) -> DateTime<Utc> {
    let timestamp = match record.cache_timestamp {
        Some(previous) if previous > now => previous,
        _ => now,
    };
    record.cache_timestamp = Some(timestamp);
    timestamp
}

fn kind_label(kind: DocKind) -> &'static str {
    match kind {
        DocKind::Story => "Story",
        DocKind::Prd => "PRD",
        DocKind::Epic => "Epic",
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
