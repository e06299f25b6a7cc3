// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The persisted cache index.
//!
//! One JSON file per cache root maps every cached document to its
//! [`DocumentMeta`] and records the global sync watermark. The whole file is
//! read, changed in memory and atomically rewritten on every update.
//!
//! Loading is forgiving:
//! - a missing file is initialized empty
//! - a pre-3.x file is migrated in place and rewritten
//! - a record with an unreadable field loses that field, not the file
//! - an unparseable file is set aside as `<name>.corrupt` and reinitialized

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::atomic::write_atomic;
use crate::document::{DocKey, DocKind, DocStatus, DocumentMeta};
use crate::error::Result;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: &str = "3.0.0";

/// File name of the index inside a cache root.
pub const META_FILE_NAME: &str = ".review-cache-meta.json";

/// Suffix given to an index that could not be parsed.
const CORRUPT_SUFFIX: &str = "corrupt";

/// Versioned map of every cached document's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheIndex {
    pub version: String,
    /// Watermark of the last completed sync pass.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_repo: Option<String>,
    #[serde(default)]
    pub stories: BTreeMap<String, DocumentMeta>,
    #[serde(default)]
    pub prds: BTreeMap<String, DocumentMeta>,
    #[serde(default)]
    pub epics: BTreeMap<String, DocumentMeta>,
}

impl CacheIndex {
    /// Creates an empty index at the current schema version.
    pub fn new(remote_owner: Option<String>, remote_repo: Option<String>) -> Self {
        CacheIndex {
            version: SCHEMA_VERSION.to_string(),
            last_sync: None,
            remote_owner,
            remote_repo,
            stories: BTreeMap::new(),
            prds: BTreeMap::new(),
            epics: BTreeMap::new(),
        }
    }

    pub fn records(&self, kind: DocKind) -> &BTreeMap<String, DocumentMeta> {
        match kind {
            DocKind::Story => &self.stories,
            DocKind::Prd => &self.prds,
            DocKind::Epic => &self.epics,
        }
    }

    pub fn records_mut(&mut self, kind: DocKind) -> &mut BTreeMap<String, DocumentMeta> {
        match kind {
            DocKind::Story => &mut self.stories,
            DocKind::Prd => &mut self.prds,
            DocKind::Epic => &mut self.epics,
        }
    }

    pub fn get(&self, key: &DocKey) -> Option<&DocumentMeta> {
        self.records(key.kind()).get(key.id())
    }

    pub fn get_mut(&mut self, key: &DocKey) -> Option<&mut DocumentMeta> {
        self.records_mut(key.kind()).get_mut(key.id())
    }

    /// Record for `key`, created empty if absent.
    pub fn entry(&mut self, key: &DocKey) -> &mut DocumentMeta {
        self.records_mut(key.kind())
            .entry(key.id().to_string())
            .or_default()
    }

    pub fn remove(&mut self, key: &DocKey) -> Option<DocumentMeta> {
        self.records_mut(key.kind()).remove(key.id())
    }
}

/// Handle on the index file of one cache root.
#[derive(Debug, Clone)]
pub struct IndexFile {
    path: PathBuf,
}

impl IndexFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        IndexFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the unreadable index is moved to before reinitializing.
    pub fn corrupt_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".");
        name.push(CORRUPT_SUFFIX);
        PathBuf::from(name)
    }

    /// Loads the index, initializing, migrating or recovering as needed.
    ///
    /// `init` builds the empty index used for a missing or corrupt file.
    pub fn load_or_init(&self, init: impl FnOnce() -> CacheIndex) -> Result<CacheIndex> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let index = init();
                self.save(&index)?;
                return Ok(index);
            }
            Err(e) => return Err(e.into()),
        };

        match parse(&bytes) {
            Ok(Parsed::Current(index)) => Ok(index),
            Ok(Parsed::Migrated { index, from }) => {
                tracing::info!(
                    "migrated cache index {} from version {} to {}",
                    self.path.display(),
                    from.as_deref().unwrap_or("unversioned"),
                    SCHEMA_VERSION
                );
                self.save(&index)?;
                Ok(index)
            }
            Err(reason) => {
                let corrupt = self.corrupt_path();
                tracing::warn!(
                    "failed to parse cache index {}, reinitializing (previous copy kept at {}): {}",
                    self.path.display(),
                    corrupt.display(),
                    reason
                );
                write_atomic(&corrupt, &bytes)?;
                let index = init();
                self.save(&index)?;
                Ok(index)
            }
        }
    }

    /// Atomically rewrites the whole index.
    pub fn save(&self, index: &CacheIndex) -> Result<()> {
        let json = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.path, &json)
    }
}

enum Parsed {
    Current(CacheIndex),
    Migrated {
        index: CacheIndex,
        from: Option<String>,
    },
}

const SECTIONS: [&str; 3] = ["stories", "prds", "epics"];

fn parse(bytes: &[u8]) -> std::result::Result<Parsed, String> {
    let mut value: Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    let root = value
        .as_object_mut()
        .ok_or_else(|| "index root is not a JSON object".to_string())?;

    let from = root
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_string);
    let needs_migration = !from.as_deref().is_some_and(is_current);
    if needs_migration {
        migrate_legacy(root);
    }

    // Records are decoded one by one so a bad record cannot sink the file.
    let mut sections = Vec::with_capacity(SECTIONS.len());
    for section in SECTIONS {
        match root.remove(section) {
            None => sections.push(Map::new()),
            Some(Value::Object(records)) => sections.push(records),
            Some(_) => return Err(format!("section {section} is not a JSON object")),
        }
    }

    let mut index: CacheIndex = serde_json::from_value(value).map_err(|e| e.to_string())?;
    for (kind, records) in [DocKind::Story, DocKind::Prd, DocKind::Epic]
        .into_iter()
        .zip(sections)
    {
        let decoded = index.records_mut(kind);
        for (id, record) in records {
            if let Some(meta) = decode_record(kind, &id, record) {
                decoded.insert(id, meta);
            }
        }
    }

    if needs_migration {
        Ok(Parsed::Migrated { index, from })
    } else {
        Ok(Parsed::Current(index))
    }
}

/// Decodes one record, dropping any field that does not parse.
fn decode_record(kind: DocKind, id: &str, record: Value) -> Option<DocumentMeta> {
    let Value::Object(mut fields) = record else {
        tracing::warn!("dropping {} {}: record is not a JSON object", kind, id);
        return None;
    };
    if let Ok(meta) = DocumentMeta::deserialize(&Value::Object(fields.clone())) {
        return Some(meta);
    }

    let bad: Vec<String> = fields
        .iter()
        .filter(|(name, value)| {
            let mut single = Map::new();
            single.insert((*name).clone(), (*value).clone());
            DocumentMeta::deserialize(&Value::Object(single)).is_err()
        })
        .map(|(name, _)| name.clone())
        .collect();
    for name in &bad {
        if let Some(value) = fields.remove(name) {
            tracing::warn!("dropping unreadable field {} = {} from {} {}", name, value, kind, id);
        }
    }

    match DocumentMeta::deserialize(&Value::Object(fields)) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::warn!("dropping {} {}: {}", kind, id, e);
            None
        }
    }
}

/// Any 3.x (or later) index is read as-is.
fn is_current(version: &str) -> bool {
    version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u32>().ok())
        .is_some_and(|major| major >= 3)
}

/// Upgrades a 1.x or 2.x index in place.
///
/// Both named fields after the GitHub API and stored the lock as two flat
/// nullable fields; 1.x only knew stories.
fn migrate_legacy(root: &mut Map<String, Value>) {
    rename(root, "github_owner", "remote_owner");
    rename(root, "github_repo", "remote_repo");

    for section in SECTIONS {
        let records = root
            .entry(section)
            .or_insert_with(|| Value::Object(Map::new()));
        if !records.is_object() {
            *records = Value::Object(Map::new());
        }
        if let Some(records) = records.as_object_mut() {
            for record in records.values_mut() {
                if let Some(record) = record.as_object_mut() {
                    migrate_record(record);
                }
            }
        }
    }

    root.insert(
        "version".to_string(),
        Value::String(SCHEMA_VERSION.to_string()),
    );
}

fn migrate_record(record: &mut Map<String, Value>) {
    record.retain(|_, v| !v.is_null());

    rename(record, "github_issue", "remote_id");
    rename(record, "github_updated_at", "remote_updated_at");
    rename(record, "local_hash", "content_hash");
    rename(record, "prd_key", "lineage_key");

    let holder = record.remove("locked_by");
    let expiry = record.remove("locked_until");
    match (holder, expiry) {
        (Some(Value::String(holder)), Some(Value::String(expires_at))) => {
            let mut lock = Map::new();
            lock.insert("holder".to_string(), Value::String(holder));
            lock.insert("expires_at".to_string(), Value::String(expires_at));
            record.insert("lock".to_string(), Value::Object(lock));
        }
        (Some(Value::String(holder)), _) => {
            tracing::debug!("dropping lock held by {} with no expiry", holder);
        }
        _ => {}
    }

    if let Some(status) = record.remove("status") {
        match status.as_str().map(str::parse::<DocStatus>) {
            Some(Ok(status)) => {
                record.insert("status".to_string(), Value::String(status.to_string()));
            }
            _ => tracing::debug!("dropping unknown status {}", status),
        }
    }
}

fn rename(map: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = map.remove(from) {
        map.entry(to).or_insert(value);
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
