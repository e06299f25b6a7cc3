// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Review queries over the cache index.
//!
//! These answer "what needs my attention" without touching the remote
//! tracker: PRD/epic status filters, epic lineage, and cache statistics.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheManager;
use crate::clock::ClockSource;
use crate::document::{DocKey, DocKind, DocStatus, DocumentMeta};
use crate::error::{Error, Result};

/// A document id paired with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentEntry {
    pub id: String,
    pub meta: DocumentMeta,
}

/// Review work waiting on one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Attention {
    pub prd_feedback: Vec<DocumentEntry>,
    pub prd_signoff: Vec<DocumentEntry>,
    pub epic_feedback: Vec<DocumentEntry>,
}

impl Attention {
    pub fn is_empty(&self) -> bool {
        self.prd_feedback.is_empty() && self.prd_signoff.is_empty() && self.epic_feedback.is_empty()
    }
}

/// Counts for one document kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub count: usize,
    pub stale: usize,
    pub fresh: usize,
    /// Locks that have not expired.
    pub locked: usize,
    pub size_bytes: u64,
    pub by_status: BTreeMap<String, usize>,
}

/// Snapshot of the whole cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub stories: KindStats,
    pub prds: KindStats,
    pub epics: KindStats,
    pub total_size_bytes: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub staleness_threshold_minutes: u32,
}

impl<C: ClockSource> CacheManager<C> {
    /// Sets the review status of a cached PRD or epic.
    ///
    /// Fails with [`Error::NotFound`] if `key` has no metadata record.
    pub fn update_status(&self, key: &DocKey, status: DocStatus) -> Result<()> {
        let mut index = self.load_index()?;
        let now = self.now();
        let record = index
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        record.status = Some(status);
        record.cache_timestamp = Some(match record.cache_timestamp {
            Some(previous) if previous > now => previous,
            _ => now,
        });
        self.save_index(&index)
    }

    /// Documents of `kind` currently in `status`.
    pub fn by_status(&self, kind: DocKind, status: DocStatus) -> Result<Vec<DocumentEntry>> {
        self.filter(kind, |meta| meta.status == Some(status))
    }

    /// Epics derived from the PRD `prd_id`.
    pub fn epics_by_prd(&self, prd_id: &str) -> Result<Vec<DocumentEntry>> {
        self.filter(DocKind::Epic, |meta| meta.lineage_key.as_deref() == Some(prd_id))
    }

    /// PRDs and epics where `user` is a stakeholder and a review step is open.
    pub fn needing_attention(&self, user: &str) -> Result<Attention> {
        let index = self.load_index()?;
        let mut attention = Attention::default();

        for (id, meta) in index.records(DocKind::Prd) {
            if !meta.has_stakeholder(user) {
                continue;
            }
            let entry = || DocumentEntry {
                id: id.clone(),
                meta: meta.clone(),
            };
            match meta.status {
                Some(DocStatus::Feedback) => attention.prd_feedback.push(entry()),
                Some(DocStatus::Signoff) => attention.prd_signoff.push(entry()),
                _ => {}
            }
        }

        for (id, meta) in index.records(DocKind::Epic) {
            if meta.has_stakeholder(user) && meta.status == Some(DocStatus::Feedback) {
                attention.epic_feedback.push(DocumentEntry {
                    id: id.clone(),
                    meta: meta.clone(),
                });
            }
        }

        Ok(attention)
    }

    /// Counts, sizes and status breakdowns for every kind.
    pub fn stats(&self) -> Result<CacheStats> {
        let index = self.load_index()?;
        let now = self.now();

        let mut per_kind = Vec::with_capacity(DocKind::ALL.len());
        for kind in DocKind::ALL {
            let records = index.records(kind);
            let mut stats = KindStats {
                count: records.len(),
                size_bytes: dir_size(&self.root().join(kind.dir_name()))?,
                ..KindStats::default()
            };
            for meta in records.values() {
                if self.is_meta_stale(Some(meta), now) {
                    stats.stale += 1;
                }
                if meta.lock.as_ref().is_some_and(|lock| !lock.is_expired_at(now)) {
                    stats.locked += 1;
                }
                if let Some(status) = meta.status {
                    *stats.by_status.entry(status.to_string()).or_default() += 1;
                }
            }
            stats.fresh = stats.count - stats.stale;
            per_kind.push(stats);
        }

        let mut per_kind = per_kind.into_iter();
        let stories = per_kind.next().unwrap_or_default();
        let prds = per_kind.next().unwrap_or_default();
        let epics = per_kind.next().unwrap_or_default();

        Ok(CacheStats {
            total_size_bytes: stories.size_bytes + prds.size_bytes + epics.size_bytes,
            stories,
            prds,
            epics,
            last_sync: index.last_sync,
            staleness_threshold_minutes: self.staleness_threshold_minutes(),
        })
    }

    fn filter(
        &self,
        kind: DocKind,
        pred: impl Fn(&DocumentMeta) -> bool,
    ) -> Result<Vec<DocumentEntry>> {
        Ok(self
            .load_index()?
            .records(kind)
            .iter()
            .filter(|(_, meta)| pred(meta))
            .map(|(id, meta)| DocumentEntry {
                id: id.clone(),
                meta: meta.clone(),
            })
            .collect())
    }
}

fn dir_size(dir: &Path) -> Result<u64> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut total = 0;
    for entry in entries {
        let metadata = entry?.metadata()?;
        if metadata.is_file() {
            total += metadata.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
