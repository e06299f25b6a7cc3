// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Soft locks on cached documents.
//!
//! A lock is an advisory `{holder, expires_at}` pair stored in the
//! document's metadata. Nothing in the storage layer enforces it. Expiry is
//! evaluated when a lock is read; expired locks are never swept.

use chrono::{DateTime, Duration, Utc};

use crate::cache::CacheManager;
use crate::clock::ClockSource;
use crate::document::{DocKey, DocKind, Lock};
use crate::error::Result;

/// Current state of a document's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// A lock is recorded and has not expired.
    Held {
        holder: String,
        expires_at: DateTime<Utc>,
    },
    /// A lock is recorded but its expiry has passed.
    Expired { previous_holder: String },
}

impl LockStatus {
    /// Holder of a live lock.
    pub fn live_holder(&self) -> Option<&str> {
        match self {
            LockStatus::Held { holder, .. } => Some(holder),
            LockStatus::Expired { .. } => None,
        }
    }
}

/// A lock found while listing a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedDocument {
    pub id: String,
    pub holder: String,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
}

impl<C: ClockSource> CacheManager<C> {
    /// Records a lock for `holder` lasting `ttl` from now.
    ///
    /// Creates an empty metadata record if `key` is not cached yet.
    pub fn acquire_lock(&self, key: &DocKey, holder: &str, ttl: Duration) -> Result<Lock> {
        let lock = Lock::new(holder, self.now() + ttl);
        self.set_lock(key, lock.clone())?;
        Ok(lock)
    }

    /// Records an explicit lock, replacing any existing one.
    pub fn set_lock(&self, key: &DocKey, lock: Lock) -> Result<()> {
        tracing::debug!("lock {} -> {} until {}", key, lock.holder, lock.expires_at);
        self.update_index(|index| index.entry(key).lock = Some(lock))
    }

    /// Clears the lock on `key`, if any.
    pub fn release_lock(&self, key: &DocKey) -> Result<()> {
        let mut index = self.load_index()?;
        if let Some(record) = index.get_mut(key) {
            if record.lock.take().is_some() {
                self.save_index(&index)?;
            }
        }
        Ok(())
    }

    /// Lock state of `key`, or `None` if unlocked.
    pub fn lock_status(&self, key: &DocKey) -> Result<Option<LockStatus>> {
        let now = self.now();
        Ok(self
            .meta(key)?
            .and_then(|meta| meta.lock)
            .map(|lock| status_at(lock, now)))
    }

    /// Every lock recorded for `kind`, expired or not.
    pub fn locked_documents(&self, kind: DocKind) -> Result<Vec<LockedDocument>> {
        let now = self.now();
        Ok(self
            .load_index()?
            .records(kind)
            .iter()
            .filter_map(|(id, meta)| {
                meta.lock.as_ref().map(|lock| LockedDocument {
                    id: id.clone(),
                    holder: lock.holder.clone(),
                    expires_at: lock.expires_at,
                    expired: lock.is_expired_at(now),
                })
            })
            .collect())
    }
}

fn status_at(lock: Lock, now: DateTime<Utc>) -> LockStatus {
    if lock.is_expired_at(now) {
        LockStatus::Expired {
            previous_holder: lock.holder,
        }
    } else {
        LockStatus::Held {
            holder: lock.holder,
            expires_at: lock.expires_at,
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
