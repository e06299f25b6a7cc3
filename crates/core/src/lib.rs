// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! rv-core: local cache for review documents
//!
//! This crate owns the on-disk mirror of stories, PRDs and epics whose
//! source of truth is a remote issue tracker. It decides staleness, records
//! soft locks, detects content changes by digest and migrates the index
//! schema. It has no network dependency; see `rv-sync` for reconciliation.

pub mod atomic;
pub mod cache;
pub mod clock;
pub mod config;
pub mod digest;
pub mod document;
pub mod error;
pub mod index;
pub mod lock;
pub mod query;

pub use cache::{CacheManager, CachedDocument, ReadOptions, WriteReceipt};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use config::{CacheConfig, Config, RemoteConfig, SyncSettings};
pub use digest::content_hash;
pub use document::{DocKey, DocKind, DocStatus, DocumentMeta, Lock, LockUpdate, MetaPatch};
pub use error::{Error, Result};
pub use index::{CacheIndex, SCHEMA_VERSION};
pub use lock::{LockStatus, LockedDocument};
pub use query::{Attention, CacheStats, DocumentEntry, KindStats};
