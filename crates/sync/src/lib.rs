// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! rv-sync: reconciliation between the review cache and a remote tracker.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │    Caller    │────►│  SyncEngine  │────►│ RemoteClient │
//! └──────────────┘     └──────────────┘     │   (trait)    │
//!                             │             └──────────────┘
//!                             ▼
//!                      ┌──────────────┐
//!                      │ CacheManager │  (rv-core, on disk)
//!                      └──────────────┘
//! ```
//!
//! # Features
//!
//! - Incremental sync from a committed watermark, one search per pass
//! - Digest-checked write-through so unchanged stories are left alone
//! - Epic pre-fetch in a single round trip
//! - Comment, label and assignment write-back with post-write re-reads
//! - Fixed 1s/3s/9s retry backoff on every remote call
//! - One in-flight pass per gate; overlapping requests are skipped

mod engine;
mod error;
mod gate;
pub mod mapping;
mod remote;
mod retry;
mod writeback;

pub use engine::{
    EpicPrefetch, SkipReason, StorySync, SyncEngine, SyncFailure, SyncOptions, SyncOutcome,
    SyncReport,
};
pub use error::{Result, SyncError};
pub use gate::{GateGuard, SyncGate};
pub use remote::{
    IssueQuery, IssueState, IssueUpdate, NewIssue, RemoteClient, RemoteError, RemoteFuture,
    RemoteIssue, RemoteResult,
};
pub use retry::{retry_with_backoff, Delay, TokioDelay, MAX_RETRIES, RETRY_BACKOFF};
pub use writeback::{
    Assignment, Availability, AvailabilityFilter, LockSource, PushReceipt, PushUpdate,
    StorySummary, TaskProgress,
};

#[cfg(test)]
mod test_helpers;

#[cfg(test)]
mod engine_tests;
