// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote issue tracker contract.
//!
//! The tracker is the source of truth. This crate never speaks its wire
//! protocol; callers supply a [`RemoteClient`] and the engine drives it.
//! Label taxonomy and assignment rules belong to the implementation.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error type for remote calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The requested issue does not exist. Never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// The tracker could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The tracker rejected or failed the request.
    #[error("api error: {0}")]
    Api(String),
}

impl RemoteError {
    /// True for failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RemoteError::NotFound(_))
    }
}

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Boxed future returned by every [`RemoteClient`] method.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
}

/// An issue as reported by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub state: IssueState,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Logins, without a leading `@`.
    #[serde(default)]
    pub assignees: Vec<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl RemoteIssue {
    /// The first assignee, if any.
    pub fn assignee(&self) -> Option<&str> {
        self.assignees.first().map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Searches the engine runs against the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueQuery {
    /// Story issues updated at or after `since`; every story when `None`.
    ChangedSince { since: Option<DateTime<Utc>> },
    /// The story issue carrying this story key.
    ByKey(String),
    /// Story issues belonging to an epic.
    InGroup(String),
    /// Unassigned story issues, optionally narrowed to an epic and a
    /// status. With no status the tracker should return `ready-for-dev`
    /// and `backlog` stories.
    Available {
        group: Option<String>,
        status: Option<String>,
    },
}

/// Fields for a new issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
}

/// Partial issue update. `None` leaves the field untouched; `Some(vec![])`
/// clears a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<IssueState>,
    pub labels: Option<Vec<String>>,
    pub assignees: Option<Vec<String>>,
}

/// One method per tracker capability.
///
/// Implementations own transport, authentication and rate limiting. The
/// engine retries transient failures itself, so implementations should not.
pub trait RemoteClient: Send + Sync {
    fn search(&self, query: IssueQuery) -> RemoteFuture<'_, Vec<RemoteIssue>>;

    fn read(&self, number: u64) -> RemoteFuture<'_, RemoteIssue>;

    fn create(&self, issue: NewIssue) -> RemoteFuture<'_, RemoteIssue>;

    fn update(&self, number: u64, update: IssueUpdate) -> RemoteFuture<'_, RemoteIssue>;

    fn comment(&self, number: u64, body: String) -> RemoteFuture<'_, ()>;
}
