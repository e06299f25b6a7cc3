// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Document identity and metadata records.
//!
//! Three document kinds share one cache: stories, PRDs and epics. Each is
//! addressed by a [`DocKey`] (kind plus id) and carries a [`DocumentMeta`]
//! record in the cache index.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Kind of cached document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    /// A unit of development work, mirrored from one remote issue.
    Story,
    /// A product requirements document under crowd review.
    Prd,
    /// A group of stories derived from a PRD.
    Epic,
}

impl DocKind {
    /// Every kind, in index order.
    pub const ALL: [DocKind; 3] = [DocKind::Story, DocKind::Prd, DocKind::Epic];

    /// Returns the string representation used in keys and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::Story => "story",
            DocKind::Prd => "prd",
            DocKind::Epic => "epic",
        }
    }

    /// Subdirectory of the cache root holding this kind's content files.
    pub fn dir_name(&self) -> &'static str {
        match self {
            DocKind::Story => "stories",
            DocKind::Prd => "prds",
            DocKind::Epic => "epics",
        }
    }

    /// Content file name for an id of this kind.
    pub fn file_name(&self, id: &str) -> String {
        match self {
            DocKind::Epic => format!("epic-{id}.md"),
            DocKind::Story | DocKind::Prd => format!("{id}.md"),
        }
    }

    /// PRDs and epics carry a review status and version.
    pub fn is_reviewed(&self) -> bool {
        matches!(self, DocKind::Prd | DocKind::Epic)
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DocKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "story" => Ok(DocKind::Story),
            "prd" => Ok(DocKind::Prd),
            "epic" => Ok(DocKind::Epic),
            _ => Err(Error::InvalidKind(s.to_string())),
        }
    }
}

/// Type-scoped document key.
///
/// The id becomes part of a file name, so construction rejects anything
/// that could escape the kind's subdirectory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocKey {
    kind: DocKind,
    id: String,
}

impl DocKey {
    /// Creates a key, validating the id.
    pub fn new(kind: DocKind, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_id(&id)?;
        Ok(DocKey { kind, id })
    }

    /// Key for a story (e.g. `"2-5-auth"`).
    pub fn story(id: impl Into<String>) -> Result<Self> {
        Self::new(DocKind::Story, id)
    }

    /// Key for a PRD (e.g. `"user-auth"`).
    pub fn prd(id: impl Into<String>) -> Result<Self> {
        Self::new(DocKind::Prd, id)
    }

    /// Key for an epic (e.g. `"2"`).
    pub fn epic(id: impl Into<String>) -> Result<Self> {
        Self::new(DocKind::Epic, id)
    }

    pub fn kind(&self) -> DocKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

fn validate_id(id: &str) -> Result<()> {
    let reject = |reason| {
        Err(Error::InvalidKey {
            key: id.to_string(),
            reason,
        })
    };
    if id.trim().is_empty() {
        return reject("id cannot be empty");
    }
    if id.contains(['/', '\\', '\0']) {
        return reject("id cannot contain path separators");
    }
    if id == "." || id.contains("..") {
        return reject("path traversal");
    }
    Ok(())
}

/// Review status of a PRD or epic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    /// Being written; not yet open for review.
    Draft,
    /// Open for stakeholder feedback.
    Feedback,
    /// Feedback is being folded into a new version.
    Synthesis,
    /// Awaiting stakeholder sign-off.
    Signoff,
    /// Signed off.
    Approved,
}

impl DocStatus {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Draft => "draft",
            DocStatus::Feedback => "feedback",
            DocStatus::Synthesis => "synthesis",
            DocStatus::Signoff => "signoff",
            DocStatus::Approved => "approved",
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DocStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(DocStatus::Draft),
            "feedback" => Ok(DocStatus::Feedback),
            "synthesis" => Ok(DocStatus::Synthesis),
            "signoff" => Ok(DocStatus::Signoff),
            "approved" => Ok(DocStatus::Approved),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

/// Advisory reservation of a document by one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub holder: String,
    #[serde(deserialize_with = "timestamp::required")]
    pub expires_at: DateTime<Utc>,
}

impl Lock {
    pub fn new(holder: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Lock {
            holder: holder.into(),
            expires_at,
        }
    }

    /// A lock expiring exactly at `now` is still live.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Per-document record stored in the cache index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Issue number of the document in the remote tracker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<u64>,
    /// Last update time reported by the remote tracker.
    #[serde(
        default,
        deserialize_with = "timestamp::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_updated_at: Option<DateTime<Utc>>,
    /// When the content file was last written locally.
    #[serde(
        default,
        deserialize_with = "timestamp::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_timestamp: Option<DateTime<Utc>>,
    /// SHA-256 of the content file, lowercase hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<Lock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DocStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stakeholders: Vec<String>,
    /// Source PRD of an epic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_key: Option<String>,
    /// Issue number of the current review round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_issue: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(
        default,
        deserialize_with = "timestamp::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub feedback_deadline: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "timestamp::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub signoff_deadline: Option<DateTime<Utc>>,
    /// Story ids belonging to an epic.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stories: Vec<String>,
}

impl DocumentMeta {
    /// Merges a patch over this record. Fields the patch leaves unset keep
    /// their current value.
    pub fn apply(&mut self, patch: MetaPatch) {
        let MetaPatch {
            remote_id,
            remote_updated_at,
            lock,
            status,
            version,
            stakeholders,
            lineage_key,
            review_issue,
            owner,
            feedback_deadline,
            signoff_deadline,
            stories,
        } = patch;

        merge(&mut self.remote_id, remote_id);
        merge(&mut self.remote_updated_at, remote_updated_at);
        merge(&mut self.status, status);
        merge(&mut self.version, version);
        merge(&mut self.lineage_key, lineage_key);
        merge(&mut self.review_issue, review_issue);
        merge(&mut self.owner, owner);
        merge(&mut self.feedback_deadline, feedback_deadline);
        merge(&mut self.signoff_deadline, signoff_deadline);
        if let Some(stakeholders) = stakeholders {
            self.stakeholders = stakeholders;
        }
        if let Some(stories) = stories {
            self.stories = stories;
        }
        match lock {
            LockUpdate::Keep => {}
            LockUpdate::Set(lock) => self.lock = Some(lock),
            LockUpdate::Clear => self.lock = None,
        }
    }

    /// True if `user` (with or without a leading `@`) is a stakeholder.
    pub fn has_stakeholder(&self, user: &str) -> bool {
        let user = user.trim_start_matches('@');
        self.stakeholders
            .iter()
            .any(|s| s.trim_start_matches('@') == user)
    }
}

fn merge<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// What a write should do with the document's lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LockUpdate {
    #[default]
    Keep,
    Set(Lock),
    Clear,
}

/// Partial metadata supplied alongside a content write.
///
/// `None` means "leave as is"; the cache never nulls a field because a
/// caller omitted it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaPatch {
    pub remote_id: Option<u64>,
    pub remote_updated_at: Option<DateTime<Utc>>,
    pub lock: LockUpdate,
    pub status: Option<DocStatus>,
    pub version: Option<u32>,
    pub stakeholders: Option<Vec<String>>,
    pub lineage_key: Option<String>,
    pub review_issue: Option<u64>,
    pub owner: Option<String>,
    pub feedback_deadline: Option<DateTime<Utc>>,
    pub signoff_deadline: Option<DateTime<Utc>>,
    pub stories: Option<Vec<String>>,
}

impl MetaPatch {
    /// Patch that only records the remote issue and its update time.
    pub fn remote(remote_id: u64, remote_updated_at: DateTime<Utc>) -> Self {
        MetaPatch {
            remote_id: Some(remote_id),
            remote_updated_at: Some(remote_updated_at),
            ..MetaPatch::default()
        }
    }
}

/// Parses an RFC 3339 timestamp, or a bare `YYYY-MM-DD` date as midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = s.parse::<DateTime<Utc>>() {
        return Some(ts);
    }
    let midnight = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}

/// Index timestamps written by older tools may be plain dates.
mod timestamp {
    use super::*;

    fn from_str<E: serde::de::Error>(s: &str) -> std::result::Result<DateTime<Utc>, E> {
        parse_timestamp(s).ok_or_else(|| E::custom(format!("invalid timestamp: {s:?}")))
    }

    pub fn required<'de, D>(d: D) -> std::result::Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        from_str(&s)
    }

    pub fn optional<'de, D>(d: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(d)?
            .map(|s| from_str(&s))
            .transpose()
    }
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
