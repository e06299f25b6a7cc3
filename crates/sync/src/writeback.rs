// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Write-through of local actions to the remote tracker.
//!
//! Comments, label changes and assignments are pushed to the tracker first
//! and mirrored into the cache afterwards. Post-write re-reads wait for the
//! configured settle delay to give the tracker a chance to converge.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use rv_core::{ClockSource, DocKey, DocKind, LockStatus};

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::mapping::{
    self, DEFAULT_AVAILABLE_STATUSES, STATUS_BACKLOG, STATUS_IN_PROGRESS, STATUS_READY_FOR_DEV,
};
use crate::remote::{IssueQuery, IssueUpdate, RemoteClient, RemoteIssue};
use crate::retry::{retry_with_backoff, Delay};

/// Changes to push to a document's remote issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushUpdate {
    pub comment: Option<String>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
}

impl PushUpdate {
    fn has_label_delta(&self) -> bool {
        !self.add_labels.is_empty() || !self.remove_labels.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushReceipt {
    pub key: String,
    pub remote_id: u64,
    /// The post-write re-read succeeded and showed the requested labels.
    pub verified: bool,
}

/// Progress through a story's task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProgress {
    pub task: u32,
    pub total: u32,
    pub description: String,
}

impl TaskProgress {
    /// Completion percentage, rounded to the nearest whole number.
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        let task = u64::from(self.task.min(self.total));
        let total = u64::from(self.total);
        u32::try_from((task * 100 + total / 2) / total).unwrap_or(100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub key: String,
    pub remote_id: u64,
    pub holder: String,
    pub lock_expires_at: DateTime<Utc>,
}

/// Where an availability answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockSource {
    Cache,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Availability {
    Available {
        remote_id: u64,
    },
    Unavailable {
        holder: String,
        expires_at: Option<DateTime<Utc>>,
        source: LockSource,
    },
    /// The tracker has no issue for this story.
    NotFound,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }
}

/// Narrows [`SyncEngine::available_stories`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityFilter {
    /// Epic the stories belong to.
    pub group: Option<String>,
    /// Workflow status without the `status:` prefix.
    pub status: Option<String>,
}

/// An unassigned story ready to be picked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorySummary {
    pub key: String,
    pub title: String,
    pub remote_id: u64,
    pub status: String,
    pub labels: Vec<String>,
    pub url: Option<String>,
}

impl<R: RemoteClient, C: ClockSource, D: Delay> SyncEngine<R, C, D> {
    /// Pushes a comment and label changes to the document's issue.
    ///
    /// Fails with [`SyncError::NotSynced`] before any remote call if the
    /// document has no recorded remote issue. Labels are read back and
    /// rewritten as a set rather than appended.
    pub async fn push(&self, key: &DocKey, update: PushUpdate) -> Result<PushReceipt> {
        let remote_id = self.remote_id(key)?;

        if let Some(body) = &update.comment {
            retry_with_backoff(&self.delay, &format!("comment on issue #{remote_id}"), || {
                self.remote.comment(remote_id, body.clone())
            })
            .await?;
        }

        if update.has_label_delta() {
            let issue = self.read_issue(remote_id).await?;
            let labels =
                mapping::apply_label_delta(&issue.labels, &update.add_labels, &update.remove_labels);
            retry_with_backoff(
                &self.delay,
                &format!("update labels on issue #{remote_id}"),
                || {
                    self.remote.update(
                        remote_id,
                        IssueUpdate {
                            labels: Some(labels.clone()),
                            ..IssueUpdate::default()
                        },
                    )
                },
            )
            .await?;
        }

        self.delay.sleep(self.settings.settle_delay()).await;
        let verified = match self.read_issue(remote_id).await {
            Ok(issue) => {
                update.add_labels.iter().all(|l| issue.has_label(l))
                    && !update.remove_labels.iter().any(|l| {
                        issue.has_label(l) && !update.add_labels.contains(l)
                    })
            }
            Err(e) => {
                tracing::warn!("could not verify issue #{}: {}", remote_id, e);
                false
            }
        };
        if verified {
            tracing::info!("issue #{} updated and verified", remote_id);
        } else {
            tracing::warn!("issue #{} updated but not yet visible", remote_id);
        }

        Ok(PushReceipt {
            key: key.to_string(),
            remote_id,
            verified,
        })
    }

    /// Posts a task-progress comment to the story's issue.
    pub async fn sync_progress(&self, key: &DocKey, progress: &TaskProgress) -> Result<PushReceipt> {
        let comment = format!(
            "📊 **Task {}/{} complete** ({}%)\n\n> {}\n\n_Progress synced at {}_",
            progress.task,
            progress.total,
            progress.percentage(),
            progress.description,
            self.cache.now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        self.push(
            key,
            PushUpdate {
                comment: Some(comment),
                ..PushUpdate::default()
            },
        )
        .await
    }

    /// Assigns a story to `holder` and locks it locally.
    ///
    /// A story that was never synced is looked up by key and written
    /// through first. Fails with [`SyncError::VerificationFailed`] if the
    /// re-read issue does not list `holder` as an assignee.
    pub async fn assign(&self, key: &DocKey, holder: &str) -> Result<Assignment> {
        let holder = holder.trim_start_matches('@');
        let remote_id = match self.cache.meta(key)?.and_then(|m| m.remote_id) {
            Some(id) => id,
            None if key.kind() == DocKind::Story => {
                let issue = self.find_story(key.id()).await?;
                let number = issue.number;
                self.sync_story(key.id(), Some(issue)).await?;
                number
            }
            None => return Err(SyncError::NotSynced(key.to_string())),
        };

        retry_with_backoff(
            &self.delay,
            &format!("assign issue #{remote_id} to {holder}"),
            || {
                self.remote.update(
                    remote_id,
                    IssueUpdate {
                        assignees: Some(vec![holder.to_string()]),
                        ..IssueUpdate::default()
                    },
                )
            },
        )
        .await?;

        self.push(
            key,
            PushUpdate {
                comment: Some(format!(
                    "🔒 **Story locked by @{holder}**\n\nLock expires in {} hours.",
                    self.settings.lock_ttl_hours
                )),
                add_labels: vec![STATUS_IN_PROGRESS.to_string()],
                remove_labels: vec![STATUS_BACKLOG.to_string(), STATUS_READY_FOR_DEV.to_string()],
            },
        )
        .await?;

        let lock = self
            .cache
            .acquire_lock(key, holder, self.settings.lock_ttl())?;

        self.delay.sleep(self.settings.settle_delay()).await;
        let issue = self.read_issue(remote_id).await?;
        if !issue.assignees.iter().any(|a| a == holder) {
            return Err(SyncError::VerificationFailed {
                key: key.to_string(),
                expected: format!("assignee @{holder}"),
            });
        }

        tracing::info!("{} assigned to @{}", key, holder);
        Ok(Assignment {
            key: key.to_string(),
            remote_id,
            holder: holder.to_string(),
            lock_expires_at: lock.expires_at,
        })
    }

    /// Clears the story's assignees and its local lock.
    ///
    /// Fails with [`SyncError::VerificationFailed`] if the re-read issue
    /// still has an assignee.
    pub async fn unassign(&self, key: &DocKey, reason: Option<&str>) -> Result<PushReceipt> {
        let remote_id = self.remote_id(key)?;

        retry_with_backoff(&self.delay, &format!("unassign issue #{remote_id}"), || {
            self.remote.update(
                remote_id,
                IssueUpdate {
                    assignees: Some(Vec::new()),
                    ..IssueUpdate::default()
                },
            )
        })
        .await?;

        let comment = match reason {
            Some(reason) => format!("🔓 **Story unlocked**\n\nReason: {reason}"),
            None => "🔓 **Story unlocked**".to_string(),
        };
        let receipt = self
            .push(
                key,
                PushUpdate {
                    comment: Some(comment),
                    add_labels: vec![STATUS_READY_FOR_DEV.to_string()],
                    remove_labels: vec![STATUS_IN_PROGRESS.to_string()],
                },
            )
            .await?;

        self.cache.release_lock(key)?;

        let issue = self.read_issue(remote_id).await?;
        if let Some(assignee) = issue.assignee() {
            return Err(SyncError::VerificationFailed {
                key: key.to_string(),
                expected: format!("no assignee, found @{assignee}"),
            });
        }

        tracing::info!("{} unlocked", key);
        Ok(receipt)
    }

    /// Whether `actor` may take the story.
    ///
    /// A live cached lock held by someone else answers immediately. Any
    /// other case asks the tracker, and the cached lock is brought in line
    /// with the tracker's assignee when they disagree.
    pub async fn check_availability(&self, key: &DocKey, actor: &str) -> Result<Availability> {
        let actor = actor.trim_start_matches('@');
        let cached = self.cache.lock_status(key)?;
        if let Some(LockStatus::Held { holder, expires_at }) = &cached {
            if holder != actor {
                return Ok(Availability::Unavailable {
                    holder: holder.clone(),
                    expires_at: Some(*expires_at),
                    source: LockSource::Cache,
                });
            }
        }

        let issues = retry_with_backoff(&self.delay, &format!("check availability of {key}"), || {
            self.remote.search(IssueQuery::ByKey(key.id().to_string()))
        })
        .await?;
        let Some(issue) = issues.into_iter().next() else {
            return Ok(Availability::NotFound);
        };

        let cached_holder = cached.as_ref().and_then(LockStatus::live_holder);
        let remote_holder = issue.assignee();
        if cached_holder != remote_holder {
            match remote_holder {
                Some(holder) => {
                    self.cache
                        .acquire_lock(key, holder, self.settings.lock_ttl())?;
                }
                None => self.cache.release_lock(key)?,
            }
            tracing::debug!("{} lock refreshed from remote", key);
        }

        match remote_holder {
            Some(holder) if holder != actor => Ok(Availability::Unavailable {
                holder: holder.to_string(),
                expires_at: None,
                source: LockSource::Remote,
            }),
            _ => Ok(Availability::Available {
                remote_id: issue.number,
            }),
        }
    }

    /// Unassigned stories matching `filter`.
    ///
    /// With no status in the filter, `ready-for-dev` and `backlog` stories
    /// are returned. Issues without a story key are left out.
    pub async fn available_stories(&self, filter: &AvailabilityFilter) -> Result<Vec<StorySummary>> {
        let issues = retry_with_backoff(&self.delay, "search for available stories", || {
            self.remote.search(IssueQuery::Available {
                group: filter.group.clone(),
                status: filter.status.clone(),
            })
        })
        .await?;

        Ok(issues
            .into_iter()
            .filter(|issue| issue.assignees.is_empty())
            .filter_map(|issue| {
                let key = mapping::story_key(&issue)?;
                let status = mapping::story_status(&issue);
                let wanted = match &filter.status {
                    Some(wanted) => status == *wanted,
                    None => DEFAULT_AVAILABLE_STATUSES.contains(&status.as_str()),
                };
                wanted.then(|| StorySummary {
                    key,
                    title: issue.title,
                    remote_id: issue.number,
                    status,
                    labels: issue.labels,
                    url: issue.html_url,
                })
            })
            .collect())
    }

    fn remote_id(&self, key: &DocKey) -> Result<u64> {
        self.cache
            .meta(key)?
            .and_then(|meta| meta.remote_id)
            .ok_or_else(|| SyncError::NotSynced(key.to_string()))
    }

    async fn read_issue(&self, number: u64) -> Result<RemoteIssue> {
        retry_with_backoff(&self.delay, &format!("read issue #{number}"), || {
            self.remote.read(number)
        })
        .await
    }
}
