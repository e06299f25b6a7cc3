// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation of the local cache against the remote tracker.

use chrono::{DateTime, Utc};
use serde::Serialize;

use rv_core::{CacheManager, ClockSource, DocKey, SyncSettings, SystemClock};

use crate::error::{Result, SyncError};
use crate::gate::SyncGate;
use crate::mapping;
use crate::remote::{IssueQuery, RemoteClient, RemoteIssue};
use crate::retry::{retry_with_backoff, Delay, TokioDelay};

/// Options for [`SyncEngine::incremental_sync`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Ignore the watermark and reconcile every story.
    pub force: bool,
}

/// Why a pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SyncInProgress,
}

/// Result of a sync request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SyncOutcome {
    /// Another pass held the gate; nothing was done.
    Skipped { reason: SkipReason },
    Completed(SyncReport),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Skipped { .. } => None,
        }
    }
}

/// An item that could not be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    /// Story key, or `#<number>` when the issue has no key.
    pub item: String,
    pub error: String,
}

/// Per-item results of one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    pub errors: Vec<SyncFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// What [`SyncEngine::sync_story`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorySync {
    /// New content was written to the cache.
    Updated { remote_id: u64 },
    /// The cached digest already matched.
    Unchanged,
}

/// Result of [`SyncEngine::pre_fetch_epic`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpicPrefetch {
    pub group: String,
    /// Story keys now present and current in the cache.
    pub stories: Vec<String>,
    pub errors: Vec<SyncFailure>,
}

/// Keeps a [`CacheManager`] consistent with a remote tracker.
///
/// Every remote call goes through [`retry_with_backoff`]; cache calls are
/// never retried. One [`SyncGate`] keeps passes from overlapping.
pub struct SyncEngine<R: RemoteClient, C: ClockSource = SystemClock, D: Delay = TokioDelay> {
    pub(crate) cache: CacheManager<C>,
    pub(crate) remote: R,
    pub(crate) settings: SyncSettings,
    pub(crate) delay: D,
    gate: SyncGate,
}

impl<R: RemoteClient> SyncEngine<R> {
    /// Create an engine that sleeps on the tokio timer.
    pub fn new(cache: CacheManager, remote: R, settings: SyncSettings) -> Self {
        SyncEngine::with_delay(cache, remote, settings, TokioDelay)
    }
}

impl<R: RemoteClient, C: ClockSource, D: Delay> SyncEngine<R, C, D> {
    /// Create an engine with a custom sleep source.
    pub fn with_delay(cache: CacheManager<C>, remote: R, settings: SyncSettings, delay: D) -> Self {
        SyncEngine {
            cache,
            remote,
            settings,
            delay,
            gate: SyncGate::new(),
        }
    }

    /// Replace the private gate with a shared one.
    pub fn with_gate(mut self, gate: SyncGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn cache(&self) -> &CacheManager<C> {
        &self.cache
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn gate(&self) -> &SyncGate {
        &self.gate
    }

    /// Reconciles stories changed since the last committed watermark.
    ///
    /// Returns [`SyncOutcome::Skipped`] without touching anything if a pass
    /// is already running. Per-item failures land in the report; only a
    /// failed search or a cache error fails the pass, and then the
    /// watermark is left as it was.
    pub async fn incremental_sync(&self, options: SyncOptions) -> Result<SyncOutcome> {
        let Some(_guard) = self.gate.try_enter() else {
            tracing::info!("sync already in progress, skipping");
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::SyncInProgress,
            });
        };
        self.run_pass(options.force).await.map(SyncOutcome::Completed)
    }

    /// Marks the whole cache stale, then reconciles every story.
    pub async fn full_sync(&self) -> Result<SyncOutcome> {
        let Some(_guard) = self.gate.try_enter() else {
            tracing::info!("sync already in progress, skipping full sync");
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::SyncInProgress,
            });
        };
        tracing::info!("starting full sync");
        self.cache.invalidate_all()?;
        self.run_pass(true).await.map(SyncOutcome::Completed)
    }

    async fn run_pass(&self, force: bool) -> Result<SyncReport> {
        let started_at = self.cache.now();
        let committed = self.cache.last_sync()?;
        let since = if force { None } else { committed };

        match since {
            Some(since) => tracing::info!("starting incremental sync since {}", since),
            None => tracing::info!("starting incremental sync of all stories"),
        }

        let issues = retry_with_backoff(&self.delay, "search for changed stories", || {
            self.remote.search(IssueQuery::ChangedSince { since })
        })
        .await?;
        tracing::info!("found {} stories to sync", issues.len());

        let mut updated = Vec::new();
        let mut unchanged = Vec::new();
        let mut errors = Vec::new();

        for issue in issues {
            let Some(id) = mapping::story_key(&issue) else {
                tracing::warn!("skipping issue #{}: no story key", issue.number);
                errors.push(SyncFailure {
                    item: format!("#{}", issue.number),
                    error: "no story key".to_string(),
                });
                continue;
            };
            match self.sync_story(&id, Some(issue)).await {
                Ok(StorySync::Updated { .. }) => updated.push(id),
                Ok(StorySync::Unchanged) => unchanged.push(id),
                Err(e) => {
                    tracing::warn!("failed to sync {}: {}", id, e);
                    errors.push(SyncFailure {
                        item: id,
                        error: e.to_string(),
                    });
                }
            }
        }

        // The watermark only ever moves forward.
        let watermark = match committed {
            Some(previous) if previous > started_at => previous,
            _ => started_at,
        };
        self.cache.update_last_sync(watermark)?;

        let report = SyncReport {
            updated,
            unchanged,
            errors,
            started_at,
            finished_at: self.cache.now(),
        };
        tracing::info!(
            "sync complete: {} updated, {} unchanged, {} errors",
            report.updated.len(),
            report.unchanged.len(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Brings one story up to date, fetching its issue unless `issue` is given.
    ///
    /// Content is written only when its digest differs from the cached one.
    /// An unchanged story keeps its cache timestamp unless it had gone stale,
    /// in which case the timestamp is refreshed without a rewrite.
    pub async fn sync_story(&self, id: &str, issue: Option<RemoteIssue>) -> Result<StorySync> {
        let key = DocKey::story(id)?;
        let issue = match issue {
            Some(issue) => issue,
            None => self.find_story(id).await?,
        };

        let content = mapping::story_content(id, &issue);
        if !self.cache.has_content_changed(&key, &content)? {
            if self.cache.is_stale(&key)? {
                self.cache.touch(&key)?;
            }
            tracing::debug!("{} unchanged", key);
            return Ok(StorySync::Unchanged);
        }

        let lock_expires_at = self.cache.now() + self.settings.lock_ttl();
        self.cache
            .write(&key, &content, mapping::story_patch(&issue, lock_expires_at))?;
        tracing::info!("{} synced from issue #{}", key, issue.number);
        Ok(StorySync::Updated {
            remote_id: issue.number,
        })
    }

    /// Caches every story of an epic with a single search.
    pub async fn pre_fetch_epic(&self, group: &str) -> Result<EpicPrefetch> {
        tracing::info!("pre-fetching epic {}", group);
        let issues = retry_with_backoff(&self.delay, &format!("pre-fetch epic {group}"), || {
            self.remote.search(IssueQuery::InGroup(group.to_string()))
        })
        .await?;

        let mut prefetch = EpicPrefetch {
            group: group.to_string(),
            stories: Vec::new(),
            errors: Vec::new(),
        };
        for issue in issues {
            let Some(id) = mapping::story_key(&issue) else {
                prefetch.errors.push(SyncFailure {
                    item: format!("#{}", issue.number),
                    error: "no story key".to_string(),
                });
                continue;
            };
            match self.sync_story(&id, Some(issue)).await {
                Ok(_) => prefetch.stories.push(id),
                Err(e) => prefetch.errors.push(SyncFailure {
                    item: id,
                    error: e.to_string(),
                }),
            }
        }

        tracing::info!(
            "epic {} pre-fetched: {} stories cached",
            group,
            prefetch.stories.len()
        );
        Ok(prefetch)
    }

    /// Looks up the issue for a story key.
    pub(crate) async fn find_story(&self, id: &str) -> Result<RemoteIssue> {
        let issues = retry_with_backoff(&self.delay, &format!("fetch story {id}"), || {
            self.remote.search(IssueQuery::ByKey(id.to_string()))
        })
        .await?;
        issues
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::NotFound(format!("story:{id}")))
    }
}
