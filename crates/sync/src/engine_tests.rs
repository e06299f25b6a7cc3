// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the sync engine module.

#![allow(clippy::unwrap_used)]

use chrono::Duration;
use rv_core::{DocKey, DocKind, LockStatus, ReadOptions};

use super::engine::{SkipReason, StorySync, SyncOptions, SyncOutcome, SyncReport};
use super::error::SyncError;
use super::gate::SyncGate;
use super::remote::{IssueQuery, RemoteError, RemoteIssue};
use super::test_helpers::{keyless_issue, story_issue, t0, Harness};

fn completed(outcome: SyncOutcome) -> SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Skipped { reason } => unreachable!("pass skipped: {reason:?}"),
    }
}

fn story(id: &str) -> DocKey {
    DocKey::story(id).unwrap()
}

#[tokio::test]
async fn incremental_sync_records_unresolvable_item_and_commits_watermark() {
    let h = Harness::new();
    h.remote.insert(story_issue(1, "1-1-login"));
    h.remote.insert(keyless_issue(2));
    h.remote.insert(story_issue(3, "1-2-logout"));

    let report = completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());

    assert_eq!(report.updated, vec!["1-1-login", "1-2-logout"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].item, "#2");
    assert_eq!(report.errors[0].error, "no story key");
    assert!(report.unchanged.is_empty());
    assert_eq!(h.engine.cache().last_sync().unwrap(), Some(t0()));

    let doc = h
        .engine
        .cache()
        .read(&story("1-1-login"), ReadOptions::default())
        .unwrap()
        .unwrap();
    assert!(!doc.is_stale);
    assert!(doc.content.starts_with("# Story 1-1-login: Implement 1-1-login"));
    let meta = doc.meta.unwrap();
    assert_eq!(meta.remote_id, Some(1));
    assert_eq!(meta.remote_updated_at, Some(t0()));
}

#[tokio::test]
async fn first_pass_queries_everything_then_uses_watermark() {
    let h = Harness::new();
    h.remote.insert(story_issue(1, "1-1-login"));

    completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());
    h.clock.advance(Duration::minutes(10));
    completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());

    assert_eq!(
        h.remote.searches(),
        vec![
            IssueQuery::ChangedSince { since: None },
            IssueQuery::ChangedSince { since: Some(t0()) },
        ]
    );
    assert_eq!(
        h.engine.cache().last_sync().unwrap(),
        Some(t0() + Duration::minutes(10))
    );
}

#[tokio::test]
async fn watermark_never_moves_backwards() {
    let h = Harness::new();
    completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());

    // Clock steps back an hour.
    h.clock.set(t0() - Duration::hours(1));
    completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());
    completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());

    assert_eq!(h.engine.cache().last_sync().unwrap(), Some(t0()));
    for query in h.remote.searches().into_iter().skip(1) {
        assert_eq!(query, IssueQuery::ChangedSince { since: Some(t0()) });
    }
}

#[tokio::test]
async fn forced_pass_ignores_watermark() {
    let h = Harness::new();
    h.engine.cache().update_last_sync(t0()).unwrap();

    completed(
        h.engine
            .incremental_sync(SyncOptions { force: true })
            .await
            .unwrap(),
    );

    assert_eq!(
        h.remote.searches(),
        vec![IssueQuery::ChangedSince { since: None }]
    );
    assert_eq!(h.engine.cache().last_sync().unwrap(), Some(t0()));
}

#[tokio::test]
async fn pass_is_skipped_while_gate_is_held() {
    let gate = SyncGate::new();
    let mut h = Harness::new();
    h.engine = h.engine.with_gate(gate.clone());
    let held = gate.try_enter().unwrap();

    let outcome = h.engine.incremental_sync(SyncOptions::default()).await.unwrap();
    let full = h.engine.full_sync().await.unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Skipped {
            reason: SkipReason::SyncInProgress
        }
    );
    assert!(full.report().is_none());
    assert!(h.remote.calls().is_empty());
    assert_eq!(h.engine.cache().last_sync().unwrap(), None);

    drop(held);
    assert!(h.engine.incremental_sync(SyncOptions::default()).await.unwrap().report().is_some());
    assert!(!gate.is_busy());
}

#[tokio::test]
async fn failed_search_releases_gate_and_keeps_watermark() {
    let h = Harness::new();
    h.engine.cache().update_last_sync(t0()).unwrap();
    h.remote.fail_next(4, RemoteError::Network("down".into()));
    h.clock.advance(Duration::minutes(5));

    let err = h
        .engine
        .incremental_sync(SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RetriesExhausted { .. }));
    assert_eq!(h.engine.cache().last_sync().unwrap(), Some(t0()));
    assert!(!h.engine.gate().is_busy());
    assert_eq!(h.delay.slept().len(), 3);
}

#[tokio::test]
async fn unchanged_story_is_not_rewritten() {
    let h = Harness::new();
    let issue = story_issue(1, "1-1-login");
    h.remote.insert(issue.clone());
    let key = story("1-1-login");

    let first = h.engine.sync_story("1-1-login", Some(issue.clone())).await.unwrap();
    let written_at = h.engine.cache().meta(&key).unwrap().unwrap().cache_timestamp;
    h.clock.advance(Duration::minutes(3));
    let second = h.engine.sync_story("1-1-login", Some(issue)).await.unwrap();

    assert_eq!(first, StorySync::Updated { remote_id: 1 });
    assert_eq!(second, StorySync::Unchanged);
    assert_eq!(
        h.engine.cache().meta(&key).unwrap().unwrap().cache_timestamp,
        written_at
    );
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn second_pass_reports_unchanged() {
    let h = Harness::new();
    h.remote.insert(story_issue(1, "1-1-login"));

    completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());
    let report = completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());

    assert!(report.updated.is_empty());
    assert_eq!(report.unchanged, vec!["1-1-login"]);
}

#[tokio::test]
async fn sync_story_fetches_when_not_given() {
    let h = Harness::new();
    h.remote.insert(story_issue(8, "2-1-search"));

    let result = h.engine.sync_story("2-1-search", None).await.unwrap();

    assert_eq!(result, StorySync::Updated { remote_id: 8 });
    assert_eq!(
        h.remote.searches(),
        vec![IssueQuery::ByKey("2-1-search".into())]
    );
}

#[tokio::test]
async fn sync_story_missing_remotely_is_not_found() {
    let h = Harness::new();

    let err = h.engine.sync_story("9-9-ghost", None).await.unwrap_err();

    assert!(err.is_not_found());
    assert!(h.delay.slept().is_empty());
}

#[tokio::test]
async fn sync_story_rejects_unsafe_keys() {
    let h = Harness::new();
    let issue = story_issue(4, "../escape");

    let err = h.engine.sync_story("../escape", Some(issue)).await.unwrap_err();

    assert!(matches!(err, SyncError::Cache(rv_core::Error::InvalidKey { .. })));
}

#[tokio::test]
async fn unsafe_label_key_is_a_per_item_error() {
    let h = Harness::new();
    h.remote.insert(story_issue(1, "1-1-login"));
    h.remote.insert(story_issue(2, "../escape"));

    let report = completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());

    assert_eq!(report.updated, vec!["1-1-login"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].item, "../escape");
}

#[tokio::test]
async fn assigned_issue_locks_cached_story() {
    let h = Harness::new();
    let issue = RemoteIssue {
        assignees: vec!["alice".into()],
        ..story_issue(1, "1-1-login")
    };

    h.engine.sync_story("1-1-login", Some(issue)).await.unwrap();

    assert_eq!(
        h.engine.cache().lock_status(&story("1-1-login")).unwrap(),
        Some(LockStatus::Held {
            holder: "alice".into(),
            expires_at: t0() + Duration::hours(8),
        })
    );
}

#[tokio::test]
async fn full_sync_invalidates_then_forces() {
    let h = Harness::new();
    h.remote.insert(story_issue(1, "1-1-login"));
    h.engine
        .cache()
        .write(&story("local-only"), "draft", Default::default())
        .unwrap();
    h.engine.cache().update_last_sync(t0()).unwrap();

    let report = completed(h.engine.full_sync().await.unwrap());

    assert_eq!(report.updated, vec!["1-1-login"]);
    assert_eq!(
        h.remote.searches(),
        vec![IssueQuery::ChangedSince { since: None }]
    );
    assert!(h.engine.cache().is_stale(&story("local-only")).unwrap());
    assert!(!h.engine.cache().is_stale(&story("1-1-login")).unwrap());
}

#[tokio::test]
async fn full_sync_leaves_unchanged_stories_fresh() {
    let h = Harness::new();
    h.remote.insert(story_issue(1, "1-1-login"));
    let key = story("1-1-login");
    completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());
    let hash = h.engine.cache().meta(&key).unwrap().unwrap().content_hash;
    h.clock.advance(Duration::minutes(30));

    let report = completed(h.engine.full_sync().await.unwrap());

    assert!(report.updated.is_empty());
    assert_eq!(report.unchanged, vec!["1-1-login"]);
    let doc = h
        .engine
        .cache()
        .read(&key, ReadOptions::default())
        .unwrap()
        .unwrap();
    assert!(!doc.is_stale);
    assert_eq!(doc.warning, None);
    let meta = doc.meta.unwrap();
    assert_eq!(meta.cache_timestamp, Some(t0() + Duration::minutes(30)));
    assert_eq!(meta.content_hash, hash);

    h.clock.advance(Duration::minutes(1));
    completed(h.engine.incremental_sync(SyncOptions::default()).await.unwrap());
    assert!(!h.engine.cache().is_stale(&key).unwrap());
}

#[tokio::test]
async fn stale_unchanged_story_is_refreshed() {
    let h = Harness::new();
    let issue = story_issue(1, "1-1-login");
    let key = story("1-1-login");
    h.engine.sync_story("1-1-login", Some(issue.clone())).await.unwrap();
    h.clock.advance(Duration::minutes(10));
    assert!(h.engine.cache().is_stale(&key).unwrap());

    let result = h.engine.sync_story("1-1-login", Some(issue)).await.unwrap();

    assert_eq!(result, StorySync::Unchanged);
    assert!(!h.engine.cache().is_stale(&key).unwrap());
}

#[tokio::test]
async fn pre_fetch_epic_uses_one_search() {
    let h = Harness::new();
    for (number, key) in [(1, "2-1-a"), (2, "2-2-b"), (3, "3-1-c")] {
        let mut issue = story_issue(number, key);
        issue.labels.push(format!("epic:{}", &key[..1]));
        h.remote.insert(issue);
    }
    let mut keyless = keyless_issue(4);
    keyless.labels.push("epic:2".into());
    h.remote.insert(keyless);

    let prefetch = h.engine.pre_fetch_epic("2").await.unwrap();

    assert_eq!(prefetch.group, "2");
    assert_eq!(prefetch.stories, vec!["2-1-a", "2-2-b"]);
    assert_eq!(prefetch.errors.len(), 1);
    assert_eq!(h.remote.calls().len(), 1);
    assert_eq!(h.engine.cache().list(DocKind::Story).unwrap(), vec!["2-1-a", "2-2-b"]);
}
