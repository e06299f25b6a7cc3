// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync engine tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rv_core::{CacheConfig, CacheManager, ManualClock, SyncSettings};
use tempfile::TempDir;

use crate::engine::SyncEngine;
use crate::mapping;
use crate::remote::{
    IssueQuery, IssueState, IssueUpdate, NewIssue, RemoteClient, RemoteError, RemoteFuture,
    RemoteIssue,
};
use crate::retry::Delay;

/// A call observed by [`MockRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search(IssueQuery),
    Read(u64),
    Create(String),
    Update(u64, IssueUpdate),
    Comment(u64, String),
}

#[derive(Default)]
struct MockState {
    issues: BTreeMap<u64, RemoteIssue>,
    failures: VecDeque<RemoteError>,
    calls: Vec<Call>,
    ignore_assignees: bool,
}

/// In-memory tracker for testing without a network.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<MockState>>,
}

impl MockRemote {
    pub fn new() -> Self {
        MockRemote::default()
    }

    pub fn insert(&self, issue: RemoteIssue) {
        self.state.lock().unwrap().issues.insert(issue.number, issue);
    }

    pub fn issue(&self, number: u64) -> RemoteIssue {
        self.state.lock().unwrap().issues[&number].clone()
    }

    /// Fail the next `times` calls with `error`.
    pub fn fail_next(&self, times: usize, error: RemoteError) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..times {
            state.failures.push_back(error.clone());
        }
    }

    /// Accept assignee updates without applying them.
    pub fn ignore_assignees(&self) {
        self.state.lock().unwrap().ignore_assignees = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn searches(&self) -> Vec<IssueQuery> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Search(query) => Some(query),
                _ => None,
            })
            .collect()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Comment(number, body) => Some((number, body)),
                _ => None,
            })
            .collect()
    }

    fn respond<T: Send + 'static>(
        &self,
        call: Call,
        f: impl FnOnce(&mut MockState) -> Result<T, RemoteError>,
    ) -> RemoteFuture<'_, T> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            match state.failures.pop_front() {
                Some(err) => Err(err),
                None => f(&mut *state),
            }
        };
        Box::pin(async move { result })
    }
}

fn matches_query(issue: &RemoteIssue, query: &IssueQuery) -> bool {
    match query {
        IssueQuery::ChangedSince { since: None } => true,
        IssueQuery::ChangedSince { since: Some(since) } => issue.updated_at >= *since,
        IssueQuery::ByKey(id) => mapping::story_key(issue).as_deref() == Some(id.as_str()),
        IssueQuery::InGroup(group)
        | IssueQuery::Available {
            group: Some(group), ..
        } => issue.has_label(&format!("epic:{group}")),
        IssueQuery::Available { group: None, .. } => true,
    }
}

impl RemoteClient for MockRemote {
    fn search(&self, query: IssueQuery) -> RemoteFuture<'_, Vec<RemoteIssue>> {
        self.respond(Call::Search(query.clone()), move |state| {
            Ok(state
                .issues
                .values()
                .filter(|issue| matches_query(issue, &query))
                .cloned()
                .collect())
        })
    }

    fn read(&self, number: u64) -> RemoteFuture<'_, RemoteIssue> {
        self.respond(Call::Read(number), move |state| {
            state
                .issues
                .get(&number)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(format!("#{number}")))
        })
    }

    fn create(&self, issue: NewIssue) -> RemoteFuture<'_, RemoteIssue> {
        self.respond(Call::Create(issue.title.clone()), move |state| {
            let number = state.issues.keys().next_back().map_or(1, |n| n + 1);
            let created = RemoteIssue {
                number,
                title: issue.title,
                body: issue.body,
                state: IssueState::Open,
                labels: issue.labels,
                assignees: Vec::new(),
                updated_at: t0(),
                html_url: None,
            };
            state.issues.insert(number, created.clone());
            Ok(created)
        })
    }

    fn update(&self, number: u64, update: IssueUpdate) -> RemoteFuture<'_, RemoteIssue> {
        self.respond(Call::Update(number, update.clone()), move |state| {
            let ignore_assignees = state.ignore_assignees;
            let issue = state
                .issues
                .get_mut(&number)
                .ok_or_else(|| RemoteError::NotFound(format!("#{number}")))?;
            if let Some(title) = update.title {
                issue.title = title;
            }
            if let Some(body) = update.body {
                issue.body = Some(body);
            }
            if let Some(issue_state) = update.state {
                issue.state = issue_state;
            }
            if let Some(labels) = update.labels {
                issue.labels = labels;
            }
            if let Some(assignees) = update.assignees {
                if !ignore_assignees {
                    issue.assignees = assignees;
                }
            }
            Ok(issue.clone())
        })
    }

    fn comment(&self, number: u64, body: String) -> RemoteFuture<'_, ()> {
        self.respond(Call::Comment(number, body), move |state| {
            if state.issues.contains_key(&number) {
                Ok(())
            } else {
                Err(RemoteError::NotFound(format!("#{number}")))
            }
        })
    }
}

/// Delay that records requested sleeps and returns at once.
#[derive(Clone, Default)]
pub struct RecordingDelay {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingDelay {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Delay for RecordingDelay {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.slept.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

pub type TestEngine = SyncEngine<MockRemote, Arc<ManualClock>, RecordingDelay>;

/// Engine wired to a mock tracker, a manual clock and a recording delay.
pub struct Harness {
    pub dir: TempDir,
    pub remote: MockRemote,
    pub clock: Arc<ManualClock>,
    pub delay: RecordingDelay,
    pub engine: TestEngine,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let cache = CacheManager::with_clock(
            CacheConfig::new(dir.path().join("cache")),
            None,
            Arc::clone(&clock),
        )
        .unwrap();
        let remote = MockRemote::new();
        let delay = RecordingDelay::default();
        let engine = SyncEngine::with_delay(
            cache,
            remote.clone(),
            SyncSettings::default(),
            delay.clone(),
        );
        Harness {
            dir,
            remote,
            clock,
            delay,
            engine,
        }
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

/// An open story issue labelled `story:<key>` and `type:story`.
pub fn story_issue(number: u64, key: &str) -> RemoteIssue {
    RemoteIssue {
        number,
        title: format!("Story {key}: Implement {key}"),
        body: Some(format!("Acceptance criteria for {key}.")),
        state: IssueState::Open,
        labels: vec![
            "type:story".to_string(),
            format!("story:{key}"),
            "status:ready-for-dev".to_string(),
        ],
        assignees: Vec::new(),
        updated_at: t0(),
        html_url: Some(format!("https://tracker.example/issues/{number}")),
    }
}

/// An issue with neither a story label nor a keyed title.
pub fn keyless_issue(number: u64) -> RemoteIssue {
    RemoteIssue {
        title: "Refactor build scripts".to_string(),
        labels: vec!["type:story".to_string()],
        ..story_issue(number, "unused")
    }
}
