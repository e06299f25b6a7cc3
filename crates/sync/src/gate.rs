// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Admits at most one sync pass at a time.
///
/// Clones share state, so one gate handed to several engines serializes
/// passes across all of them.
#[derive(Debug, Clone, Default)]
pub struct SyncGate {
    in_flight: Arc<AtomicBool>,
}

impl SyncGate {
    pub fn new() -> Self {
        SyncGate::default()
    }

    /// Claims the gate, or returns `None` if a pass already holds it.
    pub fn try_enter(&self) -> Option<GateGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard {
                in_flight: Arc::clone(&self.in_flight),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Holds the gate until dropped.
#[derive(Debug)]
pub struct GateGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}
