// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Content digests for change detection.

use sha2::{Digest, Sha256};

/// SHA-256 of `content` as lowercase hex.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
