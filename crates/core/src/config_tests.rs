// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tempfile::tempdir;

#[test]
fn minimal_config_uses_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[cache]\ndir = \".review-cache\"\n").unwrap();

    let config = Config::load(&path).unwrap();

    assert_eq!(config.cache.dir, dir.path().join(".review-cache"));
    assert_eq!(config.cache.staleness_threshold_minutes, 5);
    assert_eq!(config.remote, None);
    assert_eq!(config.sync.lock_ttl_hours, 8);
    assert_eq!(config.sync.settle_delay(), Duration::from_secs(1));
    assert_eq!(config.sync.lock_ttl(), chrono::Duration::hours(8));
}

#[test]
fn full_config_parses() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(
        &path,
        r#"
[cache]
dir = "/var/cache/review"
staleness_threshold_minutes = 15

[remote]
owner = "acme"
repo = "roadmap"

[sync]
lock_ttl_hours = 4
settle_delay_ms = 250
"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();

    assert_eq!(config.cache.dir, PathBuf::from("/var/cache/review"));
    assert_eq!(config.cache.staleness_threshold_minutes, 15);
    assert_eq!(
        config.remote,
        Some(RemoteConfig {
            owner: "acme".into(),
            repo: "roadmap".into()
        })
    );
    assert_eq!(config.sync.lock_ttl_hours, 4);
    assert_eq!(config.sync.settle_delay_ms, 250);
}

#[test]
fn save_then_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    let mut config = Config::new(dir.path().join("cache"));
    config.cache.staleness_threshold_minutes = 30;

    config.save(&path).unwrap();
    let loaded = Config::load(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn save_replaces_existing_file_without_leftovers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "stale = true\n").unwrap();
    let config = Config::new(dir.path().join("cache"));

    config.save(&path).unwrap();

    let entries: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from(CONFIG_FILE_NAME)]);
    assert_eq!(Config::load(&path).unwrap(), config);
}

#[test]
fn save_into_missing_directory_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent").join(CONFIG_FILE_NAME);

    assert!(Config::new(dir.path()).save(&path).is_err());
    assert!(!path.exists());
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempdir().unwrap();
    let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn missing_cache_table_is_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "[sync]\nlock_ttl_hours = 2\n").unwrap();

    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("failed to parse config"));
}
