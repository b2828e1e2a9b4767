// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fingerprint::RepoFingerprinter;
use ralphy_core::FakeClock;
use tempfile::TempDir;

fn fingerprint(dir: &TempDir, clock: &FakeClock) -> RepoFingerprint {
    RepoFingerprinter::new(clock.clone()).fingerprint(dir.path()).unwrap()
}

#[yare::parameterized(
    plain = { "12", "Add login", "12:add_login" },
    symbols = { "a/b", "Fix #42!", "a_b:fix__42_" },
    dots = { "T-1", "v1.2 bump", "t-1:v1.2_bump" },
)]
fn key_sanitization(id: &str, title: &str, expected: &str) {
    assert_eq!(sanitize_key(id, title), expected);
}

#[test]
fn put_then_get_with_matching_fingerprint() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let fp = fingerprint(&dir, &clock);

    let mut cache = PlanningCache::load(dir.path(), clock.clone()).unwrap();
    cache.put("1", "T", vec!["src/a.rs".to_string()], fp.clone()).unwrap();

    assert_eq!(cache.get("1", "T", &fp).unwrap(), ["src/a.rs".to_string()]);
}

#[test]
fn fingerprint_drift_invalidates() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let fp = fingerprint(&dir, &clock);

    let mut cache = PlanningCache::load(dir.path(), clock.clone()).unwrap();
    cache.put("1", "T", vec!["src/a.rs".to_string()], fp).unwrap();

    // Repo layout changes: new top-level directory
    std::fs::create_dir(dir.path().join("brand-new")).unwrap();
    clock.advance(std::time::Duration::from_secs(61));
    let current = fingerprint(&dir, &clock);

    assert!(cache.get("1", "T", &current).is_none());
}

#[test]
fn cache_persists_gzipped() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let fp = fingerprint(&dir, &clock);

    {
        let mut cache = PlanningCache::load(dir.path(), clock.clone()).unwrap();
        cache.put("1", "T", vec!["a".to_string(), "b".to_string()], fp.clone()).unwrap();
    }
    assert!(dir.path().join(".ralphy/planning-cache.json.gz").exists());

    let cache = PlanningCache::load(dir.path(), clock).unwrap();
    assert_eq!(cache.get("1", "T", &fp).unwrap(), ["a".to_string(), "b".to_string()]);
}

#[test]
fn legacy_uncompressed_cache_is_read_then_replaced() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let fp = fingerprint(&dir, &clock);

    let entry = PlanningCacheEntry {
        files: vec!["x".to_string()],
        timestamp: 1,
        repo_fingerprint: fp.clone(),
    };
    let mut legacy: indexmap::IndexMap<String, PlanningCacheEntry> = indexmap::IndexMap::new();
    legacy.insert(sanitize_key("1", "T"), entry);
    let ralphy = dir.path().join(".ralphy");
    std::fs::create_dir_all(&ralphy).unwrap();
    std::fs::write(ralphy.join("planning-cache.json"), serde_json::to_vec(&legacy).unwrap())
        .unwrap();

    let mut cache = PlanningCache::load(dir.path(), clock).unwrap();
    assert_eq!(cache.get("1", "T", &fp).unwrap(), ["x".to_string()]);

    // Next save upgrades to gzip and removes the legacy file
    cache.put("2", "U", vec!["y".to_string()], fp).unwrap();
    assert!(!ralphy.join("planning-cache.json").exists());
    assert!(ralphy.join("planning-cache.json.gz").exists());
}
