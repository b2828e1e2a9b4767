// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ralphy_core::FakeClock;
use tempfile::TempDir;

fn setup(dir: &TempDir) {
    std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
}

#[test]
fn fingerprint_covers_manifests_and_dirs() {
    let dir = TempDir::new().unwrap();
    setup(&dir);

    let fp = RepoFingerprinter::new(FakeClock::new()).fingerprint(dir.path()).unwrap();
    assert!(fp.file_states.contains_key("Cargo.toml"));
    assert!(!fp.file_states.contains_key("package.json"));
    assert_eq!(fp.dir_hash.len(), 64);
}

#[test]
fn unchanged_repo_matches() {
    let dir = TempDir::new().unwrap();
    setup(&dir);
    let clock = FakeClock::new();
    let fp = RepoFingerprinter::new(clock.clone());

    let first = fp.fingerprint(dir.path()).unwrap();
    clock.advance(std::time::Duration::from_secs(120));
    let second = fp.fingerprint(dir.path()).unwrap();
    assert!(first.matches(&second));
}

#[test]
fn manifest_edit_changes_fingerprint() {
    let dir = TempDir::new().unwrap();
    setup(&dir);
    let clock = FakeClock::new();
    let fp = RepoFingerprinter::new(clock.clone());

    let first = fp.fingerprint(dir.path()).unwrap();
    std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"y\"\n").unwrap();
    clock.advance(std::time::Duration::from_secs(61));

    let second = fp.fingerprint(dir.path()).unwrap();
    assert!(!first.matches(&second));
}

#[test]
fn new_top_level_dir_changes_fingerprint() {
    let dir = TempDir::new().unwrap();
    setup(&dir);
    let clock = FakeClock::new();
    let fp = RepoFingerprinter::new(clock.clone());

    let first = fp.fingerprint(dir.path()).unwrap();
    std::fs::create_dir(dir.path().join("tests")).unwrap();
    clock.advance(std::time::Duration::from_secs(61));

    let second = fp.fingerprint(dir.path()).unwrap();
    assert!(!first.matches(&second));
    assert_eq!(first.file_states, second.file_states);
}

#[test]
fn memo_serves_stale_view_within_ttl() {
    let dir = TempDir::new().unwrap();
    setup(&dir);
    let clock = FakeClock::new();
    let fp = RepoFingerprinter::new(clock.clone());

    let first = fp.fingerprint(dir.path()).unwrap();
    std::fs::create_dir(dir.path().join("tests")).unwrap();
    clock.advance(std::time::Duration::from_secs(30));

    // Within the 60 s window the cached fingerprint is returned as-is
    let second = fp.fingerprint(dir.path()).unwrap();
    assert!(first.matches(&second));

    fp.invalidate(dir.path());
    let third = fp.fingerprint(dir.path()).unwrap();
    assert!(!first.matches(&third));
}
