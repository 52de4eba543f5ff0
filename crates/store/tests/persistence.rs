//! Durability tests for the file backend.
//!
//! Each test opens a file-backed database, commits data, drops the handle and
//! reopens from the same path, or damages the image on disk and checks that
//! the damage is detected instead of silently loading partial state.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use synccache_store::{
    Database, DatabaseConfig, Error, FileBackend, HEADER_SIZE, ReadView, tables,
};
use synccache_test_utils::TestDir;

fn write_entries(db: &Database<FileBackend>, entries: &[(&[u8], &[u8])]) {
    let mut txn = db.write().expect("begin write");
    for (key, value) in entries {
        txn.insert::<tables::DocumentTargets>(&key.to_vec(), &value.to_vec()).expect("insert");
    }
    txn.commit().expect("commit");
}

#[test]
fn committed_state_survives_reopen() {
    let dir = TestDir::new();
    let path = dir.join("cache.db");

    {
        let db = Database::open(&path).expect("open");
        write_entries(&db, &[(b"a", b"1"), (b"b", b"2")]);

        let mut txn = db.write().expect("begin write");
        txn.insert::<tables::TargetGlobal>(&"meta".to_string(), &vec![7]).expect("insert");
        txn.delete::<tables::DocumentTargets>(&b"a".to_vec()).expect("delete");
        txn.commit().expect("commit");
    }

    let db = Database::open(&path).expect("reopen");
    let txn = db.read().expect("read");
    assert_eq!(txn.get::<tables::DocumentTargets>(&b"a".to_vec()).expect("get"), None);
    assert_eq!(
        txn.get::<tables::DocumentTargets>(&b"b".to_vec()).expect("get"),
        Some(b"2".to_vec())
    );
    assert_eq!(txn.get::<tables::TargetGlobal>(&"meta".to_string()).expect("get"), Some(vec![7]));
    assert_eq!(db.stats().snapshot_id, 2);
}

#[test]
fn uncommitted_writes_are_not_persisted() {
    let dir = TestDir::new();
    let path = dir.join("cache.db");

    {
        let db = Database::open(&path).expect("open");
        write_entries(&db, &[(b"kept", b"")]);

        let mut txn = db.write().expect("begin write");
        txn.insert::<tables::DocumentTargets>(&b"lost".to_vec(), &vec![]).expect("insert");
        drop(txn);
    }

    let db = Database::open(&path).expect("reopen");
    let txn = db.read().expect("read");
    assert!(txn.contains::<tables::DocumentTargets>(&b"kept".to_vec()).expect("contains"));
    assert!(!txn.contains::<tables::DocumentTargets>(&b"lost".to_vec()).expect("contains"));
}

#[test]
fn unsynced_commits_are_still_readable_after_reopen() {
    let dir = TestDir::new();
    let path = dir.join("cache.db");
    let config = DatabaseConfig::builder().sync_on_commit(false).build();

    {
        let db = Database::open_with_config(&path, config).expect("open");
        write_entries(&db, &[(b"k", b"v")]);
    }

    let db = Database::open(&path).expect("reopen");
    assert_eq!(db.read().expect("read").entry_count::<tables::DocumentTargets>(), 1);
}

#[test]
fn corrupted_body_is_detected_on_open() {
    let dir = TestDir::new();
    let path = dir.join("cache.db");

    {
        let db = Database::open(&path).expect("open");
        write_entries(&db, &[(b"doc", b"payload")]);
    }

    let mut bytes = std::fs::read(&path).expect("read image");
    assert!(bytes.len() > HEADER_SIZE);
    let last = bytes.len() - 1;
    bytes[last] ^= 0x5A;
    std::fs::write(&path, &bytes).expect("write image");

    match Database::open(&path) {
        Err(Error::ChecksumMismatch { .. }) => {},
        Err(other) => panic!("expected checksum mismatch, got {other}"),
        Ok(_) => panic!("expected checksum mismatch, database opened"),
    }
}

#[test]
fn foreign_file_is_rejected() {
    let dir = TestDir::new();
    let path = dir.join("cache.db");
    std::fs::write(&path, vec![0u8; HEADER_SIZE + 16]).expect("write garbage");

    assert!(matches!(Database::open(&path), Err(Error::InvalidMagic)));
}

#[test]
fn truncated_file_is_rejected() {
    let dir = TestDir::new();
    let path = dir.join("cache.db");
    std::fs::write(&path, b"SYNC").expect("write stub");

    assert!(matches!(Database::open(&path), Err(Error::Corrupted { .. })));
}
