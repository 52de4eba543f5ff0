//! File-backed cache tests: state written through the cache survives a
//! reopen, and a damaged image is reported when the store is opened.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::{collections::BTreeSet, ops::ControlFlow};

use synccache_state::{
    EngineError, LruGarbageCollector, StorageEngine, TargetCache, TargetMapping, TargetRead,
};
use synccache_test_utils::TestDir;
use synccache_types::{
    DocumentKey, ListenSequenceNumber, Query, SnapshotVersion, TargetData, TargetId,
    config::{CacheConfig, GcConfig},
};

fn config(dir: &TestDir) -> CacheConfig {
    CacheConfig::builder().path(dir.join("state/targets.db")).build().expect("valid config")
}

fn doc(path: &str) -> DocumentKey {
    DocumentKey::from_path(path).expect("valid path")
}

fn rooms_target() -> TargetData {
    TargetData::builder()
        .target(Query::collection("rooms"))
        .target_id(TargetId::new(2))
        .sequence_number(ListenSequenceNumber::new(3))
        .resume_token(vec![0xAB])
        .build()
}

#[test]
fn metadata_and_references_survive_reopen() {
    let dir = TestDir::new();
    let config = config(&dir);
    let documents = BTreeSet::from([doc("rooms/a"), doc("rooms/b")]);

    {
        let engine = StorageEngine::open(&config).expect("open engine");
        let cache = TargetCache::open(engine.db()).expect("open cache");
        let mut writer = cache.write().expect("write");
        writer.add_target(&rooms_target()).expect("add");
        writer
            .apply_mapping(
                TargetId::new(2),
                &TargetMapping::Reset { documents: documents.clone() },
                ListenSequenceNumber::new(4),
            )
            .expect("reset");
        writer.set_last_remote_snapshot_version(SnapshotVersion::new(10, 1)).expect("version");
        writer.commit().expect("commit");
    }

    let engine = StorageEngine::open(&config).expect("reopen engine");
    let cache = TargetCache::open(engine.db()).expect("reopen cache");
    assert_eq!(cache.highest_target_id(), TargetId::new(2));
    assert_eq!(cache.highest_listen_sequence_number(), ListenSequenceNumber::new(4));
    assert_eq!(cache.last_remote_snapshot_version(), SnapshotVersion::new(10, 1));
    assert_eq!(cache.target_count(), 1);

    let reader = cache.read().expect("read");
    let found = reader.find_target(&Query::collection("rooms")).expect("find");
    assert_eq!(found, Some(rooms_target()));
    assert_eq!(reader.matching_keys_for_target(TargetId::new(2)).expect("keys"), documents);
}

#[test]
fn uncommitted_writes_are_not_persisted() {
    let dir = TestDir::new();
    let config = config(&dir);

    {
        let engine = StorageEngine::open(&config).expect("open engine");
        let cache = TargetCache::open(engine.db()).expect("open cache");
        let mut writer = cache.write().expect("write");
        writer.add_target(&rooms_target()).expect("add");
        writer.abort();
    }

    let engine = StorageEngine::open(&config).expect("reopen engine");
    let cache = TargetCache::open(engine.db()).expect("reopen cache");
    assert_eq!(cache.target_count(), 0);
    assert_eq!(cache.read().expect("read").get_target(TargetId::new(2)).expect("get"), None);
}

#[test]
fn collection_pass_is_durable() {
    let dir = TestDir::new();
    let gc = GcConfig::builder().percentile_to_collect(100).build().expect("gc config");
    let config = CacheConfig::builder()
        .path(dir.join("state/targets.db"))
        .gc(gc)
        .build()
        .expect("valid config");
    let a = doc("rooms/a");

    {
        let engine = StorageEngine::open(&config).expect("open engine");
        let cache = TargetCache::open(engine.db()).expect("open cache");
        let mut writer = cache.write().expect("write");
        writer.add_target(&rooms_target()).expect("add");
        writer
            .add_matching_keys([&a], TargetId::new(2), ListenSequenceNumber::new(3))
            .expect("link");
        writer.commit().expect("commit");

        let mut writer = cache.write().expect("write");
        writer.remove_target(&rooms_target()).expect("remove");
        writer.commit().expect("commit");

        let collector = LruGarbageCollector::from_cache_config(&config);
        let results = collector.collect(&cache, &BTreeSet::new()).expect("gc");
        assert!(results.did_run);
        assert_eq!(results.documents_removed, 1);
    }

    let engine = StorageEngine::open(&config).expect("reopen engine");
    let cache = TargetCache::open(engine.db()).expect("reopen cache");
    let reader = cache.read().expect("read");
    assert_eq!(reader.sentinel_sequence_number(&a).expect("sentinel"), None);

    let mut orphans = 0;
    reader
        .enumerate_orphaned_documents(|_, _| {
            orphans += 1;
            ControlFlow::Continue(())
        })
        .expect("scan");
    assert_eq!(orphans, 0);
}

#[test]
fn damaged_image_fails_to_open() {
    let dir = TestDir::new();
    let config = config(&dir);

    {
        let engine = StorageEngine::open(&config).expect("open engine");
        let cache = TargetCache::open(engine.db()).expect("open cache");
        let mut writer = cache.write().expect("write");
        writer.add_target(&rooms_target()).expect("add");
        writer.commit().expect("commit");
    }

    let path = config.path.clone().expect("path");
    let mut bytes = std::fs::read(&path).expect("read image");
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, bytes).expect("write image");

    let err = StorageEngine::open(&config).err().expect("damaged image");
    assert!(matches!(err, EngineError::Open { .. }), "got: {err}");
}
