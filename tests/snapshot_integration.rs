//! End-to-end scenarios for the Snapshot Manager (S1-S7) plus the
//! MakeSnapshot→ConvertRowsetIds round-trip property.

use std::sync::atomic::{AtomicU64, Ordering};

use olap_snapshot_engine::common::{AggregateType, ColumnType, KeysType, Version};
use olap_snapshot_engine::field_type::Value;
use olap_snapshot_engine::meta::{ColumnSchema, RowsetMeta, RowsetType, TabletSchema};
use olap_snapshot_engine::segment::SegmentReader;
use olap_snapshot_engine::segment::SegmentWriter;
use olap_snapshot_engine::snapshot::{RowsetIdGenerator, SnapshotFormat, SnapshotManager, SnapshotManagerConfig, SnapshotRequest};
use olap_snapshot_engine::storage::StorageEngine;

const TABLET_ID: u64 = 10;

fn schema() -> TabletSchema {
    TabletSchema::new(KeysType::Duplicate, vec![
        ColumnSchema::key(0, "id", ColumnType::Int64),
        ColumnSchema::value(1, "v", ColumnType::Int64, AggregateType::None),
    ])
}

/// Builds an engine rooted at a fresh temp dir, with one tablet and its data
/// directory created on disk (this crate has no live ingestion path, so
/// tests write rowset files directly, the way a compaction/load job would).
fn engine_with_tablet() -> (tempfile::TempDir, StorageEngine, u32) {
    let root = tempfile::tempdir().unwrap();
    let engine = StorageEngine::new_single_dir(root.path().to_str().unwrap());
    let schema_hash = schema().schema_hash;
    let tablet = engine.create_tablet(TABLET_ID, 1, schema()).unwrap();
    std::fs::create_dir_all(tablet.data_dir()).unwrap();
    (root, engine, schema_hash)
}

fn write_rowset(engine: &StorageEngine, rowset_id: u64, version: Version, value: i64) -> RowsetMeta {
    let tablet = engine.get_tablet(TABLET_ID, schema().schema_hash).unwrap();
    let mut writer = SegmentWriter::new(schema().to_column_metas());
    writer.append_row(vec![Value::Int64(value), Value::Int64(value * 10)]).unwrap();
    let mut buf = Vec::new();
    writer.finalize(&mut buf).unwrap();
    std::fs::write(tablet.data_dir().join(format!("{rowset_id}_0.seg")), &buf).unwrap();
    RowsetMeta::new(rowset_id, TABLET_ID, 1, schema().schema_hash, version, 1, buf.len() as u64, RowsetType::Modern)
}

struct SeqIdGen(AtomicU64);
impl RowsetIdGenerator for SeqIdGen {
    fn next_rowset_id(&self) -> u64 { self.0.fetch_add(1, Ordering::SeqCst) }
}

// S1 — full snapshot, latest version.
#[test]
fn s1_full_snapshot_latest_version() {
    let (_root, engine, schema_hash) = engine_with_tablet();
    for (id, start, end, v) in [(1u64, 0i64, 0i64, 1i64), (2, 1, 3, 2), (3, 4, 4, 3)] {
        let rs = write_rowset(&engine, id, Version::new(start, end), v);
        engine.publish_rowset(TABLET_ID, schema_hash, rs).unwrap();
    }

    let manager = SnapshotManager::new(SnapshotManagerConfig::default());
    let mut request = SnapshotRequest::new(TABLET_ID, schema_hash).with_format(SnapshotFormat::V2);
    let path = manager.make_snapshot(&engine, &mut request).unwrap();

    let schema_dir = path.join(TABLET_ID.to_string()).join(schema_hash.to_string());
    assert!(schema_dir.join(format!("{TABLET_ID}.hdr")).exists());
    for id in [1, 2, 3] {
        assert!(schema_dir.join(format!("{id}_0.seg")).exists());
    }
    assert!(!request.allow_incremental_clone);

    let header = olap_snapshot_engine::meta::TabletMeta::load_from_file(
        &schema_dir.join(format!("{TABLET_ID}.hdr")),
        schema_dir.clone(),
    ).unwrap();
    assert_eq!(header.visible_rowsets.len(), 3);
    assert!(header.incremental_rowsets.is_empty());
}

// S2 — full snapshot, explicit older version.
#[test]
fn s2_full_snapshot_explicit_version() {
    let (_root, engine, schema_hash) = engine_with_tablet();
    for (id, start, end, v) in [(1u64, 0i64, 0i64, 1i64), (2, 1, 3, 2), (3, 4, 4, 3)] {
        let rs = write_rowset(&engine, id, Version::new(start, end), v);
        engine.publish_rowset(TABLET_ID, schema_hash, rs).unwrap();
    }

    let manager = SnapshotManager::new(SnapshotManagerConfig::default());
    let mut request = SnapshotRequest::new(TABLET_ID, schema_hash).with_version(3);
    let path = manager.make_snapshot(&engine, &mut request).unwrap();

    let schema_dir = path.join(TABLET_ID.to_string()).join(schema_hash.to_string());
    let header = olap_snapshot_engine::meta::TabletMeta::load_from_file(
        &schema_dir.join(format!("{TABLET_ID}.hdr")),
        schema_dir.clone(),
    ).unwrap();
    assert_eq!(header.visible_rowsets.len(), 2);
}

// S3 — full snapshot, version greater than live.
#[test]
fn s3_version_greater_than_live_is_bad_input() {
    let (root, engine, schema_hash) = engine_with_tablet();
    let rs = write_rowset(&engine, 1, Version::new(0, 0), 1);
    engine.publish_rowset(TABLET_ID, schema_hash, rs).unwrap();

    let manager = SnapshotManager::new(SnapshotManagerConfig::default());
    let mut request = SnapshotRequest::new(TABLET_ID, schema_hash).with_version(99);
    let err = manager.make_snapshot(&engine, &mut request).unwrap_err();
    assert!(matches!(err, olap_snapshot_engine::snapshot::SnapshotError::BadInput(_)));

    let snapshot_root = root.path().join("snapshot");
    let has_entries = snapshot_root.read_dir().map(|mut d| d.next().is_some()).unwrap_or(false);
    assert!(!has_entries);
}

// S4 — incremental snapshot, all present.
#[test]
fn s4_incremental_snapshot_all_present() {
    let (_root, engine, schema_hash) = engine_with_tablet();
    for v in [5i64, 6, 7] {
        let rs = write_rowset(&engine, 100 + v as u64, Version::point(v), v);
        engine.publish_incremental_rowset(TABLET_ID, schema_hash, rs).unwrap();
    }

    let manager = SnapshotManager::new(SnapshotManagerConfig::default());
    let mut request = SnapshotRequest::new(TABLET_ID, schema_hash).with_missing_versions(vec![5, 7]);
    let path = manager.make_snapshot(&engine, &mut request).unwrap();
    assert!(request.allow_incremental_clone);

    let schema_dir = path.join(TABLET_ID.to_string()).join(schema_hash.to_string());
    let header = olap_snapshot_engine::meta::TabletMeta::load_from_file(
        &schema_dir.join(format!("{TABLET_ID}.hdr")),
        schema_dir.clone(),
    ).unwrap();
    assert_eq!(header.incremental_rowsets.len(), 2);
    assert!(header.visible_rowsets.is_empty());
}

// S5 — incremental snapshot, one missing.
#[test]
fn s5_incremental_snapshot_one_missing() {
    let (root, engine, schema_hash) = engine_with_tablet();
    let rs = write_rowset(&engine, 105, Version::point(5), 5);
    engine.publish_incremental_rowset(TABLET_ID, schema_hash, rs).unwrap();

    let manager = SnapshotManager::new(SnapshotManagerConfig::default());
    let mut request = SnapshotRequest::new(TABLET_ID, schema_hash).with_missing_versions(vec![5, 8]);
    let err = manager.make_snapshot(&engine, &mut request).unwrap_err();
    assert!(matches!(err, olap_snapshot_engine::snapshot::SnapshotError::VersionNotFound(8)));

    let snapshot_root = root.path().join("snapshot");
    let has_entries = snapshot_root.read_dir().map(|mut d| d.next().is_some()).unwrap_or(false);
    assert!(!has_entries);
}

// S6 — id rebind preserves cross-list sharing.
#[test]
fn s6_id_rebind_preserves_cross_list_sharing() {
    let (_root, engine, schema_hash) = engine_with_tablet();
    let rs = write_rowset(&engine, 1, Version::new(0, 3), 1);
    engine.publish_rowset(TABLET_ID, schema_hash, rs.clone()).unwrap();
    engine.publish_incremental_rowset(TABLET_ID, schema_hash, rs).unwrap();

    let manager = SnapshotManager::new(SnapshotManagerConfig::default());
    let mut request = SnapshotRequest::new(TABLET_ID, schema_hash).with_version(3);
    let path = manager.make_snapshot(&engine, &mut request).unwrap();
    let schema_dir = path.join(TABLET_ID.to_string()).join(schema_hash.to_string());

    // the materialised snapshot's visible list carries the version-3 rowset;
    // manually also register it as incremental in the on-disk header to
    // exercise the cross-list sharing rule the rebinder must uphold.
    let mut header = olap_snapshot_engine::meta::TabletMeta::load_from_file(
        &schema_dir.join(format!("{TABLET_ID}.hdr")),
        schema_dir.clone(),
    ).unwrap();
    let shared = header.visible_rowsets.values().next().unwrap().clone();
    header.incremental_rowsets.insert(shared.rowset_id, shared);
    header.save(&schema_dir.join(format!("{TABLET_ID}.hdr"))).unwrap();

    // restore contract: the receiving side places the incoming header under
    // its own (target) tablet-id before rebinding ids.
    let new_tablet_id = 77u64;
    std::fs::rename(
        schema_dir.join(format!("{TABLET_ID}.hdr")),
        schema_dir.join(format!("{new_tablet_id}.hdr")),
    ).unwrap();

    let id_gen = SeqIdGen(AtomicU64::new(9000));
    manager.convert_rowset_ids(&schema_dir, new_tablet_id, 99, &id_gen).unwrap();

    let rebound = olap_snapshot_engine::meta::TabletMeta::load_from_file(
        &schema_dir.join(format!("{new_tablet_id}.hdr")),
        schema_dir.clone(),
    ).unwrap();
    assert_eq!(rebound.tablet_id, 77);
    assert_eq!(rebound.visible_rowsets.len(), 1);
    assert_eq!(rebound.incremental_rowsets.len(), 1);
    let v_id = *rebound.visible_rowsets.keys().next().unwrap();
    let i_id = *rebound.incremental_rowsets.keys().next().unwrap();
    assert_eq!(v_id, i_id);
    assert!(v_id >= 9000);
}

// S7 — release refuses foreign path.
#[test]
fn s7_release_refuses_foreign_path() {
    let (_root, engine, _schema_hash) = engine_with_tablet();
    let foreign = tempfile::tempdir().unwrap();
    let evil_path = foreign.path().join("evil");

    let manager = SnapshotManager::new(SnapshotManagerConfig::default());
    let err = manager.release_snapshot(&engine, &evil_path).unwrap_err();
    assert!(matches!(err, olap_snapshot_engine::snapshot::SnapshotError::IllegalPath(_)));
    assert!(!evil_path.exists());
}

// Property 6 — idempotence: releasing the same path twice succeeds once,
// then fails as DirNotExist, never corrupting state.
#[test]
fn property6_release_snapshot_is_idempotent() {
    let (_root, engine, schema_hash) = engine_with_tablet();
    let rs = write_rowset(&engine, 1, Version::new(0, 0), 1);
    engine.publish_rowset(TABLET_ID, schema_hash, rs).unwrap();

    let manager = SnapshotManager::new(SnapshotManagerConfig::default());
    let mut request = SnapshotRequest::new(TABLET_ID, schema_hash).with_format(SnapshotFormat::V2);
    let path = manager.make_snapshot(&engine, &mut request).unwrap();

    manager.release_snapshot(&engine, &path).unwrap();
    assert!(!path.exists());

    let err = manager.release_snapshot(&engine, &path).unwrap_err();
    assert!(matches!(err, olap_snapshot_engine::snapshot::SnapshotError::DirNotExist(_)));
}

// Property 5 — round trip: MakeSnapshot(V2) then ConvertRowsetIds preserves row count.
#[test]
fn roundtrip_make_snapshot_then_convert_rowset_ids_preserves_row_count() {
    let (_root, engine, schema_hash) = engine_with_tablet();
    let rs = write_rowset(&engine, 1, Version::point(0), 42);
    engine.publish_rowset(TABLET_ID, schema_hash, rs).unwrap();

    let manager = SnapshotManager::new(SnapshotManagerConfig::default());
    let mut request = SnapshotRequest::new(TABLET_ID, schema_hash).with_format(SnapshotFormat::V2);
    let path = manager.make_snapshot(&engine, &mut request).unwrap();
    let schema_dir = path.join(TABLET_ID.to_string()).join(schema_hash.to_string());

    let new_tablet_id = 55u64;
    std::fs::rename(
        schema_dir.join(format!("{TABLET_ID}.hdr")),
        schema_dir.join(format!("{new_tablet_id}.hdr")),
    ).unwrap();

    let id_gen = SeqIdGen(AtomicU64::new(5000));
    manager.convert_rowset_ids(&schema_dir, new_tablet_id, 1, &id_gen).unwrap();

    let header = olap_snapshot_engine::meta::TabletMeta::load_from_file(
        &schema_dir.join(format!("{new_tablet_id}.hdr")),
        schema_dir.clone(),
    ).unwrap();
    assert_eq!(header.visible_rowsets.len(), 1);
    let rebound_rowset = header.visible_rowsets.values().next().unwrap();

    let column_metas = schema().to_column_metas();
    let mut total_rows = 0u32;
    for name in rebound_rowset.data_file_names() {
        let bytes = std::fs::read(schema_dir.join(&name)).unwrap();
        let reader = SegmentReader::open(bytes, column_metas.clone()).unwrap();
        total_rows += reader.num_rows();
    }
    assert_eq!(total_rows, 1);
}
