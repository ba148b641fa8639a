//! Walks through a full snapshot lifecycle against an in-process engine:
//! write a couple of rowsets, take a full snapshot, take an incremental
//! snapshot, then rebind the full snapshot's rowset ids as a clone target
//! would on restore.

use olap_snapshot_engine::common::{AggregateType, ColumnType, KeysType, Version};
use olap_snapshot_engine::field_type::Value;
use olap_snapshot_engine::meta::{ColumnSchema, RowsetMeta, RowsetType, TabletSchema};
use olap_snapshot_engine::segment::SegmentWriter;
use olap_snapshot_engine::snapshot::{SnapshotManager, SnapshotManagerConfig, SnapshotRequest};
use olap_snapshot_engine::storage::StorageEngine;

const TABLET_ID: u64 = 1;
const PARTITION_ID: u64 = 1;

fn schema() -> TabletSchema {
    TabletSchema::new(KeysType::Duplicate, vec![
        ColumnSchema::key(0, "id", ColumnType::Int64),
        ColumnSchema::value(1, "amount", ColumnType::Int64, AggregateType::Sum),
    ])
}

fn write_rowset(engine: &StorageEngine, rowset_id: u64, version: Version, rows: &[(i64, i64)]) -> RowsetMeta {
    let tablet = engine.get_tablet(TABLET_ID, schema().schema_hash).unwrap();
    let mut writer = SegmentWriter::new(schema().to_column_metas());
    for (id, amount) in rows {
        writer.append_row(vec![Value::Int64(*id), Value::Int64(*amount)]).unwrap();
    }
    let mut buf = Vec::new();
    writer.finalize(&mut buf).unwrap();
    std::fs::write(tablet.data_dir().join(format!("{rowset_id}_0.seg")), &buf).unwrap();
    RowsetMeta::new(rowset_id, TABLET_ID, PARTITION_ID, schema().schema_hash, version, rows.len() as u64, buf.len() as u64, RowsetType::Modern)
}

fn main() {
    tracing_subscriber::fmt::init();

    let root = tempfile::tempdir().expect("tempdir");
    let engine = StorageEngine::new_single_dir(root.path().to_str().unwrap());
    let schema_hash = schema().schema_hash;
    let tablet = engine.create_tablet(TABLET_ID, PARTITION_ID, schema()).unwrap();
    std::fs::create_dir_all(tablet.data_dir()).unwrap();

    let base = write_rowset(&engine, 1, Version::new(0, 0), &[(1, 10), (2, 20)]);
    engine.publish_rowset(TABLET_ID, schema_hash, base).unwrap();
    let delta = write_rowset(&engine, 2, Version::new(1, 1), &[(3, 30)]);
    engine.publish_rowset(TABLET_ID, schema_hash, delta.clone()).unwrap();
    engine.publish_incremental_rowset(TABLET_ID, schema_hash, delta).unwrap();

    let manager = SnapshotManager::new(SnapshotManagerConfig::default());

    // Full snapshot of the live version.
    let mut full_request = SnapshotRequest::new(TABLET_ID, schema_hash);
    let full_path = manager.make_snapshot(&engine, &mut full_request).unwrap();
    println!("full snapshot at {}", full_path.display());

    // Incremental snapshot covering just version 1.
    let mut incr_request = SnapshotRequest::new(TABLET_ID, schema_hash).with_missing_versions(vec![1]);
    let incr_path = manager.make_snapshot(&engine, &mut incr_request).unwrap();
    println!("incremental snapshot at {}, allow_incremental_clone={}", incr_path.display(), incr_request.allow_incremental_clone);

    // Simulate a restore: the receiving node places the incoming header under
    // its own new tablet-id before rebinding rowset ids.
    let schema_dir = full_path.join(TABLET_ID.to_string()).join(schema_hash.to_string());
    let new_tablet_id = 42u64;
    std::fs::rename(
        schema_dir.join(format!("{TABLET_ID}.hdr")),
        schema_dir.join(format!("{new_tablet_id}.hdr")),
    ).unwrap();
    manager.convert_rowset_ids(&schema_dir, new_tablet_id, schema_hash, &engine).unwrap();
    println!("rebound rowset ids under new tablet_id={new_tablet_id} at {}", schema_dir.display());

    manager.release_snapshot(&engine, &full_path).unwrap();
    manager.release_snapshot(&engine, &incr_path).unwrap();
    println!("released both snapshots");
}
