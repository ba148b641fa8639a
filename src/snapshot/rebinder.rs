//! Id Rebinder — the receiving-side entry point. Reads a received snapshot
//! header, allocates fresh rowset ids from the engine's generator, re-emits
//! each rowset's files under the new ids, and rewrites the header.

use std::collections::HashMap;
use std::path::Path;

use crate::common::{RowsetId, SchemaHash, TabletId, Version};
use crate::meta::{RowsetMeta, TabletMeta, TabletSchema};
use crate::rowset_format;

use super::{Result, RowsetIdGenerator, SnapshotError};

/// Rewrites `⟨clone_dir⟩/⟨new_tablet_id⟩.hdr` and its rowset files so every
/// rowset id in the header is freshly allocated and globally unique.
///
/// The header file is named after the *target* tablet-id even though its
/// contents may still reference the *source* tablet-id — this naming
/// convention is the restore contract and is load-bearing.
pub fn convert_rowset_ids(
    clone_dir:       &Path,
    new_tablet_id:   TabletId,
    new_schema_hash: SchemaHash,
    id_gen:          &dyn RowsetIdGenerator,
) -> Result<()> {
    if !clone_dir.exists() {
        return Err(SnapshotError::DirNotExist(clone_dir.display().to_string()));
    }

    let header_path = clone_dir.join(format!("{new_tablet_id}.hdr"));
    let mut header = TabletMeta::load_from_file(&header_path, clone_dir.to_path_buf())
        .map_err(|e| SnapshotError::InitFailed(e.to_string()))?;

    let original_visible: Vec<RowsetMeta> = header.visible_rowsets.values().cloned().collect();
    let original_incremental: Vec<RowsetMeta> = header.incremental_rowsets.values().cloned().collect();
    let schema = header.schema.clone();

    header.visible_rowsets.clear();
    header.incremental_rowsets.clear();
    header.tablet_id = new_tablet_id;
    header.schema_hash = new_schema_hash;

    // version -> already-rebound meta, so a version shared by both lists gets
    // re-emitted exactly once and both occurrences carry the same new id.
    let mut by_version: HashMap<Version, RowsetMeta> = HashMap::new();

    for r in &original_visible {
        let new_meta = rebind_one(r, clone_dir, &schema, new_tablet_id, new_schema_hash, id_gen)?;
        by_version.insert(r.version, new_meta.clone());
        header.visible_rowsets.insert(new_meta.rowset_id, new_meta);
    }

    for r in &original_incremental {
        let new_meta = match by_version.get(&r.version) {
            Some(shared) => shared.clone(),
            None => {
                let new_meta = rebind_one(r, clone_dir, &schema, new_tablet_id, new_schema_hash, id_gen)?;
                by_version.insert(r.version, new_meta.clone());
                new_meta
            }
        };
        header.incremental_rowsets.insert(new_meta.rowset_id, new_meta);
    }

    header.save(&header_path).map_err(|e| SnapshotError::InitFailed(e.to_string()))
}

fn rebind_one(
    old_meta:        &RowsetMeta,
    clone_dir:       &Path,
    schema:          &TabletSchema,
    new_tablet_id:   TabletId,
    new_schema_hash: SchemaHash,
    id_gen:          &dyn RowsetIdGenerator,
) -> Result<RowsetMeta> {
    let new_id = id_gen.next_rowset_id();
    let mut new_meta = rename_rowset(old_meta, clone_dir, schema, new_id)?;
    new_meta.tablet_id = new_tablet_id;
    new_meta.schema_hash = new_schema_hash;
    Ok(new_meta)
}

/// Opens `old_meta`'s rowset without any fd-cache reuse, streams every row
/// into a writer under `new_id`, and deletes the old rowset's files on
/// success — preserving row content, ordering, overlap flag, and version.
fn rename_rowset(
    old_meta:  &RowsetMeta,
    clone_dir: &Path,
    schema:    &TabletSchema,
    new_id:    RowsetId,
) -> Result<RowsetMeta> {
    tracing::debug!(old_id = old_meta.rowset_id, new_id, "re-emitting rowset under new id");
    let new_meta = rowset_format::reemit_under_new_id(old_meta, schema, clone_dir, new_id)
        .map_err(|e| SnapshotError::ConversionFailed(e.to_string()))?;
    old_meta.remove_files(clone_dir)
        .map_err(|e| SnapshotError::ConversionFailed(e.to_string()))?;
    Ok(new_meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AggregateType, ColumnType, KeysType};
    use crate::field_type::Value;
    use crate::meta::{ColumnSchema, RowsetType};
    use crate::segment::SegmentWriter;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct SeqIdGen(AtomicU64);
    impl RowsetIdGenerator for SeqIdGen {
        fn next_rowset_id(&self) -> RowsetId { self.0.fetch_add(1, Ordering::SeqCst) }
    }

    fn schema() -> TabletSchema {
        TabletSchema::new(KeysType::Duplicate, vec![
            ColumnSchema::key(0, "id", ColumnType::Int64),
            ColumnSchema::value(1, "v", ColumnType::Int64, AggregateType::None),
        ])
    }

    fn write_modern_rowset(dir: &Path, rowset_id: u64, version: Version) -> RowsetMeta {
        let mut writer = SegmentWriter::new(schema().to_column_metas());
        writer.append_row(vec![Value::Int64(1), Value::Int64(2)]).unwrap();
        let mut buf = Vec::new();
        writer.finalize(&mut buf).unwrap();
        std::fs::write(dir.join(format!("{rowset_id}_0.seg")), &buf).unwrap();
        RowsetMeta::new(rowset_id, 10, 1, 0, version, 1, buf.len() as u64, RowsetType::Modern)
    }

    #[test]
    fn shared_version_keeps_same_new_id_across_lists() {
        let dir = tempfile::tempdir().unwrap();
        let rs_shared = write_modern_rowset(dir.path(), 1, Version::point(3));

        let mut header = TabletMeta::new(10, 1, schema(), dir.path().to_path_buf());
        header.visible_rowsets.insert(rs_shared.rowset_id, rs_shared.clone());
        header.incremental_rowsets.insert(rs_shared.rowset_id, rs_shared);
        header.max_version = 3;
        header.save(&dir.path().join("10.hdr")).unwrap();

        let id_gen = SeqIdGen(AtomicU64::new(1000));
        convert_rowset_ids(dir.path(), 10, 99, &id_gen).unwrap();

        let reloaded = TabletMeta::load_from_file(&dir.path().join("10.hdr"), dir.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.tablet_id, 10);
        assert_eq!(reloaded.schema_hash, 99);
        assert_eq!(reloaded.visible_rowsets.len(), 1);
        assert_eq!(reloaded.incremental_rowsets.len(), 1);
        let visible_id = *reloaded.visible_rowsets.keys().next().unwrap();
        let incremental_id = *reloaded.incremental_rowsets.keys().next().unwrap();
        assert_eq!(visible_id, incremental_id);
        assert!(!dir.path().join("1_0.seg").exists());
    }

    #[test]
    fn rebind_preserves_record_counts_and_versions() {
        let dir = tempfile::tempdir().unwrap();
        let r1 = write_modern_rowset(dir.path(), 1, Version::new(0, 0));
        let r2 = write_modern_rowset(dir.path(), 2, Version::new(1, 2));

        let mut header = TabletMeta::new(10, 1, schema(), dir.path().to_path_buf());
        header.visible_rowsets.insert(r1.rowset_id, r1);
        header.visible_rowsets.insert(r2.rowset_id, r2);
        header.max_version = 2;
        // the header file is named after the *target* tablet-id by convention,
        // even though its contents still reference the source tablet-id 10.
        header.save(&dir.path().join("77.hdr")).unwrap();

        let id_gen = SeqIdGen(AtomicU64::new(500));
        convert_rowset_ids(dir.path(), 77, 42, &id_gen).unwrap();

        let reloaded = TabletMeta::load_from_file(&dir.path().join("77.hdr"), dir.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.visible_rowsets.len(), 2);
        let mut versions: Vec<Version> = reloaded.visible_rowsets.values().map(|r| r.version).collect();
        versions.sort_by_key(|v| v.start);
        assert_eq!(versions, vec![Version::new(0, 0), Version::new(1, 2)]);
        assert!(reloaded.visible_rowsets.values().all(|r| r.rowset_id >= 500));
    }
}
