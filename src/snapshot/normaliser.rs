//! Converts `Modern` rowsets into the legacy physical layout for `V1` snapshots.

use std::path::Path;

use crate::meta::{RowsetMeta, RowsetType, TabletSchema};
use crate::rowset_format::RowsetConverter;

use super::{Result, SnapshotError};

/// For each `Modern` rowset in `metas`, converts it to `Legacy` layout under
/// `rowset_dir` (reading its current files from `src_dir`) and drops the old
/// files once the new ones are written. `Legacy` rowsets pass through
/// unchanged. Returns the rewritten list and whether any conversion happened,
/// so the caller only swaps its header sub-list when something changed.
pub fn normalise(
    metas:      &[RowsetMeta],
    rowset_dir: &Path,
    src_dir:    &Path,
    converter:  &dyn RowsetConverter,
    schema:     &TabletSchema,
) -> Result<(Vec<RowsetMeta>, bool)> {
    let mut out = Vec::with_capacity(metas.len());
    let mut changed = false;

    for m in metas {
        match m.rowset_type {
            RowsetType::Modern => {
                tracing::debug!(rowset_id = m.rowset_id, "converting modern rowset to legacy layout");
                let new_meta = converter
                    .convert_modern_to_legacy(m, schema, src_dir, rowset_dir)
                    .map_err(|e| SnapshotError::ConversionFailed(e.to_string()))?;
                m.remove_files(src_dir)
                    .map_err(|e| SnapshotError::ConversionFailed(e.to_string()))?;
                out.push(new_meta);
                changed = true;
            }
            RowsetType::Legacy => out.push(m.clone()),
        }
    }

    Ok((out, changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AggregateType, ColumnType, KeysType, Version};
    use crate::field_type::Value;
    use crate::meta::ColumnSchema;
    use crate::segment::SegmentWriter;

    fn schema() -> TabletSchema {
        TabletSchema::new(KeysType::Duplicate, vec![
            ColumnSchema::key(0, "id", ColumnType::Int64),
            ColumnSchema::value(1, "v", ColumnType::Int64, AggregateType::None),
        ])
    }

    #[test]
    fn legacy_rowsets_pass_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let meta = RowsetMeta::new(1, 10, 1, 0, Version::point(1), 5, 50, RowsetType::Legacy);
        let converter = crate::rowset_format::DefaultRowsetConverter;
        let (out, changed) = normalise(&[meta.clone()], dir.path(), dir.path(), &converter, &schema()).unwrap();
        assert!(!changed);
        assert_eq!(out[0].rowset_id, meta.rowset_id);
    }

    #[test]
    fn modern_rowsets_convert_and_drop_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let column_metas = schema().to_column_metas();
        let mut writer = SegmentWriter::new(column_metas);
        writer.append_row(vec![Value::Int64(1), Value::Int64(100)]).unwrap();
        let mut buf = Vec::new();
        writer.finalize(&mut buf).unwrap();
        std::fs::write(dir.path().join("1_0.seg"), &buf).unwrap();

        let meta = RowsetMeta::new(1, 10, 1, 0, Version::point(1), 1, buf.len() as u64, RowsetType::Modern);
        let converter = crate::rowset_format::DefaultRowsetConverter;
        let (out, changed) = normalise(&[meta], dir.path(), dir.path(), &converter, &schema()).unwrap();

        assert!(changed);
        assert_eq!(out[0].rowset_type, RowsetType::Legacy);
        assert!(!dir.path().join("1_0.seg").exists());
        assert!(dir.path().join("1_0.dat").exists());
    }
}
