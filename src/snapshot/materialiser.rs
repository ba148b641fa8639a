//! Builds the on-disk snapshot directory: path allocation, hard links, the
//! rewritten header, format dispatch, and teardown on failure.

use std::path::{Path, PathBuf};

use crate::meta::{RowsetMeta, TabletMeta};
use crate::rowset_format::RowsetConverter;
use crate::tablet::Tablet;

use super::path_allocator::PathAllocator;
use super::{fs_util, normaliser, Result, SnapshotError, SnapshotFormat, SnapshotRequest};

pub struct Materialiser<'a> {
    allocator: &'a PathAllocator,
    converter: &'a dyn RowsetConverter,
}

impl<'a> Materialiser<'a> {
    pub fn new(allocator: &'a PathAllocator, converter: &'a dyn RowsetConverter) -> Self {
        Self { allocator, converter }
    }

    /// Materialises `selected`/`header_copy` under a freshly allocated snapshot
    /// directory rooted at `data_root`, reading the rowsets' current files from
    /// `rowset_dir` (the tablet's live data directory). Tears down the entire
    /// directory tree on any failure after step 1.
    pub fn materialise(
        &self,
        tablet:       &Tablet,
        request:      &mut SnapshotRequest,
        selected:     Vec<RowsetMeta>,
        header_copy:  TabletMeta,
        rowset_dir:   &Path,
        data_root:    &Path,
    ) -> Result<PathBuf> {
        let is_incremental = request.missing_version.is_some();
        let timeout = request.timeout.unwrap_or(86_400);

        // Step 1.
        let snapshot_id_path = self.allocator.allocate(data_root, timeout);

        // Step 2.
        let schema_full_path = snapshot_id_path
            .join(tablet.tablet_id().to_string())
            .join(tablet.schema_hash().to_string());
        let header_path = schema_full_path.join(format!("{}.hdr", tablet.tablet_id()));

        let outcome = self.build(
            &schema_full_path,
            &header_path,
            &selected,
            header_copy,
            is_incremental,
            request,
            rowset_dir,
        );

        match outcome {
            Ok(()) => {
                let canon = snapshot_id_path.canonicalize().map_err(SnapshotError::Io)?;
                tracing::info!(
                    tablet_id = tablet.tablet_id(),
                    path = %canon.display(),
                    rowsets = selected.len(),
                    format = ?request.preferred_snapshot_version,
                    "make_snapshot succeeded",
                );
                Ok(canon)
            }
            Err(e) => {
                fs_util::remove_best_effort(&snapshot_id_path);
                tracing::info!(tablet_id = tablet.tablet_id(), error = %e, "make_snapshot failed");
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        schema_full_path: &Path,
        header_path:      &Path,
        selected:         &[RowsetMeta],
        mut header_copy:  TabletMeta,
        is_incremental:   bool,
        request:          &mut SnapshotRequest,
        rowset_dir:       &Path,
    ) -> Result<()> {
        // Step 3.
        fs_util::recreate_dir(schema_full_path)
            .map_err(|e| SnapshotError::CannotCreateDir(e.to_string()))?;

        // Step 4.
        for rs in selected {
            tracing::debug!(rowset_id = rs.rowset_id, "hard-linking rowset files into snapshot directory");
            rs.link_files_to(rowset_dir, schema_full_path)
                .map_err(|e| SnapshotError::LinkFailed(e.to_string()))?;
        }

        // Step 5.
        header_copy.alter_task = None;
        let mut visible: Vec<RowsetMeta> = Vec::new();
        let mut incremental: Vec<RowsetMeta> = Vec::new();
        if is_incremental {
            incremental = selected.to_vec();
        } else {
            visible = selected.to_vec();
        }

        // Step 6.
        match request.preferred_snapshot_version {
            SnapshotFormat::V1 => {
                let target_list = if is_incremental { &mut incremental } else { &mut visible };
                let (rewritten, changed) = normaliser::normalise(
                    target_list,
                    schema_full_path,
                    schema_full_path,
                    self.converter,
                    &header_copy.schema,
                )?;
                if changed {
                    *target_list = rewritten;
                }
            }
            SnapshotFormat::V2 => {}
        }

        header_copy.visible_rowsets = visible.iter().cloned().map(|r| (r.rowset_id, r)).collect();
        header_copy.incremental_rowsets = incremental.iter().cloned().map(|r| (r.rowset_id, r)).collect();
        header_copy.save(header_path).map_err(SnapshotError::from_olap)?;

        // Step 7: single-delta tail hint (full mode only).
        if !is_incremental {
            if let (Some(requested), Some(last)) = (request.version, selected.last()) {
                if last.version.end == requested && last.version.start != requested {
                    tracing::warn!(
                        tablet_id = header_copy.tablet_id,
                        version = requested,
                        "snapshot tail rowset is a cumulative delta, not a single delta; \
                         downstream incremental-clone assumptions may not hold",
                    );
                }
            }
        }

        if is_incremental {
            request.allow_incremental_clone = true;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AggregateType, ColumnType, KeysType, Version};
    use crate::field_type::Value;
    use crate::meta::{ColumnSchema, RowsetType, TabletSchema};
    use crate::rowset_format::DefaultRowsetConverter;
    use crate::segment::SegmentWriter;
    use crate::snapshot::SnapshotRequest;

    fn schema() -> TabletSchema {
        TabletSchema::new(KeysType::Duplicate, vec![
            ColumnSchema::key(0, "id", ColumnType::Int64),
            ColumnSchema::value(1, "v", ColumnType::Int64, AggregateType::None),
        ])
    }

    fn write_modern_rowset(dir: &Path, rowset_id: u64) -> RowsetMeta {
        let column_metas = schema().to_column_metas();
        let mut writer = SegmentWriter::new(column_metas);
        writer.append_row(vec![Value::Int64(1), Value::Int64(9)]).unwrap();
        let mut buf = Vec::new();
        writer.finalize(&mut buf).unwrap();
        std::fs::write(dir.join(format!("{rowset_id}_0.seg")), &buf).unwrap();
        RowsetMeta::new(rowset_id, 10, 1, 0, Version::point(0), 1, buf.len() as u64, RowsetType::Modern)
    }

    #[test]
    fn materialise_produces_header_and_hard_links() {
        let root = tempfile::tempdir().unwrap();
        let rowset_dir = tempfile::tempdir().unwrap();
        let rs = write_modern_rowset(rowset_dir.path(), 1);
        let mut header = TabletMeta::new(10, 1, schema(), rowset_dir.path().to_path_buf());
        header.max_version = 0;

        let tablet = Tablet::new(header.clone());
        let allocator = PathAllocator::new();
        let converter = DefaultRowsetConverter;
        let m = Materialiser::new(&allocator, &converter);
        let mut request = SnapshotRequest::new(10, 0);

        let path = m.materialise(&tablet, &mut request, vec![rs], header, rowset_dir.path(), root.path()).unwrap();

        assert!(path.join("10").join("0").join("10.hdr").exists());
        assert!(path.join("10").join("0").join("1_0.seg").exists());
    }

    #[test]
    fn failed_materialise_leaves_no_directory() {
        let root = tempfile::tempdir().unwrap();
        let rowset_dir = tempfile::tempdir().unwrap();
        // Rowset metadata references files that were never written -> link fails.
        let rs = RowsetMeta::new(1, 10, 1, 0, Version::point(0), 1, 10, RowsetType::Modern);
        let header = TabletMeta::new(10, 1, schema(), rowset_dir.path().to_path_buf());
        let tablet = Tablet::new(header.clone());
        let allocator = PathAllocator::new();
        let converter = DefaultRowsetConverter;
        let m = Materialiser::new(&allocator, &converter);
        let mut request = SnapshotRequest::new(10, 0);

        let result = m.materialise(&tablet, &mut request, vec![rs], header, rowset_dir.path(), root.path());
        assert!(result.is_err());
        assert!(!root.path().join("snapshot").read_dir().map(|mut d| d.next().is_some()).unwrap_or(false));
    }
}
