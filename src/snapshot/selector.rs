//! Picks a consistent set of rowsets for a snapshot request under the
//! tablet's header read-lock.

use crate::meta::{RowsetMeta, TabletMeta};
use crate::tablet::Tablet;

use super::{Result, SnapshotError, SnapshotRequest};

/// Selects the rowsets to snapshot plus a consistent deep copy of the header,
/// both observed under the same read-lock acquisition.
pub fn select(tablet: &Tablet, request: &SnapshotRequest) -> Result<(Vec<RowsetMeta>, TabletMeta)> {
    tablet.with_read_lock(|meta, version_graph| {
        let selected = match &request.missing_version {
            Some(missing) => select_incremental(meta, missing)?,
            None => select_full(meta, version_graph, request.version)?,
        };
        Ok((selected, meta.clone()))
    })
}

fn select_incremental(meta: &TabletMeta, missing: &[i64]) -> Result<Vec<RowsetMeta>> {
    let mut rowsets = Vec::with_capacity(missing.len());
    for &v in missing {
        let rs = meta.incremental_rowsets.values()
            .find(|r| r.version == crate::common::Version::point(v))
            .cloned()
            .ok_or(SnapshotError::VersionNotFound(v))?;
        rowsets.push(rs);
    }
    Ok(rowsets)
}

fn select_full(
    meta:             &TabletMeta,
    version_graph:    &crate::tablet::VersionGraph,
    requested_version: Option<i64>,
) -> Result<Vec<RowsetMeta>> {
    let live = meta.max_version;
    let target = match requested_version {
        Some(v) => {
            if v > live {
                return Err(SnapshotError::BadInput(format!(
                    "requested version {v} exceeds live version {live}"
                )));
            }
            v
        }
        None => {
            if meta.visible_rowsets.is_empty() {
                return Err(SnapshotError::VersionNotFound(live));
            }
            live
        }
    };

    let path = version_graph.find_covering_path(0, target)
        .ok_or_else(|| SnapshotError::SelectionFailed(format!("no covering path for [0,{target}]")))?;

    let rowsets = path.iter()
        .filter_map(|v| meta.visible_rowsets.values().find(|r| r.version == *v).cloned())
        .collect();
    Ok(rowsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AggregateType, ColumnType, KeysType, Version};
    use crate::meta::{ColumnSchema, RowsetType, TabletSchema};
    use crate::snapshot::SnapshotFormat;
    use std::path::PathBuf;

    fn schema() -> TabletSchema {
        TabletSchema::new(KeysType::Duplicate, vec![
            ColumnSchema::key(0, "id", ColumnType::Int64),
            ColumnSchema::value(1, "v", ColumnType::Int64, AggregateType::None),
        ])
    }

    #[test]
    fn full_mode_selects_shortest_covering_path() {
        let meta = crate::meta::TabletMeta::new(1, 1, schema(), PathBuf::from("/tmp"));
        let tablet = Tablet::new(meta);
        let sh = tablet.schema_hash();
        for (start, end) in [(0, 0), (1, 3), (4, 4)] {
            let rs = RowsetMeta::new(start as u64 + 1, 1, 1, sh, Version::new(start, end), 10, 100, RowsetType::Modern);
            tablet.add_rowset(rs).unwrap();
        }

        let request = SnapshotRequest::new(1, sh).with_format(SnapshotFormat::V2);
        let (selected, header) = select(&tablet, &request).unwrap();
        assert_eq!(selected.len(), 3);
        assert_eq!(header.max_version, 4);
    }

    #[test]
    fn requesting_version_above_live_is_bad_input() {
        let meta = crate::meta::TabletMeta::new(1, 1, schema(), PathBuf::from("/tmp"));
        let tablet = Tablet::new(meta);
        let sh = tablet.schema_hash();
        tablet.add_rowset(RowsetMeta::new(1, 1, 1, sh, Version::new(0, 0), 10, 100, RowsetType::Modern)).unwrap();

        let request = SnapshotRequest::new(1, sh).with_version(99);
        assert!(matches!(select(&tablet, &request), Err(SnapshotError::BadInput(_))));
    }

    #[test]
    fn incremental_mode_preserves_input_order() {
        let meta = crate::meta::TabletMeta::new(1, 1, schema(), PathBuf::from("/tmp"));
        let tablet = Tablet::new(meta);
        let sh = tablet.schema_hash();
        for v in [5, 6, 7] {
            tablet.add_incremental_rowset(
                RowsetMeta::new(100 + v as u64, 1, 1, sh, Version::point(v), 1, 10, RowsetType::Modern)
            ).unwrap();
        }

        let request = SnapshotRequest::new(1, sh).with_missing_versions(vec![7, 5]);
        let (selected, _) = select(&tablet, &request).unwrap();
        assert_eq!(selected[0].version, Version::point(7));
        assert_eq!(selected[1].version, Version::point(5));
    }

    #[test]
    fn incremental_mode_fails_on_missing_version() {
        let meta = crate::meta::TabletMeta::new(1, 1, schema(), PathBuf::from("/tmp"));
        let tablet = Tablet::new(meta);
        let sh = tablet.schema_hash();
        tablet.add_incremental_rowset(
            RowsetMeta::new(105, 1, 1, sh, Version::point(5), 1, 10, RowsetType::Modern)
        ).unwrap();

        let request = SnapshotRequest::new(1, sh).with_missing_versions(vec![5, 8]);
        assert!(matches!(select(&tablet, &request), Err(SnapshotError::VersionNotFound(8))));
    }
}
