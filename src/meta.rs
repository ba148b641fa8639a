//! Tablet 持久化元数据 — schema、rowset meta、磁盘上的 tablet header

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{
    AggregateType, ColumnType, KeysType, OlapError, PartitionId, Result,
    RowsetId, SchemaHash, TabletId, Version,
};

// ── 列定义 ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub column_id:      u32,
    pub name:           String,
    pub column_type:    ColumnType,
    pub is_key:         bool,
    pub is_nullable:    bool,
    pub aggregate_type: AggregateType,
    /// VARCHAR 最大字节长度
    pub length:         u32,
}

impl ColumnSchema {
    /// 构建 key 列
    pub fn key(id: u32, name: &str, column_type: ColumnType) -> Self {
        Self {
            column_id: id, name: name.into(),
            column_type, is_key: true, is_nullable: false,
            aggregate_type: AggregateType::None, length: 0,
        }
    }
    /// 构建 value 列
    pub fn value(id: u32, name: &str, column_type: ColumnType, agg: AggregateType) -> Self {
        Self {
            column_id: id, name: name.into(),
            column_type, is_key: false, is_nullable: true,
            aggregate_type: agg, length: 0,
        }
    }
    /// 构建 VARCHAR 列
    pub fn varchar(id: u32, name: &str, max_len: u32, is_key: bool) -> Self {
        Self {
            column_id: id, name: name.into(),
            column_type: ColumnType::Varchar,
            is_key, is_nullable: !is_key,
            aggregate_type: AggregateType::None, length: max_len,
        }
    }
}

// ── Tablet Schema ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabletSchema {
    pub schema_version:         u32,
    pub keys_type:              KeysType,
    pub columns:                Vec<ColumnSchema>,
    pub schema_hash:            SchemaHash,
    pub num_rows_per_row_block: u32,
}

impl TabletSchema {
    pub fn new(keys_type: KeysType, columns: Vec<ColumnSchema>) -> Self {
        // 简化 schema_hash：各列 id 的 xor
        let hash = columns.iter().fold(0u32, |h, c| h ^ (c.column_id * 2654435761));
        Self {
            schema_version: 1, keys_type, columns,
            schema_hash: hash, num_rows_per_row_block: 1024,
        }
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.is_key)
    }
    pub fn value_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| !c.is_key)
    }
    pub fn num_columns(&self) -> usize { self.columns.len() }

    /// 投影为 Segment 读写层所需的物理列元数据
    pub fn to_column_metas(&self) -> Vec<crate::field_type::ColumnMeta> {
        self.columns.iter()
            .map(|c| {
                let field_type = crate::field_type::FieldType::from(c.column_type);
                let cm = crate::field_type::ColumnMeta::new(c.column_id, &c.name, field_type);
                if c.is_nullable { cm.nullable() } else { cm }
            })
            .collect()
    }
}

// ── Rowset 状态与物理类型 ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowsetState { Prepared, Committed, Visible, Stale }

/// 物理布局：`Legacy`（V1 旧式行存）与 `Modern`（Segment V2 列存）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowsetType { Legacy, Modern }

// ── Rowset 元数据 ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowsetMeta {
    pub rowset_id:         RowsetId,
    pub tablet_id:         TabletId,
    pub partition_id:      PartitionId,
    pub schema_hash:       SchemaHash,
    pub version:           Version,
    /// 版本链一致性校验用的摘要（非加密）
    pub version_hash:      u64,
    pub num_rows:          u64,
    pub data_disk_size:    u64,
    pub num_segments:      u32,
    pub state:             RowsetState,
    pub rowset_type:       RowsetType,
    /// 多个 segment 之间的 key 区间是否允许重叠（cumulative rowset 通常允许）
    pub segments_overlap:  bool,
    pub is_empty:          bool,
}

impl RowsetMeta {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rowset_id:      RowsetId,
        tablet_id:      TabletId,
        partition_id:   PartitionId,
        schema_hash:    SchemaHash,
        version:        Version,
        num_rows:       u64,
        data_disk_size: u64,
        rowset_type:    RowsetType,
    ) -> Self {
        let num_segments = ((num_rows / 1_000_000) + 1) as u32;
        let version_hash = Self::compute_version_hash(rowset_id, version);
        Self {
            rowset_id, tablet_id, partition_id, schema_hash, version, version_hash,
            num_rows, data_disk_size, num_segments,
            state: RowsetState::Prepared,
            rowset_type,
            segments_overlap: false,
            is_empty: num_rows == 0,
        }
    }

    /// 非加密摘要，仅用于版本链一致性交叉校验
    fn compute_version_hash(rowset_id: RowsetId, version: Version) -> u64 {
        let mut h: u64 = 0xcbf29ce484222325;
        for x in [rowset_id, version.start as u64, version.end as u64] {
            h ^= x;
            h = h.wrapping_mul(0x100000001b3);
        }
        h
    }

    pub fn with_overlap(mut self, overlap: bool) -> Self {
        self.segments_overlap = overlap; self
    }

    pub fn is_visible(&self) -> bool { self.state == RowsetState::Visible }
    pub fn mark_stale(&mut self) { self.state = RowsetState::Stale; }
    pub fn mark_visible(&mut self) { self.state = RowsetState::Visible; }

    /// 本 rowset 的数据文件名（不含目录），按当前 rowset_id 命名
    pub fn data_file_names(&self) -> Vec<String> {
        match self.rowset_type {
            RowsetType::Modern => (0..self.num_segments.max(1))
                .map(|i| format!("{}_{}.seg", self.rowset_id, i))
                .collect(),
            RowsetType::Legacy => (0..self.num_segments.max(1))
                .map(|i| format!("{}_{}.dat", self.rowset_id, i))
                .collect(),
        }
    }

    /// 本 rowset 的索引文件名；Modern 布局索引内嵌于 .seg 文件，无独立文件
    pub fn index_file_names(&self) -> Vec<String> {
        match self.rowset_type {
            RowsetType::Modern => vec![],
            RowsetType::Legacy => (0..self.num_segments.max(1))
                .map(|i| format!("{}_{}.idx", self.rowset_id, i))
                .collect(),
        }
    }

    pub fn all_file_names(&self) -> Vec<String> {
        let mut names = self.data_file_names();
        names.extend(self.index_file_names());
        names
    }

    /// 将本 rowset 的全部文件硬链接到 `dst_dir`
    pub fn link_files_to(&self, src_dir: &Path, dst_dir: &Path) -> Result<()> {
        for name in self.all_file_names() {
            let src = src_dir.join(&name);
            let dst = dst_dir.join(&name);
            std::fs::hard_link(&src, &dst).map_err(OlapError::Io)?;
        }
        Ok(())
    }

    /// 删除本 rowset 在 `dir` 下的全部文件
    pub fn remove_files(&self, dir: &Path) -> Result<()> {
        for name in self.all_file_names() {
            let path = dir.join(&name);
            if path.exists() {
                std::fs::remove_file(&path).map_err(OlapError::Io)?;
            }
        }
        Ok(())
    }
}

// ── Alter Task（schema change / rollup，快照时会被丢弃）────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlterTaskInfo {
    pub related_tablet_id:   TabletId,
    pub related_schema_hash: SchemaHash,
}

// ── Tablet 元数据（运行时）────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TabletMeta {
    pub tablet_id:    TabletId,
    pub partition_id: PartitionId,
    pub schema_hash:  SchemaHash,
    pub schema:       TabletSchema,
    /// 参与当前读视图的 rowset（全量历史）
    pub visible_rowsets:     HashMap<RowsetId, RowsetMeta>,
    /// 为增量克隆保留的单 delta rowset，以 version 为键
    pub incremental_rowsets: HashMap<RowsetId, RowsetMeta>,
    /// cumulative compaction 分界点
    pub cumulative_layer_point: i64,
    /// 最新可见版本
    pub max_version:  i64,
    /// 正在进行的 schema-change / rollup 任务；快照时被丢弃
    pub alter_task:   Option<AlterTaskInfo>,
    /// 该 tablet 的数据目录（不持久化到 header 文件中，由加载方指定）
    pub data_dir:     PathBuf,
}

impl TabletMeta {
    pub fn new(
        tablet_id:    TabletId,
        partition_id: PartitionId,
        schema:       TabletSchema,
        data_dir:     PathBuf,
    ) -> Self {
        let schema_hash = schema.schema_hash;
        Self {
            tablet_id, partition_id, schema_hash, schema,
            visible_rowsets: HashMap::new(),
            incremental_rowsets: HashMap::new(),
            cumulative_layer_point: -1,
            max_version: -1,
            alter_task: None,
            data_dir,
        }
    }

    /// 反序列化用的线上文档，仅包含可持久化字段（不含 `data_dir`）
    pub fn to_header_doc(&self) -> TabletHeaderDoc {
        let mut visible: Vec<RowsetMeta> = self.visible_rowsets.values().cloned().collect();
        visible.sort_by_key(|r| r.version.start);
        let mut incremental: Vec<RowsetMeta> = self.incremental_rowsets.values().cloned().collect();
        incremental.sort_by_key(|r| r.version.start);
        TabletHeaderDoc {
            tablet_id: self.tablet_id,
            partition_id: self.partition_id,
            schema_hash: self.schema_hash,
            schema: self.schema.clone(),
            visible_rowsets: visible,
            incremental_rowsets: incremental,
            cumulative_layer_point: self.cumulative_layer_point,
            max_version: self.max_version,
            alter_task: self.alter_task.clone(),
        }
    }

    pub fn from_header_doc(doc: TabletHeaderDoc, data_dir: PathBuf) -> Self {
        let visible_rowsets = doc.visible_rowsets.into_iter()
            .map(|r| (r.rowset_id, r)).collect();
        let incremental_rowsets = doc.incremental_rowsets.into_iter()
            .map(|r| (r.rowset_id, r)).collect();
        Self {
            tablet_id: doc.tablet_id,
            partition_id: doc.partition_id,
            schema_hash: doc.schema_hash,
            schema: doc.schema,
            visible_rowsets,
            incremental_rowsets,
            cumulative_layer_point: doc.cumulative_layer_point,
            max_version: doc.max_version,
            alter_task: doc.alter_task,
            data_dir,
        }
    }

    /// 序列化为 JSON 写入 `path`（对应 spec 中的 `TabletMeta.save`）
    pub fn save(&self, path: &Path) -> Result<()> {
        let doc = self.to_header_doc();
        let bytes = serde_json::to_vec_pretty(&doc)?;
        std::fs::write(path, bytes).map_err(OlapError::Io)
    }

    /// 从磁盘上的 header 文件加载（对应 spec 中的 `TabletMeta.create_from_file`）
    ///
    /// 注意：按照快照/恢复契约，`path` 以 **目标** tablet-id 命名，文件内容却可能仍引用
    /// 来源 tablet-id —— 调用方在后续步骤中改写 `tablet_id`/`schema_hash` 字段。
    pub fn load_from_file(path: &Path, data_dir: PathBuf) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(OlapError::Io)?;
        let doc: TabletHeaderDoc = serde_json::from_slice(&bytes)?;
        Ok(Self::from_header_doc(doc, data_dir))
    }
}

/// 磁盘上的 tablet header 文档（JSON），对应 spec 中 `TabletMeta.to_meta_pb`/`save` 产出的序列化形式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabletHeaderDoc {
    pub tablet_id:    TabletId,
    pub partition_id: PartitionId,
    pub schema_hash:  SchemaHash,
    pub schema:       TabletSchema,
    pub visible_rowsets:     Vec<RowsetMeta>,
    pub incremental_rowsets: Vec<RowsetMeta>,
    pub cumulative_layer_point: i64,
    pub max_version: i64,
    pub alter_task:  Option<AlterTaskInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Version;

    fn schema() -> TabletSchema {
        TabletSchema::new(KeysType::Duplicate, vec![
            ColumnSchema::key(0, "id", ColumnType::Int64),
            ColumnSchema::value(1, "val", ColumnType::Int64, AggregateType::None),
        ])
    }

    #[test]
    fn header_doc_round_trips_through_json() {
        let mut meta = TabletMeta::new(10, 1, schema(), PathBuf::from("/tmp/x"));
        let rs = RowsetMeta::new(7, 10, 1, meta.schema_hash, Version::new(0, 0), 100, 1000, RowsetType::Modern);
        meta.visible_rowsets.insert(rs.rowset_id, rs);
        meta.max_version = 0;

        let bytes = serde_json::to_vec(&meta.to_header_doc()).unwrap();
        let doc: TabletHeaderDoc = serde_json::from_slice(&bytes).unwrap();
        let loaded = TabletMeta::from_header_doc(doc, PathBuf::from("/tmp/y"));

        assert_eq!(loaded.tablet_id, 10);
        assert_eq!(loaded.visible_rowsets.len(), 1);
        assert_eq!(loaded.visible_rowsets[&7].version, Version::new(0, 0));
    }

    #[test]
    fn data_file_names_differ_by_rowset_type() {
        let modern = RowsetMeta::new(1, 10, 1, 0, Version::point(1), 10, 100, RowsetType::Modern);
        assert!(modern.data_file_names()[0].ends_with(".seg"));
        assert!(modern.index_file_names().is_empty());

        let legacy = RowsetMeta::new(1, 10, 1, 0, Version::point(1), 10, 100, RowsetType::Legacy);
        assert!(legacy.data_file_names()[0].ends_with(".dat"));
        assert!(legacy.index_file_names()[0].ends_with(".idx"));
    }
}
