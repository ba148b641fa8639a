//! 顶层存储协调器

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::{CompactionType, DbId, Result, RowsetId, SchemaHash, TabletId, TableId};
use crate::meta::{RowsetMeta, TabletMeta, TabletSchema};
use crate::partition::PartitionInfo;
use crate::table::{CatalogManager, OlapTable};
use crate::tablet::{Tablet, TabletManager};

/// 创建表时每个分区的规格
pub struct PartitionSpec {
    pub partition_id: crate::common::PartitionId,
    /// 每个桶对应一个 TabletId，len == num_buckets
    pub tablet_ids:   Vec<TabletId>,
    pub schema_hash:  SchemaHash,
}

/// 一个数据根目录（对应多盘部署中的一块盘）
#[derive(Debug, Clone)]
pub struct DataDir {
    pub path: PathBuf,
}

impl DataDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 某个 tablet 在本数据目录下的存储路径
    pub fn tablet_path(&self, tablet_id: TabletId) -> PathBuf {
        self.path.join(tablet_id.to_string())
    }

    /// 本数据目录下的快照根目录（`⟨data-root⟩/snapshot/`）
    pub fn snapshot_root(&self) -> PathBuf {
        self.path.join("snapshot")
    }
}

/// 单节点 OLAP 存储引擎
pub struct StorageEngine {
    pub data_dir:        String,
    pub tablet_manager:  TabletManager,
    pub catalog_manager: CatalogManager,
    stores:              Vec<DataDir>,
    next_rowset_id:      AtomicU64,
}

impl StorageEngine {
    pub fn new_single_dir(data_dir: &str) -> Self {
        Self {
            data_dir:        data_dir.into(),
            tablet_manager:  TabletManager::new(),
            catalog_manager: CatalogManager::new(),
            stores:          vec![DataDir::new(data_dir)],
            next_rowset_id:  AtomicU64::new(1),
        }
    }

    // ── 数据目录 / id 生成 ───────────────────────────────────────────────────

    /// 本引擎挂载的全部数据目录（多盘部署时有多个）
    pub fn get_stores(&self) -> &[DataDir] {
        &self.stores
    }

    fn primary_store(&self) -> &DataDir {
        &self.stores[0]
    }

    /// 分配一个全局唯一、此前从未出现在任何 tablet header 中的 rowset id
    pub fn next_rowset_id(&self) -> RowsetId {
        self.next_rowset_id.fetch_add(1, Ordering::SeqCst)
    }

    // ── DDL ───────────────────────────────────────────────────────────────────

    pub fn create_database(&self, db_id: DbId, db_name: &str) -> Result<()> {
        self.catalog_manager.create_database(db_id, db_name)
    }

    /// 创建 Table 同时创建所有 Partition / Tablet
    pub fn create_table_with_partitions(
        &self,
        db_id:            DbId,
        table_id:         TableId,
        table_name:       &str,
        schema:           TabletSchema,
        partition_info:   PartitionInfo,
        partition_specs:  Vec<PartitionSpec>,
        _replication_num: u32,
    ) -> Result<()> {
        // 1. 为每个分区的每个桶创建 Tablet
        for spec in &partition_specs {
            for &tid in &spec.tablet_ids {
                let data_dir = self.primary_store().tablet_path(tid);
                let meta = TabletMeta::new(tid, spec.partition_id, schema.clone(), data_dir);
                self.tablet_manager.create_tablet(meta)?;
            }
        }
        // 2. 将 Table 注册进 Catalog
        let table = OlapTable::new(table_id, table_name, schema, partition_info);
        self.catalog_manager.add_table(db_id, table)
    }

    // ── 低级 Tablet 操作 ──────────────────────────────────────────────────────

    pub fn create_tablet(&self, tablet_id: TabletId, partition_id: crate::common::PartitionId, schema: TabletSchema) -> Result<Tablet> {
        let data_dir = self.primary_store().tablet_path(tablet_id);
        let meta = TabletMeta::new(tablet_id, partition_id, schema, data_dir);
        self.tablet_manager.create_tablet(meta)
    }

    pub fn create_tablet_with_meta(&self, meta: TabletMeta) -> Result<Tablet> {
        self.tablet_manager.create_tablet(meta)
    }

    pub fn get_tablet(&self, tablet_id: TabletId, schema_hash: SchemaHash) -> Result<Tablet> {
        self.tablet_manager.get_tablet(tablet_id, schema_hash)
    }

    pub fn drop_tablet(&self, tablet_id: TabletId, schema_hash: SchemaHash) -> Result<()> {
        self.tablet_manager.drop_tablet(tablet_id, schema_hash)
    }

    // ── Rowset 发布 ───────────────────────────────────────────────────────────

    /// 将一个已提交的 Rowset 发布到对应 Tablet（Load 完成后调用）
    pub fn publish_rowset(
        &self,
        tablet_id:   TabletId,
        schema_hash: SchemaHash,
        rowset:      RowsetMeta,
    ) -> Result<()> {
        let tablet = self.tablet_manager.get_tablet(tablet_id, schema_hash)?;
        tablet.add_rowset(rowset)
    }

    /// 将一个单 delta rowset 作为增量 rowset 发布（供增量克隆使用）
    pub fn publish_incremental_rowset(
        &self,
        tablet_id:   TabletId,
        schema_hash: SchemaHash,
        rowset:      RowsetMeta,
    ) -> Result<()> {
        let tablet = self.tablet_manager.get_tablet(tablet_id, schema_hash)?;
        tablet.add_incremental_rowset(rowset)
    }

    // ── Compaction 调度 ───────────────────────────────────────────────────────

    /// 调度一轮 Compaction，返回得分最高的 tablet_id 列表
    pub fn schedule_compaction(&self, ctype: CompactionType) -> Vec<TabletId> {
        self.tablet_manager
            .collect_compaction_candidates(ctype)
            .into_iter()
            .take(10)
            .map(|(tid, _, _)| tid)
            .collect()
    }

    // ── 辅助 ─────────────────────────────────────────────────────────────────

    pub fn tablet_count(&self) -> usize {
        self.tablet_manager.tablet_count()
    }

    /// 生成 Segment 文件在磁盘上的绝对路径
    pub fn segment_path(
        &self,
        tablet_id: TabletId,
        rowset_id: RowsetId,
        seg_idx:   u32,
    ) -> String {
        format!("{}/{}/{}_{}.seg", self.data_dir, tablet_id, rowset_id, seg_idx)
    }

    /// 某个 tablet 的数据目录（用于快照 hard-link 的源目录）
    pub fn tablet_data_dir(&self, tablet_id: TabletId) -> PathBuf {
        self.primary_store().tablet_path(tablet_id)
    }

    /// 快照根目录 `⟨data-root⟩/snapshot/`，由 `ReleaseSnapshot` 用于前缀校验
    pub fn snapshot_roots(&self) -> Vec<PathBuf> {
        self.stores.iter().map(DataDir::snapshot_root).collect()
    }

    /// 任意路径是否位于本引擎已知的某个数据根的快照子树下
    ///
    /// 只规范化数据根，不要求 `path` 本身存在 —— `ReleaseSnapshot` 在目标目录已被
    /// 删除（重复调用）时仍需要能判断出这条路径"曾经合法"，以便与"路径本身非法"
    /// 区分开（分别对应 *DirNotExist* 与 *IllegalPath*）。
    pub fn owns_snapshot_path(&self, path: &Path) -> bool {
        self.snapshot_roots().iter().any(|root| {
            match root.canonicalize() {
                Ok(root) => path.starts_with(&root),
                Err(_) => false,
            }
        })
    }
}

impl crate::snapshot::RowsetIdGenerator for StorageEngine {
    fn next_rowset_id(&self) -> RowsetId {
        StorageEngine::next_rowset_id(self)
    }
}
