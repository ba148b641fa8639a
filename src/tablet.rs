//! Tablet 运行时状态（Version Graph + Tablet 句柄 + TabletManager）

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use crate::common::{
    CompactionType, OlapError, Result, SchemaHash, TabletId, Version,
};
use crate::meta::{RowsetMeta, RowsetState, TabletMeta, TabletSchema};

// ── Version 图 ────────────────────────────────────────────────────────────────
//
// 有向图：每条边 start → end 代表一个覆盖 [start,end] 的 Rowset。
// 支持：
//   • 检测版本空洞（O(V+E) BFS）
//   • 找出覆盖 [lo,hi] 的最小 Rowset 集合

#[derive(Debug, Default)]
pub struct VersionGraph {
    // start_version → { end_version, ... }
    adj: HashMap<i64, HashSet<i64>>,
}

impl VersionGraph {
    pub fn add_edge(&mut self, v: Version) {
        self.adj.entry(v.start).or_default().insert(v.end);
    }

    pub fn remove_edge(&mut self, v: Version) {
        if let Some(ends) = self.adj.get_mut(&v.start) {
            ends.remove(&v.end);
            if ends.is_empty() {
                self.adj.remove(&v.start);
            }
        }
    }

    /// BFS 找从 lo 到 hi 的覆盖路径，返回经过的 Version 列表。
    pub fn find_covering_path(&self, lo: i64, hi: i64) -> Option<Vec<Version>> {
        let mut queue: VecDeque<(i64, Vec<Version>)> = VecDeque::new();
        queue.push_back((lo, vec![]));
        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(lo);

        while let Some((cur, path)) = queue.pop_front() {
            if let Some(ends) = self.adj.get(&cur) {
                // 优先尝试跨度最大的边
                let mut sorted: Vec<i64> = ends.iter().copied().collect();
                sorted.sort_unstable_by(|a, b| b.cmp(a));

                for &end in &sorted {
                    let mut new_path = path.clone();
                    new_path.push(Version::new(cur, end));

                    if end == hi {
                        return Some(new_path);
                    }
                    if end < hi && !visited.contains(&(end + 1)) {
                        visited.insert(end + 1);
                        queue.push_back((end + 1, new_path));
                    }
                }
            }
        }
        None
    }

    pub fn has_version_holes(&self, lo: i64, hi: i64) -> bool {
        self.find_covering_path(lo, hi).is_none()
    }
}

// ── Tablet 内部状态 ───────────────────────────────────────────────────────────

pub struct TabletInner {
    pub meta:          TabletMeta,
    pub version_graph: VersionGraph,
}

impl TabletInner {
    fn new(meta: TabletMeta) -> Self {
        let mut vg = VersionGraph::default();
        for rs in meta.visible_rowsets.values() {
            vg.add_edge(rs.version);
        }
        Self { meta, version_graph: vg }
    }
}

// ── Tablet 句柄 ───────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Tablet(Arc<RwLock<TabletInner>>);

impl Tablet {
    pub fn new(meta: TabletMeta) -> Self {
        Self(Arc::new(RwLock::new(TabletInner::new(meta))))
    }

    pub fn tablet_id(&self) -> TabletId {
        self.0.read().unwrap().meta.tablet_id
    }

    pub fn schema_hash(&self) -> SchemaHash {
        self.0.read().unwrap().meta.schema_hash
    }

    pub fn schema(&self) -> TabletSchema {
        self.0.read().unwrap().meta.schema.clone()
    }

    pub fn max_version(&self) -> i64 {
        self.0.read().unwrap().meta.max_version
    }

    pub fn data_dir(&self) -> PathBuf {
        self.0.read().unwrap().meta.data_dir.clone()
    }

    pub fn has_rowsets(&self) -> bool {
        !self.0.read().unwrap().meta.visible_rowsets.is_empty()
    }

    /// 将一个已提交的 Rowset 发布到本 Tablet 的可见版本链
    pub fn add_rowset(&self, mut rs: RowsetMeta) -> Result<()> {
        let mut inner = self.0.write().unwrap();
        if inner.meta.visible_rowsets.contains_key(&rs.rowset_id) {
            return Err(OlapError::VersionExists(rs.version));
        }
        rs.mark_visible();
        inner.version_graph.add_edge(rs.version);
        if rs.version.end > inner.meta.max_version {
            inner.meta.max_version = rs.version.end;
        }
        inner.meta.visible_rowsets.insert(rs.rowset_id, rs);
        Ok(())
    }

    /// 注册一个增量（单 delta）rowset，用于后续的增量克隆
    pub fn add_incremental_rowset(&self, mut rs: RowsetMeta) -> Result<()> {
        let mut inner = self.0.write().unwrap();
        rs.mark_visible();
        inner.meta.incremental_rowsets.insert(rs.rowset_id, rs);
        Ok(())
    }

    /// 按版本号查找单 delta 增量 rowset（version == (v, v)）
    pub fn get_incremental_rowset(&self, v: i64) -> Option<RowsetMeta> {
        let inner = self.0.read().unwrap();
        inner.meta.incremental_rowsets.values()
            .find(|r| r.version == Version::point(v))
            .cloned()
    }

    /// 找出覆盖 [lo, hi] 版本范围的最小 Rowset 元数据集合
    pub fn capture_consistent_versions(&self, lo: i64, hi: i64) -> Result<Vec<RowsetMeta>> {
        let inner = self.0.read().unwrap();
        let path = inner.version_graph
            .find_covering_path(lo, hi)
            .ok_or_else(|| OlapError::MissingVersions(format!("[{lo},{hi}]")))?;

        let rowsets = path
            .iter()
            .filter_map(|v| {
                inner.meta.visible_rowsets.values().find(|r| r.version == *v).cloned()
            })
            .collect();
        Ok(rowsets)
    }

    /// 在持有 header 读锁期间，对完整 tablet header 做一次深拷贝
    ///
    /// 快照用：保证返回的副本与调用方随后读取的 rowset 列表对应同一个被观察到的版本。
    pub fn header_snapshot(&self) -> TabletMeta {
        self.0.read().unwrap().meta.clone()
    }

    /// 在单次读锁持有期间对 header 与 version graph 执行 `f`
    ///
    /// 快照的 Rowset Selector 用这个方法保证"选中的 rowset 列表"与"header 深拷贝"
    /// 观察到的是同一个版本，中途不会被并发写者插队。
    pub fn with_read_lock<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&TabletMeta, &VersionGraph) -> R,
    {
        let inner = self.0.read().unwrap();
        f(&inner.meta, &inner.version_graph)
    }

    /// Compaction 优先级得分（可见 Rowset 数量）
    pub fn compute_compaction_score(&self, _ctype: CompactionType) -> f64 {
        let inner = self.0.read().unwrap();
        inner.meta.visible_rowsets.values()
            .filter(|r| r.state == RowsetState::Visible)
            .count() as f64
    }

    /// 将指定 Rowset 标记为 Stale（compaction 后调用）
    pub fn mark_rowset_stale(&self, rowset_id: u64) {
        let mut inner = self.0.write().unwrap();
        let version = match inner.meta.visible_rowsets.get_mut(&rowset_id) {
            Some(rs) => {
                rs.mark_stale();
                rs.version
            }
            None => return,
        };
        inner.version_graph.remove_edge(version);
    }
}

// ── Tablet 分片注册表 ─────────────────────────────────────────────────────────

const NUM_SHARDS: usize = 64;

struct Shard {
    tablets: HashMap<(TabletId, SchemaHash), Tablet>,
}

/// 分片 Tablet 注册表
///
/// 使用 64 个 RwLock Shard 降低读写竞争。
pub struct TabletManager {
    shards: Vec<RwLock<Shard>>,
}

impl TabletManager {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| RwLock::new(Shard { tablets: HashMap::new() }))
            .collect();
        Self { shards }
    }

    fn shard(&self, tablet_id: TabletId) -> &RwLock<Shard> {
        &self.shards[(tablet_id as usize) % NUM_SHARDS]
    }

    pub fn create_tablet(&self, meta: TabletMeta) -> Result<Tablet> {
        let key = (meta.tablet_id, meta.schema_hash);
        let tablet = Tablet::new(meta);
        self.shard(key.0).write().unwrap().tablets.insert(key, tablet.clone());
        Ok(tablet)
    }

    pub fn get_tablet(&self, tablet_id: TabletId, schema_hash: SchemaHash) -> Result<Tablet> {
        self.shard(tablet_id)
            .read().unwrap()
            .tablets.get(&(tablet_id, schema_hash))
            .cloned()
            .ok_or(OlapError::TabletNotFound(tablet_id))
    }

    pub fn drop_tablet(&self, tablet_id: TabletId, schema_hash: SchemaHash) -> Result<()> {
        self.shard(tablet_id)
            .write().unwrap()
            .tablets.remove(&(tablet_id, schema_hash))
            .map(|_| ())
            .ok_or(OlapError::TabletNotFound(tablet_id))
    }

    pub fn tablet_count(&self) -> usize {
        self.shards.iter().map(|s| s.read().unwrap().tablets.len()).sum()
    }

    /// 遍历所有 Tablet，返回 (tablet_id, schema_hash, compaction_score)
    pub fn collect_compaction_candidates(
        &self, ctype: CompactionType,
    ) -> Vec<(TabletId, SchemaHash, f64)> {
        let mut result = Vec::new();
        for shard in &self.shards {
            let guard = shard.read().unwrap();
            for ((tid, shash), tablet) in &guard.tablets {
                let score = tablet.compute_compaction_score(ctype);
                result.push((*tid, *shash, score));
            }
        }
        result.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap());
        result
    }
}

impl Default for TabletManager {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AggregateType, ColumnType, KeysType};
    use crate::meta::{ColumnSchema, RowsetType};

    fn test_schema() -> TabletSchema {
        TabletSchema::new(KeysType::Duplicate, vec![
            ColumnSchema::key(0, "id", ColumnType::Int64),
            ColumnSchema::value(1, "v", ColumnType::Int64, AggregateType::None),
        ])
    }

    #[test]
    fn capture_consistent_versions_finds_shortest_path() {
        let schema = test_schema();
        let meta = TabletMeta::new(1, 1, schema, PathBuf::from("/tmp"));
        let tablet = Tablet::new(meta);
        let sh = tablet.schema_hash();

        for (start, end) in [(0, 0), (1, 3), (4, 4)] {
            let rs = RowsetMeta::new(start as u64 + 100, 1, 1, sh, Version::new(start, end), 10, 100, RowsetType::Modern);
            tablet.add_rowset(rs).unwrap();
        }

        let covering = tablet.capture_consistent_versions(0, 4).unwrap();
        assert_eq!(covering.len(), 3);
        assert_eq!(tablet.max_version(), 4);
    }

    #[test]
    fn incremental_rowsets_are_independent_of_version_graph() {
        let schema = test_schema();
        let meta = TabletMeta::new(1, 1, schema, PathBuf::from("/tmp"));
        let tablet = Tablet::new(meta);
        let sh = tablet.schema_hash();

        let rs = RowsetMeta::new(500, 1, 1, sh, Version::point(5), 1, 10, RowsetType::Modern);
        tablet.add_incremental_rowset(rs).unwrap();

        assert!(tablet.get_incremental_rowset(5).is_some());
        assert!(tablet.get_incremental_rowset(6).is_none());
        // incremental rowsets never feed the full-mode version graph
        assert!(tablet.capture_consistent_versions(0, 5).is_err());
    }
}
