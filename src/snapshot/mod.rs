//! Snapshot Manager — produces a point-in-time, self-contained, on-disk copy
//! of a tablet (header file + hard-linked rowsets) for shipping to, or
//! restoring on, another node.
//!
//! Three public operations: [`SnapshotManager::make_snapshot`],
//! [`SnapshotManager::release_snapshot`], [`SnapshotManager::convert_rowset_ids`].
//! Internally it decomposes into five cooperating pieces: [`path_allocator`],
//! [`selector`], [`materialiser`], [`normaliser`], [`rebinder`].

pub mod fs_util;
pub mod materialiser;
pub mod normaliser;
pub mod path_allocator;
pub mod rebinder;
pub mod selector;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::common::{OlapError, RowsetId, SchemaHash, TabletId};
use crate::rowset_format::DefaultRowsetConverter;
use crate::storage::StorageEngine;

use materialiser::Materialiser;
use path_allocator::PathAllocator;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("bad input: {0}")]
    BadInput(String),
    #[error("tablet not found: tablet_id={0}")]
    TabletNotFound(TabletId),
    #[error("directory does not exist: {0}")]
    DirNotExist(String),
    #[error("cannot create directory: {0}")]
    CannotCreateDir(String),
    #[error("version not found: {0}")]
    VersionNotFound(i64),
    #[error("rowset selection failed: {0}")]
    SelectionFailed(String),
    #[error("hard-link failed: {0}")]
    LinkFailed(String),
    #[error("rowset conversion failed: {0}")]
    ConversionFailed(String),
    #[error("invalid snapshot version")]
    InvalidSnapshotVersion,
    #[error("tablet meta initialisation failed: {0}")]
    InitFailed(String),
    #[error("header construction failed: {0}")]
    AllocationFailed(String),
    #[error("illegal snapshot path: {0}")]
    IllegalPath(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapshotError {
    /// Maps a lower-layer `OlapError` onto the most specific snapshot-level kind.
    fn from_olap(e: OlapError) -> Self {
        match e {
            OlapError::Io(io)   => SnapshotError::Io(io),
            OlapError::Serde(s) => SnapshotError::InitFailed(s.to_string()),
            other                => SnapshotError::ConversionFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// Legacy physical layout; every `Modern` rowset is converted on the way out.
    V1,
    /// As-is: rowsets keep whatever physical layout they already have.
    V2,
}

// ── Request ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub tablet_id:   TabletId,
    pub schema_hash: SchemaHash,
    pub version:     Option<i64>,
    pub missing_version: Option<Vec<i64>>,
    pub timeout:     Option<u64>,
    pub preferred_snapshot_version: SnapshotFormat,
    /// Output flag: set to `true` iff incremental-mode selection succeeded.
    pub allow_incremental_clone: bool,
}

impl SnapshotRequest {
    pub fn new(tablet_id: TabletId, schema_hash: SchemaHash) -> Self {
        Self {
            tablet_id,
            schema_hash,
            version: None,
            missing_version: None,
            timeout: None,
            preferred_snapshot_version: SnapshotFormat::V2,
            allow_incremental_clone: false,
        }
    }

    pub fn with_version(mut self, v: i64) -> Self { self.version = Some(v); self }
    pub fn with_missing_versions(mut self, vs: Vec<i64>) -> Self { self.missing_version = Some(vs); self }
    pub fn with_timeout(mut self, t: u64) -> Self { self.timeout = Some(t); self }
    pub fn with_format(mut self, f: SnapshotFormat) -> Self { self.preferred_snapshot_version = f; self }
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SnapshotManagerConfig {
    pub default_timeout_s: u64,
}

impl Default for SnapshotManagerConfig {
    fn default() -> Self {
        Self { default_timeout_s: 86_400 }
    }
}

// ── Id generator contract ─────────────────────────────────────────────────────

/// Narrow trait over the engine's rowset-id generator, so the Id Rebinder can
/// be exercised against a stub without a whole `StorageEngine`.
pub trait RowsetIdGenerator {
    fn next_rowset_id(&self) -> RowsetId;
}

// ── Manager ───────────────────────────────────────────────────────────────────

/// Explicit, constructible service object — no lazily-initialised singleton.
pub struct SnapshotManager {
    config:    SnapshotManagerConfig,
    allocator: PathAllocator,
    converter: DefaultRowsetConverter,
}

impl SnapshotManager {
    pub fn new(config: SnapshotManagerConfig) -> Self {
        Self {
            config,
            allocator: PathAllocator::new(),
            converter: DefaultRowsetConverter,
        }
    }

    pub fn make_snapshot(&self, engine: &StorageEngine, request: &mut SnapshotRequest) -> Result<PathBuf> {
        let tablet = engine.get_tablet(request.tablet_id, request.schema_hash)
            .map_err(|_| SnapshotError::TabletNotFound(request.tablet_id))?;

        let (selected, header_copy) = selector::select(&tablet, request)?;

        let rowset_dir = tablet.data_dir();
        if !rowset_dir.exists() {
            return Err(SnapshotError::DirNotExist(rowset_dir.display().to_string()));
        }
        if !matches!(request.preferred_snapshot_version, SnapshotFormat::V1 | SnapshotFormat::V2) {
            return Err(SnapshotError::InvalidSnapshotVersion);
        }

        if request.timeout.is_none() {
            request.timeout = Some(self.config.default_timeout_s);
        }

        let data_root = PathBuf::from(&engine.data_dir);
        let materialiser = Materialiser::new(&self.allocator, &self.converter);
        materialiser.materialise(&tablet, request, selected, header_copy, &rowset_dir, &data_root)
    }

    /// Enforces that `path` is lexically under a known data-root's `snapshot`
    /// subtree before removing it.
    pub fn release_snapshot(&self, engine: &StorageEngine, path: &Path) -> Result<()> {
        if !engine.owns_snapshot_path(path) {
            tracing::error!(path = %path.display(), "release_snapshot rejected a path outside any known data root's snapshot tree");
            return Err(SnapshotError::IllegalPath(path.display().to_string()));
        }
        if !path.exists() {
            return Err(SnapshotError::DirNotExist(path.display().to_string()));
        }
        std::fs::remove_dir_all(path).map_err(SnapshotError::Io)
    }

    pub fn convert_rowset_ids(
        &self,
        clone_dir:       &Path,
        new_tablet_id:   TabletId,
        new_schema_hash: SchemaHash,
        id_gen:          &dyn RowsetIdGenerator,
    ) -> Result<()> {
        rebinder::convert_rowset_ids(clone_dir, new_tablet_id, new_schema_hash, id_gen)
    }
}
