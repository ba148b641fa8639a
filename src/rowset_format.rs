//! Legacy ("V1"/alpha) rowset physical layout and the Modern→Legacy converter.
//!
//! The live write path (`segment.rs`) only ever produces `RowsetType::Modern`
//! (Segment V2, columnar) rowsets. `RowsetType::Legacy` only exists as an
//! output of the snapshot Format Normaliser when a caller asks for the legacy
//! wire format (`SnapshotFormat::V1`) — mirroring the real engine's
//! beta-rowset → alpha-rowset conversion path used for backward-compatible
//! shipping.
//!
//! File layout, row-major, following the same magic+footer+CRC32 convention
//! as `segment.rs`:
//! ```text
//! ┌──────────────────────────────────┐
//! │ MAGIC    (8 bytes) "OLAPLGC\0"   │
//! │ VERSION  (4 bytes) = 1           │
//! ├──────────────────────────────────┤
//! │ rows: [value_count(4) + values]* │
//! ├──────────────────────────────────┤
//! │ num_rows (4 bytes)               │
//! │ footer CRC32 (4 bytes)           │
//! │ MAGIC (8 bytes)                  │
//! └──────────────────────────────────┘
//! ```
//! A companion `.idx` file holds a sparse `index::OrdinalIndex` keyed by row
//! id, at the same `SHORT_KEY_INTERVAL` cadence `column_writer.rs` uses.

use std::path::Path;

use crate::common::{OlapError, Result, RowsetId};
use crate::field_type::Value;
use crate::index::{OrdinalIndex, SHORT_KEY_INTERVAL};
use crate::meta::{RowsetMeta, RowsetType, TabletSchema};
use crate::segment::{SegmentReader, SegmentWriter};

const MAGIC: &[u8; 8] = b"OLAPLGC\0";
const VERSION: u32 = 1;

// ── LegacyRowsetWriter ────────────────────────────────────────────────────────

pub struct LegacyRowsetWriter {
    rows: Vec<Vec<Value>>,
}

impl LegacyRowsetWriter {
    pub fn new() -> Self { Self { rows: Vec::new() } }

    pub fn append_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn num_rows(&self) -> usize { self.rows.len() }

    /// Writes the data file and its sparse ordinal index, returning their byte sizes.
    pub fn finalize(self, data_path: &Path, index_path: &Path) -> Result<(u64, u64)> {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&VERSION.to_le_bytes());

        let mut ordinal = OrdinalIndex::default();
        for (i, row) in self.rows.iter().enumerate() {
            if i as u32 % SHORT_KEY_INTERVAL == 0 {
                ordinal.add(i as u32, data.len() as u64);
            }
            data.extend_from_slice(&(row.len() as u32).to_le_bytes());
            for v in row {
                write_tagged_value(&mut data, v);
            }
        }

        let num_rows = self.rows.len() as u32;
        let footer_start = data.len();
        data.extend_from_slice(&num_rows.to_le_bytes());
        let crc = crc32fast::hash(&data[footer_start..]);
        data.extend_from_slice(&crc.to_le_bytes());
        data.extend_from_slice(MAGIC);

        std::fs::write(data_path, &data).map_err(OlapError::Io)?;
        let idx_bytes = ordinal.serialize();
        std::fs::write(index_path, &idx_bytes).map_err(OlapError::Io)?;

        Ok((data.len() as u64, idx_bytes.len() as u64))
    }
}

impl Default for LegacyRowsetWriter {
    fn default() -> Self { Self::new() }
}

fn write_tagged_value(out: &mut Vec<u8>, v: &Value) {
    match v {
        Value::Null       => out.push(0),
        Value::Int8(x)    => { out.push(1); out.push(*x as u8); }
        Value::Int16(x)   => { out.push(2); out.extend_from_slice(&x.to_le_bytes()); }
        Value::Int32(x)   => { out.push(3); out.extend_from_slice(&x.to_le_bytes()); }
        Value::Int64(x)   => { out.push(4); out.extend_from_slice(&x.to_le_bytes()); }
        Value::Float32(x) => { out.push(5); out.extend_from_slice(&x.to_le_bytes()); }
        Value::Float64(x) => { out.push(6); out.extend_from_slice(&x.to_le_bytes()); }
        Value::Bytes(b)   => {
            out.push(7);
            out.extend_from_slice(&(b.len() as u32).to_le_bytes());
            out.extend_from_slice(b);
        }
    }
}

fn read_tagged_value(data: &[u8], pos: &mut usize) -> Result<Value> {
    if *pos >= data.len() {
        return Err(OlapError::SegmentIo("legacy rowset: truncated value".into()));
    }
    let tag = data[*pos];
    *pos += 1;
    let v = match tag {
        0 => Value::Null,
        1 => { let x = data[*pos] as i8; *pos += 1; Value::Int8(x) }
        2 => { let x = i16::from_le_bytes(data[*pos..*pos+2].try_into().unwrap()); *pos += 2; Value::Int16(x) }
        3 => { let x = i32::from_le_bytes(data[*pos..*pos+4].try_into().unwrap()); *pos += 4; Value::Int32(x) }
        4 => { let x = i64::from_le_bytes(data[*pos..*pos+8].try_into().unwrap()); *pos += 8; Value::Int64(x) }
        5 => { let x = f32::from_le_bytes(data[*pos..*pos+4].try_into().unwrap()); *pos += 4; Value::Float32(x) }
        6 => { let x = f64::from_le_bytes(data[*pos..*pos+8].try_into().unwrap()); *pos += 8; Value::Float64(x) }
        7 => {
            let len = u32::from_le_bytes(data[*pos..*pos+4].try_into().unwrap()) as usize;
            *pos += 4;
            let b = data[*pos..*pos+len].to_vec();
            *pos += len;
            Value::Bytes(b)
        }
        other => return Err(OlapError::SegmentIo(format!("legacy rowset: bad value tag {other}"))),
    };
    Ok(v)
}

// ── LegacyRowsetReader ────────────────────────────────────────────────────────

pub struct LegacyRowsetReader {
    rows: Vec<Vec<Value>>,
}

impl LegacyRowsetReader {
    pub fn open(data: Vec<u8>) -> Result<Self> {
        let n = data.len();
        if n < 20 || &data[0..8] != MAGIC || &data[n-8..] != MAGIC {
            return Err(OlapError::SegmentIo("invalid legacy rowset magic".into()));
        }
        let num_rows_bytes = &data[n-16..n-12];
        let stored_crc = u32::from_le_bytes(data[n-12..n-8].try_into().unwrap());
        if crc32fast::hash(num_rows_bytes) != stored_crc {
            return Err(OlapError::ChecksumMismatch);
        }
        let num_rows = u32::from_le_bytes(num_rows_bytes.try_into().unwrap()) as usize;

        let mut rows = Vec::with_capacity(num_rows);
        let mut pos = 12usize;
        let rows_end = n - 16;
        while pos < rows_end && rows.len() < num_rows {
            let count = u32::from_le_bytes(data[pos..pos+4].try_into().unwrap()) as usize;
            pos += 4;
            let mut row = Vec::with_capacity(count);
            for _ in 0..count {
                row.push(read_tagged_value(&data, &mut pos)?);
            }
            rows.push(row);
        }
        Ok(Self { rows })
    }

    pub fn num_rows(&self) -> usize { self.rows.len() }
    pub fn rows(&self) -> &[Vec<Value>] { &self.rows }
    pub fn into_rows(self) -> Vec<Vec<Value>> { self.rows }
}

// ── Modern → Legacy conversion ────────────────────────────────────────────────

/// Reads every row out of a `Modern` rowset's segment file(s), in order.
fn read_all_modern_rows(
    meta:         &RowsetMeta,
    column_metas: &[crate::field_type::ColumnMeta],
    dir:          &Path,
) -> Result<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    for name in meta.data_file_names() {
        let bytes = std::fs::read(dir.join(&name)).map_err(OlapError::Io)?;
        let reader = SegmentReader::open(bytes, column_metas.to_vec())?;
        let num_cols = column_metas.len();
        let mut columns: Vec<Vec<Value>> = Vec::with_capacity(num_cols);
        for c in 0..num_cols {
            columns.push(reader.read_column(c)?);
        }
        let num_rows = reader.num_rows() as usize;
        for r in 0..num_rows {
            rows.push((0..num_cols).map(|c| columns[c].get(r).cloned().unwrap_or(Value::Null)).collect());
        }
    }
    Ok(rows)
}

/// Converts a `Modern` rowset into the `Legacy` physical layout under `dst_dir`,
/// re-emitting its files and returning an updated `RowsetMeta` (same id, version,
/// overlap flag, and row content — only `rowset_type` and file layout change).
pub fn convert_modern_to_legacy(
    meta:    &RowsetMeta,
    schema:  &TabletSchema,
    src_dir: &Path,
    dst_dir: &Path,
) -> Result<RowsetMeta> {
    let column_metas = schema.to_column_metas();
    let rows = read_all_modern_rows(meta, &column_metas, src_dir)?;

    let mut writer = LegacyRowsetWriter::new();
    let num_rows = rows.len() as u64;
    for row in rows {
        writer.append_row(row);
    }

    let data_name  = format!("{}_0.dat", meta.rowset_id);
    let index_name = format!("{}_0.idx", meta.rowset_id);
    let (data_len, index_len) = writer.finalize(&dst_dir.join(&data_name), &dst_dir.join(&index_name))?;

    let mut new_meta = meta.clone();
    new_meta.rowset_type = RowsetType::Legacy;
    new_meta.num_segments = 1;
    new_meta.num_rows = num_rows;
    new_meta.data_disk_size = data_len + index_len;
    Ok(new_meta)
}

/// Abstraction over the Modern→Legacy converter, so the Format Normaliser can be
/// exercised against a stub in tests without touching the filesystem.
pub trait RowsetConverter {
    fn convert_modern_to_legacy(
        &self,
        meta:    &RowsetMeta,
        schema:  &TabletSchema,
        src_dir: &Path,
        dst_dir: &Path,
    ) -> Result<RowsetMeta>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRowsetConverter;

impl RowsetConverter for DefaultRowsetConverter {
    fn convert_modern_to_legacy(
        &self,
        meta:    &RowsetMeta,
        schema:  &TabletSchema,
        src_dir: &Path,
        dst_dir: &Path,
    ) -> Result<RowsetMeta> {
        convert_modern_to_legacy(meta, schema, src_dir, dst_dir)
    }
}

// ── Id-rebind re-emission (used by `snapshot::rebinder`) ─────────────────────

/// Re-emits `meta`'s rowset under `new_id`, in the same directory and physical
/// format, preserving row content, ordering, overlap flag, and version metadata.
pub fn reemit_under_new_id(
    meta:   &RowsetMeta,
    schema: &TabletSchema,
    dir:    &Path,
    new_id: RowsetId,
) -> Result<RowsetMeta> {
    match meta.rowset_type {
        RowsetType::Modern => reemit_modern(meta, schema, dir, new_id),
        RowsetType::Legacy => reemit_legacy(meta, dir, new_id),
    }
}

fn reemit_modern(meta: &RowsetMeta, schema: &TabletSchema, dir: &Path, new_id: RowsetId) -> Result<RowsetMeta> {
    let column_metas = schema.to_column_metas();
    let rows = read_all_modern_rows(meta, &column_metas, dir)?;

    let mut writer = SegmentWriter::new(column_metas);
    let num_rows = rows.len() as u64;
    for row in rows {
        writer.append_row(row)?;
    }

    let mut buf = Vec::new();
    let size = writer.finalize(&mut buf)?;
    let new_name = format!("{new_id}_0.seg");
    std::fs::write(dir.join(&new_name), &buf).map_err(OlapError::Io)?;

    let mut new_meta = meta.clone();
    new_meta.rowset_id = new_id;
    new_meta.num_segments = 1;
    new_meta.num_rows = num_rows;
    new_meta.data_disk_size = size;
    Ok(new_meta)
}

fn reemit_legacy(meta: &RowsetMeta, dir: &Path, new_id: RowsetId) -> Result<RowsetMeta> {
    let mut rows = Vec::new();
    for name in meta.data_file_names() {
        let bytes = std::fs::read(dir.join(&name)).map_err(OlapError::Io)?;
        let reader = LegacyRowsetReader::open(bytes)?;
        rows.extend(reader.into_rows());
    }

    let mut writer = LegacyRowsetWriter::new();
    let num_rows = rows.len() as u64;
    for row in rows {
        writer.append_row(row);
    }

    let data_name  = format!("{new_id}_0.dat");
    let index_name = format!("{new_id}_0.idx");
    let (data_len, index_len) = writer.finalize(&dir.join(&data_name), &dir.join(&index_name))?;

    let mut new_meta = meta.clone();
    new_meta.rowset_id = new_id;
    new_meta.num_segments = 1;
    new_meta.num_rows = num_rows;
    new_meta.data_disk_size = data_len + index_len;
    Ok(new_meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_rowset_round_trips_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LegacyRowsetWriter::new();
        writer.append_row(vec![Value::Int64(1), Value::Bytes(b"hello".to_vec())]);
        writer.append_row(vec![Value::Int64(2), Value::Null]);

        let data_path = dir.path().join("1_0.dat");
        let index_path = dir.path().join("1_0.idx");
        writer.finalize(&data_path, &index_path).unwrap();

        let bytes = std::fs::read(&data_path).unwrap();
        let reader = LegacyRowsetReader::open(bytes).unwrap();
        assert_eq!(reader.num_rows(), 2);
        assert_eq!(reader.rows()[0][0], Value::Int64(1));
        assert_eq!(reader.rows()[1][1], Value::Null);
    }

    #[test]
    fn corrupted_legacy_rowset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LegacyRowsetWriter::new();
        writer.append_row(vec![Value::Int32(42)]);
        let data_path = dir.path().join("1_0.dat");
        let index_path = dir.path().join("1_0.idx");
        writer.finalize(&data_path, &index_path).unwrap();

        let mut bytes = std::fs::read(&data_path).unwrap();
        let last = bytes.len() - 9;
        bytes[last] ^= 0xFF; // flip a byte inside the footer's CRC
        assert!(LegacyRowsetReader::open(bytes).is_err());
    }
}
