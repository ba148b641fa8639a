//! Computes unique, time-stamped snapshot directory paths.
//!
//! Does not touch the filesystem — `allocate` only ever produces a `PathBuf`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide, monotonically increasing sequence counter plus a short-lived
/// exclusive section covering its read-and-increment.
pub struct PathAllocator {
    seq:  AtomicU64,
    lock: Mutex<()>,
}

impl PathAllocator {
    pub fn new() -> Self {
        Self { seq: AtomicU64::new(0), lock: Mutex::new(()) }
    }

    /// Returns `⟨data_root⟩/snapshot/⟨YYYYMMDDhhmmss⟩.⟨seq⟩.⟨timeout_s⟩`.
    pub fn allocate(&self, data_root: &Path, timeout_s: u64) -> PathBuf {
        let seq = {
            let _guard = self.lock.lock().unwrap();
            self.seq.fetch_add(1, Ordering::SeqCst)
        };
        let ts = format_timestamp(now_unix_secs());
        data_root.join("snapshot").join(format!("{ts}.{seq}.{timeout_s}"))
    }
}

impl Default for PathAllocator {
    fn default() -> Self { Self::new() }
}

fn now_unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Formats a unix timestamp as `YYYYMMDDhhmmss` (UTC), using the civil-from-days
/// algorithm (Howard Hinnant's `http://howardhinnant.github.io/date_algorithms.html`)
/// to avoid pulling in a calendar dependency for one string.
fn format_timestamp(unix_secs: i64) -> String {
    let days = unix_secs.div_euclid(86400);
    let rem  = unix_secs.rem_euclid(86400);
    let hour = rem / 3600;
    let min  = (rem % 3600) / 60;
    let sec  = rem % 60;

    let z    = days + 719_468;
    let era  = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe  = (z - era * 146_097) as u64; // [0, 146096]
    let yoe  = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365; // [0, 399]
    let y    = yoe as i64 + era * 400;
    let doy  = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp   = (5 * doy + 2) / 153; // [0, 11]
    let d    = doy - (153 * mp + 2) / 5 + 1; // [1, 31]
    let m    = if mp < 10 { mp + 3 } else { mp - 9 }; // [1, 12]
    let y    = if m <= 2 { y + 1 } else { y };

    format!("{y:04}{m:02}{d:02}{hour:02}{min:02}{sec:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_produces_unique_sequential_paths() {
        let allocator = PathAllocator::new();
        let root = Path::new("/data0");
        let a = allocator.allocate(root, 86400);
        let b = allocator.allocate(root, 86400);
        assert_ne!(a, b);
        assert!(a.starts_with(root.join("snapshot")));
    }

    #[test]
    fn timestamp_formats_known_instant() {
        // 2021-01-01T00:00:00Z == 1609459200
        assert_eq!(format_timestamp(1_609_459_200), "20210101000000");
    }
}
