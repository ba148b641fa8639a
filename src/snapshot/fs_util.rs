//! Small filesystem helpers shared by the Materialiser and Id Rebinder.

use std::path::Path;

/// Removes `path` recursively if present, then (re)creates it empty.
pub fn recreate_dir(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    std::fs::create_dir_all(path)
}

/// Best-effort recursive removal. A failure here is logged, never escalated —
/// matching the spec's "best-effort cleanup" wording for teardown-on-failure.
pub fn remove_best_effort(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "best-effort snapshot cleanup failed"),
    }
}
