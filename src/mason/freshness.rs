//! Modification-time staleness checks.

use std::fs;
use std::path::Path;

/// Returns `true` if `target` must be regenerated because `source` is
/// strictly newer than it, or because `target` does not exist yet.
///
/// An unreadable `source` is treated as "not stale": a target cannot be
/// outdated relative to an input we cannot observe. This means a dependency
/// that disappears will not trigger a rebuild on its own; the build command
/// itself is expected to fail in that case.
///
/// The filesystem is re-queried on every call, so the answer may change if
/// files are touched mid-run.
pub fn is_stale(target: &Path, source: &Path) -> bool {
    let Ok(source_mtime) = fs::metadata(source).and_then(|meta| meta.modified()) else {
        return false;
    };
    let Ok(target_mtime) = fs::metadata(target).and_then(|meta| meta.modified()) else {
        return true;
    };
    // SystemTime carries sub-second precision, so equal-second timestamps
    // are already tie-broken by the nanosecond component.
    source_mtime > target_mtime
}
