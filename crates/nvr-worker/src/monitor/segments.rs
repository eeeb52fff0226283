//! Segment directory scanning.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File extensions the transport uses for finished segments.
pub const SEGMENT_EXTENSIONS: &[&str] = &["ts", "m4s"];

/// A segment file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

fn is_segment(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SEGMENT_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}

/// Find the most recently modified segment in `dir`.
///
/// Returns `Ok(None)` when the directory holds no segments and an error
/// when it cannot be read. Entries that vanish while scanning are skipped.
pub fn newest_segment(dir: &Path) -> io::Result<Option<SegmentInfo>> {
    let mut newest: Option<SegmentInfo> = None;

    for entry in std::fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !is_segment(&path) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        if !metadata.is_file() || metadata.len() == 0 {
            continue;
        }
        let Ok(modified) = metadata.modified() else { continue };

        let is_newer = newest
            .as_ref()
            .map(|current| modified > current.modified)
            .unwrap_or(true);
        if is_newer {
            newest = Some(SegmentInfo {
                path,
                modified,
                size: metadata.len(),
            });
        }
    }

    Ok(newest)
}
