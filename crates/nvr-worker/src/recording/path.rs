//! Recording file layout.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nvr_models::TriggerType;

/// `{root}/{stream}/YYYY/MM/DD/{stream}_{YYYYmmdd_HHMMSS}_{trigger}.mp4`
pub fn recording_path(
    root: &Path,
    stream: &str,
    start: DateTime<Utc>,
    trigger: TriggerType,
) -> PathBuf {
    root.join(stream)
        .join(start.format("%Y").to_string())
        .join(start.format("%m").to_string())
        .join(start.format("%d").to_string())
        .join(format!(
            "{}_{}_{}.mp4",
            stream,
            start.format("%Y%m%d_%H%M%S"),
            trigger
        ))
}

/// Like [`recording_path`], with a numeric suffix when the file exists.
pub fn unique_recording_path(
    root: &Path,
    stream: &str,
    start: DateTime<Utc>,
    trigger: TriggerType,
) -> PathBuf {
    let path = recording_path(root, stream, start, trigger);
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (1..)
        .map(|n| path.with_file_name(format!("{}_{}.mp4", stem, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(path)
}
