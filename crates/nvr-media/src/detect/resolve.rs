//! Model file lookup with fallback directories.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{MediaError, MediaResult};

/// Locate a model file.
///
/// Returns `requested` when it exists, otherwise the first directory in
/// `search_dirs` holding a file with the same name.
pub fn resolve_model_path(requested: &Path, search_dirs: &[PathBuf]) -> MediaResult<PathBuf> {
    if requested.is_file() {
        return Ok(requested.to_path_buf());
    }

    let file_name = requested
        .file_name()
        .ok_or_else(|| MediaError::model_not_found(requested.display().to_string()))?;

    for dir in search_dirs {
        let candidate = dir.join(file_name);
        if candidate.is_file() {
            info!(
                requested = %requested.display(),
                found = %candidate.display(),
                "Model found in fallback directory"
            );
            return Ok(candidate);
        }
    }

    Err(MediaError::model_not_found(requested.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_existing_path_wins() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("yolov8n.onnx");
        std::fs::write(&model, b"onnx").unwrap();

        let resolved = resolve_model_path(&model, &[]).unwrap();
        assert_eq!(resolved, model);
    }

    #[test]
    fn test_fallback_directories_in_order() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        std::fs::write(second.path().join("yolov8n.onnx"), b"onnx").unwrap();

        let resolved = resolve_model_path(
            Path::new("/missing/models/yolov8n.onnx"),
            &[first.path().to_path_buf(), second.path().to_path_buf()],
        )
        .unwrap();
        assert_eq!(resolved, second.path().join("yolov8n.onnx"));

        std::fs::write(first.path().join("yolov8n.onnx"), b"onnx").unwrap();
        let resolved = resolve_model_path(
            Path::new("/missing/models/yolov8n.onnx"),
            &[first.path().to_path_buf(), second.path().to_path_buf()],
        )
        .unwrap();
        assert_eq!(resolved, first.path().join("yolov8n.onnx"));
    }

    #[test]
    fn test_not_found() {
        let dir = tempdir().unwrap();
        let result = resolve_model_path(
            Path::new("/missing/yolov8n.onnx"),
            &[dir.path().to_path_buf()],
        );
        assert!(matches!(result, Err(MediaError::ModelNotFound(_))));
    }
}
