//! Stream name validation.
//!
//! Stream names key every per-stream structure in the pipeline and end up
//! in recording paths, so they are checked once at the API boundary.

use crate::error::{ModelError, ModelResult};

/// Longest accepted stream name, in bytes.
pub const MAX_STREAM_NAME_LEN: usize = 63;

/// Validate a stream name.
///
/// Rejects empty names, names longer than [`MAX_STREAM_NAME_LEN`], path
/// separators, parent-directory references and control characters.
pub fn validate_stream_name(name: &str) -> ModelResult<()> {
    if name.trim().is_empty() {
        return Err(ModelError::invalid_stream_name("name is empty"));
    }

    if name.len() > MAX_STREAM_NAME_LEN {
        return Err(ModelError::invalid_stream_name(format!(
            "'{}' exceeds {} bytes",
            name, MAX_STREAM_NAME_LEN
        )));
    }

    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ModelError::invalid_stream_name(format!(
            "'{}' contains a path component",
            name
        )));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(ModelError::invalid_stream_name(
            "name contains control characters",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_stream_name("front_door").is_ok());
        assert!(validate_stream_name("Garage Cam 2").is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_stream_name("").is_err());
        assert!(validate_stream_name("   ").is_err());
        assert!(validate_stream_name("../etc").is_err());
        assert!(validate_stream_name("a/b").is_err());
        assert!(validate_stream_name("cam\n").is_err());
        assert!(validate_stream_name(&"x".repeat(64)).is_err());
    }
}
