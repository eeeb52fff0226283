//! FFmpeg CLI helpers shared by the decoder and the recording writer.

use std::process::Output;

use crate::error::{MediaError, MediaResult};

/// Check that FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<std::path::PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check that FFprobe is available.
pub fn check_ffprobe() -> MediaResult<std::path::PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Map a codec name to the FFmpeg demuxer reading its elementary stream.
pub fn elementary_format(codec: &str) -> MediaResult<&'static str> {
    match codec.to_lowercase().as_str() {
        "h264" | "avc" => Ok("h264"),
        "h265" | "hevc" => Ok("hevc"),
        "mjpeg" | "jpeg" => Ok("mjpeg"),
        other => Err(MediaError::UnsupportedFormat(other.to_string())),
    }
}

/// Turn a finished FFmpeg run into an error when it exited unsuccessfully.
pub(crate) fn ensure_success(output: &Output, what: &str) -> MediaResult<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(MediaError::ffmpeg_failed(
        format!("{} exited with {}", what, output.status),
        (!stderr.is_empty()).then_some(stderr),
        output.status.code(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elementary_format() {
        assert_eq!(elementary_format("H264").unwrap(), "h264");
        assert_eq!(elementary_format("hevc").unwrap(), "hevc");
        assert!(matches!(
            elementary_format("vp9"),
            Err(MediaError::UnsupportedFormat(_))
        ));
    }
}
