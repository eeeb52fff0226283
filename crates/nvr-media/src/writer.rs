//! Recording output writers.
//!
//! A [`RecordingWriter`] opens a [`RecordingSink`] for one output file. The
//! FFmpeg implementation pipes the stream's elementary packets into an FFmpeg
//! process that remuxes them into an MP4 container without re-encoding.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use nvr_models::{CodecParams, PacketBufferEntry};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::ffmpeg::{check_ffmpeg, elementary_format, ensure_success};

/// An open recording file.
pub trait RecordingSink: Send {
    /// Append one packet.
    fn write_packet(&mut self, entry: &PacketBufferEntry) -> MediaResult<()>;

    /// Path of the file being written.
    fn path(&self) -> &Path;

    /// Flush and close the file, returning its size in bytes.
    fn finish(self: Box<Self>) -> MediaResult<u64>;
}

/// Opens recording files.
pub trait RecordingWriter: Send + Sync {
    fn open(&self, path: &Path, codec: &CodecParams) -> MediaResult<Box<dyn RecordingSink>>;
}

/// Remuxes elementary video packets into MP4 through the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRecordingWriter;

impl FfmpegRecordingWriter {
    pub fn new() -> Self {
        Self
    }
}

impl RecordingWriter for FfmpegRecordingWriter {
    fn open(&self, path: &Path, codec: &CodecParams) -> MediaResult<Box<dyn RecordingSink>> {
        let format = elementary_format(&codec.codec)?;
        check_ffmpeg()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let fps = codec.fps.max(1).to_string();
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-y", "-f", format])
            .args(["-r", fps.as_str()])
            .args(["-i", "pipe:0", "-c", "copy", "-movflags", "+faststart"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::writer_failed("ffmpeg stdin not captured"))?;

        if !codec.extradata.is_empty() {
            if let Err(e) = stdin.write_all(&codec.extradata) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        }

        info!(path = %path.display(), codec = %codec.codec, "Recording file opened");

        Ok(Box::new(FfmpegSink {
            child: Some(child),
            stdin: Some(stdin),
            path: path.to_path_buf(),
            packets: 0,
        }))
    }
}

struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    packets: u64,
}

impl RecordingSink for FfmpegSink {
    fn write_packet(&mut self, entry: &PacketBufferEntry) -> MediaResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::writer_failed("recording already closed"))?;
        stdin.write_all(&entry.data).map_err(|e| {
            MediaError::writer_failed(format!("write to {} failed: {}", self.path.display(), e))
        })?;
        self.packets += 1;
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn finish(mut self: Box<Self>) -> MediaResult<u64> {
        // Closing stdin signals end of stream to ffmpeg.
        drop(self.stdin.take());

        let child = self
            .child
            .take()
            .ok_or_else(|| MediaError::writer_failed("recording already closed"))?;
        let output = child.wait_with_output()?;
        ensure_success(&output, "recording remux")?;

        let size = std::fs::metadata(&self.path)?.len();
        debug!(
            path = %self.path.display(),
            packets = self.packets,
            size,
            "Recording file closed"
        );
        Ok(size)
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            warn!(path = %self.path.display(), "Recording dropped without finish, stopping ffmpeg");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_codec_rejected_before_spawn() {
        let writer = FfmpegRecordingWriter::new();
        let codec = CodecParams {
            codec: "vp9".to_string(),
            ..CodecParams::default()
        };
        let result = writer.open(Path::new("/tmp/never_created.mp4"), &codec);
        assert!(matches!(result, Err(MediaError::UnsupportedFormat(_))));
    }
}
