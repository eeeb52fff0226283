//! Keyframe decoding.
//!
//! Detection only looks at keyframes, which bounds CPU cost and lets the
//! decoder skip everything else. The FFmpeg implementation runs FFprobe to
//! list keyframe timestamps and dimensions, then a single FFmpeg process that
//! decodes only keyframes straight to scaled RGB24. Both processes are
//! reaped before returning, on success and on error alike.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use nvr_models::{CodecParams, EncodedPacket};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::ffmpeg::{check_ffmpeg, check_ffprobe, elementary_format, ensure_success};
use crate::frame::{scaled_dimensions, Frame};

/// Decode capability consumed by the monitor and the worker pool.
pub trait FrameDecoder: Send + Sync {
    /// Decode every keyframe of a finished segment, downscaled by `downscale`.
    fn decode_keyframes(&self, segment: &Path, downscale: u32) -> MediaResult<Vec<Frame>>;

    /// Decode a single live packet. Non-keyframes yield `None`.
    fn decode_packet(
        &self,
        packet: &EncodedPacket,
        codec: &CodecParams,
        downscale: u32,
    ) -> MediaResult<Option<Frame>>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    frames: Vec<ProbeFrame>,
}

#[derive(Debug, Deserialize)]
struct ProbeFrame {
    width: Option<u32>,
    height: Option<u32>,
    pts_time: Option<String>,
    best_effort_timestamp_time: Option<String>,
}

impl ProbeFrame {
    fn timestamp(&self) -> f64 {
        self.pts_time
            .as_deref()
            .or(self.best_effort_timestamp_time.as_deref())
            .and_then(|t| t.parse().ok())
            .unwrap_or(0.0)
    }
}

/// Keyframe decoder backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegFrameDecoder {
    /// Upper bound on frames decoded from one segment
    pub max_frames_per_segment: usize,
}

impl Default for FfmpegFrameDecoder {
    fn default() -> Self {
        Self {
            max_frames_per_segment: 8,
        }
    }
}

impl FfmpegFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// List keyframe dimensions and timestamps of the first video stream.
    fn probe_keyframes(&self, segment: &Path) -> MediaResult<Vec<ProbeFrame>> {
        check_ffprobe()?;

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-skip_frame",
                "nokey",
                "-show_entries",
                "frame=width,height,pts_time,best_effort_timestamp_time",
                "-of",
                "json",
            ])
            .arg(segment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            return Err(MediaError::FfprobeFailed {
                message: format!("ffprobe failed on {}", segment.display()),
                stderr: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
            });
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)?;
        Ok(probe.frames)
    }
}

impl FrameDecoder for FfmpegFrameDecoder {
    fn decode_keyframes(&self, segment: &Path, downscale: u32) -> MediaResult<Vec<Frame>> {
        if !segment.exists() {
            return Err(MediaError::FileNotFound(segment.to_path_buf()));
        }

        let keyframes = self.probe_keyframes(segment)?;
        let Some((width, height)) = keyframes
            .iter()
            .find_map(|f| Some((f.width?, f.height?)))
        else {
            debug!(segment = %segment.display(), "Segment has no decodable keyframes");
            return Ok(Vec::new());
        };

        let (target_w, target_h) = scaled_dimensions(width, height, downscale);
        let scale = format!("scale={}:{}", target_w, target_h);
        let max_frames = self.max_frames_per_segment.to_string();
        check_ffmpeg()?;

        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-skip_frame", "nokey", "-i"])
            .arg(segment)
            .args([
                "-map",
                "0:v:0",
                "-vsync",
                "0",
                "-frames:v",
                max_frames.as_str(),
                "-vf",
                scale.as_str(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;
        ensure_success(&output, "keyframe decode")?;

        let frame_len = Frame::byte_len(target_w, target_h);
        if output.stdout.len() % frame_len != 0 {
            warn!(
                segment = %segment.display(),
                bytes = output.stdout.len(),
                frame_len,
                "Decoder output is not a whole number of frames, dropping the tail"
            );
        }

        let frames = output
            .stdout
            .chunks_exact(frame_len)
            .zip(keyframes.iter())
            .map(|(pixels, probe)| {
                Frame::new(target_w, target_h, pixels.to_vec(), probe.timestamp())
            })
            .collect::<MediaResult<Vec<_>>>()?;

        debug!(
            segment = %segment.display(),
            frames = frames.len(),
            width = target_w,
            height = target_h,
            "Decoded segment keyframes"
        );
        Ok(frames)
    }

    fn decode_packet(
        &self,
        packet: &EncodedPacket,
        codec: &CodecParams,
        downscale: u32,
    ) -> MediaResult<Option<Frame>> {
        if !packet.keyframe {
            return Ok(None);
        }

        let format = elementary_format(&codec.codec)?;
        let (target_w, target_h) = scaled_dimensions(codec.width, codec.height, downscale);
        let scale = format!("scale={}:{}", target_w, target_h);
        check_ffmpeg()?;

        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-f", format, "-i", "pipe:0"])
            .args([
                "-frames:v",
                "1",
                "-vf",
                scale.as_str(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stdin not captured"))?;
        let mut input = Vec::with_capacity(codec.extradata.len() + packet.data.len());
        input.extend_from_slice(&codec.extradata);
        input.extend_from_slice(&packet.data);

        // Feed stdin from a separate thread so a full stdout pipe cannot
        // deadlock the two processes.
        let feeder = thread::spawn(move || stdin.write_all(&input));
        let output = child.wait_with_output()?;
        if let Ok(Err(e)) = feeder.join() {
            debug!(error = %e, "ffmpeg closed stdin early");
        }
        ensure_success(&output, "packet decode")?;

        let frame_len = Frame::byte_len(target_w, target_h);
        if output.stdout.len() < frame_len {
            return Err(MediaError::decode_failed(format!(
                "packet decode produced {} bytes, expected {}",
                output.stdout.len(),
                frame_len
            )));
        }

        let pts_secs = packet.pts_ms as f64 / 1000.0;
        Frame::new(target_w, target_h, output.stdout[..frame_len].to_vec(), pts_secs).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_output_parse() {
        let json = r#"{"frames":[
            {"width":1280,"height":720,"pts_time":"0.000000"},
            {"width":1280,"height":720,"best_effort_timestamp_time":"2.000000"}
        ]}"#;
        let probe: ProbeOutput = serde_json::from_str(json).unwrap();
        assert_eq!(probe.frames.len(), 2);
        assert_eq!(probe.frames[0].timestamp(), 0.0);
        assert_eq!(probe.frames[1].timestamp(), 2.0);
    }

    #[test]
    fn test_missing_segment_is_file_not_found() {
        let decoder = FfmpegFrameDecoder::new();
        let result = decoder.decode_keyframes(Path::new("/nonexistent/segment_001.ts"), 1);
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[test]
    fn test_non_keyframe_packet_is_skipped() {
        let decoder = FfmpegFrameDecoder::new();
        let packet = EncodedPacket::new(vec![0, 0, 0, 1], 40, false);
        let frame = decoder
            .decode_packet(&packet, &CodecParams::default(), 1)
            .unwrap();
        assert!(frame.is_none());
    }
}
