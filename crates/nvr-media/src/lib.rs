//! Media-side building blocks of the NVR detection pipeline.
//!
//! This crate provides:
//! - A time-windowed circular packet buffer for pre-roll capture
//! - Zone and object filtering of detections
//! - Decoder, detector and recording writer capabilities
//! - FFmpeg CLI and ONNX Runtime implementations of those capabilities

pub mod buffer;
pub mod decode;
pub mod detect;
pub mod error;
pub mod ffmpeg;
pub mod filter;
pub mod frame;
pub mod writer;

pub use buffer::{
    estimate_stream_bytes, estimate_total_bytes, BufferStats, PacketBuffer,
    DEFAULT_PRE_BUFFER_SECS, MAX_PRE_BUFFER_SECS, MIN_PRE_BUFFER_SECS,
};
pub use decode::{FfmpegFrameDecoder, FrameDecoder};
pub use detect::{resolve_model_path, Detector, ModelLoader, OnnxModelLoader};
pub use error::{MediaError, MediaResult};
pub use filter::{apply_object_filter, apply_zones, filter_detections, point_in_polygon};
pub use frame::{scaled_dimensions, Frame};
pub use writer::{FfmpegRecordingWriter, RecordingSink, RecordingWriter};
