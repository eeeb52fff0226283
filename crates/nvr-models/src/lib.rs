//! Shared data models for the NVR detection pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Detections and detection zones
//! - Per-stream object filters
//! - Encoded packets, codec parameters and worker-pool tasks
//! - Recording states, statistics and metadata
//! - Detection model types

pub mod detection;
pub mod error;
pub mod model_type;
pub mod object_filter;
pub mod packet;
pub mod recording;
pub mod stream;
pub mod task;
pub mod zone;

// Re-export common types
pub use detection::{Detection, MAX_DETECTIONS, MAX_LABEL_LEN, UNTRACKED};
pub use error::{ModelError, ModelResult};
pub use model_type::ModelType;
pub use object_filter::{ObjectFilter, ObjectFilterMode, ObjectFilterModeParseError};
pub use packet::{CodecParams, EncodedPacket, PacketBufferEntry};
pub use recording::{
    RecordingMetadata, RecordingState, RecordingStateParseError, RecordingStats, TriggerType,
    TriggerTypeParseError,
};
pub use stream::{validate_stream_name, MAX_STREAM_NAME_LEN};
pub use task::DetectionTask;
pub use zone::{DetectionZone, ZonePoint, MAX_ZONES_PER_STREAM, MAX_ZONE_POINTS};
