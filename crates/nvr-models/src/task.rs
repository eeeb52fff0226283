//! Units of work dispatched to the detection worker pool.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::packet::{CodecParams, EncodedPacket};

/// A detection task. The task owns its packet or path; the data is released
/// when the executing worker drops the task.
#[derive(Debug, Clone)]
pub enum DetectionTask {
    /// A live packet straight from the transport.
    Packet {
        stream: String,
        packet: EncodedPacket,
        codec: CodecParams,
    },
    /// A finished segment file on disk.
    Segment {
        stream: String,
        path: PathBuf,
        duration_secs: f64,
        captured_at: DateTime<Utc>,
    },
}

impl DetectionTask {
    /// Stream the task belongs to.
    pub fn stream(&self) -> &str {
        match self {
            DetectionTask::Packet { stream, .. } | DetectionTask::Segment { stream, .. } => stream,
        }
    }

    /// Short name of the task variant, used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            DetectionTask::Packet { .. } => "packet",
            DetectionTask::Segment { .. } => "segment",
        }
    }
}
