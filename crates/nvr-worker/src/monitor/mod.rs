//! Per-stream detection monitors.
//!
//! A monitor owns one OS thread and one detection model. It polls the
//! stream's segment directory, decodes keyframes of the newest finished
//! segment, runs detection, filters the results and forwards accepted
//! detections to a [`DetectionSink`].

mod polling;
mod registry;
mod resources;
mod segments;
mod transport;
mod worker;

pub use polling::PollingPolicy;
pub use registry::MonitorRegistry;
pub use resources::{available_memory_mb, downscale_for, LOW_MEMORY_DOWNSCALE};
pub use segments::{newest_segment, SegmentInfo, SEGMENT_EXTENSIONS};
pub use transport::StreamTransport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nvr_media::{Frame, FrameDecoder, ModelLoader};
use nvr_models::Detection;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::MonitorSettings;
use crate::error::{WorkerError, WorkerResult};
use crate::filter::DetectionFilter;

/// Receives accepted detections from monitors.
pub trait DetectionSink: Send + Sync {
    fn on_detections(
        &self,
        stream: &str,
        frame: &Frame,
        detections: &[Detection],
        frame_time: DateTime<Utc>,
    );
}

/// Detection settings of one monitored stream.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub model_path: PathBuf,
    /// Detection threshold; `<= 0` selects the model type's default
    pub threshold: f32,
    /// Minimum time between two detection runs
    pub detection_interval: Duration,
    pub segment_dir: PathBuf,
}

impl MonitorConfig {
    pub fn validate(&self) -> WorkerResult<()> {
        if self.model_path.as_os_str().is_empty() {
            return Err(WorkerError::invalid_input("model path is empty"));
        }
        if self.segment_dir.as_os_str().is_empty() {
            return Err(WorkerError::invalid_input("segment directory is empty"));
        }
        if !self.threshold.is_finite() {
            return Err(WorkerError::invalid_input("threshold is not a number"));
        }
        Ok(())
    }
}

/// Point-in-time view of a monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub stream: String,
    pub running: bool,
    pub model_loaded: bool,
    pub model_load_attempts: u32,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_detection_time: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub segments_processed: u64,
    pub detections_forwarded: u64,
}

/// Frames decoded outside the monitor thread, queued for detection.
#[derive(Debug)]
pub enum MonitorInput {
    Frames {
        frames: Vec<Frame>,
        base_time: DateTime<Utc>,
    },
}

/// Collaborators shared by every monitor.
#[derive(Clone)]
pub struct MonitorDeps {
    pub decoder: Arc<dyn FrameDecoder>,
    pub loader: Arc<dyn ModelLoader>,
    pub filter: DetectionFilter,
    pub sink: Arc<dyn DetectionSink>,
    pub transport: Option<Arc<dyn StreamTransport>>,
    pub clock: Arc<dyn Clock>,
    pub settings: MonitorSettings,
}
