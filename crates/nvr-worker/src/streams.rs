//! JSON stream definitions loaded by the binary.

use std::path::{Path, PathBuf};

use nvr_models::{validate_stream_name, CodecParams, DetectionZone, ObjectFilter};
use serde::{Deserialize, Serialize};

use crate::config::RecordingDefaults;
use crate::error::WorkerResult;
use crate::monitor::MonitorConfig;
use crate::recording::RecordingOptions;

/// One camera stream and its detection and recording settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub name: String,
    /// Directory the transport writes finished segments into
    pub segment_dir: PathBuf,
    pub model_path: PathBuf,
    /// Detection threshold; `0` selects the model type's default
    #[serde(default)]
    pub threshold: f32,
    /// Minimum seconds between detections
    #[serde(default = "default_detection_interval")]
    pub detection_interval_secs: u64,
    #[serde(default = "default_true")]
    pub detection_enabled: bool,
    #[serde(default = "default_true")]
    pub recording_enabled: bool,
    #[serde(default)]
    pub pre_buffer_secs: Option<u32>,
    #[serde(default)]
    pub post_buffer_secs: Option<u32>,
    #[serde(default)]
    pub max_file_duration_secs: Option<u32>,
    #[serde(default)]
    pub codec: CodecParams,
    #[serde(default)]
    pub zones: Vec<DetectionZone>,
    #[serde(default)]
    pub object_filter: ObjectFilter,
}

fn default_detection_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct StreamsFile {
    streams: Vec<StreamDefinition>,
}

impl StreamDefinition {
    /// Recording options, falling back to `defaults` for unset durations.
    pub fn recording_options(&self, defaults: &RecordingDefaults) -> RecordingOptions {
        let mut options = RecordingOptions::from_defaults(defaults, self.codec.clone());
        if let Some(secs) = self.pre_buffer_secs {
            options.pre_buffer_secs = secs;
        }
        if let Some(secs) = self.post_buffer_secs {
            options.post_buffer_secs = secs;
        }
        if let Some(secs) = self.max_file_duration_secs {
            options.max_file_duration_secs = secs;
        }
        options
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            model_path: self.model_path.clone(),
            threshold: self.threshold,
            detection_interval: std::time::Duration::from_secs(self.detection_interval_secs),
            segment_dir: self.segment_dir.clone(),
        }
    }
}

/// Load and validate a `{"streams": [...]}` file.
pub fn load_streams(path: &Path) -> WorkerResult<Vec<StreamDefinition>> {
    let raw = std::fs::read_to_string(path)?;
    let file: StreamsFile = serde_json::from_str(&raw)?;
    for stream in &file.streams {
        validate_stream_name(&stream.name)?;
    }
    Ok(file.streams)
}
