//! Recording lifecycle types.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// State of a stream's detection-triggered recording.
///
/// ```text
/// Idle -> Buffering -> Recording <-> PostRoll -> Finalizing -> Idle | Buffering
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    /// No active or pending recording.
    #[default]
    Idle,
    /// Pre-roll accumulating, no file open.
    Buffering,
    /// Events arriving, file open.
    Recording,
    /// Events ceased, file still open for the post-roll tail.
    PostRoll,
    /// Flushing and closing the file.
    Finalizing,
}

impl RecordingState {
    pub const ALL: &'static [RecordingState] = &[
        RecordingState::Idle,
        RecordingState::Buffering,
        RecordingState::Recording,
        RecordingState::PostRoll,
        RecordingState::Finalizing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Buffering => "buffering",
            RecordingState::Recording => "recording",
            RecordingState::PostRoll => "post_roll",
            RecordingState::Finalizing => "finalizing",
        }
    }

    /// Returns true while an output file is open.
    pub fn has_open_file(&self) -> bool {
        matches!(
            self,
            RecordingState::Recording | RecordingState::PostRoll | RecordingState::Finalizing
        )
    }

    /// Numeric value exported as a gauge.
    pub fn as_gauge(&self) -> f64 {
        match self {
            RecordingState::Idle => 0.0,
            RecordingState::Buffering => 1.0,
            RecordingState::Recording => 2.0,
            RecordingState::PostRoll => 3.0,
            RecordingState::Finalizing => 4.0,
        }
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecordingState {
    type Err = RecordingStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(RecordingState::Idle),
            "buffering" => Ok(RecordingState::Buffering),
            "recording" => Ok(RecordingState::Recording),
            "post_roll" | "postroll" => Ok(RecordingState::PostRoll),
            "finalizing" => Ok(RecordingState::Finalizing),
            _ => Err(RecordingStateParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown recording state: {0}")]
pub struct RecordingStateParseError(String);

/// What started a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Detection,
    Motion,
    Manual,
    Scheduled,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Detection => "detection",
            TriggerType::Motion => "motion",
            TriggerType::Manual => "manual",
            TriggerType::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = TriggerTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "detection" => Ok(TriggerType::Detection),
            "motion" => Ok(TriggerType::Motion),
            "manual" => Ok(TriggerType::Manual),
            "scheduled" => Ok(TriggerType::Scheduled),
            _ => Err(TriggerTypeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown trigger type: {0}")]
pub struct TriggerTypeParseError(String);

/// Counters and timestamps of a stream's recording context.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecordingStats {
    pub state: RecordingState,
    pub recordings_created: u64,
    pub events_processed: u64,
    pub buffer_flushes: u64,
    pub files_rotated: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_start_time: Option<DateTime<Utc>>,
}

/// Persisted description of a recording file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecordingMetadata {
    /// Store-assigned id, 0 until persisted
    #[serde(default)]
    pub id: u64,
    pub stream_name: String,
    pub file_path: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    #[serde(default)]
    pub is_complete: bool,
    pub trigger: TriggerType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse_and_display() {
        for state in RecordingState::ALL {
            assert_eq!(state.as_str().parse::<RecordingState>().unwrap(), *state);
        }
        assert_eq!(RecordingState::PostRoll.to_string(), "post_roll");
        assert!("paused".parse::<RecordingState>().is_err());
    }

    #[test]
    fn test_open_file_states() {
        assert!(!RecordingState::Idle.has_open_file());
        assert!(!RecordingState::Buffering.has_open_file());
        assert!(RecordingState::Recording.has_open_file());
        assert!(RecordingState::PostRoll.has_open_file());
    }

    #[test]
    fn test_trigger_type() {
        assert_eq!("motion".parse::<TriggerType>().unwrap(), TriggerType::Motion);
        assert_eq!(TriggerType::Detection.to_string(), "detection");
        assert!("alarm".parse::<TriggerType>().is_err());
    }
}
