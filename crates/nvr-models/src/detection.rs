//! Detection results produced by a detector and consumed by the filter and
//! recording controller.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum detections kept from a single frame.
pub const MAX_DETECTIONS: usize = 20;

/// Maximum label length in characters.
pub const MAX_LABEL_LEN: usize = 31;

/// Track id of a detection that is not associated with a tracker.
pub const UNTRACKED: i32 = -1;

/// A single detected object.
///
/// Bounding box coordinates are normalized to [0, 1] with the origin at the
/// top-left corner of the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Class label (e.g. "person")
    pub label: String,
    /// Detection confidence
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Tracker id, [`UNTRACKED`] when untracked
    #[serde(default = "untracked")]
    pub track_id: i32,
    /// Id of the first zone that accepted this detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
}

fn untracked() -> i32 {
    UNTRACKED
}

impl Detection {
    /// Create an untracked, unzoned detection.
    ///
    /// Labels longer than [`MAX_LABEL_LEN`] characters are truncated.
    pub fn new(label: &str, confidence: f32, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            label: label.chars().take(MAX_LABEL_LEN).collect(),
            confidence,
            x,
            y,
            width,
            height,
            track_id: UNTRACKED,
            zone_id: None,
        }
    }

    /// Center of the bounding box in normalized coordinates.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}
