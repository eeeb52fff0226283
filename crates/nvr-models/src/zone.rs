//! Detection zones.
//!
//! A zone is a user-drawn polygon in normalized frame coordinates that
//! restricts where detections count, optionally narrowed to a set of classes
//! and a minimum confidence.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::stream::validate_stream_name;

/// Maximum zones configured per stream.
pub const MAX_ZONES_PER_STREAM: usize = 16;

/// Maximum polygon vertices per zone.
pub const MAX_ZONE_POINTS: usize = 32;

/// A polygon vertex in normalized [0, 1] coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ZonePoint {
    pub x: f32,
    pub y: f32,
}

impl ZonePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A detection zone owned by a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionZone {
    /// Zone identifier
    pub id: String,
    /// Owning stream
    pub stream_name: String,
    /// Human readable label
    pub name: String,
    /// Disabled zones are ignored by the filter
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Ordered polygon vertices
    pub polygon: Vec<ZonePoint>,
    /// Comma separated class allow-list, empty allows every class
    #[serde(default)]
    pub filter_classes: String,
    /// Zone specific confidence floor, 0 disables it
    #[serde(default)]
    pub min_confidence: f32,
}

fn default_enabled() -> bool {
    true
}

impl DetectionZone {
    /// Create an enabled zone with no class or confidence restriction.
    pub fn new(
        id: impl Into<String>,
        stream_name: impl Into<String>,
        polygon: Vec<ZonePoint>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            stream_name: stream_name.into(),
            enabled: true,
            polygon,
            filter_classes: String::new(),
            min_confidence: 0.0,
        }
    }

    pub fn with_classes(mut self, classes: impl Into<String>) -> Self {
        self.filter_classes = classes.into();
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check the zone is well formed before it is stored.
    pub fn validate(&self) -> ModelResult<()> {
        if self.id.trim().is_empty() {
            return Err(ModelError::invalid_zone(&self.id, "zone id is empty"));
        }

        validate_stream_name(&self.stream_name)?;

        if self.polygon.len() < 3 {
            return Err(ModelError::invalid_zone(
                &self.id,
                format!("polygon needs at least 3 points, got {}", self.polygon.len()),
            ));
        }

        if self.polygon.len() > MAX_ZONE_POINTS {
            return Err(ModelError::invalid_zone(
                &self.id,
                format!(
                    "polygon has {} points, maximum is {}",
                    self.polygon.len(),
                    MAX_ZONE_POINTS
                ),
            ));
        }

        let in_range = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
        if let Some(p) = self.polygon.iter().find(|p| !in_range(p.x) || !in_range(p.y)) {
            return Err(ModelError::invalid_zone(
                &self.id,
                format!("point ({}, {}) is outside the normalized frame", p.x, p.y),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ModelError::invalid_zone(
                &self.id,
                format!("min_confidence {} is outside [0, 1]", self.min_confidence),
            ));
        }

        Ok(())
    }

    /// Iterate the trimmed, non-empty entries of the class allow-list.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.filter_classes
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Whether the class allow-list admits `label`.
    pub fn allows_class(&self, label: &str) -> bool {
        let mut classes = self.classes().peekable();
        if classes.peek().is_none() {
            return true;
        }
        classes.any(|c| c == label)
    }

    /// Whether `confidence` meets the zone floor.
    pub fn meets_confidence(&self, confidence: f32) -> bool {
        self.min_confidence <= 0.0 || confidence >= self.min_confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<ZonePoint> {
        vec![
            ZonePoint::new(0.0, 0.0),
            ZonePoint::new(0.5, 0.0),
            ZonePoint::new(0.5, 0.5),
            ZonePoint::new(0.0, 0.5),
        ]
    }

    #[test]
    fn test_zone_validation() {
        assert!(DetectionZone::new("z1", "cam1", square()).validate().is_ok());

        let triangle_missing = DetectionZone::new("z2", "cam1", square()[..2].to_vec());
        assert!(matches!(
            triangle_missing.validate(),
            Err(ModelError::InvalidZone { .. })
        ));

        let out_of_frame = DetectionZone::new(
            "z3",
            "cam1",
            vec![
                ZonePoint::new(0.0, 0.0),
                ZonePoint::new(1.5, 0.0),
                ZonePoint::new(0.5, 0.5),
            ],
        );
        assert!(out_of_frame.validate().is_err());

        let bad_stream = DetectionZone::new("z4", "", square());
        assert!(matches!(
            bad_stream.validate(),
            Err(ModelError::InvalidStreamName(_))
        ));
    }

    #[test]
    fn test_class_allow_list() {
        let zone = DetectionZone::new("z1", "cam1", square()).with_classes(" person , car,,");
        assert_eq!(zone.classes().collect::<Vec<_>>(), vec!["person", "car"]);
        assert!(zone.allows_class("person"));
        assert!(zone.allows_class("car"));
        assert!(!zone.allows_class("dog"));

        let open = DetectionZone::new("z2", "cam1", square());
        assert!(open.allows_class("anything"));
    }

    #[test]
    fn test_confidence_floor() {
        let zone = DetectionZone::new("z1", "cam1", square()).with_min_confidence(0.8);
        assert!(!zone.meets_confidence(0.5));
        assert!(zone.meets_confidence(0.95));

        let open = DetectionZone::new("z2", "cam1", square());
        assert!(open.meets_confidence(0.01));
    }

    #[test]
    fn test_zone_deserialize() {
        let json = r#"{
            "id": "driveway",
            "stream_name": "front",
            "name": "Driveway",
            "polygon": [{"x":0.1,"y":0.1},{"x":0.9,"y":0.1},{"x":0.5,"y":0.9}]
        }"#;
        let zone: DetectionZone = serde_json::from_str(json).unwrap();
        assert!(zone.enabled);
        assert_eq!(zone.min_confidence, 0.0);
        assert!(zone.filter_classes.is_empty());
        assert!(zone.validate().is_ok());
    }
}
