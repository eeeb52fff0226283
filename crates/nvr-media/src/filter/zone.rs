//! Zone stage: polygon containment of a detection's center.

use nvr_models::{Detection, DetectionZone, ZonePoint};
use tracing::debug;

/// Even-odd ray casting test.
///
/// Casts a horizontal ray from `(x, y)` and toggles on every polygon edge it
/// crosses. Polygons with fewer than three points contain nothing.
pub fn point_in_polygon(x: f32, y: f32, polygon: &[ZonePoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > y) != (pj.y > y) && x < (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Keep detections whose center lies in an enabled zone that also admits
/// the detection's class and confidence, tagging each with the first such
/// zone. Without enabled zones the input passes through unchanged.
pub fn apply_zones(zones: &[DetectionZone], detections: Vec<Detection>) -> Vec<Detection> {
    let enabled: Vec<&DetectionZone> = zones.iter().filter(|z| z.enabled).collect();
    if enabled.is_empty() {
        return detections;
    }

    let before = detections.len();
    let kept: Vec<Detection> = detections
        .into_iter()
        .filter_map(|mut detection| {
            let (cx, cy) = detection.center();
            let zone = enabled.iter().find(|zone| {
                point_in_polygon(cx, cy, &zone.polygon)
                    && zone.allows_class(&detection.label)
                    && zone.meets_confidence(detection.confidence)
            })?;
            detection.zone_id = Some(zone.id.clone());
            Some(detection)
        })
        .collect();

    debug!(
        zones = enabled.len(),
        before,
        after = kept.len(),
        "Applied zone filter"
    );
    kept
}
