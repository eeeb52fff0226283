//! Zone and object filtering of raw detections.
//!
//! Both stages are per-detection predicates over read-only configuration,
//! so they commute: applying them in either order accepts the same set.

mod object;
mod zone;

pub use object::apply_object_filter;
pub use zone::{apply_zones, point_in_polygon};

use nvr_models::{Detection, DetectionZone, ObjectFilter};

/// Run the zone stage, then the object stage.
pub fn filter_detections(
    zones: &[DetectionZone],
    object_filter: &ObjectFilter,
    detections: Vec<Detection>,
) -> Vec<Detection> {
    let zoned = apply_zones(zones, detections);
    apply_object_filter(object_filter, zoned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvr_models::{ObjectFilterMode, ZonePoint};

    fn left_half() -> DetectionZone {
        DetectionZone::new(
            "left",
            "cam1",
            vec![
                ZonePoint::new(0.0, 0.0),
                ZonePoint::new(0.5, 0.0),
                ZonePoint::new(0.5, 1.0),
                ZonePoint::new(0.0, 1.0),
            ],
        )
    }

    fn at(label: &str, cx: f32, cy: f32) -> Detection {
        Detection::new(label, 0.9, cx - 0.05, cy - 0.05, 0.1, 0.1)
    }

    #[test]
    fn test_stage_order_does_not_matter() {
        let zones = vec![left_half()];
        let filter = ObjectFilter::from_list(ObjectFilterMode::Exclude, "cat");
        let input = vec![
            at("person", 0.2, 0.5),
            at("cat", 0.2, 0.5),
            at("person", 0.8, 0.5),
            at("dog", 0.3, 0.3),
        ];

        let zone_first = filter_detections(&zones, &filter, input.clone());
        let object_first = apply_zones(&zones, apply_object_filter(&filter, input));

        assert_eq!(zone_first, object_first);
        let labels: Vec<_> = zone_first.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "dog"]);
        assert!(zone_first.iter().all(|d| d.zone_id.as_deref() == Some("left")));
    }

    #[test]
    fn test_no_configuration_passes_everything() {
        let input = vec![at("person", 0.9, 0.9), at("car", 0.1, 0.1)];
        let out = filter_detections(&[], &ObjectFilter::default(), input.clone());
        assert_eq!(out, input);
    }
}
