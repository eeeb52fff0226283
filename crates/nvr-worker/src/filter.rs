//! Store-backed zone and object filtering.

use std::sync::Arc;

use nvr_media::filter_detections;
use nvr_models::{Detection, ObjectFilter};
use tracing::warn;

use crate::store::{ObjectFilterStore, ZoneStore};

/// Loads a stream's zones and object filter and applies them to a batch.
#[derive(Clone)]
pub struct DetectionFilter {
    zones: Arc<dyn ZoneStore>,
    objects: Arc<dyn ObjectFilterStore>,
}

impl DetectionFilter {
    pub fn new(zones: Arc<dyn ZoneStore>, objects: Arc<dyn ObjectFilterStore>) -> Self {
        Self { zones, objects }
    }

    /// Filter `detections` for `stream`.
    ///
    /// A configuration read failure leaves that stage unfiltered; losing
    /// detections to a flaky store is worse than over-recording.
    pub fn filter(&self, stream: &str, detections: Vec<Detection>) -> Vec<Detection> {
        if detections.is_empty() {
            return detections;
        }

        let zones = self.zones.zones_for_stream(stream).unwrap_or_else(|e| {
            warn!(stream = %stream, error = %e, "Failed to load detection zones");
            Vec::new()
        });
        let objects = self.objects.object_filter(stream).unwrap_or_else(|e| {
            warn!(stream = %stream, error = %e, "Failed to load object filter");
            ObjectFilter::default()
        });

        filter_detections(&zones, &objects, detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{WorkerError, WorkerResult};
    use crate::store::MemoryStore;
    use nvr_models::{DetectionZone, ObjectFilterMode, ZonePoint};

    struct BrokenStore;

    impl ZoneStore for BrokenStore {
        fn zones_for_stream(&self, _stream: &str) -> WorkerResult<Vec<DetectionZone>> {
            Err(WorkerError::store_failed("database is locked"))
        }
    }

    impl ObjectFilterStore for BrokenStore {
        fn object_filter(&self, _stream: &str) -> WorkerResult<ObjectFilter> {
            Err(WorkerError::store_failed("database is locked"))
        }
    }

    fn at(label: &str, cx: f32, cy: f32) -> Detection {
        Detection::new(label, 0.9, cx - 0.05, cy - 0.05, 0.1, 0.1)
    }

    #[test]
    fn test_zone_and_object_stages_combine() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_zones(
                "cam1",
                vec![DetectionZone::new(
                    "porch",
                    "cam1",
                    vec![
                        ZonePoint::new(0.0, 0.0),
                        ZonePoint::new(0.5, 0.0),
                        ZonePoint::new(0.5, 0.5),
                        ZonePoint::new(0.0, 0.5),
                    ],
                )],
            )
            .unwrap();
        store
            .set_object_filter("cam1", ObjectFilter::from_list(ObjectFilterMode::Exclude, "cat"))
            .unwrap();

        let filter = DetectionFilter::new(store.clone(), store);
        let kept = filter.filter(
            "cam1",
            vec![at("person", 0.1, 0.1), at("cat", 0.1, 0.1), at("person", 0.75, 0.75)],
        );

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].label, "person");
        assert_eq!(kept[0].zone_id.as_deref(), Some("porch"));
    }

    #[test]
    fn test_store_failure_passes_through() {
        let broken = Arc::new(BrokenStore);
        let filter = DetectionFilter::new(broken.clone(), broken);
        let kept = filter.filter("cam1", vec![at("dog", 0.9, 0.9)]);
        assert_eq!(kept.len(), 1);
    }
}
