//! Persistence capabilities consumed by the pipeline.
//!
//! The SQL layer lives outside this crate; the pipeline only needs
//! read access to zones and object filters and two recording writes.
//! [`MemoryStore`] implements all three for the binary and for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use nvr_models::{
    validate_stream_name, DetectionZone, ObjectFilter, RecordingMetadata, MAX_ZONES_PER_STREAM,
};

use crate::error::{WorkerError, WorkerResult};

/// Read access to detection zones.
pub trait ZoneStore: Send + Sync {
    /// All zones configured for `stream`, enabled or not.
    fn zones_for_stream(&self, stream: &str) -> WorkerResult<Vec<DetectionZone>>;
}

/// Read access to per-stream object filters.
pub trait ObjectFilterStore: Send + Sync {
    fn object_filter(&self, stream: &str) -> WorkerResult<ObjectFilter>;
}

/// Recording metadata writes.
pub trait RecordingStore: Send + Sync {
    /// Persist a new recording row and return its id.
    fn add_recording(&self, metadata: &RecordingMetadata) -> WorkerResult<u64>;

    /// Mark a recording complete with its end time and final size.
    fn complete_recording(&self, id: u64, end_time: DateTime<Utc>, size_bytes: u64)
        -> WorkerResult<()>;
}

/// In-memory implementation of every store trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    zones: RwLock<HashMap<String, Vec<DetectionZone>>>,
    filters: RwLock<HashMap<String, ObjectFilter>>,
    recordings: RwLock<Vec<RecordingMetadata>>,
    next_id: AtomicU64,
}

fn read<T>(lock: &RwLock<T>) -> WorkerResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| WorkerError::store_failed("store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> WorkerResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| WorkerError::store_failed("store lock poisoned"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the zones of `stream`.
    ///
    /// The whole set is validated first; on error nothing changes.
    pub fn set_zones(&self, stream: &str, zones: Vec<DetectionZone>) -> WorkerResult<()> {
        validate_stream_name(stream)?;
        if zones.len() > MAX_ZONES_PER_STREAM {
            return Err(WorkerError::invalid_input(format!(
                "{} zones exceeds the limit of {}",
                zones.len(),
                MAX_ZONES_PER_STREAM
            )));
        }
        for zone in &zones {
            zone.validate()?;
            if zone.stream_name != stream {
                return Err(WorkerError::invalid_input(format!(
                    "zone {} belongs to stream {}, not {}",
                    zone.id, zone.stream_name, stream
                )));
            }
        }

        write(&self.zones)?.insert(stream.to_string(), zones);
        Ok(())
    }

    pub fn set_object_filter(&self, stream: &str, filter: ObjectFilter) -> WorkerResult<()> {
        validate_stream_name(stream)?;
        write(&self.filters)?.insert(stream.to_string(), filter);
        Ok(())
    }

    /// Snapshot of all recording rows.
    pub fn recordings(&self) -> Vec<RecordingMetadata> {
        read(&self.recordings)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}

impl ZoneStore for MemoryStore {
    fn zones_for_stream(&self, stream: &str) -> WorkerResult<Vec<DetectionZone>> {
        Ok(read(&self.zones)?.get(stream).cloned().unwrap_or_default())
    }
}

impl ObjectFilterStore for MemoryStore {
    fn object_filter(&self, stream: &str) -> WorkerResult<ObjectFilter> {
        Ok(read(&self.filters)?.get(stream).cloned().unwrap_or_default())
    }
}

impl RecordingStore for MemoryStore {
    fn add_recording(&self, metadata: &RecordingMetadata) -> WorkerResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut row = metadata.clone();
        row.id = id;
        write(&self.recordings)?.push(row);
        Ok(id)
    }

    fn complete_recording(
        &self,
        id: u64,
        end_time: DateTime<Utc>,
        size_bytes: u64,
    ) -> WorkerResult<()> {
        let mut rows = write(&self.recordings)?;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| WorkerError::store_failed(format!("recording {} not found", id)))?;
        row.end_time = Some(end_time);
        row.size_bytes = size_bytes;
        row.is_complete = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvr_models::{ObjectFilterMode, TriggerType, ZonePoint};

    fn triangle(stream: &str) -> DetectionZone {
        DetectionZone::new(
            "z1",
            stream,
            vec![
                ZonePoint::new(0.0, 0.0),
                ZonePoint::new(1.0, 0.0),
                ZonePoint::new(0.0, 1.0),
            ],
        )
    }

    #[test]
    fn test_set_zones_rejects_malformed_polygon() {
        let store = MemoryStore::new();
        store.set_zones("cam1", vec![triangle("cam1")]).unwrap();

        let mut bad = triangle("cam1");
        bad.polygon.truncate(2);
        assert!(store.set_zones("cam1", vec![bad]).is_err());

        // Previous zones survive the rejected update
        assert_eq!(store.zones_for_stream("cam1").unwrap().len(), 1);
    }

    #[test]
    fn test_set_zones_rejects_foreign_stream() {
        let store = MemoryStore::new();
        assert!(store.set_zones("cam1", vec![triangle("cam2")]).is_err());
        assert!(store.set_zones("", vec![]).is_err());
    }

    #[test]
    fn test_object_filter_defaults_to_pass_through() {
        let store = MemoryStore::new();
        assert!(store.object_filter("cam1").unwrap().is_pass_through());

        store
            .set_object_filter(
                "cam1",
                ObjectFilter::from_list(ObjectFilterMode::Include, "person"),
            )
            .unwrap();
        assert!(!store.object_filter("cam1").unwrap().is_pass_through());
    }

    #[test]
    fn test_recording_lifecycle() {
        let store = MemoryStore::new();
        let start = Utc::now();
        let metadata = RecordingMetadata {
            id: 0,
            stream_name: "cam1".to_string(),
            file_path: "/tmp/cam1.mp4".to_string(),
            start_time: start,
            end_time: None,
            size_bytes: 0,
            width: 1280,
            height: 720,
            fps: 15,
            codec: "h264".to_string(),
            is_complete: false,
            trigger: TriggerType::Detection,
        };

        let id = store.add_recording(&metadata).unwrap();
        assert_eq!(id, 1);
        store.complete_recording(id, start, 4096).unwrap();

        let rows = store.recordings();
        assert!(rows[0].is_complete);
        assert_eq!(rows[0].size_bytes, 4096);
        assert!(store.complete_recording(99, start, 0).is_err());
    }
}
