//! The detection-triggered recording pipeline.
//!
//! [`Pipeline`] wires the worker pool, the monitor registry and the
//! recording controller together and is the entry point used by the
//! transport layer and the binary.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nvr_media::{FrameDecoder, ModelLoader, RecordingWriter};
use nvr_models::{
    validate_stream_name, CodecParams, Detection, DetectionTask, EncodedPacket, RecordingState,
    RecordingStats,
};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::NvrConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::filter::DetectionFilter;
use crate::monitor::{
    DetectionSink, MonitorConfig, MonitorDeps, MonitorRegistry, MonitorStatus, StreamTransport,
};
use crate::pool::{DetectionWorkerPool, PoolStats, TaskHandler};
use crate::recording::{RecordingController, RecordingOptions};
use crate::store::{ObjectFilterStore, RecordingStore, ZoneStore};

/// External capabilities the pipeline is built on.
#[derive(Clone)]
pub struct PipelineDeps {
    pub decoder: Arc<dyn FrameDecoder>,
    pub loader: Arc<dyn ModelLoader>,
    pub writer: Arc<dyn RecordingWriter>,
    pub zones: Arc<dyn ZoneStore>,
    pub objects: Arc<dyn ObjectFilterStore>,
    pub recordings: Arc<dyn RecordingStore>,
    pub transport: Option<Arc<dyn StreamTransport>>,
    pub clock: Arc<dyn Clock>,
}

/// Executes pool tasks: decode on the worker thread, detect on the
/// stream's monitor thread.
pub struct PipelineTaskHandler {
    monitors: Arc<MonitorRegistry>,
    decoder: Arc<dyn FrameDecoder>,
    clock: Arc<dyn Clock>,
}

impl PipelineTaskHandler {
    pub fn new(
        monitors: Arc<MonitorRegistry>,
        decoder: Arc<dyn FrameDecoder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            monitors,
            decoder,
            clock,
        }
    }
}

impl TaskHandler for PipelineTaskHandler {
    fn handle(&self, task: DetectionTask) -> WorkerResult<()> {
        let stream = task.stream().to_string();
        let downscale = self
            .monitors
            .downscale_for(&stream)
            .ok_or_else(|| WorkerError::stream_not_found(&stream))?;

        let (frames, base_time) = match task {
            DetectionTask::Packet { packet, codec, .. } => {
                if !packet.keyframe {
                    return Ok(());
                }
                match self.decoder.decode_packet(&packet, &codec, downscale)? {
                    Some(frame) => (vec![frame], self.clock.now()),
                    None => return Ok(()),
                }
            }
            DetectionTask::Segment {
                path, captured_at, ..
            } => (self.decoder.decode_keyframes(&path, downscale)?, captured_at),
        };

        if frames.is_empty() {
            return Ok(());
        }
        if !self.monitors.submit_frames(&stream, frames, base_time) {
            debug!(stream = %stream, "Monitor busy, decoded frames dropped");
        }
        Ok(())
    }
}

/// The running pipeline.
pub struct Pipeline {
    pool: DetectionWorkerPool,
    monitors: Arc<MonitorRegistry>,
    recordings: Arc<RecordingController>,
    config: NvrConfig,
}

impl Pipeline {
    pub fn new(config: NvrConfig, deps: PipelineDeps) -> WorkerResult<Self> {
        config.validate()?;

        let recordings = Arc::new(RecordingController::new(
            Arc::clone(&deps.writer),
            Arc::clone(&deps.recordings),
            Arc::clone(&deps.clock),
            config.storage_path.clone(),
        ));

        let monitor_deps = MonitorDeps {
            decoder: Arc::clone(&deps.decoder),
            loader: Arc::clone(&deps.loader),
            filter: DetectionFilter::new(deps.zones, deps.objects),
            sink: Arc::clone(&recordings) as Arc<dyn DetectionSink>,
            transport: deps.transport,
            clock: Arc::clone(&deps.clock),
            settings: config.monitor.clone(),
        };
        let monitors = Arc::new(MonitorRegistry::new(monitor_deps, config.stop_timeout));

        let handler = Arc::new(PipelineTaskHandler::new(
            Arc::clone(&monitors),
            deps.decoder,
            deps.clock,
        ));
        let pool = DetectionWorkerPool::new(config.detection_threads, handler)?;

        info!(
            detection_threads = config.detection_threads,
            storage = %config.storage_path.display(),
            "Pipeline initialized"
        );

        Ok(Self {
            pool,
            monitors,
            recordings,
            config,
        })
    }

    pub fn config(&self) -> &NvrConfig {
        &self.config
    }

    /// Queue a live packet for detection. `false` means the pool is full
    /// and the packet was dropped.
    pub fn submit_live_packet_task(
        &self,
        stream: &str,
        packet: EncodedPacket,
        codec: CodecParams,
    ) -> bool {
        if let Err(e) = validate_stream_name(stream) {
            warn!(error = %e, "Rejected packet task");
            return false;
        }
        self.pool.submit(DetectionTask::Packet {
            stream: stream.to_string(),
            packet,
            codec,
        })
    }

    /// Queue a finished segment for detection. `false` means the pool is
    /// full and the segment was dropped.
    pub fn submit_segment_task(
        &self,
        stream: &str,
        path: PathBuf,
        duration_secs: f64,
        captured_at: DateTime<Utc>,
    ) -> bool {
        if let Err(e) = validate_stream_name(stream) {
            warn!(error = %e, "Rejected segment task");
            return false;
        }
        self.pool.submit(DetectionTask::Segment {
            stream: stream.to_string(),
            path,
            duration_secs,
            captured_at,
        })
    }

    pub fn start_monitor(&self, stream: &str, config: MonitorConfig) -> WorkerResult<()> {
        self.monitors.start_monitor(stream, config)
    }

    pub fn stop_monitor(&self, stream: &str) -> WorkerResult<()> {
        self.monitors.stop_monitor(stream)
    }

    pub fn monitor_status(&self, stream: &str) -> Option<MonitorStatus> {
        self.monitors.status(stream)
    }

    pub fn monitor_statuses(&self) -> Vec<MonitorStatus> {
        self.monitors.statuses()
    }

    pub fn enable_recording(&self, stream: &str, options: RecordingOptions) -> WorkerResult<()> {
        self.recordings.enable(stream, options)
    }

    pub fn disable_recording(&self, stream: &str) -> WorkerResult<()> {
        self.recordings.disable(stream)
    }

    pub fn feed_packet(&self, stream: &str, packet: EncodedPacket) -> WorkerResult<bool> {
        self.recordings.feed_packet(stream, packet)
    }

    pub fn ingest_detection_event(
        &self,
        stream: &str,
        detections: &[Detection],
        frame_time: DateTime<Utc>,
    ) -> WorkerResult<()> {
        self.recordings
            .ingest_detection_event(stream, detections, frame_time)
    }

    pub fn ingest_motion_event(&self, stream: &str, event_time: DateTime<Utc>) -> WorkerResult<()> {
        self.recordings.ingest_motion_event(stream, event_time)
    }

    pub fn get_state(&self, stream: &str) -> RecordingState {
        self.recordings.get_state(stream)
    }

    pub fn get_stats(&self, stream: &str) -> Option<RecordingStats> {
        self.recordings.get_stats(stream)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Advance recording timers.
    pub fn tick(&self) {
        self.recordings.tick();
    }

    pub fn recordings(&self) -> Arc<RecordingController> {
        Arc::clone(&self.recordings)
    }

    /// Stop monitors, then workers, then close every recording.
    pub fn shutdown(&self) {
        info!("Shutting down pipeline");
        self.monitors.stop_all();
        self.pool.shutdown();
        self.recordings.shutdown();
        info!("Pipeline shutdown complete");
    }
}
