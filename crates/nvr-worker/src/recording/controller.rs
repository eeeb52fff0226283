//! Stream-keyed owner of recording contexts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use nvr_media::{BufferStats, Frame, RecordingWriter};
use nvr_models::{
    validate_stream_name, Detection, EncodedPacket, RecordingState, RecordingStats, TriggerType,
};
use tracing::{debug, error, info, warn};

use super::context::{RecordingContext, RecordingEnv, RecordingOptions};
use crate::clock::Clock;
use crate::error::{WorkerError, WorkerResult};
use crate::monitor::DetectionSink;
use crate::store::RecordingStore;

type SharedContext = Arc<Mutex<RecordingContext>>;

fn lock_context(ctx: &SharedContext) -> WorkerResult<MutexGuard<'_, RecordingContext>> {
    ctx.lock()
        .map_err(|_| WorkerError::recording_failed("recording context lock poisoned"))
}

/// Runs the recording state machine of every enabled stream.
///
/// Each stream has its own lock; the map lock is only held to look a
/// context up, so streams never serialize on each other.
pub struct RecordingController {
    contexts: RwLock<HashMap<String, SharedContext>>,
    env: RecordingEnv,
    clock: Arc<dyn Clock>,
}

impl RecordingController {
    pub fn new(
        writer: Arc<dyn RecordingWriter>,
        store: Arc<dyn RecordingStore>,
        clock: Arc<dyn Clock>,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            env: RecordingEnv {
                writer,
                store,
                storage_root: storage_root.into(),
            },
            clock,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SharedContext>> {
        self.contexts.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SharedContext>> {
        self.contexts.write().unwrap_or_else(|p| p.into_inner())
    }

    fn context(&self, stream: &str) -> Option<SharedContext> {
        self.read().get(stream).cloned()
    }

    fn require(&self, stream: &str) -> WorkerResult<SharedContext> {
        validate_stream_name(stream)?;
        self.context(stream)
            .ok_or_else(|| WorkerError::stream_not_found(stream))
    }

    fn snapshot(&self) -> Vec<(String, SharedContext)> {
        self.read()
            .iter()
            .map(|(name, ctx)| (name.clone(), Arc::clone(ctx)))
            .collect()
    }

    /// Enable detection-based recording for `stream`. Enabling an enabled
    /// stream applies the new options.
    pub fn enable(&self, stream: &str, options: RecordingOptions) -> WorkerResult<()> {
        validate_stream_name(stream)?;
        options.validate()?;

        if let Some(ctx) = self.context(stream) {
            return lock_context(&ctx)?.update_options(options, self.clock.now());
        }

        let ctx = RecordingContext::new(stream, options, self.clock.now());
        self.write()
            .entry(stream.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ctx)));
        info!(stream = %stream, "Recording enabled");
        Ok(())
    }

    /// Disable recording for `stream`, closing any open file. Disabling a
    /// stream that is not enabled succeeds.
    pub fn disable(&self, stream: &str) -> WorkerResult<()> {
        validate_stream_name(stream)?;
        let Some(ctx) = self.write().remove(stream) else {
            return Ok(());
        };
        lock_context(&ctx)?.force_stop(&self.env, self.clock.now());
        info!(stream = %stream, "Recording disabled");
        Ok(())
    }

    pub fn is_enabled(&self, stream: &str) -> bool {
        self.read().contains_key(stream)
    }

    pub fn update_config(&self, stream: &str, options: RecordingOptions) -> WorkerResult<()> {
        let ctx = self.require(stream)?;
        let mut ctx = lock_context(&ctx)?;
        ctx.update_options(options, self.clock.now())
    }

    /// Feed a live packet. Returns `false` when recording is not enabled
    /// for `stream`.
    pub fn feed_packet(&self, stream: &str, packet: EncodedPacket) -> WorkerResult<bool> {
        validate_stream_name(stream)?;
        let Some(ctx) = self.context(stream) else {
            return Ok(false);
        };
        lock_context(&ctx)?.feed_packet(&self.env, packet, self.clock.now());
        Ok(true)
    }

    fn ingest(
        &self,
        stream: &str,
        trigger: TriggerType,
        event_time: DateTime<Utc>,
    ) -> WorkerResult<()> {
        let ctx = self.require(stream)?;
        let mut ctx = lock_context(&ctx)?;
        ctx.on_event(&self.env, trigger, event_time, self.clock.now())
    }

    /// Feed a batch of accepted detections. An empty batch is not an event.
    pub fn ingest_detection_event(
        &self,
        stream: &str,
        detections: &[Detection],
        frame_time: DateTime<Utc>,
    ) -> WorkerResult<()> {
        validate_stream_name(stream)?;
        if detections.is_empty() {
            return Ok(());
        }
        self.ingest(stream, TriggerType::Detection, frame_time)
    }

    pub fn ingest_motion_event(&self, stream: &str, event_time: DateTime<Utc>) -> WorkerResult<()> {
        self.ingest(stream, TriggerType::Motion, event_time)
    }

    /// Start or extend a recording on operator request.
    pub fn trigger_manual(&self, stream: &str) -> WorkerResult<()> {
        self.ingest(stream, TriggerType::Manual, self.clock.now())
    }

    /// Advance timers of every stream.
    pub fn tick(&self) {
        let now = self.clock.now();
        for (stream, ctx) in self.snapshot() {
            match lock_context(&ctx) {
                Ok(mut ctx) => ctx.tick(&self.env, now),
                Err(e) => error!(stream = %stream, error = %e, "Skipping recording tick"),
            }
        }
    }

    /// Close the open file of `stream` now. No-op without a recording.
    pub fn force_stop(&self, stream: &str) -> WorkerResult<()> {
        validate_stream_name(stream)?;
        let Some(ctx) = self.context(stream) else {
            return Ok(());
        };
        lock_context(&ctx)?.force_stop(&self.env, self.clock.now());
        Ok(())
    }

    /// Force-stop every stream.
    pub fn shutdown(&self) {
        let now = self.clock.now();
        for (stream, ctx) in self.snapshot() {
            match lock_context(&ctx) {
                Ok(mut ctx) => ctx.force_stop(&self.env, now),
                Err(e) => error!(stream = %stream, error = %e, "Failed to stop recording"),
            }
        }
        info!("Recording controller stopped");
    }

    /// Current state; streams without recording enabled are `Idle`.
    pub fn get_state(&self, stream: &str) -> RecordingState {
        self.context(stream)
            .and_then(|ctx| lock_context(&ctx).ok().map(|c| c.state()))
            .unwrap_or(RecordingState::Idle)
    }

    pub fn get_stats(&self, stream: &str) -> Option<RecordingStats> {
        let ctx = self.context(stream)?;
        let ctx = lock_context(&ctx).ok()?;
        Some(ctx.stats())
    }

    pub fn current_recording_path(&self, stream: &str) -> Option<PathBuf> {
        let ctx = self.context(stream)?;
        let ctx = lock_context(&ctx).ok()?;
        ctx.current_path().map(|p| p.to_path_buf())
    }

    pub fn buffer_stats(&self, stream: &str) -> Option<BufferStats> {
        let ctx = self.context(stream)?;
        let ctx = lock_context(&ctx).ok()?;
        ctx.buffer_stats()
    }

    pub fn streams(&self) -> Vec<String> {
        let mut streams: Vec<String> = self.read().keys().cloned().collect();
        streams.sort();
        streams
    }
}

impl DetectionSink for RecordingController {
    fn on_detections(
        &self,
        stream: &str,
        _frame: &Frame,
        detections: &[Detection],
        frame_time: DateTime<Utc>,
    ) {
        match self.ingest_detection_event(stream, detections, frame_time) {
            Ok(()) => {}
            Err(WorkerError::StreamNotFound(_)) => {
                debug!(stream = %stream, "Detections for stream without recording");
            }
            Err(e) => warn!(stream = %stream, error = %e, "Failed to ingest detections"),
        }
    }
}
