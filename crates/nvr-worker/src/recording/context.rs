//! Per-stream recording state machine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nvr_media::{BufferStats, PacketBuffer, RecordingSink, RecordingWriter};
use nvr_models::{
    CodecParams, EncodedPacket, PacketBufferEntry, RecordingMetadata, RecordingState,
    RecordingStats, TriggerType,
};
use tracing::{debug, error, info, warn};

use super::path::unique_recording_path;
use crate::config::RecordingDefaults;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::StreamLogger;
use crate::metrics;
use crate::store::RecordingStore;

/// Recording durations and output format of one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOptions {
    /// Pre-roll window; `0` disables buffering
    pub pre_buffer_secs: u32,
    /// Tail recorded after the last event
    pub post_buffer_secs: u32,
    /// Longest single file before rotation
    pub max_file_duration_secs: u32,
    pub codec: CodecParams,
}

impl RecordingOptions {
    pub fn from_defaults(defaults: &RecordingDefaults, codec: CodecParams) -> Self {
        Self {
            pre_buffer_secs: defaults.pre_buffer_secs,
            post_buffer_secs: defaults.post_buffer_secs,
            max_file_duration_secs: defaults.max_file_duration_secs,
            codec,
        }
    }

    pub fn validate(&self) -> WorkerResult<()> {
        if self.post_buffer_secs == 0 {
            return Err(WorkerError::invalid_input("post_buffer_secs must be positive"));
        }
        if self.max_file_duration_secs == 0 {
            return Err(WorkerError::invalid_input(
                "max_file_duration_secs must be positive",
            ));
        }
        Ok(())
    }

    pub fn buffering_enabled(&self) -> bool {
        self.pre_buffer_secs > 0
    }
}

/// Collaborators shared by every recording context.
#[derive(Clone)]
pub struct RecordingEnv {
    pub writer: Arc<dyn RecordingWriter>,
    pub store: Arc<dyn RecordingStore>,
    pub storage_root: PathBuf,
}

struct OpenFile {
    sink: Box<dyn RecordingSink>,
    recording_id: Option<u64>,
}

/// Recording lifecycle of one stream.
///
/// Every method runs under the owning controller's per-stream lock, so
/// packet writes and state transitions never interleave.
pub struct RecordingContext {
    stream: String,
    options: RecordingOptions,
    state: RecordingState,
    buffer: Option<PacketBuffer>,
    file: Option<OpenFile>,
    trigger: TriggerType,
    sequence: u64,

    last_motion_time: Option<DateTime<Utc>>,
    last_event_time: Option<DateTime<Utc>>,
    recording_start_time: Option<DateTime<Utc>>,
    state_entered_at: DateTime<Utc>,
    buffer_flushed: bool,

    recordings_created: u64,
    events_processed: u64,
    buffer_flushes: u64,
    files_rotated: u64,

    logger: StreamLogger,
}

impl RecordingContext {
    pub fn new(stream: &str, options: RecordingOptions, now: DateTime<Utc>) -> Self {
        let buffer = options
            .buffering_enabled()
            .then(|| PacketBuffer::with_seconds(options.pre_buffer_secs));
        let state = if buffer.is_some() {
            RecordingState::Buffering
        } else {
            RecordingState::Idle
        };

        Self {
            stream: stream.to_string(),
            options,
            state,
            buffer,
            file: None,
            trigger: TriggerType::Detection,
            sequence: 0,
            last_motion_time: None,
            last_event_time: None,
            recording_start_time: None,
            state_entered_at: now,
            buffer_flushed: false,
            recordings_created: 0,
            events_processed: 0,
            buffer_flushes: 0,
            files_rotated: 0,
            logger: StreamLogger::new(stream, "recording"),
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn options(&self) -> &RecordingOptions {
        &self.options
    }

    pub fn state_entered_at(&self) -> DateTime<Utc> {
        self.state_entered_at
    }

    /// Whether the current recording started with a non-empty pre-roll.
    pub fn buffer_flushed(&self) -> bool {
        self.buffer_flushed
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.sink.path())
    }

    pub fn buffer_stats(&self) -> Option<BufferStats> {
        self.buffer.as_ref().map(|b| b.stats())
    }

    pub fn stats(&self) -> RecordingStats {
        RecordingStats {
            state: self.state,
            recordings_created: self.recordings_created,
            events_processed: self.events_processed,
            buffer_flushes: self.buffer_flushes,
            files_rotated: self.files_rotated,
            current_path: self.current_path().map(|p| p.display().to_string()),
            last_event_time: self.last_event_time,
            recording_start_time: self.recording_start_time,
        }
    }

    fn enter(&mut self, state: RecordingState, now: DateTime<Utc>) {
        if self.state != state {
            debug!(
                stream = %self.stream,
                from = %self.state,
                to = %state,
                "Recording state transition"
            );
            self.state = state;
            self.state_entered_at = now;
            metrics::set_recording_state(&self.stream, state.as_gauge());
        }
    }

    /// Append a live packet to the pre-roll buffer and, while a file is
    /// open, to the file as well.
    ///
    /// The buffer keeps filling during a recording so that a recording
    /// started right after this one closes still has its pre-roll.
    pub fn feed_packet(&mut self, env: &RecordingEnv, packet: EncodedPacket, now: DateTime<Utc>) {
        self.sequence += 1;
        let entry = PacketBufferEntry::from_packet(packet, self.sequence);

        let write_result = self.file.as_mut().map(|file| {
            file.sink
                .write_packet(&entry)
                .map_err(|e| (file.sink.path().to_path_buf(), e))
        });

        if let Some(buffer) = &self.buffer {
            buffer.push(entry);
        }

        if let Some(Err((path, e))) = write_result {
            error!(
                stream = %self.stream,
                path = %path.display(),
                error = %e,
                "Recording write failed, closing file"
            );
            self.finish(env, now);
        }
    }

    /// Handle a detection or motion event.
    pub fn on_event(
        &mut self,
        env: &RecordingEnv,
        trigger: TriggerType,
        event_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> WorkerResult<()> {
        self.events_processed += 1;
        self.last_event_time = Some(event_time);
        self.last_motion_time = Some(now);

        match self.state {
            RecordingState::Idle | RecordingState::Buffering => {
                self.start_recording(env, trigger, now)
            }
            RecordingState::PostRoll => {
                debug!(stream = %self.stream, "Event during post-roll, recording continues");
                self.enter(RecordingState::Recording, now);
                Ok(())
            }
            RecordingState::Recording | RecordingState::Finalizing => Ok(()),
        }
    }

    fn open_file(
        &mut self,
        env: &RecordingEnv,
        trigger: TriggerType,
        now: DateTime<Utc>,
    ) -> WorkerResult<()> {
        let path = unique_recording_path(&env.storage_root, &self.stream, now, trigger);
        let sink = env.writer.open(&path, &self.options.codec)?;

        let metadata = RecordingMetadata {
            id: 0,
            stream_name: self.stream.clone(),
            file_path: path.display().to_string(),
            start_time: now,
            end_time: None,
            size_bytes: 0,
            width: self.options.codec.width,
            height: self.options.codec.height,
            fps: self.options.codec.fps,
            codec: self.options.codec.codec.clone(),
            is_complete: false,
            trigger,
        };
        let recording_id = match env.store.add_recording(&metadata) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(stream = %self.stream, error = %e, "Failed to persist recording metadata");
                None
            }
        };

        self.file = Some(OpenFile {
            sink,
            recording_id,
        });
        self.recording_start_time = Some(now);
        Ok(())
    }

    fn start_recording(
        &mut self,
        env: &RecordingEnv,
        trigger: TriggerType,
        now: DateTime<Utc>,
    ) -> WorkerResult<()> {
        self.open_file(env, trigger, now)?;
        self.trigger = trigger;

        // Pre-roll goes in before any live packet.
        let preroll = self
            .buffer
            .as_ref()
            .map(|b| b.drain_from_keyframe())
            .unwrap_or_default();
        self.buffer_flushed = !preroll.is_empty();
        if self.buffer_flushed {
            self.buffer_flushes += 1;
            metrics::record_preroll_packets(&self.stream, preroll.len());
        }

        let mut write_error = None;
        if let Some(file) = self.file.as_mut() {
            for entry in &preroll {
                if let Err(e) = file.sink.write_packet(entry) {
                    write_error = Some(e);
                    break;
                }
            }
        }

        self.recordings_created += 1;
        metrics::record_recording_started(&self.stream, trigger.as_str());
        self.enter(RecordingState::Recording, now);
        self.logger.log_event(&format!(
            "Recording started ({}), {} pre-roll packets, file {}",
            trigger,
            preroll.len(),
            self.current_path().map(|p| p.display().to_string()).unwrap_or_default()
        ));

        if let Some(e) = write_error {
            self.finish(env, now);
            return Err(WorkerError::recording_failed(format!(
                "pre-roll write failed: {}",
                e
            )));
        }
        Ok(())
    }

    /// Close the open file, if any, and persist its completion.
    fn close_file(&mut self, env: &RecordingEnv, now: DateTime<Utc>) {
        let Some(file) = self.file.take() else {
            return;
        };

        let path = file.sink.path().to_path_buf();
        let size = match file.sink.finish() {
            Ok(size) => size,
            Err(e) => {
                error!(
                    stream = %self.stream,
                    path = %path.display(),
                    error = %e,
                    "Failed to finalize recording"
                );
                std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0)
            }
        };

        if let Some(id) = file.recording_id {
            if let Err(e) = env.store.complete_recording(id, now, size) {
                warn!(stream = %self.stream, recording_id = id, error = %e, "Failed to mark recording complete");
            }
        }
        metrics::record_recording_completed(&self.stream);
        info!(
            stream = %self.stream,
            path = %path.display(),
            size_bytes = size,
            "Recording closed"
        );
    }

    /// Flush and close the file, ending in `Idle`.
    fn finish(&mut self, env: &RecordingEnv, now: DateTime<Utc>) {
        self.enter(RecordingState::Finalizing, now);
        self.close_file(env, now);
        self.recording_start_time = None;
        self.buffer_flushed = false;
        self.enter(RecordingState::Idle, now);
    }

    fn rotate(&mut self, env: &RecordingEnv, now: DateTime<Utc>) {
        self.close_file(env, now);
        self.files_rotated += 1;
        metrics::record_file_rotation(&self.stream);

        match self.open_file(env, self.trigger, now) {
            Ok(()) => self.logger.log_event("Recording file rotated"),
            Err(e) => {
                error!(stream = %self.stream, error = %e, "Failed to open rotated recording file");
                self.recording_start_time = None;
                self.enter(RecordingState::Idle, now);
            }
        }
    }

    /// Advance time-based transitions.
    pub fn tick(&mut self, env: &RecordingEnv, now: DateTime<Utc>) {
        match self.state {
            RecordingState::Idle => {
                if self.buffer.is_some() {
                    self.enter(RecordingState::Buffering, now);
                }
            }
            RecordingState::Buffering => {}
            RecordingState::Recording | RecordingState::PostRoll => {
                let max_file = chrono::Duration::seconds(self.options.max_file_duration_secs as i64);
                if let Some(start) = self.recording_start_time {
                    if now - start >= max_file {
                        self.rotate(env, now);
                        if self.state == RecordingState::Idle {
                            return;
                        }
                    }
                }

                let since_motion = self
                    .last_motion_time
                    .map(|t| now - t)
                    .unwrap_or_else(chrono::Duration::zero);
                let post_buffer = chrono::Duration::seconds(self.options.post_buffer_secs as i64);

                if since_motion >= post_buffer {
                    self.finish(env, now);
                } else if self.state == RecordingState::Recording
                    && since_motion > chrono::Duration::zero()
                {
                    self.enter(RecordingState::PostRoll, now);
                }
            }
            RecordingState::Finalizing => self.finish(env, now),
        }

        if let Some(buffer) = &self.buffer {
            metrics::set_buffer_bytes(&self.stream, buffer.stats().bytes);
        }
    }

    /// Close any open file immediately and return to `Idle`.
    pub fn force_stop(&mut self, env: &RecordingEnv, now: DateTime<Utc>) {
        if self.file.is_some() {
            self.logger.log_stop("recording force-stopped");
            self.finish(env, now);
        } else {
            self.enter(RecordingState::Idle, now);
        }
    }

    /// Apply new options. A changed pre-roll window replaces the buffer.
    pub fn update_options(&mut self, options: RecordingOptions, now: DateTime<Utc>) -> WorkerResult<()> {
        options.validate()?;

        if options.pre_buffer_secs != self.options.pre_buffer_secs {
            self.buffer = options
                .buffering_enabled()
                .then(|| PacketBuffer::with_seconds(options.pre_buffer_secs));
            if self.buffer.is_none() && self.state == RecordingState::Buffering {
                self.enter(RecordingState::Idle, now);
            }
        }

        self.options = options;
        self.logger.log_event(&format!(
            "Recording options updated: pre={}s post={}s max_file={}s",
            self.options.pre_buffer_secs,
            self.options.post_buffer_secs,
            self.options.max_file_duration_secs
        ));
        Ok(())
    }
}

impl Drop for RecordingContext {
    fn drop(&mut self) {
        if self.file.is_some() {
            warn!(stream = %self.stream, "Recording context dropped with an open file");
        }
    }
}
