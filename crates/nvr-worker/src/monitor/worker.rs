//! The monitor thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use nvr_media::{resolve_model_path, Detector, Frame, MediaError};
use nvr_models::{ModelType, MAX_DETECTIONS};
use tracing::{debug, info, warn};

use super::resources::{available_memory_mb, downscale_for};
use super::segments::newest_segment;
use super::{MonitorConfig, MonitorDeps, MonitorInput, MonitorStatus};
use crate::logging::StreamLogger;
use crate::metrics;
use crate::retry::{FailureTracker, RetryBudget};

const SLEEP_CHUNK: Duration = Duration::from_millis(50);

/// State shared between a monitor thread and its registry handle.
#[derive(Debug)]
pub(super) struct MonitorShared {
    pub running: AtomicBool,
    pub status: Mutex<MonitorStatus>,
}

impl MonitorShared {
    pub fn new(stream: &str) -> Self {
        Self {
            running: AtomicBool::new(true),
            status: Mutex::new(MonitorStatus {
                stream: stream.to_string(),
                running: true,
                ..Default::default()
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn status(&self) -> MonitorStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }
}

pub(super) struct StreamMonitor {
    stream: String,
    config: MonitorConfig,
    deps: MonitorDeps,
    shared: Arc<MonitorShared>,
    inbox: Receiver<MonitorInput>,
    logger: StreamLogger,

    model: Option<Box<dyn Detector>>,
    model_type: ModelType,
    threshold: f32,
    load_budget: RetryBudget,

    last_detection: Option<Instant>,
    last_detection_time: Option<DateTime<Utc>>,
    last_processed: Option<PathBuf>,
    consecutive_failures: u32,
    empty_checks: u32,
    scan_failures: FailureTracker,
    decode_failures: FailureTracker,
    segments_processed: u64,
    detections_forwarded: u64,
}

impl StreamMonitor {
    pub fn new(
        stream: &str,
        config: MonitorConfig,
        deps: MonitorDeps,
        shared: Arc<MonitorShared>,
        inbox: Receiver<MonitorInput>,
    ) -> Self {
        let model_type = ModelType::from_path(&config.model_path);
        let threshold = if config.threshold > 0.0 {
            config.threshold
        } else {
            model_type.default_threshold()
        };
        let settings = &deps.settings;
        let load_budget =
            RetryBudget::new(settings.max_model_load_retries, settings.model_retry_interval);
        let scan_failures = FailureTracker::new(settings.max_logged_failures);
        let decode_failures = FailureTracker::new(settings.max_logged_failures);

        Self {
            stream: stream.to_string(),
            logger: StreamLogger::new(stream, "monitor"),
            config,
            deps,
            shared,
            inbox,
            model: None,
            model_type,
            threshold,
            load_budget,
            last_detection: None,
            last_detection_time: None,
            last_processed: None,
            consecutive_failures: 0,
            empty_checks: 0,
            scan_failures,
            decode_failures,
            segments_processed: 0,
            detections_forwarded: 0,
        }
    }

    /// Thread body. Returns only after a stop request.
    pub fn run(mut self) {
        let span = self.logger.create_span();
        let _enter = span.enter();

        self.logger.log_start(&format!(
            "model={} threshold={} interval={:?} dir={}",
            self.config.model_path.display(),
            self.threshold,
            self.config.detection_interval,
            self.config.segment_dir.display()
        ));

        if self.sleep_while_running(self.deps.settings.startup_delay) {
            self.try_load_model(Instant::now());
            let mut last_status_log = Instant::now();

            while self.shared.is_running() {
                self.drain_inbox();
                self.maintain_model(Instant::now());
                let processed = self.poll_segments();
                self.publish_status();

                if last_status_log.elapsed() >= self.deps.settings.status_log_interval {
                    self.log_status();
                    last_status_log = Instant::now();
                }

                let wait = if processed {
                    self.deps.settings.polling.fast
                } else {
                    self.deps.settings.polling.interval_for(self.empty_checks)
                };
                self.sleep_while_running(wait);
            }
        }

        self.unload_model();
        if let Ok(mut status) = self.shared.status.lock() {
            status.running = false;
            status.model_loaded = false;
        }
        self.logger.log_stop(&format!(
            "{} segments processed, {} detections forwarded",
            self.segments_processed, self.detections_forwarded
        ));
    }

    /// Sleep in short chunks so a stop request is observed promptly.
    /// Returns whether the monitor is still running.
    fn sleep_while_running(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while self.shared.is_running() {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_CHUNK.min(deadline - now));
        }
        false
    }

    fn maintain_model(&mut self, now: Instant) {
        if self.model.is_some() {
            return;
        }

        if !self.load_budget.is_exhausted() {
            if self.load_budget.can_attempt(now) {
                self.try_load_model(now);
            }
            return;
        }

        // Out of attempts: keep watching for the file to come back.
        if self.load_budget.interval_elapsed(now) {
            self.load_budget.touch(now);
            if resolve_model_path(&self.config.model_path, &self.deps.settings.model_search_dirs)
                .is_ok()
            {
                self.logger
                    .log_event("Model file is available again, resuming load attempts");
                self.load_budget.reset();
                self.try_load_model(now);
            }
        }
    }

    fn try_load_model(&mut self, now: Instant) {
        self.load_budget.record_attempt(now);

        let result = resolve_model_path(
            &self.config.model_path,
            &self.deps.settings.model_search_dirs,
        )
        .and_then(|path| self.deps.loader.load(&path, self.threshold));

        match result {
            Ok(model) => {
                info!(
                    stream = %self.stream,
                    model_type = %model.model_type(),
                    threshold = model.threshold(),
                    attempt = self.load_budget.attempts(),
                    "Detection model loaded"
                );
                self.model = Some(model);
            }
            Err(e) => {
                metrics::record_model_load_failure(&self.stream);
                warn!(
                    stream = %self.stream,
                    attempt = self.load_budget.attempts(),
                    max_attempts = self.load_budget.max_attempts(),
                    error = %e,
                    "Failed to load detection model"
                );
                if self.load_budget.is_exhausted() {
                    self.logger.log_warning(
                        "Model load attempts exhausted; monitor keeps polling without detection",
                    );
                }
            }
        }
    }

    fn unload_model(&mut self) {
        if let Some(model) = self.model.take() {
            drop(model);
            debug!(stream = %self.stream, "Detection model unloaded");
        }
    }

    fn detection_due(&self, now: Instant) -> bool {
        match self.last_detection {
            Some(last) => now.saturating_duration_since(last) >= self.config.detection_interval,
            None => true,
        }
    }

    /// Scan the segment directory. Returns whether a new segment was
    /// processed.
    fn poll_segments(&mut self) -> bool {
        match newest_segment(&self.config.segment_dir) {
            Ok(Some(segment)) => {
                self.consecutive_failures = 0;
                self.scan_failures.record_success();

                if self.last_processed.as_ref() == Some(&segment.path) {
                    self.empty_checks = self.empty_checks.saturating_add(1);
                    return false;
                }
                if !self.detection_due(Instant::now()) {
                    return false;
                }

                self.process_segment(&segment.path);
                self.last_processed = Some(segment.path);
                self.empty_checks = 0;
                true
            }
            Ok(None) => {
                self.record_scan_failure("no segments in directory");
                false
            }
            Err(e) => {
                self.record_scan_failure(&e.to_string());
                false
            }
        }
    }

    fn record_scan_failure(&mut self, reason: &str) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.empty_checks = self.empty_checks.saturating_add(1);

        if self.scan_failures.record_failure() {
            warn!(
                stream = %self.stream,
                dir = %self.config.segment_dir.display(),
                consecutive_failures = self.consecutive_failures,
                reason,
                "Segment scan failed"
            );
        }

        if self.consecutive_failures >= self.deps.settings.failure_restart_threshold {
            self.self_heal();
        }
    }

    /// Recreate the segment directory and restart the transport.
    fn self_heal(&mut self) {
        self.logger.log_warning(&format!(
            "{} consecutive scan failures, restarting stream",
            self.consecutive_failures
        ));

        if let Err(e) = std::fs::create_dir_all(&self.config.segment_dir) {
            warn!(
                stream = %self.stream,
                dir = %self.config.segment_dir.display(),
                error = %e,
                "Failed to create segment directory"
            );
        }

        if let Some(transport) = self.deps.transport.clone() {
            if transport.is_active(&self.stream) {
                if let Err(e) = transport.stop(&self.stream) {
                    warn!(stream = %self.stream, error = %e, "Failed to stop transport");
                }
                self.sleep_while_running(self.deps.settings.transport_restart_pause);
            } else {
                debug!(stream = %self.stream, "Transport not active, starting it");
            }
            match transport.start(&self.stream) {
                Ok(()) => info!(stream = %self.stream, "Transport restarted"),
                Err(e) => warn!(stream = %self.stream, error = %e, "Failed to start transport"),
            }
            metrics::record_transport_restart(&self.stream);
        }

        self.consecutive_failures = 0;
    }

    fn downscale(&self) -> u32 {
        downscale_for(
            self.model_type,
            available_memory_mb(),
            self.deps.settings.low_memory_threshold_mb,
        )
    }

    fn process_segment(&mut self, path: &Path) {
        if self.model.is_none() {
            debug!(stream = %self.stream, path = %path.display(), "No model loaded, segment skipped");
            return;
        }

        let started = Instant::now();
        self.last_detection = Some(started);

        match self.deps.decoder.decode_keyframes(path, self.downscale()) {
            Ok(frames) => {
                self.decode_failures.record_success();
                let base_time = self.deps.clock.now();
                self.detect_frames(frames, base_time, false);
                self.segments_processed += 1;
                metrics::record_segment_processed(&self.stream, started.elapsed().as_secs_f64());
            }
            Err(MediaError::FileNotFound(_)) => {
                debug!(stream = %self.stream, path = %path.display(), "Segment vanished before decode");
            }
            Err(e) => {
                metrics::record_decode_failure(&self.stream);
                if self.decode_failures.record_failure() {
                    warn!(
                        stream = %self.stream,
                        path = %path.display(),
                        error = %e,
                        "Failed to decode segment"
                    );
                }
            }
        }
    }

    fn drain_inbox(&mut self) {
        loop {
            match self.inbox.try_recv() {
                Ok(MonitorInput::Frames { frames, base_time }) => {
                    let now = Instant::now();
                    if self.model.is_none() || !self.detection_due(now) {
                        continue;
                    }
                    self.last_detection = Some(now);
                    self.detect_frames(frames, base_time, true);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
            }
        }
    }

    /// Run detection over `frames`, forwarding accepted detections.
    ///
    /// With `offset_by_pts` the frame time is `base_time` plus the frame's
    /// presentation time; otherwise every frame is stamped `base_time`.
    fn detect_frames(&mut self, frames: Vec<Frame>, base_time: DateTime<Utc>, offset_by_pts: bool) {
        let Some(model) = self.model.as_mut() else {
            return;
        };

        for frame in frames {
            let mut raw = match model.detect(&frame) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(stream = %self.stream, error = %e, "Detection failed on frame");
                    continue;
                }
            };
            raw.truncate(MAX_DETECTIONS);
            let raw_count = raw.len();

            let accepted = self.deps.filter.filter(&self.stream, raw);
            metrics::record_detections(&self.stream, raw_count, accepted.len());
            if accepted.is_empty() {
                continue;
            }

            let frame_time = if offset_by_pts {
                base_time + chrono::Duration::milliseconds((frame.pts_secs * 1000.0) as i64)
            } else {
                base_time
            };

            debug!(
                stream = %self.stream,
                raw = raw_count,
                accepted = accepted.len(),
                "Forwarding detections"
            );
            self.deps
                .sink
                .on_detections(&self.stream, &frame, &accepted, frame_time);
            self.detections_forwarded += accepted.len() as u64;
            self.last_detection_time = Some(frame_time);
        }
    }

    fn publish_status(&self) {
        let now = self.deps.clock.now();
        if let Ok(mut status) = self.shared.status.lock() {
            status.running = true;
            status.model_loaded = self.model.is_some();
            status.model_load_attempts = self.load_budget.attempts();
            status.last_check_time = Some(now);
            status.last_detection_time = self.last_detection_time;
            status.consecutive_failures = self.consecutive_failures;
            status.segments_processed = self.segments_processed;
            status.detections_forwarded = self.detections_forwarded;
        }
    }

    fn log_status(&self) {
        info!(
            stream = %self.stream,
            model_loaded = self.model.is_some(),
            consecutive_failures = self.consecutive_failures,
            segments_processed = self.segments_processed,
            detections_forwarded = self.detections_forwarded,
            last_detection = ?self.last_detection_time,
            "Monitor status"
        );
    }
}
