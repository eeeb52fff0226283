//! Owner of every running monitor thread.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use nvr_media::Frame;
use nvr_models::{validate_stream_name, ModelType};
use tracing::{debug, info, warn};

use super::resources::{available_memory_mb, downscale_for};
use super::worker::{MonitorShared, StreamMonitor};
use super::{MonitorConfig, MonitorDeps, MonitorInput, MonitorStatus};
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

struct MonitorHandle {
    shared: Arc<MonitorShared>,
    inbox: SyncSender<MonitorInput>,
    model_type: ModelType,
    thread: JoinHandle<()>,
}

/// Starts, stops and queries per-stream monitors.
pub struct MonitorRegistry {
    deps: MonitorDeps,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
    stop_timeout: Duration,
}

impl MonitorRegistry {
    pub fn new(deps: MonitorDeps, stop_timeout: Duration) -> Self {
        Self {
            deps,
            monitors: Mutex::new(HashMap::new()),
            stop_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MonitorHandle>> {
        self.monitors.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Start monitoring `stream`. Starting an already running monitor is a
    /// no-op.
    pub fn start_monitor(&self, stream: &str, config: MonitorConfig) -> WorkerResult<()> {
        validate_stream_name(stream)?;
        config.validate()?;

        let mut monitors = self.lock();
        if let Some(existing) = monitors.get(stream) {
            if existing.shared.is_running() && !existing.thread.is_finished() {
                debug!(stream = %stream, "Monitor already running");
                return Ok(());
            }
            monitors.remove(stream);
        }

        let shared = Arc::new(MonitorShared::new(stream));
        let (inbox_tx, inbox_rx) = sync_channel(self.deps.settings.inbox_capacity);
        let model_type = ModelType::from_path(&config.model_path);
        let monitor = StreamMonitor::new(
            stream,
            config,
            self.deps.clone(),
            Arc::clone(&shared),
            inbox_rx,
        );

        let thread = std::thread::Builder::new()
            .name(format!("monitor-{}", stream))
            .spawn(move || monitor.run())
            .map_err(|e| WorkerError::monitor_failed(format!("failed to spawn thread: {}", e)))?;

        monitors.insert(
            stream.to_string(),
            MonitorHandle {
                shared,
                inbox: inbox_tx,
                model_type,
                thread,
            },
        );
        metrics::set_monitors_active(monitors.len());
        info!(stream = %stream, "Detection monitor started");
        Ok(())
    }

    /// Stop the monitor of `stream` and wait up to the stop timeout for its
    /// thread. Stopping a stream without a monitor succeeds.
    pub fn stop_monitor(&self, stream: &str) -> WorkerResult<()> {
        validate_stream_name(stream)?;

        let handle = {
            let mut monitors = self.lock();
            let handle = monitors.remove(stream);
            metrics::set_monitors_active(monitors.len());
            handle
        };

        match handle {
            Some(handle) => {
                self.join_handle(stream, handle);
                Ok(())
            }
            None => {
                debug!(stream = %stream, "No monitor to stop");
                Ok(())
            }
        }
    }

    fn join_handle(&self, stream: &str, handle: MonitorHandle) {
        handle.shared.request_stop();
        drop(handle.inbox);

        let deadline = Instant::now() + self.stop_timeout;
        while !handle.thread.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        if handle.thread.is_finished() {
            if handle.thread.join().is_err() {
                warn!(stream = %stream, "Monitor thread panicked");
            }
            info!(stream = %stream, "Detection monitor stopped");
        } else {
            // The thread still sees the stop flag and exits on its own.
            warn!(
                stream = %stream,
                timeout = ?self.stop_timeout,
                "Monitor did not stop within timeout, detaching"
            );
        }
    }

    /// Stop every monitor.
    pub fn stop_all(&self) {
        let handles: Vec<(String, MonitorHandle)> = self.lock().drain().collect();
        metrics::set_monitors_active(0);

        for (_, handle) in &handles {
            handle.shared.request_stop();
        }
        for (stream, handle) in handles {
            self.join_handle(&stream, handle);
        }
    }

    pub fn is_running(&self, stream: &str) -> bool {
        self.lock()
            .get(stream)
            .map(|h| h.shared.is_running() && !h.thread.is_finished())
            .unwrap_or(false)
    }

    pub fn status(&self, stream: &str) -> Option<MonitorStatus> {
        self.lock().get(stream).map(|h| h.shared.status())
    }

    pub fn statuses(&self) -> Vec<MonitorStatus> {
        let mut statuses: Vec<MonitorStatus> =
            self.lock().values().map(|h| h.shared.status()).collect();
        statuses.sort_by(|a, b| a.stream.cmp(&b.stream));
        statuses
    }

    /// Downscale factor the monitor of `stream` expects for its frames.
    pub fn downscale_for(&self, stream: &str) -> Option<u32> {
        let model_type = self.lock().get(stream).map(|h| h.model_type)?;
        Some(downscale_for(
            model_type,
            available_memory_mb(),
            self.deps.settings.low_memory_threshold_mb,
        ))
    }

    /// Queue frames decoded elsewhere for detection by the monitor of
    /// `stream`. Returns `false` when the stream has no monitor or its
    /// inbox is full.
    pub fn submit_frames(&self, stream: &str, frames: Vec<Frame>, base_time: DateTime<Utc>) -> bool {
        let monitors = self.lock();
        let Some(handle) = monitors.get(stream) else {
            return false;
        };

        match handle.inbox.try_send(MonitorInput::Frames { frames, base_time }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(stream = %stream, "Monitor inbox full, frames dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl Drop for MonitorRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::MonitorSettings;
    use crate::filter::DetectionFilter;
    use crate::monitor::{DetectionSink, PollingPolicy, StreamTransport};
    use crate::store::MemoryStore;
    use crate::test_support::{tiny_frame, CollectingSink, FakeDecoder, FakeLoader, FakeTransport};
    use nvr_models::Detection;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::Ordering;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn fast_settings() -> MonitorSettings {
        let fast = Duration::from_millis(10);
        MonitorSettings {
            model_search_dirs: Vec::new(),
            max_model_load_retries: 2,
            model_retry_interval: Duration::from_millis(50),
            failure_restart_threshold: 3,
            transport_restart_pause: fast,
            startup_delay: Duration::ZERO,
            status_log_interval: Duration::from_secs(60),
            low_memory_threshold_mb: 0,
            polling: PollingPolicy {
                fast,
                medium: fast,
                slow: fast,
                medium_after: 5,
                slow_after: 10,
            },
            inbox_capacity: 2,
            max_logged_failures: 3,
        }
    }

    struct Fixture {
        registry: MonitorRegistry,
        sink: Arc<CollectingSink>,
        loader: Arc<FakeLoader>,
        decoder: Arc<FakeDecoder>,
        transport: Arc<FakeTransport>,
        dir: TempDir,
    }

    fn fixture() -> Fixture {
        let sink = Arc::new(CollectingSink::default());
        let loader = Arc::new(FakeLoader::new(vec![Detection::new(
            "person", 0.9, 0.4, 0.4, 0.2, 0.2,
        )]));
        let decoder = Arc::new(FakeDecoder::default());
        let transport = Arc::new(FakeTransport::default());
        let store = Arc::new(MemoryStore::new());
        let deps = MonitorDeps {
            decoder: decoder.clone(),
            loader: loader.clone(),
            filter: DetectionFilter::new(store.clone(), store),
            sink: sink.clone() as Arc<dyn DetectionSink>,
            transport: Some(transport.clone() as Arc<dyn StreamTransport>),
            clock: Arc::new(SystemClock),
            settings: fast_settings(),
        };
        Fixture {
            registry: MonitorRegistry::new(deps, Duration::from_secs(2)),
            sink,
            loader,
            decoder,
            transport,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn model_file(dir: &Path) -> PathBuf {
        let path = dir.join("yolov8n.onnx");
        std::fs::write(&path, b"onnx").unwrap();
        path
    }

    fn segment(dir: &Path, name: &str, age: Duration) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, b"segment").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
        path
    }

    fn config(model_path: PathBuf, segment_dir: PathBuf, interval: Duration) -> MonitorConfig {
        MonitorConfig {
            model_path,
            threshold: 0.0,
            detection_interval: interval,
            segment_dir,
        }
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn test_monitor_forwards_detections_and_stops() {
        let f = fixture();
        let segments = f.dir.path().join("segments");
        segment(&segments, "seg_001.ts", Duration::from_secs(1));

        f.registry
            .start_monitor(
                "cam1",
                config(model_file(f.dir.path()), segments, Duration::ZERO),
            )
            .unwrap();
        assert!(wait_until(|| f.sink.count() >= 1));

        let status = f.registry.status("cam1").unwrap();
        assert!(status.running);
        assert!(wait_until(|| f.registry.status("cam1").unwrap().segments_processed == 1));

        f.registry.stop_monitor("cam1").unwrap();
        assert!(!f.registry.is_running("cam1"));
        assert!(f.registry.status("cam1").is_none());
        f.registry.stop_monitor("cam1").unwrap();
    }

    #[test]
    fn test_start_is_idempotent() {
        let f = fixture();
        let cfg = config(
            model_file(f.dir.path()),
            f.dir.path().to_path_buf(),
            Duration::from_secs(10),
        );
        f.registry.start_monitor("cam1", cfg.clone()).unwrap();
        f.registry.start_monitor("cam1", cfg).unwrap();
        assert!(f.registry.is_running("cam1"));
        assert_eq!(f.registry.statuses().len(), 1);
        f.registry.stop_all();
        assert!(!f.registry.is_running("cam1"));
    }

    #[test]
    fn test_invalid_start_rejected() {
        let f = fixture();
        let cfg = config(PathBuf::from("m.onnx"), f.dir.path().to_path_buf(), Duration::ZERO);
        assert!(f.registry.start_monitor("", cfg.clone()).is_err());
        assert!(f.registry.start_monitor("..", cfg).is_err());
        assert!(f
            .registry
            .start_monitor("cam1", config(PathBuf::new(), PathBuf::from("/tmp"), Duration::ZERO))
            .is_err());
        assert!(f.registry.statuses().is_empty());
    }

    #[test]
    fn test_model_retry_recovers_when_file_appears() {
        let f = fixture();
        let model = f.dir.path().join("late.onnx");
        segment(f.dir.path(), "seg_001.ts", Duration::from_secs(1));

        f.registry
            .start_monitor(
                "cam1",
                config(model.clone(), f.dir.path().to_path_buf(), Duration::ZERO),
            )
            .unwrap();

        assert!(wait_until(|| {
            let status = f.registry.status("cam1").unwrap();
            status.model_load_attempts == 2 && !status.model_loaded
        }));
        assert_eq!(f.loader.loads.load(Ordering::SeqCst), 0);
        assert_eq!(f.sink.count(), 0);

        std::fs::write(&model, b"onnx").unwrap();
        assert!(wait_until(|| f.registry.status("cam1").unwrap().model_loaded));
        f.registry.stop_monitor("cam1").unwrap();
    }

    #[test]
    fn test_missing_directory_restarts_transport() {
        let f = fixture();
        let segments = f.dir.path().join("not-yet");

        f.registry
            .start_monitor(
                "cam1",
                config(model_file(f.dir.path()), segments.clone(), Duration::ZERO),
            )
            .unwrap();

        assert!(wait_until(|| f.transport.starts.load(Ordering::SeqCst) >= 1));
        assert!(f.transport.stops.load(Ordering::SeqCst) >= 1);
        assert!(segments.is_dir());
        f.registry.stop_monitor("cam1").unwrap();
    }

    #[test]
    fn test_inactive_transport_is_started_without_stop() {
        let f = fixture();
        f.transport.down.store(true, Ordering::SeqCst);
        f.transport.fail_start.store(true, Ordering::SeqCst);

        f.registry
            .start_monitor(
                "cam1",
                config(model_file(f.dir.path()), f.dir.path().join("gone"), Duration::ZERO),
            )
            .unwrap();

        assert!(wait_until(|| f.transport.starts.load(Ordering::SeqCst) >= 2));
        assert_eq!(f.transport.stops.load(Ordering::SeqCst), 0);
        assert!(f.registry.is_running("cam1"));
        f.registry.stop_monitor("cam1").unwrap();
    }

    #[test]
    fn test_detection_interval_gates_new_segments() {
        let f = fixture();
        let segments = f.dir.path().join("segments");
        segment(&segments, "seg_001.ts", Duration::from_secs(10));

        f.registry
            .start_monitor(
                "cam1",
                config(model_file(f.dir.path()), segments.clone(), Duration::from_secs(3600)),
            )
            .unwrap();
        assert!(wait_until(|| f.decoder.decoded.load(Ordering::SeqCst) == 1));

        segment(&segments, "seg_002.ts", Duration::ZERO);
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(f.decoder.decoded.load(Ordering::SeqCst), 1);
        assert_eq!(f.registry.status("cam1").unwrap().segments_processed, 1);
        f.registry.stop_monitor("cam1").unwrap();
    }

    #[test]
    fn test_submitted_frames_are_detected() {
        let f = fixture();
        let segments = f.dir.path().join("segments");
        std::fs::create_dir_all(&segments).unwrap();

        assert!(!f.registry.submit_frames("cam1", vec![tiny_frame(0.0)], chrono::Utc::now()));

        f.registry
            .start_monitor(
                "cam1",
                config(model_file(f.dir.path()), segments, Duration::ZERO),
            )
            .unwrap();
        assert!(wait_until(|| f.registry.status("cam1").unwrap().model_loaded));
        assert_eq!(f.registry.downscale_for("cam1"), Some(1));

        assert!(f.registry.submit_frames("cam1", vec![tiny_frame(0.5)], chrono::Utc::now()));
        assert!(wait_until(|| f.sink.count() == 1));
        f.registry.stop_monitor("cam1").unwrap();
    }
}
