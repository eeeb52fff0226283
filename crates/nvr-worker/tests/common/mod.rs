//! Fixtures shared by the pipeline scenario tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use nvr_models::Detection;
use nvr_worker::test_support::{FakeDecoder, FakeLoader, FakeTransport, MemoryWriter};
use nvr_worker::{
    Clock, MemoryStore, MonitorSettings, NvrConfig, Pipeline, PipelineDeps, PollingPolicy,
    StreamTransport,
};

pub fn person() -> Detection {
    Detection::new("person", 0.92, 0.2, 0.2, 0.1, 0.3)
}

pub fn fast_settings() -> MonitorSettings {
    let fast = Duration::from_millis(10);
    MonitorSettings {
        model_search_dirs: Vec::new(),
        max_model_load_retries: 3,
        model_retry_interval: Duration::from_millis(50),
        failure_restart_threshold: 5,
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
        inbox_capacity: 4,
        max_logged_failures: 3,
    }
}

pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub writer: Arc<MemoryWriter>,
    pub decoder: Arc<FakeDecoder>,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<FakeTransport>,
    pub dir: tempfile::TempDir,
}

pub fn build_pipeline(clock: Arc<dyn Clock>, detections: Vec<Detection>) -> TestPipeline {
    let dir = tempfile::tempdir().unwrap();
    let writer = Arc::new(MemoryWriter::default());
    let decoder = Arc::new(FakeDecoder::default());
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(FakeTransport::default());

    let config = NvrConfig {
        detection_threads: 2,
        storage_path: dir.path().join("recordings"),
        monitor: fast_settings(),
        stop_timeout: Duration::from_secs(2),
        ..NvrConfig::default()
    };
    let deps = PipelineDeps {
        decoder: decoder.clone(),
        loader: Arc::new(FakeLoader::new(detections)),
        writer: writer.clone(),
        zones: store.clone(),
        objects: store.clone(),
        recordings: store.clone(),
        transport: Some(transport.clone() as Arc<dyn StreamTransport>),
        clock,
    };

    TestPipeline {
        pipeline: Pipeline::new(config, deps).unwrap(),
        writer,
        decoder,
        store,
        transport,
        dir,
    }
}

pub fn write_model(dir: &Path) -> PathBuf {
    let path = dir.join("yolov8n.onnx");
    std::fs::write(&path, b"onnx").unwrap();
    path
}

pub fn write_segment(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, b"segment").unwrap();
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now())
        .unwrap();
    path
}

pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}
