//! Pipeline configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};
use crate::monitor::PollingPolicy;

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Settings shared by every stream monitor.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Directories searched by file name when a model path does not exist
    pub model_search_dirs: Vec<PathBuf>,
    /// Model load attempts before the monitor stops retrying
    pub max_model_load_retries: u32,
    /// Pause between model load attempts
    pub model_retry_interval: Duration,
    /// Consecutive scan failures before the monitor restarts the transport
    pub failure_restart_threshold: u32,
    /// Pause between stopping and starting the transport
    pub transport_restart_pause: Duration,
    /// Delay before the first segment scan
    pub startup_delay: Duration,
    /// Interval between periodic status log lines
    pub status_log_interval: Duration,
    /// Available memory below which frames are downscaled aggressively
    pub low_memory_threshold_mb: u64,
    /// Poll interval backoff
    pub polling: PollingPolicy,
    /// Frame batches a monitor accepts from the worker pool before dropping
    pub inbox_capacity: usize,
    /// Identical failures logged before suppression
    pub max_logged_failures: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            model_search_dirs: vec![
                PathBuf::from("/var/lib/nvr/models"),
                PathBuf::from("/etc/nvr/models"),
                PathBuf::from("/usr/local/share/nvr/models"),
            ],
            max_model_load_retries: 5,
            model_retry_interval: Duration::from_secs(5),
            failure_restart_threshold: 10,
            transport_restart_pause: Duration::from_millis(500),
            startup_delay: Duration::from_secs(10),
            status_log_interval: Duration::from_secs(10),
            low_memory_threshold_mb: 50,
            polling: PollingPolicy::default(),
            inbox_capacity: 2,
            max_logged_failures: 3,
        }
    }
}

impl MonitorSettings {
    /// Create settings from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let polling = PollingPolicy {
            fast: Duration::from_millis(env_parse("NVR_POLL_FAST_MS").unwrap_or(250)),
            medium: Duration::from_millis(env_parse("NVR_POLL_MEDIUM_MS").unwrap_or(500)),
            slow: Duration::from_millis(env_parse("NVR_POLL_SLOW_MS").unwrap_or(1000)),
            medium_after: env_parse("NVR_POLL_MEDIUM_AFTER").unwrap_or(5),
            slow_after: env_parse("NVR_POLL_SLOW_AFTER").unwrap_or(10),
        };

        Self {
            model_search_dirs: std::env::var("NVR_MODEL_DIRS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or(defaults.model_search_dirs),
            max_model_load_retries: env_parse("NVR_MODEL_MAX_RETRIES").unwrap_or(5),
            model_retry_interval: Duration::from_secs(
                env_parse("NVR_MODEL_RETRY_SECS").unwrap_or(5),
            ),
            failure_restart_threshold: env_parse("NVR_FAILURE_RESTART_THRESHOLD").unwrap_or(10),
            transport_restart_pause: Duration::from_millis(
                env_parse("NVR_TRANSPORT_RESTART_PAUSE_MS").unwrap_or(500),
            ),
            startup_delay: Duration::from_secs(
                env_parse("NVR_MONITOR_STARTUP_DELAY_SECS").unwrap_or(10),
            ),
            status_log_interval: Duration::from_secs(env_parse("NVR_STATUS_LOG_SECS").unwrap_or(10)),
            low_memory_threshold_mb: env_parse("NVR_LOW_MEMORY_MB").unwrap_or(50),
            polling,
            inbox_capacity: defaults.inbox_capacity,
            max_logged_failures: defaults.max_logged_failures,
        }
    }
}

/// Recording durations applied to streams that do not set their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingDefaults {
    pub pre_buffer_secs: u32,
    pub post_buffer_secs: u32,
    pub max_file_duration_secs: u32,
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        Self {
            pre_buffer_secs: 5,
            post_buffer_secs: 10,
            max_file_duration_secs: 300,
        }
    }
}

/// Top-level configuration of the `nvr-worker` process.
#[derive(Debug, Clone)]
pub struct NvrConfig {
    /// Detection worker pool size
    pub detection_threads: usize,
    /// Root directory of recording files
    pub storage_path: PathBuf,
    pub monitor: MonitorSettings,
    pub recording: RecordingDefaults,
    /// Recording state machine tick period
    pub tick_interval: Duration,
    /// Bounded wait for a monitor thread to exit
    pub stop_timeout: Duration,
    /// JSON file listing the streams to run
    pub streams_file: Option<PathBuf>,
    pub metrics_enabled: bool,
    pub metrics_addr: SocketAddr,
}

impl Default for NvrConfig {
    fn default() -> Self {
        Self {
            detection_threads: 3,
            storage_path: PathBuf::from("/var/lib/nvr/recordings"),
            monitor: MonitorSettings::default(),
            recording: RecordingDefaults::default(),
            tick_interval: Duration::from_millis(1000),
            stop_timeout: Duration::from_secs(5),
            streams_file: None,
            metrics_enabled: true,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9100)),
        }
    }
}

impl NvrConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            detection_threads: env_parse("NVR_DETECTION_THREADS").unwrap_or(3),
            storage_path: std::env::var("NVR_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            monitor: MonitorSettings::from_env(),
            recording: RecordingDefaults {
                pre_buffer_secs: env_parse("NVR_PRE_BUFFER_SECS").unwrap_or(5),
                post_buffer_secs: env_parse("NVR_POST_BUFFER_SECS").unwrap_or(10),
                max_file_duration_secs: env_parse("NVR_MAX_FILE_SECS").unwrap_or(300),
            },
            tick_interval: Duration::from_millis(env_parse("NVR_TICK_MS").unwrap_or(1000)),
            stop_timeout: Duration::from_secs(env_parse("NVR_STOP_TIMEOUT_SECS").unwrap_or(5)),
            streams_file: std::env::var("NVR_STREAMS_FILE").ok().map(PathBuf::from),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            metrics_addr: env_parse("METRICS_ADDR").unwrap_or(defaults.metrics_addr),
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.detection_threads == 0 {
            return Err(WorkerError::config_error("detection_threads must be at least 1"));
        }
        if self.recording.post_buffer_secs == 0 {
            return Err(WorkerError::config_error("post_buffer_secs must be positive"));
        }
        if self.recording.max_file_duration_secs == 0 {
            return Err(WorkerError::config_error("max_file_duration_secs must be positive"));
        }
        if self.tick_interval.is_zero() {
            return Err(WorkerError::config_error("tick_interval must be positive"));
        }
        if self.monitor.inbox_capacity == 0 {
            return Err(WorkerError::config_error("inbox_capacity must be at least 1"));
        }
        Ok(())
    }
}
