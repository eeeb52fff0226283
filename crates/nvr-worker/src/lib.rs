//! Detection-triggered recording pipeline.
//!
//! This crate provides:
//! - A fixed-size detection worker pool with non-blocking backpressure
//! - Per-stream detection monitors with model retry and stream self-healing
//! - Store-backed zone and object filtering
//! - The per-stream recording state machine with pre-roll and post-roll
//! - Configuration, logging, metrics and the `nvr-worker` binary

pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod pool;
pub mod recording;
pub mod retry;
pub mod store;
pub mod streams;
pub mod ticker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{MonitorSettings, NvrConfig, RecordingDefaults};
pub use error::{WorkerError, WorkerResult};
pub use filter::DetectionFilter;
pub use logging::StreamLogger;
pub use monitor::{
    DetectionSink, MonitorConfig, MonitorRegistry, MonitorStatus, PollingPolicy, StreamTransport,
};
pub use pipeline::{Pipeline, PipelineDeps, PipelineTaskHandler};
pub use pool::{DetectionWorkerPool, PoolStats, TaskHandler};
pub use recording::{RecordingController, RecordingOptions};
pub use retry::{FailureTracker, RetryBudget};
pub use store::{MemoryStore, ObjectFilterStore, RecordingStore, ZoneStore};
pub use streams::{load_streams, StreamDefinition};
pub use ticker::run_tick_loop;
