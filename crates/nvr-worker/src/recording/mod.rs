//! Detection-triggered recording.
//!
//! Detection and motion events drive a per-stream state machine:
//!
//! ```text
//! Idle -> Buffering -> Recording <-> PostRoll -> Finalizing -> Idle
//! ```
//!
//! A circular packet buffer supplies the pre-roll when a recording opens;
//! the file stays open for `post_buffer_secs` after the last event.

mod context;
mod controller;
mod path;

pub use context::{RecordingContext, RecordingEnv, RecordingOptions};
pub use controller::RecordingController;
pub use path::{recording_path, unique_recording_path};
