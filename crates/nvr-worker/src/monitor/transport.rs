use crate::error::WorkerResult;

/// Controls of the upstream transport feeding a stream's segments.
///
/// Monitors call these to restart a stream whose segment directory stays
/// empty or unreadable.
pub trait StreamTransport: Send + Sync {
    fn stop(&self, stream: &str) -> WorkerResult<()>;
    fn start(&self, stream: &str) -> WorkerResult<()>;
    fn is_active(&self, stream: &str) -> bool;
}
