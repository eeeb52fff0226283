//! Structured per-stream logging utilities.

use tracing::{error, info, warn, Span};

/// Logger carrying a stream name and pipeline component on every line.
#[derive(Debug, Clone)]
pub struct StreamLogger {
    stream: String,
    component: &'static str,
}

impl StreamLogger {
    /// Create a logger for `stream` within `component` (e.g. "monitor").
    pub fn new(stream: &str, component: &'static str) -> Self {
        Self {
            stream: stream.to_string(),
            component,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            stream = %self.stream,
            component = self.component,
            "Started: {}", message
        );
    }

    pub fn log_event(&self, message: &str) {
        info!(
            stream = %self.stream,
            component = self.component,
            "{}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            stream = %self.stream,
            component = self.component,
            "{}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            stream = %self.stream,
            component = self.component,
            "{}", message
        );
    }

    pub fn log_stop(&self, message: &str) {
        info!(
            stream = %self.stream,
            component = self.component,
            "Stopped: {}", message
        );
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Create a tracing span for work done on behalf of this stream.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "stream",
            stream = %self.stream,
            component = self.component
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_logger_fields() {
        let logger = StreamLogger::new("front_door", "monitor");
        assert_eq!(logger.stream(), "front_door");
        assert_eq!(logger.component(), "monitor");
    }
}
