//! Time-windowed circular buffer of encoded packets.
//!
//! The buffer is bounded by the span between its oldest and newest
//! timestamps rather than by an entry count, so variable bitrate streams
//! keep a constant amount of history. A single mutex guards every
//! operation, which makes a drain atomic with respect to concurrent pushes.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nvr_models::PacketBufferEntry;
use tracing::debug;

/// Shortest configurable pre-roll window.
pub const MIN_PRE_BUFFER_SECS: u32 = 5;
/// Longest configurable pre-roll window.
pub const MAX_PRE_BUFFER_SECS: u32 = 30;
/// Window used when none is configured.
pub const DEFAULT_PRE_BUFFER_SECS: u32 = 5;

/// Snapshot of a buffer's contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferStats {
    pub count: usize,
    pub bytes: usize,
    pub duration_secs: f64,
    pub keyframes: usize,
    pub peak_bytes: usize,
    pub oldest_pts_ms: Option<i64>,
    pub newest_pts_ms: Option<i64>,
    pub starts_with_keyframe: bool,
    /// Entries whose timestamp was raised to keep the buffer ordered.
    pub adjusted_timestamps: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<PacketBufferEntry>,
    bytes: usize,
    peak_bytes: usize,
    keyframes: usize,
    adjusted_timestamps: u64,
}

impl Inner {
    fn pop_front(&mut self) -> Option<PacketBufferEntry> {
        let entry = self.entries.pop_front()?;
        self.bytes = self.bytes.saturating_sub(entry.size());
        if entry.keyframe {
            self.keyframes = self.keyframes.saturating_sub(1);
        }
        Some(entry)
    }

    fn span_ms(&self) -> i64 {
        match (self.entries.front(), self.entries.back()) {
            (Some(front), Some(back)) => back.pts_ms - front.pts_ms,
            _ => 0,
        }
    }

    fn take_all(&mut self) -> Vec<PacketBufferEntry> {
        self.bytes = 0;
        self.keyframes = 0;
        std::mem::take(&mut self.entries).into()
    }
}

/// Circular pre-roll buffer for one stream.
#[derive(Debug)]
pub struct PacketBuffer {
    window_ms: i64,
    inner: Mutex<Inner>,
}

impl PacketBuffer {
    /// Create a buffer holding `window` of history.
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as i64,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Create a buffer from a pre-roll length in seconds, clamped to
    /// [`MIN_PRE_BUFFER_SECS`, `MAX_PRE_BUFFER_SECS`].
    pub fn with_seconds(seconds: u32) -> Self {
        let seconds = seconds.clamp(MIN_PRE_BUFFER_SECS, MAX_PRE_BUFFER_SECS);
        Self::new(Duration::from_secs(seconds as u64))
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms as u64)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every mutation leaves Inner consistent before it can panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry and evict from the front until the buffered span fits
    /// the window. Returns the number of evicted entries.
    ///
    /// Timestamps that step backwards by less than the window are raised to
    /// the newest buffered timestamp so the buffer stays ordered, and counted
    /// in [`BufferStats::adjusted_timestamps`]. A larger
    /// backwards step is treated as a timestamp discontinuity and resets the
    /// buffer.
    pub fn push(&self, mut entry: PacketBufferEntry) -> usize {
        let mut inner = self.lock();
        let mut evicted = 0;

        if let Some(newest) = inner.entries.back().map(|e| e.pts_ms) {
            if entry.pts_ms < newest {
                if newest - entry.pts_ms > self.window_ms {
                    debug!(
                        newest_pts_ms = newest,
                        pts_ms = entry.pts_ms,
                        "Timestamp discontinuity, resetting packet buffer"
                    );
                    evicted = inner.entries.len();
                    inner.take_all();
                } else {
                    debug!(
                        newest_pts_ms = newest,
                        pts_ms = entry.pts_ms,
                        sequence = entry.sequence,
                        "Out-of-order timestamp raised to newest buffered"
                    );
                    entry.pts_ms = newest;
                    inner.adjusted_timestamps += 1;
                }
            }
        }

        inner.bytes += entry.size();
        if entry.keyframe {
            inner.keyframes += 1;
        }
        inner.entries.push_back(entry);

        while inner.entries.len() > 1 && inner.span_ms() > self.window_ms {
            inner.pop_front();
            evicted += 1;
        }

        inner.peak_bytes = inner.peak_bytes.max(inner.bytes);
        evicted
    }

    /// Remove and return every buffered entry in timestamp order.
    pub fn drain_ordered(&self) -> Vec<PacketBufferEntry> {
        self.lock().take_all()
    }

    /// Remove every buffered entry and return those from the first keyframe
    /// on, so the result starts decodable. Returns all entries when none is a
    /// keyframe.
    pub fn drain_from_keyframe(&self) -> Vec<PacketBufferEntry> {
        let mut entries = self.lock().take_all();
        if let Some(first_key) = entries.iter().position(|e| e.keyframe) {
            entries.drain(..first_key);
        }
        entries
    }

    /// Drop all buffered entries.
    pub fn clear(&self) {
        self.lock().take_all();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Whether the buffer holds close to a full window of history.
    pub fn is_ready(&self) -> bool {
        let inner = self.lock();
        !inner.entries.is_empty() && inner.span_ms() >= (self.window_ms - 1000).max(0)
    }

    /// Snapshot of the buffer contents.
    pub fn stats(&self) -> BufferStats {
        let inner = self.lock();
        BufferStats {
            count: inner.entries.len(),
            bytes: inner.bytes,
            duration_secs: inner.span_ms() as f64 / 1000.0,
            keyframes: inner.keyframes,
            peak_bytes: inner.peak_bytes,
            oldest_pts_ms: inner.entries.front().map(|e| e.pts_ms),
            newest_pts_ms: inner.entries.back().map(|e| e.pts_ms),
            starts_with_keyframe: inner.entries.front().is_some_and(|e| e.keyframe),
            adjusted_timestamps: inner.adjusted_timestamps,
        }
    }
}
