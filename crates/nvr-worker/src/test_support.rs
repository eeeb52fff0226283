//! In-memory fakes of the media and transport capabilities.
//!
//! Built for unit tests and, behind the `test-support` feature, for the
//! scenario tests under `tests/`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use nvr_media::{
    Detector, Frame, FrameDecoder, MediaError, MediaResult, ModelLoader, RecordingSink,
    RecordingWriter,
};
use nvr_models::{CodecParams, Detection, EncodedPacket, ModelType, PacketBufferEntry};

use crate::error::{WorkerError, WorkerResult};
use crate::monitor::{DetectionSink, StreamTransport};

pub fn tiny_frame(pts_secs: f64) -> Frame {
    Frame::new(4, 4, vec![0; 48], pts_secs).unwrap()
}

#[derive(Debug, Clone)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub packets: Vec<PacketBufferEntry>,
    pub finished: bool,
}

#[derive(Default)]
pub struct MemoryWriter {
    files: Arc<Mutex<Vec<WrittenFile>>>,
}

impl MemoryWriter {
    pub fn files(&self) -> Vec<WrittenFile> {
        self.files.lock().unwrap().clone()
    }
}

impl RecordingWriter for MemoryWriter {
    fn open(&self, path: &Path, _codec: &CodecParams) -> MediaResult<Box<dyn RecordingSink>> {
        let mut files = self.files.lock().unwrap();
        files.push(WrittenFile {
            path: path.to_path_buf(),
            packets: Vec::new(),
            finished: false,
        });
        Ok(Box::new(MemorySink {
            index: files.len() - 1,
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
        }))
    }
}

struct MemorySink {
    index: usize,
    files: Arc<Mutex<Vec<WrittenFile>>>,
    path: PathBuf,
}

impl RecordingSink for MemorySink {
    fn write_packet(&mut self, entry: &PacketBufferEntry) -> MediaResult<()> {
        self.files.lock().unwrap()[self.index].packets.push(entry.clone());
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn finish(self: Box<Self>) -> MediaResult<u64> {
        let mut files = self.files.lock().unwrap();
        let file = &mut files[self.index];
        file.finished = true;
        Ok(file.packets.iter().map(|p| p.size() as u64).sum())
    }
}

/// Decodes every existing segment into `frames_per_segment` tiny frames.
pub struct FakeDecoder {
    pub frames_per_segment: usize,
    pub decoded: AtomicUsize,
}

impl Default for FakeDecoder {
    fn default() -> Self {
        Self {
            frames_per_segment: 2,
            decoded: AtomicUsize::new(0),
        }
    }
}

impl FrameDecoder for FakeDecoder {
    fn decode_keyframes(&self, segment: &Path, _downscale: u32) -> MediaResult<Vec<Frame>> {
        if !segment.exists() {
            return Err(MediaError::FileNotFound(segment.to_path_buf()));
        }
        self.decoded.fetch_add(1, Ordering::SeqCst);
        Ok((0..self.frames_per_segment)
            .map(|i| tiny_frame(i as f64))
            .collect())
    }

    fn decode_packet(
        &self,
        packet: &EncodedPacket,
        _codec: &CodecParams,
        _downscale: u32,
    ) -> MediaResult<Option<Frame>> {
        Ok(packet.keyframe.then(|| tiny_frame(0.0)))
    }
}

/// Loads detectors that report a fixed set of detections.
pub struct FakeLoader {
    pub detections: Vec<Detection>,
    pub loads: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeLoader {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            loads: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }
}

impl ModelLoader for FakeLoader {
    fn load(&self, path: &Path, threshold: f32) -> MediaResult<Box<dyn Detector>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(MediaError::model_load_failed("corrupt model"));
        }
        Ok(Box::new(FakeDetector {
            detections: self.detections.clone(),
            model_type: ModelType::from_path(path),
            threshold,
        }))
    }
}

struct FakeDetector {
    detections: Vec<Detection>,
    model_type: ModelType,
    threshold: f32,
}

impl Detector for FakeDetector {
    fn detect(&mut self, _frame: &Frame) -> MediaResult<Vec<Detection>> {
        Ok(self.detections.clone())
    }

    fn model_type(&self) -> ModelType {
        self.model_type
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }
}

#[derive(Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<(String, usize, DateTime<Utc>)>>,
}

impl CollectingSink {
    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl DetectionSink for CollectingSink {
    fn on_detections(
        &self,
        stream: &str,
        _frame: &Frame,
        detections: &[Detection],
        frame_time: DateTime<Utc>,
    ) {
        self.events
            .lock()
            .unwrap()
            .push((stream.to_string(), detections.len(), frame_time));
    }
}

/// Transport that counts restarts. It is active until stopped.
#[derive(Default)]
pub struct FakeTransport {
    pub stops: AtomicUsize,
    pub starts: AtomicUsize,
    pub fail_start: AtomicBool,
    pub down: AtomicBool,
}

impl StreamTransport for FakeTransport {
    fn stop(&self, _stream: &str) -> WorkerResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.down.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start(&self, _stream: &str) -> WorkerResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(WorkerError::transport_failed("camera unreachable"));
        }
        self.down.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self, _stream: &str) -> bool {
        !self.down.load(Ordering::SeqCst)
    }
}
