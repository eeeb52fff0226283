//! YOLOv8 object detection on ONNX Runtime.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when the `cuda` feature is enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::Path;

use image::DynamicImage;
use ndarray::Array;
use nvr_models::{Detection, ModelType, MAX_DETECTIONS};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use super::{Detector, ModelLoader};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

const NUM_CLASSES: usize = 80;
const NUM_BOXES: usize = 8400;

/// Loads YOLOv8 `.onnx` models.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    /// Square model input size
    pub input_size: u32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
}

impl Default for OnnxModelLoader {
    fn default() -> Self {
        Self {
            input_size: 640,
            nms_threshold: 0.45,
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, path: &Path, threshold: f32) -> MediaResult<Box<dyn Detector>> {
        let model_type = ModelType::from_path(path);
        if model_type != ModelType::Onnx {
            return Err(MediaError::UnsupportedModel(format!(
                "{} ({})",
                path.display(),
                model_type
            )));
        }

        let detector = OnnxDetector::new(path, threshold, self.input_size, self.nms_threshold)?;
        Ok(Box::new(detector))
    }
}

/// Candidate box in normalized corner coordinates.
#[derive(Debug, Clone)]
struct Candidate {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    class_id: usize,
    confidence: f32,
}

/// A loaded YOLOv8 session. Dropping it releases the ONNX Runtime session.
pub struct OnnxDetector {
    session: Session,
    model_path: String,
    threshold: f32,
    input_size: u32,
    nms_threshold: f32,
}

impl OnnxDetector {
    pub fn new(
        model_path: &Path,
        threshold: f32,
        input_size: u32,
        nms_threshold: f32,
    ) -> MediaResult<Self> {
        if !model_path.is_file() {
            return Err(MediaError::model_not_found(model_path.display().to_string()));
        }

        let session = create_session(model_path)?;
        info!(
            model_path = %model_path.display(),
            input_size,
            threshold,
            "ONNX detector loaded"
        );

        Ok(Self {
            session,
            model_path: model_path.display().to_string(),
            threshold,
            input_size,
            nms_threshold,
        })
    }

    /// Resize to the model input, normalize to [0, 1] and lay out as NCHW.
    fn preprocess(&self, img: &DynamicImage) -> MediaResult<Value> {
        let size = self.input_size;
        let rgb = img
            .resize_exact(size, size, image::imageops::FilterType::Triangle)
            .to_rgb8();
        let side = size as usize;

        let mut chw = vec![0f32; 3 * side * side];
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * side + x as usize;
            for c in 0..3 {
                chw[c * side * side + offset] = pixel[c] as f32 / 255.0;
            }
        }

        Tensor::from_array((vec![1usize, 3, side, side], chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::detection_failed(format!("Failed to create tensor: {}", e)))
    }

    fn run_inference(&mut self, input: Value) -> MediaResult<Vec<f32>> {
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 84, 8400]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detection_failed("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.iter().copied().collect())
    }

    /// Decode `[1, 84, 8400]` predictions into thresholded candidates.
    fn postprocess(&self, outputs: Vec<f32>) -> MediaResult<Vec<Candidate>> {
        let features = 4 + NUM_CLASSES;
        if outputs.len() != features * NUM_BOXES {
            return Err(MediaError::detection_failed(format!(
                "Unexpected output size: expected {}, got {}",
                features * NUM_BOXES,
                outputs.len()
            )));
        }

        let predictions = Array::from_shape_vec((features, NUM_BOXES), outputs)
            .map_err(|e| MediaError::detection_failed(format!("Failed to reshape output: {}", e)))?;
        let predictions = predictions.t();
        let size = self.input_size as f32;

        let mut candidates = Vec::new();
        for row in predictions.outer_iter() {
            let (class_id, confidence) = row
                .iter()
                .skip(4)
                .copied()
                .enumerate()
                .fold((0, 0.0f32), |best, (c, s)| if s > best.1 { (c, s) } else { best });

            if confidence < self.threshold {
                continue;
            }

            let (cx, cy, w, h) = (row[0] / size, row[1] / size, row[2] / size, row[3] / size);
            let x = (cx - w / 2.0).clamp(0.0, 1.0);
            let y = (cy - h / 2.0).clamp(0.0, 1.0);

            candidates.push(Candidate {
                x,
                y,
                width: w.min(1.0 - x),
                height: h.min(1.0 - y),
                class_id,
                confidence,
            });
        }

        Ok(non_maximum_suppression(candidates, self.nms_threshold))
    }
}

impl Detector for OnnxDetector {
    fn detect(&mut self, frame: &Frame) -> MediaResult<Vec<Detection>> {
        let img = frame.to_image()?;
        let input = self.preprocess(&img)?;
        let outputs = self.run_inference(input)?;
        let candidates = self.postprocess(outputs)?;

        let detections: Vec<Detection> = candidates
            .into_iter()
            .take(MAX_DETECTIONS)
            .map(|c| {
                let label = COCO_CLASSES.get(c.class_id).copied().unwrap_or("unknown");
                Detection::new(label, c.confidence, c.x, c.y, c.width, c.height)
            })
            .collect();

        debug!(count = detections.len(), "Object detection completed");
        Ok(detections)
    }

    fn model_type(&self) -> ModelType {
        ModelType::Onnx
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Drop for OnnxDetector {
    fn drop(&mut self) {
        debug!(model_path = %self.model_path, "ONNX detector unloaded");
    }
}

/// Greedy per-class NMS. Output is sorted by descending confidence.
fn non_maximum_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let overlaps = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let intersection = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Create an ONNX Runtime session, preferring hardware execution providers.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| MediaError::model_load_failed(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::model_load_failed(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::model_load_failed(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(x: f32, class_id: usize, confidence: f32) -> Candidate {
        Candidate {
            x,
            y: 0.1,
            width: 0.2,
            height: 0.2,
            class_id,
            confidence,
        }
    }

    #[test]
    fn test_coco_classes() {
        assert_eq!(COCO_CLASSES[0], "person");
        assert_eq!(COCO_CLASSES[2], "car");
        assert_eq!(COCO_CLASSES.len(), NUM_CLASSES);
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let kept = non_maximum_suppression(
            vec![
                candidate(0.10, 0, 0.6),
                candidate(0.11, 0, 0.9),
                candidate(0.11, 2, 0.8),
                candidate(0.70, 0, 0.5),
            ],
            0.45,
        );

        let summary: Vec<(usize, f32)> = kept.iter().map(|c| (c.class_id, c.confidence)).collect();
        assert_eq!(summary, vec![(0, 0.9), (2, 0.8), (0, 0.5)]);
    }

    #[test]
    fn test_iou() {
        let a = candidate(0.1, 0, 0.9);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &candidate(0.6, 0, 0.9)), 0.0);
    }

    #[test]
    fn test_loader_rejects_other_model_types() {
        let loader = OnnxModelLoader::default();
        let result = loader.load(Path::new("/models/face.sod"), 0.3);
        assert!(matches!(result, Err(MediaError::UnsupportedModel(_))));
    }

    #[test]
    fn test_loader_missing_file() {
        let loader = OnnxModelLoader::default();
        let result = loader.load(Path::new("/nonexistent/yolov8n.onnx"), 0.5);
        assert!(matches!(result, Err(MediaError::ModelNotFound(_))));
    }
}
