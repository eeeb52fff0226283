//! Detection capability.
//!
//! A [`ModelLoader`] turns a model file into a [`Detector`] handle. Handles
//! are owned by exactly one stream monitor and release their native state
//! when dropped, so unloading a model is dropping its handle.

mod onnx;
mod resolve;

pub use onnx::{OnnxDetector, OnnxModelLoader, COCO_CLASSES};
pub use resolve::resolve_model_path;

use std::path::Path;

use nvr_models::{Detection, ModelType};

use crate::error::MediaResult;
use crate::frame::Frame;

/// A loaded detection model.
pub trait Detector: Send {
    /// Run inference on one frame.
    fn detect(&mut self, frame: &Frame) -> MediaResult<Vec<Detection>>;

    fn model_type(&self) -> ModelType;

    /// Confidence threshold the model was loaded with.
    fn threshold(&self) -> f32;
}

/// Loads detection models from disk.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path, threshold: f32) -> MediaResult<Box<dyn Detector>>;
}
