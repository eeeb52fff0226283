//! Detection model families.
//!
//! The model family decides the default confidence threshold and how far
//! decoded frames are downscaled before inference.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// ONNX graph (YOLOv8 layout)
    Onnx,
    /// TensorFlow Lite flatbuffer
    Tflite,
    /// SOD convolutional network
    Sod,
    /// SOD RealNet face detector, scores are not probabilities
    SodRealnet,
    Unknown,
}

impl ModelType {
    /// Infer the model family from the model file name.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if file_name.contains("realnet") {
            return ModelType::SodRealnet;
        }

        match path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("onnx") => ModelType::Onnx,
            Some("tflite") => ModelType::Tflite,
            Some("sod") => ModelType::Sod,
            _ => ModelType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Onnx => "onnx",
            ModelType::Tflite => "tflite",
            ModelType::Sod => "sod",
            ModelType::SodRealnet => "sod_realnet",
            ModelType::Unknown => "unknown",
        }
    }

    /// Threshold used when none is configured.
    pub fn default_threshold(&self) -> f32 {
        match self {
            ModelType::SodRealnet => 5.0,
            ModelType::Sod => 0.3,
            _ => 0.5,
        }
    }

    /// Integer factor decoded frames are divided by before inference.
    pub fn downscale_factor(&self) -> u32 {
        match self {
            ModelType::Sod => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_from_path() {
        assert_eq!(ModelType::from_path("/models/yolov8n.onnx"), ModelType::Onnx);
        assert_eq!(ModelType::from_path("ssd.TFLITE"), ModelType::Tflite);
        assert_eq!(ModelType::from_path("face.sod"), ModelType::Sod);
        assert_eq!(ModelType::from_path("face_realnet.realnet.sod"), ModelType::SodRealnet);
        assert_eq!(ModelType::from_path("model.bin"), ModelType::Unknown);
    }

    #[test]
    fn test_defaults_by_type() {
        assert_eq!(ModelType::SodRealnet.default_threshold(), 5.0);
        assert_eq!(ModelType::Sod.default_threshold(), 0.3);
        assert_eq!(ModelType::Onnx.default_threshold(), 0.5);
        assert_eq!(ModelType::Sod.downscale_factor(), 2);
        assert_eq!(ModelType::SodRealnet.downscale_factor(), 1);
        assert_eq!(ModelType::Onnx.downscale_factor(), 1);
    }
}
