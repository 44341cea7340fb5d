//! The three-model bundle behind [`FaceAnalyzer`]: SCRFD detection,
//! 2d106det landmarks and ArcFace descriptors.

use crate::analyzer::{AnalyzeError, FaceAnalyzer};
use crate::decode::Bitmap;
use crate::detector::{DetectorError, FaceDetector};
use crate::landmarks::{LandmarkError, LandmarkEstimator};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Detection, Dimensions, FaceBox, Rect};
use std::path::Path;
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const LANDMARK_MODEL_FILE: &str = "2d106det.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Model artifact file names, in load order.
pub const MODEL_FILES: [&str; 3] = [DETECTOR_MODEL_FILE, LANDMARK_MODEL_FILE, RECOGNIZER_MODEL_FILE];

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("failed to load detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("failed to load landmark estimator: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("failed to load recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Loaded detection, landmark and recognition models.
pub struct ModelBundle {
    detector: FaceDetector,
    landmarks: LandmarkEstimator,
    recognizer: FaceRecognizer,
}

impl ModelBundle {
    /// Load all three models from `model_dir`. Fails on the first missing or
    /// unloadable artifact.
    pub fn load(model_dir: &Path) -> Result<Self, BundleError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let landmarks = LandmarkEstimator::load(&model_dir.join(LANDMARK_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;

        tracing::info!(dir = %model_dir.display(), "model bundle loaded");

        Ok(Self {
            detector,
            landmarks,
            recognizer,
        })
    }
}

impl FaceAnalyzer for ModelBundle {
    fn analyze(&mut self, bitmap: &Bitmap) -> Result<Vec<Detection>, AnalyzeError> {
        let faces = self.detector.detect(bitmap)?;
        let image_dims = Dimensions {
            width: bitmap.width(),
            height: bitmap.height(),
        };

        let mut detections = Vec::with_capacity(faces.len());
        for face in &faces {
            let landmarks = self.landmarks.estimate(bitmap, face)?;
            let descriptor = self.recognizer.extract(bitmap, face)?;

            detections.push(Detection {
                detection: FaceBox {
                    rect: Rect {
                        x: face.x,
                        y: face.y,
                        width: face.width,
                        height: face.height,
                    },
                    score: face.confidence,
                    image_dims,
                },
                landmarks,
                descriptor,
            });
        }

        tracing::debug!(faces = detections.len(), "analysis complete");
        Ok(detections)
    }
}
