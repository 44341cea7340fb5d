use crate::decode::Bitmap;
use crate::detector::DetectorError;
use crate::landmarks::LandmarkError;
use crate::recognizer::RecognizerError;
use crate::types::Detection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmark error: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Turns a bitmap into one [`Detection`] per face found.
///
/// An empty result means no faces, not an error. No ordering is promised.
pub trait FaceAnalyzer: Send {
    fn analyze(&mut self, bitmap: &Bitmap) -> Result<Vec<Detection>, AnalyzeError>;
}
