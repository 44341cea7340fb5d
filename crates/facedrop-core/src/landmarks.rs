//! 106-point facial landmark estimator (InsightFace 2d106det) via ONNX Runtime.
//!
//! Takes a square crop around a detected face, resized to 192×192, and
//! regresses landmark positions in [-1, 1] crop space.

use crate::alignment::{warp_affine, Similarity};
use crate::types::{BoundingBox, Point};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const LANDMARK_INPUT_SIZE: u32 = 192;
const LANDMARK_POINTS: usize = 106;
/// Crop side relative to the longer edge of the detection box.
const LANDMARK_CROP_SCALE: f32 = 1.5;
// 2d106det bakes normalization into the graph; it takes raw pixel values.
const LANDMARK_MEAN: f32 = 0.0;
const LANDMARK_STD: f32 = 1.0;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("degenerate face box {width}x{height}")]
    DegenerateBox { width: f32, height: f32 },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct LandmarkEstimator {
    session: Session,
}

impl LandmarkEstimator {
    /// Load the 2d106det ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded landmark model"
        );

        Ok(Self { session })
    }

    /// Estimate landmark points for one detected face, in source-image pixels.
    pub fn estimate(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<Vec<Point>, LandmarkError> {
        let transform = crop_transform(face)?;
        let crop = warp_affine(image, &transform, LANDMARK_INPUT_SIZE);
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmark extraction: {e}")))?;

        decode_landmarks(raw, &transform)
    }
}

/// Transform taking source pixels into the 192×192 crop centred on `face`.
fn crop_transform(face: &BoundingBox) -> Result<Similarity, LandmarkError> {
    let side = face.width.max(face.height) * LANDMARK_CROP_SCALE;
    if !side.is_finite() || side <= 0.0 {
        return Err(LandmarkError::DegenerateBox {
            width: face.width,
            height: face.height,
        });
    }

    let scale = LANDMARK_INPUT_SIZE as f32 / side;
    let half = LANDMARK_INPUT_SIZE as f32 / 2.0;
    let (cx, cy) = face.center();
    Ok(Similarity::scale_translate(scale, half - scale * cx, half - scale * cy))
}

fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = LANDMARK_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel.0[c] as f32 - LANDMARK_MEAN) / LANDMARK_STD;
        }
    }

    tensor
}

/// Map raw `[x0, y0, x1, y1, ...]` outputs in [-1, 1] back to source pixels.
fn decode_landmarks(raw: &[f32], transform: &Similarity) -> Result<Vec<Point>, LandmarkError> {
    if raw.len() != LANDMARK_POINTS * 2 {
        return Err(LandmarkError::InferenceFailed(format!(
            "expected {} landmark values, got {}",
            LANDMARK_POINTS * 2,
            raw.len()
        )));
    }

    let half = LANDMARK_INPUT_SIZE as f32 / 2.0;
    raw.chunks_exact(2)
        .map(|xy| {
            let (x, y) = transform
                .invert_point((xy[0] + 1.0) * half, (xy[1] + 1.0) * half)
                .ok_or_else(|| LandmarkError::InferenceFailed("singular crop transform".into()))?;
            Ok(Point { x, y })
        })
        .collect()
}
