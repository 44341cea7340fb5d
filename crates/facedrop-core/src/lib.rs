//! facedrop-core: face analysis engine.
//!
//! Uses SCRFD for face detection, InsightFace 2d106det for landmarks and
//! ArcFace for face descriptors, all running via ONNX Runtime on the CPU.

pub mod alignment;
pub mod analyzer;
pub mod bundle;
pub mod decode;
pub mod detector;
pub mod landmarks;
pub mod recognizer;
pub mod types;

pub use analyzer::{AnalyzeError, FaceAnalyzer};
pub use bundle::{BundleError, ModelBundle};
pub use decode::{load_bitmap, Bitmap, DecodeError};
pub use types::{BoundingBox, Detection, Dimensions, Embedding, FaceBox, Point, Rect};
