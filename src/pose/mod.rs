pub mod detector;
pub mod landmark;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod photo;
pub mod preprocess;

pub use detector::{DetectorHandle, ModelLoader, PoseCandidate, PoseDetector, PoseModel};
pub use landmark::{Landmark, LandmarkIndex, LandmarkSet};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxPoseLoader, OnnxPoseModel};
pub use photo::{decode_image, ImageSize, Photo, PosedImage};
pub use preprocess::{preprocess_letterbox, LetterboxInfo};
