//! Face detection, embeddings and frame handling.
//!
//! This crate provides:
//! - `Frame`, a plain BGR8 pixel buffer shared by capture, inference and
//!   snapshot paths
//! - `FaceEngine`, detection + embedding with tiered backend selection
//! - `QualityScorer`, blur/brightness/size scoring of detection crops
//! - `FrameSource`, the capture seam for network streams and local devices
//! - Frame annotation for the UI snapshot path
//!
//! All OpenCV usage is behind the `opencv` feature; without it the engine
//! reports no detections and sources fail to open, but everything compiles
//! and the rest of the system keeps running.

pub mod annotate;
pub mod backend;
pub mod engine;
pub mod error;
pub mod frame;
pub mod quality;
pub mod source;

pub use annotate::{annotate_frame, FaceLabel};
pub use backend::InferenceBackend;
pub use engine::{FaceDetection, FaceEngine};
pub use error::{VisionError, VisionResult};
pub use frame::Frame;
pub use quality::{QualityConfig, QualityScore, QualityScorer};
pub use source::{open_source, FrameSource, SourceKind};
