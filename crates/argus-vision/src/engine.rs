//! Face detection and embedding engine.
//!
//! Wraps the YuNet detector and SFace recognizer behind a small interface:
//! `detect` returns bounding boxes with optional L2-normalized embeddings,
//! `embed` computes an embedding for a given box. Initialization walks the
//! backend preference tiers and warms the models up on a zero frame; if no
//! backend comes up the engine stays empty and `detect` returns nothing,
//! which keeps the rest of the system alive.

use argus_models::BoundingBox;
use tracing::{info, warn};

use crate::backend::InferenceBackend;
use crate::frame::Frame;

/// One detected face, with its embedding when the recognizer produced one.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    /// L2-normalized embedding, absent when extraction failed.
    pub embedding: Option<Vec<f32>>,
}

/// Detection + embedding engine shared by all camera workers.
pub struct FaceEngine {
    detection_size: (u32, u32),
    backend: Option<InferenceBackend>,
    #[cfg(feature = "opencv")]
    inner: Option<std::sync::Mutex<cv::CvEngine>>,
}

impl FaceEngine {
    /// Initialize with the given detector input size.
    ///
    /// Never fails: on total backend failure the engine is empty and every
    /// `detect` call returns an empty list.
    pub fn new(detection_size: (u32, u32)) -> Self {
        #[cfg(feature = "opencv")]
        {
            match cv::CvEngine::init(detection_size) {
                Ok((inner, backend)) => {
                    info!(backend = %backend, det_size = ?detection_size, "face engine ready");
                    let engine = Self {
                        detection_size,
                        backend: Some(backend),
                        inner: Some(std::sync::Mutex::new(inner)),
                    };
                    engine.warmup();
                    engine
                }
                Err(e) => {
                    warn!(error = %e, "face engine initialization failed; detections disabled");
                    Self {
                        detection_size,
                        backend: None,
                        inner: None,
                    }
                }
            }
        }
        #[cfg(not(feature = "opencv"))]
        {
            warn!("built without the opencv feature; detections disabled");
            Self {
                detection_size,
                backend: None,
            }
        }
    }

    /// Backend chosen at initialization, if any.
    pub fn backend(&self) -> Option<InferenceBackend> {
        self.backend
    }

    /// Detector input size `(width, height)`.
    pub fn detection_size(&self) -> (u32, u32) {
        self.detection_size
    }

    /// Whether a backend initialized successfully.
    pub fn is_ready(&self) -> bool {
        self.backend.is_some()
    }

    /// Detect faces in a frame.
    ///
    /// An empty engine, an empty frame or a backend error all yield an
    /// empty list; detection failures are logged, never propagated.
    pub fn detect(&self, frame: &Frame) -> Vec<FaceDetection> {
        if frame.is_empty() {
            return Vec::new();
        }
        #[cfg(feature = "opencv")]
        {
            if let Some(inner) = &self.inner {
                let mut guard = match inner.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match guard.detect(frame) {
                    Ok(dets) => {
                        metrics::counter!("argus_faces_detected_total")
                            .increment(dets.len() as u64);
                        return dets;
                    }
                    Err(e) => {
                        warn!(error = %e, "detection failed");
                        return Vec::new();
                    }
                }
            }
        }
        Vec::new()
    }

    /// Compute an embedding for a face at `bbox`.
    pub fn embed(&self, frame: &Frame, bbox: &BoundingBox) -> Option<Vec<f32>> {
        if frame.is_empty() {
            return None;
        }
        #[cfg(feature = "opencv")]
        {
            if let Some(inner) = &self.inner {
                let mut guard = match inner.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match guard.embed(frame, bbox) {
                    Ok(vec) => return vec,
                    Err(e) => {
                        warn!(error = %e, "embedding failed");
                        return None;
                    }
                }
            }
        }
        let _ = bbox;
        None
    }

    /// Run one detection on a zero frame to initialize kernels.
    fn warmup(&self) {
        let (w, h) = self.detection_size;
        let _ = self.detect(&Frame::zeros(w, h));
    }
}

/// Normalize a vector to unit L2 length in place.
///
/// A zero vector is left untouched.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(feature = "opencv")]
mod cv {
    //! OpenCV-backed detector and recognizer.

    use opencv::core::{Mat, Size, CV_8UC3};
    use opencv::dnn;
    use opencv::objdetect::{FaceDetectorYN, FaceRecognizerSF};
    use opencv::prelude::*;
    use tracing::debug;

    use argus_models::BoundingBox;

    use super::{l2_normalize, FaceDetection, InferenceBackend};
    use crate::error::{VisionError, VisionResult};
    use crate::frame::Frame;

    const DETECT_MODEL: &str = "face_detection_yunet_2023mar.onnx";
    const RECOGNIZE_MODEL: &str = "face_recognition_sface_2021dec.onnx";

    pub(super) struct CvEngine {
        detector: opencv::core::Ptr<FaceDetectorYN>,
        recognizer: opencv::core::Ptr<FaceRecognizerSF>,
    }

    impl CvEngine {
        /// Walk the backend tiers; first one that constructs both models wins.
        pub(super) fn init(
            detection_size: (u32, u32),
        ) -> VisionResult<(Self, InferenceBackend)> {
            let model_dir = std::env::var("ARGUS_MODELS_DIR")
                .unwrap_or_else(|_| "models".to_string());
            let detect_path = format!("{model_dir}/{DETECT_MODEL}");
            let recognize_path = format!("{model_dir}/{RECOGNIZE_MODEL}");

            let mut last_err = None;
            for backend in InferenceBackend::preference_tiers() {
                match Self::try_backend(&detect_path, &recognize_path, detection_size, backend)
                {
                    Ok(engine) => return Ok((engine, backend)),
                    Err(e) => {
                        debug!(backend = %backend, error = %e, "backend unavailable");
                        last_err = Some(e);
                    }
                }
            }
            Err(last_err
                .unwrap_or_else(|| VisionError::backend_init("no backend tier available")))
        }

        fn try_backend(
            detect_path: &str,
            recognize_path: &str,
            detection_size: (u32, u32),
            backend: InferenceBackend,
        ) -> VisionResult<Self> {
            let (backend_id, target_id) = match backend {
                InferenceBackend::OpenVino => {
                    (dnn::DNN_BACKEND_INFERENCE_ENGINE, dnn::DNN_TARGET_CPU)
                }
                InferenceBackend::Cuda => (dnn::DNN_BACKEND_CUDA, dnn::DNN_TARGET_CUDA),
                InferenceBackend::Cpu => (dnn::DNN_BACKEND_OPENCV, dnn::DNN_TARGET_CPU),
            };
            let detector = FaceDetectorYN::create(
                detect_path,
                "",
                Size::new(detection_size.0 as i32, detection_size.1 as i32),
                0.6,
                0.3,
                5000,
                backend_id,
                target_id,
            )?;
            let recognizer =
                FaceRecognizerSF::create(recognize_path, "", backend_id, target_id)?;
            Ok(Self {
                detector,
                recognizer,
            })
        }

        fn frame_to_mat(frame: &Frame) -> VisionResult<Mat> {
            let mat = Mat::from_slice(&frame.data)?;
            let mat = mat.reshape(3, frame.height as i32)?.try_clone()?;
            if mat.typ() != CV_8UC3 {
                return Err(VisionError::detection_failed("unexpected mat type"));
            }
            Ok(mat)
        }

        pub(super) fn detect(&mut self, frame: &Frame) -> VisionResult<Vec<FaceDetection>> {
            let mat = Self::frame_to_mat(frame)?;
            self.detector
                .set_input_size(Size::new(frame.width as i32, frame.height as i32))?;
            let mut faces = Mat::default();
            self.detector.detect(&mat, &mut faces)?;

            let mut out = Vec::new();
            for row in 0..faces.rows() {
                // YuNet rows: x, y, w, h, 10 landmark floats, score
                let x = f64::from(*faces.at_2d::<f32>(row, 0)?);
                let y = f64::from(*faces.at_2d::<f32>(row, 1)?);
                let w = f64::from(*faces.at_2d::<f32>(row, 2)?);
                let h = f64::from(*faces.at_2d::<f32>(row, 3)?);
                let confidence = f64::from(*faces.at_2d::<f32>(row, 14)?);
                let face_row = faces.row(row)?.try_clone()?;
                let embedding = self.extract_embedding(&mat, &face_row).ok();
                out.push(FaceDetection {
                    bbox: BoundingBox::new(x, y, w, h).clip(frame.width, frame.height),
                    confidence,
                    embedding,
                });
            }
            Ok(out)
        }

        pub(super) fn embed(
            &mut self,
            frame: &Frame,
            bbox: &BoundingBox,
        ) -> VisionResult<Option<Vec<f32>>> {
            // Re-detect and take the detection closest to the requested box;
            // SFace alignment needs the landmark row from the detector.
            let dets = self.detect(frame)?;
            let best = dets
                .into_iter()
                .filter(|d| d.embedding.is_some())
                .max_by(|a, b| {
                    a.bbox
                        .iou(bbox)
                        .partial_cmp(&b.bbox.iou(bbox))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            Ok(best.and_then(|d| d.embedding))
        }

        fn extract_embedding(&mut self, image: &Mat, face_row: &Mat) -> VisionResult<Vec<f32>> {
            let mut aligned = Mat::default();
            self.recognizer.align_crop(image, face_row, &mut aligned)?;
            let mut feature = Mat::default();
            self.recognizer.feature(&aligned, &mut feature)?;
            let mut vec: Vec<f32> = feature.data_typed::<f32>()?.to_vec();
            l2_normalize(&mut vec);
            Ok(vec)
        }
    }
}
