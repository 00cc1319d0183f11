//! Detection-crop quality scoring.
//!
//! Scores a face crop on blur (Laplacian variance), brightness and relative
//! size. Detections below the minimum score stay in the tracker for
//! geometry but are excluded from identity voting.

use argus_models::{BoundingBox, RuntimeParams};

use crate::frame::Frame;

/// Thresholds for the quality subscores.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Laplacian variance at which the blur subscore saturates.
    pub min_blur_var: f64,
    /// Bbox/frame area fraction at which the size subscore saturates.
    pub min_face_area_frac: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
    /// Detections scoring below this are excluded from identification.
    pub min_score: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_blur_var: 50.0,
            min_face_area_frac: 0.01,
            min_brightness: 0.15,
            max_brightness: 0.9,
            min_score: 0.3,
        }
    }
}

impl QualityConfig {
    pub fn from_params(params: &RuntimeParams) -> Self {
        Self {
            min_blur_var: params.quality_min_blur_var,
            min_face_area_frac: params.quality_min_face_area_frac,
            min_brightness: params.quality_min_brightness,
            max_brightness: params.quality_max_brightness,
            min_score: params.quality_min_score,
        }
    }
}

/// Raw metrics and the weighted final score for one crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScore {
    pub score: f64,
    pub blur_var: f64,
    pub brightness: f64,
    pub area_frac: f64,
}

impl QualityScore {
    fn zero() -> Self {
        Self {
            score: 0.0,
            blur_var: 0.0,
            brightness: 0.0,
            area_frac: 0.0,
        }
    }
}

/// Scores detection crops against a fixed configuration.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Whether a score is good enough to feed the identity vote.
    pub fn accepts(&self, score: &QualityScore) -> bool {
        score.score >= self.config.min_score
    }

    /// Compute quality metrics for `bbox` within `frame`.
    ///
    /// Degenerate boxes (empty after clipping) score zero.
    pub fn score(&self, frame: &Frame, bbox: &BoundingBox) -> QualityScore {
        let crop = match frame.crop(bbox) {
            Some(c) => c,
            None => return QualityScore::zero(),
        };
        let gray = crop.to_gray();
        if gray.is_empty() {
            return QualityScore::zero();
        }

        let blur_var = laplacian_variance(&gray, crop.width as usize, crop.height as usize);
        let mean_gray = gray.iter().map(|&v| f64::from(v)).sum::<f64>() / gray.len() as f64;
        let brightness = mean_gray / 255.0;
        let area_frac = bbox.clip(frame.width, frame.height).area_fraction(frame.width, frame.height);

        let blur_score = (blur_var / self.config.min_blur_var.max(1.0)).clamp(0.0, 1.0);
        let bright_score = if brightness >= self.config.min_brightness
            && brightness <= self.config.max_brightness
        {
            1.0
        } else {
            0.0
        };
        let size_score =
            (area_frac / self.config.min_face_area_frac.max(1e-6)).clamp(0.0, 1.0);

        QualityScore {
            score: 0.5 * blur_score + 0.2 * bright_score + 0.3 * size_score,
            blur_var,
            brightness,
            area_frac,
        }
    }
}

/// Variance of the 4-neighbor Laplacian over a grayscale plane.
///
/// Border pixels are skipped; planes smaller than 3x3 yield 0.
fn laplacian_variance(gray: &[u8], width: usize, height: usize) -> f64 {
    if width < 3 || height < 3 {
        return 0.0;
    }
    let mut values = Vec::with_capacity((width - 2) * (height - 2));
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = f64::from(gray[y * width + x]);
            let up = f64::from(gray[(y - 1) * width + x]);
            let down = f64::from(gray[(y + 1) * width + x]);
            let left = f64::from(gray[y * width + x - 1]);
            let right = f64::from(gray[y * width + x + 1]);
            values.push(up + down + left + right - 4.0 * center);
        }
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}
