//! Runtime parameters loaded from `config/parameter_config.json`.
//!
//! Every field has a default so a missing or partial file yields a usable
//! configuration; unknown keys are ignored.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Runtime parameters for detection, tracking and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeParams {
    /// Detector input size `[width, height]`.
    pub detection_size: [u32; 2],
    /// Enrollment-side acceptance threshold. Loaded for compatibility; the
    /// identification path enforces `embedding_similarity_threshold` only.
    pub recognition_threshold: f64,
    /// Minimum cosine similarity to accept an identity candidate.
    pub embedding_similarity_threshold: f64,
    /// Seconds without a sighting before an employee flips to `off`.
    pub presence_timeout_sec: Option<f64>,
    /// Legacy name for `presence_timeout_sec`, honored as a fallback.
    pub tracking_timeout: Option<f64>,
    pub fps_target: u32,
    pub stream_max_width: u32,
    pub jpeg_quality: u8,
    /// Process every N-th polled frame.
    pub annotation_stride: u32,
    /// Capacity of the per-track identity vote window.
    pub smoothing_window: usize,
    /// Plurality votes required to finalize a track identity.
    pub smoothing_min_votes: usize,
    pub tracker_iou_threshold: f64,
    pub tracker_max_misses: u32,
    /// Minimum seconds between Event rows per `(employee, camera)`.
    pub event_min_interval_sec: f64,
    /// Minimum seconds between alerts per `(employee, alert type)`.
    pub alert_min_interval_sec: f64,
    pub quality_min_blur_var: f64,
    pub quality_min_face_area_frac: f64,
    pub quality_min_brightness: f64,
    pub quality_max_brightness: f64,
    pub quality_min_score: f64,
    pub mark_absent_enabled: bool,
    pub mark_absent_offset_minutes_before_end: i64,
    pub attendance_captures_retention_days: u32,
    pub attendance_first_in_overwrite_enabled: bool,
    pub attendance_last_out_delay_sec: u64,
    /// IANA zone for all schedule evaluation, e.g. `Asia/Jakarta`.
    pub timezone: String,
}

impl Default for RuntimeParams {
    fn default() -> Self {
        Self {
            detection_size: [640, 640],
            recognition_threshold: 0.65,
            embedding_similarity_threshold: 0.45,
            presence_timeout_sec: None,
            tracking_timeout: None,
            fps_target: 15,
            stream_max_width: 960,
            jpeg_quality: 70,
            annotation_stride: 3,
            smoothing_window: 8,
            smoothing_min_votes: 3,
            tracker_iou_threshold: 0.3,
            tracker_max_misses: 8,
            event_min_interval_sec: 5.0,
            alert_min_interval_sec: 60.0,
            quality_min_blur_var: 50.0,
            quality_min_face_area_frac: 0.01,
            quality_min_brightness: 0.15,
            quality_max_brightness: 0.9,
            quality_min_score: 0.3,
            mark_absent_enabled: true,
            mark_absent_offset_minutes_before_end: 0,
            attendance_captures_retention_days: 30,
            attendance_first_in_overwrite_enabled: false,
            attendance_last_out_delay_sec: 0,
            timezone: "Asia/Jakarta".to_string(),
        }
    }
}

impl RuntimeParams {
    /// Load from a JSON file, substituting defaults when the file is missing
    /// or unreadable. A corrupt file never takes the system down.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(params) => params,
                Err(_) => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Effective presence timeout in seconds.
    ///
    /// `presence_timeout_sec` wins; the legacy `tracking_timeout` key is the
    /// fallback, then 60 s.
    pub fn presence_timeout(&self) -> f64 {
        self.presence_timeout_sec
            .or(self.tracking_timeout)
            .unwrap_or(60.0)
    }

    /// Polling interval for the per-camera loops.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.fps_target.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let p = RuntimeParams::default();
        assert_eq!(p.detection_size, [640, 640]);
        assert_eq!(p.smoothing_min_votes, 3);
        assert!((p.presence_timeout() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_presence_timeout_fallback() {
        let p: RuntimeParams =
            serde_json::from_str(r#"{"tracking_timeout": 10.0}"#).unwrap();
        assert!((p.presence_timeout() - 10.0).abs() < f64::EPSILON);

        let p: RuntimeParams = serde_json::from_str(
            r#"{"presence_timeout_sec": 90.0, "tracking_timeout": 10.0}"#,
        )
        .unwrap();
        assert!((p.presence_timeout() - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let p: RuntimeParams =
            serde_json::from_str(r#"{"fps_target": 5, "jpeg_quality": 90}"#).unwrap();
        assert_eq!(p.fps_target, 5);
        assert_eq!(p.jpeg_quality, 90);
        assert_eq!(p.annotation_stride, 3);
    }

    #[test]
    fn test_load_corrupt_file_yields_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"{not json").unwrap();
        let p = RuntimeParams::load(f.path());
        assert_eq!(p.fps_target, RuntimeParams::default().fps_target);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let p = RuntimeParams::load(Path::new("/nonexistent/params.json"));
        assert_eq!(p.stream_max_width, 960);
    }
}
