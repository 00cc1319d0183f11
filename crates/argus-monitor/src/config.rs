//! Monitor configuration: process settings from the environment, runtime
//! parameters and camera definitions from JSON files under the base
//! directory.

use std::path::{Path, PathBuf};

use argus_models::{Camera, CameraConfig, RuntimeParams};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::{MonitorError, MonitorResult};

/// Process-level configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Directory holding `config/`, `camera_configs/`, `captures/` and
    /// `attendance_captures/`.
    pub base_dir: PathBuf,
    pub database_url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            database_url: "sqlite://argus.db".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_dir: std::env::var("ARGUS_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://argus.db".to_string()),
        }
    }

    pub fn params_path(&self) -> PathBuf {
        self.base_dir.join("config").join("parameter_config.json")
    }

    pub fn tracking_state_path(&self) -> PathBuf {
        self.base_dir.join("config").join("tracking_mode.json")
    }

    pub fn camera_configs_dir(&self) -> PathBuf {
        self.base_dir.join("camera_configs")
    }

    pub fn captures_dir(&self) -> PathBuf {
        self.base_dir.join("captures")
    }

    pub fn attendance_captures_dir(&self) -> PathBuf {
        self.base_dir.join("attendance_captures")
    }

    /// Load runtime parameters, substituting defaults on any problem.
    pub fn load_params(&self) -> RuntimeParams {
        RuntimeParams::load(&self.params_path())
    }
}

/// Resolve the configured IANA zone, falling back to Asia/Jakarta.
pub fn resolve_timezone(params: &RuntimeParams) -> Tz {
    match params.timezone.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(zone = %params.timezone, "unknown timezone; using Asia/Jakarta");
            chrono_tz::Asia::Jakarta
        }
    }
}

/// Scan `camera_configs/<dir>/config.json` files into camera definitions.
///
/// Unreadable entries are skipped with a warning; a missing directory
/// yields an empty list.
pub fn load_camera_configs(dir: &Path) -> MonitorResult<Vec<Camera>> {
    let mut cameras = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(cameras),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let config_path = path.join("config.json");
        if !config_path.is_file() {
            continue;
        }
        match read_camera_config(&config_path) {
            Ok(cfg) => cameras.push(cfg.into()),
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "skipping bad camera config");
            }
        }
    }
    cameras.sort_by_key(|c: &Camera| c.id);
    Ok(cameras)
}

fn read_camera_config(path: &Path) -> MonitorResult<CameraConfig> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(MonitorError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_camera_configs() {
        let dir = tempfile::tempdir().unwrap();
        let cam_a = dir.path().join("cam_front");
        let cam_b = dir.path().join("cam_back");
        std::fs::create_dir_all(&cam_a).unwrap();
        std::fs::create_dir_all(&cam_b).unwrap();
        std::fs::write(
            cam_a.join("config.json"),
            r#"{"id": 2, "name": "Front", "rtsp_url": "rtsp://x/1", "area": "Entrance"}"#,
        )
        .unwrap();
        std::fs::write(
            cam_b.join("config.json"),
            r#"{"id": 1, "name": "Back", "rtsp_url": "0"}"#,
        )
        .unwrap();
        // one broken config is skipped
        let cam_c = dir.path().join("cam_broken");
        std::fs::create_dir_all(&cam_c).unwrap();
        std::fs::write(cam_c.join("config.json"), "{oops").unwrap();

        let cams = load_camera_configs(dir.path()).unwrap();
        assert_eq!(cams.len(), 2);
        assert_eq!(cams[0].id, 1);
        assert_eq!(cams[1].name, "Front");
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let cams = load_camera_configs(Path::new("/nonexistent/cameras")).unwrap();
        assert!(cams.is_empty());
    }

    #[test]
    fn test_resolve_timezone_fallback() {
        let mut params = RuntimeParams::default();
        params.timezone = "Not/AZone".into();
        assert_eq!(resolve_timezone(&params), chrono_tz::Asia::Jakarta);
        params.timezone = "Europe/Berlin".into();
        assert_eq!(resolve_timezone(&params), chrono_tz::Europe::Berlin);
    }
}
