//! Camera master data and per-camera configuration files.

use serde::{Deserialize, Serialize};

use crate::CameraId;

/// A camera known to the system, kept in sync with `camera_configs/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: CameraId,
    pub name: String,
    /// Area tag such as `Entrance Zone` or `Production Area`.
    pub area: Option<String>,
    /// Source URL: `rtsp://…`, a bare device index, or `webcam:<n>`.
    pub source_url: String,
    pub enabled: bool,
    pub stream_enabled: bool,
}

/// On-disk shape of `camera_configs/<dir>/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: CameraId,
    pub name: String,
    #[serde(default)]
    pub rtsp_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub stream_enabled: bool,
    #[serde(default)]
    pub area: Option<String>,
}

fn default_true() -> bool {
    true
}

impl From<CameraConfig> for Camera {
    fn from(cfg: CameraConfig) -> Self {
        Camera {
            id: cfg.id,
            name: cfg.name,
            area: cfg.area,
            source_url: cfg.rtsp_url,
            enabled: cfg.enabled,
            stream_enabled: cfg.stream_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let cfg: CameraConfig =
            serde_json::from_str(r#"{"id": 3, "name": "Lobby"}"#).unwrap();
        assert!(cfg.enabled);
        assert!(!cfg.stream_enabled);
        assert_eq!(cfg.rtsp_url, "");
        assert!(cfg.area.is_none());
    }

    #[test]
    fn test_config_into_camera() {
        let cfg: CameraConfig = serde_json::from_str(
            r#"{"id": 1, "name": "Gate", "rtsp_url": "rtsp://cam/1", "area": "Entrance Zone", "stream_enabled": true}"#,
        )
        .unwrap();
        let cam: Camera = cfg.into();
        assert_eq!(cam.id, 1);
        assert_eq!(cam.source_url, "rtsp://cam/1");
        assert_eq!(cam.area.as_deref(), Some("Entrance Zone"));
        assert!(cam.stream_enabled);
    }
}
