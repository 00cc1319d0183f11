//! Recognized-detection events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CameraId, EmployeeId};

/// One recognized detection. Append-only; retention is "today only".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    /// `None` for unknown faces.
    pub employee_id: Option<EmployeeId>,
    pub camera_id: CameraId,
    pub timestamp: DateTime<Utc>,
    pub similarity: Option<f64>,
    /// Per-camera track that produced the detection, when known.
    pub track_id: Option<i64>,
}
