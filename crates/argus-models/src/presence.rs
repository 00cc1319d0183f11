//! Live presence status, one row per employee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CameraId, EmployeeId};

/// Whether an employee has been seen recently enough to count as in-area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Available,
    Off,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Available => "available",
            PresenceStatus::Off => "off",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(PresenceStatus::Available),
            "off" => Some(PresenceStatus::Off),
            _ => None,
        }
    }
}

/// Singleton presence record per employee, upserted by the writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presence {
    pub employee_id: EmployeeId,
    pub status: PresenceStatus,
    pub last_seen_ts: Option<DateTime<Utc>>,
    pub last_camera_id: Option<CameraId>,
}
