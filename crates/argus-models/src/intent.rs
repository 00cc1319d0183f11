//! Write intents consumed by the serialized database writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertType, ScheduleSnapshot};
use crate::{CameraId, EmployeeId};

/// A state-change intent enqueued by the presence state machine.
///
/// Intents are applied in enqueue order by a single consumer, which gives
/// per-employee upserts a strict happened-before with the source signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WriteIntent {
    /// A finalized track observed this employee on a camera.
    EmployeeSeen {
        employee_id: EmployeeId,
        camera_id: CameraId,
        ts: DateTime<Utc>,
        similarity: f64,
        track_id: Option<i64>,
    },
    /// The employee has not been seen for longer than the presence timeout.
    EmployeeTimeout {
        employee_id: EmployeeId,
        ts: DateTime<Utc>,
    },
    /// Append an alert log row.
    AlertEmit {
        employee_id: EmployeeId,
        camera_id: Option<CameraId>,
        ts: DateTime<Utc>,
        alert_type: AlertType,
        message: String,
        schedule: ScheduleSnapshot,
    },
}

impl WriteIntent {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            WriteIntent::EmployeeSeen { .. } => "employee_seen",
            WriteIntent::EmployeeTimeout { .. } => "employee_timeout",
            WriteIntent::AlertEmit { .. } => "alert_emit",
        }
    }
}

/// Published on a typed channel when a newly enrolled employee is first seen.
///
/// Consumed by external subscribers (UI push, notifiers) and by the evidence
/// writer, which forces a first-in capture for the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmployeeSeen {
    pub employee_id: EmployeeId,
    pub camera_id: CameraId,
    pub ts: DateTime<Utc>,
}
