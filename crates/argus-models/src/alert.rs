//! Alert log rows and the schedule snapshot attached to each.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CameraId, EmployeeId};

/// Kind of alert emitted by the presence state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Enter,
    Exit,
    NewEmployee,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Enter => "ENTER",
            AlertType::Exit => "EXIT",
            AlertType::NewEmployee => "NEW_EMPLOYEE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ENTER" => Some(AlertType::Enter),
            "EXIT" => Some(AlertType::Exit),
            "NEW_EMPLOYEE" => Some(AlertType::NewEmployee),
            _ => None,
        }
    }
}

/// Schedule state at the moment an alert was emitted.
///
/// Stored denormalized on every alert row so reports can explain why an
/// alert was or was not expected at that time of day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub work_hours: String,
    pub lunch_break: String,
    pub is_manual_pause: bool,
    pub tracking_active: bool,
}

/// Durable record of an ENTER/EXIT/NEW_EMPLOYEE transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertLog {
    pub id: i64,
    pub employee_id: EmployeeId,
    pub camera_id: Option<CameraId>,
    pub timestamp: DateTime<Utc>,
    pub alert_type: AlertType,
    pub message: Option<String>,
    /// Recipient description for the out-of-process notifier, when any.
    pub notified_to: Option<String>,
    /// Whether an external notifier acknowledged this alert.
    pub notified_external: bool,
    pub schedule: ScheduleSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_type_round_trip() {
        for t in [AlertType::Enter, AlertType::Exit, AlertType::NewEmployee] {
            assert_eq!(AlertType::parse(t.as_str()), Some(t));
        }
        assert_eq!(AlertType::parse("OUT_OF_AREA"), None);
    }
}
