//! Daily attendance records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::EmployeeId;

/// Coarse daily attendance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Late => "LATE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRESENT" => Some(AttendanceStatus::Present),
            "ABSENT" => Some(AttendanceStatus::Absent),
            "LATE" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }
}

/// How an attendance row came to be.
///
/// `Manual` rows are pinned by an administrator and are never mutated by the
/// automatic writer; `System` marks end-of-day absent fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Auto,
    Manual,
    System,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Auto => "AUTO",
            EntryType::Manual => "MANUAL",
            EntryType::System => "SYSTEM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTO" => Some(EntryType::Auto),
            "MANUAL" => Some(EntryType::Manual),
            "SYSTEM" => Some(EntryType::System),
            _ => None,
        }
    }
}

/// One attendance row per `(employee, date)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendance {
    pub id: i64,
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    /// First moment the employee was seen that day.
    pub first_in_ts: Option<DateTime<Utc>>,
    /// Last moment the employee left the area that day.
    pub last_out_ts: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub entry_type: EntryType,
}
