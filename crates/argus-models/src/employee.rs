//! Employee master data and face templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EmployeeId;

/// An employee known to the system.
///
/// The supervisor link is advisory only; nothing in the core traverses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    /// External badge/HR code, unique.
    pub employee_code: String,
    pub name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone_number: Option<String>,
    pub is_active: bool,
    pub supervisor_id: Option<EmployeeId>,
}

/// A reference face embedding for one employee.
///
/// Immutable after insert; the vector is L2-normalized at enrollment time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceTemplate {
    pub id: i64,
    pub employee_id: EmployeeId,
    /// Fixed-length reference embedding.
    pub embedding: Vec<f32>,
    /// Optional pose label such as `front`, `left`, `right`.
    pub pose_label: Option<String>,
    /// Capture quality in `[0, 1]` if recorded at enrollment.
    pub quality_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}
