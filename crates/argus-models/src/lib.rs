//! Shared data models for the Argus presence tracker.
//!
//! This crate provides Serde-serializable types for:
//! - Employees, face templates and cameras
//! - Daily attendance, live presence and detection events
//! - Alert logs with their schedule snapshot
//! - Write intents consumed by the serialized database writer
//! - Bounding-box geometry shared by detection and tracking
//! - Runtime parameters (`parameter_config.json`)

pub mod alert;
pub mod attendance;
pub mod camera;
pub mod employee;
pub mod event;
pub mod geometry;
pub mod intent;
pub mod params;
pub mod presence;
pub mod util;

/// Database identifier of an employee.
pub type EmployeeId = i64;
/// Database identifier of a camera.
pub type CameraId = i64;

pub use alert::{AlertLog, AlertType, ScheduleSnapshot};
pub use attendance::{Attendance, AttendanceStatus, EntryType};
pub use camera::{Camera, CameraConfig};
pub use employee::{Employee, FaceTemplate};
pub use event::Event;
pub use geometry::BoundingBox;
pub use intent::{NewEmployeeSeen, WriteIntent};
pub use params::RuntimeParams;
pub use presence::{Presence, PresenceStatus};
pub use util::TtlCache;
