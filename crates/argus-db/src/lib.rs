//! SQL persistence for the Argus presence tracker.
//!
//! Typed repositories over SQLite (runtime queries, no compile-time
//! macros), plus the serialized intent writer that applies presence,
//! attendance, event and alert mutations in enqueue order.
//!
//! ## Modules
//! - `db` - pool construction and schema bootstrap
//! - `employees` / `templates` / `cameras` - master data repositories
//! - `attendance` / `presence` / `events` / `alerts` - per-day state
//! - `writer` - single consumer of `WriteIntent`s

pub mod alerts;
pub mod attendance;
pub mod cameras;
pub mod db;
pub mod employees;
pub mod error;
pub mod events;
pub mod presence;
pub mod schema;
pub mod templates;
pub mod writer;

pub use alerts::AlertRepository;
pub use attendance::AttendanceRepository;
pub use cameras::CameraRepository;
pub use db::Db;
pub use employees::EmployeeRepository;
pub use error::{DbError, DbResult};
pub use events::EventRepository;
pub use presence::PresenceRepository;
pub use templates::FaceTemplateRepository;
pub use writer::{IntentWriter, WriterConfig};
