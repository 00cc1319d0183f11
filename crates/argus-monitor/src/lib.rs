//! Tracking and presence pipeline.
//!
//! This crate assembles the soft-realtime face pipeline: per-camera
//! capture and inference workers, the presence state machine, the
//! schedule controller gating alerts, the serialized writer feed, and
//! the capture/retention daemons. The `Monitor` type owns the pipeline;
//! `MonitorState` is the read-only surface handed to the UI collaborator.

pub mod capture;
pub mod config;
pub mod error;
pub mod evidence;
pub mod frames;
pub mod inference;
pub mod monitor;
pub mod presence;
pub mod retention;
pub mod schedule;
pub mod snapshots;
pub mod state;
pub mod time;

pub use capture::{default_source_factory, SourceFactory};
pub use config::MonitorConfig;
pub use error::{MonitorError, MonitorResult};
pub use evidence::{EvidenceKind, EvidenceRequest, EvidenceWriter, FrameView};
pub use monitor::Monitor;
pub use presence::{PresenceBoard, PresenceConfig, PresenceEntry};
pub use schedule::{ModeUpdate, PauseKind, ScheduleController, ScheduleState};
pub use state::{MonitorState, StateItem, StateReport, StreamPreferences};
pub use time::LocalClock;
