//! Embedding matching and short-lived face tracking.
//!
//! - `EmbeddingStore`: per-employee reference embeddings with snapshot
//!   reloads and a cosine nearest-match query
//! - `FaceTracker`: per-camera IoU tracker with identity voting; only
//!   tracks whose vote reaches plurality emit "employee seen" signals

pub mod store;
pub mod tracker;

pub use store::{EmbeddingStore, EmployeeMeta, StoreSnapshot};
pub use tracker::{FaceTracker, TrackDetection, TrackObservation, TrackerConfig};
