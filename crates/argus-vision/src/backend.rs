//! Inference backend selection.
//!
//! Backends are probed in a fixed preference order (hardware inference
//! engine, then GPU, then CPU) and the first one that initializes wins.
//! Everything outside this crate treats the chosen backend as opaque.

use serde::{Deserialize, Serialize};

/// Available inference backends for face detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferenceBackend {
    /// OpenVINO inference engine (best CPU-adjacent performance).
    OpenVino,
    /// CUDA-backed DNN execution.
    Cuda,
    /// Plain CPU execution (universal fallback).
    Cpu,
}

impl InferenceBackend {
    /// Probe order: hardware-accelerated first, CPU last.
    pub fn preference_tiers() -> [InferenceBackend; 3] {
        [
            InferenceBackend::OpenVino,
            InferenceBackend::Cuda,
            InferenceBackend::Cpu,
        ]
    }
}

impl std::fmt::Display for InferenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceBackend::OpenVino => write!(f, "openvino"),
            InferenceBackend::Cuda => write!(f, "cuda"),
            InferenceBackend::Cpu => write!(f, "cpu"),
        }
    }
}
