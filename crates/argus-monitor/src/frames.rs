//! Latest-frame buffers shared between capture, inference and snapshots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use argus_models::CameraId;
use argus_vision::Frame;

/// Single-slot latest-frame buffer.
///
/// A new frame overwrites any unread frame; readers get a copy so the
/// critical section stays short.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<Frame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: Frame) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(frame);
    }

    /// Copy of the latest frame, if any.
    pub fn latest(&self) -> Option<Frame> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }
}

/// Per-camera frame slots.
#[derive(Default)]
pub struct FrameHub {
    slots: RwLock<HashMap<CameraId, FrameSlot>>,
}

impl FrameHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for a camera, created on first use.
    pub fn slot(&self, camera_id: CameraId) -> FrameSlot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&camera_id)
        {
            return slot.clone();
        }
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        slots.entry(camera_id).or_default().clone()
    }

    /// Copy of the latest frame for a camera.
    pub fn latest(&self, camera_id: CameraId) -> Option<Frame> {
        self.slots
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&camera_id)
            .and_then(FrameSlot::latest)
    }

    /// Drop a camera's slot, e.g. when its workers stop.
    pub fn remove(&self, camera_id: CameraId) {
        self.slots
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&camera_id);
    }

    pub fn camera_ids(&self) -> Vec<CameraId> {
        let mut ids: Vec<CameraId> = self
            .slots
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_overwrites_unread() {
        let slot = FrameSlot::new();
        slot.store(Frame::zeros(2, 2));
        slot.store(Frame::zeros(4, 4));
        let latest = slot.latest().unwrap();
        assert_eq!(latest.width, 4);
        // reading does not consume
        assert!(slot.latest().is_some());
    }

    #[test]
    fn test_hub_slot_identity() {
        let hub = FrameHub::new();
        let a = hub.slot(1);
        a.store(Frame::zeros(8, 8));
        // same underlying slot through the hub
        assert_eq!(hub.latest(1).unwrap().width, 8);
        assert!(hub.latest(2).is_none());
        hub.remove(1);
        assert!(hub.latest(1).is_none());
    }
}
