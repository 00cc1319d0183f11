//! IoU-based tracker with identity voting, one instance per camera.
//!
//! Greedy best-IoU association keeps short-lived tracks alive across
//! frames; each matched detection may add an identity vote, and only a
//! plurality winner with enough votes finalizes the track. Voting
//! suppresses single-frame misidentifications; IoU suffices because at
//! camera framerates neighboring face detections overlap substantially.

use std::collections::{HashMap, VecDeque};

use argus_models::{BoundingBox, EmployeeId};
use chrono::{DateTime, Utc};

/// Tracker tuning knobs.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum IoU to match a detection to an existing track.
    pub iou_threshold: f64,
    /// Misses after which a track is dropped.
    pub max_misses: u32,
    /// Capacity of the per-track vote window.
    pub vote_window: usize,
    /// Plurality votes required to finalize an identity.
    pub min_votes: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_misses: 8,
            vote_window: 8,
            min_votes: 3,
        }
    }
}

/// One detection handed to the tracker for a frame.
#[derive(Debug, Clone)]
pub struct TrackDetection {
    pub bbox: BoundingBox,
    /// Identity candidate, absent for unknown or low-quality faces.
    pub candidate: Option<EmployeeId>,
    pub similarity: f64,
    pub quality: f64,
}

/// Emitted when a finalized track observes its employee.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackObservation {
    pub track_id: i64,
    pub employee_id: EmployeeId,
    pub similarity: f64,
}

#[derive(Debug)]
struct Track {
    id: i64,
    bbox: BoundingBox,
    last_ts: DateTime<Utc>,
    hits: u32,
    misses: u32,
    votes: VecDeque<EmployeeId>,
    final_employee_id: Option<EmployeeId>,
    final_since: Option<DateTime<Utc>>,
}

impl Track {
    fn new(id: i64, bbox: BoundingBox, now: DateTime<Utc>) -> Self {
        Self {
            id,
            bbox,
            last_ts: now,
            hits: 1,
            misses: 0,
            votes: VecDeque::new(),
            final_employee_id: None,
            final_since: None,
        }
    }

    fn push_vote(&mut self, candidate: EmployeeId, window: usize) {
        if self.votes.len() >= window.max(1) {
            self.votes.pop_front();
        }
        self.votes.push_back(candidate);
    }

    /// Plurality winner of the vote window; ties go to the lowest id.
    fn plurality(&self) -> Option<(EmployeeId, usize)> {
        let mut counts: HashMap<EmployeeId, usize> = HashMap::new();
        for v in &self.votes {
            *counts.entry(*v).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
    }
}

/// Short-lived multi-object tracker for one camera.
pub struct FaceTracker {
    config: TrackerConfig,
    tracks: HashMap<i64, Track>,
    next_track_id: i64,
}

impl FaceTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
            next_track_id: 1,
        }
    }

    /// Update tracks with one frame's detections.
    ///
    /// Returns an observation for every matched detection whose track has a
    /// finalized identity after this frame's vote.
    pub fn update(
        &mut self,
        detections: &[TrackDetection],
        now: DateTime<Utc>,
    ) -> Vec<TrackObservation> {
        let mut unmatched: Vec<usize> = (0..detections.len()).collect();
        let mut assignments: Vec<(i64, usize)> = Vec::new();

        // Track-major greedy matching: each track takes its best remaining
        // detection when the IoU clears the threshold.
        let mut track_ids: Vec<i64> = self.tracks.keys().copied().collect();
        track_ids.sort_unstable();
        for tid in track_ids {
            let track = &self.tracks[&tid];
            let mut best_iou = 0.0;
            let mut best_idx = None;
            for &j in &unmatched {
                let iou = track.bbox.iou(&detections[j].bbox);
                if iou > best_iou {
                    best_iou = iou;
                    best_idx = Some(j);
                }
            }
            match best_idx {
                Some(j) if best_iou >= self.config.iou_threshold => {
                    assignments.push((tid, j));
                    unmatched.retain(|&idx| idx != j);
                }
                _ => {
                    self.tracks.get_mut(&tid).expect("track exists").misses += 1;
                }
            }
        }

        let mut observations = Vec::new();
        for (tid, j) in assignments {
            let det = &detections[j];
            let track = self.tracks.get_mut(&tid).expect("track exists");
            track.bbox = det.bbox;
            track.last_ts = now;
            track.hits += 1;
            track.misses = 0;
            if let Some(candidate) = det.candidate {
                track.push_vote(candidate, self.config.vote_window);
                if let Some((winner, count)) = track.plurality() {
                    if count >= self.config.min_votes.max(1) {
                        track.final_employee_id = Some(winner);
                        if track.final_since.is_none() {
                            track.final_since = Some(now);
                        }
                        observations.push(TrackObservation {
                            track_id: track.id,
                            employee_id: winner,
                            similarity: det.similarity,
                        });
                    }
                }
            }
        }

        // New tracks for unmatched detections.
        for j in unmatched {
            let det = &detections[j];
            let tid = self.next_track_id;
            self.next_track_id += 1;
            let mut track = Track::new(tid, det.bbox, now);
            if let Some(candidate) = det.candidate {
                track.push_vote(candidate, self.config.vote_window);
            }
            self.tracks.insert(tid, track);
        }

        // Evict stale tracks.
        let max_misses = self.config.max_misses;
        self.tracks.retain(|_, t| t.misses <= max_misses);

        observations
    }

    /// Number of live tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Drop all tracks, keeping the id counter monotonic.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f64, candidate: Option<EmployeeId>) -> TrackDetection {
        TrackDetection {
            bbox: BoundingBox::new(x, 100.0, 50.0, 50.0),
            candidate,
            similarity: 0.8,
            quality: 0.9,
        }
    }

    fn tracker() -> FaceTracker {
        FaceTracker::new(TrackerConfig::default())
    }

    #[test]
    fn test_new_detections_open_tracks() {
        let mut t = tracker();
        let now = Utc::now();
        let obs = t.update(&[det(100.0, None), det(300.0, None)], now);
        assert!(obs.is_empty());
        assert_eq!(t.track_count(), 2);
    }

    #[test]
    fn test_track_matching_keeps_identity() {
        let mut t = tracker();
        let now = Utc::now();
        t.update(&[det(100.0, Some(7))], now);
        // slightly moved box matches the same track
        t.update(&[det(105.0, Some(7))], now);
        let obs = t.update(&[det(110.0, Some(7))], now);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].employee_id, 7);
        assert_eq!(t.track_count(), 1);
    }

    #[test]
    fn test_no_emission_before_min_votes() {
        let mut t = tracker();
        let now = Utc::now();
        assert!(t.update(&[det(100.0, Some(7))], now).is_empty());
        assert!(t.update(&[det(102.0, Some(7))], now).is_empty());
        assert_eq!(t.update(&[det(104.0, Some(7))], now).len(), 1);
    }

    #[test]
    fn test_voting_suppresses_single_misidentification() {
        let mut t = tracker();
        let now = Utc::now();
        t.update(&[det(100.0, Some(7))], now);
        t.update(&[det(101.0, Some(9))], now); // one bad frame
        t.update(&[det(102.0, Some(7))], now);
        let obs = t.update(&[det(103.0, Some(7))], now);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].employee_id, 7);
    }

    #[test]
    fn test_unknown_frames_do_not_vote() {
        let mut t = tracker();
        let now = Utc::now();
        t.update(&[det(100.0, Some(7))], now);
        t.update(&[det(101.0, None)], now);
        t.update(&[det(102.0, Some(7))], now);
        // only two votes so far
        assert!(t.update(&[det(103.0, None)], now).is_empty());
        assert_eq!(t.update(&[det(104.0, Some(7))], now).len(), 1);
    }

    #[test]
    fn test_eviction_after_max_misses() {
        let mut t = FaceTracker::new(TrackerConfig {
            max_misses: 2,
            ..TrackerConfig::default()
        });
        let now = Utc::now();
        t.update(&[det(100.0, None)], now);
        t.update(&[], now); // miss 1
        t.update(&[], now); // miss 2
        assert_eq!(t.track_count(), 1);
        t.update(&[], now); // miss 3 > max
        assert_eq!(t.track_count(), 0);
    }

    #[test]
    fn test_track_ids_monotonic() {
        let mut t = FaceTracker::new(TrackerConfig {
            max_misses: 0,
            ..TrackerConfig::default()
        });
        let now = Utc::now();
        t.update(&[det(100.0, None)], now);
        t.update(&[], now); // evict
        t.update(&[det(500.0, None)], now);
        // second track got a fresh id even though the first is gone
        assert_eq!(t.next_track_id, 3);
    }

    #[test]
    fn test_distant_detection_opens_new_track() {
        let mut t = tracker();
        let now = Utc::now();
        t.update(&[det(100.0, None)], now);
        t.update(&[det(400.0, None)], now);
        assert_eq!(t.track_count(), 2);
    }

    #[test]
    fn test_vote_window_bounded() {
        let mut t = FaceTracker::new(TrackerConfig {
            vote_window: 3,
            min_votes: 3,
            ..TrackerConfig::default()
        });
        let now = Utc::now();
        // fill window with 9, then outvote with 7s: window keeps only 3
        t.update(&[det(100.0, Some(9))], now);
        t.update(&[det(100.0, Some(9))], now);
        t.update(&[det(100.0, Some(9))], now);
        t.update(&[det(100.0, Some(7))], now);
        t.update(&[det(100.0, Some(7))], now);
        let obs = t.update(&[det(100.0, Some(7))], now);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].employee_id, 7);
    }
}
