//! Schedule controller: work hours, lunch break and manual pauses.
//!
//! Derives `{tracking_active, suppress_alerts}` from the persisted state
//! every 15 seconds and on every mutation. The state file is rewritten
//! atomically; a corrupt file loads as defaults and is replaced on the
//! next change. `alerts_allowed()` is the gate the presence machine
//! consults before emitting ENTER/EXIT alerts.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use argus_models::ScheduleSnapshot;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::MonitorResult;
use crate::time::LocalClock;

/// How often the evaluator re-derives the state.
pub const EVALUATE_PERIOD: StdDuration = StdDuration::from_secs(15);

/// Kind of manual pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseKind {
    /// Tracking stays on, alerts are suppressed.
    Lunch,
    /// Tracking is off entirely.
    Offhours,
}

/// Persisted schedule state (`config/tracking_mode.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleState {
    pub auto_schedule: bool,
    pub work_hours: String,
    pub lunch_break: String,
    pub pause_until: Option<DateTime<Utc>>,
    pub pause_kind: Option<PauseKind>,
    pub tracking_active: bool,
    pub suppress_alerts: bool,
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self {
            auto_schedule: true,
            work_hours: "08:30-17:30".to_string(),
            lunch_break: "12:00-13:00".to_string(),
            pause_until: None,
            pause_kind: None,
            tracking_active: false,
            suppress_alerts: false,
        }
    }
}

/// Operator mutation for `set_mode`.
#[derive(Debug, Clone, Default)]
pub struct ModeUpdate {
    pub auto_schedule: Option<bool>,
    pub work_hours: Option<String>,
    pub lunch_break: Option<String>,
    /// Honored only when auto scheduling is off.
    pub tracking_active: Option<bool>,
    /// Honored only when auto scheduling is off.
    pub suppress_alerts: Option<bool>,
    pub clear_pause: bool,
}

/// Schedule controller with persisted state.
pub struct ScheduleController {
    path: PathBuf,
    clock: LocalClock,
    state: Mutex<ScheduleState>,
    snapshot_tx: watch::Sender<ScheduleSnapshot>,
}

impl ScheduleController {
    /// Load state from disk (defaults on a corrupt or missing file),
    /// clear any expired pause and derive the first values.
    pub fn load(path: impl Into<PathBuf>, clock: LocalClock) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<ScheduleState>(&text) {
                Ok(s) => s,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt schedule state; using defaults");
                    ScheduleState::default()
                }
            },
            Err(_) => ScheduleState::default(),
        };
        let (snapshot_tx, _) = watch::channel(snapshot_of(&state));
        let controller = Self {
            path,
            clock,
            state: Mutex::new(state),
            snapshot_tx,
        };
        controller.evaluate();
        controller
    }

    /// Receiver of schedule snapshots for other components (the writer
    /// stamps NEW_EMPLOYEE alerts from it).
    pub fn subscribe(&self) -> watch::Receiver<ScheduleSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Re-derive `{tracking_active, suppress_alerts}`; persist on change.
    pub fn evaluate(&self) {
        let now = self.clock.now_utc();
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let before = state.clone();

        if let Some(until) = state.pause_until {
            if now < until {
                match state.pause_kind.unwrap_or(PauseKind::Offhours) {
                    PauseKind::Lunch => {
                        state.tracking_active = true;
                        state.suppress_alerts = true;
                    }
                    PauseKind::Offhours => {
                        state.tracking_active = false;
                        state.suppress_alerts = false;
                    }
                }
                self.finish_evaluate(&before, &state);
                return;
            }
            info!(until = %until, "manual pause expired");
            state.pause_until = None;
            state.pause_kind = None;
        }

        if state.auto_schedule {
            let t = self.clock.local_time(now);
            state.tracking_active = in_range(t, &state.work_hours, (8, 30), (17, 30));
            state.suppress_alerts = in_range(t, &state.lunch_break, (12, 0), (13, 0));
        }
        self.finish_evaluate(&before, &state);
    }

    fn finish_evaluate(&self, before: &ScheduleState, after: &ScheduleState) {
        let changed = serde_json::to_string(before).ok() != serde_json::to_string(after).ok();
        if changed {
            if let Err(e) = persist(&self.path, after) {
                warn!(error = %e, "failed to persist schedule state");
            }
        }
        let _ = self.snapshot_tx.send_if_modified(|current| {
            let next = snapshot_of(after);
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }

    /// Alerts flow only while tracking is active and not suppressed.
    pub fn alerts_allowed(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.tracking_active && !state.suppress_alerts
    }

    pub fn tracking_active(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .tracking_active
    }

    /// Current state copy.
    pub fn state(&self) -> ScheduleState {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Schedule context stamped onto alert rows.
    pub fn snapshot(&self) -> ScheduleSnapshot {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        snapshot_of(&state)
    }

    /// Apply an operator mutation, then re-derive and persist.
    pub fn set_mode(&self, update: ModeUpdate) -> ScheduleState {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(auto) = update.auto_schedule {
                state.auto_schedule = auto;
            }
            if let Some(wh) = update.work_hours.filter(|s| s.contains('-')) {
                state.work_hours = wh;
            }
            if let Some(lb) = update.lunch_break.filter(|s| s.contains('-')) {
                state.lunch_break = lb;
            }
            if !state.auto_schedule {
                if let Some(active) = update.tracking_active {
                    state.tracking_active = active;
                }
                if let Some(suppress) = update.suppress_alerts {
                    state.suppress_alerts = suppress;
                }
            }
            if update.clear_pause {
                state.pause_until = None;
                state.pause_kind = None;
            }
        }
        self.evaluate();
        self.persist_now();
        self.state()
    }

    /// Pause tracking/alerts until `until`.
    pub fn pause_until(&self, until: DateTime<Utc>, kind: PauseKind) -> ScheduleState {
        {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.pause_until = Some(until);
            state.pause_kind = Some(kind);
        }
        self.evaluate();
        self.persist_now();
        self.state()
    }

    /// Pause for a number of minutes from now.
    pub fn pause_minutes(&self, minutes: i64, kind: PauseKind) -> ScheduleState {
        self.pause_until(self.clock.now_utc() + Duration::minutes(minutes.max(1)), kind)
    }

    fn persist_now(&self) {
        let state = self.state();
        if let Err(e) = persist(&self.path, &state) {
            warn!(error = %e, "failed to persist schedule state");
        }
    }
}

fn snapshot_of(state: &ScheduleState) -> ScheduleSnapshot {
    ScheduleSnapshot {
        work_hours: state.work_hours.clone(),
        lunch_break: state.lunch_break.clone(),
        is_manual_pause: state.pause_until.is_some(),
        tracking_active: state.tracking_active,
    }
}

/// Atomic rewrite: temp file in the same directory, then rename.
fn persist(path: &Path, state: &ScheduleState) -> MonitorResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Parse `"HH:MM-HH:MM"`, falling back to `fallback` on any problem.
fn parse_range(
    s: &str,
    fallback: ((u32, u32), (u32, u32)),
) -> ((u32, u32), (u32, u32)) {
    let parse_hm = |part: &str| -> Option<(u32, u32)> {
        let (h, m) = part.trim().split_once(':')?;
        let h: u32 = h.trim().parse().ok()?;
        let m: u32 = m.trim().parse().ok()?;
        (h < 24 && m < 60).then_some((h, m))
    };
    s.split_once('-')
        .and_then(|(a, b)| Some((parse_hm(a)?, parse_hm(b)?)))
        .unwrap_or(fallback)
}

/// Half-open containment: `start <= t < end` in local time.
fn in_range(t: NaiveTime, range: &str, fb_start: (u32, u32), fb_end: (u32, u32)) -> bool {
    let ((h1, m1), (h2, m2)) = parse_range(range, (fb_start, fb_end));
    let start = NaiveTime::from_hms_opt(h1, m1, 0).unwrap_or(NaiveTime::MIN);
    let end = NaiveTime::from_hms_opt(h2, m2, 0).unwrap_or(NaiveTime::MIN);
    start <= t && t < end
}
