//! Reference embedding store.
//!
//! Holds every employee's reference embeddings plus display metadata.
//! Reloads replace the whole snapshot atomically; readers keep whatever
//! snapshot they grabbed, so a reload never tears a query. The store does
//! not touch the database itself - a refresher task fetches rows and calls
//! `install`, rate-limited through `should_reload`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use argus_models::EmployeeId;
use tracing::debug;

/// Display metadata carried next to the embeddings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeMeta {
    pub name: String,
    pub department: Option<String>,
    pub is_active: bool,
}

/// One immutable generation of the store.
#[derive(Debug, Default)]
pub struct StoreSnapshot {
    /// Reference embeddings per employee, all L2-normalized.
    by_employee: BTreeMap<EmployeeId, Vec<Vec<f32>>>,
    meta: BTreeMap<EmployeeId, EmployeeMeta>,
}

impl StoreSnapshot {
    pub fn new(
        by_employee: BTreeMap<EmployeeId, Vec<Vec<f32>>>,
        meta: BTreeMap<EmployeeId, EmployeeMeta>,
    ) -> Self {
        Self { by_employee, meta }
    }

    pub fn meta(&self, employee_id: EmployeeId) -> Option<&EmployeeMeta> {
        self.meta.get(&employee_id)
    }

    pub fn iter_meta(&self) -> impl Iterator<Item = (&EmployeeId, &EmployeeMeta)> {
        self.meta.iter()
    }

    pub fn template_count(&self) -> usize {
        self.by_employee.values().map(Vec::len).sum()
    }

    pub fn active_employee_count(&self) -> usize {
        self.meta.values().filter(|m| m.is_active).count()
    }
}

/// Default minimum interval between reloads.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

/// Thread-safe embedding store with rate-limited snapshot reloads.
pub struct EmbeddingStore {
    snapshot: RwLock<Arc<StoreSnapshot>>,
    last_load: Mutex<Option<Instant>>,
    reload_interval: Duration,
}

impl Default for EmbeddingStore {
    fn default() -> Self {
        Self::new(DEFAULT_RELOAD_INTERVAL)
    }
}

impl EmbeddingStore {
    pub fn new(reload_interval: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(StoreSnapshot::default())),
            last_load: Mutex::new(None),
            reload_interval,
        }
    }

    /// Whether a reload is due. Claims the slot when it returns true, so
    /// concurrent callers cannot both reload.
    pub fn should_reload(&self, force: bool) -> bool {
        let mut last = self.last_load.lock().unwrap_or_else(|p| p.into_inner());
        let due = force
            || last.map_or(true, |t| t.elapsed() >= self.reload_interval);
        if due {
            *last = Some(Instant::now());
        }
        due
    }

    /// Install a freshly loaded snapshot. Embeddings are normalized here so
    /// queries can assume unit length.
    pub fn install(
        &self,
        mut by_employee: BTreeMap<EmployeeId, Vec<Vec<f32>>>,
        meta: BTreeMap<EmployeeId, EmployeeMeta>,
    ) {
        for vectors in by_employee.values_mut() {
            for v in vectors.iter_mut() {
                normalize(v);
            }
        }
        let next = Arc::new(StoreSnapshot::new(by_employee, meta));
        debug!(
            employees = next.meta.len(),
            templates = next.template_count(),
            "embedding snapshot installed"
        );
        let mut guard = self.snapshot.write().unwrap_or_else(|p| p.into_inner());
        *guard = next;
    }

    /// Current snapshot; cheap to clone, never blocks writers for long.
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Nearest reference embedding by cosine similarity.
    ///
    /// Returns `(None, 0.0)` for an empty query or empty store. Negative
    /// best similarity is clamped to 0. Ties go to the lowest employee id.
    pub fn best_match(&self, query: &[f32]) -> (Option<EmployeeId>, f64) {
        if query.is_empty() {
            return (None, 0.0);
        }
        let mut q = query.to_vec();
        normalize(&mut q);

        let snapshot = self.snapshot();
        let mut best_emp = None;
        let mut best_sim = f64::MIN;
        // BTreeMap iterates in ascending id order, so a strict `>` keeps
        // the lowest employee id on exact ties.
        for (emp_id, refs) in &snapshot.by_employee {
            for r in refs {
                let sim = dot(&q, r);
                if sim > best_sim {
                    best_sim = sim;
                    best_emp = Some(*emp_id);
                }
            }
        }
        match best_emp {
            Some(id) => (Some(id), best_sim.max(0.0)),
            None => (None, 0.0),
        }
    }
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(entries: &[(EmployeeId, Vec<f32>)]) -> EmbeddingStore {
        let store = EmbeddingStore::default();
        let mut by_emp: BTreeMap<EmployeeId, Vec<Vec<f32>>> = BTreeMap::new();
        let mut meta = BTreeMap::new();
        for (id, v) in entries {
            by_emp.entry(*id).or_default().push(v.clone());
            meta.insert(
                *id,
                EmployeeMeta {
                    name: format!("emp-{id}"),
                    department: None,
                    is_active: true,
                },
            );
        }
        store.install(by_emp, meta);
        store
    }

    #[test]
    fn test_best_match_picks_nearest() {
        let store = store_with(&[
            (1, vec![1.0, 0.0, 0.0]),
            (2, vec![0.0, 1.0, 0.0]),
        ]);
        let (emp, sim) = store.best_match(&[0.9, 0.1, 0.0]);
        assert_eq!(emp, Some(1));
        assert!(sim > 0.9);
    }

    #[test]
    fn test_best_match_empty_store() {
        let store = EmbeddingStore::default();
        assert_eq!(store.best_match(&[1.0, 0.0]), (None, 0.0));
    }

    #[test]
    fn test_best_match_empty_query() {
        let store = store_with(&[(1, vec![1.0, 0.0])]);
        assert_eq!(store.best_match(&[]), (None, 0.0));
    }

    #[test]
    fn test_negative_similarity_clamped() {
        let store = store_with(&[(1, vec![1.0, 0.0])]);
        let (emp, sim) = store.best_match(&[-1.0, 0.0]);
        assert_eq!(emp, Some(1));
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_tie_breaks_to_lowest_id() {
        let store = store_with(&[
            (9, vec![1.0, 0.0]),
            (3, vec![1.0, 0.0]),
        ]);
        let (emp, _) = store.best_match(&[1.0, 0.0]);
        assert_eq!(emp, Some(3));
    }

    #[test]
    fn test_unnormalized_references_are_normalized() {
        let store = store_with(&[(1, vec![10.0, 0.0])]);
        let (_, sim) = store.best_match(&[1.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_should_reload_rate_limit() {
        let store = EmbeddingStore::new(Duration::from_secs(3600));
        assert!(store.should_reload(false)); // first call always loads
        assert!(!store.should_reload(false)); // within interval
        assert!(store.should_reload(true)); // forced
    }

    #[test]
    fn test_snapshot_swap_visible() {
        let store = store_with(&[(1, vec![1.0, 0.0])]);
        let old = store.snapshot();
        store.install(BTreeMap::new(), BTreeMap::new());
        // old snapshot still readable, new queries see the swap
        assert_eq!(old.template_count(), 1);
        assert_eq!(store.best_match(&[1.0, 0.0]), (None, 0.0));
    }
}
