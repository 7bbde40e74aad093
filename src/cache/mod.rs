mod error;
mod index;
mod mutations;
mod queries;

pub use error::PlanError;
pub use index::{DepartmentNode, EmployeeNode, OrgPath, OrgTree, ScopeIndex, TeamNode};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::calendar::CalendarRules;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::rows::Dataset;
use crate::workload::{compute_daily_totals, DailyTotals};

/// Immutable view of the cache. Never changes once handed out.
pub type Snapshot = Arc<CacheState>;

/// Canonical assignment map plus the indexes derived from it.
///
/// The scope index and the org tree hold ids only; the assignment itself
/// lives once, in `assignments`.
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    pub(super) assignments: HashMap<Ulid, Assignment>,
    pub(super) by_scope: ScopeIndex,
    pub(super) org: OrgTree,
    pub(super) scopes: HashMap<Ulid, ScopeNode>,
    pub(super) events: Vec<CalendarEvent>,
    pub(super) rules: CalendarRules,
    pub(super) fingerprint: Option<Fingerprint>,
}

impl CacheState {
    /// Build every index from a fetched dataset. Assignments that fail
    /// validation are dropped with a warning.
    pub fn from_dataset(dataset: Dataset, fingerprint: Option<Fingerprint>) -> Self {
        let mut state = CacheState {
            org: OrgTree::build(dataset.departments, dataset.teams, dataset.employees),
            scopes: dataset.scopes.into_iter().map(|s| (s.id, s)).collect(),
            rules: CalendarRules::from_events(&dataset.events),
            events: dataset.events,
            fingerprint,
            ..CacheState::default()
        };

        for a in dataset.assignments {
            if state.assignments.contains_key(&a.id) {
                warn!(id = %a.id, "duplicate assignment row, keeping the first");
                continue;
            }
            if let Err(e) = state.validate_fields(a.owner_id, a.scope_id, a.span.start, a.span.end, a.rate, a.comment.as_deref()) {
                warn!(id = %a.id, "assignment row rejected: {e}");
                continue;
            }
            state.index_insert(a);
        }

        for owner_id in state.org.employee_ids() {
            state.rebuild_owner_totals(&owner_id);
        }
        debug!(assignments = state.assignments.len(), "cache state built");
        state
    }

    // ── Index maintenance ────────────────────────────────────
    //
    // These helpers are only ever called on a private copy of the state
    // (see `Cache`), so readers never see one index updated without the
    // other.

    pub(super) fn index_insert(&mut self, a: Assignment) {
        self.by_scope.insert(a.scope_id, a.id);
        self.org.attach(&a.owner_id, a.id);
        self.assignments.insert(a.id, a);
    }

    pub(super) fn index_remove(&mut self, id: &Ulid) -> Option<Assignment> {
        let a = self.assignments.remove(id)?;
        self.by_scope.remove(&a.scope_id, id);
        self.org.detach(&a.owner_id, id);
        Some(a)
    }

    /// Spans and rates of an owner's active assignments.
    fn owner_intervals(&self, owner_id: &Ulid) -> Vec<(DateRange, Rate)> {
        self.org
            .employee(owner_id)
            .map(|node| {
                node.assignments
                    .iter()
                    .filter_map(|id| self.assignments.get(id))
                    .map(|a| (a.span, a.rate))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Recompute an owner's stored totals for the dates in `range` only.
    pub(super) fn recompute_owner_totals(&mut self, owner_id: &Ulid, range: &DateRange) {
        let intervals = self.owner_intervals(owner_id);
        let fresh = compute_daily_totals(intervals, range);
        let Some(node) = self.org.employee_mut(owner_id) else {
            return;
        };
        for (day, total) in fresh {
            if total == Rate::ZERO {
                node.totals.remove(&day);
            } else {
                node.totals.insert(day, total);
            }
        }
    }

    /// Drop and recompute an owner's stored totals from scratch.
    pub(super) fn rebuild_owner_totals(&mut self, owner_id: &Ulid) {
        let totals = self.full_owner_totals(owner_id);
        if let Some(node) = self.org.employee_mut(owner_id) {
            node.totals = totals;
        }
    }

    /// Reference computation: sparse totals over the hull of every span.
    pub fn full_owner_totals(&self, owner_id: &Ulid) -> DailyTotals {
        let intervals = self.owner_intervals(owner_id);
        let Some(hull) = intervals
            .iter()
            .map(|(span, _)| *span)
            .reduce(|acc, span| acc.hull(&span))
        else {
            return DailyTotals::new();
        };
        compute_daily_totals(intervals, &hull)
            .into_iter()
            .filter(|(_, total)| *total != Rate::ZERO)
            .collect()
    }

    /// Verify the canonical map and both indexes agree, and that stored
    /// totals match a full recompute.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut scope_hits: HashMap<Ulid, usize> = HashMap::new();
        for (scope_id, bucket) in self.by_scope.iter() {
            for id in bucket {
                let Some(a) = self.assignments.get(id) else {
                    return Err(format!("scope {scope_id} indexes unknown assignment {id}"));
                };
                if a.scope_id != *scope_id {
                    return Err(format!("assignment {id} filed under scope {scope_id}, belongs to {}", a.scope_id));
                }
                *scope_hits.entry(*id).or_default() += 1;
            }
        }

        let mut owner_hits: HashMap<Ulid, usize> = HashMap::new();
        for node in self.org.employees() {
            for id in &node.assignments {
                let Some(a) = self.assignments.get(id) else {
                    return Err(format!("employee {} indexes unknown assignment {id}", node.employee.id));
                };
                if a.owner_id != node.employee.id {
                    return Err(format!("assignment {id} filed under employee {}, belongs to {}", node.employee.id, a.owner_id));
                }
                *owner_hits.entry(*id).or_default() += 1;
            }
            let expected = self.full_owner_totals(&node.employee.id);
            if node.totals != expected {
                return Err(format!("stored totals for employee {} diverge from full recompute", node.employee.id));
            }
        }

        for id in self.assignments.keys() {
            let s = scope_hits.get(id).copied().unwrap_or(0);
            let o = owner_hits.get(id).copied().unwrap_or(0);
            if s != 1 || o != 1 {
                return Err(format!("assignment {id} in {s} scope buckets and {o} owner buckets"));
            }
        }
        Ok(())
    }
}

/// The single owner of mutable planning state.
///
/// Writers take the lock, copy-on-write the state, apply the whole
/// mutation, then release. Readers clone the `Arc` and keep a stable view.
pub struct Cache {
    state: RwLock<Snapshot>,
    pub notify: Arc<NotifyHub>,
}

impl Cache {
    pub fn new(notify: Arc<NotifyHub>) -> Self {
        Self {
            state: RwLock::new(Arc::new(CacheState::default())),
            notify,
        }
    }

    pub fn from_state(state: CacheState, notify: Arc<NotifyHub>) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
            notify,
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }

    /// Swap in a freshly built state if `still_current` holds once the
    /// write lock is taken. Returns whether the swap happened.
    pub async fn replace_if(&self, next: CacheState, still_current: impl FnOnce() -> bool) -> bool {
        let mut guard = self.state.write().await;
        if !still_current() {
            return false;
        }
        let change = Change::SnapshotReplaced {
            fingerprint: next.fingerprint.clone().unwrap_or_else(|| FilterSet::default().fingerprint()),
            assignments: next.assignments.len(),
        };
        metrics::gauge!(crate::observability::CACHE_ASSIGNMENTS).set(next.assignments.len() as f64);
        *guard = Arc::new(next);
        drop(guard);
        self.notify.broadcast(&change);
        // Drop owners whose subscribers are all gone.
        self.notify.prune();
        true
    }
}
