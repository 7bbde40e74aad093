use std::sync::Arc;

use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{mutation_outcome, MUTATIONS_TOTAL};

use super::{Cache, CacheState, PlanError};

// ── Validation (read-only) ───────────────────────────────────────

impl CacheState {
    pub(super) fn validate_fields(
        &self,
        owner_id: Ulid,
        scope_id: Ulid,
        start: Day,
        end: Day,
        rate: Rate,
        comment: Option<&str>,
    ) -> Result<DateRange, PlanError> {
        let span = DateRange::checked(start, end).ok_or(PlanError::InvalidRange { start, end })?;
        if span.len_days() > MAX_ASSIGNMENT_DAYS {
            return Err(PlanError::LimitExceeded("assignment too long"));
        }
        if !rate.is_positive() {
            return Err(PlanError::NonPositiveRate(rate));
        }
        if rate.units() > MAX_RATE_UNITS {
            return Err(PlanError::LimitExceeded("rate too large"));
        }
        if let Some(c) = comment
            && c.len() > MAX_COMMENT_LEN
        {
            return Err(PlanError::LimitExceeded("comment too long"));
        }
        if !self.org.contains_employee(&owner_id) {
            return Err(PlanError::UnknownOwner(owner_id));
        }
        if !self.scopes.contains_key(&scope_id) {
            return Err(PlanError::UnknownScope(scope_id));
        }
        Ok(span)
    }

    fn check_owner_room(&self, owner_id: &Ulid) -> Result<(), PlanError> {
        let count = self
            .org
            .employee(owner_id)
            .map_or(0, |node| node.assignments.len());
        if count >= MAX_ASSIGNMENTS_PER_OWNER {
            return Err(PlanError::LimitExceeded("too many assignments for employee"));
        }
        Ok(())
    }

    /// Check a create command without touching state.
    pub fn validate_new(&self, input: &NewAssignment) -> Result<DateRange, PlanError> {
        let span = self.validate_fields(
            input.owner_id,
            input.scope_id,
            input.start,
            input.end,
            input.rate,
            input.comment.as_deref(),
        )?;
        self.check_owner_room(&input.owner_id)?;
        Ok(span)
    }

    /// Check an update command; returns the assignment as it would be
    /// after the patch.
    pub fn validate_patch(&self, id: &Ulid, patch: &AssignmentPatch) -> Result<Assignment, PlanError> {
        let current = self.assignments.get(id).ok_or(PlanError::NotFound(*id))?;
        let owner_id = patch.owner_id.unwrap_or(current.owner_id);
        let scope_id = patch.scope_id.unwrap_or(current.scope_id);
        let start = patch.start.unwrap_or(current.span.start);
        let end = patch.end.unwrap_or(current.span.end);
        let rate = patch.rate.unwrap_or(current.rate);
        let comment = match &patch.comment {
            Some(c) => c.clone(),
            None => current.comment.clone(),
        };
        let span = self.validate_fields(owner_id, scope_id, start, end, rate, comment.as_deref())?;
        if owner_id != current.owner_id {
            self.check_owner_room(&owner_id)?;
        }
        Ok(Assignment {
            id: *id,
            owner_id,
            scope_id,
            span,
            rate,
            status: current.status,
            comment,
        })
    }
}

// ── Writes ───────────────────────────────────────────────────────
//
// Every write validates against the current state first, then edits a
// private copy (`Arc::make_mut`) and publishes it in one assignment. A
// rejected write never clones or changes anything.

impl Cache {
    /// Insert a confirmed assignment. Re-applying an id already present is
    /// a no-op and returns `Ok(None)`.
    pub async fn create(&self, id: Ulid, input: NewAssignment) -> Result<Option<Assignment>, PlanError> {
        let mut guard = self.state.write().await;
        if guard.assignments.contains_key(&id) {
            debug!(%id, "create replayed, already present");
            return Ok(None);
        }
        let span = match guard.validate_new(&input) {
            Ok(span) => span,
            Err(e) => {
                metrics::counter!(MUTATIONS_TOTAL, "kind" => "create", "status" => mutation_outcome(&e)).increment(1);
                return Err(e);
            }
        };

        let assignment = Assignment {
            id,
            owner_id: input.owner_id,
            scope_id: input.scope_id,
            span,
            rate: input.rate,
            status: AssignmentStatus::Active,
            comment: input.comment,
        };
        let state = Arc::make_mut(&mut guard);
        state.index_insert(assignment.clone());
        state.recompute_owner_totals(&assignment.owner_id, &span);
        drop(guard);

        metrics::counter!(MUTATIONS_TOTAL, "kind" => "create", "status" => "ok").increment(1);
        debug!(%id, owner = %assignment.owner_id, scope = %assignment.scope_id, %span, "assignment created");
        self.notify.send(
            assignment.owner_id,
            &Change::AssignmentCreated {
                id,
                owner_id: assignment.owner_id,
                scope_id: assignment.scope_id,
                span,
                rate: assignment.rate,
            },
        );
        Ok(Some(assignment))
    }

    /// Apply a patch. Moving between scopes or owners happens inside one
    /// write, so no snapshot ever shows the id in zero or two buckets.
    /// Returns `Ok(None)` when the patch changes nothing.
    pub async fn update(&self, id: Ulid, patch: AssignmentPatch) -> Result<Option<Assignment>, PlanError> {
        let mut guard = self.state.write().await;
        let next = match guard.validate_patch(&id, &patch) {
            Ok(next) => next,
            Err(e) => {
                metrics::counter!(MUTATIONS_TOTAL, "kind" => "update", "status" => mutation_outcome(&e)).increment(1);
                return Err(e);
            }
        };
        if guard.assignments.get(&id) == Some(&next) {
            return Ok(None);
        }

        let state = Arc::make_mut(&mut guard);
        let Some(previous) = state.index_remove(&id) else {
            return Err(PlanError::NotFound(id));
        };
        state.index_insert(next.clone());
        if previous.owner_id == next.owner_id {
            state.recompute_owner_totals(&next.owner_id, &previous.span.hull(&next.span));
        } else {
            state.recompute_owner_totals(&previous.owner_id, &previous.span);
            state.recompute_owner_totals(&next.owner_id, &next.span);
        }
        drop(guard);

        metrics::counter!(MUTATIONS_TOTAL, "kind" => "update", "status" => "ok").increment(1);
        debug!(%id, from_scope = %previous.scope_id, to_scope = %next.scope_id, from_owner = %previous.owner_id, to_owner = %next.owner_id, "assignment updated");
        let change = Change::AssignmentUpdated {
            id,
            owner_id: next.owner_id,
            previous_owner_id: previous.owner_id,
            scope_id: next.scope_id,
            previous_scope_id: previous.scope_id,
            span: next.span,
            rate: next.rate,
        };
        self.notify.send(next.owner_id, &change);
        if previous.owner_id != next.owner_id {
            self.notify.send(previous.owner_id, &change);
        }
        Ok(Some(next))
    }

    /// Remove from the canonical map and both indexes. Deleting an absent
    /// id is a no-op.
    pub async fn delete(&self, id: Ulid) -> Result<Option<Assignment>, PlanError> {
        let removed = self.remove(id, "delete").await;
        if let Some(a) = &removed {
            self.notify.send(
                a.owner_id,
                &Change::AssignmentDeleted {
                    id,
                    owner_id: a.owner_id,
                    span: a.span,
                },
            );
        }
        Ok(removed)
    }

    /// Same index effect as [`delete`](Self::delete); the returned copy is
    /// marked archived. Keeping a history of archived rows is the command
    /// service's business.
    pub async fn archive(&self, id: Ulid) -> Result<Option<Assignment>, PlanError> {
        let removed = self.remove(id, "archive").await.map(|mut a| {
            a.status = AssignmentStatus::Archived;
            a
        });
        if let Some(a) = &removed {
            self.notify.send(
                a.owner_id,
                &Change::AssignmentArchived {
                    id,
                    owner_id: a.owner_id,
                    span: a.span,
                },
            );
        }
        Ok(removed)
    }

    async fn remove(&self, id: Ulid, kind: &'static str) -> Option<Assignment> {
        let mut guard = self.state.write().await;
        if !guard.assignments.contains_key(&id) {
            debug!(%id, kind, "remove replayed, already absent");
            return None;
        }
        let state = Arc::make_mut(&mut guard);
        let removed = state.index_remove(&id)?;
        state.recompute_owner_totals(&removed.owner_id, &removed.span);
        drop(guard);

        metrics::counter!(MUTATIONS_TOTAL, "kind" => kind, "status" => "ok").increment(1);
        debug!(%id, owner = %removed.owner_id, kind, "assignment removed");
        Some(removed)
    }
}
