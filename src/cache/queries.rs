use ulid::Ulid;

use crate::calendar::CalendarRules;
use crate::limits::*;
use crate::model::*;
use crate::packer::{Column, IntervalPacker, LaneGeometry, PackInterval};
use crate::workload::{compute_daily_totals, sum_totals, utilization_series, DailyTotals, DayLoad};

use super::{CacheState, EmployeeNode, OrgPath, OrgTree, PlanError};

fn check_window(range: &DateRange) -> Result<(), PlanError> {
    if range.len_days() > MAX_QUERY_DAYS {
        return Err(PlanError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

fn by_start_then_id(a: &&Assignment, b: &&Assignment) -> std::cmp::Ordering {
    a.span.start.cmp(&b.span.start).then(a.id.cmp(&b.id))
}

impl CacheState {
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn assignment(&self, id: &Ulid) -> Option<&Assignment> {
        self.assignments.get(id)
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.values()
    }

    pub fn calendar(&self) -> &CalendarRules {
        &self.rules
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn org(&self) -> &OrgTree {
        &self.org
    }

    pub fn org_path(&self, employee_id: &Ulid) -> Option<OrgPath> {
        self.org.path(employee_id)
    }

    pub fn employee(&self, id: &Ulid) -> Option<&EmployeeNode> {
        self.org.employee(id)
    }

    // ── Scope side ───────────────────────────────────────────

    pub fn scope(&self, id: &Ulid) -> Option<&ScopeNode> {
        self.scopes.get(id)
    }

    /// Ids filed under a scope, in id order.
    pub fn scope_assignment_ids(&self, scope_id: &Ulid) -> Vec<Ulid> {
        self.by_scope.get(scope_id).copied().collect()
    }

    pub fn scope_assignments(&self, scope_id: &Ulid) -> Vec<&Assignment> {
        let mut out: Vec<&Assignment> = self
            .by_scope
            .get(scope_id)
            .filter_map(|id| self.assignments.get(id))
            .collect();
        out.sort_by(by_start_then_id);
        out
    }

    /// The scope followed by its ancestors, nearest first.
    pub fn scope_path(&self, scope_id: &Ulid) -> Vec<&ScopeNode> {
        let mut path: Vec<&ScopeNode> = Vec::new();
        let mut cur = self.scopes.get(scope_id);
        while let Some(node) = cur {
            if path.iter().any(|n| n.id == node.id) {
                break; // cycle in source data
            }
            path.push(node);
            cur = node.parent_id.and_then(|pid| self.scopes.get(&pid));
        }
        path
    }

    // ── Owner side ───────────────────────────────────────────

    pub fn owner_assignment_ids(&self, owner_id: &Ulid) -> Vec<Ulid> {
        self.org
            .employee(owner_id)
            .map(|node| node.assignments.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn owner_assignments(&self, owner_id: &Ulid) -> Vec<&Assignment> {
        let mut out: Vec<&Assignment> = self
            .org
            .employee(owner_id)
            .map(|node| {
                node.assignments
                    .iter()
                    .filter_map(|id| self.assignments.get(id))
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(by_start_then_id);
        out
    }

    /// Dense totals for one employee, read from the incrementally
    /// maintained store.
    pub fn employee_totals(&self, owner_id: &Ulid, range: &DateRange) -> Result<DailyTotals, PlanError> {
        check_window(range)?;
        let node = self
            .org
            .employee(owner_id)
            .ok_or(PlanError::UnknownOwner(*owner_id))?;
        Ok(range
            .days()
            .map(|day| (day, node.totals.get(&day).copied().unwrap_or(Rate::ZERO)))
            .collect())
    }

    /// Same figures as [`employee_totals`](Self::employee_totals), computed
    /// from the assignments directly.
    pub fn employee_totals_full(&self, owner_id: &Ulid, range: &DateRange) -> Result<DailyTotals, PlanError> {
        check_window(range)?;
        if !self.org.contains_employee(owner_id) {
            return Err(PlanError::UnknownOwner(*owner_id));
        }
        let intervals = self
            .owner_assignments(owner_id)
            .into_iter()
            .map(|a| (a.span, a.rate));
        Ok(compute_daily_totals(intervals, range))
    }

    pub fn team_totals(&self, team_id: &Ulid, range: &DateRange) -> Result<DailyTotals, PlanError> {
        let team = self.org.team(team_id).ok_or(PlanError::NotFound(*team_id))?;
        let members = team
            .employees
            .keys()
            .map(|id| self.employee_totals(id, range))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(densify(sum_totals(&members), range))
    }

    pub fn department_totals(&self, department_id: &Ulid, range: &DateRange) -> Result<DailyTotals, PlanError> {
        let department = self
            .org
            .department(department_id)
            .ok_or(PlanError::NotFound(*department_id))?;
        let teams = department
            .teams
            .keys()
            .map(|id| self.team_totals(id, range))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(densify(sum_totals(&teams), range))
    }

    // ── Capacity and utilization ─────────────────────────────

    pub fn employee_capacity(&self, owner_id: &Ulid) -> Option<Rate> {
        self.org.employee(owner_id).map(|n| n.employee.employment_rate)
    }

    pub fn team_capacity(&self, team_id: &Ulid) -> Option<Rate> {
        self.org
            .team(team_id)
            .map(|t| t.employees.values().map(|n| n.employee.employment_rate).sum())
    }

    pub fn department_capacity(&self, department_id: &Ulid) -> Option<Rate> {
        self.org.department(department_id).map(|d| {
            d.teams
                .values()
                .flat_map(|t| t.employees.values())
                .map(|n| n.employee.employment_rate)
                .sum()
        })
    }

    pub fn employee_utilization(&self, owner_id: &Ulid, range: &DateRange) -> Result<Vec<DayLoad>, PlanError> {
        let totals = self.employee_totals(owner_id, range)?;
        let capacity = self.employee_capacity(owner_id).unwrap_or(Rate::ZERO);
        Ok(utilization_series(&totals, capacity, &self.rules))
    }

    pub fn team_utilization(&self, team_id: &Ulid, range: &DateRange) -> Result<Vec<DayLoad>, PlanError> {
        let totals = self.team_totals(team_id, range)?;
        let capacity = self.team_capacity(team_id).unwrap_or(Rate::ZERO);
        Ok(utilization_series(&totals, capacity, &self.rules))
    }

    pub fn department_utilization(&self, department_id: &Ulid, range: &DateRange) -> Result<Vec<DayLoad>, PlanError> {
        let totals = self.department_totals(department_id, range)?;
        let capacity = self.department_capacity(department_id).unwrap_or(Rate::ZERO);
        Ok(utilization_series(&totals, capacity, &self.rules))
    }

    // ── Layout ───────────────────────────────────────────────

    /// Lane geometry for one employee's timeline row.
    pub fn owner_layout(
        &self,
        owner_id: &Ulid,
        columns: &[Column],
        packer: &IntervalPacker,
    ) -> Result<Vec<LaneGeometry>, PlanError> {
        if !self.org.contains_employee(owner_id) {
            return Err(PlanError::UnknownOwner(*owner_id));
        }
        let intervals: Vec<PackInterval> = self
            .owner_assignments(owner_id)
            .into_iter()
            .map(PackInterval::from)
            .collect();
        Ok(packer.pack(&intervals, columns, &self.rules))
    }
}

/// Every date in `range` present, zero-filled.
fn densify(sparse: DailyTotals, range: &DateRange) -> DailyTotals {
    range
        .days()
        .map(|day| (day, sparse.get(&day).copied().unwrap_or(Rate::ZERO)))
        .collect()
}
