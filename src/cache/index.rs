use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;
use ulid::Ulid;

use crate::limits::MAX_EMPLOYMENT_RATE_UNITS;
use crate::model::*;
use crate::workload::DailyTotals;

// ── Scope index ──────────────────────────────────────────────────

/// Work scope → ids of the assignments booked against it.
#[derive(Debug, Clone, Default)]
pub struct ScopeIndex {
    buckets: HashMap<Ulid, BTreeSet<Ulid>>,
}

impl ScopeIndex {
    pub fn insert(&mut self, scope_id: Ulid, id: Ulid) -> bool {
        self.buckets.entry(scope_id).or_default().insert(id)
    }

    /// Drops the bucket once it is empty.
    pub fn remove(&mut self, scope_id: &Ulid, id: &Ulid) -> bool {
        let Some(bucket) = self.buckets.get_mut(scope_id) else {
            return false;
        };
        let removed = bucket.remove(id);
        if bucket.is_empty() {
            self.buckets.remove(scope_id);
        }
        removed
    }

    pub fn get(&self, scope_id: &Ulid) -> impl Iterator<Item = &Ulid> {
        self.buckets.get(scope_id).into_iter().flatten()
    }

    pub fn contains(&self, scope_id: &Ulid, id: &Ulid) -> bool {
        self.buckets.get(scope_id).is_some_and(|b| b.contains(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ulid, &BTreeSet<Ulid>)> {
        self.buckets.iter()
    }
}

// ── Org tree ─────────────────────────────────────────────────────

/// Where an employee sits in the organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrgPath {
    pub department_id: Ulid,
    pub team_id: Ulid,
    pub employee_id: Ulid,
}

#[derive(Debug, Clone)]
pub struct EmployeeNode {
    pub employee: Employee,
    /// Ids of the employee's active assignments.
    pub assignments: BTreeSet<Ulid>,
    /// Sparse daily totals: dates with a zero total are absent.
    pub totals: DailyTotals,
}

#[derive(Debug, Clone)]
pub struct TeamNode {
    pub team: Team,
    pub employees: BTreeMap<Ulid, EmployeeNode>,
}

#[derive(Debug, Clone)]
pub struct DepartmentNode {
    pub department: Department,
    pub teams: BTreeMap<Ulid, TeamNode>,
}

/// Department → team → employee, with the per-employee assignment index
/// embedded in the leaves.
#[derive(Debug, Clone, Default)]
pub struct OrgTree {
    departments: BTreeMap<Ulid, DepartmentNode>,
    team_department: HashMap<Ulid, Ulid>,
    paths: HashMap<Ulid, OrgPath>,
}

impl OrgTree {
    /// Orphans (a team without its department, an employee without its
    /// team) are skipped with a warning.
    pub fn build(departments: Vec<Department>, teams: Vec<Team>, employees: Vec<Employee>) -> Self {
        let mut tree = OrgTree::default();
        for department in departments {
            tree.departments.insert(
                department.id,
                DepartmentNode {
                    department,
                    teams: BTreeMap::new(),
                },
            );
        }
        for team in teams {
            let Some(dept) = tree.departments.get_mut(&team.department_id) else {
                warn!(team_id = %team.id, department_id = %team.department_id, "team without department, skipped");
                continue;
            };
            tree.team_department.insert(team.id, team.department_id);
            dept.teams.insert(
                team.id,
                TeamNode {
                    team,
                    employees: BTreeMap::new(),
                },
            );
        }
        for mut employee in employees {
            if tree.paths.contains_key(&employee.id) {
                warn!(employee_id = %employee.id, team_id = %employee.team_id, "duplicate employee row, keeping the first");
                continue;
            }
            let Some(&department_id) = tree.team_department.get(&employee.team_id) else {
                warn!(employee_id = %employee.id, team_id = %employee.team_id, "employee without team, skipped");
                continue;
            };
            let units = employee.employment_rate.units();
            if !(0..=MAX_EMPLOYMENT_RATE_UNITS).contains(&units) {
                warn!(employee_id = %employee.id, rate = %employee.employment_rate, "employment rate out of range, clamped");
                employee.employment_rate = Rate::from_units(units.clamp(0, MAX_EMPLOYMENT_RATE_UNITS));
            }
            let path = OrgPath {
                department_id,
                team_id: employee.team_id,
                employee_id: employee.id,
            };
            if let Some(team) = tree
                .departments
                .get_mut(&department_id)
                .and_then(|d| d.teams.get_mut(&employee.team_id))
            {
                tree.paths.insert(employee.id, path);
                team.employees.insert(
                    employee.id,
                    EmployeeNode {
                        employee,
                        assignments: BTreeSet::new(),
                        totals: DailyTotals::new(),
                    },
                );
            }
        }
        tree
    }

    pub fn path(&self, employee_id: &Ulid) -> Option<OrgPath> {
        self.paths.get(employee_id).copied()
    }

    pub fn contains_employee(&self, employee_id: &Ulid) -> bool {
        self.paths.contains_key(employee_id)
    }

    pub fn department(&self, id: &Ulid) -> Option<&DepartmentNode> {
        self.departments.get(id)
    }

    pub fn team(&self, id: &Ulid) -> Option<&TeamNode> {
        let department_id = self.team_department.get(id)?;
        self.departments.get(department_id)?.teams.get(id)
    }

    pub fn employee(&self, id: &Ulid) -> Option<&EmployeeNode> {
        let path = self.paths.get(id)?;
        self.departments
            .get(&path.department_id)?
            .teams
            .get(&path.team_id)?
            .employees
            .get(id)
    }

    pub fn employee_mut(&mut self, id: &Ulid) -> Option<&mut EmployeeNode> {
        let path = *self.paths.get(id)?;
        self.departments
            .get_mut(&path.department_id)?
            .teams
            .get_mut(&path.team_id)?
            .employees
            .get_mut(id)
    }

    pub fn departments(&self) -> impl Iterator<Item = &DepartmentNode> {
        self.departments.values()
    }

    pub fn employees(&self) -> impl Iterator<Item = &EmployeeNode> {
        self.departments
            .values()
            .flat_map(|d| d.teams.values())
            .flat_map(|t| t.employees.values())
    }

    pub fn employee_ids(&self) -> Vec<Ulid> {
        self.paths.keys().copied().collect()
    }

    // ── Assignment membership ────────────────────────────────

    pub fn attach(&mut self, owner_id: &Ulid, id: Ulid) -> bool {
        self.employee_mut(owner_id)
            .is_some_and(|node| node.assignments.insert(id))
    }

    pub fn detach(&mut self, owner_id: &Ulid, id: &Ulid) -> bool {
        self.employee_mut(owner_id)
            .is_some_and(|node| node.assignments.remove(id))
    }
}
