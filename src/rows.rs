use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;
use ulid::Ulid;

use crate::model::*;

/// Deepest work-scope chain walked when matching filters.
const MAX_SCOPE_DEPTH: usize = 16;

fn active() -> AssignmentStatus {
    AssignmentStatus::Active
}

/// One flat row from the query service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Row {
    Department {
        id: Ulid,
        name: String,
    },
    Team {
        id: Ulid,
        department_id: Ulid,
        name: String,
    },
    Employee {
        id: Ulid,
        team_id: Ulid,
        name: String,
        employment_rate: Rate,
        #[serde(default)]
        manager_id: Option<Ulid>,
    },
    Scope {
        id: Ulid,
        #[serde(default)]
        parent_id: Option<Ulid>,
        level: ScopeLevel,
        name: String,
    },
    Assignment {
        id: Ulid,
        owner_id: Ulid,
        scope_id: Ulid,
        start: Day,
        end: Day,
        rate: Rate,
        #[serde(default = "active")]
        status: AssignmentStatus,
        #[serde(default)]
        comment: Option<String>,
    },
    /// `date` stays a string: a malformed date must not fail the fetch.
    CalendarEvent {
        date: String,
        kind: EventKind,
        #[serde(default)]
        is_workday: bool,
        #[serde(default)]
        is_global: bool,
    },
}

/// Rows mapped into the data model.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub departments: Vec<Department>,
    pub teams: Vec<Team>,
    pub employees: Vec<Employee>,
    pub scopes: Vec<ScopeNode>,
    /// Active assignments only.
    pub assignments: Vec<Assignment>,
    /// Archived rows seen and left out of the active lists.
    pub archived: usize,
    pub events: Vec<CalendarEvent>,
}

impl Dataset {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut ds = Dataset::default();
        for row in rows {
            match row {
                Row::Department { id, name } => ds.departments.push(Department { id, name }),
                Row::Team {
                    id,
                    department_id,
                    name,
                } => ds.teams.push(Team {
                    id,
                    department_id,
                    name,
                }),
                Row::Employee {
                    id,
                    team_id,
                    name,
                    employment_rate,
                    manager_id,
                } => ds.employees.push(Employee {
                    id,
                    team_id,
                    name,
                    employment_rate,
                    manager_id,
                }),
                Row::Scope {
                    id,
                    parent_id,
                    level,
                    name,
                } => ds.scopes.push(ScopeNode {
                    id,
                    parent_id,
                    level,
                    name,
                }),
                Row::Assignment {
                    id,
                    owner_id,
                    scope_id,
                    start,
                    end,
                    rate,
                    status,
                    comment,
                } => {
                    if status == AssignmentStatus::Archived {
                        ds.archived += 1;
                        continue;
                    }
                    let Some(span) = DateRange::checked(start, end) else {
                        warn!(%id, %start, %end, "assignment row with reversed dates, skipped");
                        continue;
                    };
                    ds.assignments.push(Assignment {
                        id,
                        owner_id,
                        scope_id,
                        span,
                        rate,
                        status,
                        comment,
                    });
                }
                Row::CalendarEvent {
                    date,
                    kind,
                    is_workday,
                    is_global,
                } => {
                    let parsed = parse_day(&date);
                    if parsed.is_none() {
                        warn!(date = %date, "calendar event with unparseable date, ignored by rules");
                    }
                    ds.events.push(CalendarEvent {
                        date: parsed,
                        kind,
                        is_workday,
                        is_global,
                    });
                }
            }
        }
        ds
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_day(raw: &str) -> Option<Day> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Keep the rows a filter set selects.
///
/// Org filters (department, team, manager, employee) narrow employees and
/// their assignments. Work filters (project, stage, object) narrow
/// assignments to those whose scope chain passes through every selected
/// node. Hierarchy and calendar rows are otherwise kept.
pub fn filter_rows(rows: Vec<Row>, filters: &FilterSet) -> Vec<Row> {
    if filters.is_empty() {
        return rows;
    }

    let mut team_department: HashMap<Ulid, Ulid> = HashMap::new();
    let mut employees: HashMap<Ulid, (Ulid, Option<Ulid>)> = HashMap::new();
    let mut scope_parent: HashMap<Ulid, Option<Ulid>> = HashMap::new();
    for row in &rows {
        match row {
            Row::Team { id, department_id, .. } => {
                team_department.insert(*id, *department_id);
            }
            Row::Employee {
                id,
                team_id,
                manager_id,
                ..
            } => {
                employees.insert(*id, (*team_id, *manager_id));
            }
            Row::Scope { id, parent_id, .. } => {
                scope_parent.insert(*id, *parent_id);
            }
            _ => {}
        }
    }

    let employee_matches = |employee_id: &Ulid| -> bool {
        let Some(&(team_id, manager_id)) = employees.get(employee_id) else {
            return false;
        };
        filters.employee.is_none_or(|e| e == *employee_id)
            && filters.team.is_none_or(|t| t == team_id)
            && filters.manager.is_none_or(|m| manager_id == Some(m))
            && filters
                .department
                .is_none_or(|d| team_department.get(&team_id) == Some(&d))
    };

    let scope_matches = |scope_id: &Ulid| -> bool {
        let wanted: Vec<Ulid> = [filters.project, filters.stage, filters.object]
            .into_iter()
            .flatten()
            .collect();
        if wanted.is_empty() {
            return true;
        }
        let mut chain = Vec::new();
        let mut cur = Some(*scope_id);
        while let Some(id) = cur {
            if chain.len() >= MAX_SCOPE_DEPTH || chain.contains(&id) {
                break;
            }
            chain.push(id);
            cur = scope_parent.get(&id).copied().flatten();
        }
        wanted.iter().all(|w| chain.contains(w))
    };

    rows.into_iter()
        .filter(|row| match row {
            Row::Employee { id, .. } => employee_matches(id),
            Row::Assignment {
                owner_id, scope_id, ..
            } => employee_matches(owner_id) && scope_matches(scope_id),
            _ => true,
        })
        .collect()
}
