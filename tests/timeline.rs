use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use ulid::Ulid;

use planline::cache::Cache;
use planline::commands::{Command, CommandGateway, CommandOutcome, CommandService};
use planline::model::*;
use planline::notify::NotifyHub;
use planline::rows::Row;
use planline::source::JsonRowsSource;
use planline::sync::{FetchOutcome, FilterSyncController, SyncState};

// ── Test infrastructure ──────────────────────────────────────

fn d(day: u32) -> Day {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

struct Ids {
    team_a: Ulid,
    alice: Ulid,
    bob: Ulid,
    carol: Ulid,
    section_a: Ulid,
    section_b: Ulid,
}

/// Writes a small org to a temp file: two teams, three people, two
/// sections, four assignment rows (one archived) and a holiday.
fn write_rows() -> (PathBuf, Ids) {
    let dept = Ulid::new();
    let team_a = Ulid::new();
    let team_b = Ulid::new();
    let alice = Ulid::new();
    let bob = Ulid::new();
    let carol = Ulid::new();
    let project = Ulid::new();
    let section_a = Ulid::new();
    let section_b = Ulid::new();

    let employee = |id, team_id, name: &str| Row::Employee {
        id,
        team_id,
        name: name.into(),
        employment_rate: Rate::FULL,
        manager_id: None,
    };
    let assignment = |owner_id, scope_id, start, end, rate: f64, status| Row::Assignment {
        id: Ulid::new(),
        owner_id,
        scope_id,
        start: d(start),
        end: d(end),
        rate: Rate::from_f64(rate),
        status,
        comment: None,
    };
    let rows = vec![
        Row::Department { id: dept, name: "Design".into() },
        Row::Team { id: team_a, department_id: dept, name: "Structures".into() },
        Row::Team { id: team_b, department_id: dept, name: "Utilities".into() },
        employee(alice, team_a, "Alice"),
        employee(bob, team_a, "Bob"),
        employee(carol, team_b, "Carol"),
        Row::Scope { id: project, parent_id: None, level: ScopeLevel::Project, name: "Bridge".into() },
        Row::Scope { id: section_a, parent_id: Some(project), level: ScopeLevel::Section, name: "KZh".into() },
        Row::Scope { id: section_b, parent_id: Some(project), level: ScopeLevel::Section, name: "KM".into() },
        assignment(alice, section_a, 1, 10, 0.5, AssignmentStatus::Active),
        assignment(alice, section_b, 8, 12, 1.0, AssignmentStatus::Active),
        assignment(carol, section_b, 2, 4, 1.0, AssignmentStatus::Active),
        assignment(bob, section_a, 1, 31, 1.0, AssignmentStatus::Archived),
        Row::CalendarEvent {
            date: "2024-01-09".into(),
            kind: EventKind::Holiday,
            is_workday: false,
            is_global: true,
        },
    ];

    let path = std::env::temp_dir().join(format!("planline_int_test_{}.json", Ulid::new()));
    std::fs::write(&path, serde_json::to_vec(&rows).unwrap()).unwrap();
    (
        path,
        Ids {
            team_a,
            alice,
            bob,
            carol,
            section_a,
            section_b,
        },
    )
}

/// Accepts everything and hands out fresh ids for creates.
struct AcceptAll;

#[async_trait]
impl CommandService for AcceptAll {
    async fn execute(&self, command: &Command) -> CommandOutcome {
        match command {
            Command::Create(_) => CommandOutcome::ok(Some(Ulid::new())),
            _ => CommandOutcome::ok(None),
        }
    }
}

fn harness(path: &PathBuf) -> (Arc<Cache>, FilterSyncController, CommandGateway) {
    let cache = Arc::new(Cache::new(Arc::new(NotifyHub::new())));
    let controller = FilterSyncController::new(cache.clone(), Arc::new(JsonRowsSource::new(path)));
    let gateway = CommandGateway::new(cache.clone(), Arc::new(AcceptAll));
    (cache, controller, gateway)
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn load_filter_and_mutate() {
    let (path, ids) = write_rows();
    let (cache, controller, gateway) = harness(&path);

    assert_eq!(controller.apply_filters(FilterSet::default()).await, FetchOutcome::Applied);
    let snap = cache.snapshot().await;
    assert_eq!(snap.assignment_count(), 3); // archived row left out
    assert!(!snap.calendar().is_working_day(d(9)));

    let alice = snap.employee_totals(&ids.alice, &DateRange::new(d(7), d(13))).unwrap();
    assert_eq!(alice[&d(7)], Rate::from_f64(0.5));
    assert_eq!(alice[&d(8)], Rate::from_f64(1.5));
    assert_eq!(alice[&d(11)], Rate::FULL);
    assert_eq!(alice[&d(13)], Rate::ZERO);

    // Narrow to the first team: Carol and her assignment drop out.
    let filters = FilterSet {
        team: Some(ids.team_a),
        ..FilterSet::default()
    };
    assert_eq!(controller.apply_filters(filters.clone()).await, FetchOutcome::Applied);
    let snap = cache.snapshot().await;
    assert_eq!(snap.assignment_count(), 2);
    assert!(snap.employee(&ids.carol).is_none());
    assert_eq!(snap.fingerprint(), Some(&filters.fingerprint()));
    assert_eq!(controller.apply_filters(filters).await, FetchOutcome::Unchanged);

    // Give Bob some work and watch his row.
    let mut bob_rx = cache.notify.subscribe(ids.bob);
    let receipt = gateway
        .mutate(Command::Create(NewAssignment {
            owner_id: ids.bob,
            scope_id: ids.section_b,
            start: d(15),
            end: d(19),
            rate: Rate::FULL,
            comment: Some("drawings".into()),
        }))
        .await
        .unwrap();
    assert!(receipt.applied);
    assert!(matches!(bob_rx.recv().await.unwrap(), Change::AssignmentCreated { owner_id, .. } if owner_id == ids.bob));

    let snap = cache.snapshot().await;
    let series = snap.employee_utilization(&ids.bob, &DateRange::new(d(15), d(21))).unwrap();
    assert_eq!(series.iter().filter(|l| l.percent == 100).count(), 5);
    snap.check_consistency().unwrap();

    assert!(controller.acknowledge());
    assert_eq!(controller.state(), SyncState::Idle);
    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn readers_never_see_half_a_move() {
    let (path, ids) = write_rows();
    let (cache, controller, gateway) = harness(&path);
    controller.apply_filters(FilterSet::default()).await;

    let id = cache.snapshot().await.owner_assignments(&ids.alice)[0].id;
    let gateway = Arc::new(gateway);

    let writer = {
        let gateway = gateway.clone();
        let (a, b) = (ids.section_a, ids.section_b);
        tokio::spawn(async move {
            for i in 0..200 {
                let scope = if i % 2 == 0 { b } else { a };
                gateway
                    .mutate(Command::Update {
                        id,
                        patch: AssignmentPatch::scope(scope),
                    })
                    .await
                    .unwrap();
            }
        })
    };

    let readers = (0..4).map(|_| {
        let cache = cache.clone();
        let (a, b) = (ids.section_a, ids.section_b);
        tokio::spawn(async move {
            for _ in 0..200 {
                let snap = cache.snapshot().await;
                let in_a = snap.scope_assignment_ids(&a).contains(&id);
                let in_b = snap.scope_assignment_ids(&b).contains(&id);
                assert!(in_a ^ in_b, "assignment in {} scope buckets", in_a as u8 + in_b as u8);
                snap.check_consistency().unwrap();
                tokio::task::yield_now().await;
            }
        })
    });

    for result in join_all(readers).await {
        result.unwrap();
    }
    writer.await.unwrap();
    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn missing_rows_file_fails_without_touching_cache() {
    let path = std::env::temp_dir().join(format!("planline_int_missing_{}.json", Ulid::new()));
    let (cache, controller, _gateway) = harness(&path);

    let outcome = controller.apply_filters(FilterSet::default()).await;
    assert!(matches!(outcome, FetchOutcome::Failed(_)));
    assert!(matches!(controller.state(), SyncState::Failed { .. }));
    assert_eq!(cache.snapshot().await.fingerprint(), None);
}
