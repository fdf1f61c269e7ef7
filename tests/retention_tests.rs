use codex_mem::db::*;
use codex_mem::retention::{dry_run, ReasonCounts, RetentionRequest};

fn seed(db: &MemoryDB, project: &str, id_hint: &str, iso: &str) -> (String, Entry) {
    let e = db
        .insert(
            EntryInput::new(format!("{id_hint} body"))
                .title(id_hint)
                .project(project)
                .created_at_ms(parse_iso_ms(iso).unwrap()),
        )
        .unwrap();
    (id_hint.to_string(), e)
}

/// Five alpha entries on consecutive days plus one recent and one old beta
/// entry. Returns (hint, id) pairs.
fn seed_scenario(db: &MemoryDB) -> Vec<(String, String)> {
    [
        ("alpha", "alpha-1", "2026-02-10T00:00:00.000Z"),
        ("alpha", "alpha-2", "2026-02-11T00:00:00.000Z"),
        ("alpha", "alpha-3", "2026-02-12T00:00:00.000Z"),
        ("alpha", "alpha-4", "2026-02-13T00:00:00.000Z"),
        ("alpha", "alpha-5", "2026-02-14T00:00:00.000Z"),
        ("beta", "beta-new-1", "2026-02-18T00:00:00.000Z"),
        ("beta", "beta-old-1", "2025-10-01T00:00:00.000Z"),
    ]
    .into_iter()
    .map(|(p, hint, iso)| {
        let (h, e) = seed(db, p, hint, iso);
        (h, e.id)
    })
    .collect()
}

fn id_of<'a>(seeded: &'a [(String, String)], hint: &str) -> &'a str {
    &seeded.iter().find(|(h, _)| h == hint).unwrap().1
}

fn scenario_request() -> RetentionRequest {
    RetentionRequest::new()
        .now_ms(parse_iso_ms("2026-02-19T00:00:00.000Z").unwrap())
        .max_age_days(30)
        .max_entries_per_project(2)
}

#[test]
fn union_of_age_and_count_rules() {
    let db = MemoryDB::open(":memory:").unwrap();
    let seeded = seed_scenario(&db);

    let report = dry_run(&db, &scenario_request()).unwrap();
    assert_eq!(report.mode, "dry-run");
    assert_eq!(report.executed_at, "2026-02-19T00:00:00.000Z");
    assert_eq!(report.total_candidates, 4);
    assert_eq!(report.by_reason, ReasonCounts { age: 1, project_count: 3 });

    let mut expected: Vec<&str> = ["beta-old-1", "alpha-1", "alpha-2", "alpha-3"]
        .iter()
        .map(|h| id_of(&seeded, h))
        .collect();
    expected.sort_unstable();
    assert_eq!(report.candidate_ids, expected);

    // report only: nothing removed
    assert_eq!(db.count_entries().unwrap(), 7);
}

#[test]
fn overlap_counts_once_in_total() {
    let db = MemoryDB::open(":memory:").unwrap();
    seed_scenario(&db);

    // per-project cap of 1 also flags beta-old-1, which the age rule flags too
    let req = scenario_request().max_entries_per_project(1);
    let report = dry_run(&db, &req).unwrap();
    assert_eq!(report.by_reason, ReasonCounts { age: 1, project_count: 5 });
    assert_eq!(report.total_candidates, 5);
}

#[test]
fn project_filter_limits_scope() {
    let db = MemoryDB::open(":memory:").unwrap();
    let seeded = seed_scenario(&db);

    let report = dry_run(&db, &scenario_request().project("beta")).unwrap();
    assert_eq!(report.candidate_ids, vec![id_of(&seeded, "beta-old-1")]);
    assert_eq!(report.by_reason, ReasonCounts { age: 1, project_count: 0 });
}

#[test]
fn single_rule_is_enough() {
    let db = MemoryDB::open(":memory:").unwrap();
    seed_scenario(&db);
    let now = parse_iso_ms("2026-02-19T00:00:00.000Z").unwrap();

    let age_only = dry_run(&db, &RetentionRequest::new().now_ms(now).max_age_days(30)).unwrap();
    assert_eq!(age_only.total_candidates, 1);
    assert_eq!(age_only.by_reason.project_count, 0);

    let count_only =
        dry_run(&db, &RetentionRequest::new().now_ms(now).max_entries_per_project(2)).unwrap();
    assert_eq!(count_only.total_candidates, 3);
    assert_eq!(count_only.by_reason.age, 0);
}

#[test]
fn rejects_missing_or_non_positive_rules() {
    let db = MemoryDB::open(":memory:").unwrap();
    let cases = [
        RetentionRequest::new(),
        RetentionRequest::new().max_age_days(0),
        RetentionRequest::new().max_entries_per_project(-1),
        RetentionRequest::new().max_age_days(5).max_entries_per_project(0),
    ];
    for req in &cases {
        assert_eq!(dry_run(&db, req).unwrap_err().code(), "INVALID_ARGUMENT", "{req:?}");
    }
}

#[test]
fn empty_store_still_reports() {
    let db = MemoryDB::open(":memory:").unwrap();
    let report = dry_run(&db, &RetentionRequest::new().max_age_days(1)).unwrap();
    assert_eq!(report.total_candidates, 0);
    assert!(report.candidate_ids.is_empty());
}

#[test]
fn every_run_appends_an_audit_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mem.db");
    let path = path.to_str().unwrap();
    let db = MemoryDB::open(path).unwrap();
    seed_scenario(&db);

    dry_run(&db, &scenario_request()).unwrap();
    dry_run(&db, &scenario_request().project("nobody")).unwrap();
    db.close().unwrap();

    let raw = rusqlite::Connection::open(path).unwrap();
    let rows: Vec<(String, Option<String>, i64, String, String, String)> = raw
        .prepare(
            "SELECT mode, project, total_candidates, by_reason_json, input_json, candidate_ids_json \
             FROM retention_audit_events ORDER BY total_candidates DESC",
        )
        .unwrap()
        .query_map([], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
        })
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 2);

    let (mode, project, total, by_reason, input, ids) = &rows[0];
    assert_eq!(mode, "dry-run");
    assert_eq!(project, &None);
    assert_eq!(*total, 4);
    let by_reason: serde_json::Value = serde_json::from_str(by_reason).unwrap();
    assert_eq!(by_reason, serde_json::json!({"age": 1, "project_count": 3}));
    let input: serde_json::Value = serde_json::from_str(input).unwrap();
    assert_eq!(
        input,
        serde_json::json!({
            "now": "2026-02-19T00:00:00.000Z",
            "max_age_days": 30,
            "max_entries_per_project": 2,
            "project": null,
        })
    );
    let ids: Vec<String> = serde_json::from_str(ids).unwrap();
    assert_eq!(ids.len(), 4);

    let (_, project, total, _, _, ids) = &rows[1];
    assert_eq!(project.as_deref(), Some("nobody"));
    assert_eq!(*total, 0);
    assert_eq!(ids, "[]");
}
