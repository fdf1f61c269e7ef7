use codex_mem::db::*;
use codex_mem::error::MemError;

fn test_db() -> MemoryDB {
    MemoryDB::open(":memory:").expect("in-memory db")
}

fn titles(t: &Timeline) -> Vec<&str> {
    t.items.iter().map(|i| i.title.as_str()).collect()
}

fn seed(db: &MemoryDB, project: &str, title: &str, iso: &str) -> Entry {
    db.insert(
        EntryInput::new(format!("{title} body"))
            .title(title)
            .project(project)
            .created_at_ms(parse_iso_ms(iso).unwrap()),
    )
    .unwrap()
}

#[test]
fn anchor_between_neighbours() {
    let db = test_db();
    seed(&db, "p", "t1", "2026-02-10T00:00:00Z");
    let t2 = seed(&db, "p", "t2", "2026-02-11T00:00:00Z");
    seed(&db, "p", "t3", "2026-02-12T00:00:00Z");

    let tl = db.timeline(&t2.id, Some(1), Some(1)).unwrap();
    assert_eq!(tl.anchor_id, t2.id);
    assert_eq!(titles(&tl), vec!["t1", "t2", "t3"]);
}

#[test]
fn depths_bound_each_side() {
    let db = test_db();
    let mut anchor = None;
    for day in 10..=18 {
        let e = seed(&db, "p", &format!("d{day}"), &format!("2026-02-{day}T00:00:00Z"));
        if day == 14 {
            anchor = Some(e);
        }
    }
    let anchor = anchor.unwrap();

    let tl = db.timeline(&anchor.id, Some(2), Some(3)).unwrap();
    assert_eq!(titles(&tl), vec!["d12", "d13", "d14", "d15", "d16", "d17"]);

    let defaults = db.timeline(&anchor.id, None, None).unwrap();
    assert_eq!(defaults.items.len(), 7, "3 before, anchor, 3 after");

    let only = db.timeline(&anchor.id, Some(0), Some(0)).unwrap();
    assert_eq!(titles(&only), vec!["d14"]);
}

#[test]
fn same_timestamp_ordered_by_insertion() {
    let db = test_db();
    let iso = "2026-02-10T12:00:00Z";
    seed(&db, "p", "first", iso);
    let mid = seed(&db, "p", "second", iso);
    seed(&db, "p", "third", iso);

    let tl = db.timeline(&mid.id, Some(5), Some(5)).unwrap();
    assert_eq!(titles(&tl), vec!["first", "second", "third"]);
}

#[test]
fn backfilled_entry_sorts_by_creation_time() {
    let db = test_db();
    let late = seed(&db, "p", "late", "2026-02-12T00:00:00Z");
    // inserted after, but created earlier
    seed(&db, "p", "early", "2026-02-01T00:00:00Z");

    let tl = db.timeline(&late.id, Some(3), Some(3)).unwrap();
    assert_eq!(titles(&tl), vec!["early", "late"]);
}

#[test]
fn other_projects_never_appear() {
    let db = test_db();
    seed(&db, "alpha", "a1", "2026-02-10T00:00:00Z");
    let a2 = seed(&db, "alpha", "a2", "2026-02-12T00:00:00Z");
    seed(&db, "beta", "b1", "2026-02-11T00:00:00Z");
    seed(&db, "beta", "b2", "2026-02-13T00:00:00Z");

    let tl = db.timeline(&a2.id, Some(10), Some(10)).unwrap();
    assert_eq!(titles(&tl), vec!["a1", "a2"]);
    assert!(tl.items.iter().all(|i| i.project == "alpha"));
}

#[test]
fn missing_anchor_is_not_found() {
    let db = test_db();
    let err = db.timeline("does-not-exist", None, None).unwrap_err();
    assert!(matches!(err, MemError::EntryNotFound(ref id) if id == "does-not-exist"));
    assert_eq!(err.code(), "ENTRY_NOT_FOUND");
}

#[test]
fn blank_anchor_is_invalid() {
    let db = test_db();
    assert_eq!(db.timeline("  ", None, None).unwrap_err().code(), "INVALID_ARGUMENT");
}

#[test]
fn depth_is_capped() {
    let db = test_db();
    let mut last = None;
    for i in 0..30 {
        last = Some(
            db.insert(EntryInput::new(format!("n{i}")).created_at_ms(1_000 + i))
                .unwrap(),
        );
    }
    let tl = db.timeline(&last.unwrap().id, Some(1000), Some(1000)).unwrap();
    assert_eq!(tl.items.len(), 21, "20 predecessors plus the anchor");
}
