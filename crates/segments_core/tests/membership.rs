use segments_core::db::{open_db, open_db_in_memory};
use segments_core::{
    MembershipRepository, MembershipService, RepoError, Segment, SegmentDelta,
    SqliteMembershipRepository,
};
use rusqlite::Connection;

fn delta(add: &[&str], remove: &[&str]) -> SegmentDelta {
    SegmentDelta::new(
        add.iter().map(|s| s.to_string()).collect(),
        remove.iter().map(|s| s.to_string()).collect(),
    )
}

fn slugs(segments: &[Segment]) -> Vec<&str> {
    segments.iter().map(|s| s.slug.as_str()).collect()
}

fn stored_blob(conn: &Connection, user_id: &str) -> Option<String> {
    conn.query_row(
        "SELECT segments FROM users WHERE id = ?1;",
        [user_id],
        |row| row.get(0),
    )
    .ok()
}

#[test]
fn reading_unknown_user_returns_empty_without_creating_row() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let service =
            MembershipService::new(SqliteMembershipRepository::try_new(&mut conn).unwrap());
        assert!(service.get_active_segments("nonexistent").unwrap().is_empty());
    }
    assert_eq!(stored_blob(&conn, "nonexistent"), None);
}

#[test]
fn added_segments_read_back_in_order() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service =
        MembershipService::new(SqliteMembershipRepository::try_new(&mut conn).unwrap());

    service.apply_delta("u1", &delta(&["a", "b"], &[])).unwrap();

    assert_eq!(
        service.get_active_segments("u1").unwrap(),
        vec![Segment::new("a"), Segment::new("b")]
    );
}

#[test]
fn removal_wins_over_addition_of_same_slug() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service =
        MembershipService::new(SqliteMembershipRepository::try_new(&mut conn).unwrap());

    service.apply_delta("u1", &delta(&["a"], &["a"])).unwrap();

    assert!(service.get_active_segments("u1").unwrap().is_empty());
}

#[test]
fn repeated_additions_are_kept() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service =
        MembershipService::new(SqliteMembershipRepository::try_new(&mut conn).unwrap());

    service.apply_delta("u2", &delta(&["x", "x"], &[])).unwrap();

    let segments = service.get_active_segments("u2").unwrap();
    assert_eq!(slugs(&segments), vec!["x", "x"]);
}

#[test]
fn removal_filters_every_matching_entry() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service =
        MembershipService::new(SqliteMembershipRepository::try_new(&mut conn).unwrap());

    service.apply_delta("u3", &delta(&["a", "b"], &[])).unwrap();
    service.apply_delta("u3", &delta(&["a"], &[])).unwrap();
    assert_eq!(
        slugs(&service.get_active_segments("u3").unwrap()),
        vec!["a", "b", "a"]
    );

    service.apply_delta("u3", &delta(&[], &["a"])).unwrap();
    assert_eq!(slugs(&service.get_active_segments("u3").unwrap()), vec!["b"]);
}

#[test]
fn emptied_list_is_stored_as_empty_array() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let mut service =
            MembershipService::new(SqliteMembershipRepository::try_new(&mut conn).unwrap());
        service.apply_delta("u4", &delta(&["a"], &[])).unwrap();
        service.apply_delta("u4", &delta(&[], &["a"])).unwrap();
    }
    assert_eq!(stored_blob(&conn, "u4").as_deref(), Some("[]"));
}

#[test]
fn empty_delta_still_creates_user_row() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let mut service =
            MembershipService::new(SqliteMembershipRepository::try_new(&mut conn).unwrap());
        service.apply_delta("fresh", &SegmentDelta::default()).unwrap();
    }
    assert_eq!(stored_blob(&conn, "fresh").as_deref(), Some("[]"));
}

#[test]
fn legacy_null_blob_reads_as_empty() {
    let mut conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO users (id, segments) VALUES ('legacy', 'null');",
        [],
    )
    .unwrap();

    let mut service =
        MembershipService::new(SqliteMembershipRepository::try_new(&mut conn).unwrap());
    assert!(service.get_active_segments("legacy").unwrap().is_empty());

    service.apply_delta("legacy", &delta(&["a"], &[])).unwrap();
    assert_eq!(slugs(&service.get_active_segments("legacy").unwrap()), vec!["a"]);
}

#[test]
fn corrupted_blob_fails_read_and_delta_without_writing() {
    let mut conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO users (id, segments) VALUES ('broken', '[{\"slug\":');",
        [],
    )
    .unwrap();

    {
        let mut service =
            MembershipService::new(SqliteMembershipRepository::try_new(&mut conn).unwrap());
        let read_err = service.get_active_segments("broken").unwrap_err();
        assert!(matches!(read_err, RepoError::InvalidData(_)));

        let write_err = service
            .apply_delta("broken", &delta(&["a"], &[]))
            .unwrap_err();
        assert!(matches!(write_err, RepoError::InvalidData(_)));
    }

    assert_eq!(
        stored_blob(&conn, "broken").as_deref(),
        Some("[{\"slug\":")
    );
}

#[test]
fn store_segments_replaces_whole_list() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteMembershipRepository::try_new(&mut conn).unwrap();

    repo.store_segments("u5", &[Segment::new("a"), Segment::new("b")])
        .unwrap();
    repo.store_segments("u5", &[Segment::new("c")]).unwrap();

    assert_eq!(
        repo.load_segments("u5").unwrap(),
        Some(vec![Segment::new("c")])
    );
    assert_eq!(repo.load_segments("other").unwrap(), None);
}

#[test]
fn concurrent_deltas_for_one_user_are_all_applied() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("membership.sqlite3");
    drop(open_db(&path).unwrap());

    let workers = 8;
    let per_worker = 10;
    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let path = path.clone();
            std::thread::spawn(move || {
                let mut conn = open_db(&path).unwrap();
                let mut service = MembershipService::new(
                    SqliteMembershipRepository::try_new(&mut conn).unwrap(),
                );
                for step in 0..per_worker {
                    let slug = format!("w{worker}-{step}");
                    service
                        .apply_delta("shared", &SegmentDelta::new(vec![slug], Vec::new()))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut conn = open_db(&path).unwrap();
    let service = MembershipService::new(SqliteMembershipRepository::try_new(&mut conn).unwrap());
    let segments = service.get_active_segments("shared").unwrap();
    assert_eq!(segments.len(), workers * per_worker);
}
