use chrono::{TimeZone, Utc};
use tankobon_catalog::types::*;
use tankobon_db::*;

fn test_series(id: &str) -> Series {
    Series {
        id: id.to_string(),
        slug: id.to_string(),
        title: "Fullmetal Alchemist".to_string(),
        alt_titles: vec!["Hagane no Renkinjutsushi".to_string()],
        description: Some("Two brothers search for the Philosopher's Stone.".to_string()),
        status: SeriesStatus::Completed,
        year: Some(2001),
        genres: vec!["Action".to_string(), "Adventure".to_string()],
        cover_url: None,
        authors: vec!["Hiromu Arakawa".to_string()],
        artists: vec!["Hiromu Arakawa".to_string()],
        source: "mangadex".to_string(),
        external_id: "ext-fma".to_string(),
        raw: serde_json::json!({"status": "completed"}),
        created_at: String::new(),
        updated_at: String::new(),
    }
}

#[test]
fn upsert_and_get_series() {
    let conn = open_memory().unwrap();
    upsert_series(&conn, &test_series("fullmetal-alchemist")).unwrap();

    let found = get_series(&conn, "fullmetal-alchemist").unwrap().unwrap();
    assert_eq!(found.title, "Fullmetal Alchemist");
    assert_eq!(found.status, SeriesStatus::Completed);
    assert_eq!(found.genres, vec!["Action", "Adventure"]);
    assert_eq!(found.raw["status"], "completed");
}

#[test]
fn upsert_series_is_idempotent() {
    let conn = open_memory().unwrap();
    let series = test_series("fullmetal-alchemist");
    upsert_series(&conn, &series).unwrap();
    upsert_series(&conn, &series).unwrap();

    let count: i32 = conn
        .query_row("SELECT COUNT(*) FROM series", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn find_series_by_slug_roundtrip() {
    let conn = open_memory().unwrap();
    upsert_series(&conn, &test_series("fullmetal-alchemist")).unwrap();

    let found = find_series_by_slug(&conn, "fullmetal-alchemist").unwrap();
    assert!(found.is_some());
    assert!(find_series_by_slug(&conn, "missing").unwrap().is_none());
}

#[test]
fn external_link_lifecycle() {
    let conn = open_memory().unwrap();
    upsert_series(&conn, &test_series("fullmetal-alchemist")).unwrap();

    assert!(get_external_link(&conn, "mangadex", "ext-fma").unwrap().is_none());
    insert_external_link(&conn, "mangadex", "ext-fma", "fullmetal-alchemist").unwrap();
    assert_eq!(
        get_external_link(&conn, "mangadex", "ext-fma").unwrap(),
        Some("fullmetal-alchemist".to_string())
    );

    // Same external id under a different source is a distinct mapping
    assert!(get_external_link(&conn, "other", "ext-fma").unwrap().is_none());
}

#[test]
fn set_cover_url_updates_row() {
    let conn = open_memory().unwrap();
    upsert_series(&conn, &test_series("fullmetal-alchemist")).unwrap();

    set_cover_url(&conn, "fullmetal-alchemist", "https://img.example/fma/cover.jpg").unwrap();
    let found = get_series(&conn, "fullmetal-alchemist").unwrap().unwrap();
    assert_eq!(
        found.cover_url.as_deref(),
        Some("https://img.example/fma/cover.jpg")
    );

    assert!(set_cover_url(&conn, "missing", "x").is_err());
}

#[test]
fn crawl_state_roundtrip() {
    let conn = open_memory().unwrap();
    let mut state = CrawlState::new("series", 100);
    state.cursor_updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    state.cursor_last_id = Some("abc".to_string());
    insert_crawl_state(&conn, &state).unwrap();

    let loaded = get_crawl_state(&conn, "series").unwrap().unwrap();
    assert_eq!(loaded.mode, CrawlMode::Offset);
    assert_eq!(loaded.page_limit, 100);
    assert_eq!(
        loaded.cursor_updated_at,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(loaded.cursor_last_id.as_deref(), Some("abc"));

    assert!(get_crawl_state(&conn, "missing").unwrap().is_none());
}

#[test]
fn save_crawl_state_bumps_version() {
    let conn = open_memory().unwrap();
    insert_crawl_state(&conn, &CrawlState::new("series", 100)).unwrap();

    let mut state = get_crawl_state(&conn, "series").unwrap().unwrap();
    state.cursor_offset = 100;
    save_crawl_state(&conn, &mut state).unwrap();
    assert_eq!(state.version, 1);

    let loaded = get_crawl_state(&conn, "series").unwrap().unwrap();
    assert_eq!(loaded.cursor_offset, 100);
    assert_eq!(loaded.version, 1);
}

#[test]
fn save_crawl_state_detects_concurrent_update() {
    let conn = open_memory().unwrap();
    insert_crawl_state(&conn, &CrawlState::new("series", 100)).unwrap();

    let mut first = get_crawl_state(&conn, "series").unwrap().unwrap();
    let mut second = get_crawl_state(&conn, "series").unwrap().unwrap();

    first.cursor_offset = 100;
    save_crawl_state(&conn, &mut first).unwrap();

    second.cursor_offset = 200;
    let err = save_crawl_state(&conn, &mut second).unwrap_err();
    assert!(matches!(
        err,
        tankobon_db::OperationError::ConcurrentUpdate { .. }
    ));

    // The racing write did not land
    let loaded = get_crawl_state(&conn, "series").unwrap().unwrap();
    assert_eq!(loaded.cursor_offset, 100);
}

#[test]
fn save_missing_crawl_state_is_not_found() {
    let conn = open_memory().unwrap();
    let mut state = CrawlState::new("never-provisioned", 100);
    let err = save_crawl_state(&conn, &mut state).unwrap_err();
    assert!(matches!(err, tankobon_db::OperationError::NotFound { .. }));
}

#[test]
fn enqueue_art_job_is_idempotent() {
    let conn = open_memory().unwrap();
    upsert_series(&conn, &test_series("fullmetal-alchemist")).unwrap();

    enqueue_art_job(&conn, "fullmetal-alchemist").unwrap();
    enqueue_art_job(&conn, "fullmetal-alchemist").unwrap();

    let count: i32 = conn
        .query_row("SELECT COUNT(*) FROM art_jobs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);

    let status: String = conn
        .query_row(
            "SELECT status FROM art_jobs WHERE series_id = 'fullmetal-alchemist'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(status, "pending");
}

#[test]
fn insert_delta_log_appends() {
    let conn = open_memory().unwrap();
    upsert_series(&conn, &test_series("fullmetal-alchemist")).unwrap();

    let entry = DeltaLogEntry {
        id: 0,
        feed_id: "series".to_string(),
        external_id: "ext-fma".to_string(),
        series_id: "fullmetal-alchemist".to_string(),
        source_updated_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        action: DeltaAction::Insert,
        changes: serde_json::json!({"title": {"from": null, "to": "Fullmetal Alchemist"}}),
        before_state: None,
        after_state: serde_json::json!({"title": "Fullmetal Alchemist"}),
        created_at: String::new(),
    };
    let id = insert_delta_log(&conn, &entry).unwrap();
    assert!(id > 0);

    let id2 = insert_delta_log(&conn, &entry).unwrap();
    assert!(id2 > id);
}
