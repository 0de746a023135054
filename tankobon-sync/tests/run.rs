use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use tokio::sync::Mutex;

use tankobon_catalog::types::*;
use tankobon_db::*;
use tankobon_scraper::{FsCoverStore, ScrapeError};
use tankobon_scraper::covers::CachedCover;
use tankobon_scraper::types::{Paged, RawChapter, RawSeries, RawSeriesStub};
use tankobon_sync::{FeedSource, RecordOutcome, RunOptions, SyncError, UpstreamFeed, run_feed};

#[derive(Default)]
struct StubFeed {
    series_pages: Vec<Paged<RawSeries>>,
    series_calls: AtomicUsize,
    since_pages: Vec<Paged<RawSeries>>,
    since_calls: AtomicUsize,
    chapter_pages: Vec<Paged<RawChapter>>,
    chapter_calls: AtomicUsize,
    by_id: HashMap<String, RawSeries>,
    total: i64,
    fail_covers: bool,
}

fn pick<T: Clone>(pages: &[Paged<T>], calls: &AtomicUsize) -> Paged<T> {
    let idx = calls.fetch_add(1, Ordering::SeqCst);
    pages[idx.min(pages.len() - 1)].clone()
}

impl FeedSource for StubFeed {
    async fn series_page(&self, _limit: i64, _offset: i64) -> Result<Paged<RawSeries>, ScrapeError> {
        Ok(pick(&self.series_pages, &self.series_calls))
    }

    async fn series_page_since(
        &self,
        _limit: i64,
        _since: DateTime<Utc>,
    ) -> Result<Paged<RawSeries>, ScrapeError> {
        Ok(pick(&self.since_pages, &self.since_calls))
    }

    async fn series_ids_page(&self, limit: i64) -> Result<Paged<RawSeriesStub>, ScrapeError> {
        Ok(Paged {
            data: vec![],
            limit,
            offset: 0,
            total: self.total,
        })
    }

    async fn chapter_page_since(
        &self,
        _limit: i64,
        _since: DateTime<Utc>,
    ) -> Result<Paged<RawChapter>, ScrapeError> {
        Ok(pick(&self.chapter_pages, &self.chapter_calls))
    }

    async fn series_by_id(&self, external_id: &str) -> Result<RawSeries, ScrapeError> {
        self.by_id
            .get(external_id)
            .cloned()
            .ok_or_else(|| ScrapeError::Api(format!("no such series: {external_id}")))
    }

    async fn cache_cover(
        &self,
        slug: &str,
        candidates: &[String],
    ) -> Result<CachedCover, ScrapeError> {
        if self.fail_covers {
            return Err(ScrapeError::CoverExhausted {
                last_url: candidates.last().cloned().unwrap_or_default(),
                last_status: 404,
            });
        }
        Ok(CachedCover {
            url: format!("https://img.example/covers/{slug}/cover.jpg"),
            candidate_index: 0,
        })
    }
}

fn raw_series(id: &str, title: &str, updated_at: &str) -> RawSeries {
    serde_json::from_value(json!({
        "id": id,
        "attributes": {
            "title": { "en": title },
            "status": "ongoing",
            "year": 2020,
            "updatedAt": updated_at,
        },
        "relationships": [
            { "id": "a1", "type": "author", "attributes": { "name": "Some Author" } },
            {
                "id": "c1",
                "type": "cover_art",
                "attributes": { "fileName": "vol1.jpg", "main": true }
            },
        ]
    }))
    .unwrap()
}

fn raw_series_coverless(id: &str, title: &str, updated_at: &str) -> RawSeries {
    serde_json::from_value(json!({
        "id": id,
        "attributes": {
            "title": { "en": title },
            "status": "ongoing",
            "updatedAt": updated_at,
        },
    }))
    .unwrap()
}

fn raw_chapter(id: &str, parent: Option<&str>, updated_at: &str) -> RawChapter {
    let mut relationships = vec![];
    if let Some(parent) = parent {
        relationships.push(json!({ "id": parent, "type": "manga" }));
    }
    serde_json::from_value(json!({
        "id": id,
        "attributes": { "updatedAt": updated_at },
        "relationships": relationships,
    }))
    .unwrap()
}

fn page<T>(data: Vec<T>, limit: i64, total: i64) -> Paged<T> {
    Paged {
        data,
        limit,
        offset: 0,
        total,
    }
}

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn db_with_state(state: &CrawlState) -> Mutex<Connection> {
    let conn = open_memory().unwrap();
    insert_crawl_state(&conn, state).unwrap();
    Mutex::new(conn)
}

#[tokio::test]
async fn offset_run_inserts_then_reruns_unchanged() {
    let db = db_with_state(&CrawlState::new("series", 10));

    let feed = StubFeed {
        series_pages: vec![page(
            vec![
                raw_series("m1", "Alpha Quest", "2024-01-01T00:00:00Z"),
                raw_series("m2", "Beta Blade", "2024-01-02T00:00:00Z"),
            ],
            10,
            2,
        )],
        total: 2,
        ..Default::default()
    };

    let report = run_feed(&db, &feed, "series", "mangadex", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.records_refreshed, 2);
    assert_eq!(report.records_skipped, 0);
    assert!(report.caught_up);
    assert!(matches!(report.outcomes[0], RecordOutcome::Inserted { .. }));
    assert_eq!(report.cursor_after.offset, 2);

    {
        let conn = db.lock().await;
        let series = get_series(&conn, "alpha-quest").unwrap().unwrap();
        assert_eq!(series.title, "Alpha Quest");
        assert_eq!(
            series.cover_url.as_deref(),
            Some("https://img.example/covers/alpha-quest/cover.jpg")
        );
    }

    // A second pass over the same records is a pure no-op with audit entries
    let report = run_feed(&db, &feed, "series", "mangadex", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.records_refreshed, 2);
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o, RecordOutcome::Unchanged { .. })));

    let conn = db.lock().await;
    let entries = recent_delta_entries(&conn, "series", 10).unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0].changes, json!({}));
    assert_eq!(entries[0].action, DeltaAction::Update);
    // The audit "after" snapshot reflects the stored row, cached cover included
    assert_eq!(
        entries[3].after_state["cover_url"],
        "https://img.example/covers/alpha-quest/cover.jpg"
    );

    let count: i32 = conn
        .query_row("SELECT COUNT(*) FROM series", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn unprovisioned_feed_is_an_error() {
    let db = Mutex::new(open_memory().unwrap());
    let feed = StubFeed::default();
    let err = run_feed(&db, &feed, "series", "mangadex", RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::StateNotProvisioned { .. }));
}

#[tokio::test]
async fn unknown_feed_is_an_error() {
    let db = Mutex::new(open_memory().unwrap());
    let feed = StubFeed::default();
    let err = run_feed(&db, &feed, "volumes", "mangadex", RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnknownFeed { .. }));
}

#[tokio::test]
async fn window_cap_switches_mode_without_fetching() {
    let mut state = CrawlState::new("series", 100);
    state.cursor_offset = 9_950;
    let db = db_with_state(&state);

    // No pages configured: the switch invocation must not fetch
    let feed = StubFeed::default();
    let report = run_feed(&db, &feed, "series", "mangadex", RunOptions::default())
        .await
        .unwrap();

    assert!(report.mode_switched);
    assert_eq!(report.pages_fetched, 0);
    assert_eq!(report.records_processed, 0);
    assert_eq!(report.cursor_after.mode, "updated_at");
    assert_eq!(report.cursor_after.offset, 0);
    assert_eq!(report.cursor_after.updated_at, Some(DateTime::UNIX_EPOCH));

    let conn = db.lock().await;
    let loaded = get_crawl_state(&conn, "series").unwrap().unwrap();
    assert_eq!(loaded.mode, CrawlMode::UpdatedAt);
    assert_eq!(loaded.version, 1);
}

#[tokio::test]
async fn updated_at_run_advances_cursor_with_tiebreak() {
    let mut state = CrawlState::new("series", 10);
    state.mode = CrawlMode::UpdatedAt;
    state.cursor_updated_at = Some(DateTime::UNIX_EPOCH);
    let db = db_with_state(&state);

    // Two records sharing one second; ids arrive out of lexical order
    let feed = StubFeed {
        since_pages: vec![page(
            vec![
                raw_series("b", "Beta Blade", "2024-01-01T00:00:00Z"),
                raw_series("a", "Alpha Quest", "2024-01-01T00:00:00Z"),
            ],
            10,
            2,
        )],
        total: 5000,
        ..Default::default()
    };

    let report = run_feed(&db, &feed, "series", "mangadex", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.records_refreshed, 2);
    assert!(report.caught_up);
    assert_eq!(
        report.cursor_after.updated_at,
        Some(ts("2024-01-01T00:00:01Z"))
    );
    assert_eq!(report.cursor_after.last_id.as_deref(), Some("a"));

    // Collection total refreshed from the ids-only endpoint
    let conn = db.lock().await;
    let loaded = get_crawl_state(&conn, "series").unwrap().unwrap();
    assert_eq!(loaded.total, Some(5000));
}

#[tokio::test]
async fn cursor_skips_already_seen_records_unless_forced() {
    let mut state = CrawlState::new("series", 10);
    state.mode = CrawlMode::UpdatedAt;
    state.cursor_updated_at = Some(ts("2024-02-01T00:00:00Z"));
    let db = db_with_state(&state);

    let feed = StubFeed {
        since_pages: vec![page(
            vec![raw_series("m1", "Alpha Quest", "2024-01-01T00:00:00Z")],
            10,
            1,
        )],
        total: 1,
        ..Default::default()
    };

    let report = run_feed(&db, &feed, "series", "mangadex", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.records_refreshed, 0);
    assert_eq!(report.records_skipped, 1);
    assert!(matches!(
        report.outcomes[0],
        RecordOutcome::SkippedCursor { .. }
    ));
    // Nothing processed, so the cursor holds
    assert_eq!(
        report.cursor_after.updated_at,
        Some(ts("2024-02-01T00:00:00Z"))
    );
    {
        let conn = db.lock().await;
        assert!(get_series(&conn, "alpha-quest").unwrap().is_none());
    }

    let opts = RunOptions {
        force: true,
        ..Default::default()
    };
    let report = run_feed(&db, &feed, "series", "mangadex", opts).await.unwrap();
    assert_eq!(report.records_refreshed, 1);

    let conn = db.lock().await;
    assert!(get_series(&conn, "alpha-quest").unwrap().is_some());
}

#[tokio::test]
async fn chapter_run_dedupes_parent_series() {
    let mut state = CrawlState::new("chapters", 10);
    state.mode = CrawlMode::UpdatedAt;
    let db = db_with_state(&state);

    let feed = StubFeed {
        chapter_pages: vec![page(
            vec![
                raw_chapter("c1", Some("m1"), "2024-01-01T00:00:00Z"),
                raw_chapter("c2", Some("m1"), "2024-01-01T00:00:01Z"),
                raw_chapter("c3", Some("m1"), "2024-01-01T00:00:02Z"),
            ],
            10,
            3,
        )],
        by_id: HashMap::from([(
            "m1".to_string(),
            raw_series("m1", "Alpha Quest", "2024-01-01T00:00:02Z"),
        )]),
        ..Default::default()
    };

    let report = run_feed(&db, &feed, "chapters", "mangadex", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.records_processed, 3);
    assert_eq!(report.records_refreshed, 1);
    assert_eq!(report.records_skipped, 2);
    assert!(report
        .outcomes
        .iter()
        .skip(1)
        .all(|o| matches!(o, RecordOutcome::SkippedDuplicate { .. })));

    // Duplicate chapters still move the cursor
    assert_eq!(
        report.cursor_after.updated_at,
        Some(ts("2024-01-01T00:00:03Z"))
    );
    assert_eq!(report.cursor_after.last_id.as_deref(), Some("c3"));

    let conn = db.lock().await;
    assert_eq!(delta_count_for_series(&conn, "alpha-quest").unwrap(), 1);
}

#[tokio::test]
async fn orphan_chapters_are_skipped() {
    let mut state = CrawlState::new("chapters", 10);
    state.mode = CrawlMode::UpdatedAt;
    let db = db_with_state(&state);

    let feed = StubFeed {
        chapter_pages: vec![page(
            vec![raw_chapter("c1", None, "2024-01-01T00:00:00Z")],
            10,
            1,
        )],
        ..Default::default()
    };

    let report = run_feed(&db, &feed, "chapters", "mangadex", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.records_refreshed, 0);
    assert!(matches!(
        report.outcomes[0],
        RecordOutcome::SkippedOrphan { .. }
    ));

    let conn = db.lock().await;
    let count: i32 = conn
        .query_row("SELECT COUNT(*) FROM series", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn cover_exhaustion_fails_the_run_and_holds_the_cursor() {
    let db = db_with_state(&CrawlState::new("series", 10));

    let feed = StubFeed {
        series_pages: vec![page(
            vec![raw_series("m1", "Alpha Quest", "2024-01-01T00:00:00Z")],
            10,
            1,
        )],
        total: 1,
        fail_covers: true,
        ..Default::default()
    };

    let err = run_feed(&db, &feed, "series", "mangadex", RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Scrape(ScrapeError::CoverExhausted { .. })
    ));

    // The failed invocation persisted no crawl-state changes
    let conn = db.lock().await;
    let loaded = get_crawl_state(&conn, "series").unwrap().unwrap();
    assert_eq!(loaded.cursor_offset, 0);
    assert_eq!(loaded.version, 0);
}

#[tokio::test]
async fn refreshed_records_enqueue_art_jobs_even_without_covers() {
    let db = db_with_state(&CrawlState::new("series", 10));

    let feed = StubFeed {
        series_pages: vec![page(
            vec![raw_series_coverless("m1", "No Art Yet", "2024-01-01T00:00:00Z")],
            10,
            1,
        )],
        total: 1,
        ..Default::default()
    };

    let report = run_feed(&db, &feed, "series", "mangadex", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.records_refreshed, 1);

    let conn = db.lock().await;
    let series = get_series(&conn, "no-art-yet").unwrap().unwrap();
    assert!(series.cover_url.is_none());

    let jobs = pending_art_jobs(&conn, 10).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].series_id, "no-art-yet");
}

#[tokio::test]
async fn budget_break_mid_page_holds_offset_at_consumed_records() {
    let db = db_with_state(&CrawlState::new("series", 10));

    let feed = StubFeed {
        series_pages: vec![page(
            vec![
                raw_series("m1", "Alpha Quest", "2024-01-01T00:00:00Z"),
                raw_series("m2", "Beta Blade", "2024-01-01T00:00:01Z"),
                raw_series("m3", "Gamma Gear", "2024-01-01T00:00:02Z"),
            ],
            10,
            3,
        )],
        total: 3,
        ..Default::default()
    };

    let opts = RunOptions {
        hard_cap: 1,
        ..Default::default()
    };
    let report = run_feed(&db, &feed, "series", "mangadex", opts).await.unwrap();
    assert_eq!(report.records_refreshed, 1);
    assert!(!report.caught_up);
    // The unprocessed tail of the page stays ahead of the cursor
    assert_eq!(report.cursor_after.offset, 1);

    let conn = db.lock().await;
    let loaded = get_crawl_state(&conn, "series").unwrap().unwrap();
    assert_eq!(loaded.cursor_offset, 1);
    let count: i32 = conn
        .query_row("SELECT COUNT(*) FROM series", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn upstream_feed_futures_are_send() {
    fn is_send<T: Send>(_: T) {}
    fn check(
        db: &Mutex<Connection>,
        feed: &UpstreamFeed<FsCoverStore>,
        slug: &str,
        urls: &[String],
    ) {
        is_send(feed.cache_cover(slug, urls));
        is_send(run_feed(db, feed, "series", "mangadex", RunOptions::default()));
    }
    let _: fn(&Mutex<Connection>, &UpstreamFeed<FsCoverStore>, &str, &[String]) = check;
}

#[tokio::test]
async fn slug_collisions_get_a_suffix() {
    let db = db_with_state(&CrawlState::new("series", 10));

    let feed = StubFeed {
        series_pages: vec![page(
            vec![
                raw_series("aaa111", "Same Title", "2024-01-01T00:00:00Z"),
                raw_series("bbb222", "Same Title", "2024-01-01T00:00:01Z"),
            ],
            10,
            2,
        )],
        total: 2,
        ..Default::default()
    };

    let report = run_feed(&db, &feed, "series", "mangadex", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.records_refreshed, 2);

    let conn = db.lock().await;
    assert!(find_series_by_slug(&conn, "same-title").unwrap().is_some());
    assert!(find_series_by_slug(&conn, "same-title-bbb222").unwrap().is_some());
}
