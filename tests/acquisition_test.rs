//! End-to-end acquisition scenarios against a scripted registry.

mod helpers;

use chrono::NaiveDate;

use bevalc_intel::db::{open_memory_store, open_store, queries};
use bevalc_intel::services::acquisition::AcquisitionWorker;
use helpers::{month_of_records, FakeRecord, FakeRegistry};

/// Small month: one unsplit query collects everything, both phases verify.
#[tokio::test]
async fn test_small_month_collects_and_verifies() {
    let records = month_of_records(2013, 1, 150, 28);
    let registry = FakeRegistry::new(records);
    let store = open_memory_store().await.unwrap();
    let mut worker = AcquisitionWorker::new("t1", registry, store);

    let progress = worker.collect_links(2013, 1).await.unwrap();
    assert_eq!(progress.expected_links, 150);
    assert_eq!(progress.collected_links, 150);
    assert!(progress.links_verified);
    assert!(progress.error.is_none());

    // Distinct ttb_ids equal row count: the links table deduplicates.
    assert_eq!(queries::count_links(worker.store()).await.unwrap(), 150);

    let progress = worker.scrape_details(2013, 1).await.unwrap();
    assert_eq!(progress.scraped_details, 150);
    assert!(progress.details_verified);
    assert_eq!(
        queries::count_records_for_month(worker.store(), 2013, 1)
            .await
            .unwrap(),
        150
    );

    // Every scraped link has its record; nothing is left unscraped.
    assert!(queries::unscraped_links(worker.store(), 2013, 1)
        .await
        .unwrap()
        .is_empty());
}

/// Phase 1 re-run short-circuits once the month already holds enough links.
#[tokio::test]
async fn test_phase1_rerun_short_circuits() {
    let records = month_of_records(2013, 1, 150, 28);
    let registry = FakeRegistry::new(records);
    let store = open_memory_store().await.unwrap();
    let mut worker = AcquisitionWorker::new("t1", registry, store);

    worker.collect_links(2013, 1).await.unwrap();
    let searches_after_first = worker.registry().search_calls;

    let progress = worker.collect_links(2013, 1).await.unwrap();
    assert!(progress.links_verified);
    assert_eq!(progress.collected_links, 150);
    // Only the single verification query ran the second time.
    assert_eq!(worker.registry().search_calls, searches_after_first + 1);
    assert_eq!(queries::count_links(worker.store()).await.unwrap(), 150);
}

/// Busy month with no single-day overflow: recursive date bisection keeps
/// every leaf query under the cap and the union covers the month.
#[tokio::test]
async fn test_busy_month_splits_by_date() {
    let records = month_of_records(2024, 11, 2500, 30);
    let registry = FakeRegistry::new(records);
    let store = open_memory_store().await.unwrap();
    let mut worker = AcquisitionWorker::new("t2", registry, store);

    let progress = worker.collect_links(2024, 11).await.unwrap();
    assert_eq!(progress.expected_links, 2500);
    assert_eq!(progress.collected_links, 2500);
    assert!(progress.links_verified);
}

/// Single-day overflow: bisection bottoms out on one day, the five-way
/// class-code split kicks in, and each slice stays under the cap.
#[tokio::test]
async fn test_single_day_overflow_class_split() {
    let day = NaiveDate::from_ymd_opt(2024, 11, 5).unwrap();
    let records: Vec<FakeRecord> = (0..1200)
        .map(|seq| {
            let class_digit = (seq % 9) + 1;
            FakeRecord::new(seq, day, &format!("{class_digit}70"))
        })
        .collect();
    let registry = FakeRegistry::new(records);
    let store = open_memory_store().await.unwrap();
    let mut worker = AcquisitionWorker::new("t3", registry, store);

    let progress = worker.collect_links(2024, 11).await.unwrap();
    assert_eq!(progress.collected_links, 1200);
    assert!(progress.links_verified);
}

/// Interrupted Phase 2 resumes: a restart scrapes exactly the links the
/// first session did not finish.
#[tokio::test]
async fn test_phase2_resume_after_interrupt() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir
        .path()
        .join("resume.db")
        .to_string_lossy()
        .into_owned();

    let total = 400u64;

    // First session dies after 100 details.
    {
        let mut registry = FakeRegistry::new(month_of_records(2013, 1, total, 28));
        registry.fail_details_after = Some(100);
        let store = open_store(&store_path).await.unwrap();
        let mut worker = AcquisitionWorker::new("t4", registry, store);

        let progress = worker.process_month(2013, 1, false, false).await.unwrap();
        assert!(progress.links_verified);
        assert!(!progress.details_verified);
        assert_eq!(progress.scraped_details, 100);
    }

    // Restart with the same command: Phase 1 short-circuits, Phase 2
    // scrapes only the remaining 300.
    {
        let registry = FakeRegistry::new(month_of_records(2013, 1, total, 28));
        let store = open_store(&store_path).await.unwrap();
        let mut worker = AcquisitionWorker::new("t4", registry, store);

        let progress = worker.process_month(2013, 1, false, false).await.unwrap();
        assert!(progress.details_verified);
        assert_eq!(progress.scraped_details, total as i64);
        assert_eq!(worker.registry().details_served, 300);
        // Phase 1 was skipped entirely.
        assert_eq!(worker.registry().search_calls, 0);
    }
}

/// Scraped records carry the extracted fields and derived date parts.
#[tokio::test]
async fn test_scraped_records_have_derived_fields() {
    let records = month_of_records(2013, 2, 30, 14);
    let registry = FakeRegistry::new(records);
    let store = open_memory_store().await.unwrap();
    let mut worker = AcquisitionWorker::new("t5", registry, store);

    worker.collect_links(2013, 2).await.unwrap();
    worker.scrape_details(2013, 2).await.unwrap();

    let page = queries::records_page(worker.store(), None, 5).await.unwrap();
    assert_eq!(page.len(), 5);
    for record in &page {
        assert!(record.brand_name.is_some());
        assert!(record.company_name.is_some());
        assert_eq!(record.year, Some(2013));
        assert_eq!(record.month, Some(2));
        assert!(record.day.is_some());
        assert!(record.category.is_some());
    }
}
