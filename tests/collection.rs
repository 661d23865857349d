/// Collection pipeline: filter-skip, filter path, pagination and its limits.
mod support;

use notice_scout::portal::date_filter::DateRange;
use notice_scout::portal::pagination::{go_to_page, has_next_page};
use notice_scout::portal::rows::extract_visible_rows;
use notice_scout::{collect_notifications, PortalError};
use support::{init_logger, key, test_config, FakePortal};

#[tokio::test(start_paused = true)]
async fn test_filter_skipped_when_rows_already_visible() {
    init_logger();
    let cfg = test_config();
    let portal = FakePortal::new(12, 20);

    let records = tokio_test::assert_ok!(collect_notifications(&portal, &cfg, None).await);
    assert_eq!(records.len(), 12);
    assert_eq!(records[0].secondary_key, key(1));
    assert!(records.iter().all(|r| r.page_number == 1 && r.has_attachment_button));

    let s = portal.state();
    assert!(!s.calls.iter().any(|c| c == "focus_and_select" || c == "click_search"));
    assert!(s.typed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_filter_applied_then_all_pages_collected() {
    init_logger();
    let cfg = test_config();
    let portal = FakePortal::new(7, 5).configure(|s| s.rows_hidden_until_search = true);
    let range = DateRange::parse("01/03/2024", "08/03/2024", "%d/%m/%Y");

    let records = tokio_test::assert_ok!(collect_notifications(&portal, &cfg, range).await);
    assert_eq!(records.len(), 7);
    assert_eq!(records[4].page_number, 1);
    assert_eq!(records[5].page_number, 2);
    assert_eq!(records[6].secondary_key, key(7));

    let s = portal.state();
    assert!(s.filter_applied);
    assert_eq!(s.typed, "|01/03/2024|08/03/2024");
    assert!(s.calls.iter().any(|c| c == "key:Backspace"));
    assert_eq!(s.page_visits, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_inbox_returns_no_records() {
    init_logger();
    let cfg = test_config();
    let portal = FakePortal::new(0, 5);

    let records = tokio_test::assert_ok!(collect_notifications(&portal, &cfg, None).await);
    assert!(records.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_table_that_never_loads_is_a_timeout() {
    init_logger();
    let mut cfg = test_config();
    cfg.timeouts.table_load_ms = 5_000;
    let portal = FakePortal::new(5, 5).configure(|s| s.loading_forever = true);

    let err = tokio_test::assert_err!(collect_notifications(&portal, &cfg, None).await);
    assert!(matches!(err, PortalError::Timeout(_)));
}

#[tokio::test(start_paused = true)]
async fn test_stuck_paginator_stops_on_repeated_page() {
    init_logger();
    let cfg = test_config();
    let portal = FakePortal::new(10, 5).configure(|s| s.stuck_paginator = true);

    let records = tokio_test::assert_ok!(collect_notifications(&portal, &cfg, None).await);
    assert_eq!(records.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_max_pages_bounds_collection() {
    init_logger();
    let mut cfg = test_config();
    cfg.thresholds.max_pages = 2;
    let portal = FakePortal::new(30, 5);

    let records = tokio_test::assert_ok!(collect_notifications(&portal, &cfg, None).await);
    assert_eq!(records.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_go_to_page_is_noop_on_current_page() {
    init_logger();
    let cfg = test_config();
    let portal = FakePortal::new(12, 5);

    assert!(go_to_page(&portal, &cfg, 1).await);
    assert!(portal.state().page_visits.is_empty());

    assert!(go_to_page(&portal, &cfg, 3).await);
    assert!(!has_next_page(&portal, &cfg).await);
    let rows = extract_visible_rows(&portal, &cfg, 3).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].row_key.as_deref(), Some("10"));

    assert!(!go_to_page(&portal, &cfg, 4).await);
}

#[tokio::test(start_paused = true)]
async fn test_go_to_first_page_without_indicator_uses_page_link() {
    init_logger();
    let cfg = test_config();
    let portal = FakePortal::new(12, 5).configure(|s| {
        s.no_indicator = true;
        s.page = 3;
    });

    assert!(go_to_page(&portal, &cfg, 1).await);
    let s = portal.state();
    assert_eq!(s.page, 1);
    assert_eq!(s.page_visits, vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_go_to_first_page_without_indicator_or_links_steps_back() {
    init_logger();
    let cfg = test_config();
    let portal = FakePortal::new(12, 5).configure(|s| {
        s.no_indicator = true;
        s.no_page_links = true;
        s.page = 3;
    });

    assert!(go_to_page(&portal, &cfg, 1).await);
    let s = portal.state();
    assert_eq!(s.page, 1);
    assert_eq!(s.page_visits, vec![2, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_go_to_later_page_without_indicator_or_links_fails() {
    init_logger();
    let cfg = test_config();
    let portal = FakePortal::new(12, 5).configure(|s| {
        s.no_indicator = true;
        s.no_page_links = true;
    });

    assert!(!go_to_page(&portal, &cfg, 2).await);
    assert!(portal.state().page_visits.is_empty());
}
