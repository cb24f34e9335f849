mod common;

use std::time::Duration;

use catalog_engine::{
    open_session, BrowserSession, FailureKind, PooledSession, SequentialSession, SessionSettings,
};
use common::{url, FakeFactory, FakeSite};
use futures_util::future::join_all;

#[tokio::test]
async fn sequential_session_recycles_driver_every_n_pages() {
    let site = FakeSite::new();
    for id in ["A1", "A2", "A3", "A4", "A5"] {
        site.page(&url(id), "<h1>x</h1>");
    }
    let factory = FakeFactory::new(site.clone());
    let settings = SessionSettings {
        recycle_every: 2,
        ..SessionSettings::default().without_delay()
    };
    let session = SequentialSession::open(settings, factory.clone()).await.unwrap();

    for id in ["A1", "A2", "A3", "A4", "A5"] {
        session.fetch_page_content(&url(id)).await.unwrap();
    }
    assert_eq!(session.launches(), 3);
    assert_eq!(factory.launches(), 3);
    assert_eq!(session.max_in_flight(), 1);
    session.shutdown().await;
}

#[tokio::test]
async fn failed_relaunch_is_session_fatal_and_not_retried() {
    let site = FakeSite::new();
    site.page(&url("A1"), "<h1>x</h1>");
    let factory = FakeFactory::failing_from(site.clone(), 2);
    let settings = SessionSettings {
        recycle_every: 1,
        ..SessionSettings::default().without_delay()
    };
    let session = SequentialSession::open(settings, factory.clone()).await.unwrap();

    session.fetch_page_content(&url("A1")).await.unwrap();
    let err = session.fetch_page_content(&url("A1")).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::SessionFatal);
    let err = session.fetch_page_content(&url("A1")).await.unwrap_err();
    assert!(err.is_session_fatal());
    assert_eq!(factory.launches(), 2);
}

#[tokio::test]
async fn ordinary_page_errors_are_not_fatal() {
    let site = FakeSite::new();
    let session = open_session(&common::sync_settings(), FakeFactory::new(site))
        .await
        .unwrap();
    let err = session.fetch_page_content(&url("MISSING")).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
    assert!(!err.is_session_fatal());
}

#[tokio::test]
async fn pooled_session_bounds_pages_in_flight() {
    let site = FakeSite::new();
    site.set_latency(Duration::from_millis(20));
    for n in 0..8 {
        site.page(&url(&format!("A{n}")), "<h1>x</h1>");
    }
    let session = PooledSession::open(common::concurrent_settings(3), FakeFactory::new(site.clone()))
        .await
        .unwrap();

    let urls: Vec<String> = (0..8).map(|n| url(&format!("A{n}"))).collect();
    let results = join_all(urls.iter().map(|u| session.fetch_page_content(u))).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(site.fetch_count(), 8);
    assert!(site.peak_in_flight() <= 3, "peak {}", site.peak_in_flight());
    assert_eq!(session.max_in_flight(), 3);
}

#[tokio::test]
async fn unopenable_session_reports_launch_error() {
    let site = FakeSite::new();
    let result = open_session(&common::sync_settings(), FakeFactory::failing_from(site, 1)).await;
    assert!(result.is_err());
}
