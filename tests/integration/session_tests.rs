use super::*;
use chrono::{Duration as ChronoDuration, Utc};

use sku_watcher::session::{CookieStore, SessionStatus};
use sku_watcher::utils::SessionError;
use sku_watcher::{AppError, MonitorState};

#[tokio::test]
async fn test_login_cookies_carry_over_to_the_next_run() -> anyhow::Result<()> {
    let harness = Harness::with_driver(StaticPage::new().with_page(LANDING, SIGNED_OUT));
    harness.driver.set_page(&item_address("1001"), item_page("1001", "Phone", "100", &[]));
    let mut monitor = harness.monitor(&["1001"]).await;

    monitor.run().await?;
    assert_eq!(harness.login.calls(), 1);

    let store = CookieStore::new(harness.state_dir().join("cookies"));
    let saved = store.load("buyer").await?;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].name, "thor");

    // A fresh browser that honours the saved cookie.
    let next = StaticPage::new().with_page(LANDING, SIGNED_IN);
    let mut guard = SessionGuard::new(
        SiteProfile::default(),
        &harness.session_config(),
        Box::new(harness.login.clone()),
    );
    assert_eq!(guard.load(&next).await?, SessionStatus::Valid);
    assert_eq!(next.cookies(), saved);
    assert_eq!(harness.login.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_expired_cookies_are_never_applied() -> anyhow::Result<()> {
    let harness = Harness::new();
    let store = CookieStore::new(harness.state_dir().join("cookies"));
    let yesterday = (Utc::now() - ChronoDuration::days(1)).timestamp();
    store
        .save("buyer", &[Cookie::new("thor", "old").with_expiry(yesterday)])
        .await?;

    let mut monitor = harness.monitor(&[]).await;
    assert!(monitor.start().await?);

    assert!(harness.driver.cookies().is_empty());
    assert_eq!(monitor.session().status(), SessionStatus::Valid);
    Ok(())
}

#[tokio::test]
async fn test_rejected_cookies_are_discarded_before_login() -> anyhow::Result<()> {
    let harness = Harness::with_driver(StaticPage::new().with_page(LANDING, SIGNED_OUT));
    let store = CookieStore::new(harness.state_dir().join("cookies"));
    store.save("buyer", &[Cookie::new("thor", "revoked")]).await?;

    let mut monitor = harness.monitor(&[]).await;
    assert!(monitor.start().await?);

    assert_eq!(harness.login.calls(), 1);
    assert_eq!(monitor.state(), MonitorState::Cycling);
    // The scripted login did not persist anything; the stale file is gone.
    assert!(!store.path_for("buyer").exists());
    Ok(())
}

#[tokio::test]
async fn test_corrupt_cookie_file_is_fatal() -> anyhow::Result<()> {
    let harness = Harness::new();
    let dir = harness.state_dir().join("cookies");
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join("buyer.cookies.json"), "{not json").await?;

    let mut monitor = harness.monitor(&["1001"]).await;
    let err = monitor.run().await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Session(SessionError::CookieLoadFailed { .. })
    ));
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(harness.driver.is_closed());
    assert_eq!(harness.login.calls(), 0);
    Ok(())
}
