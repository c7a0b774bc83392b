use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

use sku_watcher::models::ChangeKind;
use sku_watcher::MonitorState;

fn kinds(events: &[ChangeEvent]) -> Vec<ChangeKind> {
    events.iter().map(|e| e.kind).collect()
}

#[tokio::test]
async fn test_price_increase_is_reported_once() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.driver.set_page(&item_address("1001"), item_page("1001", "Phone", "100", &[]));
    let mut monitor = harness.monitor(&["1001"]).await;
    monitor.start().await?;

    let first = monitor.run_cycle().await?;
    assert_eq!(kinds(&first.events), vec![ChangeKind::FirstSeen]);

    harness.driver.set_page(&item_address("1001"), item_page("1001", "Phone", "120", &[]));
    let second = monitor.run_cycle().await?;
    assert_eq!(kinds(&second.events), vec![ChangeKind::PriceChanged]);

    let payloads = harness.transport.payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(
        payloads[1],
        serde_json::json!({"id": "1001", "title": "Phone", "price": "120", "status": "up ¥20 (100 → 120)"})
    );
    assert_eq!(harness.history().await["1001"]["last_price"], "120");

    // Same page again: nothing new to say.
    let third = monitor.run_cycle().await?;
    assert_eq!(kinds(&third.events), vec![ChangeKind::Unchanged]);
    assert_eq!(harness.transport.payloads().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_first_sighting_is_recorded() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.driver.set_page(&item_address("2002"), item_page("2002", "Kettle", "50", &[]));
    let mut monitor = harness.monitor(&["2002"]).await;

    let summary = monitor.run().await?;

    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.events, 1);
    assert_eq!(summary.delivered, 1);
    assert_eq!(
        harness.transport.payloads(),
        vec![serde_json::json!({"id": "2002", "title": "Kettle", "price": "50", "status": "tracking started at ¥50"})]
    );
    assert_eq!(harness.history().await["2002"]["last_price"], "50");
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(harness.driver.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_gated_item_is_skipped_while_session_holds() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.login.gate(&item_address("3003"));
    harness.driver.set_page(&item_address("3004"), item_page("3004", "Mouse", "80", &[]));
    let mut monitor = harness.monitor(&["3003", "3004"]).await;
    monitor.start().await?;

    let report = monitor.run_cycle().await?;

    assert_eq!(report.skipped, vec!["3003".to_string()]);
    assert_eq!(report.fetched, vec!["3004".to_string()]);
    assert!(!report.session_expired);
    assert_eq!(monitor.state(), MonitorState::Cycling);
    assert_eq!(harness.login.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_session_expiry_pauses_cycle() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.driver.set_page(&item_address("4004"), item_page("4004", "Monitor", "900", &[]));
    harness.driver.set_page(&item_address("4005"), item_page("4005", "Cable", "9", &[]));
    let mut monitor = harness.monitor(&["4004", "4005"]).await;
    monitor.start().await?;

    // The whole session lapses between cycles.
    harness.login.gate(&item_address("4004"));
    harness.driver.set_page(LANDING, SIGNED_OUT);
    let report = monitor.run_cycle().await?;

    assert!(report.session_expired);
    assert_eq!(monitor.state(), MonitorState::SessionPending);
    assert!(report.events.is_empty());
    assert!(
        !harness.driver.navigations().contains(&item_address("4005")),
        "items after the expiry must wait for the next cycle"
    );
    Ok(())
}

#[tokio::test]
async fn test_signed_out_start_logs_in_first() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.driver.set_page(&item_address("4004"), item_page("4004", "Monitor", "900", &[]));
    harness.login.gate(&item_address("4004"));
    harness.driver.set_page(LANDING, SIGNED_OUT);
    let mut monitor = harness.monitor(&["4004"]).await;

    let summary = monitor.run().await?;

    // The login at start lifts the gate, so no second one is needed.
    assert_eq!(harness.login.calls(), 1);
    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.events, 1);
    Ok(())
}

/// Lets the session lapse after the first message and asks the loop to stop
/// after the second.
struct ExpiringTransport {
    login: ScriptedLogin,
    stop: tokio::sync::watch::Sender<bool>,
    sent: AtomicU32,
}

#[async_trait]
impl NotificationTransport for ExpiringTransport {
    fn name(&self) -> &'static str {
        "expiring"
    }

    async fn send(&self, _event: &ChangeEvent, _payload: &NotificationPayload) -> Result<(), NotificationError> {
        match self.sent.fetch_add(1, Ordering::SeqCst) {
            0 => {
                self.login.gate(&item_address("4004"));
                self.login.driver.set_page(LANDING, SIGNED_OUT);
                self.login
                    .driver
                    .set_page(&item_address("4004"), item_page("4004", "Monitor", "850", &[]));
            }
            _ => {
                let _ = self.stop.send(true);
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_expiry_mid_run_logs_in_and_cycles_again() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.driver.set_page(&item_address("4004"), item_page("4004", "Monitor", "900", &[]));
    let (stop, shutdown) = tokio::sync::watch::channel(false);
    let transport = ExpiringTransport {
        login: harness.login.clone(),
        stop,
        sent: AtomicU32::new(0),
    };

    let site = SiteProfile::default();
    let config = MonitorConfig {
        interval_secs: 1,
        item_delay_secs: 0,
        ..MonitorConfig::default()
    };
    let navigator_config = NavigatorConfig {
        retry_attempts: 1,
        settle_delay_ms: 0,
        ..NavigatorConfig::default()
    };
    let mut monitor = MonitorLoop::new(
        Box::new(harness.driver.clone()),
        Navigator::new(site.clone(), &navigator_config),
        FieldExtractor::new(),
        SessionGuard::new(site.clone(), &harness.session_config(), Box::new(harness.login.clone())),
        ChangeDetector::open(HistoryStore::new(harness.history_path())).await?,
        Notifier::new(vec![Box::new(transport)]),
        vec![ItemTarget::resolve("4004", &site)?],
        &config,
    )
    .with_shutdown(shutdown);

    let summary = monitor.run().await?;

    // first seen, expired, price drop after the new login
    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.events, 2);
    assert_eq!(harness.login.calls(), 1);
    assert_eq!(harness.history().await["4004"]["last_price"], "850");
    assert!(harness.driver.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_vanished_coupons_are_one_event() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.driver.set_page(
        &item_address("5005"),
        item_page("5005", "Laptop", "5999", &["满5000减300"]),
    );
    let mut monitor = harness.monitor(&["5005"]).await;
    monitor.start().await?;

    monitor.run_cycle().await?;
    assert_eq!(harness.history().await["5005"]["last_coupons"].as_array().unwrap().len(), 1);

    harness.driver.set_page(&item_address("5005"), item_page("5005", "Laptop", "5999", &[]));
    let report = monitor.run_cycle().await?;

    assert_eq!(kinds(&report.events), vec![ChangeKind::CouponChanged]);
    assert_eq!(
        harness.transport.payloads().last().unwrap(),
        &serde_json::json!({"id": "5005", "title": "Laptop"})
    );
    assert!(harness.history().await["5005"]["last_coupons"].as_array().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unreadable_price_reports_failure_and_keeps_history() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.driver.set_page(&item_address("6006"), item_page("6006", "Desk", "300", &[]));
    let mut monitor = harness.monitor(&["6006"]).await;
    monitor.start().await?;
    monitor.run_cycle().await?;
    let before = harness.history().await;

    harness.driver.set_page(
        &item_address("6006"),
        r#"<html><body><div class="sku-name">Desk</div><div class="p-price">暂无报价</div></body></html>"#,
    );
    let report = monitor.run_cycle().await?;

    assert_eq!(kinds(&report.events), vec![ChangeKind::ExtractionFailed]);
    assert_eq!(
        harness.transport.payloads().last().unwrap()["exception"],
        "no price could be read for item 6006"
    );
    assert_eq!(harness.history().await, before);
    Ok(())
}

#[tokio::test]
async fn test_page_without_price_still_saves_cookies() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.driver.set_page(
        &item_address("9009"),
        r#"<html><body>
            <div class="sku-name">Headphones</div>
            <div class="news"><div id="p-ad">限时特惠</div></div>
        </body></html>"#,
    );
    let mut monitor = harness.monitor(&["9009"]).await;
    monitor.start().await?;
    let cookie_file = harness.session_config().cookie_path();
    assert!(!cookie_file.exists());

    let report = monitor.run_cycle().await?;

    assert_eq!(report.fetched, vec!["9009".to_string()]);
    assert_eq!(kinds(&report.events), vec![ChangeKind::ExtractionFailed]);
    // Name and subtitle were served, so the session is good to keep.
    let saved: serde_json::Value = serde_json::from_str(&tokio::fs::read_to_string(&cookie_file).await?)?;
    assert!(saved.to_string().contains("thor"));
    Ok(())
}

#[tokio::test]
async fn test_failing_transport_does_not_stop_the_cycle() -> anyhow::Result<()> {
    let mut harness = Harness::new();
    harness.transport.fail = true;
    harness.driver.set_page(&item_address("7007"), item_page("7007", "Lamp", "40", &[]));
    harness.driver.set_page(&item_address("7008"), item_page("7008", "Bulb", "4", &[]));
    let mut monitor = harness.monitor(&["7007", "7008"]).await;
    monitor.start().await?;

    let report = monitor.run_cycle().await?;

    assert_eq!(report.fetched.len(), 2);
    assert_eq!(report.delivered, 0);
    assert_eq!(harness.transport.payloads().len(), 2);
    // History does not depend on delivery.
    assert_eq!(harness.history().await["7008"]["last_price"], "4");
    Ok(())
}

#[tokio::test]
async fn test_targets_are_reloaded_between_cycles() -> anyhow::Result<()> {
    let harness = Harness::new();
    harness.driver.set_page(&item_address("8008"), item_page("8008", "Chair", "250", &[]));
    harness.driver.set_page(&item_address("8009"), item_page("8009", "Sofa", "2500", &[]));
    let mut monitor = harness.monitor(&["8008"]).await;
    monitor.start().await?;
    monitor.run_cycle().await?;

    let extra = ItemTarget::resolve("8009", &SiteProfile::default())?;
    monitor.targets().write().await.push(extra);
    let report = monitor.run_cycle().await?;

    assert_eq!(report.fetched, vec!["8008".to_string(), "8009".to_string()]);
    Ok(())
}
