use super::*;
use rust_decimal::Decimal;

use sku_watcher::utils::NavigationError;

fn navigator() -> Navigator {
    let config = NavigatorConfig {
        retry_attempts: 2,
        retry_delay_ms: 0,
        settle_delay_ms: 0,
        ..NavigatorConfig::default()
    };
    Navigator::new(SiteProfile::default(), &config)
}

#[tokio::test]
async fn test_saved_page_is_parsed_offline() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("100038005189.html");
    tokio::fs::write(
        &file,
        r#"<html><body>
            <div class="sku-name">
                Wireless Earbuds
            </div>
            <div id="p-ad">下单立减</div>
            <div class="p-price"><span>￥</span><span class="price J-p-100038005189">1,299.00</span></div>
            <div class="summary-quan">
                <span class="quan-item" title="有效期2024年6月1日-2024年6月18日">满1000减100</span>
            </div>
        </body></html>"#,
    )
    .await?;

    let address = item_address("100038005189");
    let driver = StaticPage::from_file(&address, &file)?;
    let page = navigator().fetch(&driver, &url::Url::parse(&address)?).await?;
    let snapshot = FieldExtractor::new().extract(&page).await;

    assert_eq!(snapshot.name.as_deref(), Some("Wireless Earbuds"));
    assert_eq!(snapshot.price, Some(Decimal::from(1299)));
    assert_eq!(snapshot.subtitle.as_deref(), Some("下单立减"));
    assert!(snapshot.has_coupon);
    assert_eq!(snapshot.coupons[0].threshold, Some(Decimal::from(1000)));
    assert_eq!(
        snapshot.coupons[0].expiry,
        chrono::NaiveDate::from_ymd_opt(2024, 6, 18)
    );
    Ok(())
}

#[tokio::test]
async fn test_bounce_to_landing_is_not_retried() -> anyhow::Result<()> {
    let address = item_address("42");
    let driver = StaticPage::new()
        .with_page(LANDING, SIGNED_IN)
        .with_redirect(&address, LANDING);

    let err = navigator()
        .fetch(&driver, &url::Url::parse(&address)?)
        .await
        .err()
        .unwrap();

    assert!(matches!(err, NavigationError::AntiBotRedirect { .. }));
    assert_eq!(driver.navigations().len(), 1);
    Ok(())
}
