mod common;

use casefront::config::ShopConfig;
use casefront::domain::money::Balance;
use casefront::error::ShopError;
use casefront::infrastructure::in_memory::{InMemoryLedger, Operation};
use common::{amount, shop, shop_with_config};
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::time::{Instant, sleep};

#[tokio::test]
async fn test_fallback_rate_is_not_cached() {
    let shop = shop(InMemoryLedger::new(0).with_rate(dec!(95)));
    shop.ledger.fail_exchange_rate(true).await;

    let rate = shop.rates.get().await.unwrap();
    assert_eq!(rate.usd_to_local(), dec!(90));
    assert!(shop.rates.peek().await.is_none());

    shop.ledger.fail_exchange_rate(false).await;
    assert_eq!(shop.rates.get().await.unwrap().usd_to_local(), dec!(95));
    assert_eq!(shop.ledger.call_count(Operation::ExchangeRate).await, 2);
}

#[tokio::test]
async fn test_no_fallback_surfaces_fetch_failure() {
    let config =
        ShopConfig::from_json_str(r#"{"exchange_rate": {"fallback_usd_to_local": null}}"#).unwrap();
    let shop = shop_with_config(InMemoryLedger::new(0), config);
    shop.ledger.fail_exchange_rate(true).await;

    assert!(matches!(
        shop.rates.get().await,
        Err(ShopError::RateFetchFailed(_))
    ));
    assert!(matches!(
        shop.top_up.quote(amount(100)).await,
        Err(ShopError::RateFetchFailed(_))
    ));
}

#[tokio::test]
async fn test_cached_rate_holds_until_refreshed() {
    let shop = shop(InMemoryLedger::new(0).with_rate(dec!(90)));
    assert_eq!(
        shop.rates.to_local(amount(1000)).await.unwrap(),
        Balance::new(90000)
    );

    shop.ledger.set_rate(dec!(91.5)).await;
    assert_eq!(
        shop.rates.to_local(amount(1000)).await.unwrap(),
        Balance::new(90000)
    );

    let refreshed = shop.rates.refresh().await.unwrap();
    assert_eq!(refreshed.usd_to_local(), dec!(91.5));
    assert_eq!(
        shop.rates.to_local(amount(1000)).await.unwrap(),
        Balance::new(91500)
    );
    assert_eq!(shop.ledger.call_count(Operation::ExchangeRate).await, 2);
}

#[tokio::test]
async fn test_failed_refresh_keeps_last_good_rate() {
    let shop = shop(InMemoryLedger::new(0).with_rate(dec!(92)));
    shop.rates.refresh().await.unwrap();

    shop.ledger.fail_exchange_rate(true).await;
    assert!(shop.rates.refresh().await.is_err());
    assert_eq!(shop.rates.peek().await.unwrap().usd_to_local(), dec!(92));
    assert_eq!(
        shop.top_up.quote(amount(50)).await.unwrap(),
        Balance::new(4600)
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_first_callers_share_one_fetch() {
    let shop = shop(
        InMemoryLedger::new(0)
            .with_rate(dec!(92))
            .with_latency(Operation::ExchangeRate, Duration::from_secs(1)),
    );

    let (first, second) = tokio::join!(shop.rates.get(), shop.rates.get());
    assert_eq!(first.unwrap().usd_to_local(), dec!(92));
    assert_eq!(second.unwrap().usd_to_local(), dec!(92));
    assert_eq!(shop.ledger.call_count(Operation::ExchangeRate).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_refreshes_are_serialized() {
    let shop = shop(
        InMemoryLedger::new(0)
            .with_rate(dec!(90))
            .with_latency(Operation::ExchangeRate, Duration::from_secs(1)),
    );
    let started = Instant::now();

    let later = async {
        sleep(Duration::from_millis(500)).await;
        shop.rates.refresh().await
    };
    let (earlier, later) = tokio::join!(shop.rates.refresh(), later);
    let (earlier, later) = (earlier.unwrap(), later.unwrap());

    // The second fetch only starts once the first one has been stored.
    assert_eq!(earlier.fetched_at() - started, Duration::from_secs(1));
    assert_eq!(later.fetched_at() - started, Duration::from_secs(2));
    assert_eq!(shop.rates.peek().await, Some(later));
}
