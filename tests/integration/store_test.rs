//! Repository tests against a file-backed database

use chrono::Duration;
use rust_decimal_macros::dec;
use std::sync::Arc;
use updown_tracker::config::DatabaseConfig;
use updown_tracker::market::{classify, Market, MarketPhase, Outcome};
use updown_tracker::store::{MarketRepository, NewSnapshot, SqliteRepository, StoreError};

mod common;
use common::at;

fn database_config(dir: &tempfile::TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("tracker.db").display()),
        max_connections: 4,
    }
}

fn market(id: &str, slug: &str, condition_id: &str, hour: u32) -> Market {
    let start = at(hour, 0, 0);
    Market {
        id: id.to_string(),
        condition_id: condition_id.to_string(),
        token_up: format!("{}-up", condition_id),
        token_down: format!("{}-down", condition_id),
        asset: "BTC".to_string(),
        question: "Bitcoin Up or Down?".to_string(),
        slug: slug.to_string(),
        series_slug: Some("btc-up-or-down-hourly".to_string()),
        event_start_time: start,
        hour_start: start,
        hour_end: start + Duration::hours(1),
        outcome: None,
        created_at: start - Duration::minutes(30),
        updated_at: start - Duration::minutes(30),
    }
}

fn snapshot(market_id: &str, minute: u32) -> NewSnapshot {
    NewSnapshot {
        market_id: market_id.to_string(),
        captured_at: at(11, minute, 0),
        minute_of_hour: minute as i64,
        up_price: dec!(0.515),
        down_price: dec!(0.485),
        best_bid: Some(dec!(0.51)),
        best_ask: Some(dec!(0.52)),
        spread: Some(dec!(0.01)),
        midpoint: Some(dec!(0.515)),
        last_trade_price: None,
        volume_24h: Some(dec!(98765.4321)),
    }
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = database_config(&dir);

    {
        let repo = SqliteRepository::connect(&config).await.unwrap();
        repo.upsert_market(&market("m-1", common::BTC_7AM, "0xa", 11))
            .await
            .unwrap();
        repo.insert_snapshot(&snapshot("m-1", 5)).await.unwrap();
        repo.update_outcome("m-1", Outcome::Down).await.unwrap();
        repo.close().await;
    }

    let repo = SqliteRepository::connect(&config).await.unwrap();
    let stored = repo.get_market("m-1").await.unwrap().unwrap();
    assert_eq!(stored.outcome, Some(Outcome::Down));
    assert_eq!(stored.hour_end, at(12, 0, 0));
    assert_eq!(classify(&stored, at(13, 0, 0)), MarketPhase::Resolved(Outcome::Down));

    let snapshots = repo.get_snapshots_by_market("m-1").await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].volume_24h, Some(dec!(98765.4321)));

    // Outcome is still write-once after reopening
    assert!(matches!(
        repo.update_outcome("m-1", Outcome::Up).await,
        Err(StoreError::AlreadyResolved { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_snapshot_writes() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(SqliteRepository::connect(&database_config(&dir)).await.unwrap());
    repo.upsert_market(&market("m-1", common::BTC_7AM, "0xa", 11))
        .await
        .unwrap();
    repo.upsert_market(&market("m-2", common::ETH_7AM, "0xb", 11))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..40u32 {
        let repo = repo.clone();
        let market_id = if i % 2 == 0 { "m-1" } else { "m-2" };
        handles.push(tokio::spawn(async move {
            repo.insert_snapshot(&snapshot(market_id, i % 60)).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), 40);
    assert_eq!(repo.count_snapshots().await.unwrap(), 40);
    assert_eq!(repo.get_snapshots_by_market("m-1").await.unwrap().len(), 20);
    assert_eq!(repo.get_snapshots_by_market("m-2").await.unwrap().len(), 20);
}

#[tokio::test]
async fn test_concurrent_resolution_writes_once() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(SqliteRepository::connect(&database_config(&dir)).await.unwrap());
    repo.upsert_market(&market("m-1", common::BTC_7AM, "0xa", 11))
        .await
        .unwrap();

    let attempts: Vec<_> = (0..8)
        .map(|i| {
            let repo = repo.clone();
            let outcome = if i % 2 == 0 { Outcome::Up } else { Outcome::Down };
            tokio::spawn(async move { repo.update_outcome("m-1", outcome).await })
        })
        .collect();

    let mut written = 0;
    let mut rejected = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(()) => written += 1,
            Err(StoreError::AlreadyResolved { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(written, 1);
    assert_eq!(rejected, 7);
}

#[tokio::test]
async fn test_window_queries_across_hours() {
    let repo = SqliteRepository::in_memory().await.unwrap();
    repo.upsert_market(&market("m-7", common::BTC_7AM, "0xa", 11))
        .await
        .unwrap();
    repo.upsert_market(&market("m-8", common::BTC_8AM, "0xb", 12))
        .await
        .unwrap();

    // 11:55Z: 7am is active and closing, 8am has not started
    let now = at(11, 55, 0);
    let active = repo.get_active_markets(now).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "m-7");
    let closing = repo.get_closing_markets(now, 10).await.unwrap();
    assert_eq!(closing.len(), 1);
    assert!(repo.get_pending_resolution_markets(now).await.unwrap().is_empty());

    // 12:00Z: the boundary hands over from 7am to 8am
    let now = at(12, 0, 0);
    let active = repo.get_active_markets(now).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "m-8");
    let pending = repo.get_pending_resolution_markets(now).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "m-7");

    // Resolved markets leave every working set
    repo.update_outcome("m-7", Outcome::Up).await.unwrap();
    assert!(repo.get_pending_resolution_markets(now).await.unwrap().is_empty());
    assert_eq!(repo.list_markets(10).await.unwrap().len(), 2);
}
