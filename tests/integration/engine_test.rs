//! Engine tests over an in-memory store and a scripted venue

use chrono::Duration;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use updown_tracker::engine::{DiscoveryEngine, Resolution, ResolutionEngine, SnapshotCollector};
use updown_tracker::market::{MarketDataSource, Outcome};
use updown_tracker::store::{MarketRepository, SqliteRepository};

mod common;
use common::{at, config, hourly, ScriptedSource, BTC_7AM, BTC_8AM, ETH_7AM, ETH_8AM};

async fn setup(source: ScriptedSource) -> (Arc<SqliteRepository>, Arc<ScriptedSource>) {
    let repo = Arc::new(SqliteRepository::in_memory().await.unwrap());
    (repo, Arc::new(source))
}

fn discovery(repo: &Arc<SqliteRepository>, source: &Arc<ScriptedSource>) -> DiscoveryEngine {
    let store: Arc<dyn MarketRepository> = repo.clone();
    let venue: Arc<dyn MarketDataSource> = source.clone();
    DiscoveryEngine::new(store, venue, &config())
}

fn list_morning(source: &ScriptedSource) {
    source.list(hourly(BTC_7AM, "0xbtc7", at(11, 0, 0)));
    source.list(hourly(BTC_8AM, "0xbtc8", at(12, 0, 0)));
    source.list(hourly(ETH_7AM, "0xeth7", at(11, 0, 0)));
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let (repo, source) = setup(ScriptedSource::default()).await;
    list_morning(&source);
    let engine = discovery(&repo, &source);

    let created = engine.discover_new_markets_at(at(11, 30, 0)).await;
    let mut slugs: Vec<_> = created.iter().map(|m| m.slug.as_str()).collect();
    slugs.sort_unstable();
    assert_eq!(slugs, vec![BTC_7AM, BTC_8AM, ETH_7AM]);

    let again = engine.discover_new_markets_at(at(11, 45, 0)).await;
    assert!(again.is_empty());
    assert_eq!(repo.list_markets(10).await.unwrap().len(), 3);

    // Known slugs never reach the venue again; the unlisted one is retried
    assert_eq!(source.lookups_of(BTC_7AM), 1);
    assert_eq!(source.lookups_of(ETH_7AM), 1);
    assert_eq!(source.lookups_of(ETH_8AM), 2);

    source.list(hourly(ETH_8AM, "0xeth8", at(12, 0, 0)));
    let late = engine.discover_new_markets_at(at(11, 50, 0)).await;
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].slug, ETH_8AM);
    assert_eq!(late[0].asset, "ETH");
    assert_eq!(late[0].hour_end, at(13, 0, 0));
}

#[tokio::test]
async fn test_snapshot_mid_hour() {
    let (repo, source) = setup(ScriptedSource::default()).await;
    list_morning(&source);
    source.quote("0xbtc7-up", dec!(0.515));
    source.quote("0xbtc7-down", dec!(0.485));
    source.set_book(vec![dec!(0.50), dec!(0.51)], vec![dec!(0.56), dec!(0.54)]);
    source.set_midpoint(Some(dec!(0.525)));

    discovery(&repo, &source)
        .discover_new_markets_at(at(11, 5, 0))
        .await;

    let store: Arc<dyn MarketRepository> = repo.clone();
    let collector = SnapshotCollector::new(store, source.clone(), &config());
    let written = collector.collect_active_at(at(11, 47, 0)).await;
    // BTC and ETH 7am are inside their hour, 8am is not
    assert_eq!(written, 2);

    let btc = repo.get_market_by_slug(BTC_7AM).await.unwrap().unwrap();
    let snapshots = repo.get_snapshots_by_market(&btc.id).await.unwrap();
    assert_eq!(snapshots.len(), 1);

    let snapshot = &snapshots[0];
    assert_eq!(snapshot.minute_of_hour, 47);
    assert_eq!(snapshot.up_price, dec!(0.515));
    assert_eq!(snapshot.down_price, dec!(0.485));
    assert_eq!(snapshot.best_bid, Some(dec!(0.51)));
    assert_eq!(snapshot.best_ask, Some(dec!(0.54)));
    assert_eq!(snapshot.spread, Some(dec!(0.03)));
    assert_eq!(snapshot.midpoint, Some(dec!(0.525)));
    assert_eq!(snapshot.last_trade_price, Some(dec!(0.44)));
    assert_eq!(snapshot.volume_24h, Some(dec!(1520.50)));

    // ETH has no quotes; its prices fall back to zero
    let eth = repo.get_market_by_slug(ETH_7AM).await.unwrap().unwrap();
    let eth_snapshots = repo.get_snapshots_by_market(&eth.id).await.unwrap();
    assert_eq!(eth_snapshots[0].up_price, dec!(0));
    assert_eq!(eth_snapshots[0].down_price, dec!(0));
}

#[tokio::test]
async fn test_collector_respects_concurrency_cap() {
    let source = ScriptedSource {
        price_delay: Some(std::time::Duration::from_millis(20)),
        ..Default::default()
    };
    let (repo, source) = setup(source).await;

    let mut config = config();
    config.collector.max_concurrent_markets = 2;

    // Six markets sharing the 7am hour
    let store: Arc<dyn MarketRepository> = repo.clone();
    for i in 0..6 {
        let slug = format!("asset{}-up-or-down-march-10-7am-et", i);
        let venue = hourly(&slug, &format!("0xc{}", i), at(11, 0, 0));
        let market = updown_tracker::engine::discovery::market_from_venue(
            &config.assets[0],
            &slug,
            &venue,
            at(10, 50, 0),
        )
        .unwrap();
        store.upsert_market(&market).await.unwrap();
    }

    let collector = SnapshotCollector::new(store, source.clone(), &config);
    let written = collector.collect_active_at(at(11, 10, 0)).await;

    assert_eq!(written, 6);
    assert_eq!(repo.count_snapshots().await.unwrap(), 6);
    let peak = source.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak in-flight reads was {}", peak);
}

#[tokio::test]
async fn test_closing_soon_window() {
    let (repo, source) = setup(ScriptedSource::default()).await;
    list_morning(&source);
    discovery(&repo, &source)
        .discover_new_markets_at(at(11, 5, 0))
        .await;

    let store: Arc<dyn MarketRepository> = repo.clone();
    let collector = SnapshotCollector::new(store, source.clone(), &config());

    // 11:45Z is fifteen minutes out, beyond a ten minute window
    assert_eq!(collector.collect_closing_soon_at(at(11, 45, 0), 10).await, 0);
    assert_eq!(collector.collect_closing_soon_at(at(11, 52, 0), 10).await, 2);
    assert_eq!(repo.count_snapshots().await.unwrap(), 2);
}

#[tokio::test]
async fn test_resolution_lifecycle() {
    let (repo, source) = setup(ScriptedSource::default()).await;
    list_morning(&source);
    discovery(&repo, &source)
        .discover_new_markets_at(at(11, 5, 0))
        .await;

    let store: Arc<dyn MarketRepository> = repo.clone();
    let engine = ResolutionEngine::new(store, source.clone(), &config());

    // Nothing is due before the hour ends
    let before = source.total_calls();
    assert_eq!(engine.check_resolutions_at(at(11, 59, 59)).await, 0);
    assert_eq!(source.total_calls(), before);

    // Venue has not closed anything yet
    assert_eq!(engine.check_resolutions_at(at(12, 1, 0)).await, 0);

    source.settle(BTC_7AM, r#"["1", "0"]"#);
    source.settle(ETH_7AM, r#"["0.5", "0.5"]"#);
    assert_eq!(engine.check_resolutions_at(at(12, 5, 0)).await, 1);

    let btc = repo.get_market_by_slug(BTC_7AM).await.unwrap().unwrap();
    assert_eq!(btc.outcome, Some(Outcome::Up));

    let eth = repo.get_market_by_slug(ETH_7AM).await.unwrap().unwrap();
    assert_eq!(eth.outcome, None);
    assert_eq!(
        engine.resolve_market(&eth, at(12, 10, 0)).await,
        Resolution::Ambiguous {
            up: dec!(0.5),
            down: dec!(0.5)
        }
    );

    // A later settlement of the resolved market cannot flip it
    source.settle(BTC_7AM, r#"["0", "1"]"#);
    assert_eq!(
        engine.resolve_market(&btc, at(12, 15, 0)).await,
        Resolution::AlreadyResolved
    );
    let btc = repo.get_market_by_slug(BTC_7AM).await.unwrap().unwrap();
    assert_eq!(btc.outcome, Some(Outcome::Up));

    // 8am is still pending only once its own hour is over
    let pending = repo
        .get_pending_resolution_markets(at(12, 0, 0) + Duration::hours(1))
        .await
        .unwrap();
    let mut slugs: Vec<_> = pending.iter().map(|m| m.slug.clone()).collect();
    slugs.sort_unstable();
    assert_eq!(slugs, vec![BTC_8AM.to_string(), ETH_7AM.to_string()]);
}
