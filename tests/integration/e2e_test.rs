//! End-to-end integration tests

use rust_decimal_macros::dec;
use std::sync::Arc;
use updown_tracker::config::Config;
use updown_tracker::data::{read_snapshots, SnapshotExporter};
use updown_tracker::engine::{DiscoveryEngine, ResolutionEngine, SnapshotCollector};
use updown_tracker::market::{classify, slug, MarketDataSource, MarketPhase, Outcome};
use updown_tracker::store::{MarketRepository, SqliteRepository};

mod common;
use common::{at, config, hourly, ScriptedSource, BTC_7AM, BTC_8AM, ETH_7AM};

#[test]
fn test_config_example_loads() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    config.validate().unwrap();

    let symbols: Vec<_> = config.assets.iter().map(|a| a.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BTC", "ETH", "SOL", "XRP"]);
    assert_eq!(config.resolution.settlement_threshold, dec!(0.9));
    assert!(config.telemetry.metrics_port.is_none());
}

#[test]
fn test_config_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, include_str!("../../config.toml.example")).unwrap();

    let config = Config::load(&path).unwrap();
    assert!(!config.assets.is_empty());
    assert!(Config::load(dir.path().join("missing.toml")).is_err());
}

#[test]
fn test_slug_agrees_with_market_hour() {
    let slug = slug::encode("bitcoin-up-or-down", at(11, 42, 10));
    assert_eq!(slug, BTC_7AM);
    assert_eq!(slug::decode_in_year(&slug, 2024), Some(at(11, 0, 0)));
}

#[tokio::test]
async fn test_market_lifecycle_to_parquet() {
    let repo = Arc::new(SqliteRepository::in_memory().await.unwrap());
    let source = Arc::new(ScriptedSource::default());
    let store: Arc<dyn MarketRepository> = repo.clone();
    let venue: Arc<dyn MarketDataSource> = source.clone();
    let config = config();

    let discovery = DiscoveryEngine::new(store.clone(), venue.clone(), &config);
    let collector = SnapshotCollector::new(store.clone(), venue.clone(), &config);
    let resolution = ResolutionEngine::new(store, venue, &config);

    source.list(hourly(BTC_7AM, "0xbtc7", at(11, 0, 0)));
    source.list(hourly(ETH_7AM, "0xeth7", at(11, 0, 0)));
    source.quote("0xbtc7-up", dec!(0.62));
    source.quote("0xbtc7-down", dec!(0.38));
    source.quote("0xeth7-up", dec!(0.41));
    source.quote("0xeth7-down", dec!(0.59));
    source.set_book(vec![dec!(0.60)], vec![dec!(0.63)]);
    source.set_midpoint(Some(dec!(0.615)));

    // Discovered ahead of its hour
    assert_eq!(discovery.discover_new_markets_at(at(10, 58, 0)).await.len(), 2);
    let btc = repo.get_market_by_slug(BTC_7AM).await.unwrap().unwrap();
    assert_eq!(classify(&btc, at(10, 58, 0)), MarketPhase::Discovered);
    assert_eq!(collector.collect_active_at(at(10, 59, 0)).await, 0);

    // Minute-by-minute through the hour, then the closing window
    for minute in [0, 15, 30, 45] {
        assert_eq!(collector.collect_active_at(at(11, minute, 5)).await, 2);
    }
    assert_eq!(collector.collect_closing_soon_at(at(11, 55, 0), 10).await, 2);
    assert_eq!(classify(&btc, at(11, 55, 0)), MarketPhase::Active);

    // The next hour's market appears once it is listed
    source.list(hourly(BTC_8AM, "0xbtc8", at(12, 0, 0)));
    assert_eq!(discovery.discover_new_markets_at(at(11, 56, 0)).await.len(), 1);

    // Hour over: awaiting close until the venue settles
    assert_eq!(classify(&btc, at(12, 2, 0)), MarketPhase::AwaitingClose);
    assert_eq!(resolution.check_resolutions_at(at(12, 2, 0)).await, 0);

    source.settle(BTC_7AM, r#"["1", "0"]"#);
    source.settle(ETH_7AM, r#"["0", "1"]"#);
    assert_eq!(resolution.check_resolutions_at(at(12, 6, 0)).await, 2);

    let btc = repo.get_market_by_slug(BTC_7AM).await.unwrap().unwrap();
    let eth = repo.get_market_by_slug(ETH_7AM).await.unwrap().unwrap();
    assert_eq!(classify(&btc, at(12, 6, 0)), MarketPhase::Resolved(Outcome::Up));
    assert_eq!(eth.outcome, Some(Outcome::Down));
    assert!(repo
        .get_pending_resolution_markets(at(12, 30, 0))
        .await
        .unwrap()
        .is_empty());

    // Export everything and read it back
    let snapshots = repo.get_snapshots_since(None).await.unwrap();
    assert_eq!(snapshots.len(), 10);

    let dir = tempfile::tempdir().unwrap();
    let exporter = SnapshotExporter::new(dir.path().join("exports"));
    let path = exporter
        .export(&snapshots, at(12, 30, 0))
        .unwrap()
        .expect("file written");
    assert!(path.ends_with("snapshots_20240310_123000.parquet"));

    let restored = read_snapshots(&path).unwrap();
    assert_eq!(restored.len(), snapshots.len());
    for snapshot in &restored {
        assert!(snapshots.contains(snapshot));
    }

    let btc_rows: Vec<_> = restored.iter().filter(|s| s.market_id == btc.id).collect();
    assert_eq!(btc_rows.len(), 5);
    assert!(btc_rows.iter().all(|s| s.up_price == dec!(0.62)));
    assert!(btc_rows.iter().all(|s| s.spread == Some(dec!(0.03))));
    let minutes: Vec<_> = btc_rows.iter().map(|s| s.minute_of_hour).collect();
    assert!(minutes.contains(&45) && minutes.contains(&55));

    // Since filter narrows the export
    let late = repo.get_snapshots_since(Some(at(11, 50, 0))).await.unwrap();
    assert_eq!(late.len(), 2);
}

#[tokio::test]
async fn test_export_with_nothing_to_write() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = SnapshotExporter::new(dir.path());
    assert!(exporter.export(&[], at(12, 0, 0)).unwrap().is_none());
}
