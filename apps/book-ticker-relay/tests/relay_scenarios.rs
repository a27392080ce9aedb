//! Relay Scenario Integration Tests
//!
//! Drives the hub, sessions and refresher together with an in-memory feed
//! spawner, checking feed lifecycle and client-visible frames.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use book_ticker_relay::{
    BookTicker, ClientHandle, ClientSession, FeedSpawner, Instrument, ServerMessage,
    SubscriptionHub, TickerSink, UniverseError, UniverseRefresher, UniverseSource,
};

// =============================================================================
// Fixtures
// =============================================================================

struct SpawnedFeed {
    instrument: Instrument,
    cancel: CancellationToken,
    sink: Arc<dyn TickerSink>,
}

#[derive(Default)]
struct CountingSpawner {
    feeds: Mutex<Vec<SpawnedFeed>>,
}

impl CountingSpawner {
    fn spawn_count(&self, instrument: &str) -> usize {
        self.feeds
            .lock()
            .iter()
            .filter(|f| f.instrument == instrument)
            .count()
    }

    fn live(&self, instrument: &str) -> usize {
        self.feeds
            .lock()
            .iter()
            .filter(|f| f.instrument == instrument && !f.cancel.is_cancelled())
            .count()
    }

    fn live_total(&self) -> usize {
        self.feeds
            .lock()
            .iter()
            .filter(|f| !f.cancel.is_cancelled())
            .count()
    }

    /// Emit a ticker as the most recent feed for `instrument` would.
    fn emit(&self, instrument: &str, bid: &str) -> bool {
        let (sink, cancel) = {
            let feeds = self.feeds.lock();
            let feed = feeds
                .iter()
                .rev()
                .find(|f| f.instrument == instrument)
                .expect("no feed spawned");
            (Arc::clone(&feed.sink), feed.cancel.clone())
        };
        sink.publish(instrument, &ticker(instrument, bid), &cancel)
    }
}

impl FeedSpawner for CountingSpawner {
    fn spawn(&self, instrument: Instrument, cancel: CancellationToken, sink: Arc<dyn TickerSink>) {
        self.feeds.lock().push(SpawnedFeed {
            instrument,
            cancel,
            sink,
        });
    }
}

struct StaticSource {
    sets: Mutex<Vec<HashSet<Instrument>>>,
}

impl StaticSource {
    /// Serves `sets` in order, repeating the last one.
    fn new(sets: &[&[&str]]) -> Self {
        Self {
            sets: Mutex::new(
                sets.iter()
                    .rev()
                    .map(|s| s.iter().map(ToString::to_string).collect())
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl UniverseSource for StaticSource {
    async fn fetch_universe(&self) -> Result<HashSet<Instrument>, UniverseError> {
        let mut sets = self.sets.lock();
        if sets.len() > 1 {
            Ok(sets.pop().unwrap())
        } else {
            sets.last().cloned().ok_or(UniverseError::Empty)
        }
    }
}

struct TestClient {
    session: ClientSession,
    rx: mpsc::Receiver<ServerMessage>,
}

impl TestClient {
    fn connect(hub: &Arc<SubscriptionHub>, id: u64) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let handle = Arc::new(ClientHandle::new(id, tx));
        Self {
            session: ClientSession::new(Arc::clone(hub), handle),
            rx,
        }
    }

    fn send(&self, request: &str) {
        self.session.handle_frame(request.as_bytes());
    }

    fn frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            frames.push(message.into_text());
        }
        frames
    }
}

fn ticker(symbol: &str, bid: &str) -> BookTicker {
    BookTicker::new(
        symbol,
        Decimal::from_str(bid).unwrap(),
        Decimal::from_str("70000.5").unwrap(),
    )
}

fn setup(universe: &[&str]) -> (Arc<SubscriptionHub>, Arc<CountingSpawner>) {
    let spawner = Arc::new(CountingSpawner::default());
    let hub = Arc::new(SubscriptionHub::new(
        Arc::clone(&spawner) as Arc<dyn FeedSpawner>,
        CancellationToken::new(),
    ));
    for instrument in universe {
        hub.admit_instrument(instrument);
    }
    (hub, spawner)
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn first_subscriber_starts_feed_and_receives_tickers() {
    let (hub, spawner) = setup(&["BTCUSDT", "ETHUSDT"]);
    let mut client = TestClient::connect(&hub, 1);

    client.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);

    assert_eq!(spawner.live("BTCUSDT"), 1);
    assert_eq!(spawner.live("ETHUSDT"), 0);

    assert!(spawner.emit("BTCUSDT", "70000.1"));
    assert_eq!(
        client.frames(),
        vec![r#"{"s":"BTCUSDT","b":"70000.1","a":"70000.5"}"#.to_string()]
    );
}

#[tokio::test]
async fn shared_instrument_uses_one_feed_until_last_leaves() {
    let (hub, spawner) = setup(&["BTCUSDT"]);
    let mut alice = TestClient::connect(&hub, 1);
    let mut bob = TestClient::connect(&hub, 2);

    alice.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);
    bob.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);
    assert_eq!(spawner.spawn_count("BTCUSDT"), 1);

    spawner.emit("BTCUSDT", "70000.1");
    assert_eq!(alice.frames().len(), 1);
    assert_eq!(bob.frames().len(), 1);

    // Naming a held pair again toggles it off
    alice.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);
    assert_eq!(spawner.live("BTCUSDT"), 1);

    spawner.emit("BTCUSDT", "70000.2");
    assert!(alice.frames().is_empty());
    assert_eq!(bob.frames().len(), 1);

    bob.session.close();
    assert_eq!(spawner.live("BTCUSDT"), 0);
    assert!(!hub.has_feed("BTCUSDT"));
    assert!(!spawner.emit("BTCUSDT", "70000.3"));
}

#[tokio::test]
async fn ineligible_pair_is_rejected_without_a_feed() {
    let (hub, spawner) = setup(&["BTCUSDT"]);
    let mut client = TestClient::connect(&hub, 1);

    client.send(r#"{"method":"SUBSCRIBE","pairs":["DOGEUSDT","BTCUSDT"]}"#);

    assert_eq!(client.frames(), vec!["Invalid pair: DOGEUSDT".to_string()]);
    assert_eq!(spawner.spawn_count("DOGEUSDT"), 0);
    assert_eq!(hub.subscriptions_of(1), vec!["BTCUSDT".to_string()]);
}

#[tokio::test]
async fn malformed_request_gets_parse_error_and_session_continues() {
    let (hub, _spawner) = setup(&["BTCUSDT"]);
    let mut client = TestClient::connect(&hub, 1);

    client.send("{not json");
    client.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);

    let frames = client.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].starts_with("Error unmarshalling message: "));
    assert!(hub.is_subscribed(1, "BTCUSDT"));
}

#[tokio::test]
async fn refresh_evicts_subscribers_with_one_notice_each() {
    let (hub, spawner) = setup(&[]);
    let source = Arc::new(StaticSource::new(&[
        &["BTCUSDT", "ETHUSDT"],
        &["ETHUSDT", "SOLUSDT"],
    ]));
    let refresher = UniverseRefresher::new(
        Arc::clone(&hub),
        source as Arc<dyn UniverseSource>,
        Duration::from_secs(600),
    );

    refresher.refresh_once().await.unwrap();

    let mut alice = TestClient::connect(&hub, 1);
    let mut bob = TestClient::connect(&hub, 2);
    alice.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT","ETHUSDT"]}"#);
    bob.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);

    let change = refresher.refresh_once().await.unwrap();

    assert_eq!(change.removed, vec!["BTCUSDT".to_string()]);
    assert_eq!(change.admitted, vec!["SOLUSDT".to_string()]);
    assert_eq!(change.notified, 2);

    let notice = "Unsubscribed from BTCUSDT since pair is no longer in top set".to_string();
    assert_eq!(alice.frames(), vec![notice.clone()]);
    assert_eq!(bob.frames(), vec![notice]);

    assert_eq!(spawner.live("BTCUSDT"), 0);
    assert_eq!(spawner.live("ETHUSDT"), 1);
    assert_eq!(hub.subscriptions_of(1), vec!["ETHUSDT".to_string()]);

    bob.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);
    assert_eq!(bob.frames(), vec!["Invalid pair: BTCUSDT".to_string()]);
}

#[tokio::test]
async fn feed_giving_up_releases_subscribers() {
    let (hub, spawner) = setup(&["BTCUSDT"]);
    let mut client = TestClient::connect(&hub, 1);
    client.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);

    let (sink, cancel) = {
        let feeds = spawner.feeds.lock();
        (Arc::clone(&feeds[0].sink), feeds[0].cancel.clone())
    };
    sink.feed_terminated("BTCUSDT", &cancel);

    assert_eq!(
        client.frames(),
        vec!["Unsubscribed from BTCUSDT since upstream feed is unavailable".to_string()]
    );
    assert!(cancel.is_cancelled());
    assert!(hub.subscriptions_of(1).is_empty());

    // Instrument stays eligible; subscribing again starts a fresh feed
    client.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);
    assert_eq!(spawner.spawn_count("BTCUSDT"), 2);
    assert_eq!(spawner.live("BTCUSDT"), 1);
}

#[tokio::test]
async fn stale_feed_report_is_ignored() {
    let (hub, spawner) = setup(&["BTCUSDT"]);
    let mut client = TestClient::connect(&hub, 1);

    client.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);
    client.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);
    client.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);

    let (old_sink, old_cancel) = {
        let feeds = spawner.feeds.lock();
        (Arc::clone(&feeds[0].sink), feeds[0].cancel.clone())
    };
    assert!(old_cancel.is_cancelled());

    old_sink.feed_terminated("BTCUSDT", &old_cancel);

    assert!(client.frames().is_empty());
    assert!(hub.is_subscribed(1, "BTCUSDT"));
    assert_eq!(spawner.live("BTCUSDT"), 1);
}

#[tokio::test]
async fn shutdown_cancels_every_feed() {
    let spawner = Arc::new(CountingSpawner::default());
    let shutdown = CancellationToken::new();
    let hub = Arc::new(SubscriptionHub::new(
        Arc::clone(&spawner) as Arc<dyn FeedSpawner>,
        shutdown.clone(),
    ));
    hub.admit_instrument("BTCUSDT");
    hub.admit_instrument("ETHUSDT");

    let client = TestClient::connect(&hub, 1);
    client.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT","ETHUSDT"]}"#);
    assert_eq!(spawner.live_total(), 2);

    shutdown.cancel();

    assert_eq!(spawner.live_total(), 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribe_storm_keeps_one_feed_per_instrument() {
    let instruments = ["BTCUSDT", "ETHUSDT", "SOLUSDT"];
    let (hub, spawner) = setup(&instruments);

    let mut tasks = Vec::new();
    for id in 0..32_u64 {
        let hub = Arc::clone(&hub);
        let spawner = Arc::clone(&spawner);
        tasks.push(tokio::spawn(async move {
            let client = TestClient::connect(&hub, id);
            for round in 0..50_u64 {
                let pair = instruments[usize::try_from((id + round) % 3).unwrap()];
                client.send(&format!(r#"{{"method":"SUBSCRIBE","pairs":["{pair}"]}}"#));
                for instrument in instruments {
                    assert!(spawner.live(instrument) <= 1, "{instrument} has two live feeds");
                }
                tokio::task::yield_now().await;
            }
            client
        }));
    }

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }

    for instrument in instruments {
        let subscribed = clients
            .iter()
            .any(|c| hub.is_subscribed(c.session.client_id(), instrument));
        assert_eq!(spawner.live(instrument), usize::from(subscribed));
        assert_eq!(hub.has_feed(instrument), subscribed);
    }

    for client in &clients {
        client.session.close();
    }

    assert_eq!(spawner.live_total(), 0);
    assert_eq!(hub.stats().live_feeds, 0);
    assert_eq!(hub.stats().subscribed_clients, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn eviction_racing_subscribers_leaves_no_orphan_feeds() {
    let (hub, spawner) = setup(&["BTCUSDT"]);

    let subscribers: Vec<_> = (0..16_u64)
        .map(|id| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                let client = TestClient::connect(&hub, id);
                for _ in 0..20 {
                    client.send(r#"{"method":"SUBSCRIBE","pairs":["BTCUSDT"]}"#);
                    tokio::task::yield_now().await;
                }
                client
            })
        })
        .collect();

    let evictor = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            hub.force_close_instrument("BTCUSDT");
            hub.remove_from_universe("BTCUSDT");
        })
    };

    evictor.await.unwrap();
    let mut clients = Vec::new();
    for task in subscribers {
        clients.push(task.await.unwrap());
    }

    assert!(!hub.universe().contains("BTCUSDT"));
    assert_eq!(spawner.live("BTCUSDT"), 0);
    assert!(!hub.has_feed("BTCUSDT"));
    for client in &clients {
        assert!(!hub.is_subscribed(client.session.client_id(), "BTCUSDT"));
    }
}
