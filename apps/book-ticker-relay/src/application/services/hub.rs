//! Subscription Hub
//!
//! Process-wide registry of who receives which instrument, and owner of the
//! lazy upstream feed lifecycle.
//!
//! # Locking
//!
//! One `parking_lot::Mutex` guards the subscription book, the universe
//! signals, the feed tokens and the client handles. Critical sections never
//! await: spawning a feed and enqueueing a frame are both non-blocking, so
//! both happen under the lock. Notices that follow a removal are sent after
//! the lock is released.
//!
//! # Cancellation
//!
//! ```text
//! shutdown ──► universe signal (per eligible instrument) ──► feed token
//! ```
//!
//! A feed token exists only while its instrument has subscribers. Cancelling
//! is idempotent and a no-op when nothing listens.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedSpawner, TickerSink};
use crate::domain::protocol::{ForcedReason, Notice, ServerMessage};
use crate::domain::streaming::BookTicker;
use crate::domain::subscription::{
    ConsumerId, Instrument, JoinOutcome, LeaveOutcome, SubscriptionBook,
};
use crate::infrastructure::metrics::{self, DropReason};

// =============================================================================
// Client Handle
// =============================================================================

/// Outbound side of one downstream client.
///
/// Frames are queued on a bounded channel drained by the client's single
/// writer task; enqueueing never waits.
#[derive(Debug)]
pub struct ClientHandle {
    id: ConsumerId,
    outbound: mpsc::Sender<ServerMessage>,
}

impl ClientHandle {
    /// Create a handle with an explicit id.
    #[must_use]
    pub const fn new(id: ConsumerId, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, outbound }
    }

    /// Create a handle with a random id.
    #[must_use]
    pub fn with_random_id(outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self::new(uuid::Uuid::new_v4().as_u64_pair().0, outbound)
    }

    /// Client identifier.
    #[must_use]
    pub const fn id(&self) -> ConsumerId {
        self.id
    }

    /// Queue a frame for the client.
    ///
    /// Returns `false` if the queue is full or closed; the frame is dropped.
    pub fn deliver(&self, message: ServerMessage) -> bool {
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(client_id = self.id, "Client queue full, dropping frame");
                metrics::record_messages_dropped(DropReason::QueueFull, 1);
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(client_id = self.id, "Client queue closed, dropping frame");
                metrics::record_messages_dropped(DropReason::QueueClosed, 1);
                false
            }
        }
    }

    /// Queue a plain-text notice for the client.
    pub fn notify(&self, notice: Notice) -> bool {
        metrics::record_notice(notice.kind());
        self.deliver(ServerMessage::Notice(notice))
    }
}

// =============================================================================
// Hub State
// =============================================================================

#[derive(Default)]
struct HubState {
    book: SubscriptionBook,
    universe_signals: HashMap<Instrument, CancellationToken>,
    feeds: HashMap<Instrument, CancellationToken>,
    clients: HashMap<ConsumerId, Arc<ClientHandle>>,
}

impl HubState {
    fn stop_feed(&mut self, instrument: &str) {
        if let Some(token) = self.feeds.remove(instrument) {
            token.cancel();
            tracing::info!(instrument, "Upstream feed stopped");
            #[allow(clippy::cast_precision_loss)]
            metrics::set_live_feeds(self.feeds.len() as f64);
        }
    }

    fn release_client_if_idle(&mut self, client: ConsumerId) -> Option<Arc<ClientHandle>> {
        if self.book.has_subscriptions(client) {
            self.clients.get(&client).cloned()
        } else {
            self.clients.remove(&client)
        }
    }

    fn deliver_to_subscribers(&self, instrument: &str, json: &Arc<str>) -> usize {
        self.book
            .subscribers(instrument)
            .into_iter()
            .filter_map(|id| self.clients.get(&id))
            .filter(|client| client.deliver(ServerMessage::Ticker(Arc::clone(json))))
            .count()
    }
}

// =============================================================================
// Subscription Hub
// =============================================================================

/// Hub statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Instruments in the eligible universe.
    pub universe_size: usize,
    /// Instruments with at least one subscriber.
    pub subscribed_instruments: usize,
    /// Live upstream feeds.
    pub live_feeds: usize,
    /// Clients holding at least one subscription.
    pub subscribed_clients: usize,
}

/// Registry of subscriptions and owner of upstream feed lifecycles.
pub struct SubscriptionHub {
    state: Mutex<HubState>,
    spawner: Arc<dyn FeedSpawner>,
    shutdown: CancellationToken,
}

impl SubscriptionHub {
    /// Create a hub with an empty universe.
    ///
    /// Every feed token is a descendant of `shutdown`.
    #[must_use]
    pub fn new(spawner: Arc<dyn FeedSpawner>, shutdown: CancellationToken) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            spawner,
            shutdown,
        }
    }

    // =========================================================================
    // Client Operations
    // =========================================================================

    /// Subscribe a client to an instrument.
    ///
    /// Returns `false` if the instrument is not eligible; the caller is
    /// responsible for the rejection notice. Starts the upstream feed when the
    /// client is the instrument's first subscriber. Idempotent.
    pub fn subscribe(self: &Arc<Self>, client: &Arc<ClientHandle>, instrument: &str) -> bool {
        let mut state = self.state.lock();

        let Ok(outcome) = state.book.join(client.id(), instrument) else {
            return false;
        };

        state
            .clients
            .entry(client.id())
            .or_insert_with(|| Arc::clone(client));

        if outcome == JoinOutcome::FirstSubscriber {
            let token = state
                .universe_signals
                .get(instrument)
                .map_or_else(|| self.shutdown.child_token(), CancellationToken::child_token);
            state.feeds.insert(instrument.to_string(), token.clone());

            tracing::info!(instrument, client_id = client.id(), "Starting upstream feed");
            let sink: Arc<dyn TickerSink> = Arc::clone(self) as Arc<dyn TickerSink>;
            self.spawner.spawn(instrument.to_string(), token, sink);

            #[allow(clippy::cast_precision_loss)]
            metrics::set_live_feeds(state.feeds.len() as f64);
        }

        true
    }

    /// Unsubscribe a client from an instrument.
    ///
    /// Stops the feed if the client was the last subscriber. When `forced`,
    /// the client is told it lost the instrument, but only if it actually held
    /// it. Idempotent.
    pub fn unsubscribe(&self, client: &ClientHandle, instrument: &str, forced: bool) {
        let outcome = {
            let mut state = self.state.lock();
            let outcome = state.book.leave(client.id(), instrument);
            if outcome == LeaveOutcome::LastSubscriber {
                state.stop_feed(instrument);
            }
            if outcome.was_subscribed() {
                state.release_client_if_idle(client.id());
            }
            outcome
        };

        if forced && outcome.was_subscribed() {
            client.notify(Notice::ForcedUnsubscribe {
                instrument: instrument.to_string(),
                reason: ForcedReason::EvictedFromUniverse,
            });
        }
    }

    /// Drop every subscription a client holds (disconnect cleanup).
    ///
    /// Returns the number of instruments released.
    pub fn remove_client(&self, client: ConsumerId) -> usize {
        let mut state = self.state.lock();
        let instruments = state.book.instruments_of(client);

        for instrument in &instruments {
            if state.book.leave(client, instrument) == LeaveOutcome::LastSubscriber {
                state.stop_feed(instrument);
            }
        }
        state.clients.remove(&client);

        instruments.len()
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    /// Send a ticker to every current subscriber of `instrument`.
    ///
    /// The ticker is serialized once. A full or closed client queue is logged
    /// and skipped. Returns the number of clients the frame was queued for.
    pub fn broadcast(&self, instrument: &str, ticker: &BookTicker) -> usize {
        let Some(json) = Self::encode(instrument, ticker) else {
            return 0;
        };

        let delivered = self.state.lock().deliver_to_subscribers(instrument, &json);
        metrics::record_messages_sent(delivered as u64);
        delivered
    }

    /// Feed-facing broadcast, refused once `feed` is cancelled.
    ///
    /// Cancellation is checked under the same lock that cancels feed tokens,
    /// so a stopped feed can never reach a subscriber.
    pub fn publish(&self, instrument: &str, ticker: &BookTicker, feed: &CancellationToken) -> bool {
        let Some(json) = Self::encode(instrument, ticker) else {
            return !feed.is_cancelled();
        };

        let delivered = {
            let state = self.state.lock();
            if feed.is_cancelled() {
                return false;
            }
            state.deliver_to_subscribers(instrument, &json)
        };

        metrics::record_messages_sent(delivered as u64);
        true
    }

    fn encode(instrument: &str, ticker: &BookTicker) -> Option<Arc<str>> {
        match ticker.to_json() {
            Ok(json) => Some(Arc::from(json)),
            Err(e) => {
                tracing::warn!(instrument, error = %e, "Failed to serialize ticker");
                None
            }
        }
    }

    // =========================================================================
    // Universe Maintenance
    // =========================================================================

    /// Add an instrument to the eligible universe.
    ///
    /// Returns `true` if it was newly admitted. No feed is started.
    pub fn admit_instrument(&self, instrument: &str) -> bool {
        let mut state = self.state.lock();
        if !state.book.admit(instrument) {
            return false;
        }

        state
            .universe_signals
            .insert(instrument.to_string(), self.shutdown.child_token());

        #[allow(clippy::cast_precision_loss)]
        metrics::set_universe_size(state.universe_signals.len() as f64);
        true
    }

    /// Remove every subscriber of an instrument and stop its feed.
    ///
    /// Each removed client receives exactly one forced-unsubscribe notice.
    /// Returns the number of clients removed; zero if none (idempotent).
    pub fn force_close_instrument(&self, instrument: &str) -> usize {
        self.force_close(instrument, ForcedReason::EvictedFromUniverse, None)
    }

    /// Remove an instrument from the eligible universe.
    ///
    /// Fires the instrument's universe signal (stopping any feed) and evicts
    /// subscribers that joined after the last force close. Returns `true` if
    /// the instrument was eligible.
    pub fn remove_from_universe(&self, instrument: &str) -> bool {
        let (present, stragglers) = {
            let mut state = self.state.lock();
            let evicted = state.book.retire(instrument);
            state.stop_feed(instrument);

            let stragglers: Vec<_> = evicted
                .into_iter()
                .filter_map(|id| state.release_client_if_idle(id))
                .collect();

            let present = state.universe_signals.remove(instrument).is_some_and(|signal| {
                signal.cancel();
                true
            });

            #[allow(clippy::cast_precision_loss)]
            metrics::set_universe_size(state.universe_signals.len() as f64);
            (present, stragglers)
        };

        Self::notify_forced(instrument, ForcedReason::EvictedFromUniverse, &stragglers);
        present
    }

    /// Snapshot of the eligible universe.
    #[must_use]
    pub fn universe(&self) -> HashSet<Instrument> {
        self.state.lock().book.universe()
    }

    fn force_close(
        &self,
        instrument: &str,
        reason: ForcedReason,
        feed: Option<&CancellationToken>,
    ) -> usize {
        let evicted: Vec<_> = {
            let mut state = self.state.lock();
            if feed.is_some_and(CancellationToken::is_cancelled) {
                return 0;
            }

            let ids = state.book.evict(instrument);
            state.stop_feed(instrument);

            ids.into_iter()
                .filter_map(|id| state.release_client_if_idle(id))
                .collect()
        };

        if !evicted.is_empty() {
            tracing::info!(
                instrument,
                clients = evicted.len(),
                ?reason,
                "Force-closed instrument"
            );
        }

        Self::notify_forced(instrument, reason, &evicted);
        evicted.len()
    }

    fn notify_forced(instrument: &str, reason: ForcedReason, clients: &[Arc<ClientHandle>]) {
        for client in clients {
            client.notify(Notice::ForcedUnsubscribe {
                instrument: instrument.to_string(),
                reason,
            });
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether a client holds an instrument.
    #[must_use]
    pub fn is_subscribed(&self, client: ConsumerId, instrument: &str) -> bool {
        self.state.lock().book.is_subscribed(client, instrument)
    }

    /// Instruments a client holds.
    #[must_use]
    pub fn subscriptions_of(&self, client: ConsumerId) -> Vec<Instrument> {
        self.state.lock().book.instruments_of(client)
    }

    /// Whether a feed token is currently held for an instrument.
    #[must_use]
    pub fn has_feed(&self, instrument: &str) -> bool {
        self.state.lock().feeds.contains_key(instrument)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let state = self.state.lock();
        let book = state.book.stats();
        HubStats {
            universe_size: book.universe_size,
            subscribed_instruments: book.instrument_count,
            live_feeds: state.feeds.len(),
            subscribed_clients: book.consumer_count,
        }
    }
}

impl TickerSink for SubscriptionHub {
    fn publish(&self, instrument: &str, ticker: &BookTicker, cancel: &CancellationToken) -> bool {
        Self::publish(self, instrument, ticker, cancel)
    }

    fn feed_terminated(&self, instrument: &str, cancel: &CancellationToken) {
        tracing::warn!(instrument, "Upstream feed gave up, releasing subscribers");
        self.force_close(instrument, ForcedReason::FeedUnavailable, Some(cancel));
    }
}

impl std::fmt::Debug for SubscriptionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHub")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;

    #[derive(Default)]
    struct RecordingSpawner {
        spawned: Mutex<Vec<(Instrument, CancellationToken)>>,
    }

    impl RecordingSpawner {
        fn count(&self) -> usize {
            self.spawned.lock().len()
        }

        fn token(&self, index: usize) -> CancellationToken {
            self.spawned.lock()[index].1.clone()
        }
    }

    impl FeedSpawner for RecordingSpawner {
        fn spawn(&self, instrument: Instrument, cancel: CancellationToken, _sink: Arc<dyn TickerSink>) {
            self.spawned.lock().push((instrument, cancel));
        }
    }

    fn hub_with(instruments: &[&str]) -> (Arc<SubscriptionHub>, Arc<RecordingSpawner>) {
        let spawner = Arc::new(RecordingSpawner::default());
        let hub = Arc::new(SubscriptionHub::new(
            Arc::clone(&spawner) as Arc<dyn FeedSpawner>,
            CancellationToken::new(),
        ));
        for instrument in instruments {
            hub.admit_instrument(instrument);
        }
        (hub, spawner)
    }

    fn client(id: ConsumerId) -> (Arc<ClientHandle>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(ClientHandle::new(id, tx)), rx)
    }

    fn ticker(symbol: &str, bid: &str) -> BookTicker {
        BookTicker::new(
            symbol,
            Decimal::from_str(bid).unwrap(),
            Decimal::from_str("100.5").unwrap(),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = vec![];
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[test]
    fn subscribe_ineligible_is_rejected() {
        let (hub, spawner) = hub_with(&["BTCUSDT"]);
        let (c, _rx) = client(1);

        assert!(!hub.subscribe(&c, "XRPUSDT"));
        assert_eq!(spawner.count(), 0);
        assert_eq!(hub.stats().subscribed_instruments, 0);
    }

    #[test]
    fn first_subscriber_starts_exactly_one_feed() {
        let (hub, spawner) = hub_with(&["BTCUSDT"]);
        let (c1, _rx1) = client(1);
        let (c2, _rx2) = client(2);

        assert!(hub.subscribe(&c1, "BTCUSDT"));
        assert!(hub.subscribe(&c1, "BTCUSDT"));
        assert!(hub.subscribe(&c2, "BTCUSDT"));

        assert_eq!(spawner.count(), 1);
        assert!(hub.has_feed("BTCUSDT"));
    }

    #[test]
    fn last_unsubscribe_cancels_feed() {
        let (hub, spawner) = hub_with(&["BTCUSDT"]);
        let (c1, _rx1) = client(1);
        let (c2, _rx2) = client(2);
        hub.subscribe(&c1, "BTCUSDT");
        hub.subscribe(&c2, "BTCUSDT");
        let token = spawner.token(0);

        hub.unsubscribe(&c1, "BTCUSDT", false);
        assert!(!token.is_cancelled());

        hub.unsubscribe(&c2, "BTCUSDT", false);
        assert!(token.is_cancelled());
        assert!(!hub.has_feed("BTCUSDT"));
    }

    #[test]
    fn resubscribe_after_stop_starts_fresh_feed() {
        let (hub, spawner) = hub_with(&["BTCUSDT"]);
        let (c, _rx) = client(1);

        hub.subscribe(&c, "BTCUSDT");
        hub.unsubscribe(&c, "BTCUSDT", false);
        hub.subscribe(&c, "BTCUSDT");

        assert_eq!(spawner.count(), 2);
        assert!(spawner.token(0).is_cancelled());
        assert!(!spawner.token(1).is_cancelled());
    }

    #[test]
    fn forced_unsubscribe_notifies_only_holders() {
        let (hub, _spawner) = hub_with(&["BTCUSDT"]);
        let (holder, mut holder_rx) = client(1);
        let (other, mut other_rx) = client(2);
        hub.subscribe(&holder, "BTCUSDT");

        hub.unsubscribe(&holder, "BTCUSDT", true);
        hub.unsubscribe(&other, "BTCUSDT", true);

        assert_eq!(
            drain(&mut holder_rx),
            vec![ServerMessage::Notice(Notice::ForcedUnsubscribe {
                instrument: "BTCUSDT".into(),
                reason: ForcedReason::EvictedFromUniverse,
            })]
        );
        assert!(drain(&mut other_rx).is_empty());
    }

    #[test]
    fn broadcast_reaches_subscribers_only() {
        let (hub, _spawner) = hub_with(&["BTCUSDT", "ETHUSDT"]);
        let (c1, mut rx1) = client(1);
        let (c2, mut rx2) = client(2);
        hub.subscribe(&c1, "BTCUSDT");
        hub.subscribe(&c2, "ETHUSDT");

        let delivered = hub.broadcast("BTCUSDT", &ticker("BTCUSDT", "100.1"));

        assert_eq!(delivered, 1);
        assert_eq!(
            drain(&mut rx1),
            vec![ServerMessage::Ticker(Arc::from(
                r#"{"s":"BTCUSDT","b":"100.1","a":"100.5"}"#
            ))]
        );
        assert!(drain(&mut rx2).is_empty());
    }

    #[test]
    fn full_queue_does_not_block_other_clients() {
        let (hub, _spawner) = hub_with(&["BTCUSDT"]);
        let (tx, _slow_rx) = mpsc::channel(1);
        let slow = Arc::new(ClientHandle::new(1, tx));
        let (fast, mut fast_rx) = client(2);
        hub.subscribe(&slow, "BTCUSDT");
        hub.subscribe(&fast, "BTCUSDT");

        hub.broadcast("BTCUSDT", &ticker("BTCUSDT", "1"));
        hub.broadcast("BTCUSDT", &ticker("BTCUSDT", "2"));

        assert_eq!(drain(&mut fast_rx).len(), 2);
        // Slow client keeps its subscription
        assert!(hub.is_subscribed(1, "BTCUSDT"));
    }

    #[test]
    fn publish_after_cancel_is_refused() {
        let (hub, spawner) = hub_with(&["BTCUSDT"]);
        let (c, mut rx) = client(1);
        hub.subscribe(&c, "BTCUSDT");
        let token = spawner.token(0);

        assert!(hub.publish("BTCUSDT", &ticker("BTCUSDT", "1"), &token));
        hub.unsubscribe(&c, "BTCUSDT", false);
        hub.subscribe(&c, "BTCUSDT");

        // Old feed is refused even though the instrument has a subscriber again
        assert!(!hub.publish("BTCUSDT", &ticker("BTCUSDT", "2"), &token));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn force_close_notifies_each_subscriber_once() {
        let (hub, spawner) = hub_with(&["ETHUSDT"]);
        let (c1, mut rx1) = client(1);
        let (c2, mut rx2) = client(2);
        hub.subscribe(&c1, "ETHUSDT");
        hub.subscribe(&c2, "ETHUSDT");

        assert_eq!(hub.force_close_instrument("ETHUSDT"), 2);
        assert_eq!(hub.force_close_instrument("ETHUSDT"), 0);

        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
        assert!(spawner.token(0).is_cancelled());
        assert_eq!(hub.stats().subscribed_clients, 0);
    }

    #[test]
    fn remove_from_universe_cancels_and_blocks_subscribe() {
        let (hub, spawner) = hub_with(&["ETHUSDT"]);
        let (c, mut rx) = client(1);
        hub.subscribe(&c, "ETHUSDT");

        assert!(hub.remove_from_universe("ETHUSDT"));
        assert!(!hub.remove_from_universe("ETHUSDT"));

        assert!(spawner.token(0).is_cancelled());
        assert!(!hub.subscribe(&c, "ETHUSDT"));
        assert!(!hub.universe().contains("ETHUSDT"));
        // Straggler evicted by removal still hears about it
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn remove_client_cascades_feed_shutdown() {
        let (hub, spawner) = hub_with(&["BTCUSDT", "ETHUSDT"]);
        let (c1, _rx1) = client(1);
        let (c2, _rx2) = client(2);
        hub.subscribe(&c1, "BTCUSDT");
        hub.subscribe(&c1, "ETHUSDT");
        hub.subscribe(&c2, "ETHUSDT");

        assert_eq!(hub.remove_client(1), 2);

        assert!(spawner.token(0).is_cancelled());
        assert!(!spawner.token(1).is_cancelled());
        assert_eq!(hub.subscriptions_of(1), Vec::<Instrument>::new());
    }

    #[test]
    fn feed_terminated_releases_subscribers_with_reason() {
        let (hub, spawner) = hub_with(&["BTCUSDT"]);
        let (c, mut rx) = client(1);
        hub.subscribe(&c, "BTCUSDT");
        let token = spawner.token(0);

        TickerSink::feed_terminated(hub.as_ref(), "BTCUSDT", &token);

        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::Notice(Notice::ForcedUnsubscribe {
                instrument: "BTCUSDT".into(),
                reason: ForcedReason::FeedUnavailable,
            })]
        );
        assert!(!hub.is_subscribed(1, "BTCUSDT"));
        assert!(token.is_cancelled());
    }

    #[test]
    fn stale_feed_termination_is_ignored() {
        let (hub, spawner) = hub_with(&["BTCUSDT"]);
        let (c, mut rx) = client(1);
        hub.subscribe(&c, "BTCUSDT");
        let stale = spawner.token(0);
        hub.unsubscribe(&c, "BTCUSDT", false);
        hub.subscribe(&c, "BTCUSDT");

        TickerSink::feed_terminated(hub.as_ref(), "BTCUSDT", &stale);

        assert!(hub.is_subscribed(1, "BTCUSDT"));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn shutdown_cancels_every_feed() {
        let spawner = Arc::new(RecordingSpawner::default());
        let shutdown = CancellationToken::new();
        let hub = Arc::new(SubscriptionHub::new(
            Arc::clone(&spawner) as Arc<dyn FeedSpawner>,
            shutdown.clone(),
        ));
        hub.admit_instrument("BTCUSDT");
        let (c, _rx) = client(1);
        hub.subscribe(&c, "BTCUSDT");

        shutdown.cancel();

        assert!(spawner.token(0).is_cancelled());
    }

    #[test]
    fn stats_track_feeds_and_clients() {
        let (hub, _spawner) = hub_with(&["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
        let (c1, _rx1) = client(1);
        let (c2, _rx2) = client(2);
        hub.subscribe(&c1, "BTCUSDT");
        hub.subscribe(&c2, "BTCUSDT");
        hub.subscribe(&c2, "ETHUSDT");

        assert_eq!(
            hub.stats(),
            HubStats {
                universe_size: 3,
                subscribed_instruments: 2,
                live_feeds: 2,
                subscribed_clients: 2,
            }
        );
    }
}
