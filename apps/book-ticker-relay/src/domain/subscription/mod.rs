//! Subscription Bookkeeping
//!
//! Domain types for tracking which consumers follow which instruments and
//! which instruments are currently eligible at all.
//!
//! # Design
//!
//! The book tracks three structures that must always agree:
//! - The eligible universe (instruments a consumer may subscribe to)
//! - Instrument → consumers (who receives each instrument's tickers)
//! - Consumer → instruments (what each consumer currently holds)
//!
//! Transitions report whether an instrument gained its first subscriber or
//! lost its last one, which is exactly when the caller must start or stop the
//! upstream feed. An instrument key exists only while it has at least one
//! subscriber, and only for instruments inside the universe.

use std::collections::{HashMap, HashSet};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a consumer (downstream WebSocket client).
pub type ConsumerId = u64;

/// An exchange instrument symbol (e.g., "BTCUSDT"). Compared exactly.
pub type Instrument = String;

/// Result of adding a consumer to an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The instrument had no subscribers before; a feed must be started.
    FirstSubscriber,
    /// The instrument already had other subscribers.
    Joined,
    /// The consumer was already subscribed; nothing changed.
    AlreadySubscribed,
}

/// Result of removing a consumer from an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The consumer was the last subscriber; the feed must be stopped.
    LastSubscriber,
    /// Other subscribers remain.
    Left,
    /// The consumer was not subscribed; nothing changed.
    NotSubscribed,
}

impl LeaveOutcome {
    /// Whether the consumer was subscribed before the call.
    #[must_use]
    pub const fn was_subscribed(self) -> bool {
        !matches!(self, Self::NotSubscribed)
    }
}

/// Subscribe attempt for an instrument outside the eligible universe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("instrument {0} is not in the eligible universe")]
pub struct NotEligible(pub Instrument);

// =============================================================================
// Subscription Book
// =============================================================================

/// Universe and subscriber bookkeeping.
///
/// Not thread-safe on its own; the hub keeps it behind a single lock together
/// with the feed cancellation tokens.
///
/// # Example
///
/// ```rust
/// use book_ticker_relay::domain::subscription::{JoinOutcome, LeaveOutcome, SubscriptionBook};
///
/// let mut book = SubscriptionBook::new();
/// book.admit("BTCUSDT");
///
/// // Consumer 1 subscribes - upstream feed must start
/// assert_eq!(book.join(1, "BTCUSDT"), Ok(JoinOutcome::FirstSubscriber));
///
/// // Consumer 2 piggybacks on the same feed
/// assert_eq!(book.join(2, "BTCUSDT"), Ok(JoinOutcome::Joined));
///
/// // Consumer 1 leaves - feed keeps running for consumer 2
/// assert_eq!(book.leave(1, "BTCUSDT"), LeaveOutcome::Left);
///
/// // Consumer 2 leaves - feed must stop
/// assert_eq!(book.leave(2, "BTCUSDT"), LeaveOutcome::LastSubscriber);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionBook {
    universe: HashSet<Instrument>,
    instrument_consumers: HashMap<Instrument, HashSet<ConsumerId>>,
    consumer_instruments: HashMap<ConsumerId, HashSet<Instrument>>,
}

impl SubscriptionBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Universe
    // =========================================================================

    /// Add an instrument to the eligible universe.
    ///
    /// Returns `true` if it was not eligible before.
    pub fn admit(&mut self, instrument: &str) -> bool {
        self.universe.insert(instrument.to_string())
    }

    /// Remove an instrument from the eligible universe.
    ///
    /// Any subscribers still attached are evicted and returned so the caller
    /// can notify them and stop the feed.
    pub fn retire(&mut self, instrument: &str) -> Vec<ConsumerId> {
        let evicted = self.evict(instrument);
        self.universe.remove(instrument);
        evicted
    }

    /// Check whether an instrument may be subscribed to.
    #[must_use]
    pub fn is_eligible(&self, instrument: &str) -> bool {
        self.universe.contains(instrument)
    }

    /// Snapshot of the eligible universe.
    #[must_use]
    pub fn universe(&self) -> HashSet<Instrument> {
        self.universe.clone()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe a consumer to an instrument.
    ///
    /// # Errors
    ///
    /// Returns [`NotEligible`] if the instrument is outside the universe; the
    /// book is left unchanged.
    pub fn join(
        &mut self,
        consumer: ConsumerId,
        instrument: &str,
    ) -> Result<JoinOutcome, NotEligible> {
        if !self.universe.contains(instrument) {
            return Err(NotEligible(instrument.to_string()));
        }

        let consumers = self
            .instrument_consumers
            .entry(instrument.to_string())
            .or_default();

        if !consumers.insert(consumer) {
            return Ok(JoinOutcome::AlreadySubscribed);
        }

        let first = consumers.len() == 1;

        self.consumer_instruments
            .entry(consumer)
            .or_default()
            .insert(instrument.to_string());

        Ok(if first {
            JoinOutcome::FirstSubscriber
        } else {
            JoinOutcome::Joined
        })
    }

    /// Unsubscribe a consumer from an instrument.
    pub fn leave(&mut self, consumer: ConsumerId, instrument: &str) -> LeaveOutcome {
        let Some(consumers) = self.instrument_consumers.get_mut(instrument) else {
            return LeaveOutcome::NotSubscribed;
        };

        if !consumers.remove(&consumer) {
            return LeaveOutcome::NotSubscribed;
        }

        let last = consumers.is_empty();
        if last {
            self.instrument_consumers.remove(instrument);
        }

        self.forget_membership(consumer, instrument);

        if last {
            LeaveOutcome::LastSubscriber
        } else {
            LeaveOutcome::Left
        }
    }

    /// Remove every subscriber of an instrument.
    ///
    /// Returns the removed consumers; empty if the instrument had none.
    pub fn evict(&mut self, instrument: &str) -> Vec<ConsumerId> {
        let Some(consumers) = self.instrument_consumers.remove(instrument) else {
            return vec![];
        };

        for consumer in &consumers {
            self.forget_membership(*consumer, instrument);
        }

        consumers.into_iter().collect()
    }

    /// Check whether a consumer holds an instrument.
    #[must_use]
    pub fn is_subscribed(&self, consumer: ConsumerId, instrument: &str) -> bool {
        self.consumer_instruments
            .get(&consumer)
            .is_some_and(|set| set.contains(instrument))
    }

    /// Instruments held by a consumer.
    #[must_use]
    pub fn instruments_of(&self, consumer: ConsumerId) -> Vec<Instrument> {
        self.consumer_instruments
            .get(&consumer)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Consumers subscribed to an instrument.
    #[must_use]
    pub fn subscribers(&self, instrument: &str) -> Vec<ConsumerId> {
        self.instrument_consumers
            .get(instrument)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether a consumer still holds any subscription.
    #[must_use]
    pub fn has_subscriptions(&self, consumer: ConsumerId) -> bool {
        self.consumer_instruments.contains_key(&consumer)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            universe_size: self.universe.len(),
            instrument_count: self.instrument_consumers.len(),
            consumer_count: self.consumer_instruments.len(),
        }
    }

    fn forget_membership(&mut self, consumer: ConsumerId, instrument: &str) {
        if let Some(set) = self.consumer_instruments.get_mut(&consumer) {
            set.remove(instrument);
            if set.is_empty() {
                self.consumer_instruments.remove(&consumer);
            }
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Subscription statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Number of eligible instruments.
    pub universe_size: usize,
    /// Number of instruments with at least one subscriber.
    pub instrument_count: usize,
    /// Number of consumers holding at least one subscription.
    pub consumer_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
