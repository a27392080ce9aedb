//! Universe Refresher
//!
//! Periodically recomputes the eligible universe and reconciles the hub
//! against it. The first refresh runs immediately at startup.
//!
//! A failed or empty fetch aborts the tick: nothing is admitted or removed and
//! the previous universe keeps serving.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{UniverseError, UniverseSource};
use crate::application::services::hub::SubscriptionHub;
use crate::domain::subscription::Instrument;
use crate::infrastructure::metrics::{self, RefreshOutcome};

// =============================================================================
// Types
// =============================================================================

/// A refresh tick that was aborted.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The universe source failed or returned nothing.
    #[error("universe source failed: {0}")]
    Source(#[from] UniverseError),
}

/// Changes applied by one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Newly eligible instruments, sorted.
    pub admitted: Vec<Instrument>,
    /// Instruments no longer eligible, sorted.
    pub removed: Vec<Instrument>,
    /// Forced-unsubscribe notices sent.
    pub notified: usize,
}

/// Outcome history of the refresher, shown by the health endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStatus {
    /// When the last tick started.
    pub last_attempt: Option<DateTime<Utc>>,
    /// When the last successful tick finished.
    pub last_success: Option<DateTime<Utc>>,
    /// Error of the last failed tick, cleared on success.
    pub last_error: Option<String>,
    /// Failed ticks since the last success.
    pub consecutive_failures: u32,
}

impl RefreshStatus {
    /// Whether the most recent tick failed.
    #[must_use]
    pub const fn last_refresh_failed(&self) -> bool {
        self.consecutive_failures > 0
    }
}

/// Shared refresh status.
pub type SharedRefreshStatus = Arc<RwLock<RefreshStatus>>;

// =============================================================================
// Refresher
// =============================================================================

/// Keeps the hub's eligible universe in line with the universe source.
pub struct UniverseRefresher {
    hub: Arc<SubscriptionHub>,
    source: Arc<dyn UniverseSource>,
    interval: Duration,
    status: SharedRefreshStatus,
}

impl UniverseRefresher {
    /// Create a refresher.
    #[must_use]
    pub fn new(
        hub: Arc<SubscriptionHub>,
        source: Arc<dyn UniverseSource>,
        interval: Duration,
    ) -> Self {
        Self {
            hub,
            source,
            interval,
            status: Arc::new(RwLock::new(RefreshStatus::default())),
        }
    }

    /// Handle to the refresh status.
    #[must_use]
    pub fn status(&self) -> SharedRefreshStatus {
        Arc::clone(&self.status)
    }

    /// Run until `cancel` fires, refreshing once immediately and then on
    /// every interval.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Universe refresher started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Universe refresher stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.refresh_once().await {
                        Ok(change) => {
                            tracing::info!(
                                admitted = change.admitted.len(),
                                removed = change.removed.len(),
                                notified = change.notified,
                                universe_size = self.hub.stats().universe_size,
                                "Universe refreshed"
                            );
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Universe refresh failed, keeping previous universe");
                        }
                    }
                }
            }
        }
    }

    /// Fetch the eligible set and reconcile the hub against it.
    ///
    /// # Errors
    ///
    /// Returns [`RefreshError`] if the source fails or returns an empty set;
    /// the hub is left untouched.
    pub async fn refresh_once(&self) -> Result<Reconciliation, RefreshError> {
        let started = Instant::now();
        self.status.write().last_attempt = Some(Utc::now());

        let result = match self.source.fetch_universe().await {
            Ok(next) if next.is_empty() => Err(RefreshError::Source(UniverseError::Empty)),
            Ok(next) => Ok(self.reconcile(&next)),
            Err(e) => Err(e.into()),
        };

        let mut status = self.status.write();
        match &result {
            Ok(_) => {
                status.last_success = Some(Utc::now());
                status.last_error = None;
                status.consecutive_failures = 0;
                metrics::record_refresh(RefreshOutcome::Success, started.elapsed());
            }
            Err(e) => {
                status.last_error = Some(e.to_string());
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                metrics::record_refresh(RefreshOutcome::Failure, started.elapsed());
            }
        }

        result
    }

    /// Apply a new eligible set to the hub.
    ///
    /// Admits what is new, then force-closes and removes what dropped out.
    pub fn reconcile(&self, next: &HashSet<Instrument>) -> Reconciliation {
        let current = self.hub.universe();

        let mut admitted: Vec<_> = next.difference(&current).cloned().collect();
        let mut removed: Vec<_> = current.difference(next).cloned().collect();
        admitted.sort_unstable();
        removed.sort_unstable();

        for instrument in &admitted {
            self.hub.admit_instrument(instrument);
        }

        let mut notified = 0;
        for instrument in &removed {
            notified += self.hub.force_close_instrument(instrument);
            self.hub.remove_from_universe(instrument);
            tracing::info!(instrument = %instrument, "Instrument left the eligible universe");
        }

        Reconciliation {
            admitted,
            removed,
            notified,
        }
    }
}

impl std::fmt::Debug for UniverseRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniverseRefresher")
            .field("interval", &self.interval)
            .field("status", &*self.status.read())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
