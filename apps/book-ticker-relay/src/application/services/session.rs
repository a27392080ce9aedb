//! Client Session
//!
//! Interprets requests from one downstream client against the hub.
//!
//! # Toggle Semantics
//!
//! A SUBSCRIBE request is a full replace with toggle:
//!
//! 1. Each named instrument the client already holds is marked for removal;
//!    every other one is subscribed (or rejected with `Invalid pair`).
//! 2. Everything the client holds that was not accepted in step 1 is
//!    unsubscribed.
//!
//! Sending the same instrument twice in one request, or exactly the current
//! set, therefore clears the client's subscriptions.

use std::sync::Arc;

use crate::application::services::hub::{ClientHandle, SubscriptionHub};
use crate::domain::protocol::{ClientRequest, Notice};
use crate::domain::subscription::{ConsumerId, Instrument};

/// One downstream client's view of the hub.
///
/// Requests from a single client are handled sequentially by its read loop.
#[derive(Debug)]
pub struct ClientSession {
    hub: Arc<SubscriptionHub>,
    client: Arc<ClientHandle>,
}

impl ClientSession {
    /// Create a session for a connected client.
    #[must_use]
    pub const fn new(hub: Arc<SubscriptionHub>, client: Arc<ClientHandle>) -> Self {
        Self { hub, client }
    }

    /// Client identifier.
    #[must_use]
    pub fn client_id(&self) -> ConsumerId {
        self.client.id()
    }

    /// Handle one inbound frame.
    ///
    /// Undecodable frames are answered with a parse-error notice; the session
    /// keeps going.
    pub fn handle_frame(&self, bytes: &[u8]) {
        match ClientRequest::from_slice(bytes) {
            Ok(request) if request.is_subscribe() => {
                self.toggle(&request.pairs);
            }
            Ok(request) => {
                tracing::debug!(
                    client_id = self.client.id(),
                    method = %request.method,
                    "Ignoring unsupported method"
                );
            }
            Err(e) => {
                tracing::debug!(client_id = self.client.id(), error = %e, "Malformed client request");
                self.client.notify(Notice::ParseError(e.to_string()));
            }
        }
    }

    /// Apply a SUBSCRIBE request.
    ///
    /// Returns the client's subscriptions afterwards, in request order.
    pub fn toggle(&self, pairs: &[String]) -> Vec<Instrument> {
        let id = self.client.id();
        let mut accepted: Vec<Instrument> = Vec::with_capacity(pairs.len());

        for pair in pairs {
            if self.hub.is_subscribed(id, pair) {
                accepted.retain(|held| held != pair);
            } else if self.hub.subscribe(&self.client, pair) {
                accepted.push(pair.clone());
            } else {
                tracing::debug!(client_id = id, instrument = %pair, "Rejected ineligible instrument");
                self.client.notify(Notice::InvalidInstrument(pair.clone()));
            }
        }

        for held in self.hub.subscriptions_of(id) {
            if !accepted.contains(&held) {
                self.hub.unsubscribe(&self.client, &held, false);
            }
        }

        tracing::debug!(client_id = id, subscriptions = ?accepted, "Subscriptions updated");
        accepted
    }

    /// Release every subscription after the client disconnected.
    pub fn close(&self) -> usize {
        let released = self.hub.remove_client(self.client.id());
        tracing::debug!(client_id = self.client.id(), released, "Session closed");
        released
    }
}

// =============================================================================
// Tests
// =============================================================================
