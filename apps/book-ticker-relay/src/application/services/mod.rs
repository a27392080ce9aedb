//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SubscriptionHub`: Subscriber registry and upstream feed lifecycle
//! - `ClientSession`: Per-client request handling with toggle semantics
//! - `UniverseRefresher`: Periodic reconciliation of the eligible universe

pub mod hub;
pub mod refresher;
pub mod session;

pub use hub::{ClientHandle, HubStats, SubscriptionHub};
pub use refresher::{
    Reconciliation, RefreshError, RefreshStatus, SharedRefreshStatus, UniverseRefresher,
};
pub use session::ClientSession;
