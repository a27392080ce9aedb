//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (universe source, feeds).
pub mod ports;

/// Application services for subscriptions, sessions and universe refresh.
pub mod services;
