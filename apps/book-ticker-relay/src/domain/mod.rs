//! Domain Layer - Core relay types and bookkeeping.
//!
//! This layer contains the ticker payload, the downstream protocol frames and
//! the subscription bookkeeping that decides when upstream feeds start and
//! stop. Nothing here performs I/O or holds a lock; the application layer owns
//! synchronization.

/// Best bid/ask ticker payload.
pub mod streaming;

/// Downstream client requests and notices.
pub mod protocol;

/// Eligible universe and subscriber bookkeeping.
pub mod subscription;
