//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    BinanceSettings, ConfigError, RelayConfig, ServerSettings, UniverseSettings,
    WebSocketSettings,
};
