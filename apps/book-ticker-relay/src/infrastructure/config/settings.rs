//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.
//! Unset or unparsable values fall back to defaults; values that parse but
//! cannot work (zero sizes, a malformed listen address) are rejected.

use std::net::SocketAddr;
use std::time::Duration;

/// Downstream listener and health server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Address the relay WebSocket listener binds to.
    pub listen_addr: SocketAddr,
    /// HTTP path upgraded to WebSocket.
    pub ws_path: String,
    /// Health check HTTP port.
    pub health_port: u16,
    /// Frames buffered per client before new ones are dropped.
    pub client_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_path: "/ws".to_string(),
            health_port: 8082,
            client_queue_capacity: 1024,
        }
    }
}

/// Eligible universe settings.
#[derive(Debug, Clone)]
pub struct UniverseSettings {
    /// Time between universe refreshes.
    pub refresh_interval: Duration,
    /// Number of instruments kept after ranking.
    pub size: usize,
    /// Quote-currency suffix an instrument must end with.
    pub quote_suffix: String,
}

impl Default for UniverseSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(600),
            size: 150,
            quote_suffix: "USDT".to_string(),
        }
    }
}

/// Binance endpoints.
#[derive(Debug, Clone)]
pub struct BinanceSettings {
    /// Base URL of the raw stream endpoint.
    pub stream_url: String,
    /// Base URL of the REST API.
    pub rest_url: String,
    /// Timeout for REST requests.
    pub http_timeout: Duration,
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            stream_url: "wss://fstream.binance.com/ws".to_string(),
            rest_url: "https://fapi.binance.com".to_string(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// Upstream WebSocket reconnection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// Listener settings.
    pub server: ServerSettings,
    /// Universe settings.
    pub universe: UniverseSettings,
    /// Binance endpoints.
    pub binance: BinanceSettings,
    /// Upstream reconnection settings.
    pub websocket: WebSocketSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but unusable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = Self::default();

        let listen_addr = match env.get("RELAY_LISTEN_ADDR") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::invalid("RELAY_LISTEN_ADDR", &value))?,
            None => defaults.server.listen_addr,
        };

        let ws_path = env
            .get("RELAY_WS_PATH")
            .unwrap_or(defaults.server.ws_path);
        if !ws_path.starts_with('/') {
            return Err(ConfigError::invalid("RELAY_WS_PATH", &ws_path));
        }

        let server = ServerSettings {
            listen_addr,
            ws_path,
            health_port: env.parse("RELAY_HEALTH_PORT", defaults.server.health_port),
            client_queue_capacity: env.non_zero(
                "RELAY_CLIENT_QUEUE_CAPACITY",
                defaults.server.client_queue_capacity,
            )?,
        };

        let refresh_secs = env.non_zero(
            "RELAY_REFRESH_INTERVAL_SECS",
            defaults.universe.refresh_interval.as_secs(),
        )?;

        let universe = UniverseSettings {
            refresh_interval: Duration::from_secs(refresh_secs),
            size: env.non_zero("RELAY_UNIVERSE_SIZE", defaults.universe.size)?,
            quote_suffix: env
                .get("RELAY_QUOTE_SUFFIX")
                .unwrap_or(defaults.universe.quote_suffix),
        };

        let binance = BinanceSettings {
            stream_url: env
                .get("BINANCE_STREAM_URL")
                .map_or(defaults.binance.stream_url, |url| {
                    url.trim_end_matches('/').to_string()
                }),
            rest_url: env
                .get("BINANCE_REST_URL")
                .map_or(defaults.binance.rest_url, |url| {
                    url.trim_end_matches('/').to_string()
                }),
            http_timeout: Duration::from_secs(env.parse(
                "BINANCE_HTTP_TIMEOUT_SECS",
                defaults.binance.http_timeout.as_secs(),
            )),
        };

        let websocket = WebSocketSettings {
            reconnect_delay_initial: Duration::from_millis(env.parse(
                "RELAY_RECONNECT_DELAY_INITIAL_MS",
                u64::try_from(defaults.websocket.reconnect_delay_initial.as_millis())
                    .unwrap_or(u64::MAX),
            )),
            reconnect_delay_max: Duration::from_secs(env.parse(
                "RELAY_RECONNECT_DELAY_MAX_SECS",
                defaults.websocket.reconnect_delay_max.as_secs(),
            )),
            reconnect_delay_multiplier: env.parse(
                "RELAY_RECONNECT_DELAY_MULTIPLIER",
                defaults.websocket.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.parse(
                "RELAY_MAX_RECONNECT_ATTEMPTS",
                defaults.websocket.max_reconnect_attempts,
            ),
        };

        Ok(Self {
            server,
            universe,
            binance,
            websocket,
        })
    }

    /// Address the health server binds to.
    #[must_use]
    pub fn health_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.listen_addr.ip(), self.server.health_port)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable is set to a value the relay cannot use.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn non_zero<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr + PartialEq + Default,
    {
        let value = self.parse(key, default);
        if value == T::default() {
            return Err(ConfigError::invalid(key, "0"));
        }
        Ok(value)
    }
}
