//! Ingest Configuration
//!
//! Configuration types for the ingest pipeline, loaded from environment
//! variables. The symbol allow-list is fixed at startup; there is no
//! runtime reconfiguration.

use std::time::Duration;

use crate::domain::market_data::SymbolAllowList;
use crate::infrastructure::alpaca::auth::{AuthError, Credentials};

// =============================================================================
// Feed Selection
// =============================================================================

/// Market data feed type for Alpaca streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFeed {
    /// IEX (Investors Exchange) - Free tier with limited data.
    #[default]
    Iex,
    /// SIP (Securities Information Processor) - Full market data.
    Sip,
}

impl DataFeed {
    /// Parse feed type from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sip" => Self::Sip,
            _ => Self::Iex,
        }
    }

    /// Get the feed name for WebSocket URLs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Iex => "iex",
            Self::Sip => "sip",
        }
    }
}

// =============================================================================
// Settings Groups
// =============================================================================

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before considering connection dead.
    pub heartbeat_timeout: Duration,
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
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_timeout: Duration::from_secs(20),
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Channel capacity settings.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Capacity of the decoded-message channel between client and dispatcher.
    pub message_buffer: usize,
    /// Per-topic capacity of outbound broadcast channels.
    pub topic_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            message_buffer: 4_096,
            topic_capacity: 256,
        }
    }
}

/// Pipeline timing settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Throughput report window for the dispatcher.
    pub report_window: Duration,
    /// Delay between authentication and the subscription attempt.
    pub subscribe_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            report_window: Duration::from_secs(60),
            subscribe_delay: Duration::from_secs(1),
        }
    }
}

// =============================================================================
// Ingest Configuration
// =============================================================================

/// Complete ingest configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Market data feed type.
    pub feed: DataFeed,
    /// API credentials.
    pub credentials: Credentials,
    /// Symbols to subscribe to and accept from the feed.
    pub symbols: SymbolAllowList,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Channel capacity settings.
    pub channels: ChannelSettings,
    /// Pipeline timing settings.
    pub pipeline: PipelineSettings,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// empty, or if the symbol list parses to nothing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("ALPACA_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("ALPACA_KEY".to_string()))?;

        let api_secret = std::env::var("ALPACA_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("ALPACA_SECRET".to_string()))?;

        let credentials = Credentials::new(api_key, api_secret)?;

        let raw_symbols = std::env::var("INGEST_SYMBOLS")
            .map_err(|_| ConfigError::MissingEnvVar("INGEST_SYMBOLS".to_string()))?;
        let symbols = parse_symbol_list(&raw_symbols)?;

        let feed = std::env::var("ALPACA_FEED")
            .map(|s| DataFeed::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let websocket = WebSocketSettings {
            heartbeat_interval: parse_env_duration_secs(
                "INGEST_HEARTBEAT_INTERVAL_SECS",
                WebSocketSettings::default().heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_secs(
                "INGEST_HEARTBEAT_TIMEOUT_SECS",
                WebSocketSettings::default().heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "INGEST_RECONNECT_DELAY_INITIAL_MS",
                WebSocketSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "INGEST_RECONNECT_DELAY_MAX_SECS",
                WebSocketSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "INGEST_RECONNECT_DELAY_MULTIPLIER",
                WebSocketSettings::default().reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                "INGEST_MAX_RECONNECT_ATTEMPTS",
                WebSocketSettings::default().max_reconnect_attempts,
            ),
        };

        let channels = ChannelSettings {
            message_buffer: parse_env_usize(
                "INGEST_MESSAGE_BUFFER",
                ChannelSettings::default().message_buffer,
            ),
            topic_capacity: parse_env_usize(
                "INGEST_TOPIC_CAPACITY",
                ChannelSettings::default().topic_capacity,
            ),
        };

        let pipeline = PipelineSettings {
            report_window: parse_env_duration_secs(
                "INGEST_REPORT_WINDOW_SECS",
                PipelineSettings::default().report_window,
            ),
            subscribe_delay: parse_env_duration_millis(
                "INGEST_SUBSCRIBE_DELAY_MS",
                PipelineSettings::default().subscribe_delay,
            ),
        };

        Ok(Self {
            feed,
            credentials,
            symbols,
            websocket,
            channels,
            pipeline,
        })
    }

    /// Get the market data stream WebSocket URL.
    ///
    /// Market data streams always use production URLs; only the feed
    /// segment varies.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!("wss://stream.data.alpaca.markets/v2/{}", self.feed.as_str())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Credentials were rejected at construction.
    #[error(transparent)]
    Credentials(#[from] AuthError),
}

fn parse_symbol_list(raw: &str) -> Result<SymbolAllowList, ConfigError> {
    let symbols: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_uppercase())
        .collect();

    if symbols.is_empty() {
        return Err(ConfigError::EmptyValue("INGEST_SYMBOLS".to_string()));
    }

    Ok(SymbolAllowList::new(symbols))
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_millis)
}
