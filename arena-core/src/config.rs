//! Client configuration
//!
//! Every section deserializes from TOML with defaults for missing keys, so an
//! empty file yields [`ArenaConfig::default()`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ReconnectPolicy;

/// Default push endpoint (raw WebSocket behind the SockJS handshake path)
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws-connect/websocket";

/// Default REST base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// Complete client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArenaConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub room: RoomConfig,
}

/// Push transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Handshake endpoint
    pub endpoint: String,
    /// Prefix the broker puts in front of subscribable topics
    pub topic_prefix: String,
    /// Prefix for application destinations we publish to
    pub app_prefix: String,
    /// How long to wait for the broker to accept the handshake
    pub handshake_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            topic_prefix: "/topic/".to_string(),
            app_prefix: "/app/".to_string(),
            handshake_timeout_ms: 10_000,
        }
    }
}

impl TransportConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Full broker destination for a subscribable topic
    pub fn topic_destination(&self, topic: &str) -> String {
        format!("{}{}", self.topic_prefix, topic)
    }

    /// Full broker destination for an application endpoint
    pub fn app_destination(&self, destination: &str) -> String {
        format!("{}{}", self.app_prefix, destination)
    }
}

/// Reconnect delay strategy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectMode {
    /// Capped exponential backoff
    #[default]
    Backoff,
    /// Constant delay between attempts
    Fixed,
}

/// Reconnect settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub mode: ReconnectMode,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub fixed_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            mode: ReconnectMode::Backoff,
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
            multiplier: 2.0,
            fixed_delay_ms: 5_000,
        }
    }
}

impl ReconnectConfig {
    /// Build the policy these settings describe
    pub fn policy(&self) -> ReconnectPolicy {
        match self.mode {
            ReconnectMode::Fixed => ReconnectPolicy::fixed(Duration::from_millis(self.fixed_delay_ms)),
            ReconnectMode::Backoff => ReconnectPolicy::backoff(
                Duration::from_millis(self.initial_delay_ms),
                Duration::from_millis(self.max_delay_ms),
                self.multiplier,
            ),
        }
    }
}

/// REST collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Room view timers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoomConfig {
    /// Fallback status poll interval
    pub poll_interval_ms: u64,
    /// Countdown refresh interval
    pub tick_interval_ms: u64,
    /// How long a typing indicator survives without a refresh
    pub typing_ttl_ms: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            tick_interval_ms: 1_000,
            typing_ttl_ms: 2_000,
        }
    }
}

/// Timers are never shorter than this; a zero period would stall a tokio interval
const MIN_TIMER_MS: u64 = 1;

impl RoomConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_TIMER_MS))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(MIN_TIMER_MS))
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms.max(MIN_TIMER_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_platform_timers() {
        let config = ArenaConfig::default();
        assert_eq!(config.room.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.room.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.room.typing_ttl(), Duration::from_secs(2));
        assert_eq!(config.transport.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.reconnect.mode, ReconnectMode::Backoff);
    }

    #[test]
    fn zero_timers_are_clamped() {
        let room = RoomConfig {
            poll_interval_ms: 0,
            tick_interval_ms: 0,
            typing_ttl_ms: 0,
        };
        assert_eq!(room.poll_interval(), Duration::from_millis(1));
        assert_eq!(room.tick_interval(), Duration::from_millis(1));
        assert_eq!(room.typing_ttl(), Duration::from_millis(1));
    }

    #[test]
    fn destinations_apply_prefixes() {
        let transport = TransportConfig::default();
        assert_eq!(transport.topic_destination("room/AB12"), "/topic/room/AB12");
        assert_eq!(transport.app_destination("room/start"), "/app/room/start");
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: ArenaConfig = toml::from_str("").unwrap();
        assert_eq!(config, ArenaConfig::default());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: ArenaConfig = toml::from_str(
            r#"
[reconnect]
mode = "fixed"

[room]
poll_interval_ms = 2500
"#,
        )
        .unwrap();

        assert_eq!(config.reconnect.mode, ReconnectMode::Fixed);
        assert_eq!(config.reconnect.fixed_delay_ms, 5_000);
        assert_eq!(config.room.poll_interval_ms, 2_500);
        assert_eq!(config.room.typing_ttl_ms, 2_000);
    }

    #[test]
    fn fixed_mode_builds_fixed_policy() {
        let config = ReconnectConfig {
            mode: ReconnectMode::Fixed,
            ..ReconnectConfig::default()
        };
        let policy = config.policy();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(5));
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = ArenaConfig::default();
        config.api.base_url = "https://arena.example.com".to_string();
        let text = toml::to_string(&config).unwrap();
        let parsed: ArenaConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
