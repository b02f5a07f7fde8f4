use serde::Deserialize;

/// Configuration as stored in TOML files (optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawArenaConfig {
    #[serde(default)]
    pub transport: RawTransportConfig,

    #[serde(default)]
    pub reconnect: RawReconnectConfig,

    #[serde(default)]
    pub api: RawApiConfig,

    #[serde(default)]
    pub room: RawRoomConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTransportConfig {
    /// Push handshake endpoint
    pub endpoint: Option<String>,
    pub topic_prefix: Option<String>,
    pub app_prefix: Option<String>,
    pub handshake_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawReconnectConfig {
    /// `backoff` or `fixed`
    pub mode: Option<arena_core::ReconnectMode>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub fixed_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawApiConfig {
    /// REST base URL
    pub base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawRoomConfig {
    pub poll_interval_ms: Option<u64>,
    pub tick_interval_ms: Option<u64>,
    pub typing_ttl_ms: Option<u64>,
}
