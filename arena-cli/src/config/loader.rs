use super::types::{
    RawApiConfig, RawArenaConfig, RawReconnectConfig, RawRoomConfig, RawTransportConfig,
};
use anyhow::{Context, Result};
use arena_core::{ApiConfig, ArenaConfig, ReconnectConfig, RoomConfig, TransportConfig};
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<ArenaConfig> {
        let mut raw = RawArenaConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        Ok(Self::finalize(raw))
    }

    /// Load `explicit` alone when given, otherwise the merged layers
    pub fn resolve(explicit: Option<&Path>) -> Result<ArenaConfig> {
        match explicit {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load a single file; a missing file yields defaults
    pub fn load_from_path(path: &Path) -> Result<ArenaConfig> {
        if !path.exists() {
            return Ok(ArenaConfig::default());
        }
        Ok(Self::finalize(Self::read_raw(path)?))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("arena").join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with ARENA_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("ARENA_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".arena/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<RawArenaConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawArenaConfig, overlay: RawArenaConfig) -> RawArenaConfig {
        RawArenaConfig {
            transport: RawTransportConfig {
                endpoint: overlay.transport.endpoint.or(base.transport.endpoint),
                topic_prefix: overlay.transport.topic_prefix.or(base.transport.topic_prefix),
                app_prefix: overlay.transport.app_prefix.or(base.transport.app_prefix),
                handshake_timeout_ms: overlay
                    .transport
                    .handshake_timeout_ms
                    .or(base.transport.handshake_timeout_ms),
            },
            reconnect: RawReconnectConfig {
                mode: overlay.reconnect.mode.or(base.reconnect.mode),
                initial_delay_ms: overlay
                    .reconnect
                    .initial_delay_ms
                    .or(base.reconnect.initial_delay_ms),
                max_delay_ms: overlay.reconnect.max_delay_ms.or(base.reconnect.max_delay_ms),
                multiplier: overlay.reconnect.multiplier.or(base.reconnect.multiplier),
                fixed_delay_ms: overlay
                    .reconnect
                    .fixed_delay_ms
                    .or(base.reconnect.fixed_delay_ms),
            },
            api: RawApiConfig {
                base_url: overlay.api.base_url.or(base.api.base_url),
                request_timeout_ms: overlay
                    .api
                    .request_timeout_ms
                    .or(base.api.request_timeout_ms),
            },
            room: RawRoomConfig {
                poll_interval_ms: overlay.room.poll_interval_ms.or(base.room.poll_interval_ms),
                tick_interval_ms: overlay.room.tick_interval_ms.or(base.room.tick_interval_ms),
                typing_ttl_ms: overlay.room.typing_ttl_ms.or(base.room.typing_ttl_ms),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawArenaConfig) -> ArenaConfig {
        let transport = TransportConfig::default();
        let reconnect = ReconnectConfig::default();
        let api = ApiConfig::default();
        let room = RoomConfig::default();

        ArenaConfig {
            transport: TransportConfig {
                endpoint: raw.transport.endpoint.unwrap_or(transport.endpoint),
                topic_prefix: raw.transport.topic_prefix.unwrap_or(transport.topic_prefix),
                app_prefix: raw.transport.app_prefix.unwrap_or(transport.app_prefix),
                handshake_timeout_ms: raw
                    .transport
                    .handshake_timeout_ms
                    .unwrap_or(transport.handshake_timeout_ms),
            },
            reconnect: ReconnectConfig {
                mode: raw.reconnect.mode.unwrap_or(reconnect.mode),
                initial_delay_ms: raw
                    .reconnect
                    .initial_delay_ms
                    .unwrap_or(reconnect.initial_delay_ms),
                max_delay_ms: raw.reconnect.max_delay_ms.unwrap_or(reconnect.max_delay_ms),
                multiplier: raw.reconnect.multiplier.unwrap_or(reconnect.multiplier),
                fixed_delay_ms: raw.reconnect.fixed_delay_ms.unwrap_or(reconnect.fixed_delay_ms),
            },
            api: ApiConfig {
                base_url: raw.api.base_url.unwrap_or(api.base_url),
                request_timeout_ms: raw.api.request_timeout_ms.unwrap_or(api.request_timeout_ms),
            },
            room: RoomConfig {
                poll_interval_ms: raw.room.poll_interval_ms.unwrap_or(room.poll_interval_ms),
                tick_interval_ms: raw.room.tick_interval_ms.unwrap_or(room.tick_interval_ms),
                typing_ttl_ms: raw.room.typing_ttl_ms.unwrap_or(room.typing_ttl_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    // ==================== Load Tests ====================

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.toml");

        let config = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(config, ArenaConfig::default());
    }

    #[test]
    fn test_load_from_valid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(
            &temp_dir,
            r#"
[transport]
endpoint = "wss://arena.example.com/ws-connect/websocket"

[api]
base_url = "https://arena.example.com"

[room]
poll_interval_ms = 2000
"#,
        );

        let config = ConfigLoader::load_from_path(&path).unwrap();

        assert_eq!(
            config.transport.endpoint,
            "wss://arena.example.com/ws-connect/websocket"
        );
        assert_eq!(config.transport.topic_prefix, "/topic/");
        assert_eq!(config.api.base_url, "https://arena.example.com");
        assert_eq!(config.room.poll_interval_ms, 2000);
        assert_eq!(config.room.typing_ttl_ms, 2000);
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(&temp_dir, "[room\npoll_interval_ms = ");

        let result = ConfigLoader::load_from_path(&path);

        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_prefers_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(&temp_dir, "[api]\nrequest_timeout_ms = 250\n");

        let config = ConfigLoader::resolve(Some(&path)).unwrap();

        assert_eq!(config.api.request_timeout_ms, 250);
    }

    // ==================== Merge Tests ====================

    #[test]
    fn test_merge_raw_overlay_overrides_base() {
        let base = RawArenaConfig {
            api: RawApiConfig {
                base_url: Some("http://base".to_string()),
                request_timeout_ms: Some(1000),
            },
            room: RawRoomConfig {
                poll_interval_ms: Some(3000),
                ..Default::default()
            },
            ..Default::default()
        };
        let overlay = RawArenaConfig {
            api: RawApiConfig {
                base_url: Some("http://overlay".to_string()),
                request_timeout_ms: None,
            },
            reconnect: RawReconnectConfig {
                mode: Some(arena_core::ReconnectMode::Fixed),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = ConfigLoader::merge_raw(base, overlay);

        assert_eq!(merged.api.base_url.as_deref(), Some("http://overlay"));
        // overlay's None falls through to base value via .or()
        assert_eq!(merged.api.request_timeout_ms, Some(1000));
        assert_eq!(merged.room.poll_interval_ms, Some(3000));
        assert_eq!(merged.reconnect.mode, Some(arena_core::ReconnectMode::Fixed));
    }

    #[test]
    fn test_finalize_applies_defaults() {
        let config = ConfigLoader::finalize(RawArenaConfig::default());
        assert_eq!(config, ArenaConfig::default());
    }

    // ==================== Path Tests ====================

    #[test]
    fn test_user_config_path_returns_some() {
        let path = ConfigLoader::user_config_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("arena"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    #[serial]
    fn test_project_config_path() {
        unsafe { std::env::remove_var("ARENA_PROJECT_CONFIG_DIR") };
        let path = ConfigLoader::project_config_path();
        assert_eq!(path, PathBuf::from(".arena/config.toml"));
    }

    #[test]
    #[serial]
    fn test_project_config_dir_override_is_loaded() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir, "[room]\ntick_interval_ms = 500\n");
        unsafe { std::env::set_var("ARENA_PROJECT_CONFIG_DIR", temp_dir.path()) };

        let path = ConfigLoader::project_config_path();
        let config = ConfigLoader::load();

        unsafe { std::env::remove_var("ARENA_PROJECT_CONFIG_DIR") };
        assert_eq!(path, temp_dir.path().join("config.toml"));
        assert_eq!(config.unwrap().room.tick_interval_ms, 500);
    }
}
