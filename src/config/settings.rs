//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every section is
//! `#[serde(default)]`, so a settings file only needs the keys it changes.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Where the voice service lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` of the service.
    pub host: String,
    /// WebSocket endpoint path.
    pub path: String,
    /// Use `wss://` instead of `ws://`.
    pub secure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:8000".into(),
            path: "/ws".into(),
            secure: false,
        }
    }
}

impl ServerConfig {
    /// Full WebSocket URL.
    ///
    /// ```
    /// use cameron_client::config::ServerConfig;
    ///
    /// let server = ServerConfig::default();
    /// assert_eq!(server.endpoint_url(), "ws://127.0.0.1:8000/ws");
    /// ```
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let path = self.path.trim_start_matches('/');
        format!("{scheme}://{}/{path}", self.host)
    }
}

// ---------------------------------------------------------------------------
// ReconnectConfig
// ---------------------------------------------------------------------------

/// Reconnection timing.  The delay is fixed; it never grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { delay_ms: 3000 }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture and playback device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Stream the microphone to the service.
    pub capture_enabled: bool,
    /// Input device name; `None` uses the system default.
    pub input_device: Option<String>,
    /// Play synthesized audio returned by the service.
    pub playback_enabled: bool,
    /// Output device name; `None` uses the system default.
    pub output_device: Option<String>,
    /// Captured chunks buffered between the audio thread and the uplink
    /// before new chunks are dropped.
    pub chunk_backlog: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_enabled: true,
            input_device: None,
            playback_enabled: true,
            output_device: None,
            chunk_backlog: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use cameron_client::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// println!("{}", config.endpoint_url());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reconnect: ReconnectConfig,
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet so
    /// callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn endpoint_url(&self) -> String {
        self.server.endpoint_url()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let mut original = AppConfig::default();
        original.server.host = "voice.example.com:443".into();
        original.server.secure = true;
        original.audio.input_device = Some("USB Mic".into());
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(original, loaded);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[server]\nhost = \"10.0.0.5:9000\"\n").unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.server.host, "10.0.0.5:9000");
        assert_eq!(config.server.path, "/ws");
        assert_eq!(config.reconnect.delay_ms, 3000);
        assert_eq!(config.audio.chunk_backlog, 64);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "server = [").unwrap();

        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn defaults_match_the_service() {
        let config = AppConfig::default();
        assert_eq!(config.endpoint_url(), "ws://127.0.0.1:8000/ws");
        assert_eq!(config.reconnect.delay(), Duration::from_millis(3000));
        assert!(config.audio.capture_enabled);
        assert!(config.audio.playback_enabled);
    }

    #[test]
    fn secure_server_uses_wss() {
        let server = ServerConfig {
            host: "voice.example.com".into(),
            path: "socket".into(),
            secure: true,
        };
        assert_eq!(server.endpoint_url(), "wss://voice.example.com/socket");
    }
}
