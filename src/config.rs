//! Session configuration loading.
//!
//! Values come from (lowest to highest precedence) built-in defaults, an
//! optional JSON file, and `REALTIME_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CIPHER_KEY, DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_FRAME_BYTES, DEFAULT_ROLE,
    KEEPALIVE_INTERVAL, KEEPALIVE_METHOD, RECONNECT_DELAY,
};
use crate::error::SessionError;

/// What to do with calls issued before the handshake completes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PendingPolicy {
    /// Hold the call and send it once the connection is ready.
    #[default]
    Queue,
    /// Reject the call with [`SessionError::HandshakeIncomplete`].
    FailFast,
}

/// Configuration for one session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Peer URL (`ws://`, `wss://`, `http://` or `https://`).
    pub url: String,
    /// Repeating XOR key for obfuscated frames.
    pub cipher_key: String,
    /// Compress and XOR frames. `false` sends plain JSON text frames.
    pub encrypt: bool,
    /// Declared role; also the namespace of outbound calls.
    pub role: String,
    /// Seconds between a lost connection and the next attempt.
    pub reconnect_delay_secs: u64,
    /// Seconds between keepalive calls.
    pub keepalive_interval_secs: u64,
    /// Method (before namespacing) used for keepalive calls.
    pub keepalive_method: String,
    /// Gzip level, 0-9.
    pub compression_level: u32,
    /// Largest inflated frame accepted from the peer, in bytes.
    pub max_frame_bytes: usize,
    /// Extra headers sent with the WebSocket handshake request.
    pub headers: BTreeMap<String, String>,
    /// Behaviour for calls issued while not ready.
    pub pending_policy: PendingPolicy,
    /// Reject in-flight calls with `ConnectionReset` when the connection drops.
    /// When `false` they are left pending.
    pub reset_pending_on_disconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            cipher_key: DEFAULT_CIPHER_KEY.to_string(),
            encrypt: true,
            role: DEFAULT_ROLE.to_string(),
            reconnect_delay_secs: RECONNECT_DELAY.as_secs(),
            keepalive_interval_secs: KEEPALIVE_INTERVAL.as_secs(),
            keepalive_method: KEEPALIVE_METHOD.to_string(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            headers: BTreeMap::new(),
            pending_policy: PendingPolicy::Queue,
            reset_pending_on_disconnect: true,
        }
    }
}

impl SessionConfig {
    /// Defaults pointed at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Default configuration file path (`<config dir>/realtime/config.json`).
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("realtime")
            .join("config.json"))
    }

    /// Load from `path` if given (else the default path, if it exists), then
    /// apply environment overrides.
    ///
    /// Not validated, so callers can layer further overrides first.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_path() {
                Ok(default) if default.exists() => Self::load_from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `REALTIME_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("REALTIME_URL") {
            self.url = url;
        }
        if let Some(key) = lookup("REALTIME_CIPHER_KEY") {
            self.cipher_key = key;
        }
        if let Some(encrypt) = lookup("REALTIME_ENCRYPT") {
            self.encrypt = !matches!(encrypt.as_str(), "0" | "false" | "no" | "off");
        }
        if let Some(secs) = lookup("REALTIME_RECONNECT_DELAY_SECS").and_then(|v| v.parse().ok()) {
            self.reconnect_delay_secs = secs;
        }
        if let Some(secs) = lookup("REALTIME_KEEPALIVE_SECS").and_then(|v| v.parse().ok()) {
            self.keepalive_interval_secs = secs;
        }
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.url.trim().is_empty() {
            return Err(SessionError::Config("url must not be empty".into()));
        }
        if self.encrypt && (self.cipher_key.is_empty() || !self.cipher_key.is_ascii()) {
            return Err(SessionError::Config(
                "cipher_key must be a non-empty ASCII string".into(),
            ));
        }
        if self.keepalive_interval_secs == 0 {
            return Err(SessionError::Config(
                "keepalive_interval_secs must be at least 1".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(SessionError::Config("max_frame_bytes must be at least 1".into()));
        }
        if self.role.is_empty() {
            return Err(SessionError::Config("role must not be empty".into()));
        }
        Ok(())
    }

    /// Delay between a lost connection and the next attempt.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Interval between keepalive calls.
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}
