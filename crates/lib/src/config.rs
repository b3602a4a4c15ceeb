//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.courier/config.json`) and
//! environment. Kept minimal: gateway bind/auth, the session bridge
//! endpoint, and the dispatch timing knobs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Session bridge endpoint settings.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Dispatch pacing and scheduling.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Gateway bind, port, and auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 3000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Auth settings. When absent, defaults to no auth for loopback bind.
    #[serde(default)]
    pub auth: GatewayAuthConfig,
}

/// Gateway auth: token or none (loopback-only when none).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    /// "none" = no shared secret (only safe when bind is loopback).
    /// "token" = require a bearer token on mutating endpoints.
    #[serde(default)]
    pub mode: GatewayAuthMode,

    /// Shared secret for the API. Overridden by COURIER_GATEWAY_TOKEN env.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAuthMode {
    /// No auth; allow only when bind is loopback.
    #[default]
    None,

    /// Require Authorization: Bearer <token> on mutating endpoints.
    Token,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
        }
    }
}

/// Session bridge endpoint (the process that owns the messaging session).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Base URL of the bridge HTTP API (default "http://127.0.0.1:8466").
    #[serde(default = "default_bridge_base_url")]
    pub base_url: String,

    /// API key sent as X-Api-Key. Overridden by COURIER_BRIDGE_API_KEY env.
    pub api_key: Option<String>,

    /// Seconds between session status polls (default 2).
    #[serde(default = "default_bridge_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_bridge_base_url() -> String {
    "http://127.0.0.1:8466".to_string()
}

fn default_bridge_poll_interval_secs() -> u64 {
    2
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_base_url(),
            api_key: None,
            poll_interval_secs: default_bridge_poll_interval_secs(),
        }
    }
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Dispatch timing: pacing between sends, the scheduler tick, and the
/// session recovery delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Seconds to wait between consecutive sends (default 2).
    #[serde(default = "default_pacing_secs")]
    pub pacing_secs: u64,

    /// Seconds between scheduler liveness ticks (default 30).
    #[serde(default = "default_scheduler_interval_secs")]
    pub scheduler_interval_secs: u64,

    /// Seconds before reinitializing after a disconnect (default 5).
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Seconds before reinitializing after a reset (default 2).
    #[serde(default = "default_reset_delay_secs")]
    pub reset_delay_secs: u64,
}

fn default_pacing_secs() -> u64 {
    2
}

fn default_scheduler_interval_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_reset_delay_secs() -> u64 {
    2
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing_secs: default_pacing_secs(),
            scheduler_interval_secs: default_scheduler_interval_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            reset_delay_secs: default_reset_delay_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_secs(self.pacing_secs)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_secs(self.reset_delay_secs)
    }
}

/// Resolve the gateway token: env COURIER_GATEWAY_TOKEN overrides config.
pub fn resolve_gateway_token(config: &Config) -> Option<String> {
    std::env::var("COURIER_GATEWAY_TOKEN")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .gateway
                .auth
                .token
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the bridge API key: env COURIER_BRIDGE_API_KEY overrides config.
pub fn resolve_bridge_api_key(config: &Config) -> Option<String> {
    std::env::var("COURIER_BRIDGE_API_KEY")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .bridge
                .api_key
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("COURIER_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".courier").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or COURIER_CONFIG_PATH). Missing file
/// => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Write a default config file for `courier init`. Existing files are left
/// untouched.
pub fn init_config_file(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        log::info!("config already exists: {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(&Config::default())?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 3000);
        assert_eq!(g.bind, "127.0.0.1");
    }

    #[test]
    fn default_dispatch_timings() {
        let d = DispatchConfig::default();
        assert_eq!(d.pacing(), Duration::from_secs(2));
        assert_eq!(d.scheduler_interval(), Duration::from_secs(30));
        assert_eq!(d.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(d.reset_delay(), Duration::from_secs(2));
    }

    #[test]
    fn loopback_bind_detection() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(!is_loopback_bind("0.0.0.0"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"gateway":{"port":8080}}"#).expect("parse");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.bind, "127.0.0.1");
        assert_eq!(config.bridge.base_url, "http://127.0.0.1:8466");
        assert_eq!(config.dispatch.pacing_secs, 2);
    }
}
