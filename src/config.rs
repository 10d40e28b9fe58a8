//! TOML configuration for streamcheck.
//!
//! Layered model: an explicit `--config` path, then the `STREAMCHECK_CONFIG`
//! environment variable, then `./streamcheck.toml`, then compiled-in defaults.
//! Every section is optional and falls back to its defaults field by field.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::runner::pacing::{Pacing, PacingOverrides};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "STREAMCHECK_CONFIG";

/// Config file picked up from the working directory when nothing else is set.
pub const LOCAL_CONFIG: &str = "streamcheck.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a streamcheck process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub probes: ProbeConfig,
    #[serde(default)]
    pub peacock: PeacockConfig,
    #[serde(default)]
    pub bbc_iplayer: IplayerConfig,
    #[serde(default)]
    pub nordvpn: NordVpnConfig,
    #[serde(default)]
    pub cyberghost: CyberGhostConfig,
    #[serde(default)]
    pub pacing: PacingOverrides,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => write!(f, "compiled-in defaults"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the active configuration.
    ///
    /// An explicit path or `STREAMCHECK_CONFIG` must load cleanly. A missing
    /// `./streamcheck.toml` is fine and yields the defaults.
    ///
    /// Runs before the tracing subscriber exists, so the caller logs the
    /// returned [`ConfigSource`] instead of this function logging it.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, ConfigSource::File(path.to_path_buf())));
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(env_path);
            let cfg = Self::load(&path).with_context(|| format!("{CONFIG_ENV} is set"))?;
            return Ok((cfg, ConfigSource::File(path)));
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            return Ok((Self::load(local)?, ConfigSource::File(local.to_path_buf())));
        }

        Ok((Self::default(), ConfigSource::Defaults))
    }

    /// Apply the `[pacing]` overrides on top of a provider's default pacing.
    pub fn pacing_for(&self, provider_default: Pacing) -> Pacing {
        provider_default.with_overrides(&self.pacing)
    }
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

/// Shared HTTP settings for the external address lookup and redirect checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Echo service returning the caller's address as plain text.
    pub ip_echo_url: String,
    /// User agent sent with every probe request. ip.me answers plain text
    /// only to curl-like agents.
    pub user_agent: String,
    /// Whole-request timeout in seconds.
    pub http_timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ip_echo_url: "https://ip.me".to_string(),
            user_agent: "curl/8.5.0".to_string(),
            http_timeout_secs: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Peacock redirect check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeacockConfig {
    pub url: String,
    /// Substring of the final URL that marks the geo-block page.
    pub blocked_marker: String,
}

impl Default for PeacockConfig {
    fn default() -> Self {
        Self {
            url: "https://www.peacocktv.com".to_string(),
            blocked_marker: "/unavailable".to_string(),
        }
    }
}

/// BBC iPlayer page-source check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IplayerConfig {
    pub url: String,
    /// Phrase shown on the geo-block page.
    pub blocked_phrase: String,
    /// Headless browser binary. Auto-detected when unset.
    pub browser: Option<String>,
    /// How long the browser may run scripts before the DOM is dumped.
    pub page_load_secs: u64,
}

impl Default for IplayerConfig {
    fn default() -> Self {
        Self {
            url: "https://www.bbc.co.uk/iplayer".to_string(),
            blocked_phrase: "Sorry, BBC iPlayer isn\u{2019}t available in your region.".to_string(),
            browser: None,
            page_load_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// NordVPN server catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NordVpnConfig {
    pub api_url: String,
}

impl Default for NordVpnConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.nordvpn.com/v2/servers?limit=0".to_string(),
        }
    }
}

/// CyberGhost CLI invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CyberGhostConfig {
    /// Prefix connect/disconnect with `sudo`. The CLI needs root to touch
    /// the tunnel.
    pub use_sudo: bool,
}

impl Default for CyberGhostConfig {
    fn default() -> Self {
        Self { use_sudo: true }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration. `RUST_LOG` wins over `level` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
