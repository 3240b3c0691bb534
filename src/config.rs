//! Configuration management for Turnstile.
//!
//! Values are layered: built-in defaults, then an optional file (format
//! picked from its extension), then `TURNSTILE__SECTION__KEY` environment
//! variables.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TurnstileError};

/// Prefix for environment overrides, e.g. `TURNSTILE__LIMITER__CAPACITY=20`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission limits
    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

/// Admission limits. Fixed for the life of a limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum live admissions per caller within the window. 0 rejects everything.
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Rolling window length in seconds. May be fractional.
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,

    /// Optional absolute ceiling, checked against the same live count
    #[serde(default)]
    pub quota: Option<u64>,

    /// Number of independently locked shards in the bucket store
    #[serde(default = "default_shards")]
    pub shards: usize,

    /// How often to sweep expired records from idle buckets. Unset disables the sweep.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            window_secs: default_window_secs(),
            quota: None,
            shards: default_shards(),
            sweep_interval_secs: None,
        }
    }
}

fn default_capacity() -> u64 {
    10
}

fn default_window_secs() -> f64 {
    60.0
}

fn default_shards() -> usize {
    16
}

impl LimiterConfig {
    /// Check values that the types alone do not rule out.
    pub fn validate(&self) -> Result<()> {
        self.window()?;

        if self.shards < 2 || !self.shards.is_power_of_two() {
            return Err(TurnstileError::Config(format!(
                "limiter.shards must be a power of two greater than 1, got {}",
                self.shards
            )));
        }

        if self.sweep_interval_secs == Some(0) {
            return Err(TurnstileError::Config(
                "limiter.sweep_interval_secs must be positive when set".to_string(),
            ));
        }

        Ok(())
    }

    /// The window as a `Duration`.
    pub fn window(&self) -> Result<Duration> {
        if !self.window_secs.is_finite() || self.window_secs < 0.0 {
            return Err(TurnstileError::Config(format!(
                "limiter.window_secs must be a non-negative number, got {}",
                self.window_secs
            )));
        }
        Duration::try_from_secs_f64(self.window_secs).map_err(|e| {
            TurnstileError::Config(format!(
                "limiter.window_secs {} is out of range: {}",
                self.window_secs, e
            ))
        })
    }

    /// Sweep period, if sweeping is enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}

impl TurnstileConfig {
    /// Load configuration from defaults, an optional file, and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path));
        }

        let config: TurnstileConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.limiter.validate()
    }
}
