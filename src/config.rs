//! Pipeline configuration
//!
//! Configuration can be built in code, parsed from TOML, or layered with
//! environment overrides. It is fixed once a [`Pipeline`](crate::Pipeline)
//! is built.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the mapper pool size.
pub const WORKERS_ENV: &str = "PARFOLD_WORKERS";
/// Environment variable toggling the trace hook.
pub const TRACE_ENV: &str = "PARFOLD_TRACE";

/// Configuration for a single pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of mapper workers. Zero is treated as one.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Log every emit, insert and merge event.
    #[serde(default)]
    pub trace: bool,
}

fn default_workers() -> usize {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            trace: false,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from a TOML document.
    ///
    /// Missing fields take their defaults:
    ///
    /// ```
    /// use parfold::PipelineConfig;
    ///
    /// let config = PipelineConfig::from_toml_str("workers = 4").unwrap();
    /// assert_eq!(config.workers, 4);
    /// assert!(!config.trace);
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(source)?;
        Ok(config)
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `PARFOLD_WORKERS` and `PARFOLD_TRACE` on top of this configuration.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(WORKERS_ENV) {
            self.workers = raw.trim().parse().map_err(|_| {
                PipelineError::Config(format!(
                    "{WORKERS_ENV} must be a non-negative integer, got {raw:?}"
                ))
            })?;
        }
        if let Some(raw) = lookup(TRACE_ENV) {
            self.trace = parse_flag(&raw).ok_or_else(|| {
                PipelineError::Config(format!("{TRACE_ENV} must be a boolean, got {raw:?}"))
            })?;
        }
        Ok(self)
    }

    /// Copy of this configuration with a zero worker count coerced to one.
    pub fn normalized(&self) -> Self {
        Self {
            workers: self.workers.max(1),
            trace: self.trace,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
