//! Pipeline configuration.
//!
//! [`PipelineConfig`] is an immutable value built once at startup and
//! handed to each component that needs it. There is no global settings
//! object: tests and embedders construct whatever configuration they want.
//!
//! # Example Configuration File
//!
//! ```toml
//! [processing]
//! batch_size = 5
//! max_concurrent = 10
//!
//! [collector]
//! endpoint = "http://inventory.internal:8080"
//! timeout_ms = 30000
//!
//! [analyzer]
//! provider = "anthropic"
//! model = "claude-sonnet-4-5"
//!
//! [report]
//! output_dir = "./output"
//! default_format = "html"
//! ```
//!
//! # Environment Overrides
//!
//! Variables named `ARCHI_<SECTION>__<FIELD>` override file values, e.g.
//! `ARCHI_PROCESSING__BATCH_SIZE=8` or `ARCHI_ANALYZER__API_KEY=...`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analyzer::AnalyzerProvider;
use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_IDENTIFIERS,
    DEFAULT_RESULT_CACHE_CAPACITY, ENV_PREFIX,
};
use crate::error::ConfigError;
use crate::types::ReportFormat;

/// Top-level configuration, one section per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub processing: ProcessingConfig,
    pub collector: CollectorConfig,
    pub analyzer: AnalyzerConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

/// Batching, concurrency and task bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Identifiers per collection chunk.
    pub batch_size: usize,
    /// Collection lookups allowed in flight at once, across the whole batch.
    pub max_concurrent: usize,
    /// Whether submitted tasks are registered for polling by default.
    pub enable_progress_tracking: bool,
    /// Largest accepted submission.
    pub max_identifiers: usize,
    /// Finished results kept for `get_result`.
    pub result_cache_capacity: usize,
    /// Probe the gateway before collecting and fail fast if unhealthy.
    pub check_gateway_health: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            enable_progress_tracking: true,
            max_identifiers: DEFAULT_MAX_IDENTIFIERS,
            result_cache_capacity: DEFAULT_RESULT_CACHE_CAPACITY,
            check_gateway_health: false,
        }
    }
}

/// Collection gateway transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Base URL of the inventory service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
    /// Total attempts per lookup, including the first.
    pub retry_attempts: u32,
    /// Initial backoff; doubled after each failed attempt, capped at 10s.
    pub retry_delay_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 30_000,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl CollectorConfig {
    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Initial retry backoff.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Analyzer provider selection and model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub provider: AnalyzerProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Overrides the provider's default API base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            provider: AnalyzerProvider::OpenAi,
            api_key: None,
            base_url: None,
            model: "gpt-4".to_string(),
            temperature: 0.1,
            max_tokens: 4_000,
            timeout_ms: 60_000,
        }
    }
}

impl AnalyzerConfig {
    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Report sink settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub default_format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            default_format: ReportFormat::Markdown,
        }
    }
}

/// Log filter used when `RUST_LOG` is not set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// Missing sections and fields take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `ARCHI_<SECTION>__<FIELD>` overrides from the process
    /// environment, then re-validates.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(std::env::vars())
    }

    /// Applies overrides from an explicit list of `(name, value)` pairs.
    ///
    /// Names without the `ARCHI_` prefix are ignored, as are unknown
    /// section/field pairs.
    pub fn with_overrides<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(path) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let Some((section, field)) = path.split_once("__") else {
                continue;
            };
            let section = section.to_ascii_lowercase();
            let field = field.to_ascii_lowercase();
            self.apply_override(&section, &field, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    fn apply_override(
        &mut self,
        section: &str,
        field: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let name = format!("{section}.{field}");
        match (section, field) {
            ("processing", "batch_size") => self.processing.batch_size = parse(&name, value)?,
            ("processing", "max_concurrent") => {
                self.processing.max_concurrent = parse(&name, value)?
            },
            ("processing", "enable_progress_tracking") => {
                self.processing.enable_progress_tracking = parse(&name, value)?
            },
            ("processing", "max_identifiers") => {
                self.processing.max_identifiers = parse(&name, value)?
            },
            ("processing", "result_cache_capacity") => {
                self.processing.result_cache_capacity = parse(&name, value)?
            },
            ("processing", "check_gateway_health") => {
                self.processing.check_gateway_health = parse(&name, value)?
            },
            ("collector", "endpoint") => self.collector.endpoint = Some(value.to_string()),
            ("collector", "timeout_ms") => self.collector.timeout_ms = parse(&name, value)?,
            ("collector", "retry_attempts") => {
                self.collector.retry_attempts = parse(&name, value)?
            },
            ("collector", "retry_delay_ms") => {
                self.collector.retry_delay_ms = parse(&name, value)?
            },
            ("analyzer", "provider") => self.analyzer.provider = parse(&name, value)?,
            ("analyzer", "api_key") => self.analyzer.api_key = Some(value.to_string()),
            ("analyzer", "base_url") => self.analyzer.base_url = Some(value.to_string()),
            ("analyzer", "model") => self.analyzer.model = value.to_string(),
            ("analyzer", "temperature") => self.analyzer.temperature = parse(&name, value)?,
            ("analyzer", "max_tokens") => self.analyzer.max_tokens = parse(&name, value)?,
            ("analyzer", "timeout_ms") => self.analyzer.timeout_ms = parse(&name, value)?,
            ("report", "output_dir") => self.report.output_dir = PathBuf::from(value),
            ("report", "default_format") => self.report.default_format = parse(&name, value)?,
            ("logging", "level") => self.logging.level = value.to_string(),
            _ => tracing::debug!(variable = %name, "ignoring unknown configuration override"),
        }
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.batch_size == 0 {
            return Err(ConfigError::invalid("processing.batch_size", "must be greater than 0"));
        }
        if self.processing.max_concurrent == 0 {
            return Err(ConfigError::invalid(
                "processing.max_concurrent",
                "must be greater than 0",
            ));
        }
        if self.processing.max_identifiers == 0 {
            return Err(ConfigError::invalid(
                "processing.max_identifiers",
                "must be greater than 0",
            ));
        }
        if self.collector.timeout_ms == 0 {
            return Err(ConfigError::invalid("collector.timeout_ms", "must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&self.analyzer.temperature) {
            return Err(ConfigError::invalid(
                "analyzer.temperature",
                format!("{} is outside 0.0..=2.0", self.analyzer.temperature),
            ));
        }
        if self.analyzer.max_tokens == 0 {
            return Err(ConfigError::invalid("analyzer.max_tokens", "must be greater than 0"));
        }
        if self.analyzer.timeout_ms == 0 {
            return Err(ConfigError::invalid("analyzer.timeout_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

fn parse<T>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(field, format!("cannot parse {value:?}: {e}")))
}
