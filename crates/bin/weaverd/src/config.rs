//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `weaver.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use weaver_domain::operation::Reversibility;
use weaver_domain::zone::Zone;
use weaver_engine::compiler::{CompilerConfig, ReversibilityTable};
use weaver_engine::orchestrator::OrchestratorConfig;
use weaver_engine::safety::SafetyGateConfig;
use weaver_engine::scheduler::SchedulerConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compiler and scheduler settings.
    pub engine: EngineConfig,
    /// Safety gate settings.
    pub safety: SafetyConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Zone layout.
    pub zones: Vec<ZoneConfig>,
    /// Overrides for the action reversibility table.
    pub reversibility: ReversibilityConfig,
}

/// Compiler and scheduler settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest candidate set accepted for one plan.
    pub max_steps: usize,
    /// Device invocation attempts granted per step.
    pub retry_budget: u32,
    /// Steps allowed in flight simultaneously.
    pub concurrency: usize,
    /// Per-attempt device timeout in milliseconds.
    pub step_timeout_ms: u64,
    /// First retry backoff in milliseconds; doubles per attempt.
    pub backoff_base_ms: u64,
    /// Standard deviations a numeric observation may stray from its
    /// per-context mean before it is flagged (informational only).
    pub anomaly_sigma: f64,
}

/// Safety gate settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Whether irreversible steps require confirmation by default.
    pub enabled: bool,
    /// Wall-clock budget per step when deriving plan deadlines, in
    /// milliseconds.
    pub per_step_budget_ms: u64,
    /// Upper bound on a plan deadline, in milliseconds.
    pub max_deadline_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// One zone in the layout.
#[derive(Debug, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// Additions to the built-in reversibility table.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReversibilityConfig {
    /// Actions to classify reversible.
    pub reversible: Vec<String>,
    /// Actions to classify irreversible.
    pub irreversible: Vec<String>,
}

impl Config {
    /// Load configuration from `weaver.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// a value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("weaver.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("WEAVER_CONCURRENCY") {
            if let Ok(concurrency) = val.parse() {
                self.engine.concurrency = concurrency;
            }
        }
        if let Ok(val) = std::env::var("WEAVER_SAFETY") {
            self.safety.enabled = val != "0" && val != "false";
        }
        if let Ok(val) = std::env::var("WEAVER_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_steps == 0 {
            return Err(ConfigError::Validation(
                "engine.max_steps must be non-zero".to_string(),
            ));
        }
        if self.engine.retry_budget == 0 {
            return Err(ConfigError::Validation(
                "engine.retry_budget must be non-zero".to_string(),
            ));
        }
        if self.engine.concurrency == 0 {
            return Err(ConfigError::Validation(
                "engine.concurrency must be non-zero".to_string(),
            ));
        }
        if self.engine.anomaly_sigma <= 0.0 {
            return Err(ConfigError::Validation(
                "engine.anomaly_sigma must be positive".to_string(),
            ));
        }
        if self.safety.max_deadline_ms < self.safety.per_step_budget_ms {
            return Err(ConfigError::Validation(
                "safety.max_deadline_ms must be at least per_step_budget_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Assemble the engine-side configuration.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            compiler: CompilerConfig {
                max_steps: self.engine.max_steps,
                retry_budget: self.engine.retry_budget,
            },
            reversibility: self.reversibility_table(),
            safety: SafetyGateConfig {
                per_step_budget: Duration::from_millis(self.safety.per_step_budget_ms),
                max_deadline: Duration::from_millis(self.safety.max_deadline_ms),
            },
            scheduler: SchedulerConfig {
                concurrency: self.engine.concurrency,
                step_timeout: Duration::from_millis(self.engine.step_timeout_ms),
                backoff_base: Duration::from_millis(self.engine.backoff_base_ms),
            },
        }
    }

    fn reversibility_table(&self) -> ReversibilityTable {
        let mut table = ReversibilityTable::default();
        for action in &self.reversibility.reversible {
            table.insert(action.clone(), Reversibility::Reversible);
        }
        for action in &self.reversibility.irreversible {
            table.insert(action.clone(), Reversibility::Irreversible);
        }
        table
    }

    /// Build the configured zone layout.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zone without a name.
    pub fn build_zones(&self) -> Result<Vec<Zone>, ConfigError> {
        self.zones
            .iter()
            .map(|zone| {
                let mut builder = Zone::builder().name(&zone.name).priority(zone.priority);
                for entity in &zone.entities {
                    builder = builder.entity(entity.as_str());
                }
                builder
                    .build()
                    .map_err(|err| ConfigError::Validation(err.to_string()))
            })
            .collect()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            retry_budget: 3,
            concurrency: 4,
            step_timeout_ms: 5_000,
            backoff_base_ms: 250,
            anomaly_sigma: 3.0,
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_step_budget_ms: 10_000,
            max_deadline_ms: 120_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "weaverd=info,weaver=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
