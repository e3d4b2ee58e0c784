//! Healing configuration
//!
//! Layered lowest to highest: [`HealingConfig::default`], a TOML or JSON
//! file, then `HEALING_*` environment variables. [`HealingConfig::validate`]
//! reports every problem at once.

use mender_strategy::{AiPoweredAnalysis, CssHierarchyAnalysis, DataTestIdRecovery, TextContentMatching};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Files looked for in the working directory, in order
pub const CONFIG_FILE_NAMES: &[&str] = &["mender.toml", "mender.json", ".menderrc.toml", ".menderrc.json"];

/// Built-in strategy names in priority order
pub const DEFAULT_STRATEGIES: &[&str] = &[
    DataTestIdRecovery::NAME,
    TextContentMatching::NAME,
    CssHierarchyAnalysis::NAME,
    AiPoweredAnalysis::NAME,
];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn env_value<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("invalid configuration: {}", .problems.join("; "))]
    Invalid { problems: Vec<String> },
}

/// Confidence thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Skip later strategies once a candidate reaches this
    pub short_circuit: f64,
    /// A heal counts as successful at or above this
    pub acceptance: f64,
    /// Approve proposed attempts automatically at or above this
    pub auto_approve: Option<f64>,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            short_circuit: 0.9,
            acceptance: 0.5,
            auto_approve: None,
        }
    }
}

/// ai-powered-analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub timeout_ms: u64,
    pub top_k: usize,
    pub min_score: f64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            top_k: 3,
            min_score: 0.5,
        }
    }
}

impl AiConfig {
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 8 }
    }
}

/// Healed-selector cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_capacity: 1024,
        }
    }
}

/// Flaky-selector detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlakinessConfig {
    pub min_observations: u64,
    pub lower_rate: f64,
    pub upper_rate: f64,
}

impl Default for FlakinessConfig {
    fn default() -> Self {
        Self {
            min_observations: 5,
            lower_rate: 0.3,
            upper_rate: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// Healing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    pub enabled: bool,
    /// Enabled strategy names; priority follows the registry, not this list
    pub strategies: Vec<String>,
    pub thresholds: ThresholdsConfig,
    pub ai: AiConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub flakiness: FlakinessConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategies: DEFAULT_STRATEGIES.iter().map(ToString::to_string).collect(),
            thresholds: ThresholdsConfig::default(),
            ai: AiConfig::default(),
            batch: BatchConfig::default(),
            cache: CacheConfig::default(),
            flakiness: FlakinessConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl HealingConfig {
    /// Defaults, then `path` (or the first config file found in the working
    /// directory), then the environment; validated
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or validation fails
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::current_dir().ok().and_then(|dir| Self::discover(&dir)),
        };
        let mut config = match file {
            Some(file) => Self::from_file(&file)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// First of [`CONFIG_FILE_NAMES`] present in `dir`
    #[must_use]
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Parse a `.toml` or `.json` file; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns error on I/O failure, parse failure or an unknown extension
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// # Errors
    /// Returns error if `content` is not valid TOML for this schema
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// # Errors
    /// Returns error if `content` is not valid JSON for this schema
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Overlay `HEALING_*` process environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay variables read through `lookup`
    ///
    /// Values that fail to parse are skipped with a warning.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env_value(&lookup, "HEALING_ENABLED") {
            self.enabled = v;
        }
        if let Some(raw) = lookup("HEALING_STRATEGIES") {
            self.strategies = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = env_value(&lookup, "HEALING_SHORT_CIRCUIT") {
            self.thresholds.short_circuit = v;
        }
        if let Some(v) = env_value(&lookup, "HEALING_ACCEPTANCE") {
            self.thresholds.acceptance = v;
        }
        if let Some(v) = env_value(&lookup, "HEALING_AUTO_APPROVE") {
            self.thresholds.auto_approve = Some(v);
        }
        if let Some(v) = env_value(&lookup, "HEALING_AI_TIMEOUT_MS") {
            self.ai.timeout_ms = v;
        }
        if let Some(v) = env_value(&lookup, "HEALING_AI_TOP_K") {
            self.ai.top_k = v;
        }
        if let Some(v) = env_value(&lookup, "HEALING_MAX_CONCURRENCY") {
            self.batch.max_concurrency = v;
        }
        if let Some(v) = env_value(&lookup, "HEALING_CACHE_ENABLED") {
            self.cache.enabled = v;
        }
        if let Some(v) = env_value(&lookup, "HEALING_CACHE_TTL_SECS") {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = lookup("HEALING_LOG_LEVEL") {
            self.telemetry.log_level = v.trim().to_lowercase();
        }
        if let Some(v) = env_value(&lookup, "HEALING_LOG_JSON") {
            self.telemetry.json = v;
        }
    }

    /// Check every constraint, collecting all violations
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] listing each problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let unit = |name: &str, value: f64, problems: &mut Vec<String>| {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!("{name} must be within [0, 1], got {value}"));
            }
        };

        for name in &self.strategies {
            if !DEFAULT_STRATEGIES.contains(&name.as_str()) {
                problems.push(format!("unknown strategy `{name}`"));
            }
        }
        unit("thresholds.short_circuit", self.thresholds.short_circuit, &mut problems);
        unit("thresholds.acceptance", self.thresholds.acceptance, &mut problems);
        if let Some(auto) = self.thresholds.auto_approve {
            unit("thresholds.auto_approve", auto, &mut problems);
        }
        unit("ai.min_score", self.ai.min_score, &mut problems);
        if self.thresholds.acceptance > self.thresholds.short_circuit {
            problems.push(format!(
                "thresholds.acceptance ({}) exceeds thresholds.short_circuit ({})",
                self.thresholds.acceptance, self.thresholds.short_circuit
            ));
        }
        if !(100..=120_000).contains(&self.ai.timeout_ms) {
            problems.push(format!("ai.timeout_ms must be within 100..=120000, got {}", self.ai.timeout_ms));
        }
        if self.ai.top_k == 0 {
            problems.push("ai.top_k must be at least 1".to_string());
        }
        if !(1..=256).contains(&self.batch.max_concurrency) {
            problems.push(format!(
                "batch.max_concurrency must be within 1..=256, got {}",
                self.batch.max_concurrency
            ));
        }
        if !(0.0..=1.0).contains(&self.flakiness.lower_rate)
            || !(0.0..=1.0).contains(&self.flakiness.upper_rate)
            || self.flakiness.lower_rate >= self.flakiness.upper_rate
        {
            problems.push("flakiness rates must satisfy 0 <= lower_rate < upper_rate <= 1".to_string());
        }
        if !LOG_LEVELS.contains(&self.telemetry.log_level.as_str()) {
            problems.push(format!("unknown log level `{}`", self.telemetry.log_level));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    #[inline]
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_strategies<I, S>(mut self, strategies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strategies = strategies.into_iter().map(Into::into).collect();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_short_circuit(mut self, threshold: f64) -> Self {
        self.thresholds.short_circuit = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_acceptance(mut self, threshold: f64) -> Self {
        self.thresholds.acceptance = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_auto_approve(mut self, threshold: Option<f64>) -> Self {
        self.thresholds.auto_approve = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_ai_timeout(mut self, timeout: Duration) -> Self {
        self.ai.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.batch.max_concurrency = max_concurrency;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache.enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = HealingConfig::default();
        config.validate().unwrap();
        assert_eq!(config.strategies.len(), 4);
        assert_eq!(config.ai.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = HealingConfig::from_toml_str(
            r#"
            [thresholds]
            short_circuit = 0.95

            [batch]
            max_concurrency = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.thresholds.short_circuit, 0.95);
        assert_eq!(config.thresholds.acceptance, 0.5);
        assert_eq!(config.batch.max_concurrency, 2);
        assert!(config.cache.enabled);
    }

    #[test]
    fn json_file_is_read() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, r#"{{"enabled": false, "ai": {{"top_k": 5}}}}"#).unwrap();

        let config = HealingConfig::from_file(file.path()).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.ai.top_k, 5);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = HealingConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HealingConfig::discover(dir.path()).is_none());

        std::fs::write(dir.path().join(".menderrc.json"), "{}").unwrap();
        std::fs::write(dir.path().join("mender.json"), "{}").unwrap();
        assert_eq!(HealingConfig::discover(dir.path()), Some(dir.path().join("mender.json")));
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("HEALING_ENABLED", "false"),
            ("HEALING_STRATEGIES", "data-testid-recovery, css-hierarchy-analysis"),
            ("HEALING_SHORT_CIRCUIT", "0.85"),
            ("HEALING_AUTO_APPROVE", "0.97"),
            ("HEALING_AI_TOP_K", "lots"),
            ("HEALING_LOG_LEVEL", "DEBUG"),
        ]
        .into_iter()
        .collect();

        let mut config = HealingConfig::default();
        config.apply_env_with(|key| env.get(key).map(ToString::to_string));

        assert!(!config.enabled);
        assert_eq!(config.strategies, vec!["data-testid-recovery", "css-hierarchy-analysis"]);
        assert_eq!(config.thresholds.short_circuit, 0.85);
        assert_eq!(config.thresholds.auto_approve, Some(0.97));
        // unparseable, left alone
        assert_eq!(config.ai.top_k, 3);
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn validation_reports_everything() {
        let config = HealingConfig::default()
            .with_strategies(["xpath-guessing"])
            .with_short_circuit(0.4)
            .with_acceptance(1.5)
            .with_max_concurrency(0)
            .with_ai_timeout(Duration::from_millis(10));

        let ConfigError::Invalid { problems } = config.validate().unwrap_err() else {
            panic!("expected validation failure");
        };
        assert_eq!(problems.len(), 5, "{problems:#?}");
        assert!(problems[0].contains("xpath-guessing"));
    }
}
