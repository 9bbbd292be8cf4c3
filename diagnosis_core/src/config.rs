//! Pipeline configuration.
//!
//! Every tuning constant (damping, half-life, thresholds, intervals) is a
//! config value; the defaults below are starting points, not product truth.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Configuration for the whole diagnosis pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extractor: ExtractorConfig,
    pub resolver: ResolverConfig,
    pub weakness: WeaknessConfig,
    pub scheduler: SchedulerConfig,
    pub assembler: AssemblerConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string. Missing keys take defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.extractor;
        if !(0.0..=1.0).contains(&e.fallback_confidence) {
            return Err(invalid("extractor.fallback_confidence", "must be within [0, 1]"));
        }
        if e.max_items == 0 {
            return Err(invalid("extractor.max_items", "must be at least 1"));
        }

        if self.resolver.max_label_chars == 0 {
            return Err(invalid("resolver.max_label_chars", "must be at least 1"));
        }
        if self.resolver.unsorted_root_name.trim().is_empty() {
            return Err(invalid("resolver.unsorted_root_name", "must not be empty"));
        }

        let w = &self.weakness;
        if !(w.weight_scale > 0.0 && w.weight_scale.is_finite()) {
            return Err(invalid("weakness.weight_scale", "must be positive"));
        }
        if !(w.damping > 0.0 && w.damping < 1.0) {
            return Err(invalid("weakness.damping", "must be within (0, 1)"));
        }
        if !(w.half_life_days > 0.0 && w.half_life_days.is_finite()) {
            return Err(invalid("weakness.half_life_days", "must be positive"));
        }

        let s = &self.scheduler;
        if !(s.medium_threshold >= 0.0 && s.high_threshold >= s.medium_threshold) {
            return Err(invalid(
                "scheduler.high_threshold",
                "thresholds must satisfy 0 <= medium <= high",
            ));
        }
        let intervals = [s.high_interval_days, s.medium_interval_days, s.low_interval_days];
        if intervals.iter().any(|d| !(*d > 0.0 && d.is_finite())) {
            return Err(invalid("scheduler.*_interval_days", "intervals must be positive"));
        }
        if !(s.high_interval_days <= s.medium_interval_days
            && s.medium_interval_days <= s.low_interval_days)
        {
            return Err(invalid(
                "scheduler.*_interval_days",
                "higher priority must not have a longer interval",
            ));
        }
        if !(s.backoff >= 1.0 && s.backoff.is_finite()) {
            return Err(invalid("scheduler.backoff", "must be at least 1"));
        }
        if s.max_interval_days < s.low_interval_days {
            return Err(invalid(
                "scheduler.max_interval_days",
                "must not be shorter than the low-priority interval",
            ));
        }

        if self.assembler.evidence_per_node == 0 {
            return Err(invalid("assembler.evidence_per_node", "must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Evidence extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Confidence assumed when the model output has none.
    pub fallback_confidence: f64,

    /// Maximum number of items kept per record.
    pub max_items: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            fallback_confidence: 0.5,
            max_items: 16,
        }
    }
}

/// Label resolution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Labels are truncated to this many characters after normalization.
    pub max_label_chars: usize,

    /// Regexes marking a label as a chapter name.
    pub chapter_patterns: Vec<String>,

    /// Display name of the per-subject synthetic root.
    pub unsorted_root_name: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_label_chars: 24,
            chapter_patterns: vec![
                r"^第.+[章节单元课]".to_string(),
                r"(?i)^(chapter|unit|lesson)\s*\d+".to_string(),
                r"[章节]$".to_string(),
            ],
            unsorted_root_name: "未归类".to_string(),
        }
    }
}

/// Weakness propagation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaknessConfig {
    /// `k` in `base_weight(confidence) = k * confidence`.
    pub weight_scale: f64,

    /// Fraction of an increment passed to each further ancestor level.
    pub damping: f64,

    /// Number of ancestor levels receiving a damped increment.
    pub propagation_depth: u32,

    /// Scores untouched for longer than this fade, halving once per further
    /// half-life.
    pub half_life_days: f64,
}

impl Default for WeaknessConfig {
    fn default() -> Self {
        Self {
            weight_scale: 1.0,
            damping: 0.5,
            propagation_depth: 2,
            half_life_days: 14.0,
        }
    }
}

impl WeaknessConfig {
    pub fn half_life(&self) -> Duration {
        days_to_duration(self.half_life_days)
    }
}

/// Review scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub high_interval_days: f64,
    pub medium_interval_days: f64,
    pub low_interval_days: f64,

    /// Interval multiplier applied per review without a new diagnosis.
    pub backoff: f64,

    /// Upper bound on any backed-off interval.
    pub max_interval_days: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            high_threshold: 1.5,
            medium_threshold: 0.75,
            high_interval_days: 1.0,
            medium_interval_days: 3.0,
            low_interval_days: 7.0,
            backoff: 2.0,
            max_interval_days: 60.0,
        }
    }
}

/// Graph assembly settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Maximum number of edges followed from the root.
    pub max_depth: u32,

    /// Evidence references kept per node, newest first.
    pub evidence_per_node: usize,

    /// Co-occurring nodes listed per node.
    pub related_per_node: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            evidence_per_node: 5,
            related_per_node: 6,
        }
    }
}

/// Convert fractional days to a chrono duration with second precision.
pub(crate) fn days_to_duration(days: f64) -> Duration {
    Duration::seconds((days * 86_400.0).round() as i64)
}
