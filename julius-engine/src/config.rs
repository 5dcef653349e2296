//! Engine configuration
//!
//! Tunable constants for every pipeline stage, read from the same TOML file as
//! the shared [`TomlConfig`]. Each stage section is optional; absent keys fall
//! back to the compiled defaults below.
//!
//! ```toml
//! output_dir = "/srv/julius/reports"
//!
//! [shrinkage]
//! n0 = 50.0
//!
//! [harmonizer.campaign_aliases]
//! "Diwali Sale 2025" = "diwali_sale_2025"
//! ```

use crate::error::{EngineError, EngineResult};
use julius_common::config::{load_toml_config, TomlConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Bounds applied by the quality validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub max_spend: f64,
    pub max_ctr_points: f64,
    pub max_cpm: f64,
    pub max_session_duration_secs: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_spend: 1_000_000.0,
            max_ctr_points: 100.0,
            max_cpm: 100_000.0,
            max_session_duration_secs: 86_400.0,
        }
    }
}

/// Session flag thresholds and campaign alias rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonizerConfig {
    /// Sessions at least this long (seconds) count as long sessions
    pub long_session_secs: f64,
    /// Sessions with at least this many pageviews count as deep views
    pub deep_view_pageviews: f64,
    /// Substring marking an unexpanded UTM template
    pub template_marker: String,
    /// Exact (trimmed) campaign name → canonical name
    pub campaign_aliases: BTreeMap<String, String>,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        Self {
            long_session_secs: 60.0,
            deep_view_pageviews: 5.0,
            template_marker: "{{".to_string(),
            campaign_aliases: BTreeMap::new(),
        }
    }
}

/// Empirical Bayes parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShrinkageConfig {
    /// Prior pseudo-count
    pub n0: f64,
    /// Minimum |shrunk − observed| for a row to be flagged as shrunk
    pub applied_epsilon: f64,
    pub meta_ctr_prior: f64,
    pub google_ctr_prior: f64,
    pub meta_conversion_prior: f64,
    pub google_conversion_prior: f64,
}

impl Default for ShrinkageConfig {
    fn default() -> Self {
        Self {
            n0: 50.0,
            applied_epsilon: 0.001,
            meta_ctr_prior: 0.009,
            google_ctr_prior: 0.035,
            meta_conversion_prior: 0.015,
            google_conversion_prior: 0.025,
        }
    }
}

/// Scoring weights, reference costs and recommendation thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Cost per order scoring 0.5 efficiency
    pub reference_cpo: f64,
    /// Cost per click scoring 0.5 efficiency (used when there are no orders)
    pub reference_cpc: f64,
    pub ctr_weight: f64,
    pub cvr_weight: f64,
    pub ctr_ceiling: f64,
    pub cvr_ceiling: f64,
    pub full_volume_impressions: f64,
    pub full_volume_sessions: f64,
    pub efficiency_weight: f64,
    pub quality_weight: f64,
    pub volume_weight: f64,
    pub scale_threshold: f64,
    pub test_to_scale_threshold: f64,
    pub optimize_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            reference_cpo: 1500.0,
            reference_cpc: 15.0,
            ctr_weight: 0.5,
            cvr_weight: 0.5,
            ctr_ceiling: 0.02,
            cvr_ceiling: 0.05,
            full_volume_impressions: 100_000.0,
            full_volume_sessions: 1_000.0,
            efficiency_weight: 0.4,
            quality_weight: 0.4,
            volume_weight: 0.2,
            scale_threshold: 0.90,
            test_to_scale_threshold: 0.80,
            optimize_threshold: 0.70,
        }
    }
}

/// Progress event settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum interval between non-milestone events (0 = no throttling)
    pub throttle_interval_ms: u64,
    /// Broadcast channel capacity
    pub event_capacity: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            throttle_interval_ms: 0,
            event_capacity: 256,
        }
    }
}

/// All engine tunables, passed explicitly into the pipeline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub validator: ValidatorConfig,
    pub harmonizer: HarmonizerConfig,
    pub shrinkage: ShrinkageConfig,
    pub scoring: ScoringConfig,
    pub progress: ProgressConfig,
}

const WEIGHT_TOLERANCE: f64 = 1e-6;

impl EngineConfig {
    /// Reject values that would make scores or bounds meaningless
    ///
    /// # Errors
    /// `EngineError::Config` describing the first offending value
    pub fn validate(&self) -> EngineResult<()> {
        let v = &self.validator;
        for (name, value) in [
            ("validator.max_spend", v.max_spend),
            ("validator.max_ctr_points", v.max_ctr_points),
            ("validator.max_cpm", v.max_cpm),
            ("validator.max_session_duration_secs", v.max_session_duration_secs),
        ] {
            require_positive(name, value)?;
        }

        if !(self.shrinkage.n0.is_finite() && self.shrinkage.n0 >= 0.0) {
            return Err(EngineError::Config(format!(
                "shrinkage.n0 must be a non-negative number, got {}",
                self.shrinkage.n0
            )));
        }

        let s = &self.scoring;
        for (name, value) in [
            ("scoring.reference_cpo", s.reference_cpo),
            ("scoring.reference_cpc", s.reference_cpc),
            ("scoring.ctr_ceiling", s.ctr_ceiling),
            ("scoring.cvr_ceiling", s.cvr_ceiling),
            ("scoring.full_volume_impressions", s.full_volume_impressions),
            ("scoring.full_volume_sessions", s.full_volume_sessions),
        ] {
            require_positive(name, value)?;
        }

        require_unit_sum("scoring quality weights", &[s.ctr_weight, s.cvr_weight])?;
        require_unit_sum(
            "scoring overall weights",
            &[s.efficiency_weight, s.quality_weight, s.volume_weight],
        )?;

        if !(s.scale_threshold >= s.test_to_scale_threshold
            && s.test_to_scale_threshold >= s.optimize_threshold)
        {
            return Err(EngineError::Config(format!(
                "recommendation thresholds must be descending (scale {} >= test-to-scale {} >= optimize {})",
                s.scale_threshold, s.test_to_scale_threshold, s.optimize_threshold
            )));
        }

        if self.progress.event_capacity == 0 {
            return Err(EngineError::Config(
                "progress.event_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn require_positive(name: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::Config(format!(
            "{} must be a positive number, got {}",
            name, value
        )))
    }
}

fn require_unit_sum(name: &str, weights: &[f64]) -> EngineResult<()> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(EngineError::Config(format!(
            "{} must be non-negative, got {:?}",
            name, weights
        )));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(EngineError::Config(format!(
            "{} must sum to 1.0, got {}",
            name, sum
        )));
    }
    Ok(())
}

/// Load shared and engine configuration from one TOML file
///
/// A missing or unparseable file yields defaults (with a log line); a file
/// that parses but fails [`EngineConfig::validate`] is an error.
pub fn load_engine_config(path: &Path) -> EngineResult<(TomlConfig, EngineConfig)> {
    let toml_config = load_toml_config(path)?;

    let engine_config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        match toml::from_str::<EngineConfig>(&content) {
            Ok(config) => {
                debug!("Loaded engine sections from {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Engine sections in {} could not be parsed ({}), using defaults",
                    path.display(),
                    e
                );
                EngineConfig::default()
            }
        }
    } else {
        EngineConfig::default()
    };

    engine_config.validate()?;

    info!(
        n0 = engine_config.shrinkage.n0,
        aliases = engine_config.harmonizer.campaign_aliases.len(),
        "Engine configuration ready"
    );

    Ok((toml_config, engine_config))
}
