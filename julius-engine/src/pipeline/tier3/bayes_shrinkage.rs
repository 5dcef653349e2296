// Tier 3: Empirical Bayes Shrinkage
//
// Concept: Stabilise noisy rate metrics from small samples
// Synchronization: Accepts &[T: PerformanceSample], outputs Vec<ShrinkageResult>
//
// shrunk = (n·observed + n0·prior) / (n + n0), with n floored at 1
//
// - CTR: n = impressions
// - Conversion rate (orders / sessions): n = sessions
//
// Priors are the plain mean of the metric over every row of the same source
// whose observed value is defined, whatever its sample size. CTR is defined
// whenever the reported value is finite; conversion rate is undefined (0/0)
// for a row without sessions. A source with no defined row falls back to its
// configured prior. Observed values are kept next to the shrunk ones, never
// overwritten.

use crate::config::ShrinkageConfig;
use crate::pipeline::tier2::business_metrics::safe_div;
use crate::pipeline::types::{PerformanceSample, ShrinkageResult, Source};
use serde::Serialize;
use tracing::debug;

/// Shrink `observed` toward `prior` with pseudo-count `n0`
pub fn shrink(observed: f64, n: f64, n0: f64, prior: f64) -> f64 {
    let n = if n.is_finite() { n.max(1.0) } else { 1.0 };
    safe_div(n * observed + n0 * prior, n + n0)
}

/// Per-source priors for one batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourcePriors {
    pub ctr: f64,
    pub conversion_rate: f64,
}

/// Priors for both ad sources
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchPriors {
    pub meta: SourcePriors,
    pub google: SourcePriors,
}

impl BatchPriors {
    pub fn for_source(&self, source: Source) -> SourcePriors {
        match source {
            Source::Meta => self.meta,
            Source::Google => self.google,
        }
    }
}

/// Observed CTR (None when not a finite number) and its sample size
fn ctr_observation<T: PerformanceSample>(sample: &T) -> (Option<f64>, f64) {
    let ad = sample.ad_metrics();
    (Some(ad.ctr_decimal).filter(|v| v.is_finite()), ad.impressions)
}

/// Observed conversion rate (None without sessions) and its sample size
fn conversion_observation<T: PerformanceSample>(sample: &T) -> (Option<f64>, f64) {
    let shopify = sample.shopify();
    let rate = (shopify.sessions > 0.0).then(|| safe_div(shopify.orders(), shopify.sessions));
    (rate, shopify.sessions)
}

/// Empirical Bayes shrinkage (Tier 3 concept)
pub struct BayesShrinkage {
    config: ShrinkageConfig,
}

impl Default for BayesShrinkage {
    fn default() -> Self {
        Self::new(ShrinkageConfig::default())
    }
}

impl BayesShrinkage {
    pub fn new(config: ShrinkageConfig) -> Self {
        Self { config }
    }

    /// Compute per-source priors over `samples`
    pub fn compute_priors<T: PerformanceSample>(&self, samples: &[T]) -> BatchPriors {
        let c = &self.config;
        BatchPriors {
            meta: SourcePriors {
                ctr: mean_prior(samples, Source::Meta, ctr_observation, c.meta_ctr_prior),
                conversion_rate: mean_prior(
                    samples,
                    Source::Meta,
                    conversion_observation,
                    c.meta_conversion_prior,
                ),
            },
            google: SourcePriors {
                ctr: mean_prior(samples, Source::Google, ctr_observation, c.google_ctr_prior),
                conversion_rate: mean_prior(
                    samples,
                    Source::Google,
                    conversion_observation,
                    c.google_conversion_prior,
                ),
            },
        }
    }

    /// Shrink every sample's CTR and conversion rate toward this batch's priors
    pub fn apply<T: PerformanceSample>(&self, samples: &[T]) -> Vec<ShrinkageResult> {
        let priors = self.compute_priors(samples);
        debug!(
            meta_ctr = priors.meta.ctr,
            meta_cvr = priors.meta.conversion_rate,
            google_ctr = priors.google.ctr,
            google_cvr = priors.google.conversion_rate,
            n0 = self.config.n0,
            "Shrinkage priors"
        );

        samples
            .iter()
            .map(|sample| self.shrink_sample(sample, priors.for_source(sample.source())))
            .collect()
    }

    fn shrink_sample<T: PerformanceSample>(&self, sample: &T, priors: SourcePriors) -> ShrinkageResult {
        let (ctr_observed, impressions) = ctr_observation(sample);
        let (cvr_observed, sessions) = conversion_observation(sample);
        let ctr_observed = ctr_observed.unwrap_or(0.0);
        let cvr_observed = cvr_observed.unwrap_or(0.0);
        let ctr_shrunk = shrink(ctr_observed, impressions, self.config.n0, priors.ctr);
        let cvr_shrunk = shrink(cvr_observed, sessions, self.config.n0, priors.conversion_rate);

        ShrinkageResult {
            ctr_observed,
            ctr_prior: priors.ctr,
            ctr_shrunk,
            ctr_shrinkage_applied: (ctr_shrunk - ctr_observed).abs() > self.config.applied_epsilon,
            conversion_rate_observed: cvr_observed,
            conversion_prior: priors.conversion_rate,
            conversion_rate_shrunk: cvr_shrunk,
            conversion_shrinkage_applied: (cvr_shrunk - cvr_observed).abs()
                > self.config.applied_epsilon,
        }
    }
}

fn mean_prior<T, F>(samples: &[T], source: Source, observe: F, fallback: f64) -> f64
where
    T: PerformanceSample,
    F: Fn(&T) -> (Option<f64>, f64),
{
    let (sum, count) = samples
        .iter()
        .filter(|s| s.source() == source)
        .filter_map(|s| observe(s).0)
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        fallback
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{AdMetrics, ShopifyAggregate, UnifiedAttributionRow};

    fn row(source: Source, ctr: f64, impressions: f64, orders: f64, sessions: f64) -> UnifiedAttributionRow {
        UnifiedAttributionRow {
            source,
            day: "2025-09-29".into(),
            campaign_name: "C".into(),
            ad_set_name: String::new(),
            ad_name: String::new(),
            ad_set_delivery: String::new(),
            ad: AdMetrics {
                ctr_decimal: ctr,
                impressions,
                ..Default::default()
            },
            shopify: ShopifyAggregate {
                sessions,
                completed_checkout: orders,
                ..Default::default()
            },
            matched: sessions > 0.0,
        }
    }

    #[test]
    fn test_shrink_formula() {
        // (100·0.05 + 50·0.02) / 150 = 0.04
        assert!((shrink(0.05, 100.0, 50.0, 0.02) - 0.04).abs() < 1e-12);
        // n floored at 1
        assert!((shrink(1.0, 0.0, 50.0, 0.0) - 1.0 / 51.0).abs() < 1e-12);
    }

    #[test]
    fn test_shrunk_lies_between_observed_and_prior() {
        for (observed, n, prior) in [
            (0.10, 10.0, 0.01),
            (0.001, 5000.0, 0.03),
            (0.0, 1.0, 0.02),
            (0.5, 0.0, 0.5),
        ] {
            let shrunk = shrink(observed, n, 50.0, prior);
            let lo = observed.min(prior);
            let hi = observed.max(prior);
            assert!(shrunk >= lo - 1e-12 && shrunk <= hi + 1e-12);
        }
    }

    #[test]
    fn test_large_sample_barely_moves() {
        let shrunk = shrink(0.02, 1_000_000.0, 50.0, 0.5);
        assert!((shrunk - 0.02).abs() < 0.001);
    }

    #[test]
    fn test_priors_per_source_with_fallback() {
        let rows = vec![
            row(Source::Meta, 0.01, 1000.0, 1.0, 100.0),
            row(Source::Meta, 0.03, 1000.0, 3.0, 100.0),
            // no sessions: conversion rate undefined, kept out of that prior
            row(Source::Meta, 0.05, 0.0, 0.0, 0.0),
        ];

        let priors = BayesShrinkage::default().compute_priors(&rows);
        assert!((priors.meta.ctr - 0.03).abs() < 1e-12);
        assert!((priors.meta.conversion_rate - 0.02).abs() < 1e-12);
        assert_eq!(priors.google.ctr, 0.035);
        assert_eq!(priors.google.conversion_rate, 0.025);
    }

    #[test]
    fn test_observed_kept_and_applied_flag() {
        let rows = vec![
            row(Source::Meta, 0.10, 10.0, 0.0, 0.0),
            row(Source::Meta, 0.01, 10_000.0, 0.0, 0.0),
        ];

        let results = BayesShrinkage::default().apply(&rows);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].ctr_observed, 0.10);
        assert!(results[0].ctr_shrinkage_applied);
        assert!(results[0].ctr_shrunk < 0.10);
        // No sessions anywhere: conversion prior falls back to 0.015
        assert_eq!(results[0].conversion_prior, 0.015);
        assert_eq!(results[0].conversion_rate_observed, 0.0);
    }

    #[test]
    fn test_zero_impression_rows_feed_the_ctr_prior() {
        let rows = vec![
            row(Source::Meta, 0.02, 0.0, 0.0, 0.0),
            row(Source::Meta, 0.04, 0.0, 0.0, 0.0),
        ];

        let shrinkage = BayesShrinkage::default();
        let priors = shrinkage.compute_priors(&rows);
        assert!((priors.meta.ctr - 0.03).abs() < 1e-12);

        let results = shrinkage.apply(&rows);
        assert!((results[0].ctr_prior - 0.03).abs() < 1e-12);
        // n floored at 1: (0.02 + 50·0.03) / 51
        assert!((results[0].ctr_shrunk - 1.52 / 51.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_ctr_skipped_in_prior() {
        let rows = vec![
            row(Source::Google, f64::NAN, 500.0, 0.0, 0.0),
            row(Source::Google, 0.05, 500.0, 0.0, 0.0),
        ];

        let priors = BayesShrinkage::default().compute_priors(&rows);
        assert!((priors.google.ctr - 0.05).abs() < 1e-12);
    }
}
