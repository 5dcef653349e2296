// Tier 3: Scorer
//
// Concept: Turn business metrics and shrunk rates into scores and an action
// Synchronization: Accepts (PerformanceSample, BusinessMetrics, ShrinkageResult), outputs Scores
//
// Component scores, each clamped to [0, 1]:
// - Efficiency: 1 − cost / (2 · reference), 0.5 at the reference cost.
//   Cost per order when there are orders, else cost per click, else 0.
// - Quality: weighted CTR and conversion rate against ceilings, SHRUNK values
// - Volume: the larger of impressions and sessions against full-volume levels
//
// Overall is the weighted sum; the recommendation is a threshold lookup.

use crate::config::ScoringConfig;
use crate::pipeline::tier2::business_metrics::{safe_div, BusinessMetrics};
use crate::pipeline::types::{
    PerformanceSample, Recommendation, Scores, ShrinkageResult, UnifiedAttributionRow,
};
use serde::Serialize;

/// A unified row with everything derived from it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRow {
    #[serde(flatten)]
    pub row: UnifiedAttributionRow,
    pub metrics: BusinessMetrics,
    pub shrinkage: ShrinkageResult,
    pub scores: Scores,
}

/// Scorer (Tier 3 concept)
pub struct Scorer {
    config: ScoringConfig,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score one sample
    pub fn score<T: PerformanceSample + ?Sized>(
        &self,
        sample: &T,
        metrics: &BusinessMetrics,
        shrinkage: &ShrinkageResult,
    ) -> Scores {
        let c = &self.config;

        let efficiency = self.efficiency(sample, metrics);

        let quality = c.ctr_weight * unit_ratio(shrinkage.ctr_shrunk, c.ctr_ceiling)
            + c.cvr_weight * unit_ratio(shrinkage.conversion_rate_shrunk, c.cvr_ceiling);

        let volume = unit_ratio(sample.ad_metrics().impressions, c.full_volume_impressions)
            .max(unit_ratio(sample.shopify().sessions, c.full_volume_sessions));

        let overall = clamp_unit(
            c.efficiency_weight * efficiency + c.quality_weight * quality + c.volume_weight * volume,
        );

        Scores {
            efficiency,
            quality: clamp_unit(quality),
            volume,
            overall,
            recommendation: self.recommend(overall),
        }
    }

    /// Threshold lookup on the overall score
    pub fn recommend(&self, overall: f64) -> Recommendation {
        let c = &self.config;
        if overall >= c.scale_threshold {
            Recommendation::Scale
        } else if overall >= c.test_to_scale_threshold {
            Recommendation::TestToScale
        } else if overall >= c.optimize_threshold {
            Recommendation::Optimize
        } else {
            Recommendation::PauseFix
        }
    }

    /// Score unified rows, consuming them
    ///
    /// `metrics` and `shrinkage` must be parallel to `rows`.
    pub fn score_rows(
        &self,
        rows: Vec<UnifiedAttributionRow>,
        metrics: Vec<BusinessMetrics>,
        shrinkage: Vec<ShrinkageResult>,
    ) -> Vec<ScoredRow> {
        rows.into_iter()
            .zip(metrics)
            .zip(shrinkage)
            .map(|((row, metrics), shrinkage)| {
                let scores = self.score(&row, &metrics, &shrinkage);
                ScoredRow {
                    row,
                    metrics,
                    shrinkage,
                    scores,
                }
            })
            .collect()
    }

    fn efficiency<T: PerformanceSample + ?Sized>(&self, sample: &T, metrics: &BusinessMetrics) -> f64 {
        let c = &self.config;
        if sample.shopify().orders() > 0.0 {
            cost_efficiency(metrics.cost_per_order, c.reference_cpo)
        } else if sample.ad_metrics().effective_clicks() > 0.0 {
            cost_efficiency(metrics.cost_per_click, c.reference_cpc)
        } else {
            0.0
        }
    }
}

fn cost_efficiency(cost: f64, reference: f64) -> f64 {
    clamp_unit(1.0 - safe_div(cost, 2.0 * reference))
}

fn unit_ratio(value: f64, ceiling: f64) -> f64 {
    clamp_unit(safe_div(value, ceiling))
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{AdMetrics, ShopifyAggregate, Source};

    fn sample(spend: f64, impressions: f64, clicks: f64, sessions: f64, orders: f64) -> UnifiedAttributionRow {
        UnifiedAttributionRow {
            source: Source::Meta,
            day: "2025-09-29".into(),
            campaign_name: "C1".into(),
            ad_set_name: "A1".into(),
            ad_name: "Ad1".into(),
            ad_set_delivery: String::new(),
            ad: AdMetrics {
                amount_spent_inr: spend,
                impressions,
                clicks,
                ..Default::default()
            },
            shopify: ShopifyAggregate {
                visitors: sessions,
                sessions,
                completed_checkout: orders,
                ..Default::default()
            },
            matched: true,
        }
    }

    #[test]
    fn test_efficiency_half_at_reference_cpo() {
        let row = sample(3000.0, 0.0, 0.0, 100.0, 2.0);
        let metrics = BusinessMetrics::for_sample(&row);
        let scores = Scorer::default().score(&row, &metrics, &ShrinkageResult::default());
        assert!((scores.efficiency - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_efficiency_falls_back_to_cpc_then_zero() {
        let scorer = Scorer::default();

        // 150 / 20 clicks = 7.5 CPC → 1 − 7.5/30 = 0.75
        let row = sample(150.0, 1000.0, 20.0, 0.0, 0.0);
        let scores = scorer.score(&row, &BusinessMetrics::for_sample(&row), &ShrinkageResult::default());
        assert!((scores.efficiency - 0.75).abs() < 1e-12);

        let row = sample(150.0, 0.0, 0.0, 0.0, 0.0);
        let scores = scorer.score(&row, &BusinessMetrics::for_sample(&row), &ShrinkageResult::default());
        assert_eq!(scores.efficiency, 0.0);
    }

    #[test]
    fn test_quality_reads_shrunk_rates() {
        let row = sample(0.0, 0.0, 0.0, 0.0, 0.0);
        let shrinkage = ShrinkageResult {
            ctr_observed: 0.5,
            ctr_shrunk: 0.01,
            conversion_rate_observed: 0.9,
            conversion_rate_shrunk: 0.05,
            ..Default::default()
        };
        let scores = Scorer::default().score(&row, &BusinessMetrics::default(), &shrinkage);
        // 0.5·(0.01/0.02) + 0.5·min(0.05/0.05, 1) = 0.75
        assert!((scores.quality - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_volume_takes_larger_component() {
        let row = sample(0.0, 50_000.0, 0.0, 800.0, 0.0);
        let scores = Scorer::default().score(&row, &BusinessMetrics::default(), &ShrinkageResult::default());
        assert!((scores.volume - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_scores_in_unit_interval() {
        let scorer = Scorer::default();
        for row in [
            sample(0.0, 0.0, 0.0, 0.0, 0.0),
            sample(1e9, 1e9, 1.0, 1e9, 1.0),
            sample(1.0, 1e9, 1e9, 1e9, 1e9),
        ] {
            let metrics = BusinessMetrics::for_sample(&row);
            let shrinkage = ShrinkageResult {
                ctr_shrunk: 3.0,
                conversion_rate_shrunk: 3.0,
                ..Default::default()
            };
            let s = scorer.score(&row, &metrics, &shrinkage);
            for value in [s.efficiency, s.quality, s.volume, s.overall] {
                assert!((0.0..=1.0).contains(&value));
            }
        }
    }

    #[test]
    fn test_recommendation_thresholds() {
        let scorer = Scorer::default();
        assert_eq!(scorer.recommend(0.95), Recommendation::Scale);
        assert_eq!(scorer.recommend(0.90), Recommendation::Scale);
        assert_eq!(scorer.recommend(0.85), Recommendation::TestToScale);
        assert_eq!(scorer.recommend(0.70), Recommendation::Optimize);
        assert_eq!(scorer.recommend(0.69), Recommendation::PauseFix);
    }
}
