// Tier 2: Business Metrics Calculator
//
// Concept: Derive cost-per and rate metrics from ad spend and Shopify sessions
// Synchronization: Accepts any PerformanceSample, outputs BusinessMetrics
//
// Every ratio goes through `safe_div`: a zero or non-finite denominator yields
// 0.0, so no metric is ever NaN or infinite.
//
// "Per user" and rate denominators are Shopify sessions (which fall back to
// visitors when an export has no sessions column). Visitors are only reported
// as the Users count.

use crate::pipeline::types::{AdMetrics, PerformanceSample, ShopifyAggregate};
use serde::Serialize;

/// Division that returns 0.0 instead of NaN or infinity
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return 0.0;
    }
    let result = numerator / denominator;
    if result.is_finite() {
        result
    } else {
        0.0
    }
}

/// Derived business metrics for one row or group
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BusinessMetrics {
    pub spend: f64,
    pub cost_per_user: f64,
    pub cost_per_session: f64,
    pub cost_per_add_to_cart: f64,
    pub cost_per_checkout: f64,
    pub cost_per_order: f64,
    pub cost_per_good_lead: f64,
    pub cost_per_long_session: f64,
    pub cost_per_deep_view: f64,
    pub cost_per_click: f64,
    pub good_lead_rate: f64,
    pub conversion_rate: f64,
    pub avg_session_duration_secs: f64,
    /// Shopify revenue / spend, only when both are positive
    pub roas: Option<f64>,
}

impl BusinessMetrics {
    pub fn compute(spend: f64, shopify: &ShopifyAggregate, ad: &AdMetrics) -> Self {
        let roas = if shopify.total_sales > 0.0 && spend > 0.0 {
            Some(safe_div(shopify.total_sales, spend))
        } else {
            None
        };

        Self {
            spend,
            cost_per_user: safe_div(spend, shopify.sessions),
            cost_per_session: safe_div(spend, shopify.sessions),
            cost_per_add_to_cart: safe_div(spend, shopify.add_to_cart),
            cost_per_checkout: safe_div(spend, shopify.reached_checkout),
            cost_per_order: safe_div(spend, shopify.orders()),
            cost_per_good_lead: safe_div(spend, shopify.good_lead_visitors),
            cost_per_long_session: safe_div(spend, shopify.long_session_visitors),
            cost_per_deep_view: safe_div(spend, shopify.deep_view_visitors),
            cost_per_click: safe_div(spend, ad.effective_clicks()),
            good_lead_rate: safe_div(shopify.good_lead_visitors, shopify.sessions),
            conversion_rate: safe_div(shopify.orders(), shopify.sessions),
            avg_session_duration_secs: safe_div(shopify.duration_weighted_secs, shopify.sessions),
            roas,
        }
    }

    /// Metrics for a row or grouped aggregate
    pub fn for_sample<T: PerformanceSample + ?Sized>(sample: &T) -> Self {
        let ad = sample.ad_metrics();
        Self::compute(ad.amount_spent_inr, sample.shopify(), ad)
    }

    /// Metrics for many samples, in input order
    pub fn for_all<T: PerformanceSample>(samples: &[T]) -> Vec<Self> {
        samples.iter().map(Self::for_sample).collect()
    }
}
