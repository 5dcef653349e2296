// Tier 3: Output Builder
//
// Concept: Build the three report tables
// Synchronization: Accepts HarmonizedBatch + unified rows, outputs OutputTables
//
// (a) Daily top-level: one row per day (union of ad and Shopify days).
//     Ad figures come from harmonized ad rows with positive spend; Shopify
//     totals come from ALL harmonized sessions, templated ones included,
//     before any join.
// (b) Ad-set level: Meta unified rows grouped by (day, campaign, ad set, delivery)
// (c) Ad level: (b) further split by ad
//
// Grouped tables recompute shrinkage priors over the group batch and score
// each group like a unified row.

use crate::config::EngineConfig;
use crate::pipeline::tier2::business_metrics::{safe_div, BusinessMetrics};
use crate::pipeline::tier3::bayes_shrinkage::BayesShrinkage;
use crate::pipeline::tier3::scorer::Scorer;
use crate::pipeline::types::{
    spend_weighted, AdMetrics, HarmonizedBatch, PerformanceSample, Recommendation, Scores,
    ShopifyAggregate, ShrinkageResult, Source, UnifiedAttributionRow,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

// ============================================================================
// Output Rows
// ============================================================================

/// Daily top-level row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummaryRow {
    #[serde(rename = "Day")]
    pub day: String,
    #[serde(rename = "Meta Spend")]
    pub meta_spend: f64,
    #[serde(rename = "Meta Impressions")]
    pub meta_impressions: f64,
    #[serde(rename = "Meta CTR")]
    pub meta_ctr: f64,
    #[serde(rename = "Meta CPM")]
    pub meta_cpm: f64,
    #[serde(rename = "Google Spend")]
    pub google_spend: f64,
    #[serde(rename = "Google Impressions")]
    pub google_impressions: f64,
    #[serde(rename = "Google CTR")]
    pub google_ctr: f64,
    #[serde(rename = "Google CPM")]
    pub google_cpm: f64,
    #[serde(rename = "Total Spend")]
    pub total_spend: f64,
    #[serde(rename = "Users")]
    pub users: f64,
    #[serde(rename = "Sessions")]
    pub sessions: f64,
    #[serde(rename = "Add to Cart")]
    pub add_to_cart: f64,
    #[serde(rename = "Reached Checkout")]
    pub reached_checkout: f64,
    #[serde(rename = "Orders")]
    pub orders: f64,
    #[serde(rename = "Good Leads")]
    pub good_leads: f64,
    #[serde(rename = "Total Sales")]
    pub total_sales: f64,
    #[serde(rename = "Cost per User")]
    pub cost_per_user: f64,
    #[serde(rename = "Cost per Order")]
    pub cost_per_order: f64,
    #[serde(rename = "Good Lead Rate")]
    pub good_lead_rate: f64,
    #[serde(rename = "ROAS")]
    pub roas: Option<f64>,
}

/// Ad-set level row
///
/// Columns after the key are shared with [`AdRow`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdSetRow {
    #[serde(rename = "Day")]
    pub day: String,
    #[serde(rename = "Campaign")]
    pub campaign: String,
    #[serde(rename = "Ad Set")]
    pub ad_set: String,
    #[serde(rename = "Ad Set Delivery")]
    pub ad_set_delivery: String,
    #[serde(rename = "Spend")]
    pub spend: f64,
    #[serde(rename = "Impressions")]
    pub impressions: f64,
    #[serde(rename = "Users")]
    pub users: f64,
    #[serde(rename = "Sessions")]
    pub sessions: f64,
    #[serde(rename = "Add to Cart")]
    pub add_to_cart: f64,
    #[serde(rename = "Reached Checkout")]
    pub reached_checkout: f64,
    #[serde(rename = "Orders")]
    pub orders: f64,
    #[serde(rename = "Good Leads")]
    pub good_leads: f64,
    #[serde(rename = "Cost per User")]
    pub cost_per_user: f64,
    #[serde(rename = "Cost per Session")]
    pub cost_per_session: f64,
    #[serde(rename = "Cost per ATC")]
    pub cost_per_add_to_cart: f64,
    #[serde(rename = "Cost per Checkout")]
    pub cost_per_checkout: f64,
    #[serde(rename = "Cost per Order")]
    pub cost_per_order: f64,
    #[serde(rename = "Cost per Good Lead")]
    pub cost_per_good_lead: f64,
    #[serde(rename = "Good Lead Rate")]
    pub good_lead_rate: f64,
    #[serde(rename = "Conversion Rate")]
    pub conversion_rate: f64,
    #[serde(rename = "Conversion Rate Shrunk")]
    pub conversion_rate_shrunk: f64,
    #[serde(rename = "Avg Session Duration")]
    pub avg_session_duration_secs: f64,
    #[serde(rename = "Efficiency Score")]
    pub efficiency_score: f64,
    #[serde(rename = "Quality Score")]
    pub quality_score: f64,
    #[serde(rename = "Volume Score")]
    pub volume_score: f64,
    #[serde(rename = "Overall Score")]
    pub overall_score: f64,
    #[serde(rename = "Recommendation")]
    pub recommendation: Recommendation,
}

impl AdSetRow {
    fn new(
        group: &PerformanceGroup,
        metrics: &BusinessMetrics,
        shrinkage: &ShrinkageResult,
        scores: &Scores,
    ) -> Self {
        let shopify = &group.shopify;
        Self {
            day: group.day.clone(),
            campaign: group.campaign.clone(),
            ad_set: group.ad_set.clone(),
            ad_set_delivery: group.ad_set_delivery.clone(),
            spend: round_money(group.ad.amount_spent_inr),
            impressions: group.ad.impressions,
            users: shopify.visitors,
            sessions: shopify.sessions,
            add_to_cart: shopify.add_to_cart,
            reached_checkout: shopify.reached_checkout,
            orders: shopify.orders(),
            good_leads: shopify.good_lead_visitors,
            cost_per_user: round_money(metrics.cost_per_user),
            cost_per_session: round_money(metrics.cost_per_session),
            cost_per_add_to_cart: round_money(metrics.cost_per_add_to_cart),
            cost_per_checkout: round_money(metrics.cost_per_checkout),
            cost_per_order: round_money(metrics.cost_per_order),
            cost_per_good_lead: round_money(metrics.cost_per_good_lead),
            good_lead_rate: round_rate(metrics.good_lead_rate),
            conversion_rate: round_rate(metrics.conversion_rate),
            conversion_rate_shrunk: round_rate(shrinkage.conversion_rate_shrunk),
            avg_session_duration_secs: round_money(metrics.avg_session_duration_secs),
            efficiency_score: round_score(scores.efficiency),
            quality_score: round_score(scores.quality),
            volume_score: round_score(scores.volume),
            overall_score: round_score(scores.overall),
            recommendation: scores.recommendation,
        }
    }
}

/// Ad level row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdRow {
    #[serde(rename = "Day")]
    pub day: String,
    #[serde(rename = "Campaign")]
    pub campaign: String,
    #[serde(rename = "Ad Set")]
    pub ad_set: String,
    #[serde(rename = "Ad Set Delivery")]
    pub ad_set_delivery: String,
    #[serde(rename = "Ad")]
    pub ad: String,
    #[serde(rename = "CTR")]
    pub ctr: f64,
    #[serde(rename = "CTR Shrunk")]
    pub ctr_shrunk: f64,
    #[serde(rename = "Spend")]
    pub spend: f64,
    #[serde(rename = "Impressions")]
    pub impressions: f64,
    #[serde(rename = "Users")]
    pub users: f64,
    #[serde(rename = "Sessions")]
    pub sessions: f64,
    #[serde(rename = "Add to Cart")]
    pub add_to_cart: f64,
    #[serde(rename = "Reached Checkout")]
    pub reached_checkout: f64,
    #[serde(rename = "Orders")]
    pub orders: f64,
    #[serde(rename = "Good Leads")]
    pub good_leads: f64,
    #[serde(rename = "Cost per User")]
    pub cost_per_user: f64,
    #[serde(rename = "Cost per Session")]
    pub cost_per_session: f64,
    #[serde(rename = "Cost per ATC")]
    pub cost_per_add_to_cart: f64,
    #[serde(rename = "Cost per Checkout")]
    pub cost_per_checkout: f64,
    #[serde(rename = "Cost per Order")]
    pub cost_per_order: f64,
    #[serde(rename = "Cost per Good Lead")]
    pub cost_per_good_lead: f64,
    #[serde(rename = "Good Lead Rate")]
    pub good_lead_rate: f64,
    #[serde(rename = "Conversion Rate")]
    pub conversion_rate: f64,
    #[serde(rename = "Conversion Rate Shrunk")]
    pub conversion_rate_shrunk: f64,
    #[serde(rename = "Avg Session Duration")]
    pub avg_session_duration_secs: f64,
    #[serde(rename = "Efficiency Score")]
    pub efficiency_score: f64,
    #[serde(rename = "Quality Score")]
    pub quality_score: f64,
    #[serde(rename = "Volume Score")]
    pub volume_score: f64,
    #[serde(rename = "Overall Score")]
    pub overall_score: f64,
    #[serde(rename = "Recommendation")]
    pub recommendation: Recommendation,
}

impl AdRow {
    fn new(
        group: &PerformanceGroup,
        metrics: &BusinessMetrics,
        shrinkage: &ShrinkageResult,
        scores: &Scores,
    ) -> Self {
        let shopify = &group.shopify;
        Self {
            day: group.day.clone(),
            campaign: group.campaign.clone(),
            ad_set: group.ad_set.clone(),
            ad_set_delivery: group.ad_set_delivery.clone(),
            ad: group.ad_name.clone().unwrap_or_default(),
            ctr: round_rate(shrinkage.ctr_observed),
            ctr_shrunk: round_rate(shrinkage.ctr_shrunk),
            spend: round_money(group.ad.amount_spent_inr),
            impressions: group.ad.impressions,
            users: shopify.visitors,
            sessions: shopify.sessions,
            add_to_cart: shopify.add_to_cart,
            reached_checkout: shopify.reached_checkout,
            orders: shopify.orders(),
            good_leads: shopify.good_lead_visitors,
            cost_per_user: round_money(metrics.cost_per_user),
            cost_per_session: round_money(metrics.cost_per_session),
            cost_per_add_to_cart: round_money(metrics.cost_per_add_to_cart),
            cost_per_checkout: round_money(metrics.cost_per_checkout),
            cost_per_order: round_money(metrics.cost_per_order),
            cost_per_good_lead: round_money(metrics.cost_per_good_lead),
            good_lead_rate: round_rate(metrics.good_lead_rate),
            conversion_rate: round_rate(metrics.conversion_rate),
            conversion_rate_shrunk: round_rate(shrinkage.conversion_rate_shrunk),
            avg_session_duration_secs: round_money(metrics.avg_session_duration_secs),
            efficiency_score: round_score(scores.efficiency),
            quality_score: round_score(scores.quality),
            volume_score: round_score(scores.volume),
            overall_score: round_score(scores.overall),
            recommendation: scores.recommendation,
        }
    }
}

/// All three tables
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputTables {
    pub daily: Vec<DailySummaryRow>,
    pub ad_sets: Vec<AdSetRow>,
    pub ads: Vec<AdRow>,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        0.0
    }
}

fn round_money(value: f64) -> f64 {
    round_to(value, 2)
}

fn round_rate(value: f64) -> f64 {
    round_to(value, 6)
}

fn round_score(value: f64) -> f64 {
    round_to(value, 4)
}

// ============================================================================
// Grouping
// ============================================================================

/// Unified rows summed over a grouping key
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceGroup {
    pub source: Source,
    pub day: String,
    pub campaign: String,
    pub ad_set: String,
    pub ad_set_delivery: String,
    pub ad_name: Option<String>,
    pub ad: AdMetrics,
    pub shopify: ShopifyAggregate,
}

impl PerformanceSample for PerformanceGroup {
    fn source(&self) -> Source {
        self.source
    }

    fn ad_metrics(&self) -> &AdMetrics {
        &self.ad
    }

    fn shopify(&self) -> &ShopifyAggregate {
        &self.shopify
    }
}

type GroupKey = (String, String, String, String, Option<String>);

/// Group Meta rows by (day, campaign, ad set, delivery[, ad])
pub fn group_meta_rows(rows: &[UnifiedAttributionRow], by_ad: bool) -> Vec<PerformanceGroup> {
    let mut groups: BTreeMap<GroupKey, (Vec<AdMetrics>, ShopifyAggregate)> = BTreeMap::new();

    for row in rows.iter().filter(|r| r.source == Source::Meta) {
        let key = (
            row.day.clone(),
            row.campaign_name.clone(),
            row.ad_set_name.clone(),
            row.ad_set_delivery.clone(),
            by_ad.then(|| row.ad_name.clone()),
        );
        let (metrics, shopify) = groups.entry(key).or_default();
        metrics.push(row.ad);
        shopify.merge(&row.shopify);
    }

    groups
        .into_iter()
        .map(
            |((day, campaign, ad_set, ad_set_delivery, ad_name), (metrics, shopify))| {
                PerformanceGroup {
                    source: Source::Meta,
                    day,
                    campaign,
                    ad_set,
                    ad_set_delivery,
                    ad_name,
                    ad: AdMetrics::combine(&metrics),
                    shopify,
                }
            },
        )
        .collect()
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Default)]
struct DayAccumulator {
    meta: Vec<AdMetrics>,
    google: Vec<AdMetrics>,
    shopify: ShopifyAggregate,
}

/// Output builder (Tier 3 concept)
pub struct OutputBuilder {
    shrinkage: BayesShrinkage,
    scorer: Scorer,
}

impl Default for OutputBuilder {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl OutputBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            shrinkage: BayesShrinkage::new(config.shrinkage.clone()),
            scorer: Scorer::new(config.scoring.clone()),
        }
    }

    /// Build all three tables
    pub fn build(&self, batch: &HarmonizedBatch, rows: &[UnifiedAttributionRow]) -> OutputTables {
        let tables = OutputTables {
            daily: self.daily(batch),
            ad_sets: self.ad_sets(rows),
            ads: self.ads(rows),
        };

        info!(
            daily = tables.daily.len(),
            ad_sets = tables.ad_sets.len(),
            ads = tables.ads.len(),
            "Output tables built"
        );

        tables
    }

    /// Daily top-level table, ascending by day
    pub fn daily(&self, batch: &HarmonizedBatch) -> Vec<DailySummaryRow> {
        let mut days: BTreeMap<&str, DayAccumulator> = BTreeMap::new();

        // Zero-spend ad rows are left out of the daily view entirely
        for ad in batch.ads.iter().filter(|a| a.metrics.amount_spent_inr > 0.0) {
            let acc = days.entry(ad.day.as_str()).or_default();
            match ad.source {
                Source::Meta => acc.meta.push(ad.metrics),
                Source::Google => acc.google.push(ad.metrics),
            }
        }
        for session in &batch.sessions {
            days.entry(session.day.as_str()).or_default().shopify.add(session);
        }

        days.into_iter()
            .map(|(day, acc)| {
                let meta = SourceDayTotals::from_metrics(&acc.meta);
                let google = SourceDayTotals::from_metrics(&acc.google);
                let total_spend = meta.spend + google.spend;
                let metrics = BusinessMetrics::compute(total_spend, &acc.shopify, &AdMetrics::default());
                let s = &acc.shopify;

                DailySummaryRow {
                    day: day.to_string(),
                    meta_spend: round_money(meta.spend),
                    meta_impressions: meta.impressions,
                    meta_ctr: round_rate(meta.ctr),
                    meta_cpm: round_money(meta.cpm),
                    google_spend: round_money(google.spend),
                    google_impressions: google.impressions,
                    google_ctr: round_rate(google.ctr),
                    google_cpm: round_money(google.cpm),
                    total_spend: round_money(total_spend),
                    users: s.visitors,
                    sessions: s.sessions,
                    add_to_cart: s.add_to_cart,
                    reached_checkout: s.reached_checkout,
                    orders: s.orders(),
                    good_leads: s.good_lead_visitors,
                    total_sales: round_money(s.total_sales),
                    cost_per_user: round_money(metrics.cost_per_user),
                    cost_per_order: round_money(metrics.cost_per_order),
                    good_lead_rate: round_rate(metrics.good_lead_rate),
                    roas: metrics.roas.map(round_score),
                }
            })
            .collect()
    }

    /// Ad-set level table
    pub fn ad_sets(&self, rows: &[UnifiedAttributionRow]) -> Vec<AdSetRow> {
        self.evaluate(&group_meta_rows(rows, false), AdSetRow::new)
    }

    /// Ad level table
    pub fn ads(&self, rows: &[UnifiedAttributionRow]) -> Vec<AdRow> {
        self.evaluate(&group_meta_rows(rows, true), AdRow::new)
    }

    /// Metrics, shrinkage (over this group batch) and scores per group
    fn evaluate<R, F>(&self, groups: &[PerformanceGroup], make_row: F) -> Vec<R>
    where
        F: Fn(&PerformanceGroup, &BusinessMetrics, &ShrinkageResult, &Scores) -> R,
    {
        let shrinkage = self.shrinkage.apply(groups);
        groups
            .iter()
            .zip(shrinkage)
            .map(|(group, shrunk)| {
                let metrics = BusinessMetrics::for_sample(group);
                let scores = self.scorer.score(group, &metrics, &shrunk);
                make_row(group, &metrics, &shrunk, &scores)
            })
            .collect()
    }
}

/// One source's ad totals for a day
struct SourceDayTotals {
    spend: f64,
    impressions: f64,
    ctr: f64,
    cpm: f64,
}

impl SourceDayTotals {
    fn from_metrics(items: &[AdMetrics]) -> Self {
        Self {
            spend: items.iter().map(|m| m.amount_spent_inr).sum(),
            impressions: items.iter().map(|m| m.impressions).sum(),
            ctr: spend_weighted(items, |m| m.ctr_decimal),
            cpm: spend_weighted(items, |m| m.cpm),
        }
    }
}

/// Total ad spend over total Shopify sessions for the whole batch, unrounded
pub fn blended_cost_per_user(batch: &HarmonizedBatch) -> f64 {
    let spend: f64 = batch
        .ads
        .iter()
        .map(|a| a.metrics.amount_spent_inr)
        .filter(|spend| *spend > 0.0)
        .sum();
    let sessions: f64 = batch.sessions.iter().map(|s| s.sessions).sum();
    safe_div(spend, sessions)
}
