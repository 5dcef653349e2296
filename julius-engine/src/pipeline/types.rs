// Shared Types and Data Contracts
//
// This module defines the data contracts between the three pipeline tiers.
// Each type is the output of exactly one stage and the input of the next;
// no stage reaches back into raw tables once normalization is done.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Platforms and Sources
// ============================================================================

/// Export platform a raw table came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    Meta,
    Google,
    Shopify,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meta => "Meta",
            Self::Google => "Google",
            Self::Shopify => "Shopify",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ad platform a unified attribution row originates from
///
/// Only ad-spend platforms appear here; Shopify only ever contributes session metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    Meta,
    Google,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meta => "Meta",
            Self::Google => "Google",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Raw Input
// ============================================================================

/// One platform export as loosely typed string cells
///
/// Produced by the CSV loader (or built directly by embedding callers).
/// Rows shorter than the header are treated as having empty trailing cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub platform: Platform,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(platform: Platform, headers: Vec<String>) -> Self {
        Self {
            platform,
            headers,
            rows: Vec::new(),
        }
    }

    /// Build a table from `(column, value)` records, collecting the header row
    /// from the columns in first-seen order
    pub fn from_records(platform: Platform, records: &[Vec<(&str, &str)>]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for record in records {
            for (column, _) in record {
                if !headers.iter().any(|h| h == column) {
                    headers.push((*column).to_string());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                headers
                    .iter()
                    .map(|h| {
                        record
                            .iter()
                            .find(|(column, _)| column == h)
                            .map(|(_, value)| (*value).to_string())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        Self {
            platform,
            headers,
            rows,
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `(row, column)`, empty when the row is short
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }
}

// ============================================================================
// Tier 1 Outputs: Typed Platform Records
// ============================================================================

/// Meta Ads export row after numeric coercion and date normalization
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaRow {
    pub day: String,
    pub campaign: String,
    pub ad_set: String,
    pub ad: String,
    pub ad_set_delivery: String,
    pub spend: f64,
    pub impressions: f64,
    pub link_clicks: f64,
    pub ctr_points: f64, // percentage points, e.g. 1.25 for 1.25%
    pub cpm: f64,
    pub purchases: f64,
    pub purchase_value: f64,
}

/// Google Ads export row (campaign granularity only)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoogleRow {
    pub day: String,
    pub campaign: String,
    pub cost: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub ctr_points: f64,
    pub avg_cpm: f64,
    pub conversions: f64,
    pub conversion_value: f64,
}

/// Shopify sessions export row keyed by UTM parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShopifyRow {
    pub day: String,
    pub utm_campaign: String,
    pub utm_term: String,
    pub utm_content: String,
    pub visitors: f64,
    pub sessions: f64,
    pub pageviews: f64,
    pub add_to_cart: f64,
    pub reached_checkout: f64,
    pub completed_checkout: f64,
    pub avg_session_duration_secs: f64,
    pub total_sales: f64,
}

/// Tagged platform record
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformRecord {
    Meta(MetaRow),
    Google(GoogleRow),
    Shopify(ShopifyRow),
}

// ============================================================================
// Tier 2 Inputs: Canonical (Harmonized) Records
// ============================================================================

/// Ad delivery metrics in canonical units
///
/// `ctr_decimal` is a fraction (0.0125 for 1.25%). `cpm` is cost per 1,000 impressions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AdMetrics {
    pub amount_spent_inr: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub ctr_decimal: f64,
    pub cpm: f64,
    pub platform_conversions: f64,
    pub platform_conversion_value: f64,
}

impl AdMetrics {
    /// Combine several rows into one
    ///
    /// Counts are summed. CTR is impression-weighted (spend-weighted over rows with
    /// positive spend when no impressions exist). CPM is recomputed from totals when
    /// impressions exist, else spend-weighted.
    pub fn combine(items: &[AdMetrics]) -> AdMetrics {
        if items.is_empty() {
            return AdMetrics::default();
        }
        if items.len() == 1 {
            return items[0];
        }

        let mut total = AdMetrics::default();
        let mut ctr_impression_sum = 0.0;
        for m in items {
            total.amount_spent_inr += m.amount_spent_inr;
            total.impressions += m.impressions;
            total.clicks += m.clicks;
            total.platform_conversions += m.platform_conversions;
            total.platform_conversion_value += m.platform_conversion_value;
            ctr_impression_sum += m.ctr_decimal * m.impressions;
        }

        total.ctr_decimal = if total.impressions > 0.0 {
            ctr_impression_sum / total.impressions
        } else {
            spend_weighted(items, |m| m.ctr_decimal)
        };

        total.cpm = if total.impressions > 0.0 {
            total.amount_spent_inr * 1000.0 / total.impressions
        } else {
            spend_weighted(items, |m| m.cpm)
        };

        total
    }

    /// Clicks reported by the platform, or estimated from CTR × impressions
    pub fn effective_clicks(&self) -> f64 {
        if self.clicks > 0.0 {
            self.clicks
        } else {
            (self.ctr_decimal * self.impressions).max(0.0)
        }
    }
}

/// Spend-weighted mean of `value` over rows with positive spend (0 when none)
pub fn spend_weighted<F>(items: &[AdMetrics], value: F) -> f64
where
    F: Fn(&AdMetrics) -> f64,
{
    let (weighted, spend) = items
        .iter()
        .filter(|m| m.amount_spent_inr > 0.0)
        .fold((0.0, 0.0), |(w, s), m| {
            (w + value(m) * m.amount_spent_inr, s + m.amount_spent_inr)
        });
    if spend > 0.0 {
        weighted / spend
    } else {
        0.0
    }
}

/// Harmonized ad-platform record
#[derive(Debug, Clone, PartialEq)]
pub struct AdRecord {
    pub source: Source,
    pub day: String,
    pub campaign_name: String,
    pub ad_set_name: String, // empty for Google
    pub ad_name: String,     // empty for Google
    pub ad_set_delivery: String,
    pub metrics: AdMetrics,
}

/// Harmonized Shopify session record with derived quality flags
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionRecord {
    pub day: String,
    pub utm_campaign: String,
    pub utm_term: String,
    pub utm_content: String,
    pub visitors: f64,
    pub sessions: f64,
    pub pageviews: f64,
    pub add_to_cart: f64,
    pub reached_checkout: f64,
    pub completed_checkout: f64,
    pub avg_session_duration_secs: f64,
    pub total_sales: f64,
    pub long_session_flag: bool,
    pub deep_views_flag: bool,
    pub gl_flag: bool,
    pub is_templated: bool,
}

/// Output of the UTM harmonizer
#[derive(Debug, Clone, Default)]
pub struct HarmonizedBatch {
    pub ads: Vec<AdRecord>,
    pub sessions: Vec<SessionRecord>,
}

impl HarmonizedBatch {
    pub fn templated_sessions(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_templated).count()
    }
}

// ============================================================================
// Attribution Types
// ============================================================================

/// Key uniquely identifying one unified attribution row
///
/// Orders Meta keys before Google keys, then field by field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AttributionKey {
    Meta {
        day: String,
        campaign: String,
        ad_set: String,
        ad: String,
    },
    Google {
        day: String,
        campaign: String,
    },
}

/// Shopify session metrics summed over every raw row sharing a key
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ShopifyAggregate {
    pub rows: usize,
    pub visitors: f64,
    pub sessions: f64,
    pub pageviews: f64,
    pub add_to_cart: f64,
    pub reached_checkout: f64,
    pub completed_checkout: f64,
    pub total_sales: f64,
    pub good_lead_visitors: f64,
    pub long_session_visitors: f64,
    pub deep_view_visitors: f64,
    /// Σ(avg session duration × sessions), for a session-weighted mean
    pub duration_weighted_secs: f64,
}

impl ShopifyAggregate {
    pub fn add(&mut self, record: &SessionRecord) {
        self.rows += 1;
        self.visitors += record.visitors;
        self.sessions += record.sessions;
        self.pageviews += record.pageviews;
        self.add_to_cart += record.add_to_cart;
        self.reached_checkout += record.reached_checkout;
        self.completed_checkout += record.completed_checkout;
        self.total_sales += record.total_sales;
        if record.gl_flag {
            self.good_lead_visitors += record.visitors;
        }
        if record.long_session_flag {
            self.long_session_visitors += record.visitors;
        }
        if record.deep_views_flag {
            self.deep_view_visitors += record.visitors;
        }
        self.duration_weighted_secs += record.avg_session_duration_secs * record.sessions;
    }

    pub fn merge(&mut self, other: &ShopifyAggregate) {
        self.rows += other.rows;
        self.visitors += other.visitors;
        self.sessions += other.sessions;
        self.pageviews += other.pageviews;
        self.add_to_cart += other.add_to_cart;
        self.reached_checkout += other.reached_checkout;
        self.completed_checkout += other.completed_checkout;
        self.total_sales += other.total_sales;
        self.good_lead_visitors += other.good_lead_visitors;
        self.long_session_visitors += other.long_session_visitors;
        self.deep_view_visitors += other.deep_view_visitors;
        self.duration_weighted_secs += other.duration_weighted_secs;
    }

    /// Orders are completed checkouts
    pub fn orders(&self) -> f64 {
        self.completed_checkout
    }
}

/// One ad-platform row joined with its Shopify aggregate (or zeros)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedAttributionRow {
    pub source: Source,
    pub day: String,
    pub campaign_name: String,
    pub ad_set_name: String,
    pub ad_name: String,
    pub ad_set_delivery: String,
    pub ad: AdMetrics,
    pub shopify: ShopifyAggregate,
    /// False when no Shopify aggregate matched the key (metrics are zero)
    pub matched: bool,
}

impl UnifiedAttributionRow {
    pub fn key(&self) -> AttributionKey {
        match self.source {
            Source::Meta => AttributionKey::Meta {
                day: self.day.clone(),
                campaign: self.campaign_name.clone(),
                ad_set: self.ad_set_name.clone(),
                ad: self.ad_name.clone(),
            },
            Source::Google => AttributionKey::Google {
                day: self.day.clone(),
                campaign: self.campaign_name.clone(),
            },
        }
    }
}

/// Anything that can be shrunk and scored: a unified row or a grouped aggregate
pub trait PerformanceSample {
    fn source(&self) -> Source;
    fn ad_metrics(&self) -> &AdMetrics;
    fn shopify(&self) -> &ShopifyAggregate;
}

impl PerformanceSample for UnifiedAttributionRow {
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

// ============================================================================
// Scoring Types (Tier 3 Output)
// ============================================================================

/// Four-bucket action label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "Scale")]
    Scale,
    #[serde(rename = "Test-to-Scale")]
    TestToScale,
    #[serde(rename = "Optimize")]
    Optimize,
    #[serde(rename = "Pause/Fix")]
    PauseFix,
}

impl Recommendation {
    pub fn label(self) -> &'static str {
        match self {
            Self::Scale => "Scale",
            Self::TestToScale => "Test-to-Scale",
            Self::Optimize => "Optimize",
            Self::PauseFix => "Pause/Fix",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Component scores, each in [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    pub efficiency: f64,
    pub quality: f64,
    pub volume: f64,
    pub overall: f64,
    pub recommendation: Recommendation,
}

/// Shrunk rate metrics stored alongside the observed ones
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ShrinkageResult {
    pub ctr_observed: f64,
    pub ctr_prior: f64,
    pub ctr_shrunk: f64,
    pub ctr_shrinkage_applied: bool,
    pub conversion_rate_observed: f64,
    pub conversion_prior: f64,
    pub conversion_rate_shrunk: f64,
    pub conversion_shrinkage_applied: bool,
}
