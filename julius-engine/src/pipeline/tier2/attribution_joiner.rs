// Tier 2: Attribution Joiner
//
// Concept: Attribute Shopify session metrics to ad-platform rows by UTM key
// Synchronization: Accepts HarmonizedBatch, outputs AttributionTable
//
// Algorithm:
// 1. Drop templated sessions (unexpanded "{{...}}" UTMs cannot be attributed)
// 2. Aggregate sessions by (day, campaign, term, content) and by (day, campaign)
//    BEFORE any join, so one Shopify row can never be counted twice per source
// 3. Collapse Meta rows sharing (day, campaign, ad set, ad); match the 4-part aggregate
// 4. Collapse Google rows sharing (day, campaign); match the 2-part aggregate
// 5. Emit Meta rows then Google rows, each in key order
//
// Matching is exact on trimmed values. A key with no aggregate gets zeroed
// Shopify metrics and `matched = false`.

use crate::pipeline::types::{
    AdMetrics, AdRecord, AttributionKey, HarmonizedBatch, ShopifyAggregate, Source,
    UnifiedAttributionRow,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

type ContentKey = (String, String, String, String);
type CampaignKey = (String, String);

/// Match counts for one join
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JoinStats {
    pub meta_rows: usize,
    pub google_rows: usize,
    pub meta_matched: usize,
    pub google_matched: usize,
    pub templated_excluded: usize,
    /// Non-templated Shopify visitors available for attribution
    pub available_visitors: f64,
    pub meta_attributed_visitors: f64,
    pub google_attributed_visitors: f64,
}

impl JoinStats {
    /// True when no source attributed more visitors than Shopify recorded
    pub fn within_visitor_bound(&self) -> bool {
        const SLACK: f64 = 1e-6;
        self.meta_attributed_visitors <= self.available_visitors + SLACK
            && self.google_attributed_visitors <= self.available_visitors + SLACK
    }
}

/// Joined rows plus match statistics
#[derive(Debug, Clone, Default)]
pub struct AttributionTable {
    pub rows: Vec<UnifiedAttributionRow>,
    pub stats: JoinStats,
}

/// Collapsed ad rows sharing one key
#[derive(Default)]
struct AdGroup {
    metrics: Vec<AdMetrics>,
    delivery: String,
}

impl AdGroup {
    fn push(&mut self, ad: &AdRecord) {
        self.metrics.push(ad.metrics);
        if self.delivery.is_empty() {
            self.delivery = ad.ad_set_delivery.trim().to_string();
        }
    }

    fn into_row(
        self,
        source: Source,
        day: String,
        campaign_name: String,
        ad_set_name: String,
        ad_name: String,
        shopify: Option<ShopifyAggregate>,
    ) -> UnifiedAttributionRow {
        UnifiedAttributionRow {
            source,
            day,
            campaign_name,
            ad_set_name,
            ad_name,
            ad_set_delivery: self.delivery,
            ad: AdMetrics::combine(&self.metrics),
            matched: shopify.is_some(),
            shopify: shopify.unwrap_or_default(),
        }
    }
}

/// Trimmed join key for an ad record; Google keys ignore ad set and ad
fn ad_key(ad: &AdRecord) -> AttributionKey {
    let day = ad.day.trim().to_string();
    let campaign = ad.campaign_name.trim().to_string();
    match ad.source {
        Source::Meta => AttributionKey::Meta {
            day,
            campaign,
            ad_set: ad.ad_set_name.trim().to_string(),
            ad: ad.ad_name.trim().to_string(),
        },
        Source::Google => AttributionKey::Google { day, campaign },
    }
}

/// Attribution joiner (Tier 2 concept)
#[derive(Debug, Default)]
pub struct AttributionJoiner;

impl AttributionJoiner {
    /// Join ad rows with Shopify aggregates
    ///
    /// Deterministic: the same batch always yields the same rows in the same order.
    pub fn join(&self, batch: &HarmonizedBatch) -> AttributionTable {
        let mut stats = JoinStats::default();

        // Steps 1-2: filter and aggregate sessions
        let mut by_content: BTreeMap<ContentKey, ShopifyAggregate> = BTreeMap::new();
        let mut by_campaign: BTreeMap<CampaignKey, ShopifyAggregate> = BTreeMap::new();

        for session in &batch.sessions {
            if session.is_templated {
                stats.templated_excluded += 1;
                continue;
            }
            stats.available_visitors += session.visitors;

            let day = session.day.trim().to_string();
            let campaign = session.utm_campaign.trim().to_string();
            by_content
                .entry((
                    day.clone(),
                    campaign.clone(),
                    session.utm_term.trim().to_string(),
                    session.utm_content.trim().to_string(),
                ))
                .or_default()
                .add(session);
            by_campaign.entry((day, campaign)).or_default().add(session);
        }

        debug!(
            content_keys = by_content.len(),
            campaign_keys = by_campaign.len(),
            templated_excluded = stats.templated_excluded,
            "Shopify sessions aggregated"
        );

        // Steps 3-4: collapse ad rows per attribution key (Meta keys sort first)
        let mut ad_groups: BTreeMap<AttributionKey, AdGroup> = BTreeMap::new();
        for ad in &batch.ads {
            ad_groups.entry(ad_key(ad)).or_default().push(ad);
        }

        let mut rows = Vec::with_capacity(ad_groups.len());
        for (key, group) in ad_groups {
            let row = match key {
                AttributionKey::Meta {
                    day,
                    campaign,
                    ad_set,
                    ad,
                } => {
                    let aggregate = by_content
                        .get(&(day.clone(), campaign.clone(), ad_set.clone(), ad.clone()))
                        .copied();
                    stats.meta_rows += 1;
                    if let Some(agg) = &aggregate {
                        stats.meta_matched += 1;
                        stats.meta_attributed_visitors += agg.visitors;
                    }
                    group.into_row(Source::Meta, day, campaign, ad_set, ad, aggregate)
                }
                AttributionKey::Google { day, campaign } => {
                    let aggregate = by_campaign.get(&(day.clone(), campaign.clone())).copied();
                    stats.google_rows += 1;
                    if let Some(agg) = &aggregate {
                        stats.google_matched += 1;
                        stats.google_attributed_visitors += agg.visitors;
                    }
                    group.into_row(
                        Source::Google,
                        day,
                        campaign,
                        String::new(),
                        String::new(),
                        aggregate,
                    )
                }
            };
            rows.push(row);
        }

        if !stats.within_visitor_bound() {
            warn!(
                available = stats.available_visitors,
                meta = stats.meta_attributed_visitors,
                google = stats.google_attributed_visitors,
                "Attributed visitors exceed Shopify visitors"
            );
        }

        info!(
            meta_rows = stats.meta_rows,
            meta_matched = stats.meta_matched,
            google_rows = stats.google_rows,
            google_matched = stats.google_matched,
            templated_excluded = stats.templated_excluded,
            "Attribution join complete"
        );

        AttributionTable { rows, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::SessionRecord;

    fn meta_ad(campaign: &str, ad_set: &str, ad: &str, spend: f64, impressions: f64) -> AdRecord {
        AdRecord {
            source: Source::Meta,
            day: "2025-09-29".into(),
            campaign_name: campaign.into(),
            ad_set_name: ad_set.into(),
            ad_name: ad.into(),
            ad_set_delivery: "active".into(),
            metrics: AdMetrics {
                amount_spent_inr: spend,
                impressions,
                ..Default::default()
            },
        }
    }

    fn google_ad(campaign: &str, spend: f64) -> AdRecord {
        AdRecord {
            source: Source::Google,
            day: "2025-09-29".into(),
            campaign_name: campaign.into(),
            ad_set_name: String::new(),
            ad_name: String::new(),
            ad_set_delivery: String::new(),
            metrics: AdMetrics {
                amount_spent_inr: spend,
                ..Default::default()
            },
        }
    }

    fn session(campaign: &str, term: &str, content: &str, visitors: f64, templated: bool) -> SessionRecord {
        SessionRecord {
            day: "2025-09-29".into(),
            utm_campaign: campaign.into(),
            utm_term: term.into(),
            utm_content: content.into(),
            visitors,
            sessions: visitors,
            is_templated: templated,
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_match_c1_a1_ad1() {
        let batch = HarmonizedBatch {
            ads: vec![meta_ad("C1", "A1", "Ad1", 1000.0, 10_000.0)],
            sessions: vec![session("C1", "A1", "Ad1", 100.0, false)],
        };

        let table = AttributionJoiner.join(&batch);
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert!(row.matched);
        assert_eq!(row.shopify.visitors, 100.0);
        assert_eq!(row.ad.amount_spent_inr, 1000.0);
        assert_eq!(table.stats.meta_matched, 1);
    }

    #[test]
    fn test_templated_sessions_excluded() {
        let batch = HarmonizedBatch {
            ads: vec![meta_ad("C1", "A1", "Ad1", 1000.0, 10_000.0)],
            sessions: vec![session("C1", "{{term}}", "Ad1", 100.0, true)],
        };

        let table = AttributionJoiner.join(&batch);
        let row = &table.rows[0];
        assert!(!row.matched);
        assert_eq!(row.shopify.visitors, 0.0);
        assert_eq!(table.stats.templated_excluded, 1);
    }

    #[test]
    fn test_sessions_aggregated_before_join() {
        let batch = HarmonizedBatch {
            ads: vec![
                meta_ad("C1", "A1", "Ad1", 600.0, 6_000.0),
                meta_ad("C1", "A1", "Ad1", 400.0, 4_000.0),
            ],
            sessions: vec![
                session("C1", "A1", "Ad1", 60.0, false),
                session("C1", "A1", "Ad1", 40.0, false),
                session("C2", "A9", "Ad9", 25.0, false),
            ],
        };

        let table = AttributionJoiner.join(&batch);
        // Duplicate Meta rows collapse into one; Shopify rows sum once
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].shopify.visitors, 100.0);
        assert_eq!(table.rows[0].shopify.rows, 2);
        assert_eq!(table.rows[0].ad.amount_spent_inr, 1000.0);

        let attributed: f64 = table.rows.iter().map(|r| r.shopify.visitors).sum();
        assert!(attributed <= table.stats.available_visitors);
        assert!(table.stats.within_visitor_bound());
    }

    #[test]
    fn test_google_matches_campaign_level() {
        let batch = HarmonizedBatch {
            ads: vec![google_ad("G1", 300.0), google_ad("G1", 200.0), google_ad("G2", 10.0)],
            sessions: vec![
                session("G1", "kw-a", "", 30.0, false),
                session("G1", "kw-b", "", 20.0, false),
            ],
        };

        let table = AttributionJoiner.join(&batch);
        assert_eq!(table.rows.len(), 2);
        let g1 = &table.rows[0];
        assert_eq!(g1.campaign_name, "G1");
        assert_eq!(g1.ad.amount_spent_inr, 500.0);
        assert_eq!(g1.shopify.visitors, 50.0);
        assert!(!table.rows[1].matched);
        assert_eq!(table.stats.google_matched, 1);
    }

    #[test]
    fn test_keys_trimmed_not_fuzzy() {
        let batch = HarmonizedBatch {
            ads: vec![
                meta_ad(" C1 ", "A1", "Ad1", 10.0, 0.0),
                meta_ad("c1", "A1", "Ad1", 10.0, 0.0),
            ],
            sessions: vec![session("C1", "A1 ", "Ad1", 5.0, false)],
        };

        let table = AttributionJoiner.join(&batch);
        let matched: Vec<_> = table.rows.iter().filter(|r| r.matched).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].campaign_name, "C1");
    }

    #[test]
    fn test_meta_before_google_and_idempotent() {
        let batch = HarmonizedBatch {
            ads: vec![
                google_ad("G1", 5.0),
                meta_ad("Z", "A1", "Ad1", 1.0, 0.0),
                meta_ad("B", "A1", "Ad1", 1.0, 0.0),
            ],
            sessions: vec![session("B", "A1", "Ad1", 3.0, false)],
        };

        let first = AttributionJoiner.join(&batch);
        let second = AttributionJoiner.join(&batch);
        assert_eq!(first.rows, second.rows);

        let order: Vec<_> = first
            .rows
            .iter()
            .map(|r| (r.source, r.campaign_name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![(Source::Meta, "B"), (Source::Meta, "Z"), (Source::Google, "G1")]
        );
    }

    #[test]
    fn test_every_row_has_a_unique_key() {
        let batch = HarmonizedBatch {
            ads: vec![
                meta_ad("C1", "A1", "Ad1", 10.0, 100.0),
                meta_ad("C1 ", "A1", " Ad1", 5.0, 50.0),
                meta_ad("C1", "A1", "Ad2", 5.0, 50.0),
                meta_ad("C1", "A2", "Ad1", 5.0, 50.0),
                google_ad("C1", 20.0),
                google_ad(" C1", 30.0),
            ],
            sessions: vec![session("C1", "A1", "Ad1", 10.0, false)],
        };

        let table = AttributionJoiner.join(&batch);
        let keys: std::collections::HashSet<AttributionKey> =
            table.rows.iter().map(UnifiedAttributionRow::key).collect();
        assert_eq!(keys.len(), table.rows.len());
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.stats.meta_rows, 3);
        assert_eq!(table.stats.google_rows, 1);
    }
}
