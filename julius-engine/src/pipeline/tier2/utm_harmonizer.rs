// Tier 2: UTM Harmonizer
//
// Concept: Map platform records onto canonical ad and session records
// Synchronization: Accepts Vec<PlatformRecord>, outputs HarmonizedBatch
//
// After this stage no code looks at platform-specific field names:
// - Meta/Google rows become AdRecord (CTR points → decimal fraction)
// - Shopify rows become SessionRecord with long-session, deep-view,
//   good-lead and templated flags
// - Campaign aliases rewrite ad campaign names and utm_campaign alike so that
//   both sides of the join agree

use crate::config::HarmonizerConfig;
use crate::pipeline::types::{
    AdMetrics, AdRecord, GoogleRow, HarmonizedBatch, MetaRow, PlatformRecord, SessionRecord,
    ShopifyRow, Source,
};
use tracing::{debug, info};

/// UTM harmonizer (Tier 2 concept)
pub struct UtmHarmonizer {
    config: HarmonizerConfig,
}

impl Default for UtmHarmonizer {
    fn default() -> Self {
        Self::new(HarmonizerConfig::default())
    }
}

impl UtmHarmonizer {
    pub fn new(config: HarmonizerConfig) -> Self {
        Self { config }
    }

    /// Harmonize all records, preserving input order within ads and sessions
    pub fn harmonize(&self, records: Vec<PlatformRecord>) -> HarmonizedBatch {
        let mut batch = HarmonizedBatch::default();
        let mut aliased = 0usize;

        for record in records {
            match record {
                PlatformRecord::Meta(row) => batch.ads.push(self.meta_to_ad(row)),
                PlatformRecord::Google(row) => batch.ads.push(self.google_to_ad(row)),
                PlatformRecord::Shopify(row) => batch.sessions.push(self.to_session(row)),
            }
        }

        if !self.config.campaign_aliases.is_empty() {
            for ad in &mut batch.ads {
                aliased += usize::from(self.apply_alias(&mut ad.campaign_name));
            }
            for session in &mut batch.sessions {
                aliased += usize::from(self.apply_alias(&mut session.utm_campaign));
            }
        }

        info!(
            ads = batch.ads.len(),
            sessions = batch.sessions.len(),
            templated = batch.templated_sessions(),
            aliased,
            "Harmonization complete"
        );

        batch
    }

    fn meta_to_ad(&self, row: MetaRow) -> AdRecord {
        AdRecord {
            source: Source::Meta,
            day: row.day,
            campaign_name: row.campaign,
            ad_set_name: row.ad_set,
            ad_name: row.ad,
            ad_set_delivery: row.ad_set_delivery,
            metrics: AdMetrics {
                amount_spent_inr: row.spend,
                impressions: row.impressions,
                clicks: row.link_clicks,
                ctr_decimal: row.ctr_points / 100.0,
                cpm: row.cpm,
                platform_conversions: row.purchases,
                platform_conversion_value: row.purchase_value,
            },
        }
    }

    fn google_to_ad(&self, row: GoogleRow) -> AdRecord {
        AdRecord {
            source: Source::Google,
            day: row.day,
            campaign_name: row.campaign,
            ad_set_name: String::new(),
            ad_name: String::new(),
            ad_set_delivery: String::new(),
            metrics: AdMetrics {
                amount_spent_inr: row.cost,
                impressions: row.impressions,
                clicks: row.clicks,
                ctr_decimal: row.ctr_points / 100.0,
                cpm: row.avg_cpm,
                platform_conversions: row.conversions,
                platform_conversion_value: row.conversion_value,
            },
        }
    }

    fn to_session(&self, row: ShopifyRow) -> SessionRecord {
        let long_session_flag = row.avg_session_duration_secs >= self.config.long_session_secs;
        let deep_views_flag = row.pageviews >= self.config.deep_view_pageviews;
        let is_templated = [&row.utm_campaign, &row.utm_term, &row.utm_content]
            .iter()
            .any(|value| self.is_template(value));

        if is_templated {
            debug!(
                day = %row.day,
                utm_campaign = %row.utm_campaign,
                utm_term = %row.utm_term,
                utm_content = %row.utm_content,
                "Unexpanded UTM template"
            );
        }

        SessionRecord {
            day: row.day,
            utm_campaign: row.utm_campaign,
            utm_term: row.utm_term,
            utm_content: row.utm_content,
            visitors: row.visitors,
            sessions: row.sessions,
            pageviews: row.pageviews,
            add_to_cart: row.add_to_cart,
            reached_checkout: row.reached_checkout,
            completed_checkout: row.completed_checkout,
            avg_session_duration_secs: row.avg_session_duration_secs,
            total_sales: row.total_sales,
            long_session_flag,
            deep_views_flag,
            gl_flag: long_session_flag && deep_views_flag,
            is_templated,
        }
    }

    fn is_template(&self, value: &str) -> bool {
        !self.config.template_marker.is_empty() && value.contains(&self.config.template_marker)
    }

    /// Rewrite `campaign` in place when an alias rule matches; true if rewritten
    fn apply_alias(&self, campaign: &mut String) -> bool {
        match self.config.campaign_aliases.get(campaign.trim()) {
            Some(canonical) if canonical != campaign => {
                *campaign = canonical.clone();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shopify(campaign: &str, term: &str, content: &str, duration: f64, pageviews: f64) -> PlatformRecord {
        PlatformRecord::Shopify(ShopifyRow {
            day: "2025-09-29".into(),
            utm_campaign: campaign.into(),
            utm_term: term.into(),
            utm_content: content.into(),
            visitors: 10.0,
            sessions: 10.0,
            pageviews,
            avg_session_duration_secs: duration,
            ..Default::default()
        })
    }

    #[test]
    fn test_ctr_points_become_decimal() {
        let batch = UtmHarmonizer::default().harmonize(vec![PlatformRecord::Meta(MetaRow {
            day: "2025-09-29".into(),
            campaign: "C1".into(),
            ad_set: "A1".into(),
            ad: "Ad1".into(),
            spend: 1000.0,
            ctr_points: 1.25,
            ..Default::default()
        })]);

        assert_eq!(batch.ads.len(), 1);
        let ad = &batch.ads[0];
        assert_eq!(ad.source, Source::Meta);
        assert_eq!(ad.campaign_name, "C1");
        assert!((ad.metrics.ctr_decimal - 0.0125).abs() < 1e-12);
        assert_eq!(ad.metrics.amount_spent_inr, 1000.0);
    }

    #[test]
    fn test_google_rows_have_empty_ad_set_and_ad() {
        let batch = UtmHarmonizer::default().harmonize(vec![PlatformRecord::Google(GoogleRow {
            day: "2025-09-29".into(),
            campaign: "G1".into(),
            cost: 50.0,
            ..Default::default()
        })]);

        let ad = &batch.ads[0];
        assert_eq!(ad.source, Source::Google);
        assert!(ad.ad_set_name.is_empty());
        assert!(ad.ad_name.is_empty());
    }

    #[test]
    fn test_session_flags() {
        let batch = UtmHarmonizer::default().harmonize(vec![
            shopify("C1", "A1", "Ad1", 75.0, 6.0),
            shopify("C1", "A1", "Ad1", 30.0, 6.0),
            shopify("C1", "A1", "Ad1", 60.0, 2.0),
        ]);

        let s = &batch.sessions;
        assert!(s[0].long_session_flag && s[0].deep_views_flag && s[0].gl_flag);
        assert!(!s[1].long_session_flag && s[1].deep_views_flag && !s[1].gl_flag);
        assert!(s[2].long_session_flag && !s[2].deep_views_flag && !s[2].gl_flag);
    }

    #[test]
    fn test_templated_utm_detected() {
        let batch = UtmHarmonizer::default().harmonize(vec![
            shopify("C1", "{{adset.name}}", "Ad1", 0.0, 0.0),
            shopify("C1", "A1", "Ad1", 0.0, 0.0),
        ]);

        assert!(batch.sessions[0].is_templated);
        assert!(!batch.sessions[1].is_templated);
        assert_eq!(batch.templated_sessions(), 1);
    }

    #[test]
    fn test_campaign_alias_applies_to_both_sides() {
        let mut config = HarmonizerConfig::default();
        config
            .campaign_aliases
            .insert("Diwali Sale".to_string(), "diwali_sale".to_string());
        let harmonizer = UtmHarmonizer::new(config);

        let batch = harmonizer.harmonize(vec![
            PlatformRecord::Meta(MetaRow {
                day: "2025-09-29".into(),
                campaign: "Diwali Sale".into(),
                ..Default::default()
            }),
            shopify("Diwali Sale", "A1", "Ad1", 0.0, 0.0),
            shopify("Other", "A1", "Ad1", 0.0, 0.0),
        ]);

        assert_eq!(batch.ads[0].campaign_name, "diwali_sale");
        assert_eq!(batch.sessions[0].utm_campaign, "diwali_sale");
        assert_eq!(batch.sessions[1].utm_campaign, "Other");
    }
}
