// Tier 1: Quality Validator
//
// Concept: Repair out-of-range values in normalized records
// Synchronization: Mutates Vec<PlatformRecord> in place, outputs QualityReport
//
// Every repair is local to one cell and counted; nothing here aborts a run.
// - Bounds: spend, CTR points, CPM, counts and session duration are clamped
// - Logic: completed checkouts above visitors are clamped down to visitors
//   (a cross-platform miscount, not an input error)

use crate::config::ValidatorConfig;
use crate::pipeline::types::{GoogleRow, MetaRow, PlatformRecord, ShopifyRow};
use serde::Serialize;
use tracing::{debug, warn};

/// Counts of repairs made by the quality pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QualityReport {
    pub records_checked: usize,
    pub clamped_values: usize,
    pub checkout_fixes: usize,
    pub funnel_fixes: usize,
}

impl QualityReport {
    pub fn total_fixes(&self) -> usize {
        self.clamped_values + self.checkout_fixes + self.funnel_fixes
    }
}

/// Quality validator (Tier 1 concept)
pub struct QualityValidator {
    bounds: ValidatorConfig,
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl QualityValidator {
    pub fn new(bounds: ValidatorConfig) -> Self {
        Self { bounds }
    }

    /// Clamp and fix all records in place
    pub fn apply(&self, records: &mut [PlatformRecord]) -> QualityReport {
        let mut report = QualityReport::default();

        for record in records.iter_mut() {
            report.records_checked += 1;
            match record {
                PlatformRecord::Meta(row) => self.check_meta(row, &mut report),
                PlatformRecord::Google(row) => self.check_google(row, &mut report),
                PlatformRecord::Shopify(row) => self.check_shopify(row, &mut report),
            }
        }

        if report.total_fixes() > 0 {
            warn!(
                checked = report.records_checked,
                clamped = report.clamped_values,
                checkout_fixes = report.checkout_fixes,
                funnel_fixes = report.funnel_fixes,
                "Quality pass repaired values"
            );
        }

        report
    }

    fn check_meta(&self, row: &mut MetaRow, report: &mut QualityReport) {
        let b = &self.bounds;
        clamp_field(&mut row.spend, 0.0, b.max_spend, "spend", report);
        clamp_field(&mut row.ctr_points, 0.0, b.max_ctr_points, "ctr", report);
        clamp_field(&mut row.cpm, 0.0, b.max_cpm, "cpm", report);
        clamp_non_negative(&mut row.impressions, "impressions", report);
        clamp_non_negative(&mut row.link_clicks, "link_clicks", report);
        clamp_non_negative(&mut row.purchases, "purchases", report);
        clamp_non_negative(&mut row.purchase_value, "purchase_value", report);
    }

    fn check_google(&self, row: &mut GoogleRow, report: &mut QualityReport) {
        let b = &self.bounds;
        clamp_field(&mut row.cost, 0.0, b.max_spend, "cost", report);
        clamp_field(&mut row.ctr_points, 0.0, b.max_ctr_points, "ctr", report);
        clamp_field(&mut row.avg_cpm, 0.0, b.max_cpm, "avg_cpm", report);
        clamp_non_negative(&mut row.impressions, "impressions", report);
        clamp_non_negative(&mut row.clicks, "clicks", report);
        clamp_non_negative(&mut row.conversions, "conversions", report);
        clamp_non_negative(&mut row.conversion_value, "conversion_value", report);
    }

    fn check_shopify(&self, row: &mut ShopifyRow, report: &mut QualityReport) {
        clamp_non_negative(&mut row.visitors, "visitors", report);
        clamp_non_negative(&mut row.sessions, "sessions", report);
        clamp_non_negative(&mut row.pageviews, "pageviews", report);
        clamp_non_negative(&mut row.add_to_cart, "add_to_cart", report);
        clamp_non_negative(&mut row.reached_checkout, "reached_checkout", report);
        clamp_non_negative(&mut row.completed_checkout, "completed_checkout", report);
        clamp_non_negative(&mut row.total_sales, "total_sales", report);
        clamp_field(
            &mut row.avg_session_duration_secs,
            0.0,
            self.bounds.max_session_duration_secs,
            "avg_session_duration",
            report,
        );

        if row.completed_checkout > row.visitors {
            warn!(
                day = %row.day,
                utm_campaign = %row.utm_campaign,
                completed_checkout = row.completed_checkout,
                visitors = row.visitors,
                "Completed checkouts exceed visitors, clamping to visitors"
            );
            row.completed_checkout = row.visitors;
            report.checkout_fixes += 1;
        }

        // Funnel steps cannot exceed the sessions they were counted in
        if row.sessions > 0.0 {
            for (value, name) in [
                (&mut row.add_to_cart, "add_to_cart"),
                (&mut row.reached_checkout, "reached_checkout"),
            ] {
                if *value > row.sessions {
                    debug!(field = name, value = *value, sessions = row.sessions, "Funnel step clamped to sessions");
                    *value = row.sessions;
                    report.funnel_fixes += 1;
                }
            }
        }
    }
}

fn clamp_field(value: &mut f64, min: f64, max: f64, name: &str, report: &mut QualityReport) {
    let clamped = value.clamp(min, max);
    if clamped != *value {
        debug!(field = name, original = *value, clamped, "Value out of bounds");
        *value = clamped;
        report.clamped_values += 1;
    }
}

fn clamp_non_negative(value: &mut f64, name: &str, report: &mut QualityReport) {
    clamp_field(value, 0.0, f64::MAX, name, report);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_and_ctr_clamped() {
        let mut records = vec![PlatformRecord::Meta(MetaRow {
            day: "2025-09-29".into(),
            campaign: "C1".into(),
            spend: 2_500_000.0,
            ctr_points: 140.0,
            impressions: -5.0,
            ..Default::default()
        })];

        let report = QualityValidator::default().apply(&mut records);
        assert_eq!(report.clamped_values, 3);

        let PlatformRecord::Meta(row) = &records[0] else {
            panic!("expected Meta");
        };
        assert_eq!(row.spend, 1_000_000.0);
        assert_eq!(row.ctr_points, 100.0);
        assert_eq!(row.impressions, 0.0);
    }

    #[test]
    fn test_checkout_above_visitors_is_clamped_not_rejected() {
        let mut records = vec![PlatformRecord::Shopify(ShopifyRow {
            day: "2025-09-29".into(),
            visitors: 10.0,
            sessions: 12.0,
            completed_checkout: 15.0,
            add_to_cart: 20.0,
            ..Default::default()
        })];

        let report = QualityValidator::default().apply(&mut records);
        assert_eq!(report.checkout_fixes, 1);
        assert_eq!(report.funnel_fixes, 1);
        assert_eq!(records.len(), 1);

        let PlatformRecord::Shopify(row) = &records[0] else {
            panic!("expected Shopify");
        };
        assert_eq!(row.completed_checkout, 10.0);
        assert_eq!(row.add_to_cart, 12.0);
    }

    #[test]
    fn test_clean_record_untouched() {
        let original = PlatformRecord::Google(GoogleRow {
            day: "2025-09-29".into(),
            campaign: "G1".into(),
            cost: 100.0,
            impressions: 1000.0,
            clicks: 20.0,
            ctr_points: 2.0,
            ..Default::default()
        });
        let mut records = vec![original.clone()];

        let report = QualityValidator::default().apply(&mut records);
        assert_eq!(report.total_fixes(), 0);
        assert_eq!(records[0], original);
    }
}
