// Tier 1: Row Normalizer
//
// Concept: Turn loosely typed export cells into typed platform records
// Synchronization: Accepts RawTable + ResolvedColumns, outputs NormalizedBatch
//
// Numeric cells go through a tolerant parser (currency symbols, percent signs,
// thousands separators; anything unparseable becomes 0). Dates are normalized
// to YYYY-MM-DD. Rows without a usable date or identifying field are dropped
// and counted, never fatal.

use crate::pipeline::tier1::schema_validator::{Field, ResolvedColumns};
use crate::pipeline::types::{
    GoogleRow, MetaRow, Platform, PlatformRecord, RawTable, ShopifyRow,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const CURRENCY_TOKENS: &[&str] = &["INR", "USD", "EUR", "GBP", "Rs.", "Rs", "$", "€", "£", "₹", "¥"];

const NULL_TOKENS: &[&str] = &["", "-", "--", "n/a", "na", "null", "none", "nan"];

/// Strip currency markers, separators and whitespace, returning
/// `(cleaned, is_percent, is_negative_parenthesized)`
fn clean_numeric(raw: &str) -> (String, bool, bool) {
    let mut s = raw.trim().trim_matches('"').trim().to_string();

    let negative_parens = s.starts_with('(') && s.ends_with(')') && s.len() >= 2;
    if negative_parens {
        s = s[1..s.len() - 1].to_string();
    }

    for token in CURRENCY_TOKENS {
        s = s.replace(token, "");
    }

    let is_percent = s.trim_end().ends_with('%');
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '%' | ',' | '_' | '\'') && !c.is_whitespace())
        .collect();

    (cleaned, is_percent, negative_parens)
}

fn parse_cleaned(raw: &str) -> Option<(f64, bool)> {
    if NULL_TOKENS.contains(&raw.trim().to_lowercase().as_str()) {
        return None;
    }
    let (cleaned, is_percent, negative) = clean_numeric(raw);
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some((if negative { -value } else { value }, is_percent))
}

/// Tolerant numeric parser
///
/// `"$1,234.56"` → 1234.56, `"24.78%"` → 0.2478, `"(50)"` → -50.
/// Empty, non-numeric or non-finite input → 0.
pub fn parse_numeric(raw: &str) -> f64 {
    match parse_cleaned(raw) {
        Some((value, true)) => value / 100.0,
        Some((value, false)) => value,
        None => 0.0,
    }
}

/// Percentage-point parser for rate columns
///
/// `"2.5%"` and `"2.5"` both → 2.5.
pub fn parse_percentage_points(raw: &str) -> f64 {
    parse_cleaned(raw).map(|(value, _)| value).unwrap_or(0.0)
}

/// Session duration in seconds
///
/// Accepts plain seconds (`"83.5"`), clock form (`"00:01:23"`, `"1:23"`) and
/// unit-suffixed text (`"83s"`, `"1m 23s"`, `"1h 2m"`).
pub fn parse_duration_seconds(raw: &str) -> f64 {
    let s = raw.trim();
    if s.is_empty() {
        return 0.0;
    }

    if s.contains(':') {
        let parts: Vec<f64> = s
            .split(':')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .unwrap_or_default();
        return match parts.as_slice() {
            [h, m, sec] => h * 3600.0 + m * 60.0 + sec,
            [m, sec] => m * 60.0 + sec,
            _ => 0.0,
        };
    }

    if s.chars().any(|c| matches!(c, 'h' | 'm' | 's')) {
        let mut total = 0.0;
        let mut number = String::new();
        for c in s.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            let unit = match c {
                'h' => 3600.0,
                'm' => 60.0,
                's' => 1.0,
                _ => {
                    continue;
                }
            };
            if let Ok(v) = number.parse::<f64>() {
                total += v * unit;
            }
            number.clear();
        }
        if let Ok(v) = number.parse::<f64>() {
            total += v;
        }
        return total;
    }

    parse_numeric(s).max(0.0)
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%a, %b %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Normalize a date cell to `YYYY-MM-DD`
///
/// Date ranges (`"2025-09-29 - 2025-09-30"`) use the start date. Slash dates are
/// read month-first; day-first is only used when month-first cannot parse.
pub fn normalize_date(raw: &str) -> Option<String> {
    let s = raw.trim().trim_matches('"').trim();
    if s.is_empty() {
        return None;
    }

    // "start - end" ranges from report exports
    let s = match s.split_once(" - ") {
        Some((start, _)) => start.trim(),
        None => s,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date().format("%Y-%m-%d").to_string());
        }
    }

    // Drop a trailing time component ("2025-09-29T10:00:00.000+0530" etc.)
    let date_part = s.split(['T', ' ']).next().unwrap_or(s);
    for candidate in [s, date_part] {
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, fmt) {
                return Some(date.format("%Y-%m-%d").to_string());
            }
        }
    }

    None
}

/// Trim, strip quotes, drop zero-width characters and collapse whitespace
pub fn clean_text(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '\u{feff}' | '\u{200b}' | '\u{200c}' | '\u{200d}'))
        .collect();
    stripped
        .trim()
        .trim_matches('"')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-platform normalization counts
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct NormalizeReport {
    pub platform: Option<Platform>,
    pub passed: usize,
    pub dropped: usize,
    /// reason → count
    pub drop_reasons: BTreeMap<String, usize>,
}

impl NormalizeReport {
    fn drop_row(&mut self, reason: &str) {
        self.dropped += 1;
        *self.drop_reasons.entry(reason.to_string()).or_default() += 1;
    }
}

/// Normalized records plus counts
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<PlatformRecord>,
    pub report: NormalizeReport,
}

/// Row normalizer (Tier 1 concept)
///
/// Pure: the input table is not modified and nothing outside the batch is touched.
#[derive(Debug, Default)]
pub struct RowNormalizer;

struct RowView<'a> {
    table: &'a RawTable,
    columns: &'a ResolvedColumns,
    row: usize,
}

impl<'a> RowView<'a> {
    fn raw(&self, field: Field) -> Option<&'a str> {
        self.columns
            .index(field)
            .map(|column| self.table.cell(self.row, column))
    }

    fn text(&self, field: Field) -> String {
        self.raw(field).map(clean_text).unwrap_or_default()
    }

    fn number(&self, field: Field) -> f64 {
        self.raw(field).map(parse_numeric).unwrap_or(0.0)
    }

    fn points(&self, field: Field) -> f64 {
        self.raw(field).map(parse_percentage_points).unwrap_or(0.0)
    }

    fn has_column(&self, field: Field) -> bool {
        self.columns.has(field)
    }

    /// True when the column exists and the cell is non-blank
    fn present(&self, field: Field) -> bool {
        self.raw(field).map(|s| !s.trim().is_empty()).unwrap_or(false)
    }
}

impl RowNormalizer {
    pub fn normalize(&self, table: &RawTable, columns: &ResolvedColumns) -> NormalizedBatch {
        let mut batch = NormalizedBatch {
            records: Vec::with_capacity(table.len()),
            report: NormalizeReport {
                platform: Some(table.platform),
                ..Default::default()
            },
        };

        for row in 0..table.len() {
            let view = RowView {
                table,
                columns,
                row,
            };

            let Some(day) = view.raw(Field::Day).and_then(normalize_date) else {
                debug!(platform = %table.platform, row, "Dropping row without parseable date");
                batch.report.drop_row("unparseable date");
                continue;
            };

            let record = match table.platform {
                Platform::Meta => self.meta_row(&view, day),
                Platform::Google => self.google_row(&view, day),
                Platform::Shopify => self.shopify_row(&view, day),
            };

            match record {
                Ok(record) => {
                    batch.report.passed += 1;
                    batch.records.push(record);
                }
                Err(reason) => {
                    debug!(platform = %table.platform, row, reason, "Dropping row");
                    batch.report.drop_row(reason);
                }
            }
        }

        if batch.report.dropped > 0 {
            warn!(
                platform = %table.platform,
                passed = batch.report.passed,
                dropped = batch.report.dropped,
                "Rows dropped during normalization"
            );
        } else {
            info!(
                platform = %table.platform,
                passed = batch.report.passed,
                "Rows normalized"
            );
        }

        batch
    }

    fn meta_row(&self, view: &RowView<'_>, day: String) -> Result<PlatformRecord, &'static str> {
        let campaign = view.text(Field::Campaign);
        if campaign.is_empty() {
            return Err("missing campaign");
        }
        if !view.present(Field::Spend) {
            return Err("missing spend");
        }

        Ok(PlatformRecord::Meta(MetaRow {
            day,
            campaign,
            ad_set: view.text(Field::AdSet),
            ad: view.text(Field::Ad),
            ad_set_delivery: view.text(Field::AdSetDelivery),
            spend: view.number(Field::Spend),
            impressions: view.number(Field::Impressions),
            link_clicks: view.number(Field::Clicks),
            ctr_points: view.points(Field::Ctr),
            cpm: view.number(Field::Cpm),
            purchases: view.number(Field::Conversions),
            purchase_value: view.number(Field::ConversionValue),
        }))
    }

    fn google_row(&self, view: &RowView<'_>, day: String) -> Result<PlatformRecord, &'static str> {
        let campaign = view.text(Field::Campaign);
        if campaign.is_empty() {
            return Err("missing campaign");
        }
        if !view.present(Field::Spend) {
            return Err("missing spend");
        }

        Ok(PlatformRecord::Google(GoogleRow {
            day,
            campaign,
            cost: view.number(Field::Spend),
            impressions: view.number(Field::Impressions),
            clicks: view.number(Field::Clicks),
            ctr_points: view.points(Field::Ctr),
            avg_cpm: view.number(Field::Cpm),
            conversions: view.number(Field::Conversions),
            conversion_value: view.number(Field::ConversionValue),
        }))
    }

    fn shopify_row(&self, view: &RowView<'_>, day: String) -> Result<PlatformRecord, &'static str> {
        if !view.present(Field::Visitors) && !view.present(Field::Sessions) {
            return Err("missing visitors");
        }
        // Rows with an empty utm_campaign are unattributed traffic. They are
        // kept for the site-wide daily totals; no ad row can join to them.
        let visitors = view.number(Field::Visitors);
        let sessions = if view.has_column(Field::Sessions) {
            view.number(Field::Sessions)
        } else {
            visitors
        };

        Ok(PlatformRecord::Shopify(ShopifyRow {
            day,
            utm_campaign: view.text(Field::UtmCampaign),
            utm_term: view.text(Field::UtmTerm),
            utm_content: view.text(Field::UtmContent),
            visitors,
            sessions,
            pageviews: view.number(Field::Pageviews),
            add_to_cart: view.number(Field::AddToCart),
            reached_checkout: view.number(Field::ReachedCheckout),
            completed_checkout: view.number(Field::CompletedCheckout),
            avg_session_duration_secs: view
                .raw(Field::AvgSessionDuration)
                .map(parse_duration_seconds)
                .unwrap_or(0.0),
            total_sales: view.number(Field::TotalSales),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tier1::schema_validator::SchemaValidator;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_parse_numeric_currency_and_separators() {
        assert!(approx(parse_numeric("$1,234.56"), 1234.56));
        assert!(approx(parse_numeric("1234.56"), 1234.56));
        assert!(approx(parse_numeric("₹ 12,00,000"), 1_200_000.0));
        assert!(approx(parse_numeric("INR 500"), 500.0));
        assert!(approx(parse_numeric("(50.5)"), -50.5));
    }

    #[test]
    fn test_parse_numeric_percent() {
        assert!(approx(parse_numeric("24.78%"), 0.2478));
        assert!(approx(parse_numeric(" 100 % "), 1.0));
    }

    #[test]
    fn test_parse_numeric_garbage_is_zero() {
        assert_eq!(parse_numeric(""), 0.0);
        assert_eq!(parse_numeric("--"), 0.0);
        assert_eq!(parse_numeric("N/A"), 0.0);
        assert_eq!(parse_numeric("abc"), 0.0);
        assert_eq!(parse_numeric("inf"), 0.0);
        assert_eq!(parse_numeric("NaN"), 0.0);
    }

    #[test]
    fn test_parse_percentage_points() {
        assert!(approx(parse_percentage_points("2.5%"), 2.5));
        assert!(approx(parse_percentage_points("2.5"), 2.5));
        assert_eq!(parse_percentage_points("x"), 0.0);
    }

    #[test]
    fn test_parse_duration_forms() {
        assert!(approx(parse_duration_seconds("83"), 83.0));
        assert!(approx(parse_duration_seconds("00:01:23"), 83.0));
        assert!(approx(parse_duration_seconds("1:05"), 65.0));
        assert!(approx(parse_duration_seconds("1m 23s"), 83.0));
        assert!(approx(parse_duration_seconds("45s"), 45.0));
        assert_eq!(parse_duration_seconds(""), 0.0);
        assert_eq!(parse_duration_seconds("a:b"), 0.0);
    }

    #[test]
    fn test_normalize_date_formats() {
        let expected = Some("2025-09-29".to_string());
        assert_eq!(normalize_date("2025-09-29"), expected);
        assert_eq!(normalize_date("2025/09/29"), expected);
        assert_eq!(normalize_date("09/29/2025"), expected);
        assert_eq!(normalize_date("29/09/2025"), expected);
        assert_eq!(normalize_date("Sep 29, 2025"), expected);
        assert_eq!(normalize_date("29 Sep 2025"), expected);
        assert_eq!(normalize_date("2025-09-29T10:15:00Z"), expected);
        assert_eq!(normalize_date("2025-09-29 10:15:00"), expected);
        assert_eq!(normalize_date("2025-09-29 - 2025-09-30"), expected);
        assert_eq!(normalize_date("not a date"), None);
        assert_eq!(normalize_date(""), None);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  \"Summer   Sale\" "), "Summer Sale");
        assert_eq!(clean_text("\u{feff}C1\u{200b}"), "C1");
    }

    fn normalize(table: &RawTable) -> NormalizedBatch {
        let columns = SchemaValidator
            .validate_headers(table.platform, &table.headers)
            .unwrap();
        RowNormalizer.normalize(table, &columns)
    }

    #[test]
    fn test_meta_rows_drop_missing_date_and_campaign() {
        let table = RawTable::from_records(
            Platform::Meta,
            &[
                vec![("Campaign", "C1"), ("AdSet", "A1"), ("Ad", "Ad1"), ("Day", "2025-09-29"), ("Spend", "1,000")],
                vec![("Campaign", "C1"), ("AdSet", "A1"), ("Ad", "Ad1"), ("Day", "someday"), ("Spend", "10")],
                vec![("Campaign", ""), ("AdSet", "A1"), ("Ad", "Ad1"), ("Day", "2025-09-29"), ("Spend", "10")],
                vec![("Campaign", "C2"), ("AdSet", "A1"), ("Ad", "Ad1"), ("Day", "2025-09-29"), ("Spend", "")],
            ],
        );

        let batch = normalize(&table);
        assert_eq!(batch.report.passed, 1);
        assert_eq!(batch.report.dropped, 3);
        assert_eq!(batch.report.drop_reasons.get("unparseable date"), Some(&1));
        assert_eq!(batch.report.drop_reasons.get("missing campaign"), Some(&1));
        assert_eq!(batch.report.drop_reasons.get("missing spend"), Some(&1));

        match &batch.records[0] {
            PlatformRecord::Meta(row) => {
                assert_eq!(row.campaign, "C1");
                assert_eq!(row.spend, 1000.0);
                assert_eq!(row.day, "2025-09-29");
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_shopify_sessions_fall_back_to_visitors() {
        let table = RawTable::from_records(
            Platform::Shopify,
            &[vec![
                ("Day", "2025-09-29"),
                ("UTM campaign", ""),
                ("UTM term", ""),
                ("UTM content", ""),
                ("Online store visitors", "42"),
                ("Average session duration", "00:01:30"),
            ]],
        );

        let batch = normalize(&table);
        assert_eq!(batch.report.passed, 1);
        let PlatformRecord::Shopify(row) = &batch.records[0] else {
            panic!("expected Shopify record");
        };
        assert_eq!(row.visitors, 42.0);
        assert_eq!(row.sessions, 42.0);
        assert_eq!(row.avg_session_duration_secs, 90.0);
        assert!(row.utm_campaign.is_empty());
    }

    #[test]
    fn test_shopify_rows_without_utm_campaign_are_kept() {
        let table = RawTable::from_records(
            Platform::Shopify,
            &[
                vec![
                    ("Day", "2025-09-29"),
                    ("UTM campaign", "  "),
                    ("UTM term", "A1"),
                    ("UTM content", "Ad1"),
                    ("Online store visitors", "7"),
                ],
                vec![
                    ("Day", "2025-09-29"),
                    ("UTM campaign", "C1"),
                    ("UTM term", "A1"),
                    ("UTM content", "Ad1"),
                    ("Online store visitors", ""),
                ],
            ],
        );

        let batch = normalize(&table);
        assert_eq!(batch.report.passed, 1);
        assert_eq!(batch.report.drop_reasons.get("missing visitors"), Some(&1));
        assert!(batch.report.drop_reasons.get("missing campaign").is_none());
        let PlatformRecord::Shopify(row) = &batch.records[0] else {
            panic!("expected Shopify record");
        };
        assert_eq!(row.utm_campaign, "");
        assert_eq!(row.visitors, 7.0);
    }

    #[test]
    fn test_google_ctr_kept_in_points() {
        let table = RawTable::from_records(
            Platform::Google,
            &[vec![("Day", "2025-09-29"), ("Campaign", "G1"), ("Cost", "$200"), ("CTR", "3.5%")]],
        );

        let batch = normalize(&table);
        let PlatformRecord::Google(row) = &batch.records[0] else {
            panic!("expected Google record");
        };
        assert_eq!(row.cost, 200.0);
        assert!(approx(row.ctr_points, 3.5));
    }
}
