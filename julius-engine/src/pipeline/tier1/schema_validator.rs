// Tier 1: Schema Validator
//
// Concept: Resolve each platform's header row against its column specification
// Synchronization: Accepts RawTable headers, outputs ResolvedColumns or a fatal ValidationError
//
// Column specs are either a single name or an ordered list of alternative names
// (first match wins). Header comparison is trimmed and case-insensitive.
// A missing required column is a hard stop for the whole run: it is reported
// before any row is normalized or aggregated.

use crate::error::ValidationError;
use crate::pipeline::types::Platform;
use std::collections::HashMap;
use tracing::{debug, info};

/// Logical field a column maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Day,
    Campaign,
    AdSet,
    Ad,
    AdSetDelivery,
    Spend,
    Impressions,
    Clicks,
    Ctr,
    Cpm,
    Conversions,
    ConversionValue,
    UtmCampaign,
    UtmTerm,
    UtmContent,
    Visitors,
    Sessions,
    Pageviews,
    AddToCart,
    ReachedCheckout,
    CompletedCheckout,
    AvgSessionDuration,
    TotalSales,
}

/// Column name specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSpec {
    Single(&'static str),
    OneOf(&'static [&'static str]),
}

impl ColumnSpec {
    /// Candidate names in priority order
    pub fn names(&self) -> &[&'static str] {
        match self {
            Self::Single(name) => std::slice::from_ref(name),
            Self::OneOf(names) => names,
        }
    }

    /// Human-readable description used in error messages
    pub fn describe(&self) -> String {
        match self {
            Self::Single(name) => (*name).to_string(),
            Self::OneOf(names) => match names.split_first() {
                Some((first, [])) => (*first).to_string(),
                Some((first, rest)) => format!("{} (or: {})", first, rest.join(", ")),
                None => String::new(),
            },
        }
    }

    /// Index of the first candidate name present in `headers`
    fn find(&self, headers: &[String]) -> Option<usize> {
        self.names().iter().find_map(|candidate| {
            headers
                .iter()
                .position(|h| normalize_header(h) == normalize_header(candidate))
        })
    }
}

/// Header comparison form: trimmed, BOM-free, lowercase
fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
}

/// Column specification for one platform
#[derive(Debug, Clone)]
pub struct PlatformSchema {
    pub platform: Platform,
    pub required: Vec<(Field, ColumnSpec)>,
    pub optional: Vec<(Field, ColumnSpec)>,
}

impl PlatformSchema {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Meta => Self::meta(),
            Platform::Google => Self::google(),
            Platform::Shopify => Self::shopify(),
        }
    }

    pub fn meta() -> Self {
        Self {
            platform: Platform::Meta,
            required: vec![
                (Field::Day, ColumnSpec::OneOf(&["Day", "Date", "Reporting starts"])),
                (Field::Campaign, ColumnSpec::OneOf(&["Campaign name", "Campaign"])),
                (Field::AdSet, ColumnSpec::OneOf(&["Ad set name", "AdSet", "Ad Set"])),
                (Field::Ad, ColumnSpec::OneOf(&["Ad name", "Ad"])),
                (
                    Field::Spend,
                    ColumnSpec::OneOf(&["Amount spent (INR)", "Amount spent", "Spend"]),
                ),
            ],
            optional: vec![
                (Field::AdSetDelivery, ColumnSpec::OneOf(&["Ad set delivery", "Delivery"])),
                (Field::Impressions, ColumnSpec::Single("Impressions")),
                (Field::Clicks, ColumnSpec::OneOf(&["Link clicks", "Clicks (all)", "Clicks"])),
                (
                    Field::Ctr,
                    ColumnSpec::OneOf(&[
                        "CTR (link click-through rate)",
                        "CTR (all)",
                        "CTR",
                    ]),
                ),
                (
                    Field::Cpm,
                    ColumnSpec::OneOf(&["CPM (cost per 1,000 impressions)", "CPM"]),
                ),
                (Field::Conversions, ColumnSpec::OneOf(&["Purchases", "Results"])),
                (
                    Field::ConversionValue,
                    ColumnSpec::OneOf(&["Purchases conversion value", "Purchase conversion value"]),
                ),
            ],
        }
    }

    pub fn google() -> Self {
        Self {
            platform: Platform::Google,
            required: vec![
                (Field::Day, ColumnSpec::OneOf(&["Day", "Date"])),
                (Field::Campaign, ColumnSpec::OneOf(&["Campaign", "Campaign name"])),
                (Field::Spend, ColumnSpec::OneOf(&["Cost", "Spend", "Amount spent"])),
            ],
            optional: vec![
                (Field::Impressions, ColumnSpec::OneOf(&["Impr.", "Impressions"])),
                (Field::Clicks, ColumnSpec::Single("Clicks")),
                (Field::Ctr, ColumnSpec::Single("CTR")),
                (Field::Cpm, ColumnSpec::OneOf(&["Avg. CPM", "CPM"])),
                (Field::Conversions, ColumnSpec::Single("Conversions")),
                (
                    Field::ConversionValue,
                    ColumnSpec::OneOf(&["Conv. value", "Conversion value"]),
                ),
            ],
        }
    }

    pub fn shopify() -> Self {
        Self {
            platform: Platform::Shopify,
            required: vec![
                (Field::Day, ColumnSpec::OneOf(&["Day", "Date"])),
                (Field::UtmCampaign, ColumnSpec::Single("UTM campaign")),
                (Field::UtmTerm, ColumnSpec::Single("UTM term")),
                (Field::UtmContent, ColumnSpec::Single("UTM content")),
                (
                    Field::Visitors,
                    ColumnSpec::OneOf(&["Online store visitors", "Visitors"]),
                ),
            ],
            optional: vec![
                (Field::Sessions, ColumnSpec::Single("Sessions")),
                (Field::Pageviews, ColumnSpec::OneOf(&["Pageviews", "Page views"])),
                (
                    Field::AddToCart,
                    ColumnSpec::OneOf(&["Sessions with cart additions", "Added to cart"]),
                ),
                (
                    Field::ReachedCheckout,
                    ColumnSpec::OneOf(&["Sessions that reached checkout", "Reached checkout"]),
                ),
                (
                    Field::CompletedCheckout,
                    ColumnSpec::OneOf(&[
                        "Sessions that completed checkout",
                        "Completed checkout",
                        "Orders",
                    ]),
                ),
                (
                    Field::AvgSessionDuration,
                    ColumnSpec::OneOf(&["Average session duration", "Avg. session duration"]),
                ),
                (Field::TotalSales, ColumnSpec::OneOf(&["Total sales", "Sales"])),
            ],
        }
    }
}

/// Header positions resolved for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub platform: Platform,
    columns: HashMap<Field, usize>,
}

impl ResolvedColumns {
    /// Column index for `field`, if present in the export
    pub fn index(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn has(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }
}

/// Schema validator (Tier 1 concept)
#[derive(Debug, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    /// Resolve `headers` against the platform schema
    ///
    /// # Errors
    /// `ValidationError::MissingColumns` naming the platform and every required
    /// column for which neither the name nor any alternative is present.
    pub fn validate_headers(
        &self,
        platform: Platform,
        headers: &[String],
    ) -> Result<ResolvedColumns, ValidationError> {
        let schema = PlatformSchema::for_platform(platform);
        let mut columns = HashMap::new();
        let mut missing = Vec::new();

        for (field, spec) in &schema.required {
            match spec.find(headers) {
                Some(index) => {
                    columns.insert(*field, index);
                }
                None => missing.push(spec.describe()),
            }
        }

        if !missing.is_empty() {
            return Err(ValidationError::MissingColumns { platform, missing });
        }

        for (field, spec) in &schema.optional {
            if let Some(index) = spec.find(headers) {
                columns.insert(*field, index);
            } else {
                debug!(%platform, "Optional column {} not present", spec.describe());
            }
        }

        info!(
            %platform,
            resolved = columns.len(),
            headers = headers.len(),
            "Schema validated"
        );

        Ok(ResolvedColumns { platform, columns })
    }
}
