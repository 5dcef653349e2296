// Tier 2: Attribution
//
// Modules in this tier work on harmonized records from all platforms together.
//
// Contract: Vec<PlatformRecord> -> HarmonizedBatch -> AttributionTable,
//           and BusinessMetrics derived from any PerformanceSample

pub mod utm_harmonizer;      // Canonical records, campaign aliases, session flags
pub mod attribution_joiner;  // Aggregate-then-join of Shopify sessions onto ad rows
pub mod business_metrics;    // Division-safe cost and rate metrics
