// Tier 1: Ingest
//
// Each module in this tier is an independent concept working on one platform
// export at a time. Nothing here joins across platforms.
//
// Contract: RawTable headers -> ResolvedColumns (fatal on missing columns),
//           RawTable rows -> Vec<PlatformRecord> (+ NormalizeReport),
//           Vec<PlatformRecord> -> repaired in place (+ QualityReport)

pub mod schema_validator;   // Required/optional column resolution
pub mod row_normalizer;     // Tolerant numeric, date and text coercion
pub mod quality_validator;  // Bounds clamping and funnel consistency fixes
