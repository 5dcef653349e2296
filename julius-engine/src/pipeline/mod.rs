//! # Attribution Pipeline
//!
//! **Three-tier architecture:**
//!
//! ## Tier 1: Ingest (per platform)
//! - `schema_validator` - Resolve headers; missing required columns abort the run
//! - `row_normalizer` - Coerce string cells into typed platform records
//! - `quality_validator` - Clamp out-of-range values and fix funnel inconsistencies
//!
//! ## Tier 2: Attribution (cross platform)
//! - `utm_harmonizer` - Canonical ad and session records with quality flags
//! - `attribution_joiner` - Aggregate Shopify sessions by UTM key, then join onto ad rows
//! - `business_metrics` - Cost-per and rate metrics that never divide by zero
//!
//! ## Tier 3: Scoring
//! - `bayes_shrinkage` - Shrink CTR and conversion rate toward per-source priors
//! - `scorer` - Efficiency, quality and volume scores plus a recommendation
//! - `output_builder` - Daily top-level, ad-set and ad tables
//!
//! ## Orchestration
//! - `pipeline_engine` - Sequential run over all stages with progress events
//! - `progress_broadcaster` - Throttled emission of per-stage events

pub mod tier1;
pub mod tier2;
pub mod tier3;
pub mod pipeline_engine;
pub mod progress_broadcaster;

// Shared types and data contracts between tiers
pub mod types;
