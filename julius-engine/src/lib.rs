//! julius-engine: marketing attribution pipeline
//!
//! Joins Meta Ads and Google Ads spend to Shopify session analytics by UTM key,
//! derives business metrics, stabilises rate metrics with empirical Bayes
//! shrinkage and scores every campaign, ad set and ad.
//!
//! Library entry point is [`PipelineEngine::run`]; the `julius-engine` binary
//! wraps it with CSV loading and writing.

pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;

pub use crate::config::EngineConfig;
pub use crate::error::{EngineError, EngineResult, ValidationError};
pub use crate::pipeline::pipeline_engine::{PipelineEngine, PipelineInput, PipelineOutput, RunReport};
pub use crate::pipeline::types::{Platform, RawTable, Recommendation, Source};
