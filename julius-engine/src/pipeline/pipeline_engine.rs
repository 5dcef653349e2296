// Pipeline Engine
//
// Coordinates Tier 1 → Tier 2 → Tier 3 for one run over three platform exports.
//
// Run phases:
// 1. Schema validation (fatal on missing required columns, before any row work)
// 2. Tier 1: normalization and quality repair, per platform
// 3. Tier 2: harmonization, attribution join, business metrics
// 4. Tier 3: shrinkage, scoring, output tables
//
// Stages run strictly in sequence; the engine yields to the runtime between
// stages so progress subscribers on the same runtime get scheduled. Nothing
// survives a run: every call to `run` starts from the raw tables.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::pipeline::progress_broadcaster::ProgressBroadcaster;
use crate::pipeline::tier1::{
    quality_validator::{QualityReport, QualityValidator},
    row_normalizer::{NormalizeReport, RowNormalizer},
    schema_validator::{ResolvedColumns, SchemaValidator},
};
use crate::pipeline::tier2::{
    attribution_joiner::{AttributionJoiner, JoinStats},
    business_metrics::BusinessMetrics,
    utm_harmonizer::UtmHarmonizer,
};
use crate::pipeline::tier3::{
    bayes_shrinkage::{BatchPriors, BayesShrinkage},
    output_builder::{blended_cost_per_user, AdRow, AdSetRow, DailySummaryRow, OutputBuilder},
    scorer::{ScoredRow, Scorer},
};
use crate::pipeline::types::{Platform, PlatformRecord, RawTable};
use chrono::{DateTime, Utc};
use julius_common::events::{EventBus, PipelineEvent, PipelineStage};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Raw exports for one run; `None` skips a platform
#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub meta: Option<RawTable>,
    pub google: Option<RawTable>,
    pub shopify: Option<RawTable>,
}

impl PipelineInput {
    fn tables(&self) -> [(Platform, Option<&RawTable>); 3] {
        [
            (Platform::Meta, self.meta.as_ref()),
            (Platform::Google, self.google.as_ref()),
            (Platform::Shopify, self.shopify.as_ref()),
        ]
    }

    fn row_count(&self, platform: Platform) -> usize {
        let table = match platform {
            Platform::Meta => &self.meta,
            Platform::Google => &self.google,
            Platform::Shopify => &self.shopify,
        };
        table.as_ref().map_or(0, RawTable::len)
    }
}

/// Per-run diagnostics, written as `run_report.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub normalization: Vec<NormalizeReport>,
    pub quality: QualityReport,
    pub templated_sessions: usize,
    pub join: JoinStats,
    pub priors: BatchPriors,
    /// Total spend over total Shopify sessions across all days
    pub blended_cost_per_user: f64,
    pub daily_rows: usize,
    pub ad_set_rows: usize,
    pub ad_rows: usize,
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run_id: Uuid,
    pub daily: Vec<DailySummaryRow>,
    pub ad_sets: Vec<AdSetRow>,
    pub ads: Vec<AdRow>,
    pub scored_rows: Vec<ScoredRow>,
    pub report: RunReport,
}

/// Sequential pipeline engine
pub struct PipelineEngine {
    // Tier 1
    schema_validator: SchemaValidator,
    normalizer: RowNormalizer,
    quality_validator: QualityValidator,

    // Tier 2
    harmonizer: UtmHarmonizer,
    joiner: AttributionJoiner,

    // Tier 3
    shrinkage: BayesShrinkage,
    scorer: Scorer,
    output_builder: OutputBuilder,

    broadcaster: Option<ProgressBroadcaster>,
    config: EngineConfig,
}

impl Default for PipelineEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl PipelineEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            schema_validator: SchemaValidator,
            normalizer: RowNormalizer,
            quality_validator: QualityValidator::new(config.validator.clone()),
            harmonizer: UtmHarmonizer::new(config.harmonizer.clone()),
            joiner: AttributionJoiner,
            shrinkage: BayesShrinkage::new(config.shrinkage.clone()),
            scorer: Scorer::new(config.scoring.clone()),
            output_builder: OutputBuilder::new(&config),
            broadcaster: None,
            config,
        }
    }

    /// Publish progress events on `bus`
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.broadcaster = Some(ProgressBroadcaster::new(
            bus,
            self.config.progress.throttle_interval_ms,
        ));
        self
    }

    fn emit(&mut self, event: PipelineEvent) {
        if let Some(broadcaster) = &mut self.broadcaster {
            broadcaster.emit(event);
        }
    }

    fn stage_done(&mut self, run_id: Uuid, stage: PipelineStage, rows_in: usize, rows_out: usize) {
        debug!(%run_id, %stage, rows_in, rows_out, "Stage complete");
        self.emit(PipelineEvent::StageCompleted {
            run_id,
            stage,
            rows_in,
            rows_out,
            timestamp: Utc::now(),
        });
    }

    /// Run every stage over `input`
    ///
    /// # Errors
    /// `EngineError::Validation` when any supplied table lacks a required column.
    /// No other condition aborts a run.
    pub async fn run(&mut self, input: PipelineInput) -> EngineResult<PipelineOutput> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            %run_id,
            meta_rows = input.row_count(Platform::Meta),
            google_rows = input.row_count(Platform::Google),
            shopify_rows = input.row_count(Platform::Shopify),
            "Pipeline run started"
        );
        self.emit(PipelineEvent::RunStarted {
            run_id,
            meta_rows: input.row_count(Platform::Meta),
            google_rows: input.row_count(Platform::Google),
            shopify_rows: input.row_count(Platform::Shopify),
            timestamp: started_at,
        });

        // Phase 1: schema validation for every table before any row is touched
        let mut resolved: Vec<(&RawTable, ResolvedColumns)> = Vec::new();
        let mut raw_rows = 0;
        for (platform, table) in input.tables() {
            let Some(table) = table else {
                debug!(%run_id, %platform, "No export supplied, skipping");
                continue;
            };
            match self.schema_validator.validate_headers(platform, &table.headers) {
                Ok(columns) => {
                    raw_rows += table.len();
                    resolved.push((table, columns));
                }
                Err(e) => {
                    error!(%run_id, %platform, "Schema validation failed: {}", e);
                    self.emit(PipelineEvent::RunFailed {
                        run_id,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(e.into());
                }
            }
        }
        self.stage_done(run_id, PipelineStage::SchemaValidation, raw_rows, raw_rows);
        tokio::task::yield_now().await;

        // Phase 2: Tier 1
        let mut records: Vec<PlatformRecord> = Vec::with_capacity(raw_rows);
        let mut normalization = Vec::with_capacity(resolved.len());
        for (table, columns) in &resolved {
            let batch = self.normalizer.normalize(table, columns);
            for (reason, count) in &batch.report.drop_reasons {
                self.emit(PipelineEvent::RowsDropped {
                    run_id,
                    stage: PipelineStage::Normalization,
                    platform: columns.platform.to_string(),
                    count: *count,
                    reason: reason.clone(),
                });
            }
            records.extend(batch.records);
            normalization.push(batch.report);
        }
        self.stage_done(run_id, PipelineStage::Normalization, raw_rows, records.len());
        tokio::task::yield_now().await;

        let quality = self.quality_validator.apply(&mut records);
        if quality.total_fixes() > 0 {
            self.emit(PipelineEvent::RowsDropped {
                run_id,
                stage: PipelineStage::QualityValidation,
                platform: "all".to_string(),
                count: quality.total_fixes(),
                reason: "values repaired".to_string(),
            });
        }
        self.stage_done(
            run_id,
            PipelineStage::QualityValidation,
            records.len(),
            records.len(),
        );
        tokio::task::yield_now().await;

        // Phase 3: Tier 2
        let record_count = records.len();
        let batch = self.harmonizer.harmonize(records);
        let templated_sessions = batch.templated_sessions();
        self.stage_done(
            run_id,
            PipelineStage::Harmonization,
            record_count,
            batch.ads.len() + batch.sessions.len(),
        );
        tokio::task::yield_now().await;

        let attribution = self.joiner.join(&batch);
        if attribution.stats.templated_excluded > 0 {
            self.emit(PipelineEvent::RowsDropped {
                run_id,
                stage: PipelineStage::Attribution,
                platform: Platform::Shopify.to_string(),
                count: attribution.stats.templated_excluded,
                reason: "templated UTM".to_string(),
            });
        }
        self.stage_done(
            run_id,
            PipelineStage::Attribution,
            batch.ads.len() + batch.sessions.len(),
            attribution.rows.len(),
        );
        tokio::task::yield_now().await;

        let metrics = BusinessMetrics::for_all(&attribution.rows);
        self.stage_done(
            run_id,
            PipelineStage::BusinessMetrics,
            attribution.rows.len(),
            metrics.len(),
        );
        tokio::task::yield_now().await;

        // Phase 4: Tier 3
        let priors = self.shrinkage.compute_priors(&attribution.rows);
        let shrinkage = self.shrinkage.apply(&attribution.rows);
        self.stage_done(
            run_id,
            PipelineStage::Shrinkage,
            attribution.rows.len(),
            shrinkage.len(),
        );
        tokio::task::yield_now().await;

        let scored_rows = self
            .scorer
            .score_rows(attribution.rows.clone(), metrics, shrinkage);
        self.stage_done(
            run_id,
            PipelineStage::Scoring,
            attribution.rows.len(),
            scored_rows.len(),
        );
        tokio::task::yield_now().await;

        let tables = self.output_builder.build(&batch, &attribution.rows);
        let output_rows = tables.daily.len() + tables.ad_sets.len() + tables.ads.len();
        self.stage_done(
            run_id,
            PipelineStage::OutputBuilding,
            scored_rows.len(),
            output_rows,
        );

        let duration_ms = clock.elapsed().as_millis() as u64;
        let report = RunReport {
            run_id,
            started_at,
            duration_ms,
            normalization,
            quality,
            templated_sessions,
            join: attribution.stats,
            priors,
            blended_cost_per_user: blended_cost_per_user(&batch),
            daily_rows: tables.daily.len(),
            ad_set_rows: tables.ad_sets.len(),
            ad_rows: tables.ads.len(),
        };

        info!(
            %run_id,
            daily = report.daily_rows,
            ad_sets = report.ad_set_rows,
            ads = report.ad_rows,
            duration_ms,
            "Pipeline run complete"
        );
        self.emit(PipelineEvent::RunCompleted {
            run_id,
            daily_rows: report.daily_rows,
            ad_set_rows: report.ad_set_rows,
            ad_rows: report.ad_rows,
            duration_ms,
            timestamp: Utc::now(),
        });

        Ok(PipelineOutput {
            run_id,
            daily: tables.daily,
            ad_sets: tables.ad_sets,
            ads: tables.ads,
            scored_rows,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn meta_table() -> RawTable {
        RawTable::from_records(
            Platform::Meta,
            &[vec![
                ("Day", "2025-09-29"),
                ("Campaign name", "C1"),
                ("Ad set name", "A1"),
                ("Ad name", "Ad1"),
                ("Amount spent (INR)", "1000"),
                ("Impressions", "20000"),
            ]],
        )
    }

    fn shopify_table(term: &str) -> RawTable {
        RawTable::from_records(
            Platform::Shopify,
            &[vec![
                ("Day", "2025-09-29"),
                ("UTM campaign", "C1"),
                ("UTM term", term),
                ("UTM content", "Ad1"),
                ("Online store visitors", "100"),
            ]],
        )
    }

    #[tokio::test]
    async fn test_run_emits_milestones_and_stages() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let mut engine = PipelineEngine::default().with_events(bus);

        let output = engine
            .run(PipelineInput {
                meta: Some(meta_table()),
                google: None,
                shopify: Some(shopify_table("A1")),
            })
            .await
            .unwrap();

        assert_eq!(output.scored_rows.len(), 1);
        assert_eq!(output.scored_rows[0].metrics.cost_per_user, 10.0);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(PipelineEvent::RunStarted { .. })));
        assert!(matches!(events.last(), Some(PipelineEvent::RunCompleted { .. })));
        let stages = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::StageCompleted { .. }))
            .count();
        assert_eq!(stages, PipelineStage::all().len());
        assert!(events.iter().all(|e| e.run_id() == output.run_id));
    }

    #[tokio::test]
    async fn test_missing_column_fails_before_normalization() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let mut engine = PipelineEngine::default().with_events(bus);

        let broken = RawTable::from_records(
            Platform::Google,
            &[vec![("Day", "2025-09-29"), ("Campaign", "G1")]],
        );
        let result = engine
            .run(PipelineInput {
                meta: Some(meta_table()),
                google: Some(broken),
                shopify: None,
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_fatal_input_error());
        assert!(matches!(err, EngineError::Validation(_)));

        let mut saw_failed = false;
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, PipelineEvent::StageCompleted { .. }));
            saw_failed |= matches!(event, PipelineEvent::RunFailed { .. });
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_tables() {
        let mut engine = PipelineEngine::default();
        let output = engine.run(PipelineInput::default()).await.unwrap();
        assert!(output.daily.is_empty());
        assert!(output.ad_sets.is_empty());
        assert!(output.scored_rows.is_empty());
    }
}
