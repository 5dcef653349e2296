//! Pipeline progress events
//!
//! Every run emits a stream of [`PipelineEvent`]s on an [`EventBus`]. Consumers
//! (the CLI progress printer, a UI bridge) subscribe; the pipeline never waits on
//! them, and a bus without subscribers is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline stage identifiers, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    SchemaValidation,
    Normalization,
    QualityValidation,
    Harmonization,
    Attribution,
    BusinessMetrics,
    Shrinkage,
    Scoring,
    OutputBuilding,
}

impl PipelineStage {
    /// All stages in execution order
    pub fn all() -> &'static [PipelineStage] {
        &[
            Self::SchemaValidation,
            Self::Normalization,
            Self::QualityValidation,
            Self::Harmonization,
            Self::Attribution,
            Self::BusinessMetrics,
            Self::Shrinkage,
            Self::Scoring,
            Self::OutputBuilding,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchemaValidation => "schema_validation",
            Self::Normalization => "normalization",
            Self::QualityValidation => "quality_validation",
            Self::Harmonization => "harmonization",
            Self::Attribution => "attribution",
            Self::BusinessMetrics => "business_metrics",
            Self::Shrinkage => "shrinkage",
            Self::Scoring => "scoring",
            Self::OutputBuilding => "output_building",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress events emitted during a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Run accepted, input row counts known
    RunStarted {
        run_id: Uuid,
        meta_rows: usize,
        google_rows: usize,
        shopify_rows: usize,
        timestamp: DateTime<Utc>,
    },

    /// A stage finished
    StageCompleted {
        run_id: Uuid,
        stage: PipelineStage,
        rows_in: usize,
        rows_out: usize,
        timestamp: DateTime<Utc>,
    },

    /// Rows were dropped or repaired by a recoverable check
    RowsDropped {
        run_id: Uuid,
        stage: PipelineStage,
        platform: String,
        count: usize,
        reason: String,
    },

    /// Output tables built
    RunCompleted {
        run_id: Uuid,
        daily_rows: usize,
        ad_set_rows: usize,
        ad_rows: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Fatal failure (missing required columns, cancelled load)
    RunFailed {
        run_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Run id the event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StageCompleted { run_id, .. }
            | Self::RowsDropped { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. } => *run_id,
        }
    }

    /// Milestone events are never throttled
    pub fn is_milestone(&self) -> bool {
        matches!(
            self,
            Self::RunStarted { .. } | Self::RunCompleted { .. } | Self::RunFailed { .. }
        )
    }

    /// Single-line JSON rendering for log sinks
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Broadcast bus for pipeline events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
