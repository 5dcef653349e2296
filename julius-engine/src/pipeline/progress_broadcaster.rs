// Progress Broadcaster
//
// Concept: Publish pipeline progress events with throttling
// Synchronization: Called by the pipeline engine, emits PipelineEvent on an EventBus
//
// Throttling strategy:
// - RunStarted / RunCompleted / RunFailed: immediate (milestones)
// - StageCompleted / RowsDropped: at most one per throttle interval
//
// A bus without subscribers is not an error; the pipeline never waits on consumers.

use julius_common::events::{EventBus, PipelineEvent};
use std::time::{Duration, Instant};
use tracing::debug;

/// Progress event broadcaster with throttling
pub struct ProgressBroadcaster {
    bus: EventBus,
    /// Last emission time for throttled events
    last_emission: Option<Instant>,
    throttle_interval: Duration,
    throttled: usize,
}

impl ProgressBroadcaster {
    /// `throttle_interval_ms` of 0 disables throttling
    pub fn new(bus: EventBus, throttle_interval_ms: u64) -> Self {
        Self {
            bus,
            last_emission: None,
            throttle_interval: Duration::from_millis(throttle_interval_ms),
            throttled: 0,
        }
    }

    /// Emit an event, applying throttling to non-milestone events
    ///
    /// Returns true if the event reached at least one subscriber.
    pub fn emit(&mut self, event: PipelineEvent) -> bool {
        if !event.is_milestone() && !self.throttle_interval.is_zero() {
            if let Some(last) = self.last_emission {
                let elapsed = last.elapsed();
                if elapsed < self.throttle_interval {
                    debug!(
                        "Progress: throttling event ({}ms since last < {}ms)",
                        elapsed.as_millis(),
                        self.throttle_interval.as_millis()
                    );
                    self.throttled += 1;
                    return false;
                }
            }
            self.last_emission = Some(Instant::now());
        }

        self.send(event)
    }

    /// Emit bypassing throttling
    pub fn emit_immediate(&self, event: PipelineEvent) -> bool {
        self.send(event)
    }

    fn send(&self, event: PipelineEvent) -> bool {
        match self.bus.emit(event) {
            Ok(receivers) => {
                debug!("Progress: event delivered to {} receivers", receivers);
                true
            }
            Err(e) => {
                debug!("Progress: no receivers for event: {}", e.0.to_json_line());
                false
            }
        }
    }

    /// Events skipped by throttling so far
    pub fn throttled_count(&self) -> usize {
        self.throttled
    }
}
