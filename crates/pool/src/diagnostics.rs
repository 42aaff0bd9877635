//! Per-partition lifecycle diagnostics.
//!
//! Purely observational: sinks receive timestamped events and never feed
//! back into scheduling decisions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use fanout_core::TaskId;

/// A point in a partition's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Work item built at submission.
    Created,
    /// Queued because the pool was saturated.
    Enqueued,
    /// Popped from the pending queue.
    Dequeued,
    /// Dispatched to a unit.
    Started,
    /// Result placed in its slot.
    Completed,
}

/// A timestamped lifecycle event for one partition.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub task: TaskId,
    pub partition: usize,
    pub phase: LifecyclePhase,
    pub at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn now(task: TaskId, partition: usize, phase: LifecyclePhase) -> Self {
        Self {
            task,
            partition,
            phase,
            at: Utc::now(),
        }
    }
}

/// Receives partition lifecycle events when diagnostics are enabled.
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, event: LifecycleEvent);
}

/// Sink that emits lifecycle events as `tracing` debug logs.
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(&self, event: LifecycleEvent) {
        debug!(
            task = %event.task,
            partition = event.partition,
            phase = ?event.phase,
            at = %event.at,
            "partition lifecycle"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct RecordingSink {
        events: Mutex<Vec<LifecycleEvent>>,
    }

    impl DiagnosticsSink for RecordingSink {
        fn record(&self, event: LifecycleEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn events_carry_partition_and_phase() {
        let sink = RecordingSink {
            events: Mutex::new(Vec::new()),
        };
        let task = Uuid::new_v4();
        sink.record(LifecycleEvent::now(task, 2, LifecyclePhase::Enqueued));
        sink.record(LifecycleEvent::now(task, 2, LifecyclePhase::Dequeued));

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].phase, LifecyclePhase::Enqueued);
        assert_eq!(events[1].phase, LifecyclePhase::Dequeued);
        assert!(events[0].at <= events[1].at);
    }

    #[test]
    fn phase_serializes_snake_case() {
        let json = serde_json::to_string(&LifecyclePhase::Enqueued).unwrap();
        assert_eq!(json, "\"enqueued\"");
    }
}
