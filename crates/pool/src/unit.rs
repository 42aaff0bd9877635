//! Execution-unit contracts and the tokio-backed provider.
//!
//! The scheduler never talks to a concrete worker implementation: it
//! acquires units through a [`CapabilityProvider`] and sends payloads
//! through the [`ExecutionUnit`] trait, the same way whether units are
//! reused across tasks or recreated per dispatch. Results flow back over
//! a report channel owned by the scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use fanout_core::{PoolError, Sequence, TaskId, WorkFn, WorkPayload};

/// Pool-assigned unit identity.
pub type UnitId = usize;

/// Whether a unit survives across dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Reused across tasks; torn down at pool shutdown.
    Persistent,
    /// Created per dispatch; torn down once idle with no queued work.
    Ephemeral,
}

/// A unit's report back to the scheduler: one partition's result or
/// failure.
#[derive(Debug)]
pub struct UnitReport {
    pub unit: UnitId,
    pub task: TaskId,
    pub partition: usize,
    pub outcome: Result<Sequence, PoolError>,
}

/// Sender half of the scheduler's report channel, cloned into every unit.
pub type ReportSender = mpsc::UnboundedSender<UnitReport>;

/// One pooled or transient worker.
#[async_trait]
pub trait ExecutionUnit: Send + Sync {
    fn id(&self) -> UnitId;

    /// Deliver a work payload to the unit.
    async fn send(&self, payload: WorkPayload) -> Result<(), PoolError>;

    /// Tear the unit down. In-flight work is abandoned.
    fn terminate(&self);
}

/// Deployment-target capabilities, injected at pool construction.
///
/// One implementation exists per target; the scheduler never branches on
/// runtime feature flags itself.
pub trait CapabilityProvider: Send + Sync {
    /// Upper bound on concurrently dispatched units.
    fn max_concurrency(&self) -> usize;

    /// Whether units can be reused across tasks.
    fn supports_persistent_units(&self) -> bool;

    /// Whether payload data moves to units rather than being copied.
    fn supports_zero_copy(&self) -> bool;

    /// The kind of unit `spawn_unit` produces.
    fn unit_kind(&self) -> UnitKind;

    /// Produce a new unit reporting results over `reports`.
    fn spawn_unit(
        &self,
        id: UnitId,
        reports: ReportSender,
    ) -> Result<Box<dyn ExecutionUnit>, PoolError>;
}

/// Wrap a caller closure into the loadable work handle units execute.
pub fn prepare_work<F>(work: F) -> WorkFn
where
    F: Fn(&WorkPayload) -> Result<Sequence, String> + Send + Sync + 'static,
{
    Arc::new(work)
}

// ── Tokio-backed provider ────────────────────────────────────────────

/// Capability provider backed by tokio tasks.
///
/// Each unit is a spawned task draining an inbox of payloads; persistent
/// units live until terminated, ephemeral units until the scheduler tears
/// them down after their report. In-process payload transfer is always
/// zero-copy.
pub struct TokioProvider {
    max_concurrency: usize,
    persistent: bool,
}

impl TokioProvider {
    /// Provider with a persistent, reusable unit pool.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            persistent: true,
        }
    }

    /// Provider that recreates units per dispatch.
    pub fn ephemeral(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            persistent: false,
        }
    }
}

impl CapabilityProvider for TokioProvider {
    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn supports_persistent_units(&self) -> bool {
        self.persistent
    }

    fn supports_zero_copy(&self) -> bool {
        true
    }

    fn unit_kind(&self) -> UnitKind {
        if self.persistent {
            UnitKind::Persistent
        } else {
            UnitKind::Ephemeral
        }
    }

    fn spawn_unit(
        &self,
        id: UnitId,
        reports: ReportSender,
    ) -> Result<Box<dyn ExecutionUnit>, PoolError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkPayload>();
        let worker = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                trace!(unit = id, task = %payload.task, partition = payload.partition, "unit executing");
                let partition = payload.partition;
                let outcome = (payload.work)(&payload).map_err(|message| {
                    PoolError::UnitRuntimeError { partition, message }
                });
                let report = UnitReport {
                    unit: id,
                    task: payload.task,
                    partition,
                    outcome,
                };
                if reports.send(report).is_err() {
                    // Scheduler is gone; nothing left to report to.
                    break;
                }
            }
        });
        Ok(Box::new(TokioUnit { id, tx, worker }))
    }
}

struct TokioUnit {
    id: UnitId,
    tx: mpsc::UnboundedSender<WorkPayload>,
    worker: JoinHandle<()>,
}

#[async_trait]
impl ExecutionUnit for TokioUnit {
    fn id(&self) -> UnitId {
        self.id
    }

    async fn send(&self, payload: WorkPayload) -> Result<(), PoolError> {
        self.tx
            .send(payload)
            .map_err(|_| PoolError::UnitCommunicationError("unit inbox closed".to_string()))
    }

    fn terminate(&self) {
        self.worker.abort();
    }
}
