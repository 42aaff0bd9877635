use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use fanout_core::{
    PoolConfig, PoolError, Sequence, SharedBuffer, TaskId, TaskOutput, WorkPayload,
};

use crate::combine::CombineSpec;
use crate::diagnostics::{DiagnosticsSink, LifecycleEvent, LifecyclePhase};
use crate::unit::{CapabilityProvider, ExecutionUnit, ReportSender, UnitId, UnitKind};

/// Resolves the caller's outstanding request.
pub(super) type ReplySender = oneshot::Sender<Result<TaskOutput, PoolError>>;

/// A pooled unit and its lifecycle mode.
pub(super) struct UnitSlot {
    pub(super) unit: Box<dyn ExecutionUnit>,
    pub(super) kind: UnitKind,
}

/// Bookkeeping for one in-flight task.
///
/// A task holds only the ids of its currently assigned units; the pool
/// owns unit lifecycles exclusively.
pub(super) struct ActiveTask {
    /// Partition count N after splitting.
    pub(super) partitions: usize,
    /// Ordered result slots: index i holds the result of partition i.
    pub(super) slots: Vec<Option<Sequence>>,
    /// Units currently working on this task.
    pub(super) assigned: Vec<UnitId>,
    /// Partitions actually handed to a unit so far.
    pub(super) dispatched: usize,
    pub(super) spec: CombineSpec,
    pub(super) shared: Option<Arc<SharedBuffer>>,
    pub(super) reply: Option<ReplySender>,
}

/// The scheduler's single-threaded state. Owned by the driver task; all
/// mutation happens in its event handlers.
pub(super) struct SchedulerCore {
    pub(super) provider: Arc<dyn CapabilityProvider>,
    pub(super) config: PoolConfig,
    pub(super) max_concurrency: usize,
    pub(super) zero_copy: bool,
    pub(super) units: HashMap<UnitId, UnitSlot>,
    pub(super) idle: VecDeque<UnitId>,
    pub(super) running: HashSet<UnitId>,
    pub(super) pending: VecDeque<WorkPayload>,
    pub(super) tasks: HashMap<TaskId, ActiveTask>,
    pub(super) reports_tx: ReportSender,
    pub(super) next_unit_id: UnitId,
    pub(super) diagnostics: Option<Arc<dyn DiagnosticsSink>>,
}

impl SchedulerCore {
    pub(super) fn new(
        provider: Arc<dyn CapabilityProvider>,
        config: PoolConfig,
        reports_tx: ReportSender,
        diagnostics: Option<Arc<dyn DiagnosticsSink>>,
    ) -> Self {
        let max_concurrency = config.resolved_max_concurrency(provider.max_concurrency());
        let zero_copy = provider.supports_zero_copy();
        let mut core = Self {
            provider,
            config,
            max_concurrency,
            zero_copy,
            units: HashMap::new(),
            idle: VecDeque::new(),
            running: HashSet::new(),
            pending: VecDeque::new(),
            tasks: HashMap::new(),
            reports_tx,
            next_unit_id: 0,
            diagnostics,
        };
        if core.provider.supports_persistent_units() && core.config.warm_start {
            core.warm_up();
        }
        core
    }

    /// Spawn the full persistent pool up front.
    fn warm_up(&mut self) {
        for _ in 0..self.max_concurrency {
            match self.spawn_unit() {
                Ok(id) => self.idle.push_back(id),
                Err(err) => {
                    warn!(error = %err, "warm start spawn failed; units will spawn on demand");
                    break;
                }
            }
        }
    }

    /// Reuse an idle unit if one exists, else spawn.
    pub(super) fn acquire_unit(&mut self) -> Result<UnitId, PoolError> {
        if let Some(id) = self.idle.pop_front() {
            return Ok(id);
        }
        self.spawn_unit()
    }

    pub(super) fn spawn_unit(&mut self) -> Result<UnitId, PoolError> {
        let id = self.next_unit_id;
        let unit = self.provider.spawn_unit(id, self.reports_tx.clone())?;
        self.next_unit_id += 1;
        let kind = self.provider.unit_kind();
        debug!(unit = id, kind = ?kind, "spawned execution unit");
        self.units.insert(id, UnitSlot { unit, kind });
        Ok(id)
    }

    pub(super) fn record(&self, task: TaskId, partition: usize, phase: LifecyclePhase) {
        if let Some(sink) = &self.diagnostics {
            sink.record(LifecycleEvent::now(task, partition, phase));
        }
    }
}
