use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use fanout_core::{PoolConfig, PoolError, TaskOutput, TaskRequest};

use crate::diagnostics::DiagnosticsSink;
use crate::unit::{CapabilityProvider, UnitReport};

use super::core::{ReplySender, SchedulerCore};

enum PoolEvent {
    Submit {
        request: TaskRequest,
        reply: ReplySender,
    },
    Shutdown,
}

/// Handle to a running pool.
///
/// Cheap to clone; tasks submitted through any clone share the same
/// units, admission limit, and pending queue. Construction spawns the
/// scheduler's driver task, so a tokio runtime must be current. Dropping
/// every handle shuts the pool down.
#[derive(Clone)]
pub struct Pool {
    events: mpsc::UnboundedSender<PoolEvent>,
}

impl Pool {
    /// Start a pool on the given capability provider.
    pub fn new(provider: Arc<dyn CapabilityProvider>, config: PoolConfig) -> Pool {
        Self::with_diagnostics(provider, config, None)
    }

    /// Start a pool with an optional diagnostics sink receiving
    /// per-partition lifecycle events.
    pub fn with_diagnostics(
        provider: Arc<dyn CapabilityProvider>,
        config: PoolConfig,
        diagnostics: Option<Arc<dyn DiagnosticsSink>>,
    ) -> Pool {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let core = SchedulerCore::new(provider, config, reports_tx, diagnostics);
        tokio::spawn(drive(core, events_rx, reports_rx));
        Pool { events: events_tx }
    }

    /// Submit a task and await its combined result.
    ///
    /// Resolves once every partition has reported, or rejects on the
    /// task's first error. Partition-count validation fails here before
    /// any unit is involved.
    pub async fn run(&self, request: TaskRequest) -> Result<TaskOutput, PoolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.events
            .send(PoolEvent::Submit {
                request,
                reply: reply_tx,
            })
            .map_err(|_| PoolError::PoolClosed)?;
        reply_rx.await.map_err(|_| PoolError::PoolClosed)?
    }

    /// Tear down all units and reject outstanding tasks.
    pub fn shutdown(&self) {
        let _ = self.events.send(PoolEvent::Shutdown);
    }
}

/// The scheduler's event loop: the only place pool state is mutated.
async fn drive(
    mut core: SchedulerCore,
    mut events: mpsc::UnboundedReceiver<PoolEvent>,
    mut reports: mpsc::UnboundedReceiver<UnitReport>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(PoolEvent::Submit { request, reply }) => core.submit(request, reply).await,
                Some(PoolEvent::Shutdown) | None => {
                    core.shutdown();
                    break;
                }
            },
            Some(report) = reports.recv() => core.on_report(report).await,
        }
    }
}
