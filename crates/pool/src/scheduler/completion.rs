use tracing::{debug, info, warn};

use fanout_core::{PoolError, Sequence, TaskId, TaskOutput};

use crate::combine::{apply_sort, combine};
use crate::diagnostics::LifecyclePhase;
use crate::unit::UnitReport;

use super::core::SchedulerCore;

enum Placement {
    /// Result stored; true when the task is ready to finalize.
    Stored(bool),
    OutOfRange,
    Abandoned,
}

impl SchedulerCore {
    /// Handle a unit's report: free the unit, place or reject the result,
    /// then put the unit back to work.
    pub(super) async fn on_report(&mut self, report: UnitReport) {
        let UnitReport {
            unit,
            task,
            partition,
            outcome,
        } = report;

        self.running.remove(&unit);
        if let Some(active) = self.tasks.get_mut(&task) {
            active.assigned.retain(|assigned| *assigned != unit);
        }

        match outcome {
            Ok(result) => self.place_result(task, partition, result),
            Err(err) => self.fail_task(task, err),
        }

        self.release_unit(unit).await;
    }

    /// Index-addressed result placement: the slot is chosen by the
    /// message's originating partition index, never by arrival order.
    fn place_result(&mut self, task_id: TaskId, partition: usize, result: Sequence) {
        let placement = match self.tasks.get_mut(&task_id) {
            Some(active) => match active.slots.get_mut(partition) {
                Some(slot) => {
                    if slot.is_none() {
                        *slot = Some(result);
                    } else {
                        warn!(task = %task_id, partition, "duplicate result ignored");
                    }
                    Placement::Stored(
                        active.assigned.is_empty()
                            && active.dispatched == active.partitions
                            && active.slots.iter().all(Option::is_some),
                    )
                }
                None => Placement::OutOfRange,
            },
            None => Placement::Abandoned,
        };

        match placement {
            Placement::Stored(ready) => {
                self.record(task_id, partition, LifecyclePhase::Completed);
                if ready {
                    self.finalize(task_id);
                }
            }
            Placement::OutOfRange => {
                self.fail_task(
                    task_id,
                    PoolError::UnitCommunicationError(format!(
                        "result for unknown partition {partition}"
                    )),
                );
            }
            Placement::Abandoned => {
                debug!(task = %task_id, partition, "result for abandoned task dropped");
            }
        }
    }

    /// Combine the ordered slots, resolve the caller, and clear the task.
    /// Runs exactly once per task: the task is removed before resolving.
    fn finalize(&mut self, task_id: TaskId) {
        let Some(mut active) = self.tasks.remove(&task_id) else {
            return;
        };
        let outcome = match &active.shared {
            Some(buffer) => {
                // Partitions wrote the buffer in place; the snapshot is
                // already contiguous and ordered.
                let mut output = TaskOutput::Single(Sequence::Numeric(buffer.snapshot()));
                if let Some(order) = active.spec.sort {
                    apply_sort(&mut output, order);
                }
                Ok(output)
            }
            None => {
                let slots: Vec<Sequence> = active.slots.drain(..).flatten().collect();
                combine(slots, &active.spec)
            }
        };
        info!(task = %task_id, "task finalized");
        if let Some(reply) = active.reply.take() {
            if reply.send(outcome).is_err() {
                debug!(task = %task_id, "caller dropped before result delivery");
            }
        }
    }

    /// First error is terminal for the task: reject the caller and drop
    /// the bookkeeping. In-flight partitions are not awaited; their late
    /// reports find no task and are dropped, and queued entries are
    /// skipped at drain time.
    pub(super) fn fail_task(&mut self, task_id: TaskId, err: PoolError) {
        if let Some(mut active) = self.tasks.remove(&task_id) {
            warn!(task = %task_id, kind = err.kind(), error = %err, "task failed");
            if let Some(reply) = active.reply.take() {
                let _ = reply.send(Err(err));
            }
        }
    }

    /// Tear down every unit and reject every outstanding task.
    pub(super) fn shutdown(&mut self) {
        info!(
            units = self.units.len(),
            tasks = self.tasks.len(),
            "pool shutting down"
        );
        self.pending.clear();
        self.idle.clear();
        self.running.clear();
        for (_, slot) in self.units.drain() {
            slot.unit.terminate();
        }
        for (_, mut active) in self.tasks.drain() {
            if let Some(reply) = active.reply.take() {
                let _ = reply.send(Err(PoolError::PoolClosed));
            }
        }
    }
}
