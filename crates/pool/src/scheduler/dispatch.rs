use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use fanout_core::{PoolError, TaskRequest, WorkPayload};

use crate::combine::CombineSpec;
use crate::diagnostics::LifecyclePhase;
use crate::partition::split_ranges;
use crate::payload::{build_payload, PayloadSource};
use crate::unit::{UnitId, UnitKind};

use super::core::{ActiveTask, ReplySender, SchedulerCore};

impl SchedulerCore {
    /// Admit a task: validate the partition count, split the input, and
    /// dispatch or enqueue every partition.
    pub(super) async fn submit(&mut self, request: TaskRequest, reply: ReplySender) {
        let requested = request.partitions;
        if requested < 1 || requested > self.max_concurrency {
            let _ = reply.send(Err(PoolError::InvalidPartitionCount {
                requested,
                capacity: self.max_concurrency,
            }));
            return;
        }

        let TaskRequest {
            work,
            input,
            partitions: _,
            aggregate,
            sort,
            mixed_output,
            data_kind,
            shared_buffer,
            params,
        } = request;

        let input = Arc::new(input);
        // Shared-buffer tasks process the buffer in place; ranges come
        // from its length, not the input sequence's.
        let input_len = match &shared_buffer {
            Some(buffer) => buffer.len(),
            None => input.len(),
        };
        let ranges = split_ranges(input_len, requested);

        let id = Uuid::new_v4();
        let spec = CombineSpec {
            aggregate,
            sort,
            mixed_output,
            data_kind: data_kind.or_else(|| shared_buffer.as_ref().map(|b| b.kind())),
        };
        let source = PayloadSource {
            task: id,
            work: &work,
            input: &input,
            shared: shared_buffer.as_ref(),
            params: &params,
            zero_copy: self.zero_copy,
        };
        let payloads: Vec<WorkPayload> = ranges
            .into_iter()
            .enumerate()
            .map(|(index, range)| build_payload(&source, index, range))
            .collect();

        info!(task = %id, partitions = payloads.len(), "task submitted");
        self.tasks.insert(
            id,
            ActiveTask {
                partitions: payloads.len(),
                slots: vec![None; payloads.len()],
                assigned: Vec::new(),
                dispatched: 0,
                spec,
                shared: shared_buffer,
                reply: Some(reply),
            },
        );

        for payload in payloads {
            self.record(id, payload.partition, LifecyclePhase::Created);
            self.dispatch(payload).await;
            if !self.tasks.contains_key(&id) {
                // The task already failed (queue full, spawn failure);
                // remaining partitions are moot.
                break;
            }
        }
    }

    /// Dispatch a work item to an idle unit, or queue it when the pool
    /// is saturated. Never blocks.
    pub(super) async fn dispatch(&mut self, payload: WorkPayload) {
        if self.running.len() >= self.max_concurrency {
            if self.config.pending_capacity != 0
                && self.pending.len() >= self.config.pending_capacity
            {
                let depth = self.pending.len();
                self.fail_task(payload.task, PoolError::QueueFull(depth));
                return;
            }
            self.record(payload.task, payload.partition, LifecyclePhase::Enqueued);
            debug!(
                task = %payload.task,
                partition = payload.partition,
                "pool saturated, work item queued"
            );
            self.pending.push_back(payload);
            return;
        }

        match self.acquire_unit() {
            Ok(unit_id) => self.start_on(unit_id, payload).await,
            Err(err) => self.fail_task(payload.task, err),
        }
    }

    /// Mark a unit dispatched, register it against the task, and send the
    /// payload.
    pub(super) async fn start_on(&mut self, unit_id: UnitId, payload: WorkPayload) {
        let task_id = payload.task;
        let partition = payload.partition;

        self.running.insert(unit_id);
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.assigned.push(unit_id);
            task.dispatched += 1;
        }
        self.record(task_id, partition, LifecyclePhase::Started);

        let sent = match self.units.get(&unit_id) {
            Some(slot) => slot.unit.send(payload).await,
            None => Err(PoolError::UnitCommunicationError(format!(
                "unknown unit {unit_id}"
            ))),
        };
        if let Err(err) = sent {
            warn!(unit = unit_id, task = %task_id, error = %err, "payload delivery failed");
            self.running.remove(&unit_id);
            if let Some(slot) = self.units.remove(&unit_id) {
                slot.unit.terminate();
            }
            self.fail_task(task_id, err);
        }
    }

    /// A unit went idle: hand it the queue head, or park/terminate it.
    pub(super) async fn release_unit(&mut self, unit_id: UnitId) {
        if !self.units.contains_key(&unit_id) {
            return;
        }
        // FIFO drain, skipping entries whose task was already abandoned.
        while let Some(payload) = self.pending.pop_front() {
            if !self.tasks.contains_key(&payload.task) {
                continue;
            }
            self.record(payload.task, payload.partition, LifecyclePhase::Dequeued);
            self.start_on(unit_id, payload).await;
            return;
        }
        match self.units.get(&unit_id).map(|slot| slot.kind) {
            Some(UnitKind::Persistent) => self.idle.push_back(unit_id),
            Some(UnitKind::Ephemeral) => {
                if let Some(slot) = self.units.remove(&unit_id) {
                    debug!(unit = unit_id, "terminating ephemeral unit");
                    slot.unit.terminate();
                }
            }
            None => {}
        }
    }
}
