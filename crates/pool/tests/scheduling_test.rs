//! Scheduler behavior under controlled completion order.
//!
//! A manual capability provider captures every dispatched payload instead
//! of executing it, so tests decide exactly when and in what order
//! partitions report back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use fanout_pool::{
    CapabilityProvider, DiagnosticsSink, ExecutionUnit, LifecycleEvent, LifecyclePhase, Pool,
    PoolConfig, PoolError, ReportSender, Sequence, TaskId, TaskOutput, TaskRequest, UnitId,
    UnitKind, UnitReport, WorkFn, WorkPayload,
};

// ── Manual provider ──────────────────────────────────────────────────

struct Dispatch {
    unit: UnitId,
    payload: WorkPayload,
    reports: ReportSender,
}

#[derive(Default)]
struct Exchange {
    dispatches: Mutex<Vec<Dispatch>>,
    seen: AtomicUsize,
    spawned: AtomicUsize,
    terminated: Mutex<Vec<UnitId>>,
}

impl Exchange {
    /// Total payloads ever handed to a unit.
    fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }

    fn in_flight(&self) -> usize {
        self.dispatches.lock().unwrap().len()
    }

    async fn wait_for_seen(&self, n: usize) {
        for _ in 0..500 {
            if self.seen() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("timed out waiting for {n} dispatches (have {})", self.seen());
    }

    /// Remove the captured dispatch for a given partition (and task, when
    /// disambiguation is needed).
    fn take(&self, task: Option<TaskId>, partition: usize) -> Dispatch {
        let mut dispatches = self.dispatches.lock().unwrap();
        let index = dispatches
            .iter()
            .position(|d| {
                d.payload.partition == partition && task.map_or(true, |t| d.payload.task == t)
            })
            .unwrap_or_else(|| panic!("no captured dispatch for partition {partition}"));
        dispatches.remove(index)
    }

    fn newest(&self) -> (TaskId, usize) {
        let dispatches = self.dispatches.lock().unwrap();
        let last = dispatches.last().expect("no dispatches captured");
        (last.payload.task, last.payload.partition)
    }
}

struct ManualProvider {
    max: usize,
    persistent: bool,
    exchange: Arc<Exchange>,
}

impl ManualProvider {
    fn persistent(max: usize, exchange: Arc<Exchange>) -> Self {
        Self {
            max,
            persistent: true,
            exchange,
        }
    }

    fn ephemeral(max: usize, exchange: Arc<Exchange>) -> Self {
        Self {
            max,
            persistent: false,
            exchange,
        }
    }
}

impl CapabilityProvider for ManualProvider {
    fn max_concurrency(&self) -> usize {
        self.max
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
        self.exchange.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ManualUnit {
            id,
            reports,
            exchange: Arc::clone(&self.exchange),
        }))
    }
}

struct ManualUnit {
    id: UnitId,
    reports: ReportSender,
    exchange: Arc<Exchange>,
}

#[async_trait]
impl ExecutionUnit for ManualUnit {
    fn id(&self) -> UnitId {
        self.id
    }

    async fn send(&self, payload: WorkPayload) -> Result<(), PoolError> {
        self.exchange.seen.fetch_add(1, Ordering::SeqCst);
        self.exchange.dispatches.lock().unwrap().push(Dispatch {
            unit: self.id,
            payload,
            reports: self.reports.clone(),
        });
        Ok(())
    }

    fn terminate(&self) {
        self.exchange.terminated.lock().unwrap().push(self.id);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn unused_work() -> WorkFn {
    // Manual units never execute the work function.
    Arc::new(|payload: &WorkPayload| payload.input().map_err(|e| e.to_string()))
}

fn int_values(range: std::ops::Range<i64>) -> Sequence {
    Sequence::Values(range.map(Value::from).collect())
}

fn doubled(payload: &WorkPayload) -> Sequence {
    match payload.input().unwrap() {
        Sequence::Values(values) => Sequence::Values(
            values
                .iter()
                .map(|v| Value::from(v.as_i64().unwrap() * 2))
                .collect(),
        ),
        Sequence::Numeric(_) => panic!("expected values"),
    }
}

fn report_ok(dispatch: Dispatch, result: Sequence) {
    let report = UnitReport {
        unit: dispatch.unit,
        task: dispatch.payload.task,
        partition: dispatch.payload.partition,
        outcome: Ok(result),
    };
    dispatch.reports.send(report).unwrap();
}

fn report_err(dispatch: Dispatch, err: PoolError) {
    let report = UnitReport {
        unit: dispatch.unit,
        task: dispatch.payload.task,
        partition: dispatch.payload.partition,
        outcome: Err(err),
    };
    dispatch.reports.send(report).unwrap();
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn out_of_order_completion_preserves_input_order() {
    let exchange = Arc::new(Exchange::default());
    let provider = Arc::new(ManualProvider::persistent(4, Arc::clone(&exchange)));
    let pool = Pool::new(provider, PoolConfig::default());

    let request = TaskRequest::new(unused_work(), int_values(1..9))
        .partitions(4)
        .aggregate(true);
    let handle = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run(request).await }
    });

    exchange.wait_for_seen(4).await;

    // Complete in a scrambled order; placement is index-addressed.
    for partition in [2, 0, 3, 1] {
        let dispatch = exchange.take(None, partition);
        let result = doubled(&dispatch.payload);
        report_ok(dispatch, result);
    }

    let expected = Sequence::Values((1..9i64).map(|v| Value::from(v * 2)).collect());
    let output = handle.await.unwrap().unwrap();
    assert_eq!(output, TaskOutput::Single(expected));
}

#[tokio::test]
async fn admission_bound_and_fifo_drain() {
    let exchange = Arc::new(Exchange::default());
    let provider = Arc::new(ManualProvider::persistent(2, Arc::clone(&exchange)));
    let pool = Pool::new(provider, PoolConfig::default());

    let task_a = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.run(
                TaskRequest::new(unused_work(), int_values(0..4))
                    .partitions(2)
                    .aggregate(true),
            )
            .await
        }
    });
    exchange.wait_for_seen(2).await;
    let a_id = exchange.newest().0;

    // Pool is saturated: the second task's partitions queue up.
    let task_b = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.run(
                TaskRequest::new(unused_work(), int_values(10..14))
                    .partitions(2)
                    .aggregate(true),
            )
            .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(exchange.seen(), 2, "dispatched units must stay within the bound");
    assert_eq!(exchange.in_flight(), 2);

    // Each completion frees a unit for exactly one queued entry, in FIFO
    // order: task B's partition 0 first, then partition 1.
    let dispatch = exchange.take(Some(a_id), 0);
    let result = dispatch.payload.input().unwrap();
    report_ok(dispatch, result);
    exchange.wait_for_seen(3).await;
    let (next_task, next_partition) = exchange.newest();
    assert_ne!(next_task, a_id);
    assert_eq!(next_partition, 0);
    assert_eq!(exchange.seen(), 3);

    let dispatch = exchange.take(Some(a_id), 1);
    let result = dispatch.payload.input().unwrap();
    report_ok(dispatch, result);
    exchange.wait_for_seen(4).await;
    let (next_task, next_partition) = exchange.newest();
    assert_ne!(next_task, a_id);
    assert_eq!(next_partition, 1);

    let b_id = next_task;
    for partition in [1, 0] {
        let dispatch = exchange.take(Some(b_id), partition);
        let result = dispatch.payload.input().unwrap();
        report_ok(dispatch, result);
    }

    assert_eq!(
        task_a.await.unwrap().unwrap(),
        TaskOutput::Single(int_values(0..4))
    );
    assert_eq!(
        task_b.await.unwrap().unwrap(),
        TaskOutput::Single(int_values(10..14))
    );
    // Two persistent units total, never more.
    assert_eq!(exchange.spawned.load(Ordering::SeqCst), 2);
    assert!(exchange.terminated.lock().unwrap().is_empty());
}

#[tokio::test]
async fn ephemeral_unit_reused_for_queued_work_then_terminated() {
    let exchange = Arc::new(Exchange::default());
    let provider = Arc::new(ManualProvider::ephemeral(1, Arc::clone(&exchange)));
    let pool = Pool::new(provider, PoolConfig::default());

    let first = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.run(TaskRequest::new(unused_work(), int_values(0..2)))
                .await
        }
    });
    exchange.wait_for_seen(1).await;

    let second = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.run(TaskRequest::new(unused_work(), int_values(5..7)))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(exchange.seen(), 1);

    // Completing the first task hands the queued item to the same unit
    // before any teardown.
    let dispatch = exchange.take(None, 0);
    let unit = dispatch.unit;
    let result = dispatch.payload.input().unwrap();
    report_ok(dispatch, result);
    exchange.wait_for_seen(2).await;
    assert!(exchange.terminated.lock().unwrap().is_empty());

    let dispatch = exchange.take(None, 0);
    assert_eq!(dispatch.unit, unit, "queued work reuses the idle unit");
    let result = dispatch.payload.input().unwrap();
    report_ok(dispatch, result);

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    // With the queue drained the ephemeral unit is torn down.
    for _ in 0..500 {
        if !exchange.terminated.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(*exchange.terminated.lock().unwrap(), vec![unit]);
    assert_eq!(exchange.spawned.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn first_error_abandons_task_and_drops_late_results() {
    let exchange = Arc::new(Exchange::default());
    let provider = Arc::new(ManualProvider::persistent(2, Arc::clone(&exchange)));
    let pool = Pool::new(provider, PoolConfig::default());

    let handle = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.run(
                TaskRequest::new(unused_work(), int_values(0..4))
                    .partitions(2)
                    .aggregate(true),
            )
            .await
        }
    });
    exchange.wait_for_seen(2).await;

    let dispatch = exchange.take(None, 1);
    report_err(
        dispatch,
        PoolError::UnitRuntimeError {
            partition: 1,
            message: "exploded".to_string(),
        },
    );

    let err = handle.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), "unit-runtime-error");
    assert_eq!(err.origin_partition(), Some(1));

    // The surviving partition's result arrives late and is dropped; the
    // pool stays healthy for the next task.
    let dispatch = exchange.take(None, 0);
    let result = dispatch.payload.input().unwrap();
    report_ok(dispatch, result);

    let follow_up = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.run(TaskRequest::new(unused_work(), int_values(0..2)))
                .await
        }
    });
    exchange.wait_for_seen(3).await;
    let dispatch = exchange.take(None, 0);
    let result = dispatch.payload.input().unwrap();
    report_ok(dispatch, result);
    assert_eq!(
        follow_up.await.unwrap().unwrap(),
        TaskOutput::Single(int_values(0..2))
    );
}

#[tokio::test]
async fn invalid_partition_count_rejected_before_any_spawn() {
    let exchange = Arc::new(Exchange::default());
    let provider = Arc::new(ManualProvider::persistent(4, Arc::clone(&exchange)));
    let config = PoolConfig {
        warm_start: false,
        ..PoolConfig::default()
    };
    let pool = Pool::new(provider, config);

    let err = pool
        .run(TaskRequest::new(unused_work(), int_values(0..4)).partitions(0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PoolError::InvalidPartitionCount {
            requested: 0,
            capacity: 4
        }
    ));

    let err = pool
        .run(TaskRequest::new(unused_work(), int_values(0..4)).partitions(5))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::InvalidPartitionCount { .. }));

    assert_eq!(exchange.spawned.load(Ordering::SeqCst), 0);
    assert_eq!(exchange.seen(), 0);
}

#[tokio::test]
async fn diagnostics_sink_sees_full_partition_lifecycle() {
    struct RecordingSink {
        events: Mutex<Vec<LifecycleEvent>>,
    }

    impl DiagnosticsSink for RecordingSink {
        fn record(&self, event: LifecycleEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    let exchange = Arc::new(Exchange::default());
    let provider = Arc::new(ManualProvider::persistent(1, Arc::clone(&exchange)));
    let sink = Arc::new(RecordingSink {
        events: Mutex::new(Vec::new()),
    });
    let pool = Pool::with_diagnostics(
        provider,
        PoolConfig::default(),
        Some(sink.clone() as Arc<dyn DiagnosticsSink>),
    );

    let first = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.run(TaskRequest::new(unused_work(), int_values(0..2)))
                .await
        }
    });
    exchange.wait_for_seen(1).await;

    let second = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.run(TaskRequest::new(unused_work(), int_values(5..7)))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let queued_task = {
        let events = sink.events.lock().unwrap();
        events
            .iter()
            .find(|e| e.phase == LifecyclePhase::Enqueued)
            .expect("second task should queue")
            .task
    };

    let dispatch = exchange.take(None, 0);
    let result = dispatch.payload.input().unwrap();
    report_ok(dispatch, result);
    exchange.wait_for_seen(2).await;
    let dispatch = exchange.take(None, 0);
    let result = dispatch.payload.input().unwrap();
    report_ok(dispatch, result);

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let events = sink.events.lock().unwrap();
    let phases: Vec<LifecyclePhase> = events
        .iter()
        .filter(|e| e.task == queued_task)
        .map(|e| e.phase)
        .collect();
    assert_eq!(
        phases,
        vec![
            LifecyclePhase::Created,
            LifecyclePhase::Enqueued,
            LifecyclePhase::Dequeued,
            LifecyclePhase::Started,
            LifecyclePhase::Completed,
        ]
    );
}

#[tokio::test]
async fn pending_capacity_rejects_overflow_tasks() {
    let exchange = Arc::new(Exchange::default());
    let provider = Arc::new(ManualProvider::persistent(1, Arc::clone(&exchange)));
    let config = PoolConfig {
        pending_capacity: 1,
        ..PoolConfig::default()
    };
    let pool = Pool::new(provider, config);

    let first = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.run(TaskRequest::new(unused_work(), int_values(0..2)))
                .await
        }
    });
    exchange.wait_for_seen(1).await;

    let second = tokio::spawn({
        let pool = pool.clone();
        async move {
            pool.run(TaskRequest::new(unused_work(), int_values(3..5)))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Queue holds one entry; a third task overflows and is rejected.
    let err = pool
        .run(TaskRequest::new(unused_work(), int_values(6..8)))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::QueueFull(_)));

    let dispatch = exchange.take(None, 0);
    let result = dispatch.payload.input().unwrap();
    report_ok(dispatch, result);
    exchange.wait_for_seen(2).await;
    let dispatch = exchange.take(None, 0);
    let result = dispatch.payload.input().unwrap();
    report_ok(dispatch, result);

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
}
