//! Concurrency instrumentation for the batch collector.
//!
//! The instrumented gateway tracks how many lookups are in flight at once
//! and checks that no lookup from a chunk starts before every lookup of the
//! previous chunk has finished.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rstest::rstest;

use archi_pipeline::collector::{chunk_count, BatchCollector, ChunkProgress, CollectionGateway};
use archi_pipeline::{AppRecord, CollectionOutcome};

struct InstrumentedGateway {
    batch_size: usize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    finished: AtomicUsize,
    out_of_order: AtomicBool,
}

impl InstrumentedGateway {
    fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            out_of_order: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CollectionGateway for InstrumentedGateway {
    async fn fetch(&self, app_id: &str) -> CollectionOutcome {
        let index: usize = app_id.trim_start_matches("app-").parse().unwrap();
        let chunk_start = (index / self.batch_size) * self.batch_size;
        if self.finished.load(Ordering::SeqCst) < chunk_start {
            self.out_of_order.store(true, Ordering::SeqCst);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);

        if index % 4 == 3 {
            CollectionOutcome::failed(app_id, "simulated timeout")
        } else {
            CollectionOutcome::collected(AppRecord::new(app_id, app_id))
        }
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("app-{i}")).collect()
}

#[rstest]
#[case(10, 5, 10)]
#[case(10, 5, 2)]
#[case(7, 3, 3)]
#[case(9, 4, 1)]
#[case(1, 5, 10)]
#[tokio::test]
async fn in_flight_lookups_never_exceed_bound(
    #[case] n: usize,
    #[case] batch_size: usize,
    #[case] max_concurrent: usize,
) {
    let gateway = Arc::new(InstrumentedGateway::new(batch_size));
    let collector = BatchCollector::new(gateway.clone(), batch_size, max_concurrent);
    let mut chunks: Vec<ChunkProgress> = Vec::new();

    let records = collector.collect(&ids(n), |p| chunks.push(*p)).await;

    let bound = batch_size.min(max_concurrent).min(n);
    assert_eq!(gateway.max_in_flight.load(Ordering::SeqCst), bound);
    assert!(!gateway.out_of_order.load(Ordering::SeqCst));
    assert_eq!(gateway.finished.load(Ordering::SeqCst), n);

    assert_eq!(chunks.len(), chunk_count(n, batch_size));
    assert_eq!(chunks.len(), n.div_ceil(batch_size));
    let expected_failed = (0..n).filter(|i| i % 4 == 3).count();
    let last = chunks.last().unwrap();
    assert_eq!(last.failed, expected_failed);
    assert_eq!(last.collected, records.len());
    assert_eq!(records.len(), n - expected_failed);
}

#[tokio::test]
async fn chunk_progress_stays_inside_collecting_range() {
    let gateway = Arc::new(InstrumentedGateway::new(2));
    let collector = BatchCollector::new(gateway, 2, 2);
    let mut values = Vec::new();

    collector
        .collect(&ids(8), |p| values.push(p.stage_progress()))
        .await;

    assert_eq!(values.len(), 4);
    assert!(values.windows(2).all(|w| w[0] < w[1]));
    assert!(values.iter().all(|v| *v > 0.1 && *v <= 0.3 + 1e-9));
    assert!((values[3] - 0.3).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bound_holds_on_multi_threaded_runtime() {
    let gateway = Arc::new(InstrumentedGateway::new(6));
    let collector = BatchCollector::new(gateway.clone(), 6, 3);

    collector.collect(&ids(18), |_| {}).await;

    assert_eq!(gateway.max_in_flight.load(Ordering::SeqCst), 3);
    assert!(!gateway.out_of_order.load(Ordering::SeqCst));
}
