use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytesize::ByteSize;
use fcrepo_bench::error::{PrepareError, RemoteResult};
use fcrepo_bench::remote::ClusterSizeProvider;
use fcrepo_bench::{Action, BenchmarkRunner, Config};
use fcrepo_bench_test::repository::{Call, InMemoryRepository};
use tokio_util::sync::CancellationToken;

fn config(action: Action, num_binaries: usize, size: u64, threads: usize) -> Config {
    Config {
        action,
        num_binaries,
        size: ByteSize::b(size),
        threads,
        ..Default::default()
    }
}

fn runner(config: Config, repository: &InMemoryRepository) -> BenchmarkRunner {
    BenchmarkRunner::new(config, Arc::new(repository.clone()))
}

fn read_durations(path: &Path) -> Vec<u64> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| line.parse().unwrap())
        .collect()
}

#[tokio::test]
async fn create_run_collects_every_result() {
    fcrepo_bench_test::tracing::init();
    let repository = InMemoryRepository::new();

    let report = runner(config(Action::Create, 5, 1024 * 1024, 1), &repository)
        .run()
        .await
        .unwrap();

    let created = repository.created();
    assert_eq!(created.len(), 5);
    assert_eq!(created.iter().collect::<HashSet<_>>().len(), 5);

    assert!(report.is_complete());
    assert_eq!(report.stats.completed, 5);
    assert_eq!(report.stats.total_bytes, 5 * 1024 * 1024);
    assert!(report.stats.latency.is_some());

    // no datastreams are prepared for CREATE
    assert!(
        !repository
            .calls()
            .iter()
            .any(|call| matches!(call, Call::CreateDatastreams(..)))
    );
    assert_eq!(repository.executed(), created);
    assert_eq!(repository.purges(), vec![(created, true)]);
    assert_eq!(repository.object_count(), 0);
}

#[tokio::test]
async fn delete_run_prepares_datastreams_first() {
    let repository = InMemoryRepository::new();

    let report = runner(config(Action::Delete, 10, 512, 2), &repository)
        .run()
        .await
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(report.stats.completed, 10);

    let calls = repository.calls();
    let prepared = calls
        .iter()
        .position(|call| matches!(call, Call::CreateDatastreams(ids, 512) if ids.len() == 10))
        .expect("datastreams were not prepared");
    let first_action = calls
        .iter()
        .position(|call| matches!(call, Call::Execute(Action::Delete, _)))
        .expect("no action was executed");
    assert!(prepared < first_action);

    // datastreams are gone already, so only the objects are purged
    let purges = repository.purges();
    assert_eq!(purges.len(), 1);
    assert!(!purges[0].1);
}

#[tokio::test]
async fn read_and_update_runs_purge_datastreams() {
    for action in [Action::Read, Action::Update] {
        let repository = InMemoryRepository::new();

        let report = runner(config(action, 3, 2048, 1), &repository)
            .run()
            .await
            .unwrap();

        assert!(report.is_complete(), "{action} run incomplete");
        assert_eq!(
            repository.calls()[1],
            Call::CreateDatastreams(repository.created(), 2048)
        );
        assert_eq!(repository.purges(), vec![(repository.created(), true)]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounds_concurrent_actions() {
    let repository = InMemoryRepository::new().with_delay(Duration::from_millis(20));

    let report = runner(config(Action::Create, 12, 16, 3), &repository)
        .run()
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(repository.max_in_flight(), 3);
    assert!(report.stats.runtime_ms >= 3 * 20);
}

#[tokio::test]
async fn failed_action_stops_harvest_but_purges_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("durations.log");
    let repository = InMemoryRepository::new()
        .with_delay(Duration::from_millis(20))
        .fail_action_at(2);

    let config = Config {
        log_file: Some(path.clone()),
        ..config(Action::Create, 5, 1024, 1)
    };
    let report = runner(config, &repository).run().await.unwrap();

    assert!(!report.is_complete());
    let error = report.harvest_error.as_deref().unwrap();
    assert!(error.starts_with("task 3 of 5 failed"), "{error}");
    assert!(error.contains("injected failure"), "{error}");

    // only the two results harvested before the failure count
    let durations = read_durations(&path);
    assert_eq!(durations.len(), 2);
    assert_eq!(report.stats.completed, 2);
    assert_eq!(report.stats.total_bytes, 2 * 1024);
    assert_eq!(report.stats.total_duration_ms, durations.iter().sum::<u64>());

    assert_eq!(repository.purges(), vec![(repository.created(), true)]);
}

#[tokio::test]
async fn prepare_failure_leaves_no_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("durations.log");
    let repository = InMemoryRepository::new().fail_create_objects();

    let config = Config {
        log_file: Some(path.clone()),
        ..config(Action::Create, 2, 1024, 1)
    };
    runner(config, &repository).run().await.unwrap_err();

    assert!(!path.exists());
}

#[tokio::test]
async fn prepare_failure_aborts_run() {
    let repository = InMemoryRepository::new().fail_create_objects();

    let error = runner(config(Action::Create, 4, 1024, 2), &repository)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(error, PrepareError::CreateObjects(_)));
    assert_eq!(repository.calls().len(), 1);
    assert!(repository.executed().is_empty());
    assert!(repository.purges().is_empty());
}

#[tokio::test]
async fn datastream_failure_aborts_run() {
    let repository = InMemoryRepository::new().fail_create_datastreams();

    let error = runner(config(Action::Read, 4, 1024, 2), &repository)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(error, PrepareError::CreateDatastreams(_)));
    assert!(repository.executed().is_empty());
    assert!(repository.purges().is_empty());
}

#[tokio::test]
async fn purge_failure_is_reported() {
    let repository = InMemoryRepository::new().fail_purge();

    let report = runner(config(Action::Create, 3, 1024, 1), &repository)
        .run()
        .await
        .unwrap();

    assert!(report.harvest_error.is_none());
    assert_eq!(report.stats.completed, 3);
    assert_eq!(report.purge_error.as_deref(), Some("3 of 3 objects failed"));
    assert!(!report.is_complete());
}

#[tokio::test]
async fn interrupt_still_purges() {
    let repository = InMemoryRepository::new().with_delay(Duration::from_millis(50));
    let interrupt = CancellationToken::new();
    interrupt.cancel();

    let report = runner(config(Action::Create, 6, 1024, 2), &repository)
        .with_interrupt(interrupt)
        .run()
        .await
        .unwrap();

    assert_eq!(
        report.harvest_error.as_deref(),
        Some("interrupted while waiting for workers")
    );
    // nothing was harvested, so nothing counts
    assert_eq!(report.stats.completed, 0);
    assert_eq!(report.stats.throughput.aggregate_mbps, None);
    assert_eq!(repository.purges(), vec![(repository.created(), true)]);
}

#[tokio::test]
async fn writes_duration_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("durations.log");
    let repository = InMemoryRepository::new().with_delay(Duration::from_millis(5));

    let config = Config {
        log_file: Some(path.clone()),
        ..config(Action::Create, 4, 1024, 2)
    };
    let report = runner(config, &repository).run().await.unwrap();
    assert!(report.is_complete());

    let durations = read_durations(&path);
    assert_eq!(durations.len(), 4);
    assert!(durations.iter().all(|&duration| duration >= 5));
    assert_eq!(report.stats.total_duration_ms, durations.iter().sum::<u64>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn log_follows_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("durations.log");
    // the first object finishes long after all others
    let repository = InMemoryRepository::new()
        .with_delay(Duration::from_millis(10))
        .with_delay_at(0, Duration::from_millis(150));

    let config = Config {
        log_file: Some(path.clone()),
        ..config(Action::Create, 6, 1024, 2)
    };
    let report = runner(config, &repository).run().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.stats.completed, 6);

    let durations = read_durations(&path);
    assert_eq!(durations.len(), 6);
    assert!(durations[0] >= 150, "{durations:?}");
    assert!(
        durations[1..].iter().all(|&duration| (10..150).contains(&duration)),
        "{durations:?}"
    );
    assert!(report.stats.runtime_ms >= 150);
}

#[tokio::test]
async fn unwritable_log_does_not_fail_run() {
    let dir = tempfile::tempdir().unwrap();
    let repository = InMemoryRepository::new();

    let config = Config {
        log_file: Some(dir.path().join("missing").join("durations.log")),
        ..config(Action::Create, 2, 1024, 1)
    };
    let report = runner(config, &repository).run().await.unwrap();

    assert!(report.is_complete());
}

#[derive(Debug, Default)]
struct GrowingCluster {
    nodes: AtomicU32,
}

#[async_trait::async_trait]
impl ClusterSizeProvider for GrowingCluster {
    async fn cluster_size(&self) -> RemoteResult<u32> {
        Ok(self.nodes.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[tokio::test]
async fn reports_cluster_size_before_and_after() {
    let repository = InMemoryRepository::new();

    let report = runner(config(Action::Create, 1, 1024, 1), &repository)
        .with_cluster_size(Arc::new(GrowingCluster::default()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.cluster_size_before, Some(1));
    assert_eq!(report.cluster_size_after, Some(2));
}
