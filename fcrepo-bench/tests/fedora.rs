use std::sync::Arc;

use bytesize::ByteSize;
use fcrepo_bench::error::RemoteError;
use fcrepo_bench::id::ObjectId;
use fcrepo_bench::remote::ClusterSizeProvider;
use fcrepo_bench::remote::fedora::FedoraClient;
use fcrepo_bench::{Action, BenchmarkRunner, Config, Repository, RepositoryVariant};
use fcrepo_bench_test::server::TestServer;

fn client(server: &TestServer, variant: RepositoryVariant) -> FedoraClient {
    FedoraClient::new(server.url("/"), variant)
        .unwrap()
        .with_concurrency(4)
}

#[tokio::test]
async fn fcrepo4_lifecycle() {
    fcrepo_bench_test::tracing::init();
    let server = TestServer::new().await;
    let client = client(&server, RepositoryVariant::Fcrepo4);
    let ids = ObjectId::generate(3);
    let id = &ids[0];

    client.create_objects(&ids).await.unwrap();
    assert_eq!(server.resource_count(), 3);

    client.execute(Action::Create, id, 1000).await.unwrap();
    let path = format!("rest/{id}/ds1");
    assert_eq!(server.binary(&path).unwrap().len(), 1000);

    client.execute(Action::Read, id, 1000).await.unwrap();

    client.execute(Action::Update, id, 10).await.unwrap();
    assert_eq!(server.binary(&path).unwrap().len(), 10);

    client.execute(Action::Delete, id, 10).await.unwrap();
    assert!(!server.contains(&path));
    // the tombstone of the binary is removed along with it
    assert_eq!(server.tombstone_count(), 0);

    client.purge_objects(&ids, false).await.unwrap();
    assert_eq!(server.resource_count(), 0);
    assert_eq!(server.tombstone_count(), 0);
}

#[tokio::test]
async fn fcrepo4_purges_datastreams() {
    let server = TestServer::new().await;
    let client = client(&server, RepositoryVariant::Fcrepo4);
    let ids = ObjectId::generate(5);

    client.create_objects(&ids).await.unwrap();
    client.create_datastreams(&ids, 64).await.unwrap();
    assert_eq!(server.resource_count(), 10);

    client.purge_objects(&ids, true).await.unwrap();
    assert_eq!(server.resource_count(), 0);
    assert_eq!(server.tombstone_count(), 0);

    // paths can be reused after purging
    client.create_objects(&ids).await.unwrap();
}

#[tokio::test]
async fn fcrepo3_lifecycle() {
    let server = TestServer::new().await;
    let client = client(&server, RepositoryVariant::Fcrepo3);
    let ids = ObjectId::generate(2);
    let id = &ids[0];

    client.create_objects(&ids).await.unwrap();
    assert!(server.contains(&format!("objects/bench:{id}")));

    client.execute(Action::Create, id, 256).await.unwrap();
    let path = format!("objects/bench:{id}/ds1");
    assert_eq!(server.binary(&path).unwrap().len(), 256);

    client.execute(Action::Read, id, 256).await.unwrap();

    client.execute(Action::Update, id, 128).await.unwrap();
    assert_eq!(server.binary(&path).unwrap().len(), 128);

    client.execute(Action::Delete, id, 128).await.unwrap();
    assert!(!server.contains(&path));

    client.purge_objects(&ids, true).await.unwrap();
    assert_eq!(server.resource_count(), 0);
}

#[tokio::test]
async fn reading_missing_datastream_fails() {
    let server = TestServer::new().await;
    let client = client(&server, RepositoryVariant::Fcrepo4);
    let ids = ObjectId::generate(1);

    client.create_objects(&ids).await.unwrap();
    let error = client.execute(Action::Read, &ids[0], 1).await.unwrap_err();

    assert!(matches!(
        error,
        RemoteError::Status { status, .. } if status == reqwest::StatusCode::NOT_FOUND
    ));
}

#[tokio::test]
async fn purge_reports_partial_failures() {
    let server = TestServer::new().await;
    let client = client(&server, RepositoryVariant::Fcrepo3);

    // objects that were never created are treated as gone
    let ids = ObjectId::generate(3);
    client.purge_objects(&ids, true).await.unwrap();

    let unreachable = FedoraClient::new("http://127.0.0.1:1", RepositoryVariant::Fcrepo3).unwrap();
    let error = unreachable.purge_objects(&ids, true).await.unwrap_err();
    assert!(matches!(error, RemoteError::Partial { failed: 3, total: 3 }));
}

#[tokio::test]
async fn queries_cluster_size() {
    let server = TestServer::with_cluster_size(Some(3)).await;
    let client = client(&server, RepositoryVariant::Fcrepo4);
    assert_eq!(client.cluster_size().await.unwrap(), 3);

    let server = TestServer::new().await;
    let client = self::client(&server, RepositoryVariant::Fcrepo4);
    assert_eq!(client.cluster_size().await.unwrap(), 0);

    let client = self::client(&server, RepositoryVariant::Fcrepo3);
    assert!(client.cluster_size().await.is_err());
}

#[tokio::test]
async fn runs_benchmark_against_server() {
    let server = TestServer::with_cluster_size(Some(1)).await;
    let client = Arc::new(client(&server, RepositoryVariant::Fcrepo4));

    let config = Config {
        url: server.url("/"),
        action: Action::Update,
        num_binaries: 8,
        size: ByteSize::kib(4),
        threads: 2,
        ..Default::default()
    };
    let report = BenchmarkRunner::new(config, client.clone())
        .with_cluster_size(client)
        .run()
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.stats.completed, 8);
    assert_eq!(report.stats.total_bytes, 8 * 4096);
    assert_eq!(report.cluster_size_before, Some(1));
    assert_eq!(report.cluster_size_after, Some(1));
    assert_eq!(server.resource_count(), 0);
    assert_eq!(server.tombstone_count(), 0);
}
