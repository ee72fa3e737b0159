//! End-to-end flows: watchers feeding the rotation engine over mock
//! probe and object storage backends

mod common;

use std::sync::Arc;
use std::time::Duration;

use rotor::coordinator::{Controller, EngineConfig};
use rotor::models::{DomainStatus, GroupKind, Video};
use rotor::storage::{S3ObjectStore, S3ObjectStoreConfig};
use rotor::watcher::{
    ContentPublisher, GroupSink, HealthMonitor, ProbeOracle, PublishOutcome,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{memory_repo, plain_engine, seed_content_group, seed_show_group, AlwaysHealthy};

async fn probe_backend(blocked: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    for domain in blocked {
        Mock::given(method("GET"))
            .and(path("/mt.do"))
            .and(query_param("url", *domain))
            .respond_with(ResponseTemplate::new(200).set_body_string("[1]"))
            .with_priority(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/mt.do"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[0]"))
        .mount(&server)
        .await;
    server
}

async fn bucket_backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn store_for(server: &MockServer) -> S3ObjectStore {
    S3ObjectStore::connect(S3ObjectStoreConfig {
        endpoint: server.uri(),
        region: "us-east-1".to_string(),
        bucket: "bundles".to_string(),
        public_url: "https://static.example/".to_string(),
        access_key_id: Some("AKIDROTORTEST".to_string()),
        secret_access_key: Some("rotor-test-secret".to_string()),
        timeout_secs: 5,
        max_attempts: 1,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_flagged_domain_leaves_rotation() {
    let repo = memory_repo();
    let group_id = seed_show_group(
        &repo,
        "show",
        &[
            ("blocked.example", DomainStatus::Ok),
            ("good.example", DomainStatus::Ok),
        ],
    );

    let engine = plain_engine();
    engine.update_domain_group(
        repo.domain_group(group_id).unwrap(),
        Some(repo.domain_list(group_id).unwrap()),
    );

    let backend = probe_backend(&["blocked.example"]).await;
    let oracle = ProbeOracle::new(vec![backend.uri()], Duration::from_secs(2)).unwrap();
    let sink: Arc<dyn GroupSink> = engine.clone();
    let mut monitor = HealthMonitor::new(
        repo.domain_group(group_id).unwrap(),
        repo.clone(),
        Arc::new(oracle),
        sink,
    );

    let outcome = monitor.check_once().await.unwrap();
    assert_eq!(outcome.probed, 2);
    assert_eq!(outcome.demoted, 1);
    assert!(outcome.reported);

    for _ in 0..4 {
        let selected = engine.select_domain(0, GroupKind::Show).unwrap();
        assert_eq!(selected.domain, "good.example");
    }

    let stored = repo.domain_list(group_id).unwrap();
    let blocked = stored
        .domains
        .iter()
        .find(|d| d.domain == "blocked.example")
        .unwrap();
    assert_eq!(blocked.status, DomainStatus::Down);
}

#[tokio::test]
async fn test_down_domain_not_probed_again() {
    let repo = memory_repo();
    let group_id = seed_show_group(
        &repo,
        "show",
        &[
            ("dead.example", DomainStatus::Down),
            ("good.example", DomainStatus::Ok),
        ],
    );

    let backend = probe_backend(&[]).await;
    let oracle = ProbeOracle::new(vec![backend.uri()], Duration::from_secs(2)).unwrap();
    let mut monitor = HealthMonitor::new(
        repo.domain_group(group_id).unwrap(),
        repo.clone(),
        Arc::new(oracle),
        plain_engine(),
    );

    let outcome = monitor.check_once().await.unwrap();
    assert_eq!(outcome.probed, 1);

    let requests = backend.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.query().unwrap().contains("good.example"));
}

#[tokio::test]
async fn test_published_bundle_reaches_selection() {
    let repo = memory_repo();
    let (content_id, items) = seed_content_group(&repo, "summer", &["first", "second"]);

    let engine = plain_engine();
    let bucket = bucket_backend().await;
    let mut publisher = ContentPublisher::create(
        repo.content_group(content_id).unwrap(),
        repo.clone(),
        Arc::new(store_for(&bucket).await),
        engine.clone(),
    )
    .await
    .unwrap();

    let selected = engine.select_content(content_id, 0, "203.0.113.7").unwrap();
    assert_eq!(selected.content_url, "https://static.example/summer.json");
    assert!(selected.force_share);
    assert!(selected.show_ads);
    assert!(!selected.offline);

    assert_eq!(
        repo.content_group(content_id).unwrap().json_url,
        "https://static.example/summer.json"
    );

    let requests = bucket.received_requests().await.unwrap();
    let upload = requests
        .iter()
        .find(|r| r.url.path() == "/bundles/summer.json")
        .unwrap();
    let bundle: Vec<Video> = serde_json::from_slice(&upload.body).unwrap();
    assert_eq!(
        bundle.iter().map(|v| v.id).collect::<Vec<_>>(),
        items
    );
    assert_eq!(bundle[0].title, "first");

    // Nothing changed since the first publish
    assert!(matches!(
        publisher.check_once().await.unwrap(),
        PublishOutcome::Unchanged
    ));
}

#[tokio::test]
async fn test_controller_serves_loaded_groups() {
    let repo = memory_repo();
    seed_show_group(&repo, "show", &[("a.example", DomainStatus::Ok)]);
    let (content_id, _) = seed_content_group(&repo, "summer", &["first"]);

    let config = EngineConfig::builder()
        .tick_interval(Duration::from_millis(50))
        .wheel_buckets(4)
        .refresh_interval(Duration::from_secs(3600))
        .start_watchers(true)
        .build()
        .unwrap();
    let engine = plain_engine();
    let bucket = bucket_backend().await;

    let controller = Controller::start(
        config,
        repo.clone(),
        engine.clone(),
        Arc::new(AlwaysHealthy),
        Arc::new(store_for(&bucket).await),
    )
    .await
    .unwrap();

    assert_eq!(controller.watcher_count(), 2);
    assert_eq!(
        engine.select_domain(0, GroupKind::Show).unwrap().domain,
        "a.example"
    );
    assert_eq!(
        engine.select_content(0, 0, "").unwrap().content_group_id,
        content_id
    );
    assert_eq!(
        engine.select_content(0, 0, "").unwrap().content_url,
        "https://static.example/summer.json"
    );

    let late = seed_show_group(&repo, "late", &[("b.example", DomainStatus::Ok)]);
    let report = controller.refresh().await.unwrap();
    assert_eq!(report.domain_groups, 1);
    assert_eq!(report.content_groups, 0);
    assert_eq!(controller.watcher_count(), 3);
    assert_eq!(
        engine.select_domain(late, GroupKind::Show).unwrap().domain,
        "b.example"
    );

    controller.shutdown().await;
    assert_eq!(controller.watcher_count(), 0);
}
