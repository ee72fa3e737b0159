//! Probe oracle tests against mock probe backends

use std::time::Duration;

use rotor::watcher::{HealthOracle, ProbeOracle, ProbeVerdict};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn backend_answering(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mt.do"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

fn oracle_for(endpoints: Vec<String>) -> ProbeOracle {
    ProbeOracle::new(endpoints, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_zero_code_is_healthy() {
    let server = backend_answering("[0]").await;
    let oracle = oracle_for(vec![server.uri()]);

    assert_eq!(oracle.probe("a.example").await, ProbeVerdict::Healthy);
}

#[tokio::test]
async fn test_blocked_codes_are_unhealthy() {
    for body in ["[1]", "[2]", " [ 1 ]\n"] {
        let server = backend_answering(body).await;
        let oracle = oracle_for(vec![server.uri()]);

        assert_eq!(
            oracle.probe("a.example").await,
            ProbeVerdict::Unhealthy,
            "body {body:?}"
        );
    }
}

#[tokio::test]
async fn test_unexpected_body_is_healthy() {
    let server = backend_answering("maintenance").await;
    let oracle = oracle_for(vec![server.uri()]);

    assert_eq!(oracle.probe("a.example").await, ProbeVerdict::Healthy);
}

#[tokio::test]
async fn test_domain_sent_as_url_parameter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mt.do"))
        .and(query_param("url", "blocked.example"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[1]"))
        .expect(1)
        .mount(&server)
        .await;

    let oracle = oracle_for(vec![server.uri()]);
    assert_eq!(oracle.probe("blocked.example").await, ProbeVerdict::Unhealthy);
}

#[tokio::test]
async fn test_unreachable_backend_is_unhealthy() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let oracle = oracle_for(vec![format!("http://127.0.0.1:{port}")]);
    assert_eq!(oracle.probe("a.example").await, ProbeVerdict::Unhealthy);
}

#[tokio::test]
async fn test_no_endpoints_means_healthy() {
    let oracle = oracle_for(Vec::new());
    assert_eq!(oracle.endpoint_count(), 0);
    assert_eq!(oracle.probe("a.example").await, ProbeVerdict::Healthy);
}

#[tokio::test]
async fn test_endpoints_used_round_robin() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    for server in [&first, &second] {
        Mock::given(method("GET"))
            .and(path("/mt.do"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[0]"))
            .expect(2)
            .mount(server)
            .await;
    }

    let oracle = oracle_for(vec![first.uri(), second.uri()]);
    for _ in 0..4 {
        oracle.probe("a.example").await;
    }
}

#[tokio::test]
async fn test_endpoint_without_scheme() {
    let server = backend_answering("[2]").await;
    let bare = server.uri().trim_start_matches("http://").to_string();
    let oracle = oracle_for(vec![bare]);

    assert_eq!(oracle.probe("a.example").await, ProbeVerdict::Unhealthy);
}
