use std::time::Duration;

use serde_json::json;
use terraform_provider_google::config::Service;
use terraform_provider_google::operation::{operation_wait_time, operation_wait_time_with_response};
use terraform_provider_google::transport::{JsonMap, TokenSource};
use terraform_provider_google::Config;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> Config {
    let mut config = Config::new(TokenSource::fixed("test-token"), reqwest::Client::new())
        .with_endpoint(&server.uri());
    config.poll_interval = Duration::from_millis(10);
    config
}

fn op(value: serde_json::Value) -> JsonMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

#[tokio::test]
async fn polls_until_done() {
    let server = MockServer::start().await;
    let name = "projects/p/locations/l/operations/op-1";
    Mock::given(method("GET"))
        .and(path(format!("/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": name, "done": false})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": name,
            "done": true,
            "response": {"name": "projects/p/locations/l/clusters/c", "state": "ACTIVE"},
        })))
        .mount(&server)
        .await;

    let config = config(&server);
    let res = operation_wait_time_with_response(
        &config,
        op(json!({"name": name, "done": false})),
        config.base_path(Service::ManagedKafka),
        "Creating Cluster",
        Some("p"),
        "test",
        Duration::from_secs(30),
    )
    .await
    .unwrap();
    assert_eq!(res.get("state"), Some(&json!("ACTIVE")));
}

#[tokio::test]
async fn done_operations_are_not_polled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let config = config(&server);
    let res = operation_wait_time_with_response(
        &config,
        op(json!({"name": "operations/1", "done": true, "response": {"ok": true}})),
        &format!("{}/", server.uri()),
        "Creating thing",
        None,
        "test",
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    assert_eq!(res.get("ok"), Some(&json!(true)));
}

#[tokio::test]
async fn operation_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/operations/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "operations/2",
            "done": true,
            "error": {"code": 3, "message": "invalid subnet"},
        })))
        .mount(&server)
        .await;

    let config = config(&server);
    let err = operation_wait_time(
        &config,
        op(json!({"name": "operations/2"})),
        &format!("{}/", server.uri()),
        "Creating Cluster",
        None,
        "test",
        Duration::from_secs(5),
    )
    .await
    .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Creating Cluster"), "{message}");
    assert!(message.contains("Error code 3, message: invalid subnet"), "{message}");
}

#[tokio::test]
async fn operation_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/operations/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "operations/3"})))
        .mount(&server)
        .await;

    let config = config(&server);
    let err = operation_wait_time(
        &config,
        op(json!({"name": "operations/3"})),
        &format!("{}/", server.uri()),
        "Deleting Cluster",
        None,
        "test",
        Duration::from_millis(500),
    )
    .await
    .unwrap_err();
    assert!(
        format!("{err:#}").contains("timeout while waiting for operation operations/3 to finish"),
        "{err:#}"
    );
}
