use std::time::Duration;

use serde_json::json;
use terraform_provider_google::transport::{
    handle_not_found, is_not_found, api_error, ApiRequest, TokenSource,
};
use terraform_provider_google::Config;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> Config {
    Config::new(TokenSource::fixed("test-token"), reqwest::Client::new()).with_endpoint(&server.uri())
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/p/things/a"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/p/things/a"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "a"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    let res = ApiRequest::get(&config, format!("{}/projects/p/things/a", server.uri()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.get("name"), Some(&json!("a")));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "Topic not found", "status": "NOT_FOUND"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    let err = ApiRequest::get(&config, format!("{}/projects/p/topics/t", server.uri()))
        .send()
        .await
        .unwrap_err();
    assert!(is_not_found(&err));
    assert_eq!(api_error(&err).unwrap().message, "Topic not found");

    let res = ApiRequest::get(&config, format!("{}/projects/p/topics/t", server.uri()))
        .send()
        .await;
    assert_eq!(handle_not_found(res, "Topic").unwrap(), None);
}

#[tokio::test]
async fn retries_stop_at_the_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = config(&server);
    let err = ApiRequest::get(&config, format!("{}/busy", server.uri()))
        .timeout(Duration::from_millis(300))
        .send()
        .await
        .unwrap_err();
    assert_eq!(api_error(&err).unwrap().code, 500);
}

#[tokio::test]
async fn user_project_and_reason_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/things"))
        .and(header("X-Goog-User-Project", "billed-project"))
        .and(header("X-Goog-Request-Reason", "audit"))
        .and(header("user-agent", "custom-agent"))
        .and(body_json(json!({"displayName": "thing"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.user_project_override = true;
    config.request_reason = Some("audit".to_owned());
    let mut body = serde_json::Map::new();
    body.insert("displayName".to_owned(), json!("thing"));
    let res = ApiRequest::post(&config, format!("{}/v1/things", server.uri()))
        .billing_project(Some("billed-project"))
        .user_agent("custom-agent")
        .body(body)
        .send()
        .await
        .unwrap();
    assert!(res.is_empty());
}

#[tokio::test]
async fn no_user_project_without_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let config = config(&server);
    ApiRequest::get(&config, format!("{}/v1/things", server.uri()))
        .billing_project(Some("billed-project"))
        .send()
        .await
        .unwrap();
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("x-goog-user-project"));
}
