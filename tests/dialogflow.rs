use std::time::Duration;

use serde_json::json;
use terraform_provider_google::rest::GoogleResource;
use terraform_provider_google::services::dialogflow::{Agent, AgentState};
use terraform_provider_google::transport::TokenSource;
use terraform_provider_google::{Config, ConfigHandle};
use tf_provider::{Diagnostics, Resource};
use tf_provider::value::Value;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AGENT_PATH: &str = "/projects/agent-project/agent";

fn agent(tier: &str) -> serde_json::Value {
    json!({
        "parent": "projects/agent-project",
        "displayName": "support",
        "defaultLanguageCode": "en",
        "timeZone": "Europe/Paris",
        "matchMode": "MATCH_MODE_HYBRID",
        "apiVersion": "API_VERSION_V2",
        "tier": tier,
    })
}

#[tokio::test]
async fn creation_waits_for_the_tier() {
    let server = MockServer::start().await;
    let mut config = Config::new(TokenSource::fixed("test-token"), reqwest::Client::new())
        .with_endpoint(&server.uri());
    config.project = Some("agent-project".to_owned());
    config.poll_interval = Duration::from_millis(10);
    let resource = GoogleResource::<Agent>::new(ConfigHandle::new(config));
    let mut diags = Diagnostics::default();

    Mock::given(method("POST"))
        .and(path(AGENT_PATH))
        .and(body_partial_json(json!({
            "displayName": "support",
            "tier": "TIER_ENTERPRISE",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(agent("TIER_STANDARD")))
        .expect(1)
        .mount(&server)
        .await;
    // The tier change is only reported after a while
    Mock::given(method("GET"))
        .and(path(AGENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(agent("TIER_STANDARD")))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    // Ten consecutive confirmations, then the read back
    Mock::given(method("GET"))
        .and(path(AGENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(agent("TIER_ENTERPRISE")))
        .expect(11)
        .mount(&server)
        .await;

    let proposed = Value::Value(AgentState {
        display_name: Value::from("support"),
        default_language_code: Value::from("en"),
        time_zone: Value::from("Europe/Paris"),
        tier: Value::from("TIER_ENTERPRISE"),
        ..Default::default()
    });
    let (planned, private) = resource
        .plan_create(&mut diags, proposed.clone(), proposed.clone(), Value::Null)
        .await
        .unwrap();
    let (created, _) = resource
        .create(&mut diags, planned, proposed, private, Value::Null)
        .await
        .unwrap();
    assert!(diags.errors.is_empty());
    let Value::Value(state) = created else {
        panic!("null state after create");
    };
    assert_eq!(state.id.as_str(), "agent-project");
    assert_eq!(state.tier.as_str(), "TIER_ENTERPRISE");
    assert_eq!(state.match_mode.as_str(), "MATCH_MODE_HYBRID");
}
