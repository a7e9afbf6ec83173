use std::time::Duration;

use serde_json::json;
use terraform_provider_google::rest::GoogleResource;
use terraform_provider_google::services::managedkafka::{
    AccessConfig, CapacityConfig, Cluster, ClusterState, GcpConfig, NetworkConfig, Topic, TopicState,
};
use terraform_provider_google::transport::TokenSource;
use terraform_provider_google::{Config, ConfigHandle};
use tf_provider::{Diagnostics, Resource};
use tf_provider::value::Value;
use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOPIC_PATH: &str = "/projects/kafka-project/locations/us-central1/clusters/kafka/topics/events";

fn config(server: &MockServer) -> ConfigHandle {
    let mut config = Config::new(TokenSource::fixed("test-token"), reqwest::Client::new())
        .with_endpoint(&server.uri());
    config.project = Some("kafka-project".to_owned());
    config.poll_interval = Duration::from_millis(10);
    ConfigHandle::new(config)
}

fn topic(partitions: i64) -> serde_json::Value {
    json!({
        "name": "projects/kafka-project/locations/us-central1/clusters/kafka/topics/events",
        "partitionCount": partitions,
        "replicationFactor": 3,
        "configs": {"cleanup.policy": "compact", "retention.ms": "604800000"},
    })
}

fn events_topic<'a>() -> Value<TopicState<'a>> {
    Value::Value(TopicState {
        location: Value::from("us-central1"),
        cluster: Value::from("kafka"),
        topic_id: Value::from("events"),
        partition_count: Value::Value(3),
        replication_factor: Value::Value(3),
        configs: Value::Value(
            [("cleanup.policy".into(), Value::from("compact"))]
                .into_iter()
                .collect(),
        ),
        ..Default::default()
    })
}

fn bad_request() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "error": {"code": 400, "message": "invalid topic", "status": "INVALID_ARGUMENT"},
    }))
}

#[tokio::test]
async fn topic_lifecycle() {
    let server = MockServer::start().await;
    let resource = GoogleResource::<Topic>::new(config(&server));
    let mut diags = Diagnostics::default();

    Mock::given(method("POST"))
        .and(path("/projects/kafka-project/locations/us-central1/clusters/kafka/topics"))
        .and(query_param("topicId", "events"))
        .and(body_json(json!({
            "partitionCount": 3,
            "replicationFactor": 3,
            "configs": {"cleanup.policy": "compact"},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(topic(3)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TOPIC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(topic(3)))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let proposed = events_topic();
    let (planned, private) = resource
        .plan_create(&mut diags, proposed.clone(), proposed.clone(), Value::Null)
        .await
        .unwrap();
    let (created, private) = resource
        .create(&mut diags, planned, proposed, private, Value::Null)
        .await
        .unwrap();
    assert!(diags.errors.is_empty());
    let Value::Value(state) = &created else {
        panic!("null state after create");
    };
    assert_eq!(
        state.id.as_str(),
        "projects/kafka-project/locations/us-central1/clusters/kafka/topics/events"
    );
    assert_eq!(state.project.as_str(), "kafka-project");
    assert_eq!(state.configs.as_ref_option().map(|c| c.len()), Some(1));

    // Grow the topic
    Mock::given(method("PATCH"))
        .and(path(TOPIC_PATH))
        .and(query_param("updateMask", "partitionCount"))
        .and(body_partial_json(json!({"partitionCount": 6})))
        .respond_with(ResponseTemplate::new(200).set_body_json(topic(6)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TOPIC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(topic(6)))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let mut proposed = created.clone();
    if let Value::Value(state) = &mut proposed {
        state.partition_count = Value::Value(6);
    }
    let (planned, private, replace) = resource
        .plan_update(&mut diags, created.clone(), proposed.clone(), proposed.clone(), private, Value::Null)
        .await
        .unwrap();
    assert!(replace.is_empty());
    let (updated, _) = resource
        .update(&mut diags, created, planned, proposed, private, Value::Null)
        .await
        .unwrap();
    assert!(diags.errors.is_empty());
    assert_eq!(
        updated.as_ref_option().map(|s| s.partition_count.clone()),
        Some(Value::Value(6))
    );

    Mock::given(method("DELETE"))
        .and(path(TOPIC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    assert!(resource
        .destroy(&mut diags, updated.clone(), Value::Null, Value::Null)
        .await
        .is_some());

    // Deleted outside of Terraform: the read drops the resource
    Mock::given(method("GET"))
        .and(path(TOPIC_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "not found", "status": "NOT_FOUND"},
        })))
        .mount(&server)
        .await;
    let (state, _) = resource
        .read(&mut diags, updated, Default::default(), Value::Null)
        .await
        .unwrap();
    assert!(state.is_null());
    assert!(diags.errors.is_empty());
}

#[tokio::test]
async fn created_topic_is_kept_when_the_read_back_fails() {
    let server = MockServer::start().await;
    let resource = GoogleResource::<Topic>::new(config(&server));
    let mut diags = Diagnostics::default();

    Mock::given(method("POST"))
        .and(path("/projects/kafka-project/locations/us-central1/clusters/kafka/topics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(topic(3)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TOPIC_PATH))
        .respond_with(bad_request())
        .mount(&server)
        .await;

    let proposed = events_topic();
    let (planned, private) = resource
        .plan_create(&mut diags, proposed.clone(), proposed.clone(), Value::Null)
        .await
        .unwrap();
    let (created, _) = resource
        .create(&mut diags, planned, proposed, private, Value::Null)
        .await
        .expect("the created topic must stay in the state");
    assert_eq!(diags.errors.len(), 1);
    let Value::Value(state) = created else {
        panic!("null state after create");
    };
    assert_eq!(
        state.id.as_str(),
        "projects/kafka-project/locations/us-central1/clusters/kafka/topics/events"
    );
}

#[tokio::test]
async fn failed_creation_records_nothing() {
    let server = MockServer::start().await;
    let resource = GoogleResource::<Topic>::new(config(&server));
    let mut diags = Diagnostics::default();

    Mock::given(method("POST"))
        .and(path("/projects/kafka-project/locations/us-central1/clusters/kafka/topics"))
        .respond_with(bad_request())
        .expect(1)
        .mount(&server)
        .await;

    let proposed = events_topic();
    let (planned, private) = resource
        .plan_create(&mut diags, proposed.clone(), proposed.clone(), Value::Null)
        .await
        .unwrap();
    assert!(resource
        .create(&mut diags, planned, proposed, private, Value::Null)
        .await
        .is_none());
    assert_eq!(diags.errors.len(), 1);
}

#[tokio::test]
async fn failed_update_keeps_the_prior_state() {
    let server = MockServer::start().await;
    let resource = GoogleResource::<Topic>::new(config(&server));
    let mut diags = Diagnostics::default();

    Mock::given(method("POST"))
        .and(path("/projects/kafka-project/locations/us-central1/clusters/kafka/topics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(topic(3)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TOPIC_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(topic(3)))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(TOPIC_PATH))
        .respond_with(bad_request())
        .expect(1)
        .mount(&server)
        .await;

    let proposed = events_topic();
    let (planned, private) = resource
        .plan_create(&mut diags, proposed.clone(), proposed.clone(), Value::Null)
        .await
        .unwrap();
    let (created, private) = resource
        .create(&mut diags, planned, proposed, private, Value::Null)
        .await
        .unwrap();
    assert!(diags.errors.is_empty());

    let mut proposed = created.clone();
    if let Value::Value(state) = &mut proposed {
        state.partition_count = Value::Value(6);
    }
    let (planned, private, _) = resource
        .plan_update(&mut diags, created.clone(), proposed.clone(), proposed.clone(), private, Value::Null)
        .await
        .unwrap();
    let (updated, _) = resource
        .update(&mut diags, created.clone(), planned, proposed, private, Value::Null)
        .await
        .unwrap();
    assert_eq!(diags.errors.len(), 1);
    assert_eq!(updated, created);
}

#[tokio::test]
async fn cluster_creation_waits_for_the_operation() {
    let server = MockServer::start().await;
    let resource = GoogleResource::<Cluster>::new(config(&server));
    let mut diags = Diagnostics::default();
    let cluster_path = "/projects/kafka-project/locations/us-central1/clusters/kafka";
    let subnet = "projects/kafka-project/regions/us-central1/subnetworks/default";

    Mock::given(method("POST"))
        .and(path("/projects/kafka-project/locations/us-central1/clusters"))
        .and(query_param("clusterId", "kafka"))
        .and(body_partial_json(json!({
            "capacityConfig": {"vcpuCount": "3", "memoryBytes": "3221225472"},
            "gcpConfig": {"accessConfig": {"networkConfigs": [{"subnet": subnet}]}},
            "labels": {"goog-terraform-provisioned": "true"},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/kafka-project/locations/us-central1/operations/op-1",
            "done": false,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/kafka-project/locations/us-central1/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/kafka-project/locations/us-central1/operations/op-1",
            "done": true,
            "response": {"name": "projects/kafka-project/locations/us-central1/clusters/kafka"},
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(cluster_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/kafka-project/locations/us-central1/clusters/kafka",
            "capacityConfig": {"vcpuCount": "3", "memoryBytes": "3221225472"},
            "gcpConfig": {"accessConfig": {"networkConfigs": [{"subnet": "projects/123/regions/us-central1/subnetworks/default"}]}},
            "labels": {"goog-terraform-provisioned": "true"},
            "state": "ACTIVE",
            "createTime": "2026-01-01T00:00:00Z",
            "updateTime": "2026-01-01T00:00:00Z",
        })))
        .mount(&server)
        .await;

    let proposed = Value::Value(ClusterState {
        location: Value::from("us-central1"),
        cluster_id: Value::from("kafka"),
        capacity_config: Value::Value(CapacityConfig {
            vcpu_count: Value::from("3"),
            memory_bytes: Value::from("3221225472"),
        }),
        gcp_config: Value::Value(GcpConfig {
            access_config: Value::Value(AccessConfig {
                network_configs: Value::Value(vec![Value::Value(NetworkConfig {
                    subnet: Value::from(subnet),
                })]),
            }),
            kms_key: Value::Null,
        }),
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
    assert_eq!(state.state.as_str(), "ACTIVE");
    assert_eq!(
        state.name.as_str(),
        "projects/kafka-project/locations/us-central1/clusters/kafka"
    );
    let subnet_read = state
        .gcp_config
        .as_ref_option()
        .and_then(|gcp| gcp.access_config.as_ref_option())
        .and_then(|access| access.network_configs.as_ref_option())
        .and_then(|configs| configs.first())
        .and_then(|config| config.as_ref_option())
        .map(|config| config.subnet.as_str().to_owned());
    assert_eq!(subnet_read.as_deref(), Some(subnet));
}
