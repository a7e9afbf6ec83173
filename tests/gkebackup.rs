use std::time::Duration;

use serde_json::json;
use terraform_provider_google::rest::GoogleResource;
use terraform_provider_google::services::gkebackup::{
    BackupConfig, BackupPlan, BackupPlanState, BackupSchedule,
};
use terraform_provider_google::transport::TokenSource;
use terraform_provider_google::{Config, ConfigHandle};
use tf_provider::{Diagnostics, Resource};
use tf_provider::value::Value;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PLANS_PATH: &str = "/projects/backup-project/locations/us-central1/backupPlans";
const PLAN_PATH: &str = "/projects/backup-project/locations/us-central1/backupPlans/nightly";
const CLUSTER: &str = "projects/backup-project/locations/us-central1/clusters/main";

fn backup_plan(description: Option<&str>) -> serde_json::Value {
    let mut plan = json!({
        "name": "projects/backup-project/locations/us-central1/backupPlans/nightly",
        "cluster": "projects/123/locations/us-central1/clusters/main",
        "backupSchedule": {"cronSchedule": "0 3 * * *"},
        "backupConfig": {"allNamespaces": true, "includeVolumeData": false, "includeSecrets": false},
        "labels": {"goog-terraform-provisioned": "true"},
        "uid": "0f6a",
        "etag": "e1",
        "state": "READY",
        "protectedPodCount": 12,
    });
    if let Some(description) = description {
        plan["description"] = json!(description);
    }
    plan
}

async fn mock_operation(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/projects/backup-project/locations/us-central1/operations/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("projects/backup-project/locations/us-central1/operations/{name}"),
            "done": true,
            "response": {"name": "projects/backup-project/locations/us-central1/backupPlans/nightly"},
        })))
        .mount(server)
        .await;
}

fn pending_operation(name: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "name": format!("projects/backup-project/locations/us-central1/operations/{name}"),
        "done": false,
    }))
}

#[tokio::test]
async fn backup_plan_lifecycle() {
    let server = MockServer::start().await;
    let mut config = Config::new(TokenSource::fixed("test-token"), reqwest::Client::new())
        .with_endpoint(&server.uri());
    config.project = Some("backup-project".to_owned());
    config.poll_interval = Duration::from_millis(10);
    let resource = GoogleResource::<BackupPlan>::new(ConfigHandle::new(config));
    let mut diags = Diagnostics::default();

    Mock::given(method("POST"))
        .and(path(PLANS_PATH))
        .and(query_param("backupPlanId", "nightly"))
        .and(body_partial_json(json!({
            "cluster": CLUSTER,
            "backupSchedule": {"cronSchedule": "0 3 * * *"},
            "backupConfig": {"allNamespaces": true},
            "labels": {"goog-terraform-provisioned": "true"},
        })))
        .respond_with(pending_operation("create"))
        .expect(1)
        .mount(&server)
        .await;
    mock_operation(&server, "create").await;
    Mock::given(method("GET"))
        .and(path(PLAN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(backup_plan(None)))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let proposed = Value::Value(BackupPlanState {
        location: Value::from("us-central1"),
        name: Value::from("nightly"),
        cluster: Value::from(CLUSTER),
        backup_schedule: Value::Value(BackupSchedule {
            cron_schedule: Value::from("0 3 * * *"),
            paused: Value::Null,
        }),
        backup_config: Value::Value(BackupConfig {
            all_namespaces: Value::Value(true),
            ..Default::default()
        }),
        ..Default::default()
    });
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
        "projects/backup-project/locations/us-central1/backupPlans/nightly"
    );
    assert_eq!(state.name.as_str(), "nightly");
    // Same cluster, named with the project number
    assert_eq!(state.cluster.as_str(), CLUSTER);
    assert_eq!(state.state.as_str(), "READY");

    Mock::given(method("PATCH"))
        .and(path(PLAN_PATH))
        .and(query_param("updateMask", "description"))
        .and(body_partial_json(json!({"description": "Nightly backups"})))
        .respond_with(pending_operation("update"))
        .expect(1)
        .mount(&server)
        .await;
    mock_operation(&server, "update").await;
    Mock::given(method("GET"))
        .and(path(PLAN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(backup_plan(Some("Nightly backups"))))
        .mount(&server)
        .await;

    let mut proposed = created.clone();
    if let Value::Value(state) = &mut proposed {
        state.description = Value::from("Nightly backups");
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
        updated.as_ref_option().map(|s| s.description.as_str().to_owned()),
        Some("Nightly backups".to_owned())
    );

    Mock::given(method("DELETE"))
        .and(path(PLAN_PATH))
        .respond_with(pending_operation("delete"))
        .expect(1)
        .mount(&server)
        .await;
    mock_operation(&server, "delete").await;
    assert!(resource
        .destroy(&mut diags, updated, Value::Null, Value::Null)
        .await
        .is_some());
    assert!(diags.errors.is_empty());
}
