use serde_json::json;
use terraform_provider_google::iam::{
    iam_policy_read_modify_write, Binding, IamBindingResource, IamBindingState, IamMemberResource,
    IamMemberState, IamParent,
};
use terraform_provider_google::rest::RequestContext;
use terraform_provider_google::services::resourcemanager::{ProjectIam, ProjectIamFields};
use terraform_provider_google::transport::TokenSource;
use terraform_provider_google::{Config, ConfigHandle};
use tf_provider::{Diagnostics, Resource};
use tf_provider::value::Value;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> Config {
    Config::new(TokenSource::fixed("test-token"), reqwest::Client::new()).with_endpoint(&server.uri())
}

async fn mock_policies(server: &MockServer, project: &str, before: serde_json::Value, after: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(format!("/projects/{project}:getIamPolicy")))
        .and(body_partial_json(json!({"options": {"requestedPolicyVersion": 3}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(before))
        .up_to_n_times(1)
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/projects/{project}:getIamPolicy")))
        .respond_with(ResponseTemplate::new(200).set_body_json(after))
        .mount(server)
        .await;
}

#[tokio::test]
async fn read_modify_write_adds_a_binding() {
    let server = MockServer::start().await;
    mock_policies(
        &server,
        "rmw-project",
        json!({"etag": "BwA=", "bindings": [{"role": "roles/owner", "members": ["user:admin@example.com"]}]}),
        json!({"etag": "BwB=", "version": 3, "bindings": [
            {"role": "roles/owner", "members": ["user:admin@example.com"]},
            {"role": "roles/viewer", "members": ["user:jane@example.com"]},
        ]}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/projects/rmw-project:setIamPolicy"))
        .and(body_partial_json(json!({
            "policy": {"etag": "BwA=", "bindings": [
                {"role": "roles/owner", "members": ["user:admin@example.com"]},
                {"role": "roles/viewer", "members": ["user:jane@example.com"]},
            ]},
            "updateMask": "bindings,etag,auditConfigs",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    let ctx = RequestContext {
        config: &config,
        user_agent: "test",
    };
    let fields = ProjectIamFields {
        project: Value::from("rmw-project"),
    };
    let updater = ProjectIam::updater(&fields, ctx).unwrap();
    let viewer = Binding {
        role: "roles/viewer".to_owned(),
        members: vec!["user:jane@example.com".to_owned()],
        condition: None,
    };
    iam_policy_read_modify_write(updater.as_ref(), |policy| {
        if !policy.bindings.contains(&viewer) {
            policy.bindings.push(viewer.clone());
        }
        Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn member_resource_lifecycle() {
    let server = MockServer::start().await;
    mock_policies(
        &server,
        "member-project",
        json!({"etag": "BwA="}),
        json!({"etag": "BwC=", "version": 3, "bindings": [
            {"role": "roles/viewer", "members": ["user:jane@example.com"]},
        ]}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/projects/member-project:setIamPolicy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let resource = IamMemberResource::<ProjectIam>::new(ConfigHandle::new(config(&server)));
    let mut diags = Diagnostics::default();
    let proposed = Value::Value(IamMemberState::<ProjectIam> {
        parent: ProjectIamFields {
            project: Value::from("member-project"),
        },
        role: Value::from("roles/viewer"),
        member: Value::from("user:Jane@example.com"),
        condition: Value::Null,
        ..Default::default()
    });
    let (planned, private) = resource
        .plan_create(&mut diags, proposed.clone(), proposed.clone(), Value::Null)
        .await
        .unwrap();
    let Value::Value(plan) = &planned else {
        panic!("null plan");
    };
    assert!(plan.id.is_unknown());

    let (state, _) = resource
        .create(&mut diags, planned, proposed, private, Value::Null)
        .await
        .unwrap();
    assert!(diags.errors.is_empty());
    let Value::Value(state) = state else {
        panic!("null state");
    };
    assert_eq!(state.id.as_str(), "member-project/roles/viewer/user:jane@example.com");
    assert_eq!(state.member.as_str(), "user:Jane@example.com");
    assert_eq!(state.etag.as_str(), "BwC=");
}

#[tokio::test]
async fn binding_resource_lifecycle() {
    let server = MockServer::start().await;
    let owner = json!({"role": "roles/owner", "members": ["user:admin@example.com"]});
    let viewers = json!({"role": "roles/viewer", "members": ["user:alice@example.com", "user:bob@example.com"]});
    mock_policies(
        &server,
        "binding-project",
        json!({"etag": "BwA=", "bindings": [owner]}),
        json!({"etag": "BwB=", "version": 3, "bindings": [owner, viewers]}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/projects/binding-project:setIamPolicy"))
        .and(body_partial_json(json!({"policy": {"bindings": [owner, viewers]}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let resource = IamBindingResource::<ProjectIam>::new(ConfigHandle::new(config(&server)));
    let mut diags = Diagnostics::default();
    let proposed = Value::Value(IamBindingState::<ProjectIam> {
        parent: ProjectIamFields {
            project: Value::from("binding-project"),
        },
        role: Value::from("roles/viewer"),
        members: Value::Value(
            [
                Value::from("user:alice@example.com"),
                Value::from("user:bob@example.com"),
            ]
            .into_iter()
            .collect(),
        ),
        condition: Value::Null,
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
    let Value::Value(state) = &created else {
        panic!("null state");
    };
    assert_eq!(state.id.as_str(), "binding-project/roles/viewer");
    assert_eq!(state.etag.as_str(), "BwB=");

    let (read, _) = resource
        .read(&mut diags, created.clone(), Default::default(), Value::Null)
        .await
        .unwrap();
    assert_eq!(read, created);

    // Removing the binding leaves the other roles alone
    server.reset().await;
    mock_policies(
        &server,
        "binding-project",
        json!({"etag": "BwB=", "version": 3, "bindings": [owner, viewers]}),
        json!({"etag": "BwD=", "version": 3, "bindings": [owner]}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/projects/binding-project:setIamPolicy"))
        .and(body_partial_json(json!({"policy": {"etag": "BwB=", "bindings": [owner]}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    assert!(resource
        .destroy(&mut diags, created.clone(), Value::Null, Value::Null)
        .await
        .is_some());
    assert!(diags.errors.is_empty());

    let (gone, _) = resource
        .read(&mut diags, created, Default::default(), Value::Null)
        .await
        .unwrap();
    assert!(gone.is_null());
}
