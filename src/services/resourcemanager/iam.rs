use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tf_provider::{map, AttributePath};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Description};
use tf_provider::value::ValueString;

use crate::config::{Config, Service};
use crate::iam::{IamParent, Policy, ResourceIamUpdater, IAM_POLICY_VERSION};
use crate::rest::{replace_if_changed, RequestContext};
use crate::tpgresource::get_project;
use crate::transport::{ApiRequest, JsonMap};

/// Projects as holders of IAM policies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectIam;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProjectIamFields<'a> {
    #[serde(borrow = "'a")]
    pub project: ValueString<'a>,
}

impl IamParent for ProjectIam {
    const KIND: &'static str = "project";
    type Fields<'a> = ProjectIamFields<'a>;

    fn attributes() -> HashMap<String, Attribute> {
        map! {
            "project" => Attribute {
                attr_type: AttributeType::String,
                description: Description::plain("Id of the project"),
                constraint: AttributeConstraint::Required,
                ..Default::default()
            },
        }
    }

    fn parse_import<'a>(id: &str, _config: &Config) -> Result<Self::Fields<'a>> {
        let project = id.strip_prefix("projects/").unwrap_or(id);
        Ok(ProjectIamFields {
            project: ValueString::from(project.to_owned()),
        })
    }

    fn requires_replace(prior: &Self::Fields<'_>, proposed: &Self::Fields<'_>) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_if_changed(&mut paths, "project", &prior.project, &proposed.project);
        paths
    }

    fn updater<'c>(
        fields: &Self::Fields<'_>,
        ctx: RequestContext<'c>,
    ) -> Result<Box<dyn ResourceIamUpdater + 'c>> {
        let project = get_project(&fields.project, ctx.config)?;
        Ok(Box::new(ProjectIamUpdater { project, ctx }))
    }
}

pub struct ProjectIamUpdater<'c> {
    project: String,
    ctx: RequestContext<'c>,
}

impl ProjectIamUpdater<'_> {
    async fn call(&self, method: &str, body: JsonMap) -> Result<JsonMap> {
        let config = self.ctx.config;
        let url = format!(
            "{}projects/{}:{method}",
            config.base_path(Service::ResourceManager),
            self.project
        );
        ApiRequest::post(config, url)
            .billing_project(Some(&self.project))
            .user_agent(self.ctx.user_agent)
            .body(body)
            .send()
            .await
    }
}

fn object(value: serde_json::Value) -> JsonMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

#[async_trait]
impl ResourceIamUpdater for ProjectIamUpdater<'_> {
    async fn get_resource_iam_policy(&self) -> Result<Policy> {
        let body = object(json!({"options": {"requestedPolicyVersion": IAM_POLICY_VERSION}}));
        let res = self
            .call("getIamPolicy", body)
            .await
            .with_context(|| format!("Error retrieving IAM policy for {}", self.describe_resource()))?;
        Policy::from_response(res)
    }

    async fn set_resource_iam_policy(&self, policy: &Policy) -> Result<()> {
        let body = object(json!({
            "policy": policy.to_json()?,
            "updateMask": "bindings,etag,auditConfigs",
        }));
        self.call("setIamPolicy", body).await?;
        Ok(())
    }

    fn get_mutex_key(&self) -> String {
        format!("iam-project-{}", self.project)
    }

    fn get_resource_id(&self) -> String {
        self.project.clone()
    }

    fn describe_resource(&self) -> String {
        format!("project {:?}", self.project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TokenSource;

    #[test]
    fn import_accepts_both_forms() {
        let config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        let fields = ProjectIam::parse_import("projects/my-project", &config).unwrap();
        assert_eq!(fields.project.as_str(), "my-project");
        let fields = ProjectIam::parse_import("my-project", &config).unwrap();
        assert_eq!(fields.project.as_str(), "my-project");
    }

    #[test]
    fn updater_ids() {
        let mut config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        config.project = Some("provider-project".to_owned());
        let ctx = RequestContext {
            config: &config,
            user_agent: "test",
        };
        let updater = ProjectIam::updater(&ProjectIamFields::default(), ctx).unwrap();
        assert_eq!(updater.get_resource_id(), "provider-project");
        assert_eq!(updater.get_mutex_key(), "iam-project-provider-project");
    }
}
