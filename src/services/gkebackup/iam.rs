use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType};
use tf_provider::value::{Value, ValueString};

use crate::config::{Config, Service};
use crate::iam::{IamParent, Policy, ResourceIamUpdater, IAM_POLICY_VERSION};
use crate::rest::{attribute, replace_if_changed, RequestContext};
use crate::tpgresource::{default_project, get_project, parse_import_id, Vars};
use crate::transport::{add_query_params, ApiRequest, JsonMap};

const IMPORT_FORMATS: &[&str] = &[
    "^projects/(?P<project>[^/]+)/locations/(?P<location>[^/]+)/backupPlans/(?P<name>[^/]+)$",
    "^(?P<project>[^/]+)/(?P<location>[^/]+)/(?P<name>[^/]+)$",
    "^(?P<location>[^/]+)/(?P<name>[^/]+)$",
    "^(?P<name>[^/]+)$",
];

/// Backup plans as holders of IAM policies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupPlanIam;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackupPlanIamFields<'a> {
    #[serde(borrow = "'a")]
    pub project: ValueString<'a>,
    pub location: ValueString<'a>,
    pub name: ValueString<'a>,
}

fn location(fields: &BackupPlanIamFields<'_>, config: &Config) -> Result<String> {
    match fields.location.as_deref_option() {
        Some(location) if !location.is_empty() => Ok(location.to_owned()),
        _ => config
            .region
            .clone()
            .filter(|region| !region.is_empty())
            .ok_or_else(|| anyhow!("Cannot determine location: set location in this resource, or set region in the provider-level config")),
    }
}

impl IamParent for BackupPlanIam {
    const KIND: &'static str = "gke_backup_backup_plan";
    type Fields<'a> = BackupPlanIamFields<'a>;

    fn attributes() -> HashMap<String, Attribute> {
        use AttributeConstraint::{OptionalComputed, Required};
        map! {
            "project" => attribute(AttributeType::String, "Project of the backup plan, the provider project by default", OptionalComputed),
            "location" => attribute(AttributeType::String, "Region of the backup plan, the provider region by default", OptionalComputed),
            "name" => attribute(AttributeType::String, "Short name of the backup plan, or its full resource name", Required),
        }
    }

    fn parse_import<'a>(id: &str, config: &Config) -> Result<Self::Fields<'a>> {
        let vars: Vars = parse_import_id(id, IMPORT_FORMATS, config)?;
        let mut fields = BackupPlanIamFields {
            project: vars.value("project"),
            location: vars.value("location"),
            name: vars.value("name"),
        };
        if fields.location.is_null() {
            if let Some(region) = config.region.as_deref().filter(|r| !r.is_empty()) {
                fields.location = Value::from(region.to_owned());
            }
        }
        Ok(fields)
    }

    fn plan<'a>(fields: &mut Self::Fields<'a>, config: &Config) {
        default_project(&mut fields.project, config);
        if fields.location.is_null() {
            if let Some(region) = config.region.as_deref().filter(|r| !r.is_empty()) {
                fields.location = Value::from(region.to_owned());
            }
        }
    }

    fn requires_replace(prior: &Self::Fields<'_>, proposed: &Self::Fields<'_>) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_if_changed(&mut paths, "project", &prior.project, &proposed.project);
        replace_if_changed(&mut paths, "location", &prior.location, &proposed.location);
        replace_if_changed(&mut paths, "name", &prior.name, &proposed.name);
        paths
    }

    fn updater<'c>(
        fields: &Self::Fields<'_>,
        ctx: RequestContext<'c>,
    ) -> Result<Box<dyn ResourceIamUpdater + 'c>> {
        // A full resource name carries every component
        if let Some(name) = fields.name.as_deref_option().filter(|n| n.contains('/')) {
            let vars = parse_import_id(name, &IMPORT_FORMATS[..1], ctx.config)?;
            return Ok(Box::new(BackupPlanIamUpdater {
                project: vars.get("project").unwrap_or_default().to_owned(),
                location: vars.get("location").unwrap_or_default().to_owned(),
                name: vars.get("name").unwrap_or_default().to_owned(),
                ctx,
            }));
        }
        Ok(Box::new(BackupPlanIamUpdater {
            project: get_project(&fields.project, ctx.config)?,
            location: location(fields, ctx.config)?,
            name: fields.name.as_str().to_owned(),
            ctx,
        }))
    }
}

pub struct BackupPlanIamUpdater<'c> {
    project: String,
    location: String,
    name: String,
    ctx: RequestContext<'c>,
}

impl BackupPlanIamUpdater<'_> {
    fn url(&self, method: &str) -> String {
        format!(
            "{}{}:{method}",
            self.ctx.config.base_path(Service::GkeBackup),
            self.get_resource_id()
        )
    }
}

#[async_trait]
impl ResourceIamUpdater for BackupPlanIamUpdater<'_> {
    async fn get_resource_iam_policy(&self) -> Result<Policy> {
        let version = IAM_POLICY_VERSION.to_string();
        let url = add_query_params(
            &self.url("getIamPolicy"),
            &[("options.requestedPolicyVersion", &version)],
        )?;
        let res = ApiRequest::get(self.ctx.config, url)
            .billing_project(Some(&self.project))
            .user_agent(self.ctx.user_agent)
            .send()
            .await
            .with_context(|| format!("Error retrieving IAM policy for {}", self.describe_resource()))?;
        Policy::from_response(res)
    }

    async fn set_resource_iam_policy(&self, policy: &Policy) -> Result<()> {
        let mut body = JsonMap::new();
        body.insert("policy".to_owned(), policy.to_json()?);
        ApiRequest::post(self.ctx.config, self.url("setIamPolicy"))
            .billing_project(Some(&self.project))
            .user_agent(self.ctx.user_agent)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Error setting IAM policy for {}", self.describe_resource()))?;
        Ok(())
    }

    fn get_mutex_key(&self) -> String {
        format!("iam-gkebackup-backupplan-{}", self.get_resource_id())
    }

    fn get_resource_id(&self) -> String {
        format!(
            "projects/{}/locations/{}/backupPlans/{}",
            self.project, self.location, self.name
        )
    }

    fn describe_resource(&self) -> String {
        format!("gkebackup backupplan {:?}", self.get_resource_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TokenSource;

    fn config() -> Config {
        let mut config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        config.project = Some("provider-project".to_owned());
        config.region = Some("europe-west1".to_owned());
        config
    }

    #[test]
    fn import_forms() {
        let config = config();
        let fields = BackupPlanIam::parse_import(
            "projects/p/locations/us-central1/backupPlans/nightly",
            &config,
        )
        .unwrap();
        assert_eq!(fields.project.as_str(), "p");
        assert_eq!(fields.location.as_str(), "us-central1");
        assert_eq!(fields.name.as_str(), "nightly");

        let fields = BackupPlanIam::parse_import("nightly", &config).unwrap();
        assert_eq!(fields.project.as_str(), "provider-project");
        assert_eq!(fields.location.as_str(), "europe-west1");
        assert_eq!(fields.name.as_str(), "nightly");
    }

    #[test]
    fn updater_ids() {
        let config = config();
        let ctx = RequestContext {
            config: &config,
            user_agent: "test",
        };
        let fields = BackupPlanIamFields {
            name: Value::from("nightly"),
            ..Default::default()
        };
        let updater = BackupPlanIam::updater(&fields, ctx).unwrap();
        assert_eq!(
            updater.get_resource_id(),
            "projects/provider-project/locations/europe-west1/backupPlans/nightly"
        );
        assert_eq!(
            updater.get_mutex_key(),
            "iam-gkebackup-backupplan-projects/provider-project/locations/europe-west1/backupPlans/nightly"
        );
    }

    #[test]
    fn full_name_overrides_the_defaults() {
        let config = config();
        let ctx = RequestContext {
            config: &config,
            user_agent: "test",
        };
        let fields = BackupPlanIamFields {
            name: Value::from("projects/other/locations/asia-east1/backupPlans/weekly"),
            ..Default::default()
        };
        let updater = BackupPlanIam::updater(&fields, ctx).unwrap();
        assert_eq!(
            updater.get_resource_id(),
            "projects/other/locations/asia-east1/backupPlans/weekly"
        );
    }
}
