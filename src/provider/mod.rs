//! The `google` provider: its configuration block and the resources it serves

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::value::ValueBool;
use tf_provider::{map, AttributePath, Diagnostics, DynamicDataSource, DynamicResource, Provider};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::value::{ValueList, ValueString};
use tracing::{debug, info};

use crate::config::{normalize_endpoint, user_agent, AttributionStrategy, Config, ConfigHandle, Service};
use crate::iam::{IamBindingResource, IamMemberResource, IamPolicyDataSource, IamPolicyResource, IamParent};
use crate::rest::{attribute, GoogleResource};
use crate::services::billing::{BillingAccountDataSource, BillingAccountIam, Budget};
use crate::services::datalossprevention::InspectTemplate;
use crate::services::dialogflow::Agent;
use crate::services::gkebackup::{BackupPlan, BackupPlanIam};
use crate::services::managedkafka::{Cluster, Topic};
use crate::services::resourcemanager::{ClientConfigDataSource, ProjectIam};
use crate::tpgresource::{parse_duration, string_map, Labels};
use crate::transport::{Credentials, TokenSource};

mod meta;

pub use meta::{module_user_agent, ProviderMeta, ProviderMetaState};

const CREDENTIALS_ENV: &[&str] = &["GOOGLE_CREDENTIALS", "GOOGLE_CLOUD_KEYFILE_JSON", "GCLOUD_KEYFILE_JSON"];
const ACCESS_TOKEN_ENV: &[&str] = &["GOOGLE_OAUTH_ACCESS_TOKEN"];
const IMPERSONATE_ENV: &[&str] = &["GOOGLE_IMPERSONATE_SERVICE_ACCOUNT"];
const PROJECT_ENV: &[&str] = &["GOOGLE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT", "CLOUDSDK_CORE_PROJECT"];
const BILLING_PROJECT_ENV: &[&str] = &["GOOGLE_BILLING_PROJECT"];
const REGION_ENV: &[&str] = &["GOOGLE_REGION", "GCLOUD_REGION", "CLOUDSDK_COMPUTE_REGION"];
const ZONE_ENV: &[&str] = &["GOOGLE_ZONE", "GCLOUD_ZONE", "CLOUDSDK_COMPUTE_ZONE"];
const USER_PROJECT_OVERRIDE_ENV: &[&str] = &["USER_PROJECT_OVERRIDE"];
const REQUEST_REASON_ENV: &[&str] = &["CLOUDSDK_CORE_REQUEST_REASON"];

/// `provider "google"` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderConfig<'a> {
    #[serde(borrow = "'a")]
    pub credentials: ValueString<'a>,
    pub access_token: ValueString<'a>,
    pub impersonate_service_account: ValueString<'a>,
    pub impersonate_service_account_delegates: ValueList<ValueString<'a>>,
    pub project: ValueString<'a>,
    pub billing_project: ValueString<'a>,
    pub region: ValueString<'a>,
    pub zone: ValueString<'a>,
    pub scopes: ValueList<ValueString<'a>>,
    pub user_project_override: ValueBool,
    pub request_timeout: ValueString<'a>,
    pub request_reason: ValueString<'a>,
    pub default_labels: Labels<'a>,
    pub add_terraform_attribution_label: ValueBool,
    pub terraform_attribution_label_addition_strategy: ValueString<'a>,
    pub billing_custom_endpoint: ValueString<'a>,
    pub cloud_billing_custom_endpoint: ValueString<'a>,
    pub data_loss_prevention_custom_endpoint: ValueString<'a>,
    pub dialogflow_custom_endpoint: ValueString<'a>,
    pub gke_backup_custom_endpoint: ValueString<'a>,
    pub iam_credentials_custom_endpoint: ValueString<'a>,
    pub managed_kafka_custom_endpoint: ValueString<'a>,
    pub resource_manager_custom_endpoint: ValueString<'a>,
}

impl<'a> ProviderConfig<'a> {
    fn endpoint(&self, service: Service) -> &ValueString<'a> {
        match service {
            Service::Billing => &self.billing_custom_endpoint,
            Service::CoreBilling => &self.cloud_billing_custom_endpoint,
            Service::DataLossPrevention => &self.data_loss_prevention_custom_endpoint,
            Service::Dialogflow => &self.dialogflow_custom_endpoint,
            Service::GkeBackup => &self.gke_backup_custom_endpoint,
            Service::IamCredentials => &self.iam_credentials_custom_endpoint,
            Service::ManagedKafka => &self.managed_kafka_custom_endpoint,
            Service::ResourceManager => &self.resource_manager_custom_endpoint,
        }
    }
}

/// Attribute value, or the first environment variable set among `vars`
fn setting(value: &ValueString<'_>, vars: &[&str], env: &dyn Fn(&str) -> Option<String>) -> Option<String> {
    match value.as_deref_option() {
        Some(value) => Some(value.to_owned()),
        None => vars.iter().find_map(|var| env(var).filter(|v| !v.is_empty())),
    }
}

fn strings(list: &ValueList<ValueString<'_>>) -> Vec<String> {
    list.iter()
        .flatten()
        .filter_map(|s| s.as_deref_option().map(str::to_owned))
        .collect()
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(anyhow!("invalid boolean {value:?}")),
    }
}

fn check_endpoint(endpoint: &str) -> Result<()> {
    let url = url::Url::parse(endpoint).with_context(|| format!("invalid endpoint {endpoint:?}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(anyhow!("endpoint {endpoint:?} must use http or https, not {scheme}")),
    }
}

/// Authentication settings of the provider block
pub fn credentials(state: &ProviderConfig<'_>, env: &dyn Fn(&str) -> Option<String>) -> Credentials {
    let access_token = setting(&state.access_token, ACCESS_TOKEN_ENV, env);
    // An explicit access token takes precedence over credentials from the environment
    let credentials = if access_token.is_some() && state.credentials.is_null() {
        None
    } else {
        setting(&state.credentials, CREDENTIALS_ENV, env)
    };
    Credentials {
        access_token,
        credentials,
        impersonate_service_account: setting(&state.impersonate_service_account, IMPERSONATE_ENV, env),
        impersonate_service_account_delegates: strings(&state.impersonate_service_account_delegates),
        scopes: strings(&state.scopes),
    }
}

/// Resolve the provider block into a [`Config`]
pub fn build_config(
    state: &ProviderConfig<'_>,
    env: &dyn Fn(&str) -> Option<String>,
    tokens: TokenSource,
    client: reqwest::Client,
    terraform_version: Option<&str>,
) -> Result<Config> {
    let mut config = Config::new(tokens, client);
    config.project = setting(&state.project, PROJECT_ENV, env);
    config.billing_project = setting(&state.billing_project, BILLING_PROJECT_ENV, env);
    config.region = setting(&state.region, REGION_ENV, env);
    config.zone = setting(&state.zone, ZONE_ENV, env);
    config.request_reason = setting(&state.request_reason, REQUEST_REASON_ENV, env);
    config.user_project_override = match state.user_project_override.as_ref_option() {
        Some(value) => *value,
        None => USER_PROJECT_OVERRIDE_ENV
            .iter()
            .find_map(|var| env(var))
            .map(|value| parse_bool(&value).context("invalid USER_PROJECT_OVERRIDE"))
            .transpose()?
            .unwrap_or(false),
    };
    if let Some(timeout) = state.request_timeout.as_deref_option() {
        config.request_timeout = parse_duration(timeout).context("invalid request_timeout")?;
    }
    config.default_labels = string_map(&state.default_labels);
    if let Some(add) = state.add_terraform_attribution_label.as_ref_option() {
        config.add_terraform_attribution_label = *add;
    }
    if let Some(strategy) = state.terraform_attribution_label_addition_strategy.as_deref_option() {
        config.attribution_strategy = AttributionStrategy::parse(strategy)?;
    }
    for service in Service::ALL {
        if let Some(endpoint) = setting(state.endpoint(service), &[service.endpoint_env()], env) {
            check_endpoint(&endpoint)
                .with_context(|| format!("invalid {}", service.endpoint_attribute()))?;
            config.base_paths.insert(service, normalize_endpoint(&endpoint));
        }
    }
    config.user_agent = user_agent(terraform_version);
    Ok(config)
}

fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Register the binding, member and policy resources of an IAM parent
fn iam_resources<P: IamParent>(
    resources: &mut HashMap<String, Box<dyn DynamicResource>>,
    prefix: &str,
    config: &ConfigHandle,
) {
    resources.insert(
        format!("{prefix}_iam_binding"),
        IamBindingResource::<P>::new(config.clone()).into(),
    );
    resources.insert(
        format!("{prefix}_iam_member"),
        IamMemberResource::<P>::new(config.clone()).into(),
    );
    resources.insert(
        format!("{prefix}_iam_policy"),
        IamPolicyResource::<P>::new(config.clone()).into(),
    );
}

/// Provider for Google Cloud Platform
#[derive(Debug, Default, Clone)]
pub struct GoogleProvider {
    config: ConfigHandle,
}

impl GoogleProvider {
    /// Provider whose resources use `config` without going through `configure`
    pub fn with_config(config: Config) -> Self {
        Self {
            config: ConfigHandle::new(config),
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    type Config<'a> = ProviderConfig<'a>;
    type MetaState<'a> = ProviderMetaState<'a>;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        use AttributeConstraint::Optional;
        let string = |description: &str| attribute(AttributeType::String, description, Optional);
        let strings = |description: &str| {
            attribute(AttributeType::List(AttributeType::String.into()), description, Optional)
        };

        let mut attributes: HashMap<String, Attribute> = map! {
            "credentials" => string("Service account key, as JSON contents or a path to the key file. Conflicts with access_token"),
            "access_token" => Attribute {
                sensitive: true,
                ..string("OAuth2 access token used instead of credentials")
            },
            "impersonate_service_account" => string("Service account impersonated by every API call"),
            "impersonate_service_account_delegates" => strings("Delegation chain towards impersonate_service_account"),
            "project" => string("Default project of the resources"),
            "billing_project" => string("Project billed for API calls when user_project_override is set"),
            "region" => string("Default region of the resources"),
            "zone" => string("Default zone of the resources"),
            "scopes" => strings("OAuth2 scopes requested for the access tokens"),
            "user_project_override" => attribute(AttributeType::Bool, "Bill API calls to the resource project, or to billing_project", Optional),
            "request_timeout" => string("Timeout of each API request, such as `60s`"),
            "request_reason" => string("Reason sent with every request for audit logs"),
            "default_labels" => attribute(AttributeType::Map(AttributeType::String.into()), "Labels added to every resource supporting labels", Optional),
            "add_terraform_attribution_label" => attribute(AttributeType::Bool, "Add the `goog-terraform-provisioned` label to created resources, true by default", Optional),
            "terraform_attribution_label_addition_strategy" => string("When the attribution label is added: `CREATION_ONLY` (default) or `PROACTIVE`"),
        };
        for service in Service::ALL {
            attributes.insert(
                service.endpoint_attribute().to_owned(),
                string("Custom base URL of the service API"),
            );
        }

        Some(Schema {
            version: 1,
            block: Block {
                attributes,
                description: Description::plain("Google Cloud Platform"),
                ..Default::default()
            },
        })
    }

    fn meta_schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(ProviderMeta::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::Config<'a>) -> Option<()> {
        if config.credentials.is_value() && config.access_token.is_value() {
            diags.error(
                "Conflicting authentication",
                "Only one of credentials and access_token can be set",
                AttributePath::new("access_token"),
            );
        }
        if let Some(timeout) = config.request_timeout.as_deref_option() {
            if let Err(err) = parse_duration(timeout) {
                diags.error(
                    "Invalid request_timeout",
                    format!("{err:#}"),
                    AttributePath::new("request_timeout"),
                );
            }
        }
        if let Some(strategy) = config.terraform_attribution_label_addition_strategy.as_deref_option() {
            if let Err(err) = AttributionStrategy::parse(strategy) {
                diags.error(
                    "Invalid attribution strategy",
                    format!("{err:#}"),
                    AttributePath::new("terraform_attribution_label_addition_strategy"),
                );
            }
        }
        for service in Service::ALL {
            if let Some(endpoint) = config.endpoint(service).as_deref_option() {
                if let Err(err) = check_endpoint(endpoint) {
                    diags.error(
                        "Invalid endpoint",
                        format!("{err:#}"),
                        AttributePath::new(service.endpoint_attribute()),
                    );
                }
            }
        }

        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn configure<'a>(
        &self,
        diags: &mut Diagnostics,
        terraform_version: String,
        config: Self::Config<'a>,
    ) -> Option<()> {
        let result: Result<Config> = async {
            let credentials = credentials(&config, &process_env);
            let tokens = TokenSource::resolve(&credentials).await?;
            let client = reqwest::Client::builder()
                .build()
                .context("failed to build the HTTP client")?;
            build_config(&config, &process_env, tokens, client, Some(&terraform_version))
        }
        .await;

        match result {
            Ok(resolved) => {
                info!(
                    project = resolved.project.as_deref().unwrap_or_default(),
                    region = resolved.region.as_deref().unwrap_or_default(),
                    "Provider configured"
                );
                debug!(config = ?resolved);
                self.config.set(resolved);
                Some(())
            }
            Err(err) => {
                diags.root_error("Failed to configure the google provider", format!("{err:#}"));
                None
            }
        }
    }

    fn get_resources(&self, _diags: &mut Diagnostics) -> Option<HashMap<String, Box<dyn DynamicResource>>> {
        let config = &self.config;
        let mut resources: HashMap<String, Box<dyn DynamicResource>> = map! {
            "billing_budget" => GoogleResource::<Budget>::new(config.clone()),
            "data_loss_prevention_inspect_template" => GoogleResource::<InspectTemplate>::new(config.clone()),
            "dialogflow_agent" => GoogleResource::<Agent>::new(config.clone()),
            "managed_kafka_cluster" => GoogleResource::<Cluster>::new(config.clone()),
            "managed_kafka_topic" => GoogleResource::<Topic>::new(config.clone()),
            "gke_backup_backup_plan" => GoogleResource::<BackupPlan>::new(config.clone()),
        };
        iam_resources::<BillingAccountIam>(&mut resources, "billing_account", config);
        iam_resources::<ProjectIam>(&mut resources, "project", config);
        iam_resources::<BackupPlanIam>(&mut resources, "gke_backup_backup_plan", config);
        Some(resources)
    }

    fn get_data_sources(&self, _diags: &mut Diagnostics) -> Option<HashMap<String, Box<dyn DynamicDataSource>>> {
        Some(map! {
            "client_config" => ClientConfigDataSource::new(self.config.clone()),
            "billing_account" => BillingAccountDataSource::new(self.config.clone()),
            "iam_policy" => IamPolicyDataSource,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use tf_provider::{DataSource, Resource};

    use tf_provider::value::Value;

    use super::*;

    fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    fn build(state: &ProviderConfig<'_>, vars: &'static [(&'static str, &'static str)]) -> Result<Config> {
        build_config(
            state,
            &env(vars),
            TokenSource::fixed("t"),
            reqwest::Client::new(),
            Some("1.9.0"),
        )
    }

    #[test]
    fn environment_fallbacks() {
        let config = build(
            &ProviderConfig::default(),
            &[
                ("GCLOUD_PROJECT", "from-env"),
                ("GOOGLE_REGION", "europe-west1"),
                ("USER_PROJECT_OVERRIDE", "TRUE"),
                ("GOOGLE_MANAGED_KAFKA_CUSTOM_ENDPOINT", "http://localhost:8080"),
            ],
        )
        .unwrap();
        assert_eq!(config.project.as_deref(), Some("from-env"));
        assert_eq!(config.region.as_deref(), Some("europe-west1"));
        assert!(config.user_project_override);
        assert_eq!(config.base_path(Service::ManagedKafka), "http://localhost:8080/");
        assert_eq!(
            config.base_path(Service::Dialogflow),
            Service::Dialogflow.default_base_path()
        );
        assert!(config.user_agent.starts_with("Terraform/1.9.0"));
    }

    #[test]
    fn attributes_win_over_environment() {
        let state = ProviderConfig {
            project: Value::from("from-block"),
            request_timeout: Value::from("90s"),
            user_project_override: Value::Value(false),
            add_terraform_attribution_label: Value::Value(false),
            terraform_attribution_label_addition_strategy: Value::from("PROACTIVE"),
            default_labels: Value::Value(
                [(std::borrow::Cow::Borrowed("team"), Value::from("data"))]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        let config = build(
            &state,
            &[("GOOGLE_PROJECT", "from-env"), ("USER_PROJECT_OVERRIDE", "true")],
        )
        .unwrap();
        assert_eq!(config.project.as_deref(), Some("from-block"));
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert!(!config.user_project_override);
        assert!(!config.add_terraform_attribution_label);
        assert_eq!(config.attribution_strategy, AttributionStrategy::Proactive);
        assert_eq!(
            config.default_labels,
            BTreeMap::from([("team".to_owned(), "data".to_owned())])
        );
    }

    #[test]
    fn invalid_settings() {
        let state = ProviderConfig {
            request_timeout: Value::from("soon"),
            ..Default::default()
        };
        assert!(build(&state, &[]).is_err());
        assert!(build(&ProviderConfig::default(), &[("USER_PROJECT_OVERRIDE", "maybe")]).is_err());
        assert!(build(
            &ProviderConfig::default(),
            &[("GOOGLE_DIALOGFLOW_CUSTOM_ENDPOINT", "ftp://example.com")]
        )
        .is_err());
    }

    #[test]
    fn access_token_shadows_environment_credentials() {
        let state = ProviderConfig {
            access_token: Value::from("token"),
            ..Default::default()
        };
        let creds = credentials(&state, &env(&[("GOOGLE_CREDENTIALS", "{}")]));
        assert_eq!(creds.access_token.as_deref(), Some("token"));
        assert_eq!(creds.credentials, None);

        let creds = credentials(&ProviderConfig::default(), &env(&[("GOOGLE_CREDENTIALS", "/key.json")]));
        assert_eq!(creds.credentials.as_deref(), Some("/key.json"));
        assert_eq!(creds.access_token, None);
    }

    #[tokio::test]
    async fn validation() {
        let provider = GoogleProvider::default();
        let state = ProviderConfig {
            credentials: Value::from("{}"),
            access_token: Value::from("token"),
            request_timeout: Value::from("1x"),
            terraform_attribution_label_addition_strategy: Value::from("ALWAYS"),
            gke_backup_custom_endpoint: Value::from("not a url"),
            ..Default::default()
        };
        let mut diags = Diagnostics::default();
        assert!(provider.validate(&mut diags, state).await.is_none());
        assert_eq!(diags.errors.len(), 4);

        let mut diags = Diagnostics::default();
        assert!(provider
            .validate(&mut diags, ProviderConfig::default())
            .await
            .is_some());
    }

    #[test]
    fn registered_names() {
        let provider = GoogleProvider::default();
        let mut diags = Diagnostics::default();
        let resources = provider.get_resources(&mut diags).unwrap();
        let mut names: Vec<&str> = resources.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            [
                "billing_account_iam_binding",
                "billing_account_iam_member",
                "billing_account_iam_policy",
                "billing_budget",
                "data_loss_prevention_inspect_template",
                "dialogflow_agent",
                "gke_backup_backup_plan",
                "gke_backup_backup_plan_iam_binding",
                "gke_backup_backup_plan_iam_member",
                "gke_backup_backup_plan_iam_policy",
                "managed_kafka_cluster",
                "managed_kafka_topic",
                "project_iam_binding",
                "project_iam_member",
                "project_iam_policy",
            ]
        );
        let data_sources = provider.get_data_sources(&mut diags).unwrap();
        assert_eq!(data_sources.len(), 3);
        assert!(diags.errors.is_empty());
    }

    #[test]
    fn schemas_build() {
        let provider = GoogleProvider::default();
        let schema = provider.schema(&mut Diagnostics::default()).unwrap();
        assert!(schema.block.attributes["access_token"].sensitive);
        assert!(schema.block.attributes.contains_key("gke_backup_custom_endpoint"));

        let config = ConfigHandle::default();
        let mut diags = Diagnostics::default();
        let topic = GoogleResource::<Topic>::new(config.clone());
        let topic = Resource::schema(&topic, &mut diags).unwrap();
        assert!(topic.block.attributes.contains_key("id"));
        assert!(topic.block.blocks.contains_key("timeouts"));
        let client_config = ClientConfigDataSource::new(config);
        assert!(DataSource::schema(&client_config, &mut diags).is_some());
    }
}
