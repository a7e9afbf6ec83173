use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use tf_provider::Diagnostics;

use crate::transport::TokenSource;

pub const DEFAULT_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/userinfo.email",
];

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub const ATTRIBUTION_KEY: &str = "goog-terraform-provisioned";
pub const ATTRIBUTION_VALUE: &str = "true";

/// When the attribution label is added to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributionStrategy {
    /// Only when the resource is created
    #[default]
    CreationOnly,
    /// On every plan, including resources created before the label existed
    Proactive,
}

impl AttributionStrategy {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "CREATION_ONLY" => Ok(Self::CreationOnly),
            "PROACTIVE" => Ok(Self::Proactive),
            _ => Err(anyhow!(
                "unknown attribution strategy {value:?}, expected one of CREATION_ONLY, PROACTIVE"
            )),
        }
    }
}

/// GCP API families the provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Service {
    Billing,
    CoreBilling,
    DataLossPrevention,
    Dialogflow,
    GkeBackup,
    IamCredentials,
    ManagedKafka,
    ResourceManager,
}

impl Service {
    pub const ALL: [Service; 8] = [
        Service::Billing,
        Service::CoreBilling,
        Service::DataLossPrevention,
        Service::Dialogflow,
        Service::GkeBackup,
        Service::IamCredentials,
        Service::ManagedKafka,
        Service::ResourceManager,
    ];

    /// Name used in URL templates: `{{<key>BasePath}}`
    pub fn base_path_key(self) -> &'static str {
        match self {
            Service::Billing => "BillingBasePath",
            Service::CoreBilling => "CoreBillingBasePath",
            Service::DataLossPrevention => "DataLossPreventionBasePath",
            Service::Dialogflow => "DialogflowBasePath",
            Service::GkeBackup => "GKEBackupBasePath",
            Service::IamCredentials => "IAMCredentialsBasePath",
            Service::ManagedKafka => "ManagedKafkaBasePath",
            Service::ResourceManager => "ResourceManagerBasePath",
        }
    }

    pub fn default_base_path(self) -> &'static str {
        match self {
            Service::Billing => "https://billingbudgets.googleapis.com/v1/",
            Service::CoreBilling => "https://cloudbilling.googleapis.com/v1/",
            Service::DataLossPrevention => "https://dlp.googleapis.com/v2/",
            Service::Dialogflow => "https://dialogflow.googleapis.com/v2/",
            Service::GkeBackup => "https://gkebackup.googleapis.com/v1/",
            Service::IamCredentials => "https://iamcredentials.googleapis.com/v1/",
            Service::ManagedKafka => "https://managedkafka.googleapis.com/v1/",
            Service::ResourceManager => "https://cloudresourcemanager.googleapis.com/v1/",
        }
    }

    /// Provider attribute overriding the base path
    pub fn endpoint_attribute(self) -> &'static str {
        match self {
            Service::Billing => "billing_custom_endpoint",
            Service::CoreBilling => "cloud_billing_custom_endpoint",
            Service::DataLossPrevention => "data_loss_prevention_custom_endpoint",
            Service::Dialogflow => "dialogflow_custom_endpoint",
            Service::GkeBackup => "gke_backup_custom_endpoint",
            Service::IamCredentials => "iam_credentials_custom_endpoint",
            Service::ManagedKafka => "managed_kafka_custom_endpoint",
            Service::ResourceManager => "resource_manager_custom_endpoint",
        }
    }

    pub fn endpoint_env(self) -> &'static str {
        match self {
            Service::Billing => "GOOGLE_BILLING_CUSTOM_ENDPOINT",
            Service::CoreBilling => "GOOGLE_CLOUD_BILLING_CUSTOM_ENDPOINT",
            Service::DataLossPrevention => "GOOGLE_DATA_LOSS_PREVENTION_CUSTOM_ENDPOINT",
            Service::Dialogflow => "GOOGLE_DIALOGFLOW_CUSTOM_ENDPOINT",
            Service::GkeBackup => "GOOGLE_GKE_BACKUP_CUSTOM_ENDPOINT",
            Service::IamCredentials => "GOOGLE_IAM_CREDENTIALS_CUSTOM_ENDPOINT",
            Service::ManagedKafka => "GOOGLE_MANAGED_KAFKA_CUSTOM_ENDPOINT",
            Service::ResourceManager => "GOOGLE_RESOURCE_MANAGER_CUSTOM_ENDPOINT",
        }
    }

    pub fn from_base_path_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.base_path_key() == key)
    }
}

/// Resolved provider configuration shared by every resource
pub struct Config {
    pub project: Option<String>,
    pub billing_project: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub user_project_override: bool,
    pub request_reason: Option<String>,
    pub request_timeout: Duration,
    pub default_labels: BTreeMap<String, String>,
    pub add_terraform_attribution_label: bool,
    pub attribution_strategy: AttributionStrategy,
    pub base_paths: HashMap<Service, String>,
    pub user_agent: String,
    /// Lower bound between two polls of a long-running operation
    pub poll_interval: Duration,
    pub client: reqwest::Client,
    pub tokens: TokenSource,
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("project", &self.project)
            .field("billing_project", &self.billing_project)
            .field("region", &self.region)
            .field("zone", &self.zone)
            .field("user_project_override", &self.user_project_override)
            .field("request_timeout", &self.request_timeout)
            .field("base_paths", &self.base_paths)
            .field("user_agent", &self.user_agent)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Build a configuration with defaults, authenticating with `tokens`
    pub fn new(tokens: TokenSource, client: reqwest::Client) -> Self {
        Self {
            project: None,
            billing_project: None,
            region: None,
            zone: None,
            user_project_override: false,
            request_reason: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            default_labels: BTreeMap::new(),
            add_terraform_attribution_label: true,
            attribution_strategy: AttributionStrategy::default(),
            base_paths: Service::ALL
                .into_iter()
                .map(|s| (s, s.default_base_path().to_owned()))
                .collect(),
            user_agent: user_agent(None),
            poll_interval: DEFAULT_OPERATION_POLL_INTERVAL,
            client,
            tokens,
        }
    }

    pub fn base_path(&self, service: Service) -> &str {
        self.base_paths
            .get(&service)
            .map(String::as_str)
            .unwrap_or(service.default_base_path())
    }

    /// Point every service at the same endpoint
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        let endpoint = normalize_endpoint(endpoint);
        for service in Service::ALL {
            self.base_paths.insert(service, endpoint.clone());
        }
        self
    }

    /// Provider project, or an error naming the missing field
    pub fn project(&self) -> Result<&str> {
        self.project
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow!("project: required field is not set"))
    }
}

pub fn user_agent(terraform_version: Option<&str>) -> String {
    format!(
        "Terraform/{} (+https://www.terraform.io) terraform-provider-google/{}",
        terraform_version.unwrap_or("unknown"),
        env!("CARGO_PKG_VERSION"),
    )
}

/// Ensure a custom endpoint can be used as a base path
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.ends_with('/') {
        endpoint.to_owned()
    } else {
        format!("{endpoint}/")
    }
}

/// Handle to the configuration set by `configure`
///
/// Resources are built before the provider is configured, so they keep a handle
/// and resolve the configuration when an operation runs.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle(Arc<RwLock<Option<Arc<Config>>>>);

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        let handle = Self::default();
        handle.set(config);
        handle
    }

    pub fn set(&self, config: Config) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Arc::new(config));
    }

    pub fn get(&self) -> Option<Arc<Config>> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the configuration, reporting an error if the provider has not been configured
    pub fn require(&self, diags: &mut Diagnostics) -> Option<Arc<Config>> {
        let config = self.get();
        if config.is_none() {
            diags.root_error(
                "Provider is not configured",
                "The google provider must be configured before resources can be used",
            );
        }
        config
    }
}
