use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tf_provider::value::{self, ValueBool};
use tf_provider::{map, AttributePath, Diagnostics};
use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description, NestedBlock};
use tf_provider::value::{Value, ValueList, ValueNumber, ValueString};

use crate::config::{Config, Service};
use crate::rest::{
    attribute, mask_if_changed, replace_if_changed, unknown_if_null, RestResource, Timeouts,
    TimeoutsState,
};
use crate::tpgresource::{
    default_project, flatten, flatten_block, flatten_labels, flatten_or_zero,
    get_resource_name_from_self_link, keep_if_equivalent, nested, object, plan_labels,
    project_number_equivalent, put, put_set, string_map, Expand, Labels, Vars,
};
use crate::transport::JsonMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackupPlanState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub project: ValueString<'a>,
    pub location: ValueString<'a>,
    pub name: ValueString<'a>,
    pub cluster: ValueString<'a>,
    pub description: ValueString<'a>,
    pub deactivated: ValueBool,
    #[serde(with = "value::serde_as_vec")]
    pub retention_policy: Value<RetentionPolicy>,
    #[serde(with = "value::serde_as_vec")]
    pub backup_schedule: Value<BackupSchedule<'a>>,
    #[serde(with = "value::serde_as_vec")]
    pub backup_config: Value<BackupConfig<'a>>,
    pub labels: Labels<'a>,
    pub terraform_labels: Labels<'a>,
    pub effective_labels: Labels<'a>,
    pub uid: ValueString<'a>,
    pub etag: ValueString<'a>,
    pub protected_pod_count: ValueNumber,
    pub state: ValueString<'a>,
    pub state_reason: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub timeouts: Value<TimeoutsState<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetentionPolicy {
    pub backup_delete_lock_days: ValueNumber,
    pub backup_retain_days: ValueNumber,
    pub locked: ValueBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackupSchedule<'a> {
    #[serde(borrow = "'a")]
    pub cron_schedule: ValueString<'a>,
    pub paused: ValueBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackupConfig<'a> {
    pub include_volume_data: ValueBool,
    pub include_secrets: ValueBool,
    pub all_namespaces: ValueBool,
    #[serde(borrow = "'a")]
    #[serde(with = "value::serde_as_vec")]
    pub selected_namespaces: Value<SelectedNamespaces<'a>>,
    #[serde(with = "value::serde_as_vec")]
    pub encryption_key: Value<EncryptionKey<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SelectedNamespaces<'a> {
    #[serde(borrow = "'a")]
    pub namespaces: ValueList<ValueString<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EncryptionKey<'a> {
    #[serde(borrow = "'a")]
    pub gcp_kms_encryption_key: ValueString<'a>,
}

/// `google_gke_backup_backup_plan`
#[derive(Debug)]
pub struct BackupPlan;

fn expand_retention_policy(policy: &RetentionPolicy) -> Json {
    let mut obj = JsonMap::new();
    put(&mut obj, "backupDeleteLockDays", policy.backup_delete_lock_days.expand());
    put(&mut obj, "backupRetainDays", policy.backup_retain_days.expand());
    put(&mut obj, "locked", policy.locked.expand());
    nested(obj)
}

fn flatten_retention_policy(policy: &mut RetentionPolicy, obj: &JsonMap, _fill: bool) {
    policy.backup_delete_lock_days = flatten(obj, "backupDeleteLockDays");
    policy.backup_retain_days = flatten(obj, "backupRetainDays");
    policy.locked = flatten(obj, "locked");
}

fn expand_backup_config(config: &BackupConfig<'_>) -> Json {
    let mut obj = JsonMap::new();
    put_set(&mut obj, "includeVolumeData", config.include_volume_data.expand());
    put_set(&mut obj, "includeSecrets", config.include_secrets.expand());
    put(&mut obj, "allNamespaces", config.all_namespaces.expand());
    if let Value::Value(selected) = &config.selected_namespaces {
        let mut selected_obj = JsonMap::new();
        put(&mut selected_obj, "namespaces", selected.namespaces.expand());
        put(&mut obj, "selectedNamespaces", Json::Object(selected_obj));
    }
    if let Value::Value(key) = &config.encryption_key {
        let mut key_obj = JsonMap::new();
        put(&mut key_obj, "gcpKmsEncryptionKey", key.gcp_kms_encryption_key.expand());
        put(&mut obj, "encryptionKey", Json::Object(key_obj));
    }
    nested(obj)
}

fn flatten_backup_config<'a>(config: &mut BackupConfig<'a>, obj: &JsonMap, fill: bool) {
    config.include_volume_data = flatten_or_zero(&config.include_volume_data, obj, "includeVolumeData");
    config.include_secrets = flatten_or_zero(&config.include_secrets, obj, "includeSecrets");
    config.all_namespaces = flatten(obj, "allNamespaces");
    flatten_block(
        &mut config.selected_namespaces,
        object(obj, "selectedNamespaces"),
        fill,
        |selected, obj, _| selected.namespaces = flatten(obj, "namespaces"),
    );
    flatten_block(
        &mut config.encryption_key,
        object(obj, "encryptionKey"),
        fill,
        |key, obj, _| key.gcp_kms_encryption_key = flatten(obj, "gcpKmsEncryptionKey"),
    );
}

impl RestResource for BackupPlan {
    type State<'a> = BackupPlanState<'a>;

    const KIND: &'static str = "BackupPlan";
    const SERVICE: Service = Service::GkeBackup;
    const TIMEOUTS: Timeouts = Timeouts::minutes(20, 20, 20);

    const CREATE_URL: &'static str =
        "{{GKEBackupBasePath}}projects/{{project}}/locations/{{location}}/backupPlans?backupPlanId={{name}}";
    const SELF_URL: &'static str =
        "{{GKEBackupBasePath}}projects/{{project}}/locations/{{location}}/backupPlans/{{name}}";
    const ID_FORMAT: &'static str = "projects/{{project}}/locations/{{location}}/backupPlans/{{name}}";
    const IMPORT_FORMATS: &'static [&'static str] = &[
        "^projects/(?P<project>[^/]+)/locations/(?P<location>[^/]+)/backupPlans/(?P<name>[^/]+)$",
        "^(?P<project>[^/]+)/(?P<location>[^/]+)/(?P<name>[^/]+)$",
        "^(?P<location>[^/]+)/(?P<name>[^/]+)$",
    ];
    const LONG_RUNNING: bool = true;

    fn schema() -> Block {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};
        let labels = || AttributeType::Map(AttributeType::String.into());

        Block {
            attributes: map! {
                "project" => attribute(AttributeType::String, "Project of the backup plan, the provider project by default", OptionalComputed),
                "location" => attribute(AttributeType::String, "Region of the backup plan", Required),
                "name" => attribute(AttributeType::String, "Short name of the backup plan", Required),
                "cluster" => attribute(AttributeType::String, "Cluster to back up, `projects/*/locations/*/clusters/*`", Required),
                "description" => attribute(AttributeType::String, "Description of the backup plan", Optional),
                "deactivated" => attribute(AttributeType::Bool, "Forbid new backups and schedule changes. Deactivated plans cannot be reactivated", OptionalComputed),
                "labels" => attribute(labels(), "Labels of the backup plan. Only the labels set here are managed, see `effective_labels` for every label", Optional),
                "terraform_labels" => attribute(labels(), "Labels set on the backup plan and default labels of the provider", Computed),
                "effective_labels" => attribute(labels(), "Every label present on the backup plan", Computed),
                "uid" => attribute(AttributeType::String, "Server generated unique id", Computed),
                "etag" => attribute(AttributeType::String, "Fingerprint of the backup plan", Computed),
                "protected_pod_count" => attribute(AttributeType::Number, "Number of Kubernetes pods backed up by the last successful backup", Computed),
                "state" => attribute(AttributeType::String, "State of the backup plan", Computed),
                "state_reason" => attribute(AttributeType::String, "Details of the state", Computed),
            },
            blocks: map! {
                "retention_policy" => NestedBlock::Optional(Block {
                    attributes: map! {
                        "backup_delete_lock_days" => attribute(AttributeType::Number, "Minimum age of a backup before it can be deleted", OptionalComputed),
                        "backup_retain_days" => attribute(AttributeType::Number, "Age of a backup when it is deleted, 0 to never delete backups", OptionalComputed),
                        "locked" => attribute(AttributeType::Bool, "Make the retention policy immutable", OptionalComputed),
                    },
                    description: Description::plain("Lifecycle of the backups"),
                    ..Default::default()
                }),
                "backup_schedule" => NestedBlock::Optional(Block {
                    attributes: map! {
                        "cron_schedule" => attribute(AttributeType::String, "Standard cron schedule creating the backups", Optional),
                        "paused" => attribute(AttributeType::Bool, "Pause the scheduled backups", OptionalComputed),
                    },
                    description: Description::plain("Schedule of the backups"),
                    ..Default::default()
                }),
                "backup_config" => NestedBlock::Optional(Block {
                    attributes: map! {
                        "include_volume_data" => attribute(AttributeType::Bool, "Back up the data of the persistent volumes", OptionalComputed),
                        "include_secrets" => attribute(AttributeType::Bool, "Back up the Kubernetes secrets", OptionalComputed),
                        "all_namespaces" => attribute(AttributeType::Bool, "Back up every namespace of the cluster", Optional),
                    },
                    blocks: map! {
                        "selected_namespaces" => NestedBlock::Optional(Block {
                            attributes: map! {
                                "namespaces" => attribute(AttributeType::List(AttributeType::String.into()), "Names of the namespaces", Required),
                            },
                            description: Description::plain("Namespaces to back up"),
                            ..Default::default()
                        }),
                        "encryption_key" => NestedBlock::Optional(Block {
                            attributes: map! {
                                "gcp_kms_encryption_key" => attribute(AttributeType::String, "Cloud KMS key, `projects/*/locations/*/keyRings/*/cryptoKeys/*`", Required),
                            },
                            description: Description::plain("Customer managed key encrypting the backups"),
                            ..Default::default()
                        }),
                    },
                    description: Description::plain("Content of the backups"),
                    ..Default::default()
                }),
            },
            description: Description::plain("Backup plan of a GKE cluster"),
            ..Default::default()
        }
    }

    fn validate(diags: &mut Diagnostics, state: &Self::State<'_>) {
        if let Value::Value(config) = &state.backup_config {
            let scopes = usize::from(config.all_namespaces == Value::Value(true))
                + usize::from(config.selected_namespaces.is_value());
            if scopes > 1 {
                diags.error(
                    "Conflicting backup scopes",
                    "Only one of all_namespaces and selected_namespaces can be set",
                    AttributePath::new("backup_config").index(0),
                );
            }
        }
    }

    fn id<'s, 'a>(state: &'s mut Self::State<'a>) -> &'s mut ValueString<'a> {
        &mut state.id
    }

    fn timeouts<'s, 'a>(state: &'s Self::State<'a>) -> &'s Value<TimeoutsState<'a>> {
        &state.timeouts
    }

    fn vars(state: &Self::State<'_>) -> Vars {
        Vars::new()
            .with_value("project", &state.project)
            .with_value("location", &state.location)
            .with_value("name", &state.name)
    }

    fn from_import<'a>(vars: &Vars) -> Self::State<'a> {
        BackupPlanState {
            project: vars.value("project"),
            location: vars.value("location"),
            name: vars.value("name"),
            retention_policy: Value::Unknown,
            backup_schedule: Value::Unknown,
            backup_config: Value::Unknown,
            ..Default::default()
        }
    }

    fn expand(state: &Self::State<'_>, _config: &Config) -> Result<JsonMap> {
        let mut obj = JsonMap::new();
        put(&mut obj, "cluster", state.cluster.expand());
        put(&mut obj, "description", state.description.expand());
        put(&mut obj, "deactivated", state.deactivated.expand());
        if let Value::Value(policy) = &state.retention_policy {
            put(&mut obj, "retentionPolicy", expand_retention_policy(policy));
        }
        if let Value::Value(schedule) = &state.backup_schedule {
            let mut schedule_obj = JsonMap::new();
            put(&mut schedule_obj, "cronSchedule", schedule.cron_schedule.expand());
            put(&mut schedule_obj, "paused", schedule.paused.expand());
            put(&mut obj, "backupSchedule", nested(schedule_obj));
        }
        if let Value::Value(config) = &state.backup_config {
            put(&mut obj, "backupConfig", expand_backup_config(config));
        }
        let labels: JsonMap = string_map(&state.effective_labels)
            .into_iter()
            .map(|(k, v)| (k, Json::String(v)))
            .collect();
        put(&mut obj, "labels", Json::Object(labels));
        Ok(obj)
    }

    fn flatten<'a>(state: &mut Self::State<'a>, res: &JsonMap, _config: &Config) {
        state.cluster = keep_if_equivalent(&state.cluster, flatten(res, "cluster"), project_number_equivalent);
        state.description = flatten(res, "description");
        state.deactivated = flatten_or_zero(&state.deactivated, res, "deactivated");
        state.uid = flatten(res, "uid");
        state.etag = flatten(res, "etag");
        state.protected_pod_count = flatten(res, "protectedPodCount");
        state.state = flatten(res, "state");
        state.state_reason = flatten(res, "stateReason");
        flatten_block(
            &mut state.retention_policy,
            object(res, "retentionPolicy"),
            false,
            flatten_retention_policy,
        );
        flatten_block(
            &mut state.backup_schedule,
            object(res, "backupSchedule"),
            false,
            |schedule, obj, _| {
                schedule.cron_schedule = flatten(obj, "cronSchedule");
                schedule.paused = flatten_or_zero(&schedule.paused, obj, "paused");
            },
        );
        flatten_block(&mut state.backup_config, object(res, "backupConfig"), false, flatten_backup_config);
        flatten_labels(
            object(res, "labels"),
            &mut state.labels,
            &mut state.terraform_labels,
            &mut state.effective_labels,
        );
    }

    fn created<'a>(state: &mut Self::State<'a>, res: &JsonMap) {
        let name: ValueString<'a> = flatten(res, "name");
        if let Value::Value(name) = name {
            state.name = Value::from(get_resource_name_from_self_link(&name).to_owned());
        }
    }

    fn update_mask(prior: &Self::State<'_>, planned: &Self::State<'_>) -> Vec<&'static str> {
        let mut mask = Vec::new();
        mask_if_changed(&mut mask, "description", &prior.description, &planned.description);
        mask_if_changed(&mut mask, "retentionPolicy", &prior.retention_policy, &planned.retention_policy);
        mask_if_changed(&mut mask, "labels", &prior.effective_labels, &planned.effective_labels);
        mask_if_changed(&mut mask, "backupSchedule", &prior.backup_schedule, &planned.backup_schedule);
        mask_if_changed(&mut mask, "deactivated", &prior.deactivated, &planned.deactivated);
        mask_if_changed(&mut mask, "backupConfig", &prior.backup_config, &planned.backup_config);
        mask
    }

    fn requires_replace(prior: &Self::State<'_>, proposed: &Self::State<'_>) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_if_changed(&mut paths, "project", &prior.project, &proposed.project);
        replace_if_changed(&mut paths, "location", &prior.location, &proposed.location);
        replace_if_changed(&mut paths, "name", &prior.name, &proposed.name);
        replace_if_changed(&mut paths, "cluster", &prior.cluster, &proposed.cluster);
        paths
    }

    fn plan<'a>(state: &mut Self::State<'a>, prior: Option<&Self::State<'a>>, config: &Config) {
        default_project(&mut state.project, config);
        plan_labels(
            config,
            &state.labels.clone(),
            &mut state.terraform_labels,
            &mut state.effective_labels,
            prior.map(|prior| (&prior.terraform_labels, &prior.effective_labels)),
        );
        let creating = prior.is_none();
        if creating {
            unknown_if_null(&mut state.project);
            unknown_if_null(&mut state.deactivated);
            state.uid = Value::Unknown;
            state.protected_pod_count = Value::Unknown;
            if let Value::Value(policy) = &mut state.retention_policy {
                unknown_if_null(&mut policy.backup_delete_lock_days);
                unknown_if_null(&mut policy.backup_retain_days);
                unknown_if_null(&mut policy.locked);
            }
            if let Value::Value(schedule) = &mut state.backup_schedule {
                unknown_if_null(&mut schedule.paused);
            }
            if let Value::Value(config) = &mut state.backup_config {
                unknown_if_null(&mut config.include_volume_data);
                unknown_if_null(&mut config.include_secrets);
            }
        }
        if creating || prior.is_some_and(|prior| !Self::update_mask(prior, state).is_empty()) {
            state.etag = Value::Unknown;
            state.state = Value::Unknown;
            state.state_reason = Value::Unknown;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::TokenSource;

    fn config() -> Config {
        let mut config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        config.project = Some("my-project".to_owned());
        config.add_terraform_attribution_label = false;
        config
    }

    fn plan<'a>() -> BackupPlanState<'a> {
        BackupPlanState {
            location: Value::from("us-central1"),
            name: Value::from("nightly"),
            cluster: Value::from("projects/my-project/locations/us-central1/clusters/main"),
            backup_schedule: Value::Value(BackupSchedule {
                cron_schedule: Value::from("0 3 * * *"),
                paused: Value::Null,
            }),
            backup_config: Value::Value(BackupConfig {
                include_volume_data: Value::Value(false),
                all_namespaces: Value::Value(true),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn request_body() {
        let mut state = plan();
        BackupPlan::plan(&mut state, None, &config());
        let body = BackupPlan::expand(&state, &config()).unwrap();
        assert_eq!(
            Json::Object(body),
            json!({
                "cluster": "projects/my-project/locations/us-central1/clusters/main",
                "backupSchedule": {"cronSchedule": "0 3 * * *"},
                "backupConfig": {"includeVolumeData": false, "allNamespaces": true},
            })
        );
        assert!(state.backup_config.as_ref_option().unwrap().include_secrets.is_unknown());
        assert!(state.etag.is_unknown());
    }

    #[test]
    fn read_back() {
        let mut state = plan();
        let res = json!({
            "name": "projects/my-project/locations/us-central1/backupPlans/nightly",
            "cluster": "projects/123/locations/us-central1/clusters/main",
            "backupSchedule": {"cronSchedule": "0 3 * * *"},
            "backupConfig": {"allNamespaces": true, "includeSecrets": true},
            "retentionPolicy": {"backupRetainDays": 30},
            "uid": "abc",
            "state": "READY",
            "protectedPodCount": 4,
        });
        BackupPlan::flatten(&mut state, res.as_object().unwrap(), &config());
        assert_eq!(state.cluster.as_str(), "projects/my-project/locations/us-central1/clusters/main");
        assert!(state.retention_policy.is_null());
        let backup_config = state.backup_config.as_ref_option().unwrap();
        assert_eq!(backup_config.include_volume_data, Value::Value(false));
        assert_eq!(backup_config.include_secrets, Value::Value(true));
        assert_eq!(state.protected_pod_count, Value::Value(4));
        assert_eq!(
            state.backup_schedule.as_ref_option().unwrap().paused,
            Value::Null
        );
    }

    #[test]
    fn created_keeps_the_short_name() {
        let mut state = plan();
        let res = json!({"name": "projects/my-project/locations/us-central1/backupPlans/nightly"});
        BackupPlan::created(&mut state, res.as_object().unwrap());
        assert_eq!(state.name.as_str(), "nightly");
    }

    #[test]
    fn backup_scopes_conflict() {
        let mut state = plan();
        if let Value::Value(config) = &mut state.backup_config {
            config.selected_namespaces = Value::Value(SelectedNamespaces {
                namespaces: Value::Value(vec![Value::from("default")]),
            });
        }
        let mut diags = Diagnostics::default();
        BackupPlan::validate(&mut diags, &state);
        assert_eq!(diags.errors.len(), 1);
    }
}
