use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tf_provider::value;
use tf_provider::{map, AttributePath, Diagnostics};
use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description, NestedBlock};
use tf_provider::value::{Value, ValueList, ValueString};

use crate::config::{Config, Service};
use crate::rest::{
    attribute, mask_if_changed, replace_if_changed, unknown_if_null, RestResource, Timeouts, TimeoutsState,
};
use crate::tpgresource::{
    default_project, flatten, flatten_block, flatten_labels, keep_if_equivalent, object, objects,
    plan_labels, project_number_equivalent, put, string_map, Expand, Labels, Vars,
};
use crate::transport::JsonMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClusterState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub project: ValueString<'a>,
    pub location: ValueString<'a>,
    pub cluster_id: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub capacity_config: Value<CapacityConfig<'a>>,
    #[serde(with = "value::serde_as_vec")]
    pub gcp_config: Value<GcpConfig<'a>>,
    #[serde(with = "value::serde_as_vec")]
    pub rebalance_config: Value<RebalanceConfig<'a>>,
    pub labels: Labels<'a>,
    pub terraform_labels: Labels<'a>,
    pub effective_labels: Labels<'a>,
    pub name: ValueString<'a>,
    pub create_time: ValueString<'a>,
    pub update_time: ValueString<'a>,
    pub state: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub timeouts: Value<TimeoutsState<'a>>,
}

/// vCPU and memory of the brokers, both sent as int64 strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CapacityConfig<'a> {
    #[serde(borrow = "'a")]
    pub vcpu_count: ValueString<'a>,
    pub memory_bytes: ValueString<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GcpConfig<'a> {
    #[serde(borrow = "'a")]
    #[serde(with = "value::serde_as_vec")]
    pub access_config: Value<AccessConfig<'a>>,
    pub kms_key: ValueString<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccessConfig<'a> {
    #[serde(borrow = "'a")]
    pub network_configs: ValueList<Value<NetworkConfig<'a>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NetworkConfig<'a> {
    #[serde(borrow = "'a")]
    pub subnet: ValueString<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RebalanceConfig<'a> {
    #[serde(borrow = "'a")]
    pub mode: ValueString<'a>,
}

/// `google_managed_kafka_cluster`
#[derive(Debug)]
pub struct Cluster;

fn expand_gcp_config(gcp: &GcpConfig<'_>) -> Json {
    let mut obj = JsonMap::new();
    if let Value::Value(access) = &gcp.access_config {
        let networks: Vec<Json> = access
            .network_configs
            .iter()
            .flatten()
            .filter_map(Value::as_ref_option)
            .map(|network| {
                let mut obj = JsonMap::new();
                put(&mut obj, "subnet", network.subnet.expand());
                Json::Object(obj)
            })
            .collect();
        let mut access = JsonMap::new();
        put(&mut access, "networkConfigs", Json::Array(networks));
        put(&mut obj, "accessConfig", Json::Object(access));
    }
    put(&mut obj, "kmsKey", gcp.kms_key.expand());
    Json::Object(obj)
}

fn flatten_gcp_config<'a>(gcp: &mut GcpConfig<'a>, obj: &JsonMap, fill: bool) {
    let old_subnets: Vec<ValueString<'a>> = gcp
        .access_config
        .as_ref_option()
        .and_then(|access| access.network_configs.as_ref_option())
        .into_iter()
        .flatten()
        .map(|network| {
            network
                .as_ref_option()
                .map_or(Value::Null, |network| network.subnet.clone())
        })
        .collect();
    flatten_block(
        &mut gcp.access_config,
        object(obj, "accessConfig"),
        fill,
        |access, obj, _| {
            access.network_configs = Value::Value(
                objects(obj, "networkConfigs")
                    .enumerate()
                    .map(|(i, network)| {
                        let old = old_subnets.get(i).cloned().unwrap_or_default();
                        Value::Value(NetworkConfig {
                            subnet: keep_if_equivalent(
                                &old,
                                flatten(network, "subnet"),
                                project_number_equivalent,
                            ),
                        })
                    })
                    .collect(),
            );
        },
    );
    gcp.kms_key = keep_if_equivalent(&gcp.kms_key, flatten(obj, "kmsKey"), project_number_equivalent);
}

impl RestResource for Cluster {
    type State<'a> = ClusterState<'a>;

    const KIND: &'static str = "Cluster";
    const SERVICE: Service = Service::ManagedKafka;
    const TIMEOUTS: Timeouts = Timeouts::minutes(60, 30, 30);

    const CREATE_URL: &'static str = "{{ManagedKafkaBasePath}}projects/{{project}}/locations/{{location}}/clusters?clusterId={{cluster_id}}";
    const SELF_URL: &'static str =
        "{{ManagedKafkaBasePath}}projects/{{project}}/locations/{{location}}/clusters/{{cluster_id}}";
    const ID_FORMAT: &'static str = "projects/{{project}}/locations/{{location}}/clusters/{{cluster_id}}";
    const IMPORT_FORMATS: &'static [&'static str] = &[
        "^projects/(?P<project>[^/]+)/locations/(?P<location>[^/]+)/clusters/(?P<cluster_id>[^/]+)$",
        "^(?P<project>[^/]+)/(?P<location>[^/]+)/(?P<cluster_id>[^/]+)$",
        "^(?P<location>[^/]+)/(?P<cluster_id>[^/]+)$",
    ];
    const LONG_RUNNING: bool = true;

    fn schema() -> Block {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};
        let labels = || AttributeType::Map(AttributeType::String.into());

        Block {
            attributes: map! {
                "project" => attribute(AttributeType::String, "Project of the cluster, the provider project by default", OptionalComputed),
                "location" => attribute(AttributeType::String, "Location of the cluster", Required),
                "cluster_id" => attribute(AttributeType::String, "Id of the cluster, the last component of its name", Required),
                "labels" => attribute(labels(), "Labels of the cluster. Only the labels set here are managed, see `effective_labels` for every label of the cluster", Optional),
                "terraform_labels" => attribute(labels(), "Labels set on the cluster and default labels of the provider", Computed),
                "effective_labels" => attribute(labels(), "Every label present on the cluster", Computed),
                "name" => attribute(AttributeType::String, "Name of the cluster, `projects/{project}/locations/{location}/clusters/{cluster_id}`", Computed),
                "create_time" => attribute(AttributeType::String, "Creation time of the cluster", Computed),
                "update_time" => attribute(AttributeType::String, "Last update time of the cluster", Computed),
                "state" => attribute(AttributeType::String, "State of the cluster: `CREATING`, `ACTIVE` or `DELETING`", Computed),
            },
            blocks: map! {
                "capacity_config" => NestedBlock::Optional(Block {
                    attributes: map! {
                        "vcpu_count" => attribute(AttributeType::String, "Number of vCPUs of the cluster, at least 3", Required),
                        "memory_bytes" => attribute(AttributeType::String, "Memory of the cluster in bytes, between 1 GiB and 8 GiB per vCPU", Required),
                    },
                    description: Description::plain("Capacity of the cluster, required"),
                    ..Default::default()
                }),
                "gcp_config" => NestedBlock::Optional(Block {
                    attributes: map! {
                        "kms_key" => attribute(AttributeType::String, "Cloud KMS key encrypting the cluster, in the region of the cluster", Optional),
                    },
                    blocks: map! {
                        "access_config" => NestedBlock::Optional(Block {
                            blocks: map! {
                                "network_configs" => NestedBlock::List(Block {
                                    attributes: map! {
                                        "subnet" => attribute(AttributeType::String, "Subnet from which the cluster is reachable, `projects/{project}/regions/{region}/subnetworks/{subnet}`", Required),
                                    },
                                    description: Description::plain("VPC subnets where the cluster gets its addresses, at most 10"),
                                    ..Default::default()
                                }),
                            },
                            description: Description::plain("Access to the cluster, required"),
                            ..Default::default()
                        }),
                    },
                    description: Description::plain("Google Cloud configuration of the cluster, required"),
                    ..Default::default()
                }),
                "rebalance_config" => NestedBlock::Optional(Block {
                    attributes: map! {
                        "mode" => attribute(AttributeType::String, "`NO_REBALANCE` (default) or `AUTO_REBALANCE_ON_SCALE_UP`", Optional),
                    },
                    description: Description::plain("Rebalancing behavior of the cluster"),
                    ..Default::default()
                }),
            },
            description: Description::plain("Managed Service for Apache Kafka cluster"),
            ..Default::default()
        }
    }

    fn validate(diags: &mut Diagnostics, state: &Self::State<'_>) {
        if state.capacity_config.is_null() {
            diags.error_short("Missing capacity_config", AttributePath::new("capacity_config"));
        }
        match &state.gcp_config {
            Value::Null => {
                diags.error_short("Missing gcp_config", AttributePath::new("gcp_config"));
            }
            Value::Value(gcp) => {
                let path = AttributePath::new("gcp_config").index(0).attribute("access_config");
                match &gcp.access_config {
                    Value::Null => diags.error_short("Missing access_config", path),
                    Value::Value(access) => {
                        let count = access.network_configs.as_ref_option().map_or(0, Vec::len);
                        if count > 10 {
                            diags.error(
                                "Too many network configs",
                                "At most 10 subnets can be attached to a cluster",
                                path.index(0).attribute("network_configs"),
                            );
                        }
                    }
                    Value::Unknown => {}
                }
            }
            Value::Unknown => {}
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
            .with_value("cluster_id", &state.cluster_id)
    }

    fn from_import<'a>(vars: &Vars) -> Self::State<'a> {
        ClusterState {
            project: vars.value("project"),
            location: vars.value("location"),
            cluster_id: vars.value("cluster_id"),
            capacity_config: Value::Unknown,
            gcp_config: Value::Unknown,
            rebalance_config: Value::Unknown,
            ..Default::default()
        }
    }

    fn expand(state: &Self::State<'_>, _config: &Config) -> Result<JsonMap> {
        let mut obj = JsonMap::new();
        if let Value::Value(gcp) = &state.gcp_config {
            put(&mut obj, "gcpConfig", expand_gcp_config(gcp));
        }
        if let Value::Value(capacity) = &state.capacity_config {
            let mut capacity_obj = JsonMap::new();
            put(&mut capacity_obj, "vcpuCount", capacity.vcpu_count.expand());
            put(&mut capacity_obj, "memoryBytes", capacity.memory_bytes.expand());
            put(&mut obj, "capacityConfig", Json::Object(capacity_obj));
        }
        if let Value::Value(rebalance) = &state.rebalance_config {
            let mut rebalance_obj = JsonMap::new();
            put(&mut rebalance_obj, "mode", rebalance.mode.expand());
            put(&mut obj, "rebalanceConfig", Json::Object(rebalance_obj));
        }
        let labels: JsonMap = string_map(&state.effective_labels)
            .into_iter()
            .map(|(k, v)| (k, Json::String(v)))
            .collect();
        put(&mut obj, "labels", Json::Object(labels));
        Ok(obj)
    }

    fn flatten<'a>(state: &mut Self::State<'a>, res: &JsonMap, _config: &Config) {
        state.name = flatten(res, "name");
        state.create_time = flatten(res, "createTime");
        state.update_time = flatten(res, "updateTime");
        state.state = flatten(res, "state");
        flatten_block(&mut state.gcp_config, object(res, "gcpConfig"), false, flatten_gcp_config);
        flatten_block(
            &mut state.capacity_config,
            object(res, "capacityConfig"),
            false,
            |capacity, obj, _| {
                capacity.vcpu_count = flatten(obj, "vcpuCount");
                capacity.memory_bytes = flatten(obj, "memoryBytes");
            },
        );
        flatten_block(
            &mut state.rebalance_config,
            object(res, "rebalanceConfig"),
            false,
            |rebalance, obj, _| rebalance.mode = flatten(obj, "mode"),
        );
        flatten_labels(
            object(res, "labels"),
            &mut state.labels,
            &mut state.terraform_labels,
            &mut state.effective_labels,
        );
    }

    fn created<'a>(state: &mut Self::State<'a>, res: &JsonMap) {
        state.name = flatten(res, "name");
    }

    fn update_mask(prior: &Self::State<'_>, planned: &Self::State<'_>) -> Vec<&'static str> {
        let mut mask = Vec::new();
        mask_if_changed(&mut mask, "gcpConfig", &prior.gcp_config, &planned.gcp_config);
        mask_if_changed(&mut mask, "capacityConfig", &prior.capacity_config, &planned.capacity_config);
        mask_if_changed(&mut mask, "rebalanceConfig", &prior.rebalance_config, &planned.rebalance_config);
        mask_if_changed(&mut mask, "labels", &prior.effective_labels, &planned.effective_labels);
        mask
    }

    fn requires_replace(prior: &Self::State<'_>, proposed: &Self::State<'_>) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_if_changed(&mut paths, "project", &prior.project, &proposed.project);
        replace_if_changed(&mut paths, "location", &prior.location, &proposed.location);
        replace_if_changed(&mut paths, "cluster_id", &prior.cluster_id, &proposed.cluster_id);
        let null = ValueString::Null;
        let old_key = prior.gcp_config.as_ref_option().map_or(&null, |gcp| &gcp.kms_key);
        let new_key = proposed.gcp_config.as_ref_option().map_or(&null, |gcp| &gcp.kms_key);
        if old_key != new_key {
            paths.push(AttributePath::new("gcp_config").index(0).attribute("kms_key"));
        }
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
        match prior {
            None => {
                unknown_if_null(&mut state.project);
                state.name = Value::Unknown;
                state.create_time = Value::Unknown;
                state.update_time = Value::Unknown;
                state.state = Value::Unknown;
            }
            Some(prior) => {
                if !Self::update_mask(prior, state).is_empty() {
                    state.update_time = Value::Unknown;
                    state.state = Value::Unknown;
                }
            }
        }
    }
}
