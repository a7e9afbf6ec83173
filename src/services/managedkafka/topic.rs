use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tf_provider::value;
use tf_provider::{map, AttributePath, Diagnostics};
use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description};
use tf_provider::value::{Value, ValueMap, ValueNumber, ValueString};

use crate::config::{Config, Service};
use crate::rest::{
    attribute, mask_if_changed, replace_if_changed, unknown_if_null, RestResource, Timeouts,
    TimeoutsState,
};
use crate::tpgresource::{default_project, flatten, put, string_map, value_map, Expand, Vars};
use crate::transport::JsonMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TopicState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub project: ValueString<'a>,
    pub location: ValueString<'a>,
    pub cluster: ValueString<'a>,
    pub topic_id: ValueString<'a>,
    pub partition_count: ValueNumber,
    pub replication_factor: ValueNumber,
    pub configs: ValueMap<'a, ValueString<'a>>,
    pub name: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub timeouts: Value<TimeoutsState<'a>>,
}

/// `google_managed_kafka_topic`
#[derive(Debug)]
pub struct Topic;

impl RestResource for Topic {
    type State<'a> = TopicState<'a>;

    const KIND: &'static str = "Topic";
    const SERVICE: Service = Service::ManagedKafka;
    const TIMEOUTS: Timeouts = Timeouts::minutes(20, 20, 20);

    const CREATE_URL: &'static str = "{{ManagedKafkaBasePath}}projects/{{project}}/locations/{{location}}/clusters/{{cluster}}/topics?topicId={{topic_id}}";
    const SELF_URL: &'static str = "{{ManagedKafkaBasePath}}projects/{{project}}/locations/{{location}}/clusters/{{cluster}}/topics/{{topic_id}}";
    const ID_FORMAT: &'static str =
        "projects/{{project}}/locations/{{location}}/clusters/{{cluster}}/topics/{{topic_id}}";
    const IMPORT_FORMATS: &'static [&'static str] = &[
        "^projects/(?P<project>[^/]+)/locations/(?P<location>[^/]+)/clusters/(?P<cluster>[^/]+)/topics/(?P<topic_id>[^/]+)$",
        "^(?P<project>[^/]+)/(?P<location>[^/]+)/(?P<cluster>[^/]+)/(?P<topic_id>[^/]+)$",
        "^(?P<location>[^/]+)/(?P<cluster>[^/]+)/(?P<topic_id>[^/]+)$",
    ];

    fn schema() -> Block {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};

        Block {
            attributes: map! {
                "project" => attribute(AttributeType::String, "Project of the topic, the provider project by default", OptionalComputed),
                "location" => attribute(AttributeType::String, "Location of the cluster", Required),
                "cluster" => attribute(AttributeType::String, "Id of the cluster holding the topic", Required),
                "topic_id" => attribute(AttributeType::String, "Id of the topic, the last component of its name", Required),
                "partition_count" => attribute(AttributeType::Number, "Number of partitions, it can only be increased", Optional),
                "replication_factor" => attribute(AttributeType::Number, "Number of replicas of each partition, at most the number of brokers", Required),
                "configs" => attribute(AttributeType::Map(AttributeType::String.into()), "Kafka configurations of the topic, such as `cleanup.policy`", Optional),
                "name" => attribute(AttributeType::String, "Name of the topic, `projects/{project}/locations/{location}/clusters/{cluster}/topics/{topic_id}`", Computed),
            },
            description: Description::plain("Topic of a Managed Service for Apache Kafka cluster"),
            ..Default::default()
        }
    }

    fn validate(diags: &mut Diagnostics, state: &Self::State<'_>) {
        if let Value::Value(count) = state.partition_count {
            if count < 1 {
                diags.error_short(
                    "partition_count must be positive",
                    AttributePath::new("partition_count"),
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
            .with_value("cluster", &state.cluster)
            .with_value("topic_id", &state.topic_id)
    }

    fn from_import<'a>(vars: &Vars) -> Self::State<'a> {
        TopicState {
            project: vars.value("project"),
            location: vars.value("location"),
            cluster: vars.value("cluster"),
            topic_id: vars.value("topic_id"),
            configs: Value::Unknown,
            ..Default::default()
        }
    }

    fn expand(state: &Self::State<'_>, _config: &Config) -> Result<JsonMap> {
        let mut obj = JsonMap::new();
        put(&mut obj, "partitionCount", state.partition_count.expand());
        put(&mut obj, "replicationFactor", state.replication_factor.expand());
        let configs: JsonMap = string_map(&state.configs)
            .into_iter()
            .map(|(k, v)| (k, Json::String(v)))
            .collect();
        put(&mut obj, "configs", Json::Object(configs));
        Ok(obj)
    }

    fn flatten<'a>(state: &mut Self::State<'a>, res: &JsonMap, _config: &Config) {
        state.name = flatten(res, "name");
        state.partition_count = flatten(res, "partitionCount");
        state.replication_factor = flatten(res, "replicationFactor");
        // The API also reports the broker defaults: only keep the configurations set here
        let configs: std::collections::BTreeMap<String, String> = res
            .get("configs")
            .and_then(Json::as_object)
            .into_iter()
            .flatten()
            .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_owned())))
            .collect();
        state.configs = match &state.configs {
            Value::Value(managed) => value_map(
                configs
                    .into_iter()
                    .filter(|(k, _)| managed.contains_key(k.as_str()))
                    .collect(),
            ),
            Value::Null => Value::Null,
            Value::Unknown if configs.is_empty() => Value::Null,
            Value::Unknown => value_map(configs),
        };
    }

    fn update_mask(prior: &Self::State<'_>, planned: &Self::State<'_>) -> Vec<&'static str> {
        let mut mask = Vec::new();
        mask_if_changed(&mut mask, "partitionCount", &prior.partition_count, &planned.partition_count);
        mask_if_changed(&mut mask, "configs", &prior.configs, &planned.configs);
        mask
    }

    fn requires_replace(prior: &Self::State<'_>, proposed: &Self::State<'_>) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_if_changed(&mut paths, "project", &prior.project, &proposed.project);
        replace_if_changed(&mut paths, "location", &prior.location, &proposed.location);
        replace_if_changed(&mut paths, "cluster", &prior.cluster, &proposed.cluster);
        replace_if_changed(&mut paths, "topic_id", &prior.topic_id, &proposed.topic_id);
        replace_if_changed(
            &mut paths,
            "replication_factor",
            &prior.replication_factor,
            &proposed.replication_factor,
        );
        paths
    }

    fn plan<'a>(state: &mut Self::State<'a>, prior: Option<&Self::State<'a>>, config: &Config) {
        default_project(&mut state.project, config);
        if prior.is_none() {
            unknown_if_null(&mut state.project);
            state.name = Value::Unknown;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use serde_json::json;

    use super::*;
    use crate::tpgresource::parse_import_id;
    use crate::transport::TokenSource;

    fn config() -> Config {
        let mut config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        config.project = Some("my-project".to_owned());
        config
    }

    #[test]
    fn request_body() {
        let state = TopicState {
            partition_count: Value::Value(3),
            replication_factor: Value::Value(3),
            configs: Value::Value(
                [(Cow::Borrowed("cleanup.policy"), Value::from("compact"))]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        let body = Topic::expand(&state, &config()).unwrap();
        assert_eq!(
            Json::Object(body),
            json!({
                "partitionCount": 3,
                "replicationFactor": 3,
                "configs": {"cleanup.policy": "compact"},
            })
        );
    }

    #[test]
    fn broker_defaults_are_ignored() {
        let mut state = TopicState {
            configs: Value::Value(
                [(Cow::Borrowed("cleanup.policy"), Value::from("compact"))]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        let res = json!({
            "name": "projects/p/locations/l/clusters/c/topics/t",
            "partitionCount": 3,
            "replicationFactor": 3,
            "configs": {"cleanup.policy": "compact", "retention.ms": "604800000"},
        });
        Topic::flatten(&mut state, res.as_object().unwrap(), &config());
        assert_eq!(
            state.configs,
            Value::Value(
                [(Cow::Borrowed("cleanup.policy"), Value::from("compact"))]
                    .into_iter()
                    .collect()
            )
        );
        assert_eq!(state.partition_count, Value::Value(3));
    }

    #[test]
    fn short_import_id_uses_provider_project() {
        let vars = parse_import_id("us-central1/kafka/events", Topic::IMPORT_FORMATS, &config()).unwrap();
        let state = Topic::from_import(&vars);
        assert_eq!(state.project.as_str(), "my-project");
        assert_eq!(state.cluster.as_str(), "kafka");
        assert_eq!(state.topic_id.as_str(), "events");
    }

    #[test]
    fn replication_factor_forces_replacement() {
        let prior = TopicState {
            replication_factor: Value::Value(3),
            partition_count: Value::Value(3),
            ..Default::default()
        };
        let mut proposed = prior.clone();
        proposed.partition_count = Value::Value(6);
        assert!(Topic::requires_replace(&prior, &proposed).is_empty());
        assert_eq!(Topic::update_mask(&prior, &proposed), vec!["partitionCount"]);

        proposed.replication_factor = Value::Value(1);
        assert_eq!(
            Topic::requires_replace(&prior, &proposed),
            vec![AttributePath::new("replication_factor")]
        );
    }
}
