use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tf_provider::value::{self, ValueBool};
use tf_provider::{map, AttributePath, Diagnostics};
use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description};
use tf_provider::value::{Value, ValueList, ValueString};
use tracing::info;

use crate::config::{Config, Service};
use crate::operation::StateChangeConf;
use crate::rest::{
    attribute, replace_if_changed, unknown_if_null, RequestContext, RestResource, Timeouts,
    TimeoutsState,
};
use crate::tpgresource::{default_project, flatten, flatten_or_zero, put, put_set, replace_vars, Expand, Vars};
use crate::transport::{billing_project, ApiRequest, JsonMap};

const DESCRIPTION_MAX_LEN: usize = 500;
const MATCH_MODES: &[&str] = &["MATCH_MODE_HYBRID", "MATCH_MODE_ML_ONLY"];
const API_VERSIONS: &[&str] = &["API_VERSION_V1", "API_VERSION_V2", "API_VERSION_V2_BETA_1"];
const TIERS: &[&str] = &["TIER_STANDARD", "TIER_ENTERPRISE", "TIER_ENTERPRISE_PLUS"];

const TIER_WAIT: Duration = Duration::from_secs(40 * 60);
/// Tier reads are polled five times slower than operations, every 10s by default
const TIER_POLL_FACTOR: u32 = 5;
const TIER_CONFIRMATIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub project: ValueString<'a>,
    pub display_name: ValueString<'a>,
    pub default_language_code: ValueString<'a>,
    pub supported_language_codes: ValueList<ValueString<'a>>,
    pub time_zone: ValueString<'a>,
    pub description: ValueString<'a>,
    pub avatar_uri: ValueString<'a>,
    pub enable_logging: ValueBool,
    pub match_mode: ValueString<'a>,
    pub classification_threshold: Value<f64>,
    pub api_version: ValueString<'a>,
    pub tier: ValueString<'a>,
    pub avatar_uri_backend: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub timeouts: Value<TimeoutsState<'a>>,
}

/// `google_dialogflow_agent`: the single Dialogflow agent of a project
#[derive(Debug)]
pub struct Agent;

fn validate_enum(diags: &mut Diagnostics, name: &'static str, value: &ValueString<'_>, allowed: &[&str]) {
    if let Value::Value(v) = value {
        if !v.is_empty() && !allowed.contains(&v.as_ref()) {
            diags.error(
                format!("Invalid {name}"),
                format!("expected {name} to be one of {allowed:?}, got {v}"),
                AttributePath::new(name),
            );
        }
    }
}

impl Agent {
    /// Wait until reads return the new tier, which the API only reports eventually
    async fn wait_for_tier(ctx: RequestContext<'_>, state: &AgentState<'_>, tier: &str) -> Result<()> {
        let vars = Self::vars(state);
        let url = replace_vars(Self::SELF_URL, &vars, ctx.config)?;
        let url = url.as_str();
        let project = billing_project(ctx.config, vars.get("project"));

        let target = [tier];
        let conf = StateChangeConf {
            poll_interval: Some(ctx.config.poll_interval * TIER_POLL_FACTOR),
            continuous_target_occurence: TIER_CONFIRMATIONS,
            ..StateChangeConf::new(&[], &target, TIER_WAIT)
        };
        info!(tier, "Waiting for the agent tier to be reported");
        conf.wait_for_state(move || async move {
            let res = ApiRequest::get(ctx.config, url.to_owned())
                .billing_project(project)
                .user_agent(ctx.user_agent)
                .send()
                .await?;
            let tier = res
                .get("tier")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_owned();
            Ok(Some(((), tier)))
        })
        .await
        .with_context(|| format!("Timed out waiting for agent tier to return correct value. Waiting for {tier}"))
    }
}

#[async_trait]
impl RestResource for Agent {
    type State<'a> = AgentState<'a>;

    const KIND: &'static str = "Agent";
    const SERVICE: Service = Service::Dialogflow;
    const TIMEOUTS: Timeouts = Timeouts::minutes(40, 40, 4);

    const CREATE_URL: &'static str = "{{DialogflowBasePath}}projects/{{project}}/agent";
    const SELF_URL: &'static str = "{{DialogflowBasePath}}projects/{{project}}/agent";
    const UPDATE_METHOD: Method = Method::POST;
    const UPDATE_MASK: bool = false;
    const ID_FORMAT: &'static str = "{{project}}";
    const IMPORT_FORMATS: &'static [&'static str] = &["^(?P<project>[^/]+)$"];

    fn schema() -> Block {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};

        Block {
            attributes: map! {
                "project" => attribute(AttributeType::String, "Project of the agent, the provider project by default", OptionalComputed),
                "display_name" => attribute(AttributeType::String, "Name of the agent", Required),
                "default_language_code" => attribute(AttributeType::String, "Default language of the agent as a language tag", Required),
                "supported_language_codes" => attribute(AttributeType::List(AttributeType::String.into()), "Supported languages besides the default one", Optional),
                "time_zone" => attribute(AttributeType::String, "Time zone of the agent from the time zone database, such as `Europe/Paris`", Required),
                "description" => attribute(AttributeType::String, "Description of the agent, at most 500 characters", Optional),
                "avatar_uri" => attribute(AttributeType::String, "URI of the agent avatar", Optional),
                "enable_logging" => attribute(AttributeType::Bool, "Log conversation requests and responses to Cloud Logging", Optional),
                "match_mode" => attribute(AttributeType::String, "`MATCH_MODE_HYBRID` or `MATCH_MODE_ML_ONLY`", OptionalComputed),
                "classification_threshold" => attribute(AttributeType::Number, "Minimum confidence of an intent match, between 0.0 and 1.0", Optional),
                "api_version" => attribute(AttributeType::String, "`API_VERSION_V1`, `API_VERSION_V2` or `API_VERSION_V2_BETA_1`", OptionalComputed),
                "tier" => attribute(AttributeType::String, "`TIER_STANDARD`, `TIER_ENTERPRISE` or `TIER_ENTERPRISE_PLUS`", OptionalComputed),
                "avatar_uri_backend" => attribute(AttributeType::String, "Avatar URI generated by Dialogflow when `avatar_uri` is not set", Computed),
            },
            description: Description::plain("Dialogflow agent"),
            ..Default::default()
        }
    }

    fn validate(diags: &mut Diagnostics, state: &Self::State<'_>) {
        if let Value::Value(description) = &state.description {
            if description.chars().count() > DESCRIPTION_MAX_LEN {
                diags.error(
                    "Invalid description",
                    format!("expected length of description to be at most {DESCRIPTION_MAX_LEN}"),
                    AttributePath::new("description"),
                );
            }
        }
        validate_enum(diags, "match_mode", &state.match_mode, MATCH_MODES);
        validate_enum(diags, "api_version", &state.api_version, API_VERSIONS);
        validate_enum(diags, "tier", &state.tier, TIERS);
    }

    fn id<'s, 'a>(state: &'s mut Self::State<'a>) -> &'s mut ValueString<'a> {
        &mut state.id
    }

    fn timeouts<'s, 'a>(state: &'s Self::State<'a>) -> &'s Value<TimeoutsState<'a>> {
        &state.timeouts
    }

    fn vars(state: &Self::State<'_>) -> Vars {
        Vars::new().with_value("project", &state.project)
    }

    fn from_import<'a>(vars: &Vars) -> Self::State<'a> {
        AgentState {
            project: vars.value("project"),
            ..Default::default()
        }
    }

    fn expand(state: &Self::State<'_>, _config: &Config) -> Result<JsonMap> {
        let mut obj = JsonMap::new();
        put(&mut obj, "displayName", state.display_name.expand());
        put(&mut obj, "defaultLanguageCode", state.default_language_code.expand());
        put(&mut obj, "supportedLanguageCodes", state.supported_language_codes.expand());
        put(&mut obj, "timeZone", state.time_zone.expand());
        put(&mut obj, "description", state.description.expand());
        put(&mut obj, "avatarUri", state.avatar_uri.expand());
        put_set(&mut obj, "enableLogging", state.enable_logging.expand());
        put(&mut obj, "matchMode", state.match_mode.expand());
        put(&mut obj, "classificationThreshold", state.classification_threshold.expand());
        put(&mut obj, "apiVersion", state.api_version.expand());
        put(&mut obj, "tier", state.tier.expand());
        Ok(obj)
    }

    fn flatten<'a>(state: &mut Self::State<'a>, res: &JsonMap, _config: &Config) {
        state.display_name = flatten(res, "displayName");
        state.default_language_code = flatten(res, "defaultLanguageCode");
        state.supported_language_codes = flatten(res, "supportedLanguageCodes");
        state.time_zone = flatten(res, "timeZone");
        state.description = flatten(res, "description");
        state.avatar_uri = flatten(res, "avatarUri");
        state.avatar_uri_backend = flatten(res, "avatarUriBackend");
        state.enable_logging = flatten_or_zero(&state.enable_logging, res, "enableLogging");
        state.match_mode = flatten(res, "matchMode");
        state.classification_threshold =
            flatten_or_zero(&state.classification_threshold, res, "classificationThreshold");
        state.api_version = flatten(res, "apiVersion");
        state.tier = flatten(res, "tier");
    }

    /// Updates send the whole agent
    fn update_mask(_prior: &Self::State<'_>, _planned: &Self::State<'_>) -> Vec<&'static str> {
        Vec::new()
    }

    fn requires_replace(prior: &Self::State<'_>, proposed: &Self::State<'_>) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_if_changed(&mut paths, "project", &prior.project, &proposed.project);
        replace_if_changed(
            &mut paths,
            "default_language_code",
            &prior.default_language_code,
            &proposed.default_language_code,
        );
        paths
    }

    fn plan<'a>(state: &mut Self::State<'a>, prior: Option<&Self::State<'a>>, config: &Config) {
        default_project(&mut state.project, config);
        if prior.is_none() {
            unknown_if_null(&mut state.project);
            unknown_if_null(&mut state.match_mode);
            unknown_if_null(&mut state.api_version);
            unknown_if_null(&mut state.tier);
            if state.avatar_uri.is_null() {
                state.avatar_uri_backend = Value::Unknown;
            }
        }
    }

    async fn post_write<'a>(
        ctx: RequestContext<'_>,
        prior: Option<&Self::State<'a>>,
        state: &Self::State<'a>,
    ) -> Result<()> {
        let Value::Value(tier) = &state.tier else {
            return Ok(());
        };
        if prior.is_some_and(|prior| prior.tier == state.tier) {
            return Ok(());
        }
        Self::wait_for_tier(ctx, state, tier).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tpgresource::replace_vars_for_id;
    use crate::transport::TokenSource;

    fn config() -> Config {
        let mut config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        config.project = Some("my-project".to_owned());
        config
    }

    fn agent<'a>() -> AgentState<'a> {
        AgentState {
            display_name: Value::from("support"),
            default_language_code: Value::from("en"),
            time_zone: Value::from("Europe/Paris"),
            enable_logging: Value::Value(false),
            tier: Value::from("TIER_STANDARD"),
            ..Default::default()
        }
    }

    #[test]
    fn request_body_and_id() {
        let mut state = agent();
        Agent::plan(&mut state, None, &config());
        let body = Agent::expand(&state, &config()).unwrap();
        assert_eq!(
            Json::Object(body),
            json!({
                "displayName": "support",
                "defaultLanguageCode": "en",
                "timeZone": "Europe/Paris",
                "enableLogging": false,
                "tier": "TIER_STANDARD",
            })
        );
        assert!(state.match_mode.is_unknown());
        let id = replace_vars_for_id(Agent::ID_FORMAT, &Agent::vars(&state), &config()).unwrap();
        assert_eq!(id, "my-project");
    }

    #[test]
    fn validation() {
        let mut state = agent();
        state.description = Value::from("x".repeat(501));
        state.tier = Value::from("TIER_GOLD");
        let mut diags = Diagnostics::default();
        Agent::validate(&mut diags, &state);
        assert_eq!(diags.errors.len(), 2);

        let mut diags = Diagnostics::default();
        Agent::validate(&mut diags, &agent());
        assert!(diags.errors.is_empty());
    }

    #[test]
    fn read_keeps_disabled_logging() {
        let mut state = agent();
        let res = json!({
            "displayName": "support",
            "defaultLanguageCode": "en",
            "timeZone": "Europe/Paris",
            "matchMode": "MATCH_MODE_HYBRID",
            "apiVersion": "API_VERSION_V2",
            "tier": "TIER_STANDARD",
            "avatarUriBackend": "https://example.com/avatar.png",
        });
        Agent::flatten(&mut state, res.as_object().unwrap(), &config());
        assert_eq!(state.enable_logging, Value::Value(false));
        assert_eq!(state.match_mode.as_str(), "MATCH_MODE_HYBRID");
        assert!(state.classification_threshold.is_null());
    }
}
