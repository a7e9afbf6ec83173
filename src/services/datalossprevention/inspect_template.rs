use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use tf_provider::value::{self, ValueBool};
use tf_provider::{map, AttributePath, Diagnostics};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, Description, NestedBlock};
use tf_provider::value::{Value, ValueList, ValueNumber, ValueString};

use crate::config::{Config, Service};
use crate::rest::{
    attribute, mask_if_changed, replace_if_changed, unknown_if_null, RestResource, Timeouts,
    TimeoutsState,
};
use crate::tpgresource::{
    expand_blocks, flatten, flatten_block, flatten_blocks, flatten_or_zero,
    get_resource_name_from_self_link, nested, object, put, put_set, Expand, Vars,
};
use crate::transport::JsonMap;

const DEFAULT_MIN_LIKELIHOOD: &str = "POSSIBLE";
const LIKELIHOODS: &[&str] = &["VERY_UNLIKELY", "UNLIKELY", "POSSIBLE", "LIKELY", "VERY_LIKELY"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InspectTemplateState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub parent: ValueString<'a>,
    pub template_id: ValueString<'a>,
    pub display_name: ValueString<'a>,
    pub description: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub inspect_config: Value<InspectConfig<'a>>,
    pub name: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub timeouts: Value<TimeoutsState<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InspectConfig<'a> {
    pub exclude_info_types: ValueBool,
    pub include_quote: ValueBool,
    #[serde(borrow = "'a")]
    pub min_likelihood: ValueString<'a>,
    pub info_types: ValueList<Value<InfoType<'a>>>,
    #[serde(with = "value::serde_as_vec")]
    pub limits: Value<Limits<'a>>,
    pub rule_set: ValueList<Value<RuleSet<'a>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InfoType<'a> {
    #[serde(borrow = "'a")]
    pub name: ValueString<'a>,
    pub version: ValueString<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Limits<'a> {
    pub max_findings_per_item: ValueNumber,
    pub max_findings_per_request: ValueNumber,
    #[serde(borrow = "'a")]
    pub max_findings_per_info_type: ValueList<Value<InfoTypeLimit<'a>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InfoTypeLimit<'a> {
    #[serde(borrow = "'a")]
    #[serde(with = "value::serde_as_vec")]
    pub info_type: Value<InfoType<'a>>,
    pub max_findings: ValueNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RuleSet<'a> {
    #[serde(borrow = "'a")]
    pub info_types: ValueList<Value<InfoType<'a>>>,
    pub rules: ValueList<Value<Rule<'a>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Rule<'a> {
    #[serde(borrow = "'a")]
    #[serde(with = "value::serde_as_vec")]
    pub hotword_rule: Value<HotwordRule<'a>>,
    #[serde(with = "value::serde_as_vec")]
    pub exclusion_rule: Value<ExclusionRule<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HotwordRule<'a> {
    #[serde(borrow = "'a")]
    #[serde(with = "value::serde_as_vec")]
    pub hotword_regex: Value<Regex<'a>>,
    #[serde(with = "value::serde_as_vec")]
    pub proximity: Value<Proximity>,
    #[serde(with = "value::serde_as_vec")]
    pub likelihood_adjustment: Value<LikelihoodAdjustment<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Regex<'a> {
    #[serde(borrow = "'a")]
    pub pattern: ValueString<'a>,
    pub group_indexes: ValueList<ValueNumber>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Proximity {
    pub window_before: ValueNumber,
    pub window_after: ValueNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LikelihoodAdjustment<'a> {
    #[serde(borrow = "'a")]
    pub fixed_likelihood: ValueString<'a>,
    pub relative_likelihood: ValueNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExclusionRule<'a> {
    #[serde(borrow = "'a")]
    pub matching_type: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub regex: Value<Regex<'a>>,
    #[serde(with = "value::serde_as_vec")]
    pub dictionary: Value<Dictionary<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Dictionary<'a> {
    #[serde(borrow = "'a")]
    #[serde(with = "value::serde_as_vec")]
    pub word_list: Value<WordList<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WordList<'a> {
    #[serde(borrow = "'a")]
    pub words: ValueList<ValueString<'a>>,
}

/// `google_data_loss_prevention_inspect_template`
#[derive(Debug)]
pub struct InspectTemplate;

fn block(
    description: &str,
    attributes: HashMap<String, Attribute>,
    blocks: HashMap<String, NestedBlock>,
) -> Block {
    Block {
        attributes,
        blocks,
        description: Description::plain(description),
        ..Default::default()
    }
}

fn info_type_block(description: &str) -> Block {
    use AttributeConstraint::{Optional, Required};
    block(
        description,
        map! {
            "name" => attribute(AttributeType::String, "Name of the info type, such as `EMAIL_ADDRESS`", Required),
            "version" => attribute(AttributeType::String, "Version of the detector, such as `stable` or `latest`", Optional),
        },
        Default::default(),
    )
}

fn regex_block(description: &str) -> Block {
    use AttributeConstraint::{Optional, Required};
    block(
        description,
        map! {
            "pattern" => attribute(AttributeType::String, "RE2 regular expression", Required),
            "group_indexes" => attribute(AttributeType::List(AttributeType::Number.into()), "Indexes of the submatches to extract as findings, the whole match by default", Optional),
        },
        Default::default(),
    )
}

fn expand_info_type(info_type: &InfoType<'_>) -> Json {
    let mut obj = JsonMap::new();
    put(&mut obj, "name", info_type.name.expand());
    put(&mut obj, "version", info_type.version.expand());
    Json::Object(obj)
}

fn flatten_info_type<'a>(info_type: &mut InfoType<'a>, obj: &JsonMap, _fill: bool) {
    info_type.name = flatten(obj, "name");
    info_type.version = flatten(obj, "version");
}

fn read_info_type<'a>(obj: &JsonMap) -> InfoType<'a> {
    let mut info_type = InfoType::default();
    flatten_info_type(&mut info_type, obj, true);
    info_type
}

fn expand_regex(regex: &Regex<'_>) -> Json {
    let mut obj = JsonMap::new();
    put(&mut obj, "pattern", regex.pattern.expand());
    put(&mut obj, "groupIndexes", regex.group_indexes.expand());
    nested(obj)
}

fn flatten_regex<'a>(regex: &mut Regex<'a>, obj: &JsonMap, _fill: bool) {
    regex.pattern = flatten(obj, "pattern");
    regex.group_indexes = flatten(obj, "groupIndexes");
}

fn expand_limits(limits: &Limits<'_>) -> Json {
    let mut obj = JsonMap::new();
    put_set(&mut obj, "maxFindingsPerItem", limits.max_findings_per_item.expand());
    put_set(&mut obj, "maxFindingsPerRequest", limits.max_findings_per_request.expand());
    put(
        &mut obj,
        "maxFindingsPerInfoType",
        expand_blocks(&limits.max_findings_per_info_type, |limit| {
            let mut obj = JsonMap::new();
            if let Value::Value(info_type) = &limit.info_type {
                put(&mut obj, "infoType", expand_info_type(info_type));
            }
            put_set(&mut obj, "maxFindings", limit.max_findings.expand());
            Json::Object(obj)
        }),
    );
    Json::Object(obj)
}

fn flatten_limits<'a>(limits: &mut Limits<'a>, obj: &JsonMap, _fill: bool) {
    limits.max_findings_per_item = flatten_or_zero(&limits.max_findings_per_item, obj, "maxFindingsPerItem");
    limits.max_findings_per_request =
        flatten_or_zero(&limits.max_findings_per_request, obj, "maxFindingsPerRequest");
    limits.max_findings_per_info_type = flatten_blocks(obj, "maxFindingsPerInfoType", |limit| InfoTypeLimit {
        info_type: object(limit, "infoType").map_or(Value::Null, |obj| Value::Value(read_info_type(obj))),
        max_findings: flatten(limit, "maxFindings"),
    });
}

fn expand_rule(rule: &Rule<'_>) -> Json {
    let mut obj = JsonMap::new();
    if let Value::Value(hotword) = &rule.hotword_rule {
        let mut hotword_obj = JsonMap::new();
        if let Value::Value(regex) = &hotword.hotword_regex {
            put(&mut hotword_obj, "hotwordRegex", expand_regex(regex));
        }
        if let Value::Value(proximity) = &hotword.proximity {
            let mut proximity_obj = JsonMap::new();
            put(&mut proximity_obj, "windowBefore", proximity.window_before.expand());
            put(&mut proximity_obj, "windowAfter", proximity.window_after.expand());
            put_set(&mut hotword_obj, "proximity", Json::Object(proximity_obj));
        }
        if let Value::Value(adjustment) = &hotword.likelihood_adjustment {
            let mut adjustment_obj = JsonMap::new();
            put(&mut adjustment_obj, "fixedLikelihood", adjustment.fixed_likelihood.expand());
            put(&mut adjustment_obj, "relativeLikelihood", adjustment.relative_likelihood.expand());
            put(&mut hotword_obj, "likelihoodAdjustment", nested(adjustment_obj));
        }
        put(&mut obj, "hotwordRule", nested(hotword_obj));
    }
    if let Value::Value(exclusion) = &rule.exclusion_rule {
        let mut exclusion_obj = JsonMap::new();
        put(&mut exclusion_obj, "matchingType", exclusion.matching_type.expand());
        if let Value::Value(regex) = &exclusion.regex {
            put(&mut exclusion_obj, "regex", expand_regex(regex));
        }
        if let Value::Value(dictionary) = &exclusion.dictionary {
            if let Value::Value(word_list) = &dictionary.word_list {
                put(
                    &mut exclusion_obj,
                    "dictionary",
                    json!({"wordList": {"words": word_list.words.expand()}}),
                );
            }
        }
        put(&mut obj, "exclusionRule", nested(exclusion_obj));
    }
    Json::Object(obj)
}

fn read_rule<'a>(obj: &JsonMap) -> Rule<'a> {
    let mut rule = Rule::default();
    flatten_block(&mut rule.hotword_rule, object(obj, "hotwordRule"), true, |hotword, obj, fill| {
        flatten_block(&mut hotword.hotword_regex, object(obj, "hotwordRegex"), fill, flatten_regex);
        flatten_block(&mut hotword.proximity, object(obj, "proximity"), fill, |proximity, obj, _| {
            proximity.window_before = flatten(obj, "windowBefore");
            proximity.window_after = flatten(obj, "windowAfter");
        });
        flatten_block(
            &mut hotword.likelihood_adjustment,
            object(obj, "likelihoodAdjustment"),
            fill,
            |adjustment, obj, _| {
                adjustment.fixed_likelihood = flatten(obj, "fixedLikelihood");
                adjustment.relative_likelihood = flatten(obj, "relativeLikelihood");
            },
        );
    });
    flatten_block(&mut rule.exclusion_rule, object(obj, "exclusionRule"), true, |exclusion, obj, fill| {
        exclusion.matching_type = flatten(obj, "matchingType");
        flatten_block(&mut exclusion.regex, object(obj, "regex"), fill, flatten_regex);
        flatten_block(&mut exclusion.dictionary, object(obj, "dictionary"), fill, |dictionary, obj, fill| {
            flatten_block(&mut dictionary.word_list, object(obj, "wordList"), fill, |word_list, obj, _| {
                word_list.words = flatten(obj, "words");
            });
        });
    });
    rule
}

fn expand_inspect_config(config: &InspectConfig<'_>) -> Json {
    let mut obj = JsonMap::new();
    put(&mut obj, "excludeInfoTypes", config.exclude_info_types.expand());
    put(&mut obj, "includeQuote", config.include_quote.expand());
    put(&mut obj, "minLikelihood", config.min_likelihood.expand());
    put(&mut obj, "infoTypes", expand_blocks(&config.info_types, expand_info_type));
    if let Value::Value(limits) = &config.limits {
        put(&mut obj, "limits", expand_limits(limits));
    }
    put(
        &mut obj,
        "ruleSet",
        expand_blocks(&config.rule_set, |rule_set| {
            json!({
                "infoTypes": expand_blocks(&rule_set.info_types, expand_info_type),
                "rules": expand_blocks(&rule_set.rules, expand_rule),
            })
        }),
    );
    nested(obj)
}

fn flatten_inspect_config<'a>(config: &mut InspectConfig<'a>, obj: &JsonMap, fill: bool) {
    config.exclude_info_types = flatten_or_zero(&config.exclude_info_types, obj, "excludeInfoTypes");
    config.include_quote = flatten_or_zero(&config.include_quote, obj, "includeQuote");
    config.min_likelihood = flatten(obj, "minLikelihood");
    config.info_types = flatten_blocks(obj, "infoTypes", read_info_type);
    flatten_block(&mut config.limits, object(obj, "limits"), fill, flatten_limits);
    config.rule_set = flatten_blocks(obj, "ruleSet", |rule_set| RuleSet {
        info_types: flatten_blocks(rule_set, "infoTypes", read_info_type),
        rules: flatten_blocks(rule_set, "rules", read_rule),
    });
}

impl RestResource for InspectTemplate {
    type State<'a> = InspectTemplateState<'a>;

    const KIND: &'static str = "InspectTemplate";
    const SERVICE: Service = Service::DataLossPrevention;
    const TIMEOUTS: Timeouts = Timeouts::minutes(20, 20, 20);

    const CREATE_URL: &'static str = "{{DataLossPreventionBasePath}}{{parent}}/inspectTemplates";
    const SELF_URL: &'static str = "{{DataLossPreventionBasePath}}{{parent}}/inspectTemplates/{{name}}";
    const UPDATE_MASK: bool = false;
    const ID_FORMAT: &'static str = "{{parent}}/inspectTemplates/{{name}}";
    const IMPORT_FORMATS: &'static [&'static str] = &[
        "^(?P<parent>.+)/inspectTemplates/(?P<name>[^/]+)$",
        "^(?P<parent>.+)/(?P<name>[^/]+)$",
    ];

    fn schema() -> Block {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};

        let rules = block(
            "Rules applied to the findings of the info types, in order",
            Default::default(),
            map! {
                "hotword_rule" => NestedBlock::Optional(block(
                    "Adjust the likelihood of findings close to a hotword",
                    Default::default(),
                    map! {
                        "hotword_regex" => NestedBlock::Optional(regex_block("Regular expression matching the hotword")),
                        "proximity" => NestedBlock::Optional(block(
                            "Range around the finding where the hotword is looked for",
                            map! {
                                "window_before" => attribute(AttributeType::Number, "Characters before the finding", Optional),
                                "window_after" => attribute(AttributeType::Number, "Characters after the finding", Optional),
                            },
                            Default::default(),
                        )),
                        "likelihood_adjustment" => NestedBlock::Optional(block(
                            "Likelihood change of the findings",
                            map! {
                                "fixed_likelihood" => attribute(AttributeType::String, "Likelihood set on the findings", Optional),
                                "relative_likelihood" => attribute(AttributeType::Number, "Number of likelihood levels added to the findings", Optional),
                            },
                            Default::default(),
                        )),
                    },
                )),
                "exclusion_rule" => NestedBlock::Optional(block(
                    "Drop findings matching a regular expression or a dictionary",
                    map! {
                        "matching_type" => attribute(AttributeType::String, "`MATCHING_TYPE_FULL_MATCH`, `MATCHING_TYPE_PARTIAL_MATCH` or `MATCHING_TYPE_INVERSE_MATCH`", Required),
                    },
                    map! {
                        "regex" => NestedBlock::Optional(regex_block("Regular expression matching the findings to drop")),
                        "dictionary" => NestedBlock::Optional(block(
                            "Dictionary of the findings to drop",
                            Default::default(),
                            map! {
                                "word_list" => NestedBlock::Optional(block(
                                    "List of words or phrases",
                                    map! {
                                        "words" => attribute(AttributeType::List(AttributeType::String.into()), "Words or phrases, matched case-insensitively", Required),
                                    },
                                    Default::default(),
                                )),
                            },
                        )),
                    },
                )),
            },
        );

        let inspect_config = block(
            "Configuration of the inspection",
            map! {
                "exclude_info_types" => attribute(AttributeType::Bool, "Do not report the info types found by exclusion rules", Optional),
                "include_quote" => attribute(AttributeType::Bool, "Report the sensitive text of the findings", Optional),
                "min_likelihood" => attribute(AttributeType::String, "Smallest likelihood of the reported findings, `POSSIBLE` by default", Optional),
            },
            map! {
                "info_types" => NestedBlock::List(info_type_block("Info types to look for")),
                "limits" => NestedBlock::Optional(block(
                    "Limits of the number of findings",
                    map! {
                        "max_findings_per_item" => attribute(AttributeType::Number, "Findings reported per item, 0 for the server maximum", Required),
                        "max_findings_per_request" => attribute(AttributeType::Number, "Findings reported per request, 0 for the server maximum", Required),
                    },
                    map! {
                        "max_findings_per_info_type" => NestedBlock::List(block(
                            "Limits per info type",
                            map! {
                                "max_findings" => attribute(AttributeType::Number, "Findings reported for the info type", Required),
                            },
                            map! {
                                "info_type" => NestedBlock::Optional(info_type_block("Info type of the limit, required")),
                            },
                        )),
                    },
                )),
                "rule_set" => NestedBlock::List(block(
                    "Rules adjusting the findings of some info types",
                    Default::default(),
                    map! {
                        "info_types" => NestedBlock::List(info_type_block("Info types the rules apply to")),
                        "rules" => NestedBlock::List(rules),
                    },
                )),
            },
        );

        block(
            "Inspect template of Cloud Data Loss Prevention",
            map! {
                "parent" => attribute(AttributeType::String, "Parent of the template: `projects/{project}`, `projects/{project}/locations/{location}` or an organization", Required),
                "template_id" => attribute(AttributeType::String, "Id of the template, generated by the server when unset", OptionalComputed),
                "display_name" => attribute(AttributeType::String, "Display name of the template", Optional),
                "description" => attribute(AttributeType::String, "Description of the template", Optional),
                "name" => attribute(AttributeType::String, "Short name of the template", Computed),
            },
            map! {
                "inspect_config" => NestedBlock::Optional(inspect_config),
            },
        )
    }

    fn validate(diags: &mut Diagnostics, state: &Self::State<'_>) {
        let Value::Value(config) = &state.inspect_config else {
            return;
        };
        if let Value::Value(likelihood) = &config.min_likelihood {
            if !LIKELIHOODS.contains(&likelihood.as_ref()) {
                diags.error(
                    "Invalid min_likelihood",
                    format!("expected min_likelihood to be one of {LIKELIHOODS:?}, got {likelihood}"),
                    AttributePath::new("inspect_config").index(0).attribute("min_likelihood"),
                );
            }
        }
        let limits = config.limits.as_ref_option();
        for (i, limit) in limits
            .and_then(|limits| limits.max_findings_per_info_type.as_ref_option())
            .into_iter()
            .flatten()
            .enumerate()
        {
            if limit.as_ref_option().is_some_and(|limit| limit.info_type.is_null()) {
                diags.error_short(
                    "Missing info_type",
                    AttributePath::new("inspect_config")
                        .index(0)
                        .attribute("limits")
                        .index(0)
                        .attribute("max_findings_per_info_type")
                        .index(i as i64),
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
            .with_value("parent", &state.parent)
            .with_value("name", &state.name)
    }

    fn from_import<'a>(vars: &Vars) -> Self::State<'a> {
        InspectTemplateState {
            parent: vars.value("parent"),
            name: vars.value("name"),
            template_id: vars.value("name"),
            inspect_config: Value::Unknown,
            ..Default::default()
        }
    }

    fn expand(state: &Self::State<'_>, _config: &Config) -> Result<JsonMap> {
        let mut obj = JsonMap::new();
        put(&mut obj, "description", state.description.expand());
        put(&mut obj, "displayName", state.display_name.expand());
        if let Value::Value(config) = &state.inspect_config {
            put(&mut obj, "inspectConfig", expand_inspect_config(config));
        }
        Ok(obj)
    }

    fn encode_create(obj: JsonMap, state: &Self::State<'_>) -> Result<JsonMap> {
        let mut wrapped = JsonMap::new();
        wrapped.insert("inspectTemplate".to_owned(), Json::Object(obj));
        put(&mut wrapped, "templateId", state.template_id.expand());
        Ok(wrapped)
    }

    fn encode_update(obj: JsonMap, update_mask: &[&'static str]) -> Result<JsonMap> {
        let mut wrapped = JsonMap::new();
        wrapped.insert("inspectTemplate".to_owned(), Json::Object(obj));
        wrapped.insert("updateMask".to_owned(), Json::String(update_mask.join(",")));
        Ok(wrapped)
    }

    fn flatten<'a>(state: &mut Self::State<'a>, res: &JsonMap, _config: &Config) {
        Self::created(state, res);
        state.description = flatten(res, "description");
        state.display_name = flatten(res, "displayName");
        flatten_block(
            &mut state.inspect_config,
            object(res, "inspectConfig"),
            false,
            flatten_inspect_config,
        );
    }

    fn created<'a>(state: &mut Self::State<'a>, res: &JsonMap) {
        let name: ValueString<'a> = flatten(res, "name");
        state.name = name
            .as_deref_option()
            .map_or(Value::Null, |name| Value::from(get_resource_name_from_self_link(name).to_owned()));
        if !state.template_id.is_value() {
            state.template_id = state.name.clone();
        }
    }

    fn update_mask(prior: &Self::State<'_>, planned: &Self::State<'_>) -> Vec<&'static str> {
        let mut mask = Vec::new();
        mask_if_changed(&mut mask, "description", &prior.description, &planned.description);
        mask_if_changed(&mut mask, "displayName", &prior.display_name, &planned.display_name);
        mask_if_changed(&mut mask, "inspectConfig", &prior.inspect_config, &planned.inspect_config);
        mask
    }

    fn requires_replace(prior: &Self::State<'_>, proposed: &Self::State<'_>) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_if_changed(&mut paths, "parent", &prior.parent, &proposed.parent);
        if proposed.template_id.is_value() {
            replace_if_changed(&mut paths, "template_id", &prior.template_id, &proposed.template_id);
        }
        paths
    }

    fn plan<'a>(state: &mut Self::State<'a>, prior: Option<&Self::State<'a>>, _config: &Config) {
        if let Value::Value(config) = &mut state.inspect_config {
            if config.min_likelihood.is_null() {
                config.min_likelihood = Value::from(DEFAULT_MIN_LIKELIHOOD);
            }
        }
        match prior {
            None => {
                unknown_if_null(&mut state.template_id);
                state.name = Value::Unknown;
            }
            Some(prior) => {
                if state.template_id.is_null() {
                    state.template_id = prior.template_id.clone();
                }
            }
        }
    }
}
