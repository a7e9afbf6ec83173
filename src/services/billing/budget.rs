use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use tf_provider::value::{self, ValueBool};
use tf_provider::{map, AttributePath, Diagnostics};
use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description, NestedBlock};
use tf_provider::value::{Value, ValueList, ValueMap, ValueNumber, ValueSet, ValueString};

use crate::config::{Config, Service};
use crate::rest::{
    attribute, mask_if_changed, replace_if_changed, unknown_if_null, RestResource, Timeouts, TimeoutsState,
};
use crate::tpgresource::{
    flatten, flatten_block, flatten_or_zero, get_resource_name_from_self_link, nested, object,
    objects, put, put_set, Expand, Vars,
};
use crate::transport::JsonMap;

const DEFAULT_CREDIT_TYPES_TREATMENT: &str = "INCLUDE_ALL_CREDITS";
const DEFAULT_SPEND_BASIS: &str = "CURRENT_SPEND";
const DEFAULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BudgetState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub name: ValueString<'a>,
    pub billing_account: ValueString<'a>,
    pub display_name: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub budget_filter: Value<BudgetFilter<'a>>,
    #[serde(with = "value::serde_as_vec")]
    pub amount: Value<BudgetAmount<'a>>,
    pub threshold_rules: ValueList<Value<ThresholdRule<'a>>>,
    #[serde(with = "value::serde_as_vec")]
    pub all_updates_rule: Value<AllUpdatesRule<'a>>,
    pub ownership_scope: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub timeouts: Value<TimeoutsState<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BudgetFilter<'a> {
    #[serde(borrow = "'a")]
    pub projects: ValueSet<ValueString<'a>>,
    pub credit_types_treatment: ValueString<'a>,
    pub services: ValueList<ValueString<'a>>,
    pub subaccounts: ValueList<ValueString<'a>>,
    pub labels: ValueMap<'a, ValueString<'a>>,
    pub calendar_period: ValueString<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BudgetAmount<'a> {
    #[serde(borrow = "'a")]
    #[serde(with = "value::serde_as_vec")]
    pub specified_amount: Value<Money<'a>>,
    pub last_period_amount: ValueBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Money<'a> {
    #[serde(borrow = "'a")]
    pub currency_code: ValueString<'a>,
    pub units: ValueString<'a>,
    pub nanos: ValueNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ThresholdRule<'a> {
    pub threshold_percent: Value<f64>,
    #[serde(borrow = "'a")]
    pub spend_basis: ValueString<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AllUpdatesRule<'a> {
    #[serde(borrow = "'a")]
    pub pubsub_topic: ValueString<'a>,
    pub schema_version: ValueString<'a>,
    pub monitoring_notification_channels: ValueList<ValueString<'a>>,
    pub disable_default_iam_recipients: ValueBool,
}

/// `google_billing_budget`
#[derive(Debug)]
pub struct Budget;

fn strings() -> AttributeType {
    AttributeType::List(AttributeType::String.into())
}

fn expand_budget_filter(filter: &BudgetFilter<'_>) -> Json {
    let mut obj = JsonMap::new();
    put(&mut obj, "projects", filter.projects.expand());
    put(&mut obj, "creditTypesTreatment", filter.credit_types_treatment.expand());
    put(&mut obj, "services", filter.services.expand());
    put(&mut obj, "subaccounts", filter.subaccounts.expand());
    put(&mut obj, "calendarPeriod", filter.calendar_period.expand());
    // Label values are lists holding a single value
    let labels: JsonMap = filter
        .labels
        .iter()
        .flatten()
        .filter_map(|(k, v)| Some((k.to_string(), json!([v.as_deref_option()?]))))
        .collect();
    put(&mut obj, "labels", Json::Object(labels));
    nested(obj)
}

fn flatten_budget_filter<'a>(filter: &mut BudgetFilter<'a>, obj: &JsonMap, _fill: bool) {
    filter.projects = flatten(obj, "projects");
    filter.credit_types_treatment = flatten(obj, "creditTypesTreatment");
    filter.services = flatten(obj, "services");
    filter.subaccounts = flatten(obj, "subaccounts");
    filter.calendar_period = flatten(obj, "calendarPeriod");
    let labels: BTreeMap<_, _> = object(obj, "labels")
        .into_iter()
        .flatten()
        .filter_map(|(k, v)| {
            let first = v.as_array()?.first()?.as_str()?;
            Some((k.clone().into(), Value::from(first.to_owned())))
        })
        .collect();
    filter.labels = if labels.is_empty() {
        Value::Null
    } else {
        Value::Value(labels)
    };
}

fn expand_amount(amount: &BudgetAmount<'_>) -> Json {
    let mut obj = JsonMap::new();
    if let Value::Value(money) = &amount.specified_amount {
        let mut specified = JsonMap::new();
        put(&mut specified, "currencyCode", money.currency_code.expand());
        put(&mut specified, "units", money.units.expand());
        put(&mut specified, "nanos", money.nanos.expand());
        put_set(&mut obj, "specifiedAmount", Json::Object(specified));
    }
    if amount.last_period_amount == Value::Value(true) {
        put_set(&mut obj, "lastPeriodAmount", json!({}));
    }
    nested(obj)
}

fn flatten_amount<'a>(amount: &mut BudgetAmount<'a>, obj: &JsonMap, fill: bool) {
    flatten_block(
        &mut amount.specified_amount,
        object(obj, "specifiedAmount"),
        fill,
        |money, obj, _| {
            money.currency_code = flatten(obj, "currencyCode");
            money.units = flatten(obj, "units");
            money.nanos = flatten_or_zero(&money.nanos, obj, "nanos");
        },
    );
    let last_period = obj.contains_key("lastPeriodAmount");
    amount.last_period_amount = match &amount.last_period_amount {
        Value::Null if !last_period => Value::Null,
        _ => Value::Value(last_period),
    };
}

fn expand_threshold_rules(rules: &ValueList<Value<ThresholdRule<'_>>>) -> Json {
    Json::Array(
        rules
            .iter()
            .flatten()
            .filter_map(Value::as_ref_option)
            .map(|rule| {
                let mut obj = JsonMap::new();
                put(&mut obj, "thresholdPercent", rule.threshold_percent.expand());
                put(&mut obj, "spendBasis", rule.spend_basis.expand());
                Json::Object(obj)
            })
            .collect(),
    )
}

fn expand_all_updates_rule(rule: &AllUpdatesRule<'_>) -> Json {
    let mut obj = JsonMap::new();
    put(&mut obj, "pubsubTopic", rule.pubsub_topic.expand());
    put(&mut obj, "schemaVersion", rule.schema_version.expand());
    put(
        &mut obj,
        "monitoringNotificationChannels",
        rule.monitoring_notification_channels.expand(),
    );
    put(
        &mut obj,
        "disableDefaultIamRecipients",
        rule.disable_default_iam_recipients.expand(),
    );
    nested(obj)
}

fn flatten_all_updates_rule<'a>(rule: &mut AllUpdatesRule<'a>, obj: &JsonMap, _fill: bool) {
    rule.pubsub_topic = flatten(obj, "pubsubTopic");
    rule.schema_version = flatten(obj, "schemaVersion");
    rule.monitoring_notification_channels = flatten(obj, "monitoringNotificationChannels");
    rule.disable_default_iam_recipients = flatten_or_zero(
        &rule.disable_default_iam_recipients,
        obj,
        "disableDefaultIamRecipients",
    );
}

impl RestResource for Budget {
    type State<'a> = BudgetState<'a>;

    const KIND: &'static str = "Budget";
    const SERVICE: Service = Service::Billing;
    const TIMEOUTS: Timeouts = Timeouts::minutes(20, 20, 20);

    const CREATE_URL: &'static str = "{{BillingBasePath}}billingAccounts/{{billing_account}}/budgets";
    const SELF_URL: &'static str =
        "{{BillingBasePath}}billingAccounts/{{billing_account}}/budgets/{{name}}";
    const ID_FORMAT: &'static str = "billingAccounts/{{billing_account}}/budgets/{{name}}";
    const IMPORT_FORMATS: &'static [&'static str] = &[
        "^billingAccounts/(?P<billing_account>[^/]+)/budgets/(?P<name>[^/]+)$",
        "^(?P<billing_account>[^/]+)/(?P<name>[^/]+)$",
    ];

    fn schema() -> Block {
        use AttributeConstraint::{Computed, Optional, OptionalComputed, Required};

        Block {
            attributes: map! {
                "name" => attribute(AttributeType::String, "Resource name of the budget, `billingAccounts/{billingAccountId}/budgets/{budgetId}`", Computed),
                "billing_account" => attribute(AttributeType::String, "Id of the billing account to set a budget on", Required),
                "display_name" => attribute(AttributeType::String, "User data for display name in UI", Optional),
                "ownership_scope" => attribute(AttributeType::String, "`ALL_USERS` or `BILLING_ACCOUNT`", OptionalComputed),
            },
            blocks: map! {
                "budget_filter" => NestedBlock::Optional(Block {
                    attributes: map! {
                        "projects" => attribute(AttributeType::Set(AttributeType::String.into()), "Projects of the form `projects/{project_number}`", Optional),
                        "credit_types_treatment" => attribute(AttributeType::String, "How credits are applied, `INCLUDE_ALL_CREDITS` by default", Optional),
                        "services" => attribute(strings(), "Services of the form `services/{service_id}`", OptionalComputed),
                        "subaccounts" => attribute(strings(), "Subaccounts of the form `billingAccounts/{account_id}`", OptionalComputed),
                        "labels" => attribute(AttributeType::Map(AttributeType::String.into()), "Single label and value pair restricting the budget", OptionalComputed),
                        "calendar_period" => attribute(AttributeType::String, "`MONTH`, `QUARTER` or `YEAR`", OptionalComputed),
                    },
                    description: Description::plain("Filters restricting the usage tracked by the budget"),
                    ..Default::default()
                }),
                "amount" => NestedBlock::Optional(Block {
                    attributes: map! {
                        "last_period_amount" => attribute(AttributeType::Bool, "Use the amount of the last period as the budget", Optional),
                    },
                    blocks: map! {
                        "specified_amount" => NestedBlock::Optional(Block {
                            attributes: map! {
                                "currency_code" => attribute(AttributeType::String, "ISO 4217 code, the billing account currency by default", OptionalComputed),
                                "units" => attribute(AttributeType::String, "Whole units of the amount", OptionalComputed),
                                "nanos" => attribute(AttributeType::Number, "Nano units of the amount", Optional),
                            },
                            description: Description::plain("Fixed amount of the budget"),
                            ..Default::default()
                        }),
                    },
                    description: Description::plain("Budgeted amount, required"),
                    ..Default::default()
                }),
                "threshold_rules" => NestedBlock::List(Block {
                    attributes: map! {
                        "threshold_percent" => attribute(AttributeType::Number, "Percentage of the budget triggering a notification, 1.0 is 100%", Required),
                        "spend_basis" => attribute(AttributeType::String, "`CURRENT_SPEND` or `FORECASTED_SPEND`", Optional),
                    },
                    description: Description::plain("Rules triggering notifications"),
                    ..Default::default()
                }),
                "all_updates_rule" => NestedBlock::Optional(Block {
                    attributes: map! {
                        "pubsub_topic" => attribute(AttributeType::String, "Topic receiving the budget updates", Optional),
                        "schema_version" => attribute(AttributeType::String, "Schema of the notifications, `1.0`", Optional),
                        "monitoring_notification_channels" => attribute(strings(), "Notification channels, at most 5", Optional),
                        "disable_default_iam_recipients" => attribute(AttributeType::Bool, "Do not email the billing account administrators", Optional),
                    },
                    description: Description::plain("Notifications sent on every budget update"),
                    ..Default::default()
                }),
            },
            description: Description::plain("Budget of a billing account"),
            ..Default::default()
        }
    }

    fn validate(diags: &mut Diagnostics, state: &Self::State<'_>) {
        match &state.amount {
            Value::Null => diags.error_short(
                "Missing amount",
                AttributePath::new("amount"),
            ),
            Value::Value(amount)
                if amount.specified_amount.is_value()
                    && amount.last_period_amount == Value::Value(true) =>
            {
                diags.error(
                    "Conflicting amounts",
                    "Only one of specified_amount and last_period_amount can be set",
                    AttributePath::new("amount").index(0),
                )
            }
            _ => {}
        }
        let channels = state
            .all_updates_rule
            .as_ref_option()
            .and_then(|rule| rule.monitoring_notification_channels.as_ref_option())
            .map_or(0, Vec::len);
        if channels > 5 {
            diags.error(
                "Too many notification channels",
                "At most 5 monitoring notification channels can be set",
                AttributePath::new("all_updates_rule")
                    .index(0)
                    .attribute("monitoring_notification_channels"),
            );
        }
    }

    fn id<'s, 'a>(state: &'s mut Self::State<'a>) -> &'s mut ValueString<'a> {
        &mut state.id
    }

    fn timeouts<'s, 'a>(state: &'s Self::State<'a>) -> &'s Value<TimeoutsState<'a>> {
        &state.timeouts
    }

    fn vars(state: &Self::State<'_>) -> Vars {
        let name = state
            .name
            .as_deref_option()
            .map(get_resource_name_from_self_link)
            .unwrap_or_default();
        Vars::new()
            .with_value("billing_account", &state.billing_account)
            .with("name", name)
    }

    fn from_import<'a>(vars: &Vars) -> Self::State<'a> {
        BudgetState {
            billing_account: vars.value("billing_account"),
            name: vars.value("name"),
            budget_filter: Value::Unknown,
            amount: Value::Unknown,
            all_updates_rule: Value::Unknown,
            ..Default::default()
        }
    }

    fn expand(state: &Self::State<'_>, _config: &Config) -> Result<JsonMap> {
        let mut obj = JsonMap::new();
        put(&mut obj, "displayName", state.display_name.expand());
        if let Value::Value(filter) = &state.budget_filter {
            put(&mut obj, "budgetFilter", expand_budget_filter(filter));
        }
        if let Value::Value(amount) = &state.amount {
            put(&mut obj, "amount", expand_amount(amount));
        }
        put(&mut obj, "thresholdRules", expand_threshold_rules(&state.threshold_rules));
        if let Value::Value(rule) = &state.all_updates_rule {
            put(&mut obj, "notificationsRule", expand_all_updates_rule(rule));
        }
        put(&mut obj, "ownershipScope", state.ownership_scope.expand());
        Ok(obj)
    }

    fn flatten<'a>(state: &mut Self::State<'a>, res: &JsonMap, _config: &Config) {
        state.name = flatten(res, "name");
        state.display_name = flatten(res, "displayName");
        state.ownership_scope = flatten(res, "ownershipScope");
        flatten_block(
            &mut state.budget_filter,
            object(res, "budgetFilter"),
            false,
            flatten_budget_filter,
        );
        flatten_block(&mut state.amount, object(res, "amount"), false, flatten_amount);
        state.threshold_rules = Value::Value(
            objects(res, "thresholdRules")
                .map(|rule| {
                    Value::Value(ThresholdRule {
                        threshold_percent: flatten(rule, "thresholdPercent"),
                        spend_basis: flatten(rule, "spendBasis"),
                    })
                })
                .collect(),
        );
        flatten_block(
            &mut state.all_updates_rule,
            object(res, "notificationsRule"),
            false,
            flatten_all_updates_rule,
        );
    }

    fn created<'a>(state: &mut Self::State<'a>, res: &JsonMap) {
        state.name = flatten(res, "name");
    }

    fn update_mask(prior: &Self::State<'_>, planned: &Self::State<'_>) -> Vec<&'static str> {
        let mut mask = Vec::new();
        mask_if_changed(&mut mask, "displayName", &prior.display_name, &planned.display_name);

        let default_filter = BudgetFilter::default();
        let old = prior.budget_filter.as_ref_option().unwrap_or(&default_filter);
        let new = planned.budget_filter.as_ref_option().unwrap_or(&default_filter);
        mask_if_changed(&mut mask, "budgetFilter.projects", &old.projects, &new.projects);
        mask_if_changed(&mut mask, "budgetFilter.labels", &old.labels, &new.labels);
        mask_if_changed(&mut mask, "budgetFilter.services", &old.services, &new.services);
        mask_if_changed(&mut mask, "budgetFilter.subaccounts", &old.subaccounts, &new.subaccounts);
        mask_if_changed(
            &mut mask,
            "budgetFilter.creditTypesTreatment",
            &old.credit_types_treatment,
            &new.credit_types_treatment,
        );
        mask_if_changed(
            &mut mask,
            "budgetFilter.calendarPeriod",
            &old.calendar_period,
            &new.calendar_period,
        );

        let default_amount = BudgetAmount::default();
        let old = prior.amount.as_ref_option().unwrap_or(&default_amount);
        let new = planned.amount.as_ref_option().unwrap_or(&default_amount);
        mask_if_changed(
            &mut mask,
            "amount.specifiedAmount",
            &old.specified_amount,
            &new.specified_amount,
        );
        mask_if_changed(
            &mut mask,
            "amount.lastPeriodAmount",
            &old.last_period_amount,
            &new.last_period_amount,
        );

        mask_if_changed(&mut mask, "thresholdRules", &prior.threshold_rules, &planned.threshold_rules);

        let default_rule = AllUpdatesRule::default();
        let old = prior.all_updates_rule.as_ref_option().unwrap_or(&default_rule);
        let new = planned.all_updates_rule.as_ref_option().unwrap_or(&default_rule);
        mask_if_changed(&mut mask, "notificationsRule.pubsubTopic", &old.pubsub_topic, &new.pubsub_topic);
        mask_if_changed(
            &mut mask,
            "notificationsRule.schemaVersion",
            &old.schema_version,
            &new.schema_version,
        );
        mask_if_changed(
            &mut mask,
            "notificationsRule.monitoringNotificationChannels",
            &old.monitoring_notification_channels,
            &new.monitoring_notification_channels,
        );
        mask_if_changed(
            &mut mask,
            "notificationsRule.disableDefaultIamRecipients",
            &old.disable_default_iam_recipients,
            &new.disable_default_iam_recipients,
        );

        mask_if_changed(&mut mask, "ownershipScope", &prior.ownership_scope, &planned.ownership_scope);
        mask
    }

    fn requires_replace(prior: &Self::State<'_>, proposed: &Self::State<'_>) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_if_changed(&mut paths, "billing_account", &prior.billing_account, &proposed.billing_account);
        paths
    }

    fn plan<'a>(state: &mut Self::State<'a>, prior: Option<&Self::State<'a>>, _config: &Config) {
        if let Value::Value(filter) = &mut state.budget_filter {
            if filter.credit_types_treatment.is_null() {
                filter.credit_types_treatment = Value::from(DEFAULT_CREDIT_TYPES_TREATMENT);
            }
            if prior.is_none() {
                unknown_if_null(&mut filter.services);
                unknown_if_null(&mut filter.subaccounts);
                unknown_if_null(&mut filter.labels);
                unknown_if_null(&mut filter.calendar_period);
            }
        }
        if let Value::Value(amount) = &mut state.amount {
            if let Value::Value(money) = &mut amount.specified_amount {
                if prior.is_none() {
                    unknown_if_null(&mut money.currency_code);
                    unknown_if_null(&mut money.units);
                }
            }
        }
        for rule in state.threshold_rules.iter_mut().flatten() {
            if let Value::Value(rule) = rule {
                if rule.spend_basis.is_null() {
                    rule.spend_basis = Value::from(DEFAULT_SPEND_BASIS);
                }
            }
        }
        if let Value::Value(rule) = &mut state.all_updates_rule {
            if rule.schema_version.is_null() {
                rule.schema_version = Value::from(DEFAULT_SCHEMA_VERSION);
            }
        }
        match prior {
            None => {
                unknown_if_null(&mut state.name);
                unknown_if_null(&mut state.ownership_scope);
            }
            Some(prior) => {
                if state.name.is_null() {
                    state.name = prior.name.clone();
                }
            }
        }
    }
}
