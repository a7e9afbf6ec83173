//! IAM policies of GCP resources
//!
//! The `*_iam_binding`, `*_iam_member` and `*_iam_policy` resources are generic over
//! an [`IamParent`], which knows the attributes identifying the resource holding the
//! policy and builds the [`ResourceIamUpdater`] reading and writing it.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, Description, NestedBlock};
use tf_provider::value::{Value, ValueSet, ValueString};

use crate::config::{Config, ConfigHandle};
use crate::provider::{module_user_agent, ProviderMetaState};
use crate::rest::{attribute, RequestContext};

mod binding;
mod data_source;
mod member;
mod policy;
mod policy_resource;
mod updater;

pub use binding::{IamBindingResource, IamBindingState};
pub use data_source::{IamPolicyDataSource, IamPolicyDataSourceState};
pub use member::{IamMemberResource, IamMemberState};
pub use policy::{
    compare_iam_policies, create_iam_audit_configs_map, create_iam_bindings_map,
    filter_bindings_with_role_and_condition, list_from_iam_audit_config_map,
    list_from_iam_binding_map, merge_audit_configs, merge_bindings, missing_bindings,
    normalize_iam_member_casing, remove_all_audit_configs_with_service, subtract_from_bindings,
    AuditConfig, AuditLogConfig, Binding, Expr, Policy, IAM_POLICY_VERSION,
};
pub use policy_resource::{IamPolicyResource, IamPolicyState};
pub use updater::{iam_policy_read_modify_write, iam_policy_read_with_retry, ResourceIamUpdater};

/// Resource kind whose IAM policy is managed
pub trait IamParent: Debug + Clone + Default + PartialEq + Send + Sync + 'static {
    /// Name used in messages, such as `project`
    const KIND: &'static str;

    /// Attributes identifying the parent, merged into the IAM resource state
    type Fields<'a>: Serialize
        + Deserialize<'a>
        + Debug
        + Clone
        + Default
        + PartialEq
        + Send
        + Sync;

    /// Schema of [`Self::Fields`]
    fn attributes() -> HashMap<String, Attribute>;

    /// Fields from the parent part of an import id
    fn parse_import<'a>(id: &str, config: &Config) -> Result<Self::Fields<'a>>;

    /// Fill defaulted fields during plans
    fn plan<'a>(_fields: &mut Self::Fields<'a>, _config: &Config) {}

    /// Fields whose change moves the IAM resource to another parent
    fn requires_replace(prior: &Self::Fields<'_>, proposed: &Self::Fields<'_>) -> Vec<AttributePath>;

    fn updater<'c>(
        fields: &Self::Fields<'_>,
        ctx: RequestContext<'c>,
    ) -> Result<Box<dyn ResourceIamUpdater + 'c>>;
}

/// `condition` block of a binding or member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConditionState<'a> {
    #[serde(borrow = "'a")]
    pub title: ValueString<'a>,
    pub description: ValueString<'a>,
    pub expression: ValueString<'a>,
}

impl ConditionState<'_> {
    pub fn block() -> NestedBlock {
        NestedBlock::Optional(Block {
            attributes: map! {
                "title" => Attribute {
                    attr_type: AttributeType::String,
                    description: Description::plain("Title of the condition"),
                    constraint: AttributeConstraint::Required,
                    ..Default::default()
                },
                "description" => Attribute {
                    attr_type: AttributeType::String,
                    description: Description::plain("Description of the condition"),
                    constraint: AttributeConstraint::Optional,
                    ..Default::default()
                },
                "expression" => Attribute {
                    attr_type: AttributeType::String,
                    description: Description::plain("CEL expression of the condition"),
                    constraint: AttributeConstraint::Required,
                    ..Default::default()
                },
            },
            description: Description::plain("IAM condition restricting when the binding applies"),
            ..Default::default()
        })
    }
}

/// Condition of the API from a `condition` block, `None` when absent or empty
pub fn expand_condition(condition: &Value<ConditionState<'_>>) -> Option<Expr> {
    let condition = condition.as_ref_option()?;
    let field = |v: &ValueString<'_>| v.as_deref_option().unwrap_or_default().to_owned();
    let expr = Expr {
        title: field(&condition.title),
        description: field(&condition.description),
        expression: field(&condition.expression),
    };
    (!expr.is_empty()).then_some(expr)
}

pub fn flatten_condition<'a>(condition: Option<&Expr>) -> Value<ConditionState<'a>> {
    let field = |v: &str| {
        if v.is_empty() {
            Value::Null
        } else {
            Value::from(v.to_owned())
        }
    };
    match condition {
        Some(expr) => Value::Value(ConditionState {
            title: field(&expr.title),
            description: field(&expr.description),
            expression: field(&expr.expression),
        }),
        None => Value::Null,
    }
}

/// Whether a binding of the policy matches the configured condition
///
/// An imported condition only knows its title, which is then enough to match.
fn condition_matches(state: &Value<ConditionState<'_>>, binding: Option<&Expr>) -> bool {
    let binding = binding.cloned().unwrap_or_default();
    match state.as_ref_option() {
        Some(condition) if condition.expression.is_null() => {
            condition.title.as_deref_option().unwrap_or_default() == binding.title
        }
        _ => expand_condition(state).unwrap_or_default() == binding,
    }
}

/// Members of a set attribute
fn expand_members(members: &ValueSet<ValueString<'_>>) -> Vec<String> {
    members
        .iter()
        .flatten()
        .filter_map(|m| m.as_deref_option().map(str::to_owned))
        .collect()
}

/// Members returned by the API, keeping the configured spelling when it only differs by case
fn flatten_members<'a>(
    state: &ValueSet<ValueString<'a>>,
    api: &[String],
) -> ValueSet<ValueString<'a>> {
    let normalized = |members: &[String]| -> BTreeSet<String> {
        members
            .iter()
            .map(|m| normalize_iam_member_casing(m))
            .collect()
    };
    if state.is_value() && normalized(&expand_members(state)) == normalized(api) {
        return state.clone();
    }
    Value::Value(api.iter().map(|m| Value::from(m.clone())).collect())
}

/// Deleted principals cannot be granted roles
fn validate_member(diags: &mut Diagnostics, member: &str, path: AttributePath) {
    if member.starts_with("deleted:") {
        diags.error(
            "Invalid IAM member",
            format!("{member}: Terraform does not support IAM members for deleted principals"),
            path,
        );
    }
}

/// Configuration and user agent of one Terraform call
struct Session {
    config: Arc<Config>,
    user_agent: String,
}

impl Session {
    fn open(
        handle: &ConfigHandle,
        diags: &mut Diagnostics,
        provider_meta_state: &ProviderMetaState<'_>,
    ) -> Option<Self> {
        let config = handle.require(diags)?;
        let user_agent = module_user_agent(&config, provider_meta_state);
        Some(Self { config, user_agent })
    }

    fn ctx(&self) -> RequestContext<'_> {
        RequestContext {
            config: &self.config,
            user_agent: &self.user_agent,
        }
    }
}

fn etag_attribute() -> Attribute {
    attribute(
        AttributeType::String,
        "Etag of the IAM policy",
        AttributeConstraint::Computed,
    )
}

fn id_attribute() -> Attribute {
    attribute(
        AttributeType::String,
        "Identifier of the resource",
        AttributeConstraint::Computed,
    )
}
