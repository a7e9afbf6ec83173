use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tf_provider::{map, value, AttributePath, DataSource, Diagnostics};
use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description, NestedBlock, Schema};
use tf_provider::value::{Value, ValueList, ValueSet, ValueString};

use super::{
    attribute, expand_condition, expand_members, merge_audit_configs, merge_bindings,
    validate_member, AuditConfig, AuditLogConfig, Binding, ConditionState, Policy,
};
use crate::provider::ProviderMetaState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BindingBlock<'a> {
    #[serde(borrow = "'a")]
    pub role: ValueString<'a>,
    pub members: ValueSet<ValueString<'a>>,
    #[serde(with = "value::serde_as_vec")]
    pub condition: Value<ConditionState<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuditLogConfigBlock<'a> {
    #[serde(borrow = "'a")]
    pub log_type: ValueString<'a>,
    pub exempted_members: ValueSet<ValueString<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AuditConfigBlock<'a> {
    #[serde(borrow = "'a")]
    pub service: ValueString<'a>,
    pub audit_log_configs: ValueList<Value<AuditLogConfigBlock<'a>>>,
}

/// Policy document built from `binding` and `audit_config` blocks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IamPolicyDataSourceState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub binding: ValueList<Value<BindingBlock<'a>>>,
    pub audit_config: ValueList<Value<AuditConfigBlock<'a>>>,
    pub policy_data: ValueString<'a>,
}

/// `google_iam_policy` data source
#[derive(Debug, Default)]
pub struct IamPolicyDataSource;

fn text(value: &ValueString<'_>) -> String {
    value.as_deref_option().unwrap_or_default().to_owned()
}

impl IamPolicyDataSourceState<'_> {
    /// Policy described by the blocks, bindings and audit configs merged
    pub fn policy(&self) -> Policy {
        let bindings: Vec<Binding> = self
            .binding
            .iter()
            .flatten()
            .filter_map(Value::as_ref_option)
            .map(|binding| Binding {
                role: text(&binding.role),
                members: expand_members(&binding.members),
                condition: expand_condition(&binding.condition),
            })
            .collect();
        let audit_configs: Vec<AuditConfig> = self
            .audit_config
            .iter()
            .flatten()
            .filter_map(Value::as_ref_option)
            .map(|audit| AuditConfig {
                service: text(&audit.service),
                audit_log_configs: audit
                    .audit_log_configs
                    .iter()
                    .flatten()
                    .filter_map(Value::as_ref_option)
                    .map(|log| AuditLogConfig {
                        log_type: text(&log.log_type),
                        exempted_members: expand_members(&log.exempted_members),
                    })
                    .collect(),
            })
            .collect();
        Policy {
            bindings: merge_bindings(&bindings),
            audit_configs: merge_audit_configs(&audit_configs),
            ..Default::default()
        }
    }
}

/// Identifier of a policy document, stable for a given document
fn policy_id(policy_data: &str) -> String {
    format!("{:x}", Sha256::digest(policy_data.as_bytes()))
}

fn policy_data(policy: &Policy) -> Result<String> {
    serde_json::to_string(policy).context("cannot serialize IAM policy")
}

#[async_trait]
impl DataSource for IamPolicyDataSource {
    type State<'a> = IamPolicyDataSourceState<'a>;
    type ProviderMetaState<'a> = ProviderMetaState<'a>;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        let condition = ConditionState::block();
        Some(Schema {
            version: 1,
            block: Block {
                attributes: map! {
                    "id" => attribute(
                        AttributeType::String,
                        "Hash of the policy document",
                        AttributeConstraint::Computed,
                    ),
                    "policy_data" => attribute(
                        AttributeType::String,
                        "Policy document as JSON, for the `*_iam_policy` resources",
                        AttributeConstraint::Computed,
                    ),
                },
                blocks: map! {
                    "binding" => NestedBlock::Set(Block {
                        attributes: map! {
                            "role" => attribute(
                                AttributeType::String,
                                "Role granted to the members, such as `roles/viewer`",
                                AttributeConstraint::Required,
                            ),
                            "members" => attribute(
                                AttributeType::Set(AttributeType::String.into()),
                                "Principals granted the role",
                                AttributeConstraint::Required,
                            ),
                        },
                        blocks: map! {
                            "condition" => condition,
                        },
                        description: Description::plain("Role granted to a set of members"),
                        ..Default::default()
                    }),
                    "audit_config" => NestedBlock::Set(Block {
                        attributes: map! {
                            "service" => attribute(
                                AttributeType::String,
                                "Service whose access is logged, or `allServices`",
                                AttributeConstraint::Required,
                            ),
                        },
                        blocks: map! {
                            "audit_log_configs" => NestedBlock::Set(Block {
                                attributes: map! {
                                    "log_type" => attribute(
                                        AttributeType::String,
                                        "`DATA_READ`, `DATA_WRITE` or `ADMIN_READ`",
                                        AttributeConstraint::Required,
                                    ),
                                    "exempted_members" => attribute(
                                        AttributeType::Set(AttributeType::String.into()),
                                        "Principals whose access is not logged",
                                        AttributeConstraint::Optional,
                                    ),
                                },
                                description: Description::plain("Logging of one type of access"),
                                ..Default::default()
                            }),
                        },
                        description: Description::plain("Audit logging of a service"),
                        ..Default::default()
                    }),
                },
                description: Description::plain(
                    "Build an IAM policy document for the authoritative `*_iam_policy` resources",
                ),
                ..Default::default()
            },
        })
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        for (i, binding) in config
            .binding
            .iter()
            .flatten()
            .filter_map(Value::as_ref_option)
            .enumerate()
        {
            for member in binding.members.iter().flatten() {
                if let Some(member) = member.as_deref_option() {
                    validate_member(
                        diags,
                        member,
                        AttributePath::new("binding").index(i as i64).attribute("members"),
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

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let mut state = config;
        match policy_data(&state.policy()) {
            Ok(data) => {
                state.id = Value::from(policy_id(&data));
                state.policy_data = Value::from(data);
                Some(state)
            }
            Err(err) => {
                diags.root_error_short(format!("{err:#}"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding<'a>(role: &'a str, members: &[&'a str]) -> Value<BindingBlock<'a>> {
        Value::Value(BindingBlock {
            role: Value::from(role),
            members: Value::Value(members.iter().map(|m| Value::from(*m)).collect()),
            condition: Value::Null,
        })
    }

    #[tokio::test]
    async fn policy_document() {
        let config = IamPolicyDataSourceState {
            binding: Value::Value(vec![
                binding("roles/viewer", &["user:b@example.com"]),
                binding("roles/editor", &["user:a@example.com"]),
                binding("roles/viewer", &["user:a@example.com"]),
            ]),
            audit_config: Value::Value(vec![Value::Value(AuditConfigBlock {
                service: Value::from("allServices"),
                audit_log_configs: Value::Value(vec![Value::Value(AuditLogConfigBlock {
                    log_type: Value::from("DATA_READ"),
                    exempted_members: Value::Null,
                })]),
            })]),
            ..Default::default()
        };
        let mut diags = Diagnostics::default();
        let state = IamPolicyDataSource
            .read(&mut diags, config, Value::Null)
            .await
            .unwrap();
        assert_eq!(
            state.policy_data.as_str(),
            concat!(
                r#"{"bindings":["#,
                r#"{"role":"roles/editor","members":["user:a@example.com"]},"#,
                r#"{"role":"roles/viewer","members":["user:a@example.com","user:b@example.com"]}],"#,
                r#""auditConfigs":[{"service":"allServices","auditLogConfigs":[{"logType":"DATA_READ","exemptedMembers":[]}]}]}"#,
            )
        );
        assert_eq!(state.id.as_str(), policy_id(state.policy_data.as_str()));
        assert_eq!(state.id.as_str().len(), 64);
    }

    #[tokio::test]
    async fn deleted_members_are_rejected() {
        let config = IamPolicyDataSourceState {
            binding: Value::Value(vec![binding(
                "roles/viewer",
                &["deleted:user:a@example.com?uid=1"],
            )]),
            ..Default::default()
        };
        let mut diags = Diagnostics::default();
        assert!(IamPolicyDataSource
            .validate(&mut diags, config)
            .await
            .is_none());
        assert_eq!(diags.errors.len(), 1);
    }
}
