use std::marker::PhantomData;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, value, AttributePath, Diagnostics, Resource};
use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::value::{Value, ValueEmpty, ValueString};
use tracing::debug;

use super::{
    attribute, condition_matches, etag_attribute, expand_condition, flatten_condition,
    id_attribute, iam_policy_read_modify_write, iam_policy_read_with_retry, merge_bindings,
    normalize_iam_member_casing, subtract_from_bindings, validate_member, Binding, ConditionState,
    IamParent, Session, IAM_POLICY_VERSION,
};
use crate::config::ConfigHandle;
use crate::provider::ProviderMetaState;
use crate::rest::{replace_if_changed, RequestContext};
use crate::tpgresource::keep_if_equivalent;
use crate::transport::handle_not_found;

/// Non-authoritative grant of one role to one member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IamMemberState<'a, P>
where
    P: IamParent,
{
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    #[serde(flatten)]
    pub parent: P::Fields<'a>,
    pub role: ValueString<'a>,
    pub member: ValueString<'a>,
    #[serde(with = "value::serde_as_vec")]
    pub condition: Value<ConditionState<'a>>,
    pub etag: ValueString<'a>,
}

impl<P: IamParent> IamMemberState<'_, P> {
    fn binding(&self) -> Binding {
        Binding {
            role: self.role.as_deref_option().unwrap_or_default().to_owned(),
            members: self.member.as_deref_option().map(str::to_owned).into_iter().collect(),
            condition: expand_condition(&self.condition),
        }
    }
}

/// `<parent>_iam_member` resource
pub struct IamMemberResource<P> {
    config: ConfigHandle,
    ph: PhantomData<fn() -> P>,
}

impl<P> IamMemberResource<P> {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            ph: PhantomData,
        }
    }
}

/// `<resource id>/<role>/<member>[/<condition title>]`
fn member_id(resource_id: &str, binding: &Binding, member: &str) -> String {
    match &binding.condition {
        Some(condition) => format!(
            "{resource_id}/{}/{member}/{}",
            binding.role, condition.title
        ),
        None => format!("{resource_id}/{}/{member}", binding.role),
    }
}

fn members_equivalent(a: &str, b: &str) -> bool {
    normalize_iam_member_casing(a) == normalize_iam_member_casing(b)
}

impl<P: IamParent> IamMemberResource<P> {
    async fn write<'a>(ctx: RequestContext<'_>, state: &mut IamMemberState<'a, P>) -> Result<()> {
        let updater = P::updater(&state.parent, ctx)?;
        let binding = state.binding();
        debug!(role = %binding.role, "Adding member to {}", updater.describe_resource());
        iam_policy_read_modify_write(updater.as_ref(), |policy| {
            let mut bindings = policy.bindings.clone();
            bindings.push(binding.clone());
            policy.bindings = merge_bindings(&bindings);
            policy.version = IAM_POLICY_VERSION;
            Ok(())
        })
        .await?;
        let member = state.member.as_deref_option().unwrap_or_default();
        state.id = Value::from(member_id(&updater.get_resource_id(), &binding, member));
        Ok(())
    }

    async fn read_remote<'a>(
        ctx: RequestContext<'_>,
        state: &mut IamMemberState<'a, P>,
    ) -> Result<bool> {
        let updater = P::updater(&state.parent, ctx)?;
        let desc = updater.describe_resource();
        let Some(policy) = handle_not_found(iam_policy_read_with_retry(updater.as_ref()).await, &desc)?
        else {
            return Ok(false);
        };

        let role = state.role.as_deref_option().unwrap_or_default();
        let wanted = normalize_iam_member_casing(state.member.as_deref_option().unwrap_or_default());
        let binding = merge_bindings(&policy.bindings)
            .into_iter()
            .find(|b| b.role == role && condition_matches(&state.condition, b.condition.as_ref()));
        let found = binding.as_ref().and_then(|binding| {
            binding
                .members
                .iter()
                .find(|m| normalize_iam_member_casing(m) == wanted)
        });
        let (Some(binding), Some(member)) = (&binding, found) else {
            debug!(role, member = %wanted, "Member not found in the policy of {desc}, removing from state");
            return Ok(false);
        };

        state.member = keep_if_equivalent(&state.member, Value::from(member.clone()), members_equivalent);
        state.condition = flatten_condition(binding.condition.as_ref());
        state.etag = Value::from(policy.etag.clone());
        state.id = Value::from(member_id(&updater.get_resource_id(), binding, member));
        Ok(true)
    }

    async fn delete_remote(ctx: RequestContext<'_>, state: &IamMemberState<'_, P>) -> Result<()> {
        let updater = P::updater(&state.parent, ctx)?;
        let binding = state.binding();
        iam_policy_read_modify_write(updater.as_ref(), |policy| {
            policy.bindings = subtract_from_bindings(&policy.bindings, std::slice::from_ref(&binding));
            policy.version = IAM_POLICY_VERSION;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl<P: IamParent> Resource for IamMemberResource<P> {
    type State<'a> = Value<IamMemberState<'a, P>>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ProviderMetaState<'a>;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        let mut attributes = P::attributes();
        attributes.extend::<std::collections::HashMap<String, tf_provider::schema::Attribute>>(map! {
            "id" => id_attribute(),
            "etag" => etag_attribute(),
            "role" => attribute(
                AttributeType::String,
                "Role granted to the member, such as `roles/viewer`",
                AttributeConstraint::Required,
            ),
            "member" => attribute(
                AttributeType::String,
                "Identity granted the role, such as `user:jane@example.com`",
                AttributeConstraint::Required,
            ),
        });
        Some(Schema {
            version: 1,
            block: Block {
                attributes,
                blocks: map! { "condition" => ConditionState::block() },
                description: Description::plain(format!(
                    "Grant of a role to a single member on the IAM policy of a {}, \
                     preserving the other members of the role",
                    P::KIND
                )),
                ..Default::default()
            },
        })
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if let Value::Value(state) = &config {
            if let Some(member) = state.member.as_deref_option() {
                validate_member(diags, member, AttributePath::new("member"));
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
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = match state {
            Value::Value(state) => state,
            state => return Some((state, private_state)),
        };
        let session = Session::open(&self.config, diags, &provider_meta_state)?;
        match Self::read_remote(session.ctx(), &mut state).await {
            Ok(true) => Some((Value::Value(state), private_state)),
            Ok(false) => Some((Value::Null, private_state)),
            Err(err) => {
                diags.root_error(
                    format!("Error reading IAM member of {}", P::KIND),
                    format!("{err:#}"),
                );
                None
            }
        }
    }

    async fn plan_create<'a>(
        &self,
        diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = match proposed_state {
            Value::Value(state) => state,
            state => return Some((state, Default::default())),
        };
        let config = self.config.require(diags)?;
        P::plan(&mut state.parent, &config);
        state.id = Value::Unknown;
        state.etag = Value::Unknown;
        Some((Value::Value(state), Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(
        Self::State<'a>,
        Self::PrivateState<'a>,
        Vec<AttributePath>,
    )> {
        let (Value::Value(prior), Value::Value(mut state)) = (&prior_state, proposed_state.clone())
        else {
            return Some((proposed_state, prior_private_state, Vec::new()));
        };
        let config = self.config.require(diags)?;
        P::plan(&mut state.parent, &config);

        // Every attribute identifies the grant, so any change is a new member
        let mut trigger_replace = P::requires_replace(&prior.parent, &state.parent);
        replace_if_changed(&mut trigger_replace, "role", &prior.role, &state.role);
        let same_member = match (prior.member.as_deref_option(), state.member.as_deref_option()) {
            (Some(old), Some(new)) => members_equivalent(old, new),
            _ => prior.member == state.member,
        };
        if !same_member {
            trigger_replace.push(AttributePath::new("member"));
        } else {
            state.member = prior.member.clone();
        }
        if prior.condition != state.condition {
            trigger_replace.push(AttributePath::new("condition"));
        }
        if !trigger_replace.is_empty() {
            state.id = Value::Unknown;
            state.etag = Value::Unknown;
        }
        Some((Value::Value(state), prior_private_state, trigger_replace))
    }

    async fn plan_destroy<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::PrivateState<'a>> {
        Some(prior_private_state)
    }

    async fn create<'a>(
        &self,
        diags: &mut Diagnostics,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let Value::Value(mut state) = planned_state else {
            diags.root_error_short("Cannot create a null IAM member");
            return None;
        };
        let session = Session::open(&self.config, diags, &provider_meta_state)?;
        let ctx = session.ctx();

        let result: Result<()> = async {
            Self::write(ctx, &mut state).await?;
            if !Self::read_remote(ctx, &mut state).await? {
                return Err(anyhow!("member disappeared right after its creation"));
            }
            Ok(())
        }
        .await;
        match result {
            Ok(()) => Some((Value::Value(state), planned_private_state)),
            Err(err) => {
                diags.root_error(
                    format!("Error creating IAM member of {}", P::KIND),
                    format!("{err:#}"),
                );
                None
            }
        }
    }

    async fn update<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        Some((planned_state, planned_private_state))
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let Value::Value(state) = prior_state else {
            return Some(());
        };
        let session = Session::open(&self.config, diags, &provider_meta_state)?;
        match Self::delete_remote(session.ctx(), &state).await {
            Ok(()) => Some(()),
            Err(err) => {
                diags.root_error(
                    format!("Error deleting IAM member of {}", P::KIND),
                    format!("{err:#}"),
                );
                None
            }
        }
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let session = Session::open(&self.config, diags, &Value::Null)?;
        let ctx = session.ctx();

        let result: Result<IamMemberState<'a, P>> = async {
            let parts: Vec<&str> = id.split_whitespace().collect();
            let [parent, role, member, title @ ..] = parts.as_slice() else {
                return Err(anyhow!(
                    "Wrong number of parts to member id {id}; expected 'resource_name role member [condition_title]'"
                ));
            };
            let mut state = IamMemberState::<P> {
                parent: P::parse_import(parent, ctx.config)?,
                role: Value::from(role.to_string()),
                member: Value::from(member.to_string()),
                ..Default::default()
            };
            if !title.is_empty() {
                state.condition = Value::Value(ConditionState {
                    title: Value::from(title.join(" ")),
                    ..Default::default()
                });
            }
            if Self::read_remote(ctx, &mut state).await? {
                Ok(state)
            } else {
                Err(anyhow!("Cannot import non-existent remote object"))
            }
        }
        .await;
        match result {
            Ok(state) => Some((Value::Value(state), Default::default())),
            Err(err) => {
                diags.root_error(
                    format!("Error importing IAM member of {}", P::KIND),
                    format!("{err:#}"),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::Expr;

    #[test]
    fn ids() {
        let mut binding = Binding {
            role: "roles/viewer".to_owned(),
            members: vec![],
            condition: None,
        };
        assert_eq!(
            member_id("123456", &binding, "user:jane@example.com"),
            "123456/roles/viewer/user:jane@example.com"
        );
        binding.condition = Some(Expr {
            title: "expires".to_owned(),
            ..Default::default()
        });
        assert_eq!(
            member_id("123456", &binding, "user:jane@example.com"),
            "123456/roles/viewer/user:jane@example.com/expires"
        );
    }

    #[test]
    fn member_casing_is_not_a_change() {
        assert!(members_equivalent("user:Jane@Example.com", "user:jane@example.com"));
        assert!(!members_equivalent("allUsers", "allusers"));
    }
}
