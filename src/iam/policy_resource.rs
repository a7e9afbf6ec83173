use std::marker::PhantomData;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics, Resource};
use tf_provider::schema::{AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::value::{Value, ValueEmpty, ValueString};
use tracing::debug;

use super::{
    attribute, create_iam_audit_configs_map, create_iam_bindings_map, etag_attribute,
    iam_policy_read_modify_write, iam_policy_read_with_retry, id_attribute, merge_audit_configs,
    merge_bindings, IamParent, Policy, Session, IAM_POLICY_VERSION,
};
use crate::config::ConfigHandle;
use crate::provider::ProviderMetaState;
use crate::rest::RequestContext;
use crate::transport::handle_not_found;

/// Authoritative IAM policy of a parent resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IamPolicyState<'a, P>
where
    P: IamParent,
{
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    #[serde(flatten)]
    pub parent: P::Fields<'a>,
    pub policy_data: ValueString<'a>,
    pub etag: ValueString<'a>,
}

/// `<parent>_iam_policy` resource
pub struct IamPolicyResource<P> {
    config: ConfigHandle,
    ph: PhantomData<fn() -> P>,
}

impl<P> IamPolicyResource<P> {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            ph: PhantomData,
        }
    }
}

/// Parse `policy_data`, as produced by the `google_iam_policy` data source
pub fn parse_policy_data(policy_data: &str) -> Result<Policy> {
    serde_json::from_str(policy_data).context("policy_data is not a valid IAM policy")
}

/// Serialize the parts of a policy managed through `policy_data`
pub fn marshal_policy_data(policy: &Policy) -> Result<String> {
    let policy = Policy {
        version: 0,
        bindings: merge_bindings(&policy.bindings),
        audit_configs: merge_audit_configs(&policy.audit_configs),
        etag: String::new(),
    };
    serde_json::to_string(&policy).context("cannot serialize IAM policy")
}

/// Whether two policies hold the same bindings and audit configs
fn same_access(a: &Policy, b: &Policy) -> bool {
    create_iam_bindings_map(&a.bindings) == create_iam_bindings_map(&b.bindings)
        && create_iam_audit_configs_map(&a.audit_configs)
            == create_iam_audit_configs_map(&b.audit_configs)
}

impl<P: IamParent> IamPolicyResource<P> {
    async fn write<'a>(ctx: RequestContext<'_>, state: &mut IamPolicyState<'a, P>) -> Result<()> {
        let updater = P::updater(&state.parent, ctx)?;
        let wanted = parse_policy_data(state.policy_data.as_deref_option().unwrap_or("{}"))?;
        debug!("Setting policy of {}", updater.describe_resource());
        iam_policy_read_modify_write(updater.as_ref(), |policy| {
            policy.bindings = merge_bindings(&wanted.bindings);
            policy.audit_configs = merge_audit_configs(&wanted.audit_configs);
            policy.version = IAM_POLICY_VERSION;
            Ok(())
        })
        .await?;
        state.id = Value::from(updater.get_resource_id());
        Ok(())
    }

    async fn read_remote<'a>(
        ctx: RequestContext<'_>,
        state: &mut IamPolicyState<'a, P>,
    ) -> Result<bool> {
        let updater = P::updater(&state.parent, ctx)?;
        let desc = updater.describe_resource();
        let Some(policy) = handle_not_found(iam_policy_read_with_retry(updater.as_ref()).await, &desc)?
        else {
            return Ok(false);
        };

        let unchanged = state
            .policy_data
            .as_deref_option()
            .and_then(|data| parse_policy_data(data).ok())
            .is_some_and(|configured| same_access(&configured, &policy));
        if !unchanged {
            state.policy_data = Value::from(marshal_policy_data(&policy)?);
        }
        state.etag = Value::from(policy.etag);
        state.id = Value::from(updater.get_resource_id());
        Ok(true)
    }

    async fn delete_remote(ctx: RequestContext<'_>, state: &IamPolicyState<'_, P>) -> Result<()> {
        let updater = P::updater(&state.parent, ctx)?;
        iam_policy_read_modify_write(updater.as_ref(), |policy| {
            policy.bindings.clear();
            policy.audit_configs.clear();
            policy.version = IAM_POLICY_VERSION;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl<P: IamParent> Resource for IamPolicyResource<P> {
    type State<'a> = Value<IamPolicyState<'a, P>>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ProviderMetaState<'a>;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        let mut attributes = P::attributes();
        attributes.extend::<std::collections::HashMap<String, tf_provider::schema::Attribute>>(map! {
            "id" => id_attribute(),
            "etag" => etag_attribute(),
            "policy_data" => attribute(
                AttributeType::String,
                "IAM policy as JSON, usually from the `google_iam_policy` data source",
                AttributeConstraint::Required,
            ),
        });
        Some(Schema {
            version: 1,
            block: Block {
                attributes,
                description: Description::plain(format!(
                    "Authoritative IAM policy of a {}, replacing any existing policy",
                    P::KIND
                )),
                ..Default::default()
            },
        })
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if let Value::Value(state) = &config {
            if let Some(data) = state.policy_data.as_deref_option() {
                if let Err(err) = parse_policy_data(data) {
                    diags.error(
                        "Invalid policy_data",
                        format!("{err:#}"),
                        AttributePath::new("policy_data"),
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
                    format!("Error reading IAM policy of {}", P::KIND),
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

        let trigger_replace = P::requires_replace(&prior.parent, &state.parent);
        if !trigger_replace.is_empty() {
            state.id = Value::Unknown;
            state.etag = Value::Unknown;
        } else if prior.policy_data != state.policy_data {
            // Reformatting the same policy is not a change
            let equivalent = match (
                prior.policy_data.as_deref_option().map(parse_policy_data),
                state.policy_data.as_deref_option().map(parse_policy_data),
            ) {
                (Some(Ok(old)), Some(Ok(new))) => same_access(&old, &new),
                _ => false,
            };
            if equivalent {
                state.policy_data = prior.policy_data.clone();
            } else {
                state.etag = Value::Unknown;
            }
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
            diags.root_error_short("Cannot create a null IAM policy");
            return None;
        };
        let session = Session::open(&self.config, diags, &provider_meta_state)?;
        let ctx = session.ctx();

        let result: Result<()> = async {
            Self::write(ctx, &mut state).await?;
            if !Self::read_remote(ctx, &mut state).await? {
                return Err(anyhow!("policy disappeared right after it was set"));
            }
            Ok(())
        }
        .await;
        match result {
            Ok(()) => Some((Value::Value(state), planned_private_state)),
            Err(err) => {
                diags.root_error(
                    format!("Error setting IAM policy of {}", P::KIND),
                    format!("{err:#}"),
                );
                None
            }
        }
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        config_state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        self.create(
            diags,
            planned_state,
            config_state,
            planned_private_state,
            provider_meta_state,
        )
        .await
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
                    format!("Error deleting IAM policy of {}", P::KIND),
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

        let result: Result<IamPolicyState<'a, P>> = async {
            let mut state = IamPolicyState::<P> {
                parent: P::parse_import(id.trim(), ctx.config)?,
                ..Default::default()
            };
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
                    format!("Error importing IAM policy of {}", P::KIND),
                    format!("{err:#}"),
                );
                None
            }
        }
    }
}
