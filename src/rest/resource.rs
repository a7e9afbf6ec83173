use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tf_provider::{AttributePath, Diagnostics, Resource};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Description, Schema};
use tf_provider::value::{Value, ValueEmpty};
use tracing::{debug, info};

use super::{timeout_for, Lifecycle, RequestContext, RestResource, TimeoutsState};
use crate::config::{Config, ConfigHandle};
use crate::operation::{operation_wait_time, operation_wait_time_with_response};
use crate::provider::{module_user_agent, ProviderMetaState};
use crate::tpgresource::{parse_import_id, replace_vars, replace_vars_for_id};
use crate::transport::{add_query_params, billing_project, handle_not_found, ApiRequest, JsonMap};

/// Terraform resource driving a [`RestResource`]
pub struct GoogleResource<T> {
    config: ConfigHandle,
    ph: PhantomData<fn() -> T>,
}

impl<T> GoogleResource<T> {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            ph: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for GoogleResource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleResource")
            .field("kind", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: RestResource> GoogleResource<T> {
    fn context(&self, diags: &mut Diagnostics) -> Option<Arc<Config>> {
        self.config.require(diags)
    }

    async fn read_remote<'a>(
        ctx: RequestContext<'_>,
        state: &mut T::State<'a>,
    ) -> Result<bool> {
        let vars = T::vars(state);
        let url = replace_vars(T::SELF_URL, &vars, ctx.config)?;
        let res = ApiRequest::get(ctx.config, url)
            .billing_project(billing_project(ctx.config, vars.get("project")))
            .user_agent(ctx.user_agent)
            .send()
            .await;
        let Some(res) = handle_not_found(res, T::KIND)? else {
            return Ok(false);
        };
        let res = T::decode(res)?;
        T::flatten(state, &res, ctx.config);
        Ok(true)
    }

    async fn wait_operation(
        ctx: RequestContext<'_>,
        op: JsonMap,
        activity: &str,
        project: Option<&str>,
        timeout: std::time::Duration,
    ) -> Result<JsonMap> {
        if T::LONG_RUNNING {
            operation_wait_time_with_response(
                ctx.config,
                op,
                ctx.config.base_path(T::SERVICE),
                activity,
                project,
                ctx.user_agent,
                timeout,
            )
            .await
        } else {
            Ok(op)
        }
    }

    async fn create_remote<'a>(ctx: RequestContext<'_>, state: &mut T::State<'a>) -> Result<()> {
        let config = ctx.config;
        let timeout = timeout_for(T::timeouts(state), &T::TIMEOUTS, Lifecycle::Create)?;
        let vars = T::vars(state);
        let project = vars.get("project");

        let obj = T::encode_create(T::expand(state, config)?, state)?;
        let url = replace_vars(T::CREATE_URL, &vars, config)?;
        info!(kind = T::KIND, %url, "Creating new resource");
        let res = ApiRequest::new(config, T::CREATE_METHOD, url)
            .billing_project(billing_project(config, project))
            .user_agent(ctx.user_agent)
            .body(obj)
            .timeout(timeout)
            .send()
            .await?;

        let activity = format!("Creating {}", T::KIND);
        let res = Self::wait_operation(ctx, res, &activity, project, timeout).await?;
        T::created(state, &res);

        let id = replace_vars_for_id(T::ID_FORMAT, &T::vars(state), config)?;
        debug!(kind = T::KIND, %id, "Finished creating resource");
        *T::id(state) = Value::from(id);
        Ok(())
    }

    async fn update_remote<'a>(
        ctx: RequestContext<'_>,
        prior: &T::State<'a>,
        state: &mut T::State<'a>,
    ) -> Result<()> {
        let config = ctx.config;
        let timeout = timeout_for(T::timeouts(state), &T::TIMEOUTS, Lifecycle::Update)?;
        let vars = T::vars(state);
        let project = vars.get("project");

        let mask = T::update_mask(prior, state);
        let mut url = replace_vars(T::SELF_URL, &vars, config)?;
        if T::UPDATE_MASK {
            if mask.is_empty() {
                debug!(kind = T::KIND, "Nothing to update");
                return Ok(());
            }
            url = add_query_params(&url, &[("updateMask", &mask.join(","))])?;
        }
        let obj = T::encode_update(T::expand(state, config)?, &mask)?;

        info!(kind = T::KIND, %url, "Updating resource");
        let res = ApiRequest::new(config, T::UPDATE_METHOD, url)
            .billing_project(billing_project(config, project))
            .user_agent(ctx.user_agent)
            .body(obj)
            .timeout(timeout)
            .send()
            .await?;

        let activity = format!("Updating {}", T::KIND);
        Self::wait_operation(ctx, res, &activity, project, timeout).await?;
        Ok(())
    }

    /// Wait for a written object to settle, then read it back
    async fn refresh<'a>(
        ctx: RequestContext<'_>,
        prior: Option<&T::State<'a>>,
        state: &mut T::State<'a>,
    ) -> Result<()> {
        T::post_write(ctx, prior, state).await?;
        if !Self::read_remote(ctx, state).await? {
            return Err(anyhow!("{} disappeared right after being written", T::KIND));
        }
        Ok(())
    }

    async fn delete_remote(ctx: RequestContext<'_>, state: &T::State<'_>) -> Result<()> {
        let config = ctx.config;
        let timeout = timeout_for(T::timeouts(state), &T::TIMEOUTS, Lifecycle::Delete)?;
        let vars = T::vars(state);
        let project = vars.get("project");

        let url = replace_vars(T::SELF_URL, &vars, config)?;
        info!(kind = T::KIND, %url, "Deleting resource");
        let res = ApiRequest::delete(config, url)
            .billing_project(billing_project(config, project))
            .user_agent(ctx.user_agent)
            .timeout(timeout)
            .send()
            .await;
        let Some(res) = handle_not_found(res, T::KIND)? else {
            return Ok(());
        };

        if T::LONG_RUNNING {
            let activity = format!("Deleting {}", T::KIND);
            operation_wait_time(
                config,
                res,
                config.base_path(T::SERVICE),
                &activity,
                project,
                ctx.user_agent,
                timeout,
            )
            .await?;
        }
        debug!(kind = T::KIND, "Finished deleting resource");
        Ok(())
    }
}

#[async_trait]
impl<T: RestResource> Resource for GoogleResource<T> {
    type State<'a> = Value<T::State<'a>>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ProviderMetaState<'a>;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        let mut block = T::schema();
        block.attributes.insert(
            "id".into(),
            Attribute {
                attr_type: AttributeType::String,
                description: Description::plain("Identifier of the resource"),
                constraint: AttributeConstraint::Computed,
                ..Default::default()
            },
        );
        block
            .blocks
            .insert("timeouts".into(), TimeoutsState::block());
        Some(Schema { version: 1, block })
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if let Value::Value(state) = &config {
            T::validate(diags, state);
            if let Value::Value(timeouts) = T::timeouts(state) {
                timeouts.validate(diags);
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
        let config = self.context(diags)?;
        let user_agent = module_user_agent(&config, &provider_meta_state);
        let ctx = RequestContext {
            config: &config,
            user_agent: &user_agent,
        };

        match Self::read_remote(ctx, &mut state).await {
            Ok(true) => Some((Value::Value(state), private_state)),
            Ok(false) => Some((Value::Null, private_state)),
            Err(err) => {
                diags.root_error(format!("Error reading {}", T::KIND), format!("{err:#}"));
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
        let config = self.context(diags)?;
        T::plan(&mut state, None, &config);
        *T::id(&mut state) = Value::Unknown;

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
        let config = self.context(diags)?;

        let trigger_replace = T::requires_replace(prior, &state);
        if trigger_replace.is_empty() {
            T::plan(&mut state, Some(prior), &config);
        } else {
            T::plan(&mut state, None, &config);
            *T::id(&mut state) = Value::Unknown;
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
            diags.root_error_short(format!("Cannot create a null {}", T::KIND));
            return None;
        };
        let config = self.context(diags)?;
        let user_agent = module_user_agent(&config, &provider_meta_state);
        let ctx = RequestContext {
            config: &config,
            user_agent: &user_agent,
        };

        if let Err(err) = Self::create_remote(ctx, &mut state).await {
            diags.root_error(format!("Error creating {}", T::KIND), format!("{err:#}"));
            return None;
        }

        // The remote object exists from here on: keep it in state even on failure
        if let Err(err) = Self::refresh(ctx, None, &mut state).await {
            diags.root_error(format!("Error creating {}", T::KIND), format!("{err:#}"));
        }
        Some((Value::Value(state), planned_private_state))
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let (Value::Value(prior), Value::Value(mut state)) = (prior_state, planned_state) else {
            diags.root_error_short(format!("Cannot update a null {}", T::KIND));
            return None;
        };
        let config = self.context(diags)?;
        let user_agent = module_user_agent(&config, &provider_meta_state);
        let ctx = RequestContext {
            config: &config,
            user_agent: &user_agent,
        };

        if let Err(err) = Self::update_remote(ctx, &prior, &mut state).await {
            diags.root_error(format!("Error updating {}", T::KIND), format!("{err:#}"));
            return Some((Value::Value(prior), planned_private_state));
        }

        if let Err(err) = Self::refresh(ctx, Some(&prior), &mut state).await {
            diags.root_error(format!("Error updating {}", T::KIND), format!("{err:#}"));
        }
        Some((Value::Value(state), planned_private_state))
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
        let config = self.context(diags)?;
        let user_agent = module_user_agent(&config, &provider_meta_state);
        let ctx = RequestContext {
            config: &config,
            user_agent: &user_agent,
        };

        match Self::delete_remote(ctx, &state).await {
            Ok(()) => Some(()),
            Err(err) => {
                diags.root_error(format!("Error deleting {}", T::KIND), format!("{err:#}"));
                None
            }
        }
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let config = self.context(diags)?;
        let ctx = RequestContext {
            config: &config,
            user_agent: &config.user_agent,
        };

        let result: Result<T::State<'a>> = async {
            let vars = parse_import_id(&id, T::IMPORT_FORMATS, &config)?;
            let mut state = T::from_import(&vars);
            let id = replace_vars_for_id(T::ID_FORMAT, &T::vars(&state), &config)?;
            *T::id(&mut state) = Value::from(id);
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
                diags.root_error(format!("Error importing {}", T::KIND), format!("{err:#}"));
                None
            }
        }
    }
}
