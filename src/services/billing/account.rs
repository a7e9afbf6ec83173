use std::collections::BTreeSet;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tf_provider::value::ValueBool;
use tf_provider::{map, AttributePath, DataSource, Diagnostics};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::value::{Value, ValueSet, ValueString};
use tracing::debug;

use crate::config::{Config, ConfigHandle, Service};
use crate::provider::{module_user_agent, ProviderMetaState};
use crate::tpgresource::objects;
use crate::transport::{add_query_params, ApiRequest, JsonMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BillingAccountState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub billing_account: ValueString<'a>,
    pub display_name: ValueString<'a>,
    pub open: ValueBool,
    pub name: ValueString<'a>,
    pub project_ids: ValueSet<ValueString<'a>>,
    pub lookup_projects: ValueBool,
}

/// `google_billing_account`: look a billing account up by id or display name
#[derive(Debug)]
pub struct BillingAccountDataSource {
    config: ConfigHandle,
}

impl BillingAccountDataSource {
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }
}

/// Billing account returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Account {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    open: bool,
}

/// Every item of a paginated list call
async fn list_all(
    config: &Config,
    url: &str,
    user_agent: &str,
    items: &str,
) -> Result<Vec<JsonMap>> {
    let mut all = Vec::new();
    let mut page_token = String::new();
    loop {
        let page_url = if page_token.is_empty() {
            url.to_owned()
        } else {
            add_query_params(url, &[("pageToken", &page_token)])?
        };
        let res = ApiRequest::get(config, page_url)
            .user_agent(user_agent)
            .send()
            .await?;
        all.extend(objects(&res, items).cloned());
        match res.get("nextPageToken").and_then(Json::as_str) {
            Some(token) if !token.is_empty() => page_token = token.to_owned(),
            _ => return Ok(all),
        }
    }
}

fn parse_account(obj: JsonMap) -> Result<Account> {
    Ok(serde_json::from_value(Json::Object(obj))?)
}

/// Single account among `accounts` matching the display name and `open` filter
fn find_by_display_name(accounts: Vec<Account>, display_name: &str, open: Option<bool>) -> Result<Account> {
    let mut matches = accounts
        .into_iter()
        .filter(|a| a.display_name == display_name && open.map_or(true, |open| a.open == open));
    match (matches.next(), matches.next()) {
        (Some(account), None) => Ok(account),
        (None, _) => bail!("Billing account not found: {display_name}"),
        (Some(_), Some(_)) => bail!("More than one matching billing account found"),
    }
}

async fn lookup<'a>(
    config: &Config,
    user_agent: &str,
    state: &BillingAccountState<'a>,
) -> Result<(Account, Option<BTreeSet<String>>)> {
    let base = config.base_path(Service::CoreBilling);
    let open = state.open.as_ref_option().copied();

    let account = if let Some(id) = state.billing_account.as_deref_option() {
        let id = id.strip_prefix("billingAccounts/").unwrap_or(id);
        let res = ApiRequest::get(config, format!("{base}billingAccounts/{id}"))
            .user_agent(user_agent)
            .send()
            .await?;
        let account = parse_account(res)?;
        if open.is_some_and(|open| account.open != open) {
            bail!("Billing account not found: {id}");
        }
        account
    } else if let Some(display_name) = state.display_name.as_deref_option() {
        let accounts = list_all(config, &format!("{base}billingAccounts"), user_agent, "billingAccounts")
            .await?
            .into_iter()
            .map(parse_account)
            .collect::<Result<Vec<_>>>()?;
        find_by_display_name(accounts, display_name, open)?
    } else {
        bail!("one of billing_account or display_name must be set");
    };

    let project_ids = if state.lookup_projects.as_ref_option() != Some(&false) {
        debug!(account = %account.name, "Listing projects of billing account");
        let projects = list_all(
            config,
            &format!("{base}{}/projects", account.name),
            user_agent,
            "projectBillingInfo",
        )
        .await?;
        Some(
            projects
                .iter()
                .filter_map(|p| p.get("projectId").and_then(Json::as_str))
                .map(str::to_owned)
                .collect(),
        )
    } else {
        None
    };
    Ok((account, project_ids))
}

#[async_trait]
impl DataSource for BillingAccountDataSource {
    type State<'a> = BillingAccountState<'a>;
    type ProviderMetaState<'a> = ProviderMetaState<'a>;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        let attribute = |attr_type, description: &str, constraint| Attribute {
            attr_type,
            description: Description::plain(description),
            constraint,
            ..Default::default()
        };
        Some(Schema {
            version: 1,
            block: Block {
                attributes: map! {
                    "id" => attribute(AttributeType::String, "Id of the billing account", AttributeConstraint::Computed),
                    "billing_account" => attribute(AttributeType::String, "Id of the billing account to look up", AttributeConstraint::Optional),
                    "display_name" => attribute(AttributeType::String, "Display name of the billing account to look up", AttributeConstraint::OptionalComputed),
                    "open" => attribute(AttributeType::Bool, "Only match open, or closed, accounts", AttributeConstraint::OptionalComputed),
                    "name" => attribute(AttributeType::String, "Resource name of the billing account, `billingAccounts/{id}`", AttributeConstraint::Computed),
                    "project_ids" => attribute(AttributeType::Set(AttributeType::String.into()), "Projects linked to the billing account", AttributeConstraint::Computed),
                    "lookup_projects" => attribute(AttributeType::Bool, "List the linked projects, true by default", AttributeConstraint::Optional),
                },
                description: Description::plain("Billing account visible to the caller"),
                ..Default::default()
            },
        })
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if config.billing_account.is_value() && config.display_name.is_value() {
            diags.error(
                "Conflicting attributes",
                "Only one of billing_account and display_name can be set",
                AttributePath::new("display_name"),
            );
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
        provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let provider_config = self.config.require(diags)?;
        let user_agent = module_user_agent(&provider_config, &provider_meta_state);

        match lookup(&provider_config, &user_agent, &config).await {
            Ok((account, project_ids)) => {
                let mut state = config;
                let id = account
                    .name
                    .strip_prefix("billingAccounts/")
                    .unwrap_or(&account.name)
                    .to_owned();
                state.id = Value::from(id);
                state.display_name = Value::from(account.display_name);
                state.open = Value::Value(account.open);
                state.name = Value::from(account.name);
                state.project_ids = Value::Value(
                    project_ids
                        .unwrap_or_default()
                        .into_iter()
                        .map(Value::from)
                        .collect(),
                );
                Some(state)
            }
            Err(err) => {
                diags.root_error("Error reading billing account", format!("{err:#}"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str, display_name: &str, open: bool) -> Account {
        Account {
            name: name.to_owned(),
            display_name: display_name.to_owned(),
            open,
        }
    }

    #[test]
    fn display_name_lookup() {
        let accounts = vec![
            account("billingAccounts/a", "Main", true),
            account("billingAccounts/b", "Main", false),
            account("billingAccounts/c", "Other", true),
        ];
        let found = find_by_display_name(accounts.clone(), "Main", Some(false)).unwrap();
        assert_eq!(found.name, "billingAccounts/b");

        let err = find_by_display_name(accounts.clone(), "Main", None).unwrap_err();
        assert_eq!(err.to_string(), "More than one matching billing account found");

        let err = find_by_display_name(accounts, "Missing", None).unwrap_err();
        assert_eq!(err.to_string(), "Billing account not found: Missing");
    }
}
