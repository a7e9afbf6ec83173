use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tf_provider::{map, AttributePath};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Description};
use tf_provider::value::ValueString;

use crate::config::{Config, Service};
use crate::iam::{IamParent, Policy, ResourceIamUpdater, IAM_POLICY_VERSION};
use crate::rest::{replace_if_changed, RequestContext};
use crate::transport::{add_query_params, ApiRequest};

/// Billing accounts as holders of IAM policies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillingAccountIam;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BillingAccountIamFields<'a> {
    #[serde(borrow = "'a")]
    pub billing_account_id: ValueString<'a>,
}

impl IamParent for BillingAccountIam {
    const KIND: &'static str = "billing account";
    type Fields<'a> = BillingAccountIamFields<'a>;

    fn attributes() -> HashMap<String, Attribute> {
        map! {
            "billing_account_id" => Attribute {
                attr_type: AttributeType::String,
                description: Description::plain("Id of the billing account, such as `012345-567890-ABCDEF`"),
                constraint: AttributeConstraint::Required,
                ..Default::default()
            },
        }
    }

    fn parse_import<'a>(id: &str, _config: &Config) -> Result<Self::Fields<'a>> {
        let account = id.strip_prefix("billingAccounts/").unwrap_or(id);
        Ok(BillingAccountIamFields {
            billing_account_id: ValueString::from(account.to_owned()),
        })
    }

    fn requires_replace(prior: &Self::Fields<'_>, proposed: &Self::Fields<'_>) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        replace_if_changed(
            &mut paths,
            "billing_account_id",
            &prior.billing_account_id,
            &proposed.billing_account_id,
        );
        paths
    }

    fn updater<'c>(
        fields: &Self::Fields<'_>,
        ctx: RequestContext<'c>,
    ) -> Result<Box<dyn ResourceIamUpdater + 'c>> {
        let billing_account_id = fields
            .billing_account_id
            .as_deref_option()
            .context("billing_account_id: required field is not set")?
            .to_owned();
        Ok(Box::new(BillingAccountIamUpdater {
            billing_account_id,
            ctx,
        }))
    }
}

pub struct BillingAccountIamUpdater<'c> {
    billing_account_id: String,
    ctx: RequestContext<'c>,
}

impl BillingAccountIamUpdater<'_> {
    fn url(&self, method: &str) -> String {
        format!(
            "{}billingAccounts/{}:{method}",
            self.ctx.config.base_path(Service::CoreBilling),
            self.billing_account_id
        )
    }
}

#[async_trait]
impl ResourceIamUpdater for BillingAccountIamUpdater<'_> {
    async fn get_resource_iam_policy(&self) -> Result<Policy> {
        let url = add_query_params(
            &self.url("getIamPolicy"),
            &[("options.requestedPolicyVersion", &IAM_POLICY_VERSION.to_string())],
        )?;
        let res = ApiRequest::get(self.ctx.config, url)
            .user_agent(self.ctx.user_agent)
            .send()
            .await
            .with_context(|| format!("Error retrieving IAM policy for {}", self.describe_resource()))?;
        Policy::from_response(res)
    }

    async fn set_resource_iam_policy(&self, policy: &Policy) -> Result<()> {
        let body = json!({ "policy": policy.to_json()? });
        let body = body.as_object().cloned().unwrap_or_default();
        ApiRequest::post(self.ctx.config, self.url("setIamPolicy"))
            .user_agent(self.ctx.user_agent)
            .body(body)
            .send()
            .await?;
        Ok(())
    }

    fn get_mutex_key(&self) -> String {
        format!("iam-billing-account-{}", self.billing_account_id)
    }

    fn get_resource_id(&self) -> String {
        self.billing_account_id.clone()
    }

    fn describe_resource(&self) -> String {
        format!("Billing Account {:?}", self.billing_account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TokenSource;

    #[test]
    fn import_and_urls() {
        let config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        let fields =
            BillingAccountIam::parse_import("billingAccounts/0123-4567-89AB", &config).unwrap();
        assert_eq!(fields.billing_account_id.as_str(), "0123-4567-89AB");

        let ctx = RequestContext {
            config: &config,
            user_agent: "test",
        };
        let updater = BillingAccountIamUpdater {
            billing_account_id: "0123-4567-89AB".to_owned(),
            ctx,
        };
        assert_eq!(
            updater.url("setIamPolicy"),
            "https://cloudbilling.googleapis.com/v1/billingAccounts/0123-4567-89AB:setIamPolicy"
        );
        assert!(BillingAccountIam::updater(&Default::default(), ctx).is_err());
    }
}
