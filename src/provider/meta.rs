use serde::{Deserialize, Serialize};
use tf_provider::map;
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::value::{Value, ValueString};

use crate::config::Config;

/// `provider_meta "google"` block of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMeta<'a> {
    #[serde(borrow = "'a")]
    pub module_name: ValueString<'a>,
}

pub type ProviderMetaState<'a> = Value<ProviderMeta<'a>>;

impl ProviderMeta<'_> {
    pub fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                attributes: map! {
                    "module_name" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain(
                            "Name of the module, appended to the user agent of the API calls",
                        ),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                },
                description: Description::plain("Module metadata"),
                ..Default::default()
            },
        }
    }
}

/// User agent of the calls made on behalf of a module
pub fn module_user_agent(config: &Config, meta: &ProviderMetaState<'_>) -> String {
    match meta.as_ref_option().and_then(|m| m.module_name.as_deref_option()) {
        Some(module) if !module.is_empty() => format!("{} {module}", config.user_agent),
        _ => config.user_agent.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TokenSource;

    #[test]
    fn module_name_is_appended() {
        let config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        let meta = Value::Value(ProviderMeta {
            module_name: Value::from("blueprints/terraform/my-module/v1.0.0"),
        });
        let user_agent = module_user_agent(&config, &meta);
        assert!(user_agent.starts_with("Terraform/"));
        assert!(user_agent.ends_with(" blueprints/terraform/my-module/v1.0.0"));
        assert_eq!(module_user_agent(&config, &Value::Null), config.user_agent);
    }
}
