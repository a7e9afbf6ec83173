use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, DataSource, Diagnostics};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, Description, Schema};
use tf_provider::value::{Value, ValueMap, ValueString};

use crate::config::{Config, ConfigHandle};
use crate::provider::ProviderMetaState;
use crate::tpgresource::value_map;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClientConfigState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    pub project: ValueString<'a>,
    pub region: ValueString<'a>,
    pub zone: ValueString<'a>,
    pub access_token: ValueString<'a>,
    pub default_labels: ValueMap<'a, ValueString<'a>>,
}

/// `google_client_config`: settings and credentials of the provider
#[derive(Debug)]
pub struct ClientConfigDataSource {
    config: ConfigHandle,
}

impl ClientConfigDataSource {
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }
}

fn optional<'a>(value: &Option<String>) -> ValueString<'a> {
    value.clone().map_or(Value::Null, Value::from)
}

/// State of the data source, the access token left out
pub fn client_config_state<'a>(config: &Config) -> ClientConfigState<'a> {
    let part = |value: &Option<String>| value.clone().unwrap_or_default();
    ClientConfigState {
        id: Value::from(format!(
            "projects/{}/regions/{}/zones/{}",
            part(&config.project),
            part(&config.region),
            part(&config.zone)
        )),
        project: optional(&config.project),
        region: optional(&config.region),
        zone: optional(&config.zone),
        access_token: Value::Null,
        default_labels: value_map(config.default_labels.clone()),
    }
}

#[async_trait]
impl DataSource for ClientConfigDataSource {
    type State<'a> = ClientConfigState<'a>;
    type ProviderMetaState<'a> = ProviderMetaState<'a>;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        let computed = |description: &str| Attribute {
            attr_type: AttributeType::String,
            description: Description::plain(description),
            constraint: AttributeConstraint::Computed,
            ..Default::default()
        };
        Some(Schema {
            version: 1,
            block: Block {
                attributes: map! {
                    "id" => computed("Project, region and zone of the provider"),
                    "project" => computed("Default project of the provider"),
                    "region" => computed("Default region of the provider"),
                    "zone" => computed("Default zone of the provider"),
                    "access_token" => Attribute {
                        sensitive: true,
                        ..computed("OAuth2 access token used by the provider")
                    },
                    "default_labels" => Attribute {
                        attr_type: AttributeType::Map(AttributeType::String.into()),
                        ..computed("Labels applied to every resource supporting labels")
                    },
                },
                description: Description::plain("Configuration of the google provider"),
                ..Default::default()
            },
        })
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        _config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let config = self.config.require(diags)?;
        let mut state = client_config_state(&config);
        match config.access_token().await {
            Ok(token) => {
                state.access_token = Value::from(token);
                Some(state)
            }
            Err(err) => {
                diags.root_error("Error setting access_token", format!("{err:#}"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TokenSource;

    #[tokio::test]
    async fn reports_provider_settings() {
        let mut config = Config::new(TokenSource::fixed("secret"), reqwest::Client::new());
        config.project = Some("p".to_owned());
        config.region = Some("europe-west1".to_owned());
        let data_source = ClientConfigDataSource::new(ConfigHandle::new(config));

        let mut diags = Diagnostics::default();
        let state = data_source
            .read(&mut diags, Default::default(), Value::Null)
            .await
            .unwrap();
        assert_eq!(state.id.as_str(), "projects/p/regions/europe-west1/zones/");
        assert_eq!(state.access_token.as_str(), "secret");
        assert!(state.zone.is_null());
    }
}
