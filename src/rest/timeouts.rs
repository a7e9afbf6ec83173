use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, Description, NestedBlock};
use tf_provider::value::{Value, ValueString};

use crate::tpgresource::parse_duration;

/// Default durations of the lifecycle operations of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn minutes(create: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Create,
    Update,
    Delete,
}

/// `timeouts` block of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TimeoutsState<'a> {
    #[serde(borrow = "'a")]
    pub create: ValueString<'a>,
    pub update: ValueString<'a>,
    pub delete: ValueString<'a>,
}

impl<'a> TimeoutsState<'a> {
    pub fn block() -> NestedBlock {
        let attribute = |what: &str| Attribute {
            attr_type: AttributeType::String,
            description: Description::plain(format!(
                "Maximum duration to {what} the resource, for instance `20m`"
            )),
            constraint: AttributeConstraint::Optional,
            ..Default::default()
        };
        NestedBlock::Optional(Block {
            attributes: map! {
                "create" => attribute("create"),
                "update" => attribute("update"),
                "delete" => attribute("delete"),
            },
            description: Description::plain("Operation timeouts"),
            ..Default::default()
        })
    }

    fn get(&self, lifecycle: Lifecycle) -> &ValueString<'a> {
        match lifecycle {
            Lifecycle::Create => &self.create,
            Lifecycle::Update => &self.update,
            Lifecycle::Delete => &self.delete,
        }
    }

    pub fn validate(&self, diags: &mut Diagnostics) {
        for (name, value) in [
            ("create", &self.create),
            ("update", &self.update),
            ("delete", &self.delete),
        ] {
            if let Value::Value(duration) = value {
                if let Err(err) = parse_duration(duration) {
                    diags.error(
                        "Invalid timeout",
                        format!("{err:#}"),
                        AttributePath::new("timeouts").attribute(name),
                    );
                }
            }
        }
    }
}

/// Duration allowed for `lifecycle`: the configured one, or the resource default
pub fn timeout_for(
    state: &Value<TimeoutsState<'_>>,
    defaults: &Timeouts,
    lifecycle: Lifecycle,
) -> Result<Duration> {
    let configured = state
        .as_ref_option()
        .and_then(|timeouts| timeouts.get(lifecycle).as_deref_option());
    match configured {
        Some(duration) => {
            parse_duration(duration).with_context(|| format!("invalid {lifecycle:?} timeout"))
        }
        None => Ok(match lifecycle {
            Lifecycle::Create => defaults.create,
            Lifecycle::Update => defaults.update,
            Lifecycle::Delete => defaults.delete,
        }),
    }
}
