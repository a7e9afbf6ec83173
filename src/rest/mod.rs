//! Generic lifecycle of the resources backed by a single REST collection
//!
//! A resource describes its URLs, its schema and how its state maps to the API
//! representation by implementing [`RestResource`]. [`GoogleResource`] turns such a
//! description into a Terraform resource.

use std::fmt::Debug;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tf_provider::{AttributePath, Diagnostics};
use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType, Block, Description};
use tf_provider::value::{Value, ValueString};

use crate::config::{Config, Service};
use crate::tpgresource::Vars;
use crate::transport::JsonMap;

mod resource;
mod timeouts;

pub use resource::GoogleResource;
pub use timeouts::{timeout_for, Lifecycle, Timeouts, TimeoutsState};

/// Shared context of the calls made for one lifecycle operation
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'c> {
    pub config: &'c Config,
    pub user_agent: &'c str,
}

/// Description of a resource managed through a REST collection
#[async_trait]
pub trait RestResource: Send + Sync + 'static {
    type State<'a>: Serialize
        + Deserialize<'a>
        + Debug
        + Clone
        + Default
        + PartialEq
        + Send
        + Sync;

    /// Human readable name used in messages, such as `Cluster`
    const KIND: &'static str;
    const SERVICE: Service;
    const TIMEOUTS: Timeouts;

    const CREATE_URL: &'static str;
    const CREATE_METHOD: Method = Method::POST;
    const SELF_URL: &'static str;
    const UPDATE_METHOD: Method = Method::PATCH;
    /// Send the fields to update as an `updateMask` query parameter
    const UPDATE_MASK: bool = true;
    const ID_FORMAT: &'static str;
    const IMPORT_FORMATS: &'static [&'static str];
    /// Writes return long-running operations
    const LONG_RUNNING: bool = false;

    /// Attributes and blocks of the resource, without `id` and `timeouts`
    fn schema() -> Block;

    fn validate(_diags: &mut Diagnostics, _state: &Self::State<'_>) {}

    fn id<'s, 'a>(state: &'s mut Self::State<'a>) -> &'s mut ValueString<'a>;
    fn timeouts<'s, 'a>(state: &'s Self::State<'a>) -> &'s Value<TimeoutsState<'a>>;

    /// Fields available to the URL templates
    fn vars(state: &Self::State<'_>) -> Vars;
    /// State holding the fields parsed from an import id
    fn from_import<'a>(vars: &Vars) -> Self::State<'a>;

    /// API representation of the state
    fn expand(state: &Self::State<'_>, config: &Config) -> Result<JsonMap>;
    fn encode_create(obj: JsonMap, _state: &Self::State<'_>) -> Result<JsonMap> {
        Ok(obj)
    }
    fn encode_update(obj: JsonMap, _update_mask: &[&'static str]) -> Result<JsonMap> {
        Ok(obj)
    }
    fn decode(res: JsonMap) -> Result<JsonMap> {
        Ok(res)
    }
    /// Update the state from the API representation
    fn flatten<'a>(state: &mut Self::State<'a>, res: &JsonMap, config: &Config);
    /// Record the fields only known once the creation call returned, such as a server generated name
    fn created<'a>(_state: &mut Self::State<'a>, _res: &JsonMap) {}

    /// Fields of the API representation that differ between two states
    fn update_mask(prior: &Self::State<'_>, planned: &Self::State<'_>) -> Vec<&'static str>;
    /// Attributes whose change requires a new resource
    fn requires_replace(prior: &Self::State<'_>, proposed: &Self::State<'_>) -> Vec<AttributePath>;
    /// Fill computed attributes of a planned state
    ///
    /// `prior` is `None` when the resource is planned for creation.
    fn plan<'a>(state: &mut Self::State<'a>, prior: Option<&Self::State<'a>>, config: &Config);

    /// Called after a successful create or update, before the state is read back
    ///
    /// `prior` is `None` after a creation.
    async fn post_write<'a>(
        _ctx: RequestContext<'_>,
        _prior: Option<&Self::State<'a>>,
        _state: &Self::State<'a>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Attribute with a plain description
pub fn attribute(attr_type: AttributeType, description: &str, constraint: AttributeConstraint) -> Attribute {
    Attribute {
        attr_type,
        description: Description::plain(description),
        constraint,
        ..Default::default()
    }
}

/// Push `name` to `paths` when the attribute changed between two states
///
/// An unknown proposed value counts as a change.
pub fn replace_if_changed<T: PartialEq>(
    paths: &mut Vec<AttributePath>,
    name: &'static str,
    prior: &Value<T>,
    proposed: &Value<T>,
) {
    if prior != proposed {
        paths.push(AttributePath::new(name));
    }
}

/// Push `field` to `mask` when the attribute changed between two states
pub fn mask_if_changed<T: PartialEq>(
    mask: &mut Vec<&'static str>,
    field: &'static str,
    prior: &T,
    planned: &T,
) {
    if prior != planned && !mask.contains(&field) {
        mask.push(field);
    }
}

/// Mark a computed attribute unknown when it has no value yet
pub fn unknown_if_null<T>(value: &mut Value<T>) {
    if value.is_null() {
        *value = Value::Unknown;
    }
}

#[cfg(test)]
mod tests {
    use tf_provider::value::ValueNumber;

    use super::*;

    #[test]
    fn replace_paths() {
        let mut paths = Vec::new();
        replace_if_changed(&mut paths, "location", &ValueString::from("a"), &ValueString::from("a"));
        assert!(paths.is_empty());
        replace_if_changed(&mut paths, "location", &ValueString::from("a"), &ValueString::Unknown);
        assert_eq!(paths, vec![AttributePath::new("location")]);
    }

    #[test]
    fn update_mask_has_no_duplicates() {
        let mut mask = Vec::new();
        mask_if_changed(&mut mask, "labels", &ValueNumber::from(1), &ValueNumber::from(2));
        mask_if_changed(&mut mask, "labels", &ValueNumber::from(1), &ValueNumber::from(3));
        mask_if_changed(&mut mask, "capacityConfig", &ValueNumber::from(1), &ValueNumber::from(1));
        assert_eq!(mask, vec!["labels"]);
    }

    #[test]
    fn computed_attributes() {
        let mut value = ValueString::Null;
        unknown_if_null(&mut value);
        assert!(value.is_unknown());
        let mut value = ValueString::from("set");
        unknown_if_null(&mut value);
        assert_eq!(value.as_str(), "set");
    }
}
