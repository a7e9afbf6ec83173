use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as Json;
use tf_provider::value::{Value, ValueList, ValueMap, ValueNumber, ValueString};

use crate::transport::JsonMap;

/// Conversion of a state value into its API JSON representation
pub trait Expand {
    fn expand(&self) -> Json;
}

impl Expand for Cow<'_, str> {
    fn expand(&self) -> Json {
        Json::String(self.to_string())
    }
}

impl Expand for i64 {
    fn expand(&self) -> Json {
        Json::from(*self)
    }
}

impl Expand for bool {
    fn expand(&self) -> Json {
        Json::Bool(*self)
    }
}

impl Expand for f64 {
    fn expand(&self) -> Json {
        serde_json::Number::from_f64(*self).map_or(Json::Null, Json::Number)
    }
}

impl<T: Expand> Expand for Value<T> {
    fn expand(&self) -> Json {
        match self {
            Value::Value(v) => v.expand(),
            _ => Json::Null,
        }
    }
}

impl<T: Expand> Expand for Vec<T> {
    fn expand(&self) -> Json {
        Json::Array(self.iter().map(Expand::expand).collect())
    }
}

impl<T: Expand> Expand for BTreeSet<T> {
    fn expand(&self) -> Json {
        Json::Array(self.iter().map(Expand::expand).collect())
    }
}

impl<T: Expand> Expand for BTreeMap<Cow<'_, str>, T> {
    fn expand(&self) -> Json {
        Json::Object(
            self.iter()
                .map(|(k, v)| (k.to_string(), v.expand()))
                .collect(),
        )
    }
}

/// Conversion of an API JSON value into a state value
pub trait FromJson: Sized {
    fn from_json(json: &Json) -> Option<Self>;
}

impl<'a> FromJson for Cow<'a, str> {
    fn from_json(json: &Json) -> Option<Self> {
        match json {
            Json::String(s) => Some(Cow::Owned(s.clone())),
            Json::Number(n) => Some(Cow::Owned(n.to_string())),
            Json::Bool(b) => Some(Cow::Owned(b.to_string())),
            _ => None,
        }
    }
}

/// int64 fields are encoded as JSON strings by the APIs
impl FromJson for i64 {
    fn from_json(json: &Json) -> Option<Self> {
        match json {
            Json::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Json::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromJson for bool {
    fn from_json(json: &Json) -> Option<Self> {
        json.as_bool()
    }
}

impl FromJson for f64 {
    fn from_json(json: &Json) -> Option<Self> {
        match json {
            Json::Number(n) => n.as_f64(),
            Json::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl<T: FromJson> FromJson for Value<T> {
    fn from_json(json: &Json) -> Option<Self> {
        Some(T::from_json(json).map_or(Value::Null, Value::Value))
    }
}

impl<T: FromJson> FromJson for Vec<T> {
    fn from_json(json: &Json) -> Option<Self> {
        json.as_array()
            .map(|items| items.iter().filter_map(T::from_json).collect())
    }
}

impl<T: FromJson + Ord> FromJson for BTreeSet<T> {
    fn from_json(json: &Json) -> Option<Self> {
        json.as_array()
            .map(|items| items.iter().filter_map(T::from_json).collect())
    }
}

impl<'a, T: FromJson> FromJson for BTreeMap<Cow<'a, str>, T> {
    fn from_json(json: &Json) -> Option<Self> {
        json.as_object().map(|object| {
            object
                .iter()
                .filter_map(|(k, v)| Some((Cow::Owned(k.clone()), T::from_json(v)?)))
                .collect()
        })
    }
}

/// Read `key` of an API object, null when absent
pub fn flatten<T: FromJson>(obj: &JsonMap, key: &str) -> Value<T> {
    obj.get(key)
        .and_then(T::from_json)
        .map_or(Value::Null, Value::Value)
}

/// Read a nested object of an API response
pub fn object<'j>(obj: &'j JsonMap, key: &str) -> Option<&'j JsonMap> {
    obj.get(key).and_then(Json::as_object)
}

/// Iterate over an array of objects of an API response
pub fn objects<'j>(obj: &'j JsonMap, key: &str) -> impl Iterator<Item = &'j JsonMap> {
    obj.get(key)
        .and_then(Json::as_array)
        .into_iter()
        .flatten()
        .filter_map(Json::as_object)
}

/// Expand the known elements of a list block
pub fn expand_blocks<T>(blocks: &ValueList<Value<T>>, expand: impl Fn(&T) -> Json) -> Json {
    Json::Array(
        blocks
            .iter()
            .flatten()
            .filter_map(Value::as_ref_option)
            .map(expand)
            .collect(),
    )
}

/// Read a list block back from an array of API objects
pub fn flatten_blocks<T>(obj: &JsonMap, key: &str, flatten: impl Fn(&JsonMap) -> T) -> ValueList<Value<T>> {
    Value::Value(objects(obj, key).map(|item| Value::Value(flatten(item))).collect())
}

/// int64 values are sent as strings
pub fn expand_int64(value: &ValueNumber) -> Json {
    match value {
        Value::Value(v) => Json::String(v.to_string()),
        _ => Json::Null,
    }
}

/// Mirror of the SDK emptiness check: empty values are left out of request bodies
pub fn is_empty_value(json: &Json) -> bool {
    match json {
        Json::Null => true,
        Json::Bool(b) => !b,
        Json::Number(n) => n.as_f64() == Some(0.0),
        Json::String(s) => s.is_empty(),
        Json::Array(a) => a.is_empty(),
        Json::Object(o) => o.is_empty(),
    }
}

/// Insert `value` under `key` unless it is empty
pub fn put(obj: &mut JsonMap, key: &str, value: Json) {
    if !is_empty_value(&value) {
        obj.insert(key.to_owned(), value);
    }
}

/// Insert `value` under `key` unless it is null, keeping explicit `false` and `0`
pub fn put_set(obj: &mut JsonMap, key: &str, value: Json) {
    if !value.is_null() {
        obj.insert(key.to_owned(), value);
    }
}

/// Turn a nested object into a JSON value, null when it has no field set
pub fn nested(obj: JsonMap) -> Json {
    if obj.is_empty() {
        Json::Null
    } else {
        Json::Object(obj)
    }
}

/// Known entries of a string map attribute
pub fn string_map(value: &ValueMap<'_, ValueString<'_>>) -> BTreeMap<String, String> {
    value
        .iter()
        .flatten()
        .filter_map(|(k, v)| Some((k.to_string(), v.as_deref_option()?.to_owned())))
        .collect()
}

pub fn value_map<'a>(map: BTreeMap<String, String>) -> ValueMap<'a, ValueString<'a>> {
    Value::Value(
        map.into_iter()
            .map(|(k, v)| (Cow::Owned(k), Value::Value(Cow::Owned(v))))
            .collect(),
    )
}

/// Keep the state value when it only differs from the API one by its format
///
/// Used for fields the API canonicalises, such as project ids returned as numbers.
pub fn keep_if_equivalent<'a>(
    state: &ValueString<'a>,
    api: ValueString<'a>,
    equivalent: impl Fn(&str, &str) -> bool,
) -> ValueString<'a> {
    let keep = matches!(
        (state, &api),
        (Value::Value(old), Value::Value(new)) if equivalent(old, new)
    );
    if keep {
        state.clone()
    } else {
        api
    }
}

/// Read a field the API leaves out when it holds its zero value
///
/// An absent field keeps a zero value of the state, such as an explicit `false`.
pub fn flatten_or_zero<T>(current: &Value<T>, obj: &JsonMap, key: &str) -> Value<T>
where
    T: FromJson + Default + PartialEq + Clone,
{
    match flatten(obj, key) {
        Value::Null => match current {
            Value::Value(v) if *v == T::default() => current.clone(),
            _ => Value::Null,
        },
        value => value,
    }
}

/// Read back an optional nested block
///
/// A block absent from the state stays absent, so that server defaults do not show
/// up as changes. Unknown blocks, as left by imports, and blocks under a block being
/// filled (`fill`) are read in full when the API returns them. `flatten` receives
/// whether the block is read in full.
pub fn flatten_block<T: Default>(
    state: &mut Value<T>,
    api: Option<&JsonMap>,
    fill: bool,
    flatten: impl FnOnce(&mut T, &JsonMap, bool),
) {
    match state {
        Value::Value(block) => {
            let empty = JsonMap::new();
            flatten(block, api.unwrap_or(&empty), false);
        }
        Value::Null if !fill => {}
        _ => match api.filter(|obj| !obj.is_empty()) {
            Some(obj) => {
                let mut block = T::default();
                flatten(&mut block, obj, true);
                *state = Value::Value(block);
            }
            None => *state = Value::Null,
        },
    }
}
