use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Result};
use regex::{Captures, Regex};
use tf_provider::value::{Value, ValueString};

use crate::config::{Config, Service};

const MAX_DEPTH: usize = 10;

/// Field values available to URL and id templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars(BTreeMap<String, String>);

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, ignoring empty values
    pub fn with(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add a field from a state attribute, ignoring null and unknown values
    pub fn with_value(self, key: &str, value: &ValueString<'_>) -> Self {
        match value {
            Value::Value(v) => self.with(key, v),
            _ => self,
        }
    }

    pub fn insert(&mut self, key: &str, value: impl AsRef<str>) {
        let value = value.as_ref();
        if !value.is_empty() {
            self.0.insert(key.to_owned(), value.to_owned());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Field as a state attribute, null when absent
    pub fn value<'a>(&self, key: &str) -> ValueString<'a> {
        self.get(key)
            .map_or(Value::Null, |value| Value::from(value.to_owned()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Vars {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .filter(|(_, v): &(String, String)| !v.is_empty())
                .collect(),
        )
    }
}

fn placeholder() -> Result<&'static Regex> {
    static PLACEHOLDER: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{(%?)(\w+)\}\}"))
        .as_ref()
        .map_err(|err| anyhow!("invalid placeholder pattern: {err}"))
}

/// Expand `{{field}}` and `{{%field}}` placeholders in a URL template
///
/// `{{%field}}` is path-escaped. `project`, `region` and `zone` fall back to the
/// provider configuration, and `{{<Service>BasePath}}` to the configured endpoints.
pub fn replace_vars(template: &str, vars: &Vars, config: &Config) -> Result<String> {
    replace_vars_recursive(template, vars, config, false)
}

/// Like [`replace_vars`], but only keeps the last path segment of field values
///
/// Lets id templates such as `projects/{{project}}/agent` accept fields given as full names.
pub fn replace_vars_for_id(template: &str, vars: &Vars, config: &Config) -> Result<String> {
    replace_vars_recursive(template, vars, config, true)
}

fn replace_vars_recursive(
    template: &str,
    vars: &Vars,
    config: &Config,
    shorten: bool,
) -> Result<String> {
    let re = placeholder()?;
    let mut current = template.to_owned();
    for _ in 0..=MAX_DEPTH {
        if !re.is_match(&current) {
            return Ok(current);
        }
        let mut missing = None;
        let replaced = re.replace_all(&current, |caps: &Captures| {
            let escape = &caps[1] == "%";
            let name = &caps[2];
            match lookup(name, vars, config) {
                Some(value) if escape => urlencoding::encode(value).into_owned(),
                Some(value) if shorten && vars.get(name).is_some() => {
                    get_resource_name_from_self_link(value).to_owned()
                }
                Some(value) => value.to_owned(),
                None => {
                    missing.get_or_insert_with(|| name.to_owned());
                    String::new()
                }
            }
        });
        if let Some(name) = missing {
            bail!("{name}: required field is not set");
        }
        current = replaced.into_owned();
    }
    Err(anyhow!("recursive substitution detected in {template:?}"))
}

fn lookup<'v>(name: &str, vars: &'v Vars, config: &'v Config) -> Option<&'v str> {
    if let Some(value) = vars.get(name) {
        return Some(value);
    }
    let fallback = match name {
        "project" => config.project.as_deref(),
        "region" => config.region.as_deref(),
        "zone" => config.zone.as_deref(),
        _ => Service::from_base_path_key(name).map(|service| config.base_path(service)),
    };
    fallback.filter(|v| !v.is_empty())
}

/// Last segment of a resource name or self link
pub fn get_resource_name_from_self_link(link: &str) -> &str {
    link.rsplit('/').next().unwrap_or(link)
}
