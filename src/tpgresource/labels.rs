use std::borrow::Cow;
use std::collections::BTreeMap;

use tf_provider::value::{Value, ValueMap, ValueString};

use super::fields::{string_map, value_map};
use crate::config::{AttributionStrategy, Config, ATTRIBUTION_KEY, ATTRIBUTION_VALUE};
use crate::transport::JsonMap;

/// Labels of a resource as stored in the state
pub type Labels<'a> = ValueMap<'a, ValueString<'a>>;

fn is_fully_known(labels: &Labels<'_>) -> bool {
    match labels {
        Value::Value(map) => map.values().all(|v| !v.is_unknown()),
        Value::Null => true,
        Value::Unknown => false,
    }
}

/// Compute `terraform_labels` and `effective_labels` for a plan
///
/// `prior` holds the prior `terraform_labels` and `effective_labels`, and is `None`
/// when the resource is being created.
pub fn plan_labels<'a>(
    config: &Config,
    labels: &Labels<'a>,
    terraform_labels: &mut Labels<'a>,
    effective_labels: &mut Labels<'a>,
    prior: Option<(&Labels<'a>, &Labels<'a>)>,
) {
    if !is_fully_known(labels) {
        *terraform_labels = Value::Unknown;
        *effective_labels = Value::Unknown;
        return;
    }

    let mut planned = config.default_labels.clone();
    if config.add_terraform_attribution_label {
        let already_attributed = prior.is_some_and(|(_, effective)| {
            effective
                .as_ref_option()
                .is_some_and(|map| map.contains_key(ATTRIBUTION_KEY))
        });
        if prior.is_none()
            || already_attributed
            || config.attribution_strategy == AttributionStrategy::Proactive
        {
            planned.insert(ATTRIBUTION_KEY.to_owned(), ATTRIBUTION_VALUE.to_owned());
        }
    }
    planned.extend(string_map(labels));

    *effective_labels = match prior {
        None => value_map(planned.clone()),
        Some((_, Value::Unknown)) => Value::Unknown,
        Some((old_terraform, old_effective)) => {
            let mut effective = string_map(old_effective);
            for key in string_map(old_terraform).keys() {
                if !planned.contains_key(key) {
                    effective.remove(key);
                }
            }
            effective.extend(planned.clone());
            value_map(effective)
        }
    };
    *terraform_labels = value_map(planned);
}

/// Fill the label trio from the labels returned by the API
///
/// `labels` and `terraform_labels` only keep the keys they already manage, while
/// `effective_labels` gets every label present on the resource.
pub fn flatten_labels<'a>(
    api_labels: Option<&JsonMap>,
    labels: &mut Labels<'a>,
    terraform_labels: &mut Labels<'a>,
    effective_labels: &mut Labels<'a>,
) {
    let all: BTreeMap<String, String> = api_labels
        .into_iter()
        .flatten()
        .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_owned())))
        .collect();

    let keep = |managed: &Labels<'a>| -> BTreeMap<Cow<'a, str>, ValueString<'a>> {
        managed
            .iter()
            .flatten()
            .filter_map(|(key, _)| {
                let value = all.get(&**key)?;
                Some((key.clone(), Value::Value(Cow::Owned(value.clone()))))
            })
            .collect()
    };

    if labels.is_value() {
        *labels = Value::Value(keep(labels));
    }
    *terraform_labels = Value::Value(keep(terraform_labels));
    *effective_labels = value_map(all);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::TokenSource;

    fn labels(entries: &[(&'static str, &'static str)]) -> Labels<'static> {
        Value::Value(
            entries
                .iter()
                .map(|(k, v)| (Cow::Borrowed(*k), Value::from(*v)))
                .collect(),
        )
    }

    fn config() -> Config {
        let mut config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        config.default_labels = BTreeMap::from([
            ("team".to_owned(), "infra".to_owned()),
            ("env".to_owned(), "default".to_owned()),
        ]);
        config
    }

    #[test]
    fn create_merges_default_labels() {
        let mut terraform = Value::Null;
        let mut effective = Value::Null;
        plan_labels(
            &config(),
            &labels(&[("env", "prod")]),
            &mut terraform,
            &mut effective,
            None,
        );
        let expected = labels(&[
            ("env", "prod"),
            ("goog-terraform-provisioned", "true"),
            ("team", "infra"),
        ]);
        assert_eq!(terraform, expected);
        assert_eq!(effective, expected);
    }

    #[test]
    fn update_keeps_unmanaged_labels() {
        let mut config = config();
        config.default_labels.clear();
        let old_terraform = labels(&[("a", "1"), ("b", "2")]);
        let old_effective = labels(&[("a", "1"), ("b", "2"), ("server", "x")]);

        let mut terraform = old_terraform.clone();
        let mut effective = old_effective.clone();
        plan_labels(
            &config,
            &labels(&[("a", "10")]),
            &mut terraform,
            &mut effective,
            Some((&old_terraform, &old_effective)),
        );
        assert_eq!(terraform, labels(&[("a", "10")]));
        assert_eq!(effective, labels(&[("a", "10"), ("server", "x")]));
    }

    #[test]
    fn attribution_only_on_creation() {
        let mut config = config();
        config.default_labels.clear();
        let old = labels(&[("a", "1")]);

        let mut terraform = Value::Null;
        let mut effective = Value::Null;
        plan_labels(
            &config,
            &labels(&[("a", "1")]),
            &mut terraform,
            &mut effective,
            Some((&old, &old)),
        );
        assert_eq!(terraform, labels(&[("a", "1")]));

        config.attribution_strategy = AttributionStrategy::Proactive;
        plan_labels(
            &config,
            &labels(&[("a", "1")]),
            &mut terraform,
            &mut effective,
            Some((&old, &old)),
        );
        assert_eq!(
            terraform,
            labels(&[("a", "1"), ("goog-terraform-provisioned", "true")])
        );
    }

    #[test]
    fn unknown_labels() {
        let mut terraform = Value::Null;
        let mut effective = Value::Null;
        plan_labels(
            &config(),
            &Value::Unknown,
            &mut terraform,
            &mut effective,
            None,
        );
        assert!(terraform.is_unknown());
        assert!(effective.is_unknown());
    }

    #[test]
    fn flatten_keeps_managed_keys() {
        let api = json!({"a": "1", "team": "infra", "server": "x"});
        let mut user = labels(&[("a", "0")]);
        let mut terraform = labels(&[("a", "0"), ("team", "infra")]);
        let mut effective = Value::Null;
        flatten_labels(api.as_object(), &mut user, &mut terraform, &mut effective);

        assert_eq!(user, labels(&[("a", "1")]));
        assert_eq!(terraform, labels(&[("a", "1"), ("team", "infra")]));
        assert_eq!(
            effective,
            labels(&[("a", "1"), ("server", "x"), ("team", "infra")])
        );

        let mut unset = Value::Null;
        flatten_labels(api.as_object(), &mut unset, &mut terraform, &mut effective);
        assert!(unset.is_null());
    }
}
