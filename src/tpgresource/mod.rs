//! Helpers shared by every resource: templates, import ids, labels and field conversions

use anyhow::Result;
use tf_provider::value::{Value, ValueString};

use crate::config::Config;

mod duration;
mod fields;
mod import;
mod labels;
mod template;

pub use duration::parse_duration;
pub use fields::{
    expand_blocks, expand_int64, flatten, flatten_block, flatten_blocks, flatten_or_zero,
    is_empty_value, keep_if_equivalent, nested, object, objects, put, put_set, string_map,
    value_map, Expand, FromJson,
};
pub use import::parse_import_id;
pub use labels::{flatten_labels, plan_labels, Labels};
pub use template::{get_resource_name_from_self_link, replace_vars, replace_vars_for_id, Vars};

/// Project of a resource: its own `project` field, otherwise the provider project
pub fn get_project(project: &ValueString<'_>, config: &Config) -> Result<String> {
    match project.as_deref_option() {
        Some(project) if !project.is_empty() => Ok(project.to_owned()),
        _ => config.project().map(str::to_owned),
    }
}

/// Fill an unset `project` field with the provider project during plans
pub fn default_project<'a>(project: &mut ValueString<'a>, config: &Config) {
    if project.is_null() {
        if let Some(default) = config.project.as_deref().filter(|p| !p.is_empty()) {
            *project = Value::from(default.to_owned());
        }
    }
}

/// Whether two resource names only differ by a project given as id in one and number in the other
///
/// `old` is the value held by the state, `new` the one returned by the API.
pub fn project_number_equivalent(old: &str, new: &str) -> bool {
    let old: Vec<&str> = old.split('/').collect();
    let new: Vec<&str> = new.split('/').collect();
    old.len() == new.len()
        && old.iter().zip(&new).enumerate().all(|(i, (a, b))| {
            a == b
                || (i > 0
                    && old[i - 1] == "projects"
                    && new[i - 1] == "projects"
                    && (a.bytes().all(|c| c.is_ascii_digit())
                        || b.bytes().all(|c| c.is_ascii_digit())))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TokenSource;

    #[test]
    fn project_resolution() {
        let mut config = Config::new(TokenSource::fixed("t"), reqwest::Client::new());
        assert!(get_project(&Value::Null, &config).is_err());

        config.project = Some("provider".to_owned());
        assert_eq!(get_project(&Value::Null, &config).unwrap(), "provider");
        assert_eq!(
            get_project(&ValueString::from("resource"), &config).unwrap(),
            "resource"
        );

        let mut project = ValueString::Null;
        default_project(&mut project, &config);
        assert_eq!(project.as_str(), "provider");

        let mut unknown = ValueString::Unknown;
        default_project(&mut unknown, &config);
        assert!(unknown.is_unknown());
    }

    #[test]
    fn project_numbers() {
        assert!(project_number_equivalent(
            "projects/my-project/regions/us-central1/subnetworks/default",
            "projects/123456/regions/us-central1/subnetworks/default",
        ));
        assert!(!project_number_equivalent(
            "projects/my-project/regions/us-central1/subnetworks/default",
            "projects/other/regions/us-central1/subnetworks/default",
        ));
        assert!(!project_number_equivalent(
            "projects/123/regions/us-central1/subnetworks/a",
            "projects/123/regions/us-central1/subnetworks/b",
        ));
    }
}
