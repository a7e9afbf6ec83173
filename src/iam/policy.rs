use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::transport::JsonMap;

/// Policy version requested and written, needed for conditional bindings
pub const IAM_POLICY_VERSION: i64 = 3;

/// IAM policy of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub version: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audit_configs: Vec<AuditConfig>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,
}

impl Policy {
    /// Policy returned by a `getIamPolicy` call
    pub fn from_response(res: JsonMap) -> Result<Self> {
        serde_json::from_value(serde_json::Value::Object(res)).context("invalid IAM policy")
    }

    /// Policy as the `policy` field of a `setIamPolicy` request
    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).context("cannot serialize IAM policy")
    }
}

fn is_zero(version: &i64) -> bool {
    *version == 0
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Expr>,
}

/// Condition of a binding
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Expr {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expression: String,
}

impl Expr {
    pub fn is_empty(&self) -> bool {
        self == &Expr::default()
    }

    fn sort_key(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!("{}/{}/{}", self.title, self.description, self.expression)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    pub service: String,
    #[serde(default)]
    pub audit_log_configs: Vec<AuditLogConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogConfig {
    pub log_type: String,
    #[serde(default)]
    pub exempted_members: Vec<String>,
}

/// Members of every (role, condition) pair of a policy
pub type BindingsMap = BTreeMap<(String, Expr), BTreeSet<String>>;

/// Exempted members per log type, per service
pub type AuditConfigsMap = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;

fn binding_key(binding: &Binding) -> (String, Expr) {
    (
        binding.role.clone(),
        binding.condition.clone().unwrap_or_default(),
    )
}

fn is_case_sensitive(member: &str) -> bool {
    member.contains("allAuthenticatedUsers")
        || member.contains("allUsers")
        || member.starts_with("principalSet:")
        || member.starts_with("principal:")
        || member.starts_with("principalHierarchy:")
}

/// Lowercase the identity part of a member, as the API does
///
/// `deleted:user:Foo@example.com?uid=123` keeps its prefixes, and special
/// identifiers such as `allUsers` or `principal:` are left untouched.
pub fn normalize_iam_member_casing(member: &str) -> String {
    if let Some(rest) = member.strip_prefix("deleted:") {
        let mut pieces: Vec<String> = member.splitn(3, ':').map(str::to_owned).collect();
        if pieces.len() > 2 && !is_case_sensitive(rest) {
            pieces[2] = pieces[2].to_lowercase();
        }
        pieces.join(":")
    } else if is_case_sensitive(member) {
        member.to_owned()
    } else {
        match member.split_once(':') {
            Some((kind, identity)) => format!("{kind}:{}", identity.to_lowercase()),
            None => member.to_owned(),
        }
    }
}

/// Group the members of `bindings` by role and condition
///
/// Members are normalized and pairs without members are dropped.
pub fn create_iam_bindings_map(bindings: &[Binding]) -> BindingsMap {
    let mut map = BindingsMap::new();
    for binding in bindings {
        let key = binding_key(binding);
        let members = map.entry(key.clone()).or_default();
        members.extend(
            binding
                .members
                .iter()
                .map(|m| normalize_iam_member_casing(m)),
        );
        if members.is_empty() {
            map.remove(&key);
        }
    }
    map
}

/// Bindings of a map, ordered by role then condition
pub fn list_from_iam_binding_map(map: &BindingsMap) -> Vec<Binding> {
    let mut bindings: Vec<Binding> = map
        .iter()
        .filter(|(_, members)| !members.is_empty())
        .map(|((role, condition), members)| Binding {
            role: role.clone(),
            members: members.iter().cloned().collect(),
            condition: (!condition.is_empty()).then(|| condition.clone()),
        })
        .collect();
    bindings.sort_by_cached_key(|b| {
        let condition = b.condition.as_ref().map(Expr::sort_key).unwrap_or_default();
        format!("{}{condition}", b.role)
    });
    bindings
}

/// Collapse bindings sharing a role and condition into one
pub fn merge_bindings(bindings: &[Binding]) -> Vec<Binding> {
    list_from_iam_binding_map(&create_iam_bindings_map(bindings))
}

/// Remove the binding of a role and condition
pub fn filter_bindings_with_role_and_condition(
    bindings: &[Binding],
    role: &str,
    condition: Option<&Expr>,
) -> Vec<Binding> {
    let mut map = create_iam_bindings_map(bindings);
    map.remove(&(role.to_owned(), condition.cloned().unwrap_or_default()));
    list_from_iam_binding_map(&map)
}

/// Remove the members of `to_remove` from `bindings`
pub fn subtract_from_bindings(bindings: &[Binding], to_remove: &[Binding]) -> Vec<Binding> {
    let mut map = create_iam_bindings_map(bindings);
    for (key, removed) in create_iam_bindings_map(to_remove) {
        let Some(members) = map.get_mut(&key) else {
            continue;
        };
        for member in &removed {
            members.remove(member);
        }
        if members.is_empty() {
            map.remove(&key);
        }
    }
    list_from_iam_binding_map(&map)
}

/// Bindings present in only one of `a` and `b`, member by member
pub fn missing_bindings(a: &[Binding], b: &[Binding]) -> Vec<Binding> {
    let a = create_iam_bindings_map(a);
    let b = create_iam_bindings_map(b);
    let mut missing = BindingsMap::new();
    for (key, a_members) in &a {
        let diff: BTreeSet<String> = match b.get(key) {
            Some(b_members) => a_members
                .symmetric_difference(b_members)
                .cloned()
                .collect(),
            None => a_members.clone(),
        };
        if !diff.is_empty() {
            missing.insert(key.clone(), diff);
        }
    }
    for (key, b_members) in &b {
        if !a.contains_key(key) {
            missing.insert(key.clone(), b_members.clone());
        }
    }
    list_from_iam_binding_map(&missing)
}

pub fn create_iam_audit_configs_map(audit_configs: &[AuditConfig]) -> AuditConfigsMap {
    let mut map = AuditConfigsMap::new();
    for config in audit_configs {
        let log_types = map.entry(config.service.clone()).or_default();
        for log_config in &config.audit_log_configs {
            log_types
                .entry(log_config.log_type.clone())
                .or_default()
                .extend(log_config.exempted_members.iter().cloned());
        }
    }
    map
}

pub fn list_from_iam_audit_config_map(map: &AuditConfigsMap) -> Vec<AuditConfig> {
    map.iter()
        .filter(|(_, log_types)| !log_types.is_empty())
        .map(|(service, log_types)| AuditConfig {
            service: service.clone(),
            audit_log_configs: log_types
                .iter()
                .map(|(log_type, members)| AuditLogConfig {
                    log_type: log_type.clone(),
                    exempted_members: members.iter().cloned().collect(),
                })
                .collect(),
        })
        .collect()
}

/// Merge the audit configs of a service, unioning exempted members per log type
pub fn merge_audit_configs(audit_configs: &[AuditConfig]) -> Vec<AuditConfig> {
    list_from_iam_audit_config_map(&create_iam_audit_configs_map(audit_configs))
}

pub fn remove_all_audit_configs_with_service(
    audit_configs: &[AuditConfig],
    service: &str,
) -> Vec<AuditConfig> {
    let mut map = create_iam_audit_configs_map(audit_configs);
    map.remove(service);
    list_from_iam_audit_config_map(&map)
}

/// Whether two policies grant the same access, regardless of binding order
pub fn compare_iam_policies(a: &Policy, b: &Policy) -> bool {
    a.etag == b.etag
        && a.version == b.version
        && create_iam_bindings_map(&a.bindings) == create_iam_bindings_map(&b.bindings)
        && create_iam_audit_configs_map(&a.audit_configs)
            == create_iam_audit_configs_map(&b.audit_configs)
}
