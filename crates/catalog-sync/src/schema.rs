//! Wire records for the upstream `servicesV2` connection.
//!
//! These mirror the selection made by the documents in [`crate::queries`]
//! and nothing more. Nested `nodes` lists may be null or contain null
//! entries, exactly as the upstream schema allows.

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServicesData {
    pub account: Option<AccountServices>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AccountServices {
    #[serde(rename = "servicesV2")]
    pub services_v2: Option<ServiceConnection>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConnection {
    /// Optional here so a missing block surfaces as a protocol error.
    pub page_info: Option<PageInfo>,
    pub nodes: Option<Vec<Option<ServiceNode>>>,
    pub total_count: Option<i64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceNode {
    pub id: String,
    pub alias: Option<String>,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub product: Option<String>,
    pub language: Option<String>,
    pub framework: Option<String>,
    pub note: Option<String>,
    pub href: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub linkable: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub has_service_config_error: bool,
    pub creation_source: Option<ServiceCreationSource>,
    #[serde(rename = "level_index")]
    pub level_index: Option<i64>,
    pub owner: Option<TeamNode>,
    pub tier: Option<TierNode>,
    pub tags: Option<NodeList<TagNode>>,
    #[serde(rename = "service_stat")]
    pub service_stat: Option<CheckStatsNode>,
    pub last_deploy: Option<DeployNode>,
    #[serde(rename = "service_level")]
    pub service_level: Option<ServiceLevelNode>,
    pub tools: Option<NodeList<ToolNode>>,
    pub alert_status: Option<AlertStatusNode>,
    pub on_calls: Option<NodeList<OnCallNode>>,
    pub default_service_repository: Option<ServiceRepositoryNode>,
}

/// A nested connection selected only for its `nodes`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct NodeList<T> {
    pub nodes: Option<Vec<Option<T>>>,
}

impl<T> NodeList<T> {
    pub fn into_present(list: Option<Self>) -> impl Iterator<Item = T> {
        list.and_then(|l| l.nodes)
            .unwrap_or_default()
            .into_iter()
            .flatten()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamNode {
    pub name: String,
    pub href: Option<String>,
    pub contacts: Option<Vec<ContactNode>>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContactNode {
    pub display_name: Option<String>,
    pub target_href: Option<String>,
    #[serde(rename = "type")]
    pub kind: ContactType,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TierNode {
    pub name: Option<String>,
    pub index: Option<i64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TagNode {
    pub id: Option<String>,
    pub plain_id: Option<i64>,
    pub key: String,
    pub value: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CheckStatsNode {
    pub num_checks: i64,
    pub num_passing_checks: i64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeployNode {
    pub deployed_at: Option<String>,
    pub commit_sha: Option<String>,
    pub author: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServiceLevelNode {
    pub rubric: Option<RubricNode>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RubricNode {
    pub level: Option<LevelNode>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LevelNode {
    pub index: Option<i64>,
    pub name: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolNode {
    pub id: String,
    pub display_category: Option<String>,
    pub display_name: Option<String>,
    pub environment: Option<String>,
    pub url: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AlertStatusNode {
    pub index: i64,
    #[serde(rename = "type")]
    pub kind: AlertStatusType,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnCallNode {
    pub name: String,
    pub external_email: Option<String>,
    pub gravatar_href: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServiceRepositoryNode {
    pub repository: Option<RepositoryNode>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryNode {
    pub display_name: String,
    pub url: Option<String>,
}

/// The monitor status level.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatusType {
    Alert,
    NoData,
    Ok,
    Warn,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
    Email,
    Github,
    Slack,
    SlackHandle,
    Web,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCreationSource {
    RepositoryAnalysis,
    #[serde(other)]
    Unknown,
}

/// Sort possibilities for services.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceSortEnum {
    #[serde(rename = "alert_status_ASC")]
    AlertStatusAsc,
    #[serde(rename = "alert_status_DESC")]
    AlertStatusDesc,
    #[serde(rename = "checks_passing_ASC")]
    ChecksPassingAsc,
    #[serde(rename = "checks_passing_DESC")]
    ChecksPassingDesc,
    #[serde(rename = "last_deploy_ASC")]
    LastDeployAsc,
    #[serde(rename = "last_deploy_DESC")]
    LastDeployDesc,
    #[serde(rename = "level_index_ASC")]
    LevelIndexAsc,
    #[serde(rename = "level_index_DESC")]
    LevelIndexDesc,
    #[serde(rename = "lifecycle_ASC")]
    LifecycleAsc,
    #[serde(rename = "lifecycle_DESC")]
    LifecycleDesc,
    #[default]
    #[serde(rename = "name_ASC")]
    NameAsc,
    #[serde(rename = "name_DESC")]
    NameDesc,
    #[serde(rename = "owner_ASC")]
    OwnerAsc,
    #[serde(rename = "owner_DESC")]
    OwnerDesc,
    #[serde(rename = "product_ASC")]
    ProductAsc,
    #[serde(rename = "product_DESC")]
    ProductDesc,
    #[serde(rename = "tier_ASC")]
    TierAsc,
    #[serde(rename = "tier_DESC")]
    TierDesc,
}

/// Fields that can be used as part of a service filter.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceFilterKey {
    AlertStatus,
    CreationSource,
    DomainId,
    Framework,
    GroupIds,
    Language,
    LevelIndex,
    LifecycleIndex,
    Name,
    OwnerId,
    Product,
    SystemId,
    Tag,
    TierIndex,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterPredicate {
    BelongsTo,
    Contains,
    DoesNotContain,
    DoesNotEqual,
    DoesNotExist,
    EndsWith,
    Equals,
    Exists,
    GreaterThanOrEqualTo,
    LessThanOrEqualTo,
    MatchesRegex,
    SatisfiesVersionConstraint,
    StartsWith,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Connective {
    And,
    Or,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceFilterInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<ServiceFilterKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub predicate: Option<FilterPredicate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connective: Option<Connective>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicates: Option<Vec<ServiceFilterInput>>,
}

impl ServiceFilterInput {
    pub fn new(key: ServiceFilterKey, predicate: FilterPredicate, arg: impl Into<String>) -> Self {
        Self {
            key: Some(key),
            arg: Some(arg.into()),
            predicate: Some(predicate),
            ..Default::default()
        }
    }

    pub fn any(predicates: Vec<ServiceFilterInput>) -> Self {
        Self {
            connective: Some(Connective::Or),
            predicates: Some(predicates),
            ..Default::default()
        }
    }

    pub fn all(predicates: Vec<ServiceFilterInput>) -> Self {
        Self {
            connective: Some(Connective::And),
            predicates: Some(predicates),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn null_entries_survive_decoding() {
        let conn: ServiceConnection = serde_json::from_str(
            r#"{
                "pageInfo": {"endCursor": "MQ", "hasNextPage": true},
                "nodes": [{"id": "a", "name": "A", "aliases": []}, null]
            }"#,
        )
        .unwrap();

        let nodes = conn.nodes.unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[1].is_none());
    }

    #[test]
    fn unknown_enum_values_are_tolerated() {
        let status: AlertStatusNode =
            serde_json::from_str(r#"{"index": 9, "type": "flapping"}"#).unwrap();

        assert_eq!(status.kind, AlertStatusType::Unknown);
    }

    #[test]
    fn node_list_skips_nulls() {
        let list: NodeList<TagNode> = serde_json::from_str(
            r#"{"nodes": [{"key": "env", "value": "prod"}, null, {"key": "team", "value": "core"}]}"#,
        )
        .unwrap();

        let keys: Vec<String> = NodeList::into_present(Some(list)).map(|t| t.key).collect();
        assert_eq!(keys, vec!["env".to_string(), "team".to_string()]);
    }

    #[test]
    fn filters_serialize_upstream_names() {
        let filter = ServiceFilterInput::any(vec![
            ServiceFilterInput::new(ServiceFilterKey::Language, FilterPredicate::Equals, "rust"),
            ServiceFilterInput::new(ServiceFilterKey::Tag, FilterPredicate::Contains, "tier:1"),
        ]);

        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            serde_json::json!({
                "connective": "or",
                "predicates": [
                    {"key": "language", "arg": "rust", "type": "equals"},
                    {"key": "tag", "arg": "tier:1", "type": "contains"}
                ]
            })
        );
    }

    #[test]
    fn sort_serializes_upstream_value() {
        assert_eq!(
            serde_json::to_value(ServiceSortEnum::LastDeployDesc).unwrap(),
            serde_json::json!("last_deploy_DESC")
        );
    }
}
