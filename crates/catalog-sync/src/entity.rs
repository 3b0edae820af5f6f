use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::FetchError;
use crate::schema::{
    AlertStatusType, ContactType, NodeList, ServiceCreationSource, ServiceNode,
};

/// A service as held by the local catalog.
///
/// `id` is the only identity. Aliases are human-friendly names that the
/// upstream may change between syncs and are never used as a key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub framework: Option<String>,
    pub product: Option<String>,
    pub note: Option<String>,
    pub html_url: Option<String>,
    pub locked: bool,
    pub has_config_error: bool,
    pub creation_source: Option<ServiceCreationSource>,
    pub owner: Option<Owner>,
    pub tags: BTreeSet<Tag>,
    pub tools: Vec<Tool>,
    pub last_deploy: Option<Deploy>,
    pub on_calls: Vec<OnCall>,
    pub alert_status: Option<AlertStatus>,
    pub repository: Option<Repository>,
    pub checks: Option<CheckStats>,
    pub level: Option<Classification>,
    pub tier: Option<Classification>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Owner {
    pub name: String,
    pub href: Option<String>,
    pub contacts: Vec<Contact>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Contact {
    pub kind: ContactType,
    pub display_name: Option<String>,
    pub target_href: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tool {
    pub id: String,
    pub category: Option<String>,
    pub name: Option<String>,
    pub environment: Option<String>,
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Deploy {
    pub deployed_at: Option<String>,
    pub commit_sha: Option<String>,
    pub author: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OnCall {
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AlertStatus {
    pub kind: AlertStatusType,
    pub index: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Repository {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckStats {
    pub total: i64,
    pub passing: i64,
}

impl CheckStats {
    pub fn pass_ratio(&self) -> Option<f64> {
        if self.total <= 0 {
            return None;
        }

        Some(self.passing as f64 / self.total as f64)
    }
}

/// Read-only ordinal projection from the upstream rubric (level, tier).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub index: Option<i64>,
    pub name: Option<String>,
}

impl Entity {
    pub fn normalize(node: ServiceNode) -> Result<Self, FetchError> {
        if node.id.trim().is_empty() {
            return Err(FetchError::Protocol(format!(
                "service {:?} has an empty id",
                node.name
            )));
        }
        if node.name.trim().is_empty() {
            return Err(FetchError::Protocol(format!(
                "service {} has an empty name",
                node.id
            )));
        }

        let tags = NodeList::into_present(node.tags)
            .map(|t| Tag {
                key: t.key,
                value: t.value,
            })
            .collect();

        let tools = NodeList::into_present(node.tools)
            .map(|t| Tool {
                id: t.id,
                category: t.display_category,
                name: t.display_name,
                environment: t.environment,
                url: t.url,
            })
            .collect();

        let on_calls = NodeList::into_present(node.on_calls)
            .map(|o| OnCall {
                name: o.name,
                email: o.external_email,
                avatar_url: o.gravatar_href,
            })
            .collect();

        let owner = node.owner.map(|team| Owner {
            name: team.name,
            href: team.href,
            contacts: team
                .contacts
                .unwrap_or_default()
                .into_iter()
                .map(|c| Contact {
                    kind: c.kind,
                    display_name: c.display_name,
                    target_href: c.target_href,
                })
                .collect(),
        });

        // levelIndex is the authoritative index; the rubric carries the name
        let rubric_level = node
            .service_level
            .and_then(|s| s.rubric)
            .and_then(|r| r.level);
        let level = match (node.level_index, rubric_level) {
            (None, None) => None,
            (index, rubric) => Some(Classification {
                index: index.or_else(|| rubric.as_ref().and_then(|l| l.index)),
                name: rubric.and_then(|l| l.name),
            }),
        };

        let mut aliases = node.aliases;
        if let Some(alias) = node.alias {
            if !aliases.contains(&alias) {
                aliases.insert(0, alias);
            }
        }

        Ok(Self {
            id: node.id,
            name: node.name,
            aliases,
            description: node.description,
            language: node.language,
            framework: node.framework,
            product: node.product,
            note: node.note,
            html_url: node.html_url,
            locked: node.locked,
            has_config_error: node.has_service_config_error,
            creation_source: node.creation_source,
            owner,
            tags,
            tools,
            last_deploy: node.last_deploy.map(|d| Deploy {
                deployed_at: d.deployed_at,
                commit_sha: d.commit_sha,
                author: d.author,
            }),
            on_calls,
            alert_status: node.alert_status.map(|a| AlertStatus {
                kind: a.kind,
                index: a.index,
            }),
            repository: node
                .default_service_repository
                .and_then(|r| r.repository)
                .map(|r| Repository {
                    name: r.display_name,
                    url: r.url,
                }),
            checks: node.service_stat.map(|s| CheckStats {
                total: s.num_checks,
                passing: s.num_passing_checks,
            }),
            level,
            tier: node.tier.map(|t| Classification {
                index: t.index,
                name: t.name,
            }),
        })
    }

    pub fn tag(&self, key: &str) -> impl Iterator<Item = &str> {
        let key = key.to_string();
        self.tags
            .iter()
            .filter(move |t| t.key == key)
            .map(|t| t.value.as_str())
    }

    pub fn tools_in(&self, environment: &str) -> impl Iterator<Item = &Tool> {
        let environment = environment.to_string();
        self.tools
            .iter()
            .filter(move |t| t.environment.as_deref() == Some(environment.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schema::ServiceNode;

    fn node(json: serde_json::Value) -> ServiceNode {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn normalizes_full_node() {
        let entity = Entity::normalize(node(serde_json::json!({
            "id": "Z2lkOi8vb3BzbGV2ZWwvU2VydmljZS8x",
            "alias": "checkout",
            "name": "Checkout",
            "aliases": ["checkout", "checkout-api"],
            "language": "Rust",
            "owner": {"name": "Payments", "href": "/teams/payments", "contacts": [
                {"displayName": "#payments", "targetHref": "https://slack/payments", "type": "slack"}
            ]},
            "tier": {"name": "Tier 1", "index": 1},
            "level_index": 3,
            "service_level": {"rubric": {"level": {"index": 3, "name": "Gold"}}},
            "tags": {"nodes": [
                {"plainId": 1, "id": "t1", "key": "env", "value": "prod"},
                null,
                {"plainId": 2, "id": "t2", "key": "env", "value": "prod"}
            ]},
            "tools": {"nodes": [
                {"id": "x", "displayCategory": "logs", "displayName": "Kibana", "environment": "prod", "url": "https://logs"},
                null
            ]},
            "service_stat": {"num_checks": 4, "num_passing_checks": 3},
            "lastDeploy": {"deployedAt": "2024-01-02T03:04:05Z", "commitSha": "abc", "author": "ci"},
            "alertStatus": {"index": 2, "type": "warn"},
            "onCalls": {"nodes": [{"name": "Ana", "externalEmail": "ana@example.com", "gravatarHref": null}, null]},
            "defaultServiceRepository": {"repository": {"displayName": "org/checkout", "url": "https://git/org/checkout"}}
        })))
        .unwrap();

        assert_eq!(entity.name, "Checkout");
        assert_eq!(entity.aliases, vec!["checkout", "checkout-api"]);
        assert_eq!(entity.tags.len(), 1);
        assert_eq!(entity.tag("env").collect::<Vec<_>>(), vec!["prod"]);
        assert_eq!(entity.tools_in("prod").count(), 1);
        assert_eq!(entity.on_calls.len(), 1);
        assert_eq!(
            entity.level,
            Some(Classification {
                index: Some(3),
                name: Some("Gold".into())
            })
        );
        assert_eq!(entity.checks.and_then(|c| c.pass_ratio()), Some(0.75));
        assert_eq!(
            entity.alert_status,
            Some(AlertStatus {
                kind: AlertStatusType::Warn,
                index: 2
            })
        );
        assert_eq!(entity.owner.unwrap().contacts[0].kind, ContactType::Slack);
        assert_eq!(entity.repository.unwrap().name, "org/checkout");
    }

    #[test]
    fn primary_alias_is_kept_first() {
        let entity = Entity::normalize(node(serde_json::json!({
            "id": "1", "name": "Search", "alias": "search", "aliases": ["search-v2"]
        })))
        .unwrap();

        assert_eq!(entity.aliases, vec!["search", "search-v2"]);
    }

    #[test]
    fn missing_optional_blocks_normalize_to_empty() {
        let entity = Entity::normalize(node(serde_json::json!({"id": "1", "name": "Bare"}))).unwrap();

        assert!(entity.tags.is_empty());
        assert!(entity.tools.is_empty());
        assert!(entity.owner.is_none());
        assert!(entity.level.is_none());
    }

    #[test]
    fn empty_name_is_a_protocol_error() {
        let err = Entity::normalize(node(serde_json::json!({"id": "1", "name": " "}))).unwrap_err();

        assert!(matches!(err, FetchError::Protocol(_)));
    }

    #[test]
    fn no_checks_has_no_ratio() {
        assert_eq!(CheckStats { total: 0, passing: 0 }.pass_ratio(), None);
    }
}
