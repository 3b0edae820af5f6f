//! The two documents sent upstream.
//!
//! Both select the same `Service` fragment so a page from either one
//! normalizes through the same code path.

use graphql_client::QueryBody;
use serde::Serialize;

use crate::core::graphql_client::GraphQLError;
use crate::schema::{ServiceFilterInput, ServiceSortEnum};

macro_rules! service_fragment {
    () => {
        r#"
fragment Service on Service {
  id
  alias
  name
  linkable
  href
  locked
  description
  htmlUrl
  product
  language
  framework
  aliases
  note
  hasServiceConfigError
  creationSource
  level_index: levelIndex
  owner {
    name
    href
    contacts {
      displayName
      targetHref
      type
    }
  }
  tier {
    name
    index
  }
  tags {
    nodes {
      plainId
      id
      key
      value
    }
  }
  service_stat: checkStats {
    num_checks: totalChecks
    num_passing_checks: totalPassingChecks
  }
  lastDeploy {
    deployedAt
    commitSha
    author
  }
  service_level: serviceStats {
    rubric {
      level {
        index
        name
      }
    }
  }
  tools {
    nodes {
      id
      displayCategory
      displayName
      environment
      url
    }
  }
  alertStatus {
    index
    type
  }
  onCalls {
    nodes {
      name
      externalEmail
      gravatarHref
    }
  }
  defaultServiceRepository {
    repository {
      displayName
      url
    }
  }
}
"#
    };
}

pub const GET_ALL_SERVICES_OPERATION: &str = "GetAllServices";

pub const GET_ALL_SERVICES: &str = concat!(
    r#"
query GetAllServices($after: String, $first: Int, $sortBy: ServiceSortEnum, $filter: [ServiceFilterInput!]) {
  account {
    servicesV2(after: $after, first: $first, sortBy: $sortBy, filter: $filter) {
      totalCount
      pageInfo {
        endCursor
        hasNextPage
      }
      nodes {
        ...Service
      }
    }
  }
}
"#,
    service_fragment!()
);

pub const SEARCH_OPERATION: &str = "Search";

pub const SEARCH: &str = concat!(
    r#"
query Search($searchTerm: String!, $after: String, $first: Int, $sortBy: ServiceSortEnum) {
  account {
    servicesV2(searchTerm: $searchTerm, after: $after, first: $first, sortBy: $sortBy) {
      totalCount
      pageInfo {
        endCursor
        hasNextPage
      }
      nodes {
        ...Service
      }
    }
  }
}
"#,
    service_fragment!()
);

/// Variables shared by both documents; unset optionals are left out.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServicesVariables {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    pub first: u32,
    pub sort_by: ServiceSortEnum,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<ServiceFilterInput>>,
}

impl ServicesVariables {
    pub fn into_body(
        self,
        query: &'static str,
        operation_name: &'static str,
    ) -> Result<QueryBody<serde_json::Value>, GraphQLError> {
        let variables = serde_json::to_value(self).map_err(|e| {
            GraphQLError::Request(format!("could not encode {operation_name} variables: {e}"))
        })?;

        Ok(QueryBody {
            variables,
            query,
            operation_name,
        })
    }
}

pub fn get_all_services(
    after: Option<String>,
    first: u32,
    sort_by: ServiceSortEnum,
    filter: Option<Vec<ServiceFilterInput>>,
) -> Result<QueryBody<serde_json::Value>, GraphQLError> {
    ServicesVariables {
        after,
        first,
        sort_by,
        search_term: None,
        filter: filter.filter(|f| !f.is_empty()),
    }
    .into_body(GET_ALL_SERVICES, GET_ALL_SERVICES_OPERATION)
}

pub fn search(
    term: impl Into<String>,
    after: Option<String>,
    first: u32,
    sort_by: ServiceSortEnum,
) -> Result<QueryBody<serde_json::Value>, GraphQLError> {
    ServicesVariables {
        after,
        first,
        sort_by,
        search_term: Some(term.into()),
        filter: None,
    }
    .into_body(SEARCH, SEARCH_OPERATION)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::schema::{FilterPredicate, ServiceFilterKey};

    #[test]
    fn first_page_omits_after() {
        let body = get_all_services(None, 50, ServiceSortEnum::NameAsc, None).unwrap();

        assert_eq!(body.operation_name, "GetAllServices");
        assert_eq!(
            body.variables,
            serde_json::json!({"first": 50, "sortBy": "name_ASC"})
        );
    }

    #[test]
    fn filters_and_cursor_are_sent() {
        let body = get_all_services(
            Some("Y3Vyc29y".into()),
            25,
            ServiceSortEnum::OwnerDesc,
            Some(vec![ServiceFilterInput::new(
                ServiceFilterKey::Product,
                FilterPredicate::Equals,
                "payments",
            )]),
        )
        .unwrap();

        assert_eq!(
            body.variables,
            serde_json::json!({
                "after": "Y3Vyc29y",
                "first": 25,
                "sortBy": "owner_DESC",
                "filter": [{"key": "product", "arg": "payments", "type": "equals"}]
            })
        );
    }

    #[test]
    fn empty_filter_list_is_dropped() {
        let body = get_all_services(None, 10, ServiceSortEnum::NameAsc, Some(vec![])).unwrap();

        assert!(body.variables.get("filter").is_none());
    }

    #[test]
    fn search_carries_term() {
        let body = search("checkout", None, 20, ServiceSortEnum::NameAsc).unwrap();

        assert_eq!(body.operation_name, "Search");
        assert_eq!(body.variables["searchTerm"], serde_json::json!("checkout"));
    }

    #[test]
    fn documents_embed_fragment() {
        for doc in [GET_ALL_SERVICES, SEARCH] {
            assert!(doc.contains("...Service"));
            assert!(doc.contains("fragment Service on Service"));
            assert!(doc.contains("hasNextPage"));
        }
    }
}
