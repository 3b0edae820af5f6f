use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graphql_client::QueryBody;
use thiserror::Error;

use crate::core::config::SyncConfig;
use crate::core::gql_client::{ClientConfig, GQLClient};

#[async_trait]
pub trait GraphQLClient {
    async fn query(
        &self,
        body: &QueryBody<serde_json::Value>,
    ) -> Result<Option<serde_json::Value>, GraphQLError>;
}

pub type DynGraphQLClient = Arc<dyn GraphQLClient + Send + Sync>;

#[derive(Debug)]
pub struct DefaultGraphQLClient {
    client: GQLClient,
}

impl DefaultGraphQLClient {
    pub fn new(config: &SyncConfig) -> Result<Self, GraphQLError> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", config.api_token),
        );
        headers.insert("GraphQL-Visibility".to_string(), "internal".to_string());

        let client = GQLClient::new_with_config(ClientConfig {
            endpoint: config.endpoint.clone(),
            timeout_ms: Some(config.request_timeout_ms),
            headers: Some(headers),
            proxy: config.proxy.clone(),
        })
        .map_err(map_graphql_error)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl GraphQLClient for DefaultGraphQLClient {
    async fn query(
        &self,
        body: &QueryBody<serde_json::Value>,
    ) -> Result<Option<serde_json::Value>, GraphQLError> {
        tracing::trace!(
            endpoint = self.client.endpoint(),
            operation = body.operation_name,
            "catalog-query"
        );

        self.client
            .query_with_vars(body)
            .await
            .map_err(map_graphql_error)
    }
}

fn map_graphql_error(gql_error: crate::core::gql_client::GraphQLError) -> GraphQLError {
    let message = gql_error.message().to_string();

    if gql_error.is_local() {
        return GraphQLError::Request(message);
    }

    if let Some(json) = gql_error.json() {
        // an error status wins over the body so that 401/5xx keep their class
        if gql_error.status().is_none() && !json.is_empty() {
            return GraphQLError::DomainError {
                message,
                fields: GraphqlErrorMessages(json.into_iter().map(|e| e.message).collect()),
            };
        }
    }

    if let Some(status @ 200..=299) = gql_error.status() {
        return GraphQLError::Decode(format!("[{status}] {message}"));
    }

    GraphQLError::HttpError {
        status: gql_error.status(),
        message,
        retry_after: gql_error.retry_after_delay(),
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphQLError {
    #[error("http error{}: {message}", .status.map(|s| format!(" [{s}]")).unwrap_or_default())]
    HttpError {
        /// `None` when no response was received (connect failure, timeout)
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("domain error:\n{message}\n{fields}")]
    DomainError {
        message: String,
        fields: GraphqlErrorMessages,
    },
    #[error("undecodable response: {0}")]
    Decode(String),
    /// Nothing was sent upstream: the request could not be built or routed.
    #[error("request could not be sent: {0}")]
    Request(String),
}

impl GraphQLError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphQLError::HttpError { status, .. } => *status,
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GraphQLError::HttpError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphqlErrorMessages(pub Vec<String>);

impl std::fmt::Display for GraphqlErrorMessages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for error in self.0.iter() {
            f.write_fmt(format_args!("{error}\n"))?;
        }

        Ok(())
    }
}
