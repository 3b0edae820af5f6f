use std::sync::Arc;

use thiserror::Error;

use crate::core::config::SyncConfigBuilderError;
use crate::core::graphql_client::GraphQLError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("failed to build sync config")]
    Build(#[source] SyncConfigBuilderError),
    #[error("failed to create upstream client")]
    Client(#[source] GraphQLError),
}

/// Why a single page could not be fetched or understood.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("upstream unavailable after {attempts} attempts")]
    Transient {
        attempts: u32,
        #[source]
        source: GraphQLError,
    },
    #[error("upstream rejected the credentials")]
    Auth(#[source] GraphQLError),
    #[error("upstream rejected the request")]
    Rejected(#[source] GraphQLError),
    #[error("request could not be sent upstream")]
    Request(#[source] GraphQLError),
    #[error("malformed upstream response: {0}")]
    Protocol(String),
    #[error("pagination invariant violated: {0}")]
    ProtocolInvariantViolation(String),
    #[error("catalog sink failed")]
    Sink(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl FetchError {
    pub(crate) fn sink(error: eyre::Report) -> Self {
        let error: Box<dyn std::error::Error + Send + Sync + 'static> = error.into();
        FetchError::Sink(Arc::from(error))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// How the engine treats an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry,
    Auth,
    Reject,
    Protocol,
    /// Local fault; retrying cannot help.
    Request,
}

impl Disposition {
    pub fn of(error: &GraphQLError) -> Self {
        match error {
            GraphQLError::HttpError { status: None, .. } => Disposition::Retry,
            GraphQLError::HttpError {
                status: Some(status),
                ..
            } => match status {
                401 | 403 => Disposition::Auth,
                408 | 429 => Disposition::Retry,
                500..=599 => Disposition::Retry,
                _ => Disposition::Reject,
            },
            GraphQLError::DomainError { .. } => Disposition::Reject,
            GraphQLError::Decode(_) => Disposition::Protocol,
            GraphQLError::Request(_) => Disposition::Request,
        }
    }
}

/// A terminal sync failure, annotated with how far the run got.
///
/// Entities already streamed before the failure stay with the consumer;
/// `last_cursor` is the cursor of the last page that was fully consumed.
#[derive(Error, Debug, Clone)]
#[error("failed to sync catalog after {pages_fetched} pages ({entities_yielded} entities)")]
pub struct SyncError {
    #[source]
    pub kind: FetchError,
    pub last_cursor: Option<String>,
    pub pages_fetched: usize,
    pub entities_yielded: usize,
}

impl SyncError {
    pub fn kind(&self) -> &FetchError {
        &self.kind
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}
