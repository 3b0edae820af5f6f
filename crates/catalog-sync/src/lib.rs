pub mod core;
pub mod engine;
pub mod entity;
pub mod errors;
pub mod logging;
pub mod queries;
pub mod schema;
pub mod sink;
pub mod snapshot;

pub use crate::core::backoff::RetryPolicy;
pub use crate::core::config::{SyncConfig, SyncConfigBuilder};
pub use crate::core::graphql_client::{DynGraphQLClient, GraphQLClient, GraphQLError};
pub use crate::engine::{PartialSync, SyncEngine, SyncPage};
pub use crate::entity::Entity;
pub use crate::errors::{ConfigError, FetchError, SyncError};
pub use crate::sink::{CatalogSink, MemoryCatalog, SyncReport};
pub use crate::snapshot::{CatalogDiff, Snapshot};
