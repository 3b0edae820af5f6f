pub mod backoff;
pub mod config;
pub mod gql_client;
pub mod graphql_client;
