use std::fmt;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::core::backoff::RetryPolicy;
use crate::core::gql_client::GQLProxy;
use crate::errors::ConfigError;
use crate::schema::ServiceSortEnum;

pub const DEFAULT_ENDPOINT: &str = "https://app.opslevel.com/graphql";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 500;
pub const DEFAULT_MAX_PAGES: usize = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

pub const API_TOKEN_ENV: &str = "OPSLEVEL_API_TOKEN";
pub const API_URL_ENV: &str = "OPSLEVEL_API_URL";
pub const PAGE_SIZE_ENV: &str = "OPSLEVEL_PAGE_SIZE";

#[derive(Builder, Clone, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SyncConfig {
    #[builder(default = "DEFAULT_ENDPOINT.to_string()")]
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub api_token: String,
    #[builder(default = "DEFAULT_PAGE_SIZE")]
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[builder(default)]
    #[serde(default)]
    pub sort_by: ServiceSortEnum,
    /// Ceiling on pages per run; guards against a cursor that never advances.
    #[builder(default = "DEFAULT_MAX_PAGES")]
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[builder(default = "DEFAULT_REQUEST_TIMEOUT_MS")]
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[builder(default)]
    #[serde(default)]
    pub retry: RetryPolicy,
    #[builder(setter(into, strip_option), default)]
    #[serde(default)]
    pub proxy: Option<GQLProxy>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl SyncConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(token) = &self.api_token {
            if token.trim().is_empty() {
                return Err("api_token must not be empty".into());
            }
        }
        if let Some(0) = self.max_pages {
            return Err("max_pages must be at least 1".into());
        }
        if let Some(endpoint) = &self.endpoint {
            let url = reqwest::Url::parse(endpoint)
                .map_err(|e| format!("endpoint {endpoint:?} is not a valid url: {e}"))?;
            if url.host_str().is_none() {
                return Err(format!("endpoint {endpoint:?} has no host"));
            }
        }

        Ok(())
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup(API_TOKEN_ENV).ok_or(ConfigError::MissingEnv(API_TOKEN_ENV))?;

        let mut builder = SyncConfigBuilder::default();
        builder.api_token(token);

        if let Some(endpoint) = lookup(API_URL_ENV).filter(|e| !e.trim().is_empty()) {
            builder.endpoint(endpoint);
        }
        if let Some(size) = lookup(PAGE_SIZE_ENV) {
            let parsed = size.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnv {
                name: PAGE_SIZE_ENV,
                value: size.clone(),
            })?;
            builder.page_size(parsed);
        }

        builder.build().map_err(ConfigError::Build)
    }

    /// Page size actually requested upstream.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("endpoint", &self.endpoint)
            .field("api_token", &"<redacted>")
            .field("page_size", &self.page_size)
            .field("sort_by", &self.sort_by)
            .field("max_pages", &self.max_pages)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("retry", &self.retry)
            .field("proxy", &self.proxy.as_ref().map(|p| &p.schema))
            .finish()
    }
}
