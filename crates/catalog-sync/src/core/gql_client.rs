use std::collections::HashMap;
use std::fmt::{self, Formatter};
use std::str::FromStr;
use std::time::Duration;

use graphql_client::QueryBody;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

const MAX_REDIRECTS: u32 = 10;

#[derive(Clone)]
pub struct GraphQLError {
    message: String,
    status: Option<u16>,
    retry_after: Option<Duration>,
    json: Option<Vec<GraphQLErrorMessage>>,
    /// The request never left this process (bad endpoint, redirect loop).
    local: bool,
}

// https://spec.graphql.org/October2021/#sec-Errors
#[derive(Deserialize, Debug, Clone)]
#[allow(dead_code)]
pub struct GraphQLErrorMessage {
    pub message: String,
    locations: Option<Vec<GraphQLErrorLocation>>,
    extensions: Option<HashMap<String, serde_json::Value>>,
    path: Option<Vec<GraphQLErrorPathParam>>,
}

#[derive(Deserialize, Debug, Clone)]
#[allow(dead_code)]
pub struct GraphQLErrorLocation {
    line: u32,
    column: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum GraphQLErrorPathParam {
    String(String),
    Number(u32),
}

impl GraphQLError {
    pub fn with_text(message: impl AsRef<str>) -> Self {
        Self {
            message: message.as_ref().to_string(),
            status: None,
            retry_after: None,
            json: None,
            local: false,
        }
    }

    pub fn with_local(message: impl AsRef<str>) -> Self {
        Self {
            local: true,
            ..Self::with_text(message)
        }
    }

    pub fn with_status(message: impl AsRef<str>, status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::with_text(message)
        }
    }

    pub fn with_json(json: Vec<GraphQLErrorMessage>) -> Self {
        Self {
            json: Some(json),
            ..Self::with_text("Look at json field for more details")
        }
    }

    fn retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    fn json_opt(mut self, json: Option<Vec<GraphQLErrorMessage>>) -> Self {
        self.json = json.filter(|j| !j.is_empty());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn retry_after_delay(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn json(&self) -> Option<Vec<GraphQLErrorMessage>> {
        self.json.clone()
    }
}

fn format(err: &GraphQLError, f: &mut Formatter<'_>) -> fmt::Result {
    writeln!(f, "\nGQLClient Error: {}", err.message)?;

    let Some(errors) = err.json.as_ref() else {
        return Ok(());
    };

    for err in errors {
        writeln!(f, "Message: {}", err.message)?;
    }

    Ok(())
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        format(self, f)
    }
}

impl fmt::Debug for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        format(self, f)
    }
}

impl From<reqwest::Error> for GraphQLError {
    fn from(error: reqwest::Error) -> Self {
        Self {
            message: error.to_string(),
            status: error.status().map(|s| s.as_u16()),
            retry_after: None,
            json: None,
            local: error.is_builder(),
        }
    }
}

/// GQL client config
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClientConfig {
    /// the endpoint of the graphql server
    pub endpoint: String,
    /// request timeout, unit: milliseconds
    pub timeout_ms: Option<u64>,
    /// additional request headers
    pub headers: Option<HashMap<String, String>>,
    /// request proxy
    pub proxy: Option<GQLProxy>,
}

/// proxy type
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum ProxyType {
    Http,
    Https,
    All,
}

/// proxy auth, basic_auth
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// request proxy
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GQLProxy {
    /// proxy url
    pub schema: String,
    /// proxy type
    pub type_: ProxyType,
    /// auth
    pub auth: Option<ProxyAuth>,
}

impl TryFrom<GQLProxy> for reqwest::Proxy {
    type Error = GraphQLError;

    fn try_from(gql_proxy: GQLProxy) -> Result<Self, Self::Error> {
        let proxy = match gql_proxy.type_ {
            ProxyType::Http => reqwest::Proxy::http(gql_proxy.schema),
            ProxyType::Https => reqwest::Proxy::https(gql_proxy.schema),
            ProxyType::All => reqwest::Proxy::all(gql_proxy.schema),
        }
        .map_err(|e| Self::Error::with_local(format!("{:?}", e)))?;

        Ok(match gql_proxy.auth {
            Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
            None => proxy,
        })
    }
}

#[derive(Clone, Debug)]
pub struct GQLClient {
    config: ClientConfig,
    client: Client,
}

#[derive(Deserialize, Debug)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLErrorMessage>>,
}

impl GQLClient {
    pub fn new_with_config(config: ClientConfig) -> Result<Self, GraphQLError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.unwrap_or(30_000)))
            // redirects are followed by hand so the POST body survives them
            .redirect(reqwest::redirect::Policy::none());
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(proxy.clone().try_into()?);
        }
        let client = builder
            .build()
            .map_err(|e| GraphQLError::with_local(format!("Can not create client: {:?}", e)))?;

        Ok(Self { config, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub async fn query_with_vars<K, T: Serialize>(
        &self,
        body: &QueryBody<T>,
    ) -> Result<Option<K>, GraphQLError>
    where
        K: for<'de> Deserialize<'de>,
    {
        let mut times = 1;
        let mut endpoint = self.config.endpoint.clone();
        let endpoint_url = Url::from_str(&endpoint).map_err(|e| {
            GraphQLError::with_local(format!("Wrong endpoint: {}. {:?}", endpoint, e))
        })?;
        let schema = endpoint_url.scheme().to_string();
        let host = endpoint_url
            .host_str()
            .ok_or_else(|| GraphQLError::with_local(format!("Wrong endpoint: {}", endpoint)))?
            .to_string();

        loop {
            if times > MAX_REDIRECTS {
                return Err(GraphQLError::with_local(format!(
                    "Many redirect location: {}",
                    endpoint
                )));
            }

            let mut request = self.client.post(&endpoint).json(body);
            if let Some(headers) = &self.config.headers {
                for (name, value) in headers {
                    request = request.header(name, value);
                }
            }

            let raw_response = request.send().await?;
            if raw_response.status().is_redirection() {
                if let Some(location) = raw_response.headers().get(reqwest::header::LOCATION) {
                    let redirect_url = location.to_str().map_err(|e| {
                        GraphQLError::with_local(format!(
                            "Failed to parse response header: Location. {:?}",
                            e
                        ))
                    })?;

                    endpoint = if redirect_url.starts_with("http://")
                        || redirect_url.starts_with("https://")
                    {
                        redirect_url.to_string()
                    } else if redirect_url.starts_with('/') {
                        format!("{}://{}{}", schema, host, redirect_url)
                    } else {
                        format!("{}://{}/{}", schema, host, redirect_url)
                    };
                    times += 1;
                    continue;
                }
            }

            let status = raw_response.status();
            let retry_after = parse_retry_after(raw_response.headers());
            let response_body_text = raw_response
                .text()
                .await
                .map_err(|e| GraphQLError::with_text(format!("Can not get response: {:?}", e)))?;

            let json: Result<GraphQLResponse<K>, _> = serde_json::from_str(&response_body_text);

            if !status.is_success() {
                return Err(GraphQLError::with_status(
                    format!("The response is [{}]", status.as_u16()),
                    status.as_u16(),
                )
                .retry_after(retry_after)
                .json_opt(json.ok().and_then(|j| j.errors)));
            }

            let json = json.map_err(|e| {
                GraphQLError::with_status(
                    format!(
                        "Failed to parse response: {:?}. The response body is: {}",
                        e, response_body_text
                    ),
                    status.as_u16(),
                )
            })?;

            if let Some(errors) = json.errors.filter(|e| !e.is_empty()) {
                return Err(GraphQLError::with_json(errors));
            }
            if json.data.is_none() {
                tracing::warn!(
                    target = "gql-client",
                    response_text = response_body_text,
                    "The deserialized data is none, the response",
                );
            }

            return Ok(json.data);
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
