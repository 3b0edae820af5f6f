#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use catalog_sync::core::graphql_client::{GraphQLClient, GraphQLError, GraphqlErrorMessages};
use catalog_sync::{RetryPolicy, SyncConfig, SyncEngine};
use graphql_client::QueryBody;
use serde_json::{json, Value};

pub type Reply = Result<Option<Value>, GraphQLError>;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub operation: String,
    pub variables: Value,
}

impl RecordedRequest {
    pub fn after(&self) -> Option<&str> {
        self.variables.get("after").and_then(Value::as_str)
    }
}

type Responder = Box<dyn Fn(usize, &RecordedRequest) -> Reply + Send + Sync>;

/// Upstream double: answers from a script and records every request.
pub struct ScriptedClient {
    responder: Responder,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedClient {
    pub fn new(responder: impl Fn(usize, &RecordedRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Replies in order; running past the script is a test failure.
    pub fn sequence(replies: Vec<Reply>) -> Arc<Self> {
        let replies = Mutex::new(VecDeque::from(replies));
        Self::new(move |n, _| {
            replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected request #{}", n + 1))
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GraphQLClient for ScriptedClient {
    async fn query(&self, body: &QueryBody<Value>) -> Result<Option<Value>, GraphQLError> {
        let request = RecordedRequest {
            operation: body.operation_name.to_string(),
            variables: body.variables.clone(),
        };
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };

        (self.responder)(n, &request)
    }
}

pub fn config() -> SyncConfig {
    SyncConfig::builder()
        .api_token("test-token")
        .page_size(2u32)
        .retry(RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
        })
        .build()
        .unwrap()
}

pub fn engine(client: Arc<ScriptedClient>) -> SyncEngine {
    SyncEngine::new(config(), client)
}

pub fn engine_with(config: SyncConfig, client: Arc<ScriptedClient>) -> SyncEngine {
    SyncEngine::new(config, client)
}

pub fn service(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("service {id}"),
        "aliases": [id],
        "alertStatus": {"index": 0, "type": "ok"}
    })
}

/// A `servicesV2` page; `None` entries become null nodes.
pub fn page(ids: &[Option<&str>], end_cursor: Option<&str>, has_next_page: bool) -> Reply {
    let nodes: Vec<Value> = ids
        .iter()
        .map(|id| id.map(service).unwrap_or(Value::Null))
        .collect();

    Ok(Some(json!({
        "account": {
            "servicesV2": {
                "totalCount": 6,
                "pageInfo": {"endCursor": end_cursor, "hasNextPage": has_next_page},
                "nodes": nodes
            }
        }
    })))
}

pub fn status(code: u16) -> Reply {
    Err(GraphQLError::HttpError {
        status: Some(code),
        message: format!("The response is [{code}]"),
        retry_after: None,
    })
}

pub fn graphql_errors(messages: &[&str]) -> Reply {
    Err(GraphQLError::DomainError {
        message: "Look at json field for more details".into(),
        fields: GraphqlErrorMessages(messages.iter().map(|m| m.to_string()).collect()),
    })
}
