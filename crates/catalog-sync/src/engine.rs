use std::collections::HashSet;
use std::sync::Arc;

use async_stream::try_stream;
use futures::{stream, Stream, StreamExt, TryStreamExt};
use graphql_client::QueryBody;
use thiserror::Error;

use crate::core::config::SyncConfig;
use crate::core::graphql_client::{DefaultGraphQLClient, DynGraphQLClient};
use crate::entity::Entity;
use crate::errors::{ConfigError, Disposition, FetchError, SyncError};
use crate::queries;
use crate::schema::{ServiceConnection, ServiceFilterInput, ServicesData};
use crate::sink::{CatalogSink, SyncReport};
use crate::snapshot::Snapshot;

/// One normalized page of the upstream connection.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPage {
    /// 1-based position within the run.
    pub number: usize,
    pub entities: Vec<Entity>,
    /// Null node entries dropped from this page.
    pub skipped: usize,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
    pub total_count: Option<i64>,
}

/// A full sync that stopped early, with everything collected before the failure.
#[derive(Error, Debug, Clone)]
#[error("failed to collect a complete catalog ({} entities collected)", .snapshot.len())]
pub struct PartialSync {
    pub snapshot: Snapshot,
    #[source]
    pub error: SyncError,
}

/// Per-run bookkeeping, owned by exactly one sync loop.
#[derive(Debug, Default)]
struct SyncState {
    cursor: Option<String>,
    last_cursor: Option<String>,
    seen_cursors: HashSet<String>,
    pages_fetched: usize,
    entities_yielded: usize,
    skipped: usize,
}

impl SyncState {
    fn fail(&self, kind: FetchError) -> SyncError {
        tracing::error!(
            pages = self.pages_fetched,
            entities = self.entities_yielded,
            last_cursor = self.last_cursor.as_deref(),
            error = %kind,
            "catalog sync aborted"
        );

        SyncError {
            kind,
            last_cursor: self.last_cursor.clone(),
            pages_fetched: self.pages_fetched,
            entities_yielded: self.entities_yielded,
        }
    }

    fn record(&mut self, page: &SyncPage) {
        self.pages_fetched += 1;
        self.entities_yielded += page.entities.len();
        self.skipped += page.skipped;
        self.last_cursor = page.end_cursor.clone().or_else(|| self.last_cursor.take());
    }

    /// Moves to the next cursor, refusing one that was already requested.
    fn advance(&mut self, next: Option<String>) -> Result<(), FetchError> {
        let next = next.ok_or_else(|| {
            FetchError::Protocol("hasNextPage is true but endCursor is null".into())
        })?;

        if !self.seen_cursors.insert(next.clone()) {
            return Err(FetchError::ProtocolInvariantViolation(format!(
                "cursor {next:?} was already requested in this run"
            )));
        }

        self.cursor = Some(next);
        Ok(())
    }
}

#[derive(Clone)]
pub struct SyncEngine {
    config: SyncConfig,
    client: DynGraphQLClient,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, client: DynGraphQLClient) -> Self {
        Self { config, client }
    }

    /// Builds the engine on top of the default HTTP client.
    pub fn connect(config: SyncConfig) -> Result<Self, ConfigError> {
        let client = DefaultGraphQLClient::new(&config).map_err(ConfigError::Client)?;

        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Walks every page in order, yielding each as soon as it is normalized.
    ///
    /// The stream ends after the first page reporting `hasNextPage = false`
    /// and ends with an error on the first terminal failure. Pages already
    /// yielded stay valid. Dropping the stream cancels the run.
    pub fn sync_pages(
        &self,
        filters: Option<Vec<ServiceFilterInput>>,
    ) -> impl Stream<Item = Result<SyncPage, SyncError>> + Send + 'static {
        let engine = self.clone();

        try_stream! {
            let mut state = SyncState::default();
            let page_size = engine.config.effective_page_size();
            let max_pages = engine.config.max_pages;

            tracing::info!(page_size, max_pages, "catalog sync started");

            loop {
                if state.pages_fetched >= max_pages {
                    Err::<(), _>(state.fail(FetchError::ProtocolInvariantViolation(format!(
                        "no last page after {max_pages} pages"
                    ))))?;
                }

                let body = queries::get_all_services(
                    state.cursor.clone(),
                    page_size,
                    engine.config.sort_by,
                    filters.clone(),
                )
                .map_err(|e| state.fail(FetchError::Request(e)))?;

                let page = engine
                    .fetch_page(&body, state.pages_fetched + 1)
                    .await
                    .map_err(|kind| state.fail(kind))?;

                tracing::debug!(
                    page = page.number,
                    cursor = state.cursor.as_deref(),
                    nodes = page.entities.len(),
                    skipped = page.skipped,
                    has_next_page = page.has_next_page,
                    "catalog page fetched"
                );

                state.record(&page);
                let has_next_page = page.has_next_page;
                let end_cursor = page.end_cursor.clone();

                yield page;

                if !has_next_page {
                    break;
                }

                state.advance(end_cursor).map_err(|kind| state.fail(kind))?;
            }

            tracing::info!(
                pages = state.pages_fetched,
                entities = state.entities_yielded,
                skipped = state.skipped,
                "catalog sync finished"
            );
        }
    }

    /// The entity-level view of [`SyncEngine::sync_pages`].
    pub fn sync_all(
        &self,
        filters: Option<Vec<ServiceFilterInput>>,
    ) -> impl Stream<Item = Result<Entity, SyncError>> + Send + 'static {
        self.sync_pages(filters)
            .map_ok(|page| stream::iter(page.entities.into_iter().map(Ok::<_, SyncError>)))
            .try_flatten()
    }

    /// Fetches exactly one page of search results; never follows `hasNextPage`.
    pub async fn search(
        &self,
        term: &str,
        page_size: u32,
        cursor: Option<String>,
    ) -> Result<SyncPage, SyncError> {
        let page = match queries::search(
            term,
            cursor.clone(),
            page_size.clamp(1, crate::core::config::MAX_PAGE_SIZE),
            self.config.sort_by,
        ) {
            Ok(body) => self.fetch_page(&body, 1).await,
            Err(e) => Err(FetchError::Request(e)),
        };

        page.map_err(|kind| SyncError {
            kind,
            last_cursor: cursor,
            pages_fetched: 0,
            entities_yielded: 0,
        })
    }

    /// Drives a full sync to the end, deduplicating by `id` (last page wins).
    pub async fn collect(
        &self,
        filters: Option<Vec<ServiceFilterInput>>,
    ) -> Result<Snapshot, PartialSync> {
        let mut snapshot = Snapshot::new();
        let mut pages = Box::pin(self.sync_pages(filters));

        while let Some(page) = pages.next().await {
            match page {
                Ok(page) => {
                    snapshot.pages += 1;
                    snapshot.skipped += page.skipped;
                    snapshot.extend(page.entities);
                }
                Err(error) => return Err(PartialSync { snapshot, error }),
            }
        }

        Ok(snapshot)
    }

    /// Streams a full sync into `sink`, signalling completion only on success.
    pub async fn sync_into<S>(
        &self,
        sink: &mut S,
        filters: Option<Vec<ServiceFilterInput>>,
    ) -> Result<SyncReport, SyncError>
    where
        S: CatalogSink + Send + ?Sized,
    {
        let mut report = SyncReport::default();
        let mut pages = Box::pin(self.sync_pages(filters));

        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(error) => {
                    sink.abort(&error).await;
                    return Err(error);
                }
            };

            report.pages += 1;
            report.skipped += page.skipped;
            report.total_count = page.total_count.or(report.total_count);
            report.last_cursor = page.end_cursor.clone().or(report.last_cursor.take());

            for entity in page.entities {
                if let Err(e) = sink.ingest(entity).await {
                    let error = SyncError {
                        kind: FetchError::sink(e),
                        last_cursor: report.last_cursor.clone(),
                        pages_fetched: report.pages,
                        entities_yielded: report.entities,
                    };
                    sink.abort(&error).await;
                    return Err(error);
                }
                report.entities += 1;
            }
        }

        if let Err(e) = sink.complete(&report).await {
            let error = SyncError {
                kind: FetchError::sink(e),
                last_cursor: report.last_cursor.clone(),
                pages_fetched: report.pages,
                entities_yielded: report.entities,
            };
            sink.abort(&error).await;
            return Err(error);
        }

        Ok(report)
    }

    async fn fetch_page(
        &self,
        body: &QueryBody<serde_json::Value>,
        number: usize,
    ) -> Result<SyncPage, FetchError> {
        let connection = self.fetch(body).await?;

        normalize_page(connection, number)
    }

    /// One logical request: retried on transient failures, same cursor.
    async fn fetch(
        &self,
        body: &QueryBody<serde_json::Value>,
    ) -> Result<ServiceConnection, FetchError> {
        let policy = &self.config.retry;
        let attempts = policy.attempts();
        let mut attempt = 1;

        loop {
            let err = match self.client.query(body).await {
                Ok(data) => return decode_connection(data),
                Err(err) => err,
            };

            match Disposition::of(&err) {
                Disposition::Retry if attempt < attempts => {
                    let delay = policy.delay_for(attempt, err.retry_after());
                    tracing::warn!(
                        operation = body.operation_name,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Disposition::Retry => {
                    return Err(FetchError::Transient {
                        attempts: attempt,
                        source: err,
                    })
                }
                Disposition::Auth => return Err(FetchError::Auth(err)),
                Disposition::Reject => return Err(FetchError::Rejected(err)),
                Disposition::Protocol => return Err(FetchError::Protocol(err.to_string())),
                Disposition::Request => return Err(FetchError::Request(err)),
            }
        }
    }
}

fn decode_connection(data: Option<serde_json::Value>) -> Result<ServiceConnection, FetchError> {
    let data = data.ok_or_else(|| FetchError::Protocol("response carried no data".into()))?;

    let data: ServicesData = serde_json::from_value(data)
        .map_err(|e| FetchError::Protocol(format!("unexpected page shape: {e}")))?;

    data.account
        .and_then(|a| a.services_v2)
        .ok_or_else(|| FetchError::Protocol("account.servicesV2 missing from response".into()))
}

fn normalize_page(connection: ServiceConnection, number: usize) -> Result<SyncPage, FetchError> {
    let page_info = connection
        .page_info
        .ok_or_else(|| FetchError::Protocol(format!("page {number} has no pageInfo")))?;

    let mut entities = Vec::new();
    let mut skipped = 0;
    for node in connection.nodes.unwrap_or_default() {
        match node {
            Some(node) => entities.push(Entity::normalize(node)?),
            None => skipped += 1,
        }
    }

    Ok(SyncPage {
        number,
        entities,
        skipped,
        end_cursor: page_info.end_cursor,
        has_next_page: page_info.has_next_page,
        total_count: connection.total_count,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;
    use crate::core::backoff::RetryPolicy;
    use crate::core::graphql_client::{GraphQLClient, GraphQLError};

    fn connection(json: serde_json::Value) -> ServiceConnection {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn null_nodes_are_counted_not_fatal() {
        let page = normalize_page(
            connection(serde_json::json!({
                "pageInfo": {"endCursor": "c1", "hasNextPage": false},
                "nodes": [{"id": "a", "name": "A"}, null, {"id": "b", "name": "B"}]
            })),
            1,
        )
        .unwrap();

        assert_eq!(
            page.entities.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(page.skipped, 1);
    }

    #[test]
    fn missing_page_info_is_a_protocol_error() {
        let err = normalize_page(connection(serde_json::json!({"nodes": []})), 3).unwrap_err();

        assert!(matches!(err, FetchError::Protocol(msg) if msg.contains("page 3")));
    }

    #[test]
    fn null_nodes_array_is_an_empty_page() {
        let page = normalize_page(
            connection(serde_json::json!({
                "pageInfo": {"endCursor": null, "hasNextPage": false},
                "nodes": null
            })),
            1,
        )
        .unwrap();

        assert!(page.entities.is_empty());
        assert_eq!(page.skipped, 0);
    }

    #[test]
    fn missing_data_is_a_protocol_error() {
        assert!(matches!(
            decode_connection(None),
            Err(FetchError::Protocol(_))
        ));
        assert!(matches!(
            decode_connection(Some(serde_json::json!({"account": null}))),
            Err(FetchError::Protocol(_))
        ));
    }

    #[test]
    fn state_refuses_repeated_cursor() {
        let mut state = SyncState::default();

        state.advance(Some("a".into())).unwrap();
        state.advance(Some("b".into())).unwrap();
        let err = state.advance(Some("a".into())).unwrap_err();

        assert!(matches!(err, FetchError::ProtocolInvariantViolation(_)));
    }

    struct FlakyUpstream {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl GraphQLClient for FlakyUpstream {
        async fn query(
            &self,
            _body: &QueryBody<serde_json::Value>,
        ) -> Result<Option<serde_json::Value>, GraphQLError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(GraphQLError::HttpError {
                    status: Some(503),
                    message: "unavailable".into(),
                    retry_after: None,
                });
            }

            Ok(Some(serde_json::json!({
                "account": {"servicesV2": {
                    "pageInfo": {"endCursor": null, "hasNextPage": false},
                    "nodes": [{"id": "a", "name": "A"}]
                }}
            })))
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn retries_are_logged() {
        let config = SyncConfig::builder()
            .api_token("t")
            .retry(RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 1,
                jitter: false,
            })
            .build()
            .unwrap();
        let upstream = Arc::new(FlakyUpstream {
            calls: AtomicUsize::new(0),
        });
        let engine = SyncEngine::new(config, upstream.clone());

        let entities: Vec<Entity> = engine.sync_all(None).try_collect().await.unwrap();

        assert_eq!(entities.len(), 1);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
        assert!(logs_contain("transient upstream failure, retrying"));
        assert!(logs_contain("catalog sync finished"));
    }

    #[tokio::test]
    #[traced_test]
    async fn unusable_endpoint_fails_without_retry() {
        let mut config = SyncConfig::builder().api_token("t").build().unwrap();
        config.endpoint = "not a url".into();
        let engine = SyncEngine::connect(config).unwrap();

        let err = engine.search("x", 5, None).await.unwrap_err();

        assert!(matches!(err.kind(), FetchError::Request(_)), "{:?}", err.kind());
        assert!(!err.is_transient());
        assert!(!logs_contain("retrying"));

        let err = engine.sync_all(None).try_collect::<Vec<_>>().await.unwrap_err();
        assert!(matches!(err.kind(), FetchError::Request(_)));
        assert_eq!(err.pages_fetched, 0);
    }

    #[test]
    fn state_requires_cursor_to_continue() {
        let mut state = SyncState::default();

        assert!(matches!(
            state.advance(None),
            Err(FetchError::Protocol(_))
        ));
    }
}
