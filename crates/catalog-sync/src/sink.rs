use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::PartialSync;
use crate::entity::Entity;
use crate::errors::SyncError;
use crate::snapshot::{CatalogDiff, Snapshot};

/// Counters for one finished sync run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pages: usize,
    pub entities: usize,
    pub skipped: usize,
    pub total_count: Option<i64>,
    pub last_cursor: Option<String>,
}

/// Receives normalized entities as they stream in.
///
/// `complete` is only called after the upstream reported its last page.
/// `abort` is called when the run fails part way through, and also when
/// `complete` itself returns an error.
#[async_trait]
pub trait CatalogSink {
    async fn ingest(&mut self, entity: Entity) -> eyre::Result<()>;

    async fn complete(&mut self, report: &SyncReport) -> eyre::Result<()>;

    async fn abort(&mut self, _error: &SyncError) {}
}

/// In-memory catalog that swaps in a new snapshot only on completion.
///
/// An aborted run leaves `snapshot()` untouched; whatever it staged is
/// kept aside in `partial()` until the next run completes.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    current: Snapshot,
    staged: Option<Snapshot>,
    last_diff: Option<CatalogDiff>,
    last_report: Option<SyncReport>,
    partial: Option<PartialSync>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: snapshot,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.current
    }

    /// Changes applied by the last completed sync.
    pub fn last_diff(&self) -> Option<&CatalogDiff> {
        self.last_diff.as_ref()
    }

    pub fn last_report(&self) -> Option<&SyncReport> {
        self.last_report.as_ref()
    }

    /// Entities staged by the last aborted run, with the error that stopped it.
    pub fn partial(&self) -> Option<&PartialSync> {
        self.partial.as_ref()
    }

    /// Takes the partial result, e.g. to decide whether it is usable.
    pub fn take_partial(&mut self) -> Option<PartialSync> {
        self.partial.take()
    }
}

#[async_trait]
impl CatalogSink for MemoryCatalog {
    async fn ingest(&mut self, entity: Entity) -> eyre::Result<()> {
        self.staged.get_or_insert_with(Snapshot::new).insert(entity);

        Ok(())
    }

    async fn complete(&mut self, report: &SyncReport) -> eyre::Result<()> {
        let mut staged = self.staged.take().unwrap_or_default();
        staged.pages = report.pages;
        staged.skipped = report.skipped;

        let diff = staged.diff(&self.current);
        tracing::info!(
            added = diff.added.len(),
            updated = diff.updated.len(),
            removed = diff.removed.len(),
            "catalog replaced"
        );

        self.current = staged;
        self.last_diff = Some(diff);
        self.last_report = Some(report.clone());
        self.partial = None;

        Ok(())
    }

    async fn abort(&mut self, error: &SyncError) {
        let mut snapshot = self.staged.take().unwrap_or_default();
        snapshot.pages = error.pages_fetched;

        tracing::warn!(
            staged = snapshot.len(),
            last_cursor = error.last_cursor.as_deref(),
            error = %error,
            "sync aborted, keeping previous catalog"
        );

        self.partial = Some(PartialSync {
            snapshot,
            error: error.clone(),
        });
    }
}
