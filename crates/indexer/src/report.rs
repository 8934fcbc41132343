//! Report lifecycle: open (create or resume), then complete with the run's outcome.
//!
//! Reindex-kind reports are exclusive. While one is incomplete, another reindex run is
//! refused unless it is forced (which discards the stale reports) or it continues the same
//! parallel reindex at the same index version. Forward index runs are never blocked.

use crate::error::IndexerError;
use crate::model::{Report, ReportKind};
use crate::store::{ReportStore, Store};
use chrono::Utc;
use index_pipeline::RunStats;
use std::sync::Arc;

/// A report this run writes into. `resumed` runs add their counts to the stored ones.
#[derive(Debug, Clone)]
pub struct OpenReport {
    pub report: Report,
    pub resumed: bool,
}

pub struct ReportCreator {
    store: Arc<dyn Store>,
}

impl ReportCreator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Incomplete reindex report this run may continue, or a conflict. `None` means a new
    /// report must be created.
    pub async fn check_exclusive(
        &self,
        kind: ReportKind,
        index_version: i64,
        force: bool,
    ) -> Result<Option<Report>, IndexerError> {
        if !kind.is_reindex() {
            return Ok(None);
        }
        if force {
            let deleted = self.store.delete_incomplete_reports(&ReportKind::REINDEX).await?;
            if deleted > 0 {
                tracing::warn!(deleted, "forced run discarded incomplete reindex reports");
            }
            return Ok(None);
        }

        let incomplete = self.store.find_incomplete_reports(&ReportKind::REINDEX).await?;
        let Some(existing) = incomplete.into_iter().max_by_key(|r| r.id) else {
            return Ok(None);
        };
        let resumable = kind == ReportKind::ParallelReindex
            && existing.kind == kind
            && existing.index_version == index_version;
        if resumable {
            tracing::info!(report_id = existing.id, "resuming incomplete parallel reindex");
            return Ok(Some(existing));
        }
        Err(IndexerError::StateConflict(format!(
            "{} report {} (version {}) is still incomplete",
            existing.kind, existing.id, existing.index_version
        )))
    }

    pub async fn create(
        &self,
        kind: ReportKind,
        index_version: i64,
        start_height: u64,
        end_height: u64,
    ) -> Result<OpenReport, IndexerError> {
        let report = self
            .store
            .create_report(&Report::new(kind, index_version, start_height, end_height))
            .await?;
        tracing::info!(report_id = report.id, %kind, start_height, end_height, "report created");
        Ok(OpenReport {
            report,
            resumed: false,
        })
    }

    pub fn resume(report: Report) -> OpenReport {
        OpenReport {
            report,
            resumed: true,
        }
    }

    /// Close the report with the run's counts, duration and error, whatever the outcome.
    pub async fn complete(
        &self,
        open: OpenReport,
        stats: &RunStats,
        error: Option<String>,
    ) -> Result<Report, IndexerError> {
        let mut report = open.report;
        let duration_ms = stats.duration.as_millis() as u64;
        if open.resumed {
            report.success_count += stats.success_count;
            report.error_count += stats.error_count;
            report.duration_ms += duration_ms;
        } else {
            report.success_count = stats.success_count;
            report.error_count = stats.error_count;
            report.duration_ms = duration_ms;
        }
        report.error_msg = error;
        report.completed_at = Some(Utc::now());
        self.store.save_report(&report).await?;

        tracing::info!(
            report_id = report.id,
            success = report.success_count,
            errors = report.error_count,
            cancelled = stats.cancelled,
            duration_ms = report.duration_ms,
            "report completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::time::Duration;

    fn creator() -> (Arc<MemoryStore>, ReportCreator) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), ReportCreator::new(store))
    }

    #[tokio::test]
    async fn second_sequential_reindex_conflicts() {
        let (_, reports) = creator();
        reports.create(ReportKind::SequentialReindex, 2, 1, 10).await.unwrap();

        let err = reports
            .check_exclusive(ReportKind::SequentialReindex, 2, false)
            .await
            .unwrap_err();
        assert!(err.is_state_conflict());
        // Index runs are not blocked.
        assert!(reports.check_exclusive(ReportKind::Index, 2, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn force_discards_incomplete_reports() {
        let (store, reports) = creator();
        reports.create(ReportKind::SequentialReindex, 2, 1, 10).await.unwrap();
        assert!(reports
            .check_exclusive(ReportKind::SequentialReindex, 2, true)
            .await
            .unwrap()
            .is_none());
        assert!(store.reports().await.is_empty());
    }

    #[tokio::test]
    async fn parallel_reindex_resumes_same_version_only() {
        let (_, reports) = creator();
        let open = reports.create(ReportKind::ParallelReindex, 2, 1, 10).await.unwrap();

        let resumed = reports
            .check_exclusive(ReportKind::ParallelReindex, 2, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resumed.id, open.report.id);

        assert!(reports
            .check_exclusive(ReportKind::ParallelReindex, 3, false)
            .await
            .unwrap_err()
            .is_state_conflict());
    }

    #[tokio::test]
    async fn complete_accumulates_on_resume() {
        let (store, reports) = creator();
        let open = reports.create(ReportKind::ParallelReindex, 2, 1, 10).await.unwrap();
        let stats = RunStats {
            success_count: 4,
            error_count: 1,
            last_height: Some(4),
            cancelled: false,
            duration: Duration::from_millis(20),
        };
        let mut first = reports.complete(open, &stats, Some("boom".into())).await.unwrap();
        assert_eq!(first.error_msg.as_deref(), Some("boom"));

        first.completed_at = None;
        let second = reports
            .complete(ReportCreator::resume(first), &stats, None)
            .await
            .unwrap();
        assert_eq!(second.success_count, 8);
        assert_eq!(second.duration_ms, 40);
        assert!(second.error_msg.is_none());
        assert!(store.reports().await.iter().all(Report::is_complete));
    }
}
