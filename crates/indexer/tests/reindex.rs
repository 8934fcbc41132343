//! Integration tests: filtered reindex runs.

mod common;

use chain_indexer::config::ConfigError;
use chain_indexer::store::{ReportStore, SyncableStore};
use chain_indexer::{IndexRequest, IndexerError, ReindexRequest, Report, ReportKind, SourceError};
use common::{harness, Harness};

async fn indexed(head: u64) -> Harness {
    let h = harness(head).unwrap();
    h.indexer.index(IndexRequest::default()).await.unwrap();
    h
}

#[tokio::test]
async fn session_filter_selects_session_ends() {
    let h = indexed(30).await;
    let summary = h
        .indexer
        .reindex(ReindexRequest {
            start: 1,
            last_in_session: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.stats.success_count, 3);
    assert_eq!((summary.report.start_height, summary.report.end_height), (9, 29));
    assert_eq!(summary.report.kind, ReportKind::ParallelReindex);
}

#[tokio::test]
async fn transaction_kind_filter_selects_matching_heights() {
    let h = indexed(30).await;
    let summary = h
        .indexer
        .reindex(ReindexRequest {
            start: 1,
            transaction_kinds: vec!["staking.bond".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.stats.success_count, 4);
    assert_eq!(summary.stats.last_height, Some(28));
}

#[tokio::test]
async fn filters_combine_as_a_union() {
    let h = indexed(30).await;
    let summary = h
        .indexer
        .reindex(ReindexRequest {
            start: 1,
            last_in_session: true,
            transaction_kinds: vec!["staking.bond".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    // 7, 9, 14, 19, 21, 28, 29
    assert_eq!(summary.stats.success_count, 7);
}

#[tokio::test]
async fn reindex_keeps_the_stored_index_version() {
    let h = indexed(10).await;
    h.store.set_index_version(1, 10, 2).await.unwrap();
    h.indexer
        .reindex(ReindexRequest {
            start: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(h.store.syncables().await.iter().all(|s| s.index_version == 2));
}

#[tokio::test]
async fn empty_or_invalid_selection_is_rejected() {
    let h = indexed(30).await;

    let err = h
        .indexer
        .reindex(ReindexRequest {
            start: 1,
            last_in_era: true,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::Source(SourceError::NothingToReindex)));

    let err = h
        .indexer
        .reindex(ReindexRequest {
            start: 40,
            end: Some(30),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IndexerError::Source(SourceError::InvalidRange { start: 40, end: 30 })
    ));

    let err = h
        .indexer
        .reindex(ReindexRequest {
            start: 1,
            version_ids: vec![9],
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::Config(ConfigError::UnknownVersion(9))));
}

#[tokio::test]
async fn target_reindex_runs_only_target_tasks() {
    let h = indexed(10).await;
    let calls_before = h.chain.block_calls();
    let summary = h
        .indexer
        .reindex(ReindexRequest {
            start: 1,
            target_ids: vec![3],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.stats.success_count, 10);
    assert_eq!(h.chain.block_calls(), calls_before);
}

#[tokio::test]
async fn second_sequential_reindex_conflicts_unless_forced() {
    let h = indexed(10).await;
    let stale = h
        .store
        .create_report(&Report::new(ReportKind::SequentialReindex, 3, 1, 10))
        .await
        .unwrap();

    let request = ReindexRequest {
        start: 1,
        version_ids: vec![3],
        ..Default::default()
    };
    let err = h.indexer.reindex(request.clone()).await.unwrap_err();
    assert!(err.is_state_conflict());

    let summary = h
        .indexer
        .reindex(ReindexRequest {
            force: true,
            ..request
        })
        .await
        .unwrap();
    assert_eq!(summary.report.kind, ReportKind::SequentialReindex);
    assert_eq!(summary.stats.success_count, 10);
    assert!(h.store.find_report(stale.id).await.unwrap().is_none());
}

#[tokio::test]
async fn incomplete_parallel_reindex_is_resumed() {
    let h = indexed(10).await;
    let mut interrupted = Report::new(ReportKind::ParallelReindex, 3, 1, 5);
    interrupted.success_count = 2;
    let interrupted = h.store.create_report(&interrupted).await.unwrap();

    let summary = h
        .indexer
        .reindex(ReindexRequest {
            start: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.report.id, interrupted.id);
    // Bounded by the resumed report.
    assert_eq!(summary.stats.success_count, 5);
    assert_eq!(summary.report.success_count, 7);
    assert!(summary.report.is_complete());
}

#[tokio::test]
async fn resumed_reindex_reuses_the_report_bounds() {
    let h = indexed(10).await;
    let interrupted = h
        .store
        .create_report(&Report::new(ReportKind::ParallelReindex, 3, 3, 6))
        .await
        .unwrap();

    let summary = h
        .indexer
        .reindex(ReindexRequest {
            start: 1,
            end: Some(10),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.report.id, interrupted.id);
    assert_eq!((summary.report.start_height, summary.report.end_height), (3, 6));
    assert_eq!(summary.stats.success_count, 4);
    assert_eq!(summary.stats.last_height, Some(6));
}
