//! Integration tests: version-triggered backfill and report exclusivity.

mod common;

use chain_indexer::store::{ReportStore, SyncableStore};
use chain_indexer::{
    BackfillRequest, IndexRequest, IndexerError, Report, ReportKind, SourceError, TargetsReader,
};
use common::{harness, harness_with};

const SESSION_CATALOG: &str = r#"{
    "shared_tasks": ["HeightMetaRetriever", "MainSyncer", "SyncerPersistor"],
    "available_targets": [
        { "id": 1, "name": "blocks", "tasks": ["BlockFetcher", "BlockParser", "BlockSeqCreator", "BlockSeqPersistor"] },
        { "id": 2, "name": "sessions", "tasks": [
            "StakingFetcher", "ValidatorPerformanceFetcher", "ValidatorsParser",
            "ValidatorSessionSeqCreator", "ValidatorSessionSeqPersistor"
        ] }
    ],
    "versions": [
        { "id": 1, "targets": [1] },
        { "id": 2, "targets": [2], "last_in_session": true }
    ]
}"#;

/// Version 2 needs blocks, version 3 only events.
const MIXED_CATALOG: &str = r#"{
    "shared_tasks": ["HeightMetaRetriever", "MainSyncer", "SyncerPersistor"],
    "available_targets": [
        { "id": 1, "name": "blocks", "tasks": ["BlockFetcher", "BlockParser", "BlockSeqCreator", "BlockSeqPersistor"] },
        { "id": 2, "name": "events", "tasks": ["EventsFetcher", "EventSeqCreator", "EventSeqPersistor"] }
    ],
    "versions": [
        { "id": 1, "targets": [2] },
        { "id": 2, "targets": [1] },
        { "id": 3, "targets": [2] }
    ]
}"#;

#[tokio::test]
async fn backfill_spans_the_outdated_heights() {
    let h = harness(30).unwrap();
    h.indexer.index(IndexRequest::default()).await.unwrap();
    h.store.set_index_version(10, 10, 1).await.unwrap();
    h.store.set_index_version(20, 20, 1).await.unwrap();

    let summary = h.indexer.backfill(BackfillRequest::default()).await.unwrap();
    assert_eq!((summary.report.start_height, summary.report.end_height), (10, 20));
    assert_eq!(summary.stats.success_count, 11);
    // Version 3 is flagged non-parallel.
    assert_eq!(summary.report.kind, ReportKind::SequentialReindex);
    assert!(h.store.syncables().await.iter().all(|s| s.index_version == 3));
    assert_eq!(h.indexer.status().await.unwrap().first_outdated_height, None);
}

#[tokio::test]
async fn nothing_to_backfill_when_current() {
    let h = harness(10).unwrap();
    h.indexer.index(IndexRequest::default()).await.unwrap();
    let err = h.indexer.backfill(BackfillRequest::default()).await.unwrap_err();
    assert!(matches!(err, IndexerError::Source(SourceError::NothingToBackfill(3))));
}

#[tokio::test]
async fn boundary_version_backfills_boundaries_only() {
    let h = harness_with(25, TargetsReader::from_json(SESSION_CATALOG).unwrap()).unwrap();
    h.indexer.index(IndexRequest::default()).await.unwrap();
    h.store.set_index_version(1, 25, 1).await.unwrap();
    let calls_before = h.chain.block_calls();

    let summary = h.indexer.backfill(BackfillRequest::default()).await.unwrap();
    assert_eq!(summary.report.kind, ReportKind::ParallelReindex);
    assert_eq!(summary.stats.success_count, 2);
    assert_eq!(summary.stats.last_height, Some(19));
    // Only the session target ran.
    assert_eq!(h.chain.block_calls(), calls_before);
    // Skipped heights were stamped too.
    assert!(h.store.syncables().await.iter().all(|s| s.index_version == 2));
}

#[tokio::test]
async fn incomplete_sequential_report_blocks_backfill_unless_forced() {
    let h = harness(30).unwrap();
    h.indexer.index(IndexRequest::default()).await.unwrap();
    h.store.set_index_version(10, 20, 1).await.unwrap();
    let stale = h
        .store
        .create_report(&Report::new(ReportKind::SequentialReindex, 3, 10, 20))
        .await
        .unwrap();

    let err = h.indexer.backfill(BackfillRequest::default()).await.unwrap_err();
    assert!(err.is_state_conflict());

    let summary = h
        .indexer
        .backfill(BackfillRequest {
            force: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(summary.stats.success_count, 11);
    assert!(h.store.find_report(stale.id).await.unwrap().is_none());
    assert!(h.store.reports().await.iter().all(Report::is_complete));
}

#[tokio::test]
async fn mixed_versions_run_every_newer_version_than_the_oldest() {
    let h = harness_with(20, TargetsReader::from_json(MIXED_CATALOG).unwrap()).unwrap();
    h.indexer.index(IndexRequest::default()).await.unwrap();
    h.store.set_index_version(1, 10, 2).await.unwrap();
    h.store.set_index_version(11, 20, 1).await.unwrap();
    let calls_before = h.chain.block_calls();

    let summary = h.indexer.backfill(BackfillRequest::default()).await.unwrap();
    assert_eq!((summary.report.start_height, summary.report.end_height), (1, 20));
    assert_eq!(summary.stats.success_count, 20);
    // Heights 11..=20 predate version 2, so its block tasks ran.
    assert_eq!(h.chain.block_calls(), calls_before + 20);
    assert!(h.store.syncables().await.iter().all(|s| s.index_version == 3));
}
