//! Example: run one indexer mode against a chain proxy and print the report.
//!
//! Usage:
//!
//!   cargo run -p chain-indexer --example indexer_worker -- index [--batch N] [--start H]
//!   cargo run -p chain-indexer --example indexer_worker -- backfill [--force]
//!   cargo run -p chain-indexer --example indexer_worker -- reindex --start H [--end H] [--era] [--session] [--kind section.method] [--force]
//!   cargo run -p chain-indexer --example indexer_worker -- dry-run --height H
//!   cargo run -p chain-indexer --example indexer_worker -- status
//!
//! Configuration comes from `INDEXER_*` variables (and `.env`). Ctrl-C cancels the run between
//! heights; the report is still completed.

use anyhow::{bail, Context, Result};
use chain_indexer::{
    BackfillRequest, IndexRequest, IndexerConfig, IndexingPipeline, ReindexRequest, RunSummary,
};
use tokio_util::sync::CancellationToken;

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1).cloned())
}

fn parse_u64(args: &[String], name: &str) -> Result<Option<u64>> {
    flag_value(args, name)
        .map(|v| v.parse::<u64>().with_context(|| format!("{name} must be a height")))
        .transpose()
}

fn print_summary(summary: &RunSummary) {
    let r = &summary.report;
    println!(
        "report {} ({}) heights {}..={} success={} errors={} cancelled={} duration_ms={}",
        r.id,
        r.kind,
        r.start_height,
        r.end_height,
        r.success_count,
        r.error_count,
        summary.stats.cancelled,
        r.duration_ms
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    chain_indexer::telemetry::init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(mode) = args.first().cloned() else {
        eprintln!("Usage: indexer_worker <index|backfill|reindex|dry-run|status> [options]");
        std::process::exit(1);
    };

    let config = IndexerConfig::from_env().context("load configuration")?;
    let indexer = IndexingPipeline::connect(config).await.context("start indexer")?;

    let cancellation = CancellationToken::new();
    let ctrl_c = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current height");
            ctrl_c.cancel();
        }
    });

    let has = |name: &str| args.iter().any(|a| a == name);
    match mode.as_str() {
        "index" => {
            let summary = indexer
                .index(IndexRequest {
                    start: parse_u64(&args, "--start")?,
                    batch_size: parse_u64(&args, "--batch")?,
                    cancellation,
                })
                .await?;
            print_summary(&summary);
        }
        "backfill" => {
            let summary = indexer
                .backfill(BackfillRequest {
                    force: has("--force"),
                    version_ids: Vec::new(),
                    cancellation,
                })
                .await?;
            print_summary(&summary);
        }
        "reindex" => {
            let Some(start) = parse_u64(&args, "--start")? else {
                bail!("reindex needs --start");
            };
            let summary = indexer
                .reindex(ReindexRequest {
                    start,
                    end: parse_u64(&args, "--end")?,
                    last_in_session: has("--session"),
                    last_in_era: has("--era"),
                    transaction_kinds: flag_value(&args, "--kind").into_iter().collect(),
                    force: has("--force"),
                    cancellation,
                    ..Default::default()
                })
                .await?;
            print_summary(&summary);
        }
        "dry-run" => {
            let Some(height) = parse_u64(&args, "--height")? else {
                bail!("dry-run needs --height");
            };
            let payload = indexer.dry_run(height).await?;
            println!(
                "height {} would write {} records (syncable: {})",
                payload.height,
                payload.record_count(),
                payload.syncable.is_some()
            );
        }
        "status" => {
            let status = indexer.status().await?;
            println!(
                "version {} most recent {:?} (processed: {}) first outdated {:?}",
                status.index_version,
                status.most_recent_height,
                status.most_recent_processed,
                status.first_outdated_height
            );
            if let Some(report) = status.last_report {
                println!("last report {} ({}) complete={}", report.id, report.kind, report.is_complete());
            }
        }
        other => bail!("unknown mode {other:?}"),
    }
    Ok(())
}
