use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportKind {
    Index,
    SequentialReindex,
    ParallelReindex,
}

impl ReportKind {
    pub const REINDEX: [ReportKind; 2] = [ReportKind::SequentialReindex, ReportKind::ParallelReindex];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Index => "index",
            ReportKind::SequentialReindex => "sequential_reindex",
            ReportKind::ParallelReindex => "parallel_reindex",
        }
    }

    pub fn is_reindex(&self) -> bool {
        !matches!(self, ReportKind::Index)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" => Ok(ReportKind::Index),
            "sequential_reindex" => Ok(ReportKind::SequentialReindex),
            "parallel_reindex" => Ok(ReportKind::ParallelReindex),
            other => Err(format!("unknown report kind {other:?}")),
        }
    }
}

/// Bookkeeping for one run, or for a reindex resumed across several runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Assigned by the store on create.
    pub id: i64,
    pub kind: ReportKind,
    pub index_version: i64,
    pub start_height: u64,
    pub end_height: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub error_msg: Option<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Report {
    pub fn new(kind: ReportKind, index_version: i64, start_height: u64, end_height: u64) -> Self {
        Self {
            id: 0,
            kind,
            index_version,
            start_height,
            end_height,
            success_count: 0,
            error_count: 0,
            error_msg: None,
            duration_ms: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_its_name() {
        for kind in [ReportKind::Index, ReportKind::SequentialReindex, ReportKind::ParallelReindex] {
            assert_eq!(kind.as_str().parse::<ReportKind>().unwrap(), kind);
        }
        assert!("backfill".parse::<ReportKind>().is_err());
        assert!(!ReportKind::Index.is_reindex());
        assert!(ReportKind::REINDEX.iter().all(|k| k.is_reindex()));
    }
}
