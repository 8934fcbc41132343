use crate::chain::HeightMeta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Metadata retrieved, processing not finished.
    Synced,
    Processed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Processed => "processed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "synced" => Some(SyncStatus::Synced),
            "processed" => Some(SyncStatus::Processed),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-height bookkeeping. `processed_at` and `index_version` together mark a height as done
/// under a given logic version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Syncable {
    pub height: u64,
    pub time: DateTime<Utc>,
    pub chain: String,
    pub spec_version: u32,
    pub session: u64,
    pub era: u64,
    pub active_era: u64,
    pub last_in_session: bool,
    pub last_in_era: bool,
    pub status: SyncStatus,
    pub index_version: i64,
    pub processed_at: Option<DateTime<Utc>>,
    pub report_id: Option<i64>,
}

impl Syncable {
    /// First visit of a height.
    pub fn from_meta(meta: &HeightMeta, index_version: i64) -> Self {
        Self {
            height: meta.height,
            time: meta.time,
            chain: meta.chain.clone(),
            spec_version: meta.spec_version,
            session: meta.session,
            era: meta.era,
            active_era: meta.active_era,
            last_in_session: meta.last_in_session,
            last_in_era: meta.last_in_era,
            status: SyncStatus::Synced,
            index_version,
            processed_at: None,
            report_id: None,
        }
    }

    /// Refresh chain-derived fields, leaving the processing marker alone.
    pub fn apply_meta(&mut self, meta: &HeightMeta) {
        self.time = meta.time;
        self.chain = meta.chain.clone();
        self.spec_version = meta.spec_version;
        self.session = meta.session;
        self.era = meta.era;
        self.active_era = meta.active_era;
        self.last_in_session = meta.last_in_session;
        self.last_in_era = meta.last_in_era;
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}
