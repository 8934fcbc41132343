//! In-process store for tests and dry environments.

use super::{RecordRow, RecordStore, ReportStore, StoreError, SyncableStore};
use crate::model::{Report, ReportKind, Syncable};
use crate::source::BoundaryFilter;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    syncables: BTreeMap<u64, Syncable>,
    reports: BTreeMap<i64, Report>,
    next_report_id: i64,
    records: HashMap<&'static str, BTreeMap<String, RecordRow>>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every keyed record as `(table, key) → data`.
    pub async fn records_snapshot(&self) -> BTreeMap<(String, String), Value> {
        let tables = self.tables.read().await;
        tables
            .records
            .iter()
            .flat_map(|(table, rows)| {
                rows.values()
                    .map(move |row| ((table.to_string(), row.key.clone()), row.data.clone()))
            })
            .collect()
    }

    pub async fn syncables(&self) -> Vec<Syncable> {
        self.tables.read().await.syncables.values().cloned().collect()
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.tables.read().await.reports.values().cloned().collect()
    }
}

#[async_trait]
impl SyncableStore for MemoryStore {
    async fn find_syncable(&self, height: u64) -> Result<Option<Syncable>, StoreError> {
        Ok(self.tables.read().await.syncables.get(&height).cloned())
    }

    async fn find_most_recent_syncable(&self) -> Result<Option<Syncable>, StoreError> {
        Ok(self.tables.read().await.syncables.values().next_back().cloned())
    }

    async fn find_first_with_other_version(&self, version: i64) -> Result<Option<Syncable>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .syncables
            .values()
            .find(|s| s.index_version != version)
            .cloned())
    }

    async fn find_last_with_other_version(&self, version: i64) -> Result<Option<Syncable>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .syncables
            .values()
            .rev()
            .find(|s| s.index_version != version)
            .cloned())
    }

    async fn find_oldest_other_version(&self, version: i64) -> Result<Option<i64>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .syncables
            .values()
            .map(|s| s.index_version)
            .filter(|v| *v != version)
            .min())
    }

    async fn find_syncable_heights(&self, start: u64, end: u64) -> Result<Vec<u64>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.syncables.range(start..=end).map(|(h, _)| *h).collect())
    }

    async fn find_boundary_heights(
        &self,
        start: u64,
        end: u64,
        filter: BoundaryFilter,
    ) -> Result<Vec<u64>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .syncables
            .range(start..=end)
            .filter(|(_, s)| filter.matches(s.last_in_session, s.last_in_era))
            .map(|(h, _)| *h)
            .collect())
    }

    async fn create_syncable(&self, syncable: &Syncable) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.syncables.contains_key(&syncable.height) {
            return Err(StoreError::Duplicate {
                table: "syncables",
                key: syncable.height.to_string(),
            });
        }
        tables.syncables.insert(syncable.height, syncable.clone());
        Ok(())
    }

    async fn save_syncable(&self, syncable: &Syncable) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.syncables.get_mut(&syncable.height) {
            Some(stored) => {
                *stored = syncable.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                table: "syncables",
                key: syncable.height.to_string(),
            }),
        }
    }

    async fn set_index_version(&self, start: u64, end: u64, version: i64) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let mut touched = 0;
        for (_, s) in tables.syncables.range_mut(start..=end) {
            if s.index_version != version {
                s.index_version = version;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn create_report(&self, report: &Report) -> Result<Report, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_report_id += 1;
        let mut created = report.clone();
        created.id = tables.next_report_id;
        tables.reports.insert(created.id, created.clone());
        Ok(created)
    }

    async fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.reports.get_mut(&report.id) {
            Some(stored) => {
                *stored = report.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                table: "reports",
                key: report.id.to_string(),
            }),
        }
    }

    async fn find_report(&self, id: i64) -> Result<Option<Report>, StoreError> {
        Ok(self.tables.read().await.reports.get(&id).cloned())
    }

    async fn find_incomplete_reports(&self, kinds: &[ReportKind]) -> Result<Vec<Report>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .reports
            .values()
            .filter(|r| !r.is_complete() && kinds.contains(&r.kind))
            .cloned()
            .collect())
    }

    async fn delete_incomplete_reports(&self, kinds: &[ReportKind]) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.reports.len();
        tables
            .reports
            .retain(|_, r| r.is_complete() || !kinds.contains(&r.kind));
        Ok((before - tables.reports.len()) as u64)
    }

    async fn find_most_recent_report(&self) -> Result<Option<Report>, StoreError> {
        Ok(self.tables.read().await.reports.values().next_back().cloned())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_row(&self, table: &'static str, key: &str) -> Result<Option<Value>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .get(table)
            .and_then(|rows| rows.get(key))
            .map(|row| row.data.clone()))
    }

    async fn insert_row(&self, table: &'static str, row: RecordRow) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let rows = tables.records.entry(table).or_default();
        if rows.contains_key(&row.key) {
            return Err(StoreError::Duplicate { table, key: row.key });
        }
        rows.insert(row.key.clone(), row);
        Ok(())
    }

    async fn update_row(&self, table: &'static str, row: RecordRow) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.records.get_mut(table).and_then(|rows| rows.get_mut(&row.key)) {
            Some(stored) => {
                *stored = row;
                Ok(())
            }
            None => Err(StoreError::NotFound { table, key: row.key }),
        }
    }

    async fn rows_at_height(&self, table: &'static str, height: u64) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|row| row.height == height)
                    .map(|row| row.data.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn heights_with_kinds(
        &self,
        table: &'static str,
        kinds: &[String],
        start: u64,
        end: u64,
    ) -> Result<Vec<u64>, StoreError> {
        let tables = self.tables.read().await;
        let heights: BTreeSet<u64> = tables
            .records
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|row| (start..=end).contains(&row.height))
                    .filter(|row| row.kind.as_ref().is_some_and(|k| kinds.contains(k)))
                    .map(|row| row.height)
                    .collect()
            })
            .unwrap_or_default();
        Ok(heights.into_iter().collect())
    }

    async fn count_rows(&self, table: &'static str) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.records.get(table).map(|rows| rows.len() as u64).unwrap_or(0))
    }
}
