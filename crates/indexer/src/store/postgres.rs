//! Postgres store over a deadpool connection pool.
//!
//! Syncables and reports have typed columns. Keyed records share one table shape:
//! `natural_key` primary key, `height`, optional `kind`, JSONB `data`.

use super::{migrations, RecordRow, RecordStore, ReportStore, StoreError, SyncableStore};
use crate::model::{
    AccountEraSeq, BlockSeq, EventSeq, Record, Report, ReportKind, SyncStatus, Syncable,
    SystemEvent, TransactionSeq, ValidatorAgg, ValidatorEraSeq, ValidatorSeq, ValidatorSessionSeq,
};
use crate::source::BoundaryFilter;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde_json::Value;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

const RECORD_TABLES: &[&str] = &[
    BlockSeq::TABLE,
    TransactionSeq::TABLE,
    ValidatorSeq::TABLE,
    ValidatorSessionSeq::TABLE,
    ValidatorEraSeq::TABLE,
    EventSeq::TABLE,
    AccountEraSeq::TABLE,
    ValidatorAgg::TABLE,
    SystemEvent::TABLE,
];

const SYNCABLE_COLUMNS: &str = "height, time, chain, spec_version, session, era, active_era, \
     last_in_session, last_in_era, status, index_version, processed_at, report_id";

const REPORT_COLUMNS: &str = "id, kind, index_version, start_height, end_height, success_count, \
     error_count, error_msg, duration_ms, created_at, completed_at";

pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Connect, verify one connection and apply pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| StoreError::InvalidConnectionString(e.to_string()))?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = Manager::from_config(config, NoTls, manager_config);
        let pool = Pool::builder(manager)
            .max_size(16)
            .runtime(Runtime::Tokio1)
            .build()?;

        let _conn = pool.get().await?;
        tracing::info!("database connection pool created");

        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

fn record_table(table: &'static str) -> Result<&'static str, StoreError> {
    if RECORD_TABLES.contains(&table) {
        Ok(table)
    } else {
        Err(StoreError::Corrupt(format!("unknown record table {table}")))
    }
}

fn syncable_from_row(row: &Row) -> Result<Syncable, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Syncable {
        height: row.try_get::<_, i64>("height")? as u64,
        time: row.try_get("time")?,
        chain: row.try_get("chain")?,
        spec_version: row.try_get::<_, i32>("spec_version")? as u32,
        session: row.try_get::<_, i64>("session")? as u64,
        era: row.try_get::<_, i64>("era")? as u64,
        active_era: row.try_get::<_, i64>("active_era")? as u64,
        last_in_session: row.try_get("last_in_session")?,
        last_in_era: row.try_get("last_in_era")?,
        status: SyncStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown sync status {status:?}")))?,
        index_version: row.try_get("index_version")?,
        processed_at: row.try_get("processed_at")?,
        report_id: row.try_get("report_id")?,
    })
}

fn report_from_row(row: &Row) -> Result<Report, StoreError> {
    let kind: String = row.try_get("kind")?;
    Ok(Report {
        id: row.try_get("id")?,
        kind: kind.parse().map_err(StoreError::Corrupt)?,
        index_version: row.try_get("index_version")?,
        start_height: row.try_get::<_, i64>("start_height")? as u64,
        end_height: row.try_get::<_, i64>("end_height")? as u64,
        success_count: row.try_get::<_, i64>("success_count")? as u64,
        error_count: row.try_get::<_, i64>("error_count")? as u64,
        error_msg: row.try_get("error_msg")?,
        duration_ms: row.try_get::<_, i64>("duration_ms")? as u64,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn kind_names(kinds: &[ReportKind]) -> Vec<String> {
    kinds.iter().map(|k| k.as_str().to_string()).collect()
}

fn heights_from_rows(rows: &[Row]) -> Result<Vec<u64>, StoreError> {
    rows.iter()
        .map(|row| Ok(row.try_get::<_, i64>(0)? as u64))
        .collect()
}

#[async_trait]
impl SyncableStore for PgStore {
    async fn find_syncable(&self, height: u64) -> Result<Option<Syncable>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {SYNCABLE_COLUMNS} FROM syncables WHERE height = $1");
        client
            .query_opt(&sql, &[&(height as i64)])
            .await?
            .as_ref()
            .map(syncable_from_row)
            .transpose()
    }

    async fn find_most_recent_syncable(&self) -> Result<Option<Syncable>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {SYNCABLE_COLUMNS} FROM syncables ORDER BY height DESC LIMIT 1");
        client
            .query_opt(&sql, &[])
            .await?
            .as_ref()
            .map(syncable_from_row)
            .transpose()
    }

    async fn find_first_with_other_version(&self, version: i64) -> Result<Option<Syncable>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {SYNCABLE_COLUMNS} FROM syncables WHERE index_version <> $1 ORDER BY height ASC LIMIT 1"
        );
        client
            .query_opt(&sql, &[&version])
            .await?
            .as_ref()
            .map(syncable_from_row)
            .transpose()
    }

    async fn find_last_with_other_version(&self, version: i64) -> Result<Option<Syncable>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {SYNCABLE_COLUMNS} FROM syncables WHERE index_version <> $1 ORDER BY height DESC LIMIT 1"
        );
        client
            .query_opt(&sql, &[&version])
            .await?
            .as_ref()
            .map(syncable_from_row)
            .transpose()
    }

    async fn find_oldest_other_version(&self, version: i64) -> Result<Option<i64>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT MIN(index_version) FROM syncables WHERE index_version <> $1",
                &[&version],
            )
            .await?;
        Ok(row.get::<_, Option<i64>>(0))
    }

    async fn find_syncable_heights(&self, start: u64, end: u64) -> Result<Vec<u64>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT height FROM syncables WHERE height BETWEEN $1 AND $2 ORDER BY height",
                &[&(start as i64), &(end as i64)],
            )
            .await?;
        heights_from_rows(&rows)
    }

    async fn find_boundary_heights(
        &self,
        start: u64,
        end: u64,
        filter: BoundaryFilter,
    ) -> Result<Vec<u64>, StoreError> {
        let condition = match filter {
            BoundaryFilter::LastInSession => "(last_in_session OR last_in_era)",
            BoundaryFilter::LastInEra => "last_in_era",
        };
        let sql = format!(
            "SELECT height FROM syncables WHERE height BETWEEN $1 AND $2 AND {condition} ORDER BY height"
        );
        let client = self.pool.get().await?;
        let rows = client.query(&sql, &[&(start as i64), &(end as i64)]).await?;
        heights_from_rows(&rows)
    }

    async fn create_syncable(&self, s: &Syncable) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "INSERT INTO syncables ({SYNCABLE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );
        let result = client
            .execute(
                &sql,
                &[
                    &(s.height as i64),
                    &s.time,
                    &s.chain,
                    &(s.spec_version as i32),
                    &(s.session as i64),
                    &(s.era as i64),
                    &(s.active_era as i64),
                    &s.last_in_session,
                    &s.last_in_era,
                    &s.status.as_str(),
                    &s.index_version,
                    &s.processed_at,
                    &s.report_id,
                ],
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(StoreError::Duplicate {
                table: "syncables",
                key: s.height.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_syncable(&self, s: &Syncable) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE syncables SET time = $2, chain = $3, spec_version = $4, session = $5, \
                 era = $6, active_era = $7, last_in_session = $8, last_in_era = $9, status = $10, \
                 index_version = $11, processed_at = $12, report_id = $13 WHERE height = $1",
                &[
                    &(s.height as i64),
                    &s.time,
                    &s.chain,
                    &(s.spec_version as i32),
                    &(s.session as i64),
                    &(s.era as i64),
                    &(s.active_era as i64),
                    &s.last_in_session,
                    &s.last_in_era,
                    &s.status.as_str(),
                    &s.index_version,
                    &s.processed_at,
                    &s.report_id,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                table: "syncables",
                key: s.height.to_string(),
            });
        }
        Ok(())
    }

    async fn set_index_version(&self, start: u64, end: u64, version: i64) -> Result<u64, StoreError> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE syncables SET index_version = $3 \
                 WHERE height BETWEEN $1 AND $2 AND index_version <> $3",
                &[&(start as i64), &(end as i64), &version],
            )
            .await?;
        Ok(updated)
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn create_report(&self, r: &Report) -> Result<Report, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "INSERT INTO reports (kind, index_version, start_height, end_height, success_count, \
                 error_count, error_msg, duration_ms, created_at, completed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id",
                &[
                    &r.kind.as_str(),
                    &r.index_version,
                    &(r.start_height as i64),
                    &(r.end_height as i64),
                    &(r.success_count as i64),
                    &(r.error_count as i64),
                    &r.error_msg,
                    &(r.duration_ms as i64),
                    &r.created_at,
                    &r.completed_at,
                ],
            )
            .await?;
        let mut created = r.clone();
        created.id = row.try_get(0)?;
        Ok(created)
    }

    async fn save_report(&self, r: &Report) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE reports SET kind = $2, index_version = $3, start_height = $4, end_height = $5, \
                 success_count = $6, error_count = $7, error_msg = $8, duration_ms = $9, \
                 completed_at = $10 WHERE id = $1",
                &[
                    &r.id,
                    &r.kind.as_str(),
                    &r.index_version,
                    &(r.start_height as i64),
                    &(r.end_height as i64),
                    &(r.success_count as i64),
                    &(r.error_count as i64),
                    &r.error_msg,
                    &(r.duration_ms as i64),
                    &r.completed_at,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                table: "reports",
                key: r.id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_report(&self, id: i64) -> Result<Option<Report>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1");
        client
            .query_opt(&sql, &[&id])
            .await?
            .as_ref()
            .map(report_from_row)
            .transpose()
    }

    async fn find_incomplete_reports(&self, kinds: &[ReportKind]) -> Result<Vec<Report>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports \
             WHERE completed_at IS NULL AND kind = ANY($1) ORDER BY id"
        );
        let rows = client.query(&sql, &[&kind_names(kinds)]).await?;
        rows.iter().map(report_from_row).collect()
    }

    async fn delete_incomplete_reports(&self, kinds: &[ReportKind]) -> Result<u64, StoreError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM reports WHERE completed_at IS NULL AND kind = ANY($1)",
                &[&kind_names(kinds)],
            )
            .await?;
        Ok(deleted)
    }

    async fn find_most_recent_report(&self) -> Result<Option<Report>, StoreError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {REPORT_COLUMNS} FROM reports ORDER BY id DESC LIMIT 1");
        client
            .query_opt(&sql, &[])
            .await?
            .as_ref()
            .map(report_from_row)
            .transpose()
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn find_row(&self, table: &'static str, key: &str) -> Result<Option<Value>, StoreError> {
        let sql = format!("SELECT data FROM {} WHERE natural_key = $1", record_table(table)?);
        let client = self.pool.get().await?;
        let row = client.query_opt(&sql, &[&key]).await?;
        Ok(row.map(|r| r.try_get(0)).transpose()?)
    }

    async fn insert_row(&self, table: &'static str, row: RecordRow) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (natural_key, height, kind, data) VALUES ($1, $2, $3, $4)",
            record_table(table)?
        );
        let client = self.pool.get().await?;
        let result = client
            .execute(&sql, &[&row.key, &(row.height as i64), &row.kind, &row.data])
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(StoreError::Duplicate { table, key: row.key })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_row(&self, table: &'static str, row: RecordRow) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET height = $2, kind = $3, data = $4, updated_at = NOW() WHERE natural_key = $1",
            record_table(table)?
        );
        let client = self.pool.get().await?;
        let updated = client
            .execute(&sql, &[&row.key, &(row.height as i64), &row.kind, &row.data])
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound { table, key: row.key });
        }
        Ok(())
    }

    async fn rows_at_height(&self, table: &'static str, height: u64) -> Result<Vec<Value>, StoreError> {
        let sql = format!(
            "SELECT data FROM {} WHERE height = $1 ORDER BY natural_key",
            record_table(table)?
        );
        let client = self.pool.get().await?;
        let rows = client.query(&sql, &[&(height as i64)]).await?;
        rows.iter()
            .map(|r| r.try_get(0).map_err(StoreError::from))
            .collect()
    }

    async fn heights_with_kinds(
        &self,
        table: &'static str,
        kinds: &[String],
        start: u64,
        end: u64,
    ) -> Result<Vec<u64>, StoreError> {
        let sql = format!(
            "SELECT DISTINCT height FROM {} WHERE kind = ANY($1) AND height BETWEEN $2 AND $3 ORDER BY height",
            record_table(table)?
        );
        let client = self.pool.get().await?;
        let rows = client
            .query(&sql, &[&kinds, &(start as i64), &(end as i64)])
            .await?;
        heights_from_rows(&rows)
    }

    async fn count_rows(&self, table: &'static str) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", record_table(table)?);
        let client = self.pool.get().await?;
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.try_get::<_, i64>(0)? as u64)
    }
}
